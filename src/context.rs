//! Explicit context object bundling the process-wide state the original
//! library kept as globals: the mount table and the rules list, each
//! behind its own readers-writer lock (spec §5 — the two locks are never
//! held simultaneously, so there is no lock-ordering hazard).
//!
//! A [`global()`] singleton is kept as a thin convenience layer for
//! callers that want the library's original ambient-global feel; new
//! code should prefer constructing a [`Context`] explicitly.

use std::path::PathBuf;
use std::sync::{OnceLock, RwLock};

use crate::error::{Error, Kind, Result};
use crate::mount::MountTable;
use crate::rules::RuleList;

/// Directory and file mode policy, and the handful of path/bound
/// constants the original hard-codes. Kept as an overridable struct so
/// tests can point at a scratch directory instead of `/etc`.
#[derive(Debug, Clone)]
pub struct Config {
    pub cgrules_conf_path: PathBuf,
    pub dir_mode: u32,
    pub file_mode: u32,
    pub max_mnt_elements: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cgrules_conf_path: PathBuf::from("/etc/cgrules.conf"),
            dir_mode: 0o775,
            file_mode: 0o664,
            max_mnt_elements: 8,
        }
    }
}

#[derive(Default)]
pub struct Context {
    pub config: Config,
    mount_table: RwLock<MountTable>,
    rules: RwLock<RuleList>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: Config) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    pub fn init(&self) -> Result<()> {
        self.mount_table.write().unwrap().init()
    }

    pub fn init_from(
        &self,
        proc_cgroups_path: impl AsRef<std::path::Path>,
        proc_mounts_path: impl AsRef<std::path::Path>,
    ) -> Result<()> {
        self.mount_table
            .write()
            .unwrap()
            .init_from(proc_cgroups_path, proc_mounts_path)
    }

    pub fn is_initialised(&self) -> bool {
        self.mount_table.read().unwrap().is_initialised()
    }

    /// Runs `f` with a read guard over the mount table, rejecting with
    /// `NotInitialised` if `init` has never succeeded.
    pub fn with_mount_table<T>(&self, f: impl FnOnce(&MountTable) -> Result<T>) -> Result<T> {
        let table = self.mount_table.read().unwrap();
        if !table.is_initialised() {
            return Err(Error::Domain(Kind::NotInitialised));
        }
        f(&table)
    }

    pub fn rules(&self) -> &RwLock<RuleList> {
        &self.rules
    }

    /// Re-reads `config.cgrules_conf_path` and replaces the cached rule
    /// list (spec §4.G cache mode's `init`/reload step).
    pub fn reload_rules(&self, resolver: &dyn crate::rules::NameResolver) -> Result<()> {
        let text = crate::common::read_cgroup_file(&self.config.cgrules_conf_path)
            .map_err(|err| Error::os(Kind::RulesFileMissing, err.io_error()))?;
        let parsed =
            crate::rules::parse_cache_with_limit(&text, resolver, self.config.max_mnt_elements)?;
        *self.rules.write().unwrap() = parsed;
        Ok(())
    }
}

static GLOBAL: OnceLock<Context> = OnceLock::new();

/// The process-wide singleton context, lazily constructed on first use.
pub fn global() -> &'static Context {
    GLOBAL.get_or_init(Context::new)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uninitialised_context_rejects_operations() {
        let ctx = Context::new();
        let err = ctx.with_mount_table(|_| Ok(())).unwrap_err();
        assert_eq!(err.kind(), Some(Kind::NotInitialised));
    }

    struct NoopResolver;
    impl crate::rules::NameResolver for NoopResolver {
        fn uid_for_user(&self, _name: &str) -> Option<u32> {
            None
        }
        fn gid_for_group(&self, _name: &str) -> Option<(u32, Vec<String>)> {
            None
        }
        fn username_for_uid(&self, _uid: u32) -> Option<String> {
            None
        }
    }

    #[test]
    fn reload_rules_populates_the_cache() {
        let tmp = tempfile::tempdir().unwrap();
        let cgrules = crate::test::cgrules_conf_fixture(tmp.path(), "*    cpu    default\n");

        let ctx = Context::with_config(Config {
            cgrules_conf_path: cgrules,
            ..Config::default()
        });
        ctx.reload_rules(&NoopResolver).unwrap();
        assert_eq!(ctx.rules().read().unwrap().rules.len(), 1);
    }

    // The next two tests both touch the process-wide `GLOBAL` singleton, so
    // they must not run concurrently with each other (or with any future
    // test that does the same).
    use serial_test::serial;

    #[test]
    #[serial]
    fn global_returns_the_same_instance_every_call() {
        let a = global() as *const Context;
        let b = global() as *const Context;
        assert_eq!(a, b);
    }

    #[test]
    #[serial]
    fn global_rules_cache_is_visible_across_every_caller() {
        global().rules().write().unwrap().rules.clear();

        {
            let mut rules = global().rules().write().unwrap();
            rules.rules.push(crate::rules::Rule {
                subject: crate::rules::Subject::Wildcard,
                controllers: vec!["cpu".to_owned()],
                destination: "default".to_owned(),
                continuations: Vec::new(),
            });
        }

        // A second, independent call to `global()` sees the same state.
        assert_eq!(global().rules().read().unwrap().rules.len(), 1);
    }
}
