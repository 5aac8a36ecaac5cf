//! Component A — Mount Table.
//!
//! A process-wide index of `controller -> mount point`, built once by
//! [`MountTable::init`] from `/proc/cgroups` and `/proc/mounts` and kept
//! read-mostly afterwards.

use std::path::{Path, PathBuf};

use crate::common;
use crate::error::{Error, Kind, Result};

/// Compile-time bound on the number of controllers the table can hold,
/// matching the original's `CG_CONTROLLER_MAX`.
pub const CG_CONTROLLER_MAX: usize = 32;

const DEFAULT_PROC_CGROUPS: &str = "/proc/cgroups";
const DEFAULT_PROC_MOUNTS: &str = "/proc/mounts";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountEntry {
    pub controller: String,
    pub mount_point: PathBuf,
}

/// Index of known controllers to their mount point. Readers and writers
/// are serialised by the caller (see `Context`'s `RwLock`); this type
/// itself carries no lock.
#[derive(Debug, Default, Clone)]
pub struct MountTable {
    entries: Vec<MountEntry>,
    initialised: bool,
}

impl MountTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_initialised(&self) -> bool {
        self.initialised
    }

    pub fn entries(&self) -> &[MountEntry] {
        &self.entries
    }

    /// Looks up the mount point bound to `controller`, if any.
    pub fn mount_point(&self, controller: &str) -> Option<&Path> {
        self.entries
            .iter()
            .find(|e| e.controller == controller)
            .map(|e| e.mount_point.as_path())
    }

    pub fn is_mounted(&self, controller: &str) -> bool {
        self.mount_point(controller).is_some()
    }

    /// Re-populates the table from `/proc/cgroups` ∩ `/proc/mounts`.
    pub fn init(&mut self) -> Result<()> {
        self.init_from(DEFAULT_PROC_CGROUPS, DEFAULT_PROC_MOUNTS)
    }

    /// Same as [`Self::init`] but lets tests point at fixture files
    /// instead of the real `/proc`.
    pub fn init_from(
        &mut self,
        proc_cgroups_path: impl AsRef<Path>,
        proc_mounts_path: impl AsRef<Path>,
    ) -> Result<()> {
        let controllers = read_kernel_controllers(proc_cgroups_path.as_ref())?;
        let mounts = read_cgroup_mounts(proc_mounts_path.as_ref())?;

        let mut entries = Vec::new();
        for controller in controllers {
            if entries.len() >= CG_CONTROLLER_MAX {
                tracing::warn!(%controller, "dropping controller, mount table is full");
                break;
            }
            // Repeated matches for the same controller keep the first.
            if let Some((_, mount_point)) = mounts
                .iter()
                .find(|(opts, _)| opts.split(',').any(|opt| opt == controller))
            {
                tracing::debug!(%controller, mount_point = %mount_point.display(), "bound controller");
                entries.push(MountEntry {
                    controller,
                    mount_point: mount_point.clone(),
                });
            }
        }

        if entries.is_empty() {
            return Err(Error::Domain(Kind::NotMounted));
        }

        self.entries = entries;
        self.initialised = true;
        Ok(())
    }
}

/// Reads `/proc/cgroups`, skipping its header line; each remaining line
/// begins with a controller name.
fn read_kernel_controllers(path: &Path) -> Result<Vec<String>> {
    let text = common::read_cgroup_file(path).map_err(|err| Error::os(Kind::NotMounted, err.io_error()))?;
    let mut controllers = Vec::new();
    for line in text.lines().skip(1) {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some(name) = line.split_whitespace().next() {
            controllers.push(name.to_owned());
        }
    }
    Ok(controllers)
}

/// Reads `/proc/mounts`, keeping only `type == cgroup` entries, and
/// returns `(options, mount_point)` pairs in file order.
fn read_cgroup_mounts(path: &Path) -> Result<Vec<(String, PathBuf)>> {
    let text = common::read_cgroup_file(path).map_err(|err| Error::os(Kind::NotMounted, err.io_error()))?;
    let mut mounts = Vec::new();
    for line in text.lines() {
        // device mount_point fstype options dump pass
        let mut fields = line.split_whitespace();
        let _device = fields.next();
        let mount_point = match fields.next() {
            Some(m) => m,
            None => continue,
        };
        let fstype = match fields.next() {
            Some(f) => f,
            None => continue,
        };
        let options = match fields.next() {
            Some(o) => o,
            None => continue,
        };
        if fstype != "cgroup" {
            continue;
        }
        mounts.push((options.to_owned(), PathBuf::from(mount_point)));
    }
    Ok(mounts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::{proc_cgroups_fixture, proc_mounts_fixture};

    #[test]
    fn init_binds_controller_to_first_matching_mount() {
        let tmp = tempfile::tempdir().unwrap();
        let cgroups = proc_cgroups_fixture(tmp.path(), &["cpu"]);
        let mounts = proc_mounts_fixture(tmp.path(), &[("cpu,noexec", "/sys/fs/cgroup/cpu")]);

        let mut table = MountTable::new();
        table.init_from(&cgroups, &mounts).unwrap();

        assert!(table.is_initialised());
        assert_eq!(
            table.mount_point("cpu"),
            Some(Path::new("/sys/fs/cgroup/cpu"))
        );
    }

    #[test]
    fn init_fails_when_nothing_is_mounted() {
        let tmp = tempfile::tempdir().unwrap();
        let cgroups = proc_cgroups_fixture(tmp.path(), &["cpu"]);
        let mounts = crate::test::set_fixture(tmp.path(), "mounts", "tmpfs /tmp tmpfs rw 0 0\n")
            .unwrap();

        let mut table = MountTable::new();
        let err = table.init_from(&cgroups, &mounts).unwrap_err();
        assert_eq!(err.kind(), Some(Kind::NotMounted));
        assert!(!table.is_initialised());
    }

    #[test]
    fn keeps_first_match_on_repeated_mounts() {
        let tmp = tempfile::tempdir().unwrap();
        let cgroups = proc_cgroups_fixture(tmp.path(), &["cpu"]);
        let mounts = proc_mounts_fixture(tmp.path(), &[("cpu", "/first"), ("cpu", "/second")]);

        let mut table = MountTable::new();
        table.init_from(&cgroups, &mounts).unwrap();
        assert_eq!(table.mount_point("cpu"), Some(Path::new("/first")));
    }
}
