//! Component B — Path Builder.
//!
//! Pure functions turning `(group_name, controller)` into an absolute
//! filesystem path. No canonicalisation beyond slash joining: a `..` in
//! `group_name` is forwarded verbatim, which the synchroniser relies on
//! to reach the parent's `tasks` file on delete.

use std::path::{Path, PathBuf};

use crate::mount::MountTable;

/// `{mount_point}/{group_name}/`. Returns `None` when `controller` isn't
/// in the mount table.
pub fn group_path(table: &MountTable, group_name: &str, controller: &str) -> Option<PathBuf> {
    let mount_point = table.mount_point(controller)?;
    Some(join(mount_point, group_name))
}

/// `{mount_point}/`, with no group component.
pub fn controller_root(table: &MountTable, controller: &str) -> Option<PathBuf> {
    table.mount_point(controller).map(Path::to_path_buf)
}

fn join(mount_point: &Path, group_name: &str) -> PathBuf {
    if group_name.is_empty() {
        return mount_point.to_path_buf();
    }
    // Slash-normalise without canonicalising: callers may legitimately
    // pass "..".
    let mut p = mount_point.to_path_buf();
    for segment in group_name.split('/') {
        if segment.is_empty() {
            continue;
        }
        p.push(segment);
    }
    p
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table_with(controller: &str, mount: &str) -> MountTable {
        let mut t = MountTable::new();
        let fixture = tempfile::tempdir().unwrap();
        let cgroups = fixture.path().join("cgroups");
        std::fs::write(&cgroups, format!("#h\n{controller}\t0\t1\t1\n")).unwrap();
        let mounts = fixture.path().join("mounts");
        std::fs::write(&mounts, format!("cgroup {mount} cgroup rw,{controller} 0 0\n")).unwrap();
        t.init_from(&cgroups, &mounts).unwrap();
        t
    }

    #[test]
    fn builds_group_path_with_trailing_component() {
        let table = table_with("cpu", "/sys/fs/cgroup/cpu");
        let p = group_path(&table, "students/alice", "cpu").unwrap();
        assert_eq!(p, Path::new("/sys/fs/cgroup/cpu/students/alice"));
    }

    #[test]
    fn root_group_name_yields_mount_point() {
        let table = table_with("cpu", "/sys/fs/cgroup/cpu");
        let p = group_path(&table, "", "cpu").unwrap();
        assert_eq!(p, Path::new("/sys/fs/cgroup/cpu"));
    }

    #[test]
    fn dotdot_is_forwarded_verbatim() {
        let table = table_with("cpu", "/sys/fs/cgroup/cpu");
        let p = group_path(&table, "g1/..", "cpu").unwrap();
        assert_eq!(p, Path::new("/sys/fs/cgroup/cpu/g1/.."));
    }

    #[test]
    fn missing_controller_yields_none() {
        let table = table_with("cpu", "/sys/fs/cgroup/cpu");
        assert!(group_path(&table, "g1", "memory").is_none());
    }
}
