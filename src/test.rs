#![cfg(test)]

use anyhow::{Context, Result};
use std::{
    fs,
    io::Write,
    ops::Deref,
    path::{Path, PathBuf},
};

pub struct TempDir {
    path: Option<PathBuf>,
}

impl TempDir {
    pub fn new<P: Into<PathBuf>>(path: P) -> Result<Self> {
        let p = path.into();
        std::fs::create_dir_all(&p)?;
        Ok(Self { path: Some(p) })
    }

    pub fn path(&self) -> &Path {
        self.path
            .as_ref()
            .expect("temp dir has already been removed")
    }

    pub fn remove(&mut self) {
        if let Some(p) = &self.path {
            let _ = fs::remove_dir_all(p);
            self.path = None;
        }
    }
}

impl Drop for TempDir {
    fn drop(&mut self) {
        self.remove();
    }
}

impl AsRef<Path> for TempDir {
    fn as_ref(&self) -> &Path {
        self.path()
    }
}

impl Deref for TempDir {
    type Target = Path;

    fn deref(&self) -> &Self::Target {
        self.path()
    }
}

pub fn create_temp_dir(test_name: &str) -> Result<TempDir> {
    let dir = TempDir::new(std::env::temp_dir().join(test_name))?;
    Ok(dir)
}

pub fn setup(testname: &str, cgroup_file: &str) -> (TempDir, PathBuf) {
    let tmp = create_temp_dir(testname).expect("create temp directory for test");
    let cgroup_file = set_fixture(&tmp, cgroup_file, "")
        .unwrap_or_else(|_| panic!("set test fixture for {cgroup_file}"));

    (tmp, cgroup_file)
}

pub fn set_fixture(temp_dir: &Path, filename: &str, val: &str) -> Result<PathBuf> {
    let full_path = temp_dir.join(filename);

    std::fs::OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(&full_path)
        .with_context(|| format!("failed to open {full_path:?}"))?
        .write_all(val.as_bytes())
        .with_context(|| format!("failed to write to {full_path:?}"))?;

    Ok(full_path)
}

/// Writes a `/proc/cgroups`-shaped fixture naming each of `controllers`
/// as enabled, one per line, under the kernel's header.
pub fn proc_cgroups_fixture(temp_dir: &Path, controllers: &[&str]) -> PathBuf {
    let mut body = String::from("#subsys_name\thierarchy\tnum_cgroups\tenabled\n");
    for name in controllers {
        body.push_str(&format!("{name}\t0\t1\t1\n"));
    }
    set_fixture(temp_dir, "cgroups", &body).expect("write proc_cgroups fixture")
}

/// Writes a `/proc/mounts`-shaped fixture with one `type == cgroup` line
/// per `(controller, mount_point)` pair.
pub fn proc_mounts_fixture(temp_dir: &Path, entries: &[(&str, &str)]) -> PathBuf {
    let mut body = String::new();
    for (controller, mount_point) in entries {
        body.push_str(&format!("cgroup {mount_point} cgroup rw,{controller} 0 0\n"));
    }
    set_fixture(temp_dir, "mounts", &body).expect("write proc_mounts fixture")
}

/// Writes a `cgrules.conf`-shaped fixture verbatim.
pub fn cgrules_conf_fixture(temp_dir: &Path, text: &str) -> PathBuf {
    set_fixture(temp_dir, "cgrules.conf", text).expect("write cgrules.conf fixture")
}
