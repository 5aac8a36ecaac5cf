//! Component E — Synchroniser.
//!
//! Reconciles an in-memory [`Cgroup`] with the filesystem: `create`,
//! `modify`, `delete`, `fetch`, `copy_from_parent`. This is the largest
//! component in the engine because it is where the mount table, the
//! attribute I/O layer, and ownership/permission handling all meet.

use std::io::{BufRead, BufReader};
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};

use nix::sys::stat::Mode;
use nix::unistd::{Gid, Uid};

use crate::attribute;
use crate::cgroup::Cgroup;
use crate::common;
use crate::context::Context;
use crate::error::{Error, Kind, Result};
use crate::path;

/// Creates `cgroup` on disk: one directory per declared controller, with
/// ownership applied and every attribute written. Attribute write
/// failures are recorded but do not abort the attempt (the kernel
/// legitimately exposes some attribute files as read-only); the first
/// one encountered is returned once every attribute on every controller
/// has been attempted.
pub fn create(ctx: &Context, cgroup: &Cgroup, ignore_ownership: bool) -> Result<()> {
    ctx.with_mount_table(|table| {
        for controller in cgroup.controllers() {
            if !table.is_mounted(&controller.name) {
                return Err(Error::Domain(Kind::SubsystemNotMounted));
            }
        }

        let mut first_error: Option<Error> = None;

        for controller in cgroup.controllers() {
            let dir = path::group_path(table, &cgroup.name, &controller.name)
                .ok_or(Error::Domain(Kind::SubsystemNotMounted))?;

            mkdir_p(&dir, ctx.config.dir_mode)?;

            if !ignore_ownership {
                chown_recursive(
                    &dir,
                    cgroup.control_uid,
                    cgroup.control_gid,
                    ctx.config.dir_mode,
                    ctx.config.file_mode,
                )?;
            }

            for (name, value) in controller.values() {
                if let Err(err) = attribute::write(&dir.join(name), value) {
                    tracing::warn!(attribute = %name, error = %err, "failed to write attribute during create");
                    if first_error.is_none() {
                        first_error = Some(err);
                    }
                }
            }

            if !ignore_ownership {
                chown_one(&dir.join("tasks"), cgroup.tasks_uid, cgroup.tasks_gid)?;
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    })
}

/// Like [`create`] but only performs the attribute writes: no `mkdir`,
/// no `chown`. Here a write failure is diagnostic, not expected, so the
/// first one propagates immediately.
pub fn modify(ctx: &Context, cgroup: &Cgroup) -> Result<()> {
    ctx.with_mount_table(|table| {
        for controller in cgroup.controllers() {
            let dir = path::group_path(table, &cgroup.name, &controller.name)
                .ok_or(Error::Domain(Kind::SubsystemNotMounted))?;
            for (name, value) in controller.values() {
                attribute::write(&dir.join(name), value)?;
            }
        }
        Ok(())
    })
}

/// Migrates tasks out to the parent group and removes `cgroup`'s
/// directory under every declared controller.
pub fn delete(ctx: &Context, cgroup: &Cgroup, ignore_migration: bool) -> Result<()> {
    let result = ctx.with_mount_table(|table| {
        for controller in cgroup.controllers() {
            let dir = path::group_path(table, &cgroup.name, &controller.name)
                .ok_or(Error::Domain(Kind::SubsystemNotMounted))?;
            migrate_and_remove(table, &cgroup.name, &controller.name, &dir)?;
        }
        Ok(())
    });

    if result.is_ok() || !ignore_migration {
        return result;
    }

    // Second pass: best-effort rmdir, treating ENOENT as success.
    ctx.with_mount_table(|table| {
        for controller in cgroup.controllers() {
            if let Some(dir) = path::group_path(table, &cgroup.name, &controller.name) {
                match std::fs::remove_dir(&dir) {
                    Ok(()) => {}
                    Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                    Err(err) => return Err(Error::os(Kind::Failed, &err)),
                }
            }
        }
        Ok(())
    })
}

fn migrate_and_remove(
    table: &crate::mount::MountTable,
    group_name: &str,
    controller: &str,
    dir: &Path,
) -> Result<()> {
    let parent_name = format!("{group_name}/..");
    let parent_tasks = path::group_path(table, &parent_name, controller)
        .ok_or(Error::Domain(Kind::SubsystemNotMounted))?
        .join("tasks");

    let group_tasks = dir.join("tasks");
    let pids = read_tids(&group_tasks)?;
    for pid in pids {
        common::append_attribute_file(&parent_tasks, &pid.to_string())
            .map_err(|err| Error::os(Kind::Failed, err.io_error()))?;
    }

    std::fs::remove_dir(dir).map_err(|err| Error::os(Kind::Failed, &err))
}

fn read_tids(tasks_path: &Path) -> Result<Vec<i64>> {
    let file = std::fs::File::open(tasks_path).map_err(|err| Error::os(Kind::Failed, &err))?;
    let mut tids = Vec::new();
    for line in BufReader::new(file).lines() {
        let line = line.map_err(|err| Error::os(Kind::Failed, &err))?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        tids.push(
            line.parse()
                .map_err(|_| Error::Domain(Kind::Failed))?,
        );
    }
    Ok(tids)
}

/// Populates `cgroup` from the filesystem given only its `name`. On any
/// failure (including `DoesNotExist`) the caller's `cgroup` is left
/// exactly as it was: this function only swaps in its results once every
/// mounted controller has been inspected successfully.
pub fn fetch(ctx: &Context, cgroup: &mut Cgroup) -> Result<()> {
    let name = cgroup.name.clone();
    let mut scratch = Cgroup::new(name.clone());

    ctx.with_mount_table(|table| {
        for entry in table.entries() {
            let dir = path::group_path(table, &name, &entry.controller).unwrap();
            if !dir.exists() {
                continue;
            }

            let tasks_meta = std::fs::metadata(dir.join("tasks"))
                .map_err(|err| Error::os(Kind::Failed, &err))?;
            scratch.tasks_uid = tasks_meta.uid();
            scratch.tasks_gid = tasks_meta.gid();

            scratch.add_controller(entry.controller.clone());

            let read_dir = std::fs::read_dir(&dir).map_err(|err| Error::os(Kind::Failed, &err))?;
            let mut recorded_owner = false;
            for entry_result in read_dir {
                let dir_entry = entry_result.map_err(|err| Error::os(Kind::Failed, &err))?;
                let file_name = dir_entry.file_name();
                let file_name = file_name.to_string_lossy();
                let Some(prefix) = file_name.split('.').next() else {
                    continue;
                };
                if prefix != entry.controller {
                    continue;
                }
                let file_path = dir_entry.path();
                if !file_path.is_file() {
                    continue;
                }

                if !recorded_owner {
                    let meta = dir_entry
                        .metadata()
                        .map_err(|err| Error::os(Kind::Failed, &err))?;
                    scratch.control_uid = meta.uid();
                    scratch.control_gid = meta.gid();
                    recorded_owner = true;
                }

                if let Ok(value) = attribute::read(&file_path) {
                    scratch
                        .add_controller(entry.controller.clone())
                        .set(file_name.to_string(), value);
                }
            }
        }
        Ok(())
    })?;

    if scratch.controllers().is_empty() {
        return Err(Error::Domain(Kind::DoesNotExist));
    }

    *cgroup = scratch;
    Ok(())
}

/// Re-derives `cgroup`'s controllers from its parent cgroup and then
/// creates it. The parent is the hierarchy root (`.`) when the group's
/// first declared controller's directory is itself a mount point,
/// otherwise it is the dirname of `cgroup.name`.
pub fn copy_from_parent(ctx: &Context, cgroup: &mut Cgroup, ignore_ownership: bool) -> Result<()> {
    let first_controller = cgroup
        .controllers()
        .first()
        .map(|c| c.name.clone())
        .ok_or(Error::Domain(Kind::InvalidOperation))?;

    let parent_name = ctx.with_mount_table(|table| {
        let own_dir = path::group_path(table, &cgroup.name, &first_controller)
            .ok_or(Error::Domain(Kind::SubsystemNotMounted))?;
        Ok(determine_parent_name(&cgroup.name, &own_dir))
    })?;

    let mut parent = Cgroup::new(parent_name);
    fetch(ctx, &mut parent)?;

    for record in parent.controllers() {
        cgroup.copy_controller_values(record);
    }

    create(ctx, cgroup, ignore_ownership)
}

fn determine_parent_name(group_name: &str, own_dir: &Path) -> String {
    let is_mount_point = match (nix::sys::stat::stat(own_dir), own_dir.parent().map(nix::sys::stat::stat)) {
        (Ok(own), Some(Ok(parent))) => own.st_dev != parent.st_dev,
        _ => false,
    };

    if is_mount_point {
        ".".to_owned()
    } else {
        Path::new(group_name)
            .parent()
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_else(|| ".".to_owned())
    }
}

/// Emulates `mkdir -p`: creates every path prefix in turn, treating
/// `EEXIST` as success. Never changes the caller's working directory.
fn mkdir_p(target: &Path, mode: u32) -> Result<()> {
    let mode = Mode::from_bits_truncate(mode);
    let mut prefix = PathBuf::new();
    for component in target.components() {
        prefix.push(component);
        match nix::unistd::mkdir(&prefix, mode) {
            Ok(()) => {}
            Err(nix::errno::Errno::EEXIST) => {}
            Err(nix::errno::Errno::EPERM) => return Err(Error::Domain(Kind::NotOwner)),
            Err(errno) => {
                return Err(Error::Os {
                    kind: Kind::NotAllowed,
                    errno: errno as i32,
                })
            }
        }
    }
    Ok(())
}

fn chown_one(path: &Path, uid: u32, gid: u32) -> Result<()> {
    nix::unistd::chown(path, Some(Uid::from_raw(uid)), Some(Gid::from_raw(gid)))
        .map_err(|errno| Error::Os {
            kind: Kind::NotAllowed,
            errno: errno as i32,
        })
}

fn chown_recursive(dir: &Path, uid: u32, gid: u32, dir_mode: u32, file_mode: u32) -> Result<()> {
    chown_one(dir, uid, gid)?;
    set_mode(dir, dir_mode)?;

    let entries = std::fs::read_dir(dir).map_err(|err| Error::os(Kind::NotAllowed, &err))?;
    for entry in entries {
        let entry = entry.map_err(|err| Error::os(Kind::NotAllowed, &err))?;
        let path = entry.path();
        if path.is_dir() {
            chown_recursive(&path, uid, gid, dir_mode, file_mode)?;
        } else {
            chown_one(&path, uid, gid)?;
            set_mode(&path, file_mode)?;
        }
    }
    Ok(())
}

fn set_mode(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let perms = std::fs::Permissions::from_mode(mode);
    std::fs::set_permissions(path, perms).map_err(|err| Error::os(Kind::NotAllowed, &err))
}
