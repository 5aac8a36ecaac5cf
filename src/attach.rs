//! Component F — Task Attachment.
//!
//! Writes a tid into the relevant `tasks` file(s) so that thread becomes
//! a member of the cgroup, and the `/proc/<pid>/cgroup` reader used to
//! confirm placement afterwards.

use std::io::ErrorKind;
use std::path::PathBuf;

use crate::cgroup::Cgroup;
use crate::common;
use crate::context::Context;
use crate::error::{Error, Kind, Result};
use crate::path;
use crate::rules::{self, expand_controllers, ChangeCgroupFlags, LookupOutcome, NameResolver};

/// Kernel thread id (distinct from the process id for multithreaded
/// callers), per spec §4.F.
pub fn gettid() -> u32 {
    nix::unistd::gettid().as_raw() as u32
}

/// Attaches `tid` to `cgroup`, or to the root cgroup under every mounted
/// controller when `cgroup` is `None`.
pub fn attach(ctx: &Context, cgroup: Option<&Cgroup>, tid: u32) -> Result<()> {
    match cgroup {
        None => attach_to_root(ctx, tid),
        Some(cgroup) => attach_to_group(ctx, cgroup, tid),
    }
}

fn attach_to_root(ctx: &Context, tid: u32) -> Result<()> {
    ctx.with_mount_table(|table| {
        for entry in table.entries() {
            let tasks = entry.mount_point.join("tasks");
            write_tid(&tasks, tid)?;
        }
        Ok(())
    })
}

fn attach_to_group(ctx: &Context, cgroup: &Cgroup, tid: u32) -> Result<()> {
    ctx.with_mount_table(|table| {
        for controller in cgroup.controllers() {
            if !table.is_mounted(&controller.name) {
                return Err(Error::Domain(Kind::SubsystemNotMounted));
            }
        }

        for controller in cgroup.controllers() {
            let dir = path::group_path(table, &cgroup.name, &controller.name)
                .ok_or(Error::Domain(Kind::SubsystemNotMounted))?;
            let tasks = dir.join("tasks");
            write_tid(&tasks, tid)?;
        }
        Ok(())
    })
}

fn write_tid(tasks: &std::path::Path, tid: u32) -> Result<()> {
    match common::append_attribute_file(tasks, &tid.to_string()) {
        Ok(()) => Ok(()),
        Err(err) => Err(match err.io_error().kind() {
            ErrorKind::PermissionDenied => Error::Domain(Kind::NotOwner),
            ErrorKind::NotFound => Error::Domain(Kind::DoesNotExist),
            _ => Error::os(Kind::NotAllowed, err.io_error()),
        }),
    }
}

/// Parses `/proc/<pid>/cgroup` (`N:controllers:path` lines) and returns
/// the path the given controller currently places `pid` under.
pub fn get_current_controller_path(pid: u32, controller: &str) -> Result<String> {
    get_current_controller_path_from(&PathBuf::from(format!("/proc/{pid}/cgroup")), controller)
}

pub(crate) fn get_current_controller_path_from(
    proc_cgroup_path: &std::path::Path,
    controller: &str,
) -> Result<String> {
    let text = common::read_cgroup_file(proc_cgroup_path)
        .map_err(|err| Error::os(Kind::DoesNotExist, err.io_error()))?;
    for line in text.lines() {
        let mut parts = line.splitn(3, ':');
        let _hierarchy = parts.next();
        let controllers = parts.next().unwrap_or("");
        let path = parts.next().unwrap_or("");
        if controllers.split(',').any(|c| c == controller) {
            return Ok(path.to_owned());
        }
    }
    Err(Error::Domain(Kind::DoesNotExist))
}

/// Resolves `(uid, gid)` to a destination and attaches `pid` there,
/// following every continuation of the matched rule (spec §4.G step 4).
pub fn change_cgroup(
    ctx: &Context,
    resolver: &dyn NameResolver,
    uid: u32,
    gid: u32,
    pid: u32,
    flags: ChangeCgroupFlags,
) -> Result<()> {
    let matched = if flags.use_cache {
        ctx.rules()
            .read()
            .unwrap()
            .resolve(uid, gid, resolver)
            .cloned()
    } else {
        let text = common::read_cgroup_file(&ctx.config.cgrules_conf_path)
            .map_err(|err| Error::os(Kind::RulesFileMissing, err.io_error()))?;
        match rules::parse_lookup(&text, resolver, uid, gid, ctx.config.max_mnt_elements)? {
            LookupOutcome::Matched(rule) => Some(rule),
            LookupOutcome::NoMatch => None,
        }
    };

    let rule = match matched {
        Some(r) => r,
        None => return Ok(()),
    };

    let mounted: Vec<String> = ctx.with_mount_table(|table| {
        Ok(table.entries().iter().map(|e| e.controller.clone()).collect())
    })?;

    apply_rule_chain(ctx, &rule, &mounted, pid)
}

fn apply_rule_chain(
    ctx: &Context,
    rule: &rules::Rule,
    mounted: &[String],
    pid: u32,
) -> Result<()> {
    execute_one(ctx, rule, mounted, pid)?;
    for cont in &rule.continuations {
        execute_one(ctx, cont, mounted, pid)?;
    }
    Ok(())
}

fn execute_one(ctx: &Context, rule: &rules::Rule, mounted: &[String], pid: u32) -> Result<()> {
    let mut cgroup = Cgroup::new(rule.destination.clone());
    for controller in expand_controllers(rule, mounted) {
        cgroup.add_controller(controller);
    }
    attach(ctx, Some(&cgroup), pid)
}
