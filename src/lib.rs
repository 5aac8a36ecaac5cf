//! A cgroup runtime engine: mount-table discovery, a typed cgroup object
//! model with a filesystem synchroniser, task placement, a
//! `/etc/cgrules.conf` rules parser and matcher, and resumable iterators
//! over the cgroup tree, a `tasks` file, and `*.stat` files.
//!
//! Control groups provide a way of controlling groups of processes:
//! resource limits, execution priority, resource usage accounting,
//! freezing, and placement. This crate does not interpret controller
//! semantics; it reads and writes the attribute files verbatim and lets
//! callers supply the values that matter to them.

mod test;

pub mod attach;
pub mod attribute;
pub mod cgroup;
pub mod common;
pub mod context;
pub mod error;
pub mod iter;
pub mod mount;
pub mod path;
pub mod rules;
pub mod sync;

pub use cgroup::{Cgroup, ControllerRecord};
pub use context::{global, Config, Context};
pub use error::{Error, Kind, Result};
pub use mount::MountTable;
pub use rules::{ChangeCgroupFlags, RuleList};
