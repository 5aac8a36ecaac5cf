//! Component D — Cgroup Object.
//!
//! A pure value type: a cgroup's name, ownership, and an ordered list of
//! per-controller attribute records. The library never retains a
//! reference to these after a call returns (spec §3 "Lifecycles").

use serde::{Deserialize, Serialize};

/// One `(attribute_name, attribute_value)` pair. `attribute_name` is
/// expected to begin with `<controller>.` when written out, but this
/// type does not enforce that — the synchroniser does, at write time.
pub type Attribute = (String, String);

/// A single controller's attribute set, in caller-significant order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControllerRecord {
    pub name: String,
    values: Vec<Attribute>,
}

impl ControllerRecord {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            values: Vec::new(),
        }
    }

    pub fn values(&self) -> &[Attribute] {
        &self.values
    }

    /// Sets `attribute_name` to `value`, preserving position if the name
    /// is already present (invariant: attribute names are unique within
    /// one controller record), or appending otherwise.
    pub fn set(&mut self, attribute_name: impl Into<String>, value: impl Into<String>) {
        let attribute_name = attribute_name.into();
        let value = value.into();
        match self.values.iter_mut().find(|(n, _)| *n == attribute_name) {
            Some((_, v)) => *v = value,
            None => self.values.push((attribute_name, value)),
        }
    }

    pub fn get(&self, attribute_name: &str) -> Option<&str> {
        self.values
            .iter()
            .find(|(n, _)| n == attribute_name)
            .map(|(_, v)| v.as_str())
    }
}

/// In-memory representation of a cgroup. See spec §3 for field meanings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cgroup {
    /// Forward-slash-normalised relative path; empty means the hierarchy
    /// root.
    pub name: String,
    pub tasks_uid: u32,
    pub tasks_gid: u32,
    pub control_uid: u32,
    pub control_gid: u32,
    controllers: Vec<ControllerRecord>,
}

impl Cgroup {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn controllers(&self) -> &[ControllerRecord] {
        &self.controllers
    }

    pub fn controller(&self, name: &str) -> Option<&ControllerRecord> {
        self.controllers.iter().find(|c| c.name == name)
    }

    /// Adds a controller by name, idempotently: a second call with the
    /// same name returns the existing record rather than duplicating it.
    pub fn add_controller(&mut self, name: impl Into<String>) -> &mut ControllerRecord {
        let name = name.into();
        if let Some(idx) = self.controllers.iter().position(|c| c.name == name) {
            return &mut self.controllers[idx];
        }
        self.controllers.push(ControllerRecord::new(name));
        self.controllers.last_mut().unwrap()
    }

    pub fn free_controllers(&mut self) {
        self.controllers.clear();
    }

    /// Deep-copies one controller record's values from `other` into
    /// `self` (creating or replacing the record of the same name).
    pub fn copy_controller_values(&mut self, other: &ControllerRecord) {
        let rec = self.add_controller(other.name.clone());
        rec.values = other.values.clone();
    }

    /// Deep-copies all of `src`'s controllers into `self`. Requires
    /// `self.name != src.name` (copying a cgroup onto itself is a
    /// caller error, not a silent no-op).
    pub fn copy_from(&mut self, src: &Cgroup) -> Result<(), crate::error::Error> {
        if self.name == src.name {
            return Err(crate::error::Kind::InvalidOperation.into());
        }
        self.free_controllers();
        for c in &src.controllers {
            self.copy_controller_values(c);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_controller_is_idempotent() {
        let mut cg = Cgroup::new("g1");
        cg.add_controller("cpu").set("cpu.shares", "512");
        cg.add_controller("cpu").set("cpu.shares", "1024");
        assert_eq!(cg.controllers().len(), 1);
        assert_eq!(cg.controller("cpu").unwrap().get("cpu.shares"), Some("1024"));
    }

    #[test]
    fn copy_is_independent_of_original() {
        let mut src = Cgroup::new("g1");
        src.add_controller("cpu").set("cpu.shares", "512");

        let mut dst = Cgroup::new("g2");
        dst.copy_from(&src).unwrap();
        assert_eq!(dst.controller("cpu").unwrap().get("cpu.shares"), Some("512"));

        dst.add_controller("cpu").set("cpu.shares", "1024");
        assert_eq!(src.controller("cpu").unwrap().get("cpu.shares"), Some("512"));
    }

    #[test]
    fn copy_onto_self_is_rejected() {
        let mut cg = Cgroup::new("g1");
        let other = cg.clone();
        assert!(cg.copy_from(&other).is_err());
    }
}
