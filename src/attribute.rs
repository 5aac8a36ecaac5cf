//! Component C — Attribute I/O.
//!
//! Reads and writes a single controller attribute file, classifying
//! failures per spec §4.C: a write that fails with `EPERM` is further
//! probed by checking whether the sibling `tasks` file is still openable
//! for read, to distinguish "not allowed" from "subsystem not mounted".

use std::io::ErrorKind;
use std::path::Path;

use crate::common::{self, WrappedIoError};
use crate::error::{Error, Kind, Result};

/// Writes `value` into the attribute file at `path` verbatim (no
/// trailing-newline policy).
pub fn write(path: &Path, value: &str) -> Result<()> {
    match common::write_attribute_file(path, value) {
        Ok(()) => Ok(()),
        Err(err) => Err(classify(path, &err)),
    }
}

/// Reads a whitespace-delimited scalar attribute.
pub fn read(path: &Path) -> Result<String> {
    common::read_single_token(path).map_err(|err| classify(path, &err))
}

fn classify(attribute_path: &Path, err: &WrappedIoError) -> Error {
    let io_err = err.io_error();
    match io_err.kind() {
        ErrorKind::PermissionDenied => {
            // Secondary probe: is the sibling `tasks` file still openable
            // for read? If so the kernel just refused this specific
            // write; if `tasks` is also gone the whole subsystem isn't
            // mounted here.
            if let Some(parent) = attribute_path.parent() {
                let tasks = parent.join("tasks");
                match std::fs::File::open(&tasks) {
                    Ok(_) => Error::Domain(Kind::NotAllowed),
                    Err(e) if e.kind() == ErrorKind::NotFound => {
                        Error::Domain(Kind::SubsystemNotMounted)
                    }
                    Err(_) => Error::Domain(Kind::NotAllowed),
                }
            } else {
                Error::Domain(Kind::NotAllowed)
            }
        }
        ErrorKind::NotFound => Error::Domain(Kind::ValueDoesNotExist),
        _ => Error::os(Kind::Generic, io_err),
    }
}
