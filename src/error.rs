//! The closed error enumeration the whole crate reports through.
//!
//! Every public operation returns `Result<T, Error>`. There is no
//! out-of-band diagnostic channel: where the original C library stashed
//! an errno in thread-local storage alongside a domain code, this crate
//! folds both into one value (`Error::Os`).

use std::io;

/// Domain-level failure kinds, mirroring the original closed enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    NotCompiled,
    NotMounted,
    DoesNotExist,
    NotCreated,
    SubsystemNotMounted,
    NotOwner,
    MultipleMountpoints,
    NotAllowed,
    MaxExceeded,
    ControllerExists,
    ValueExists,
    InvalidOperation,
    ControllerCreateFailed,
    Failed,
    NotInitialised,
    ValueDoesNotExist,
    Generic,
    ValuesNotEqual,
    ControllersDiffer,
    ParseFailed,
    RulesFileMissing,
    MountFailed,
    ConfigNotOpenable,
    Eof,
}

impl std::fmt::Display for Kind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Kind::NotCompiled => "feature not compiled in",
            Kind::NotMounted => "no controller is mounted",
            Kind::DoesNotExist => "cgroup does not exist",
            Kind::NotCreated => "cgroup could not be created",
            Kind::SubsystemNotMounted => "subsystem is not mounted",
            Kind::NotOwner => "operation not permitted for this owner",
            Kind::MultipleMountpoints => "controller has multiple mount points",
            Kind::NotAllowed => "operation not allowed",
            Kind::MaxExceeded => "maximum number of elements exceeded",
            Kind::ControllerExists => "controller already exists",
            Kind::ValueExists => "value already exists",
            Kind::InvalidOperation => "invalid operation",
            Kind::ControllerCreateFailed => "failed to create controller",
            Kind::Failed => "operation failed",
            Kind::NotInitialised => "library is not initialised",
            Kind::ValueDoesNotExist => "value does not exist",
            Kind::Generic => "generic error",
            Kind::ValuesNotEqual => "values are not equal",
            Kind::ControllersDiffer => "controllers differ",
            Kind::ParseFailed => "failed to parse configuration",
            Kind::RulesFileMissing => "rules file is missing",
            Kind::MountFailed => "mount operation failed",
            Kind::ConfigNotOpenable => "configuration file could not be opened",
            Kind::Eof => "end of iteration",
        };
        f.write_str(text)
    }
}

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("{0}")]
    Domain(Kind),

    /// A domain failure the library could further classify down to a raw
    /// OS errno, kept for diagnostics the way the original's thread-local
    /// errno/errtext pair did, without the thread-local storage itself.
    #[error("{kind}: os error {errno}")]
    Os { kind: Kind, errno: i32 },

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn kind(&self) -> Option<Kind> {
        match self {
            Error::Domain(k) => Some(*k),
            Error::Os { kind, .. } => Some(*kind),
            Error::Other(_) => None,
        }
    }

    pub fn os(kind: Kind, err: &io::Error) -> Self {
        match err.raw_os_error() {
            Some(errno) => Error::Os { kind, errno },
            None => Error::Domain(kind),
        }
    }

    pub fn eof() -> Self {
        Error::Domain(Kind::Eof)
    }

    pub fn is_eof(&self) -> bool {
        matches!(self.kind(), Some(Kind::Eof))
    }
}

impl From<Kind> for Error {
    fn from(kind: Kind) -> Self {
        Error::Domain(kind)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
