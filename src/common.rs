//! Small filesystem helpers shared by the attribute, synchroniser and
//! iterator modules. Kept separate from `error` because these wrap raw
//! `std::io::Error` before the domain layer gets a chance to classify it.

use std::fs::{self, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

#[derive(thiserror::Error, Debug)]
pub enum WrappedIoError {
    #[error("failed to open {path}: {err}")]
    Open { err: std::io::Error, path: PathBuf },
    #[error("failed to write {data} to {path}: {err}")]
    Write {
        err: std::io::Error,
        path: PathBuf,
        data: String,
    },
    #[error("failed to read {path}: {err}")]
    Read { err: std::io::Error, path: PathBuf },
}

impl WrappedIoError {
    pub fn io_error(&self) -> &std::io::Error {
        match self {
            WrappedIoError::Open { err, .. } => err,
            WrappedIoError::Write { err, .. } => err,
            WrappedIoError::Read { err, .. } => err,
        }
    }

    pub fn path(&self) -> &Path {
        match self {
            WrappedIoError::Open { path, .. } => path,
            WrappedIoError::Write { path, .. } => path,
            WrappedIoError::Read { path, .. } => path,
        }
    }
}

/// Opens `path` for read+write, truncates it, and writes `data` verbatim
/// (no trailing-newline policy — the kernel accepts either).
pub fn write_attribute_file<P: AsRef<Path>>(path: P, data: &str) -> Result<(), WrappedIoError> {
    let path = path.as_ref();
    OpenOptions::new()
        .read(true)
        .write(true)
        .truncate(true)
        .open(path)
        .map_err(|err| WrappedIoError::Open {
            err,
            path: path.to_path_buf(),
        })?
        .write_all(data.as_bytes())
        .map_err(|err| WrappedIoError::Write {
            err,
            path: path.to_path_buf(),
            data: data.to_owned(),
        })?;
    Ok(())
}

/// Opens `path` for appending and writes `data` followed by nothing extra.
pub fn append_attribute_file<P: AsRef<Path>>(path: P, data: &str) -> Result<(), WrappedIoError> {
    let path = path.as_ref();
    OpenOptions::new()
        .append(true)
        .open(path)
        .map_err(|err| WrappedIoError::Open {
            err,
            path: path.to_path_buf(),
        })?
        .write_all(data.as_bytes())
        .map_err(|err| WrappedIoError::Write {
            err,
            path: path.to_path_buf(),
            data: data.to_owned(),
        })?;
    Ok(())
}

pub fn read_cgroup_file<P: AsRef<Path>>(path: P) -> Result<String, WrappedIoError> {
    let path = path.as_ref();
    fs::read_to_string(path).map_err(|err| WrappedIoError::Read {
        err,
        path: path.to_path_buf(),
    })
}

/// Whitespace-delimited single-token read, used for scalar attribute files.
pub fn read_single_token<P: AsRef<Path>>(path: P) -> Result<String, WrappedIoError> {
    let path = path.as_ref();
    let mut file = fs::File::open(path).map_err(|err| WrappedIoError::Open {
        err,
        path: path.to_path_buf(),
    })?;
    let mut buf = String::new();
    file.read_to_string(&mut buf)
        .map_err(|err| WrappedIoError::Read {
            err,
            path: path.to_path_buf(),
        })?;
    Ok(buf.split_whitespace().next().unwrap_or("").to_owned())
}
