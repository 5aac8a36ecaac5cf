//! Component H — Iterators.
//!
//! Three resumable cursors sharing the same `begin -> next* -> end`
//! shape: a depth-bounded tree walker, a `tasks` file reader, and a
//! `*.stat` key/value reader. Each also implements [`Iterator`] for
//! ergonomic use with `for` loops and adapters; `Iterator::next` maps
//! the dedicated `Eof` error to `None`.

use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use crate::error::{Error, Kind, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Dir,
    File,
    Other,
}

#[derive(Debug, Clone)]
pub struct TreeEntry {
    pub name: String,
    pub parent_name: String,
    pub full_path: PathBuf,
    pub depth: usize,
    pub kind: EntryKind,
}

/// Depth-bounded, symlink-following traversal rooted at
/// `{mount}/{base_group}`. `max_depth == 0` means unbounded.
pub struct TreeWalker {
    stack: Vec<(PathBuf, usize)>,
    pending_errors: VecDeque<Error>,
    max_depth: usize,
}

impl TreeWalker {
    pub fn begin(base_path: &Path, max_depth: usize) -> Result<Self> {
        if !base_path.exists() {
            return Err(Error::Domain(Kind::DoesNotExist));
        }
        Ok(Self {
            stack: vec![(base_path.to_path_buf(), 0)],
            pending_errors: VecDeque::new(),
            max_depth,
        })
    }

    pub fn next(&mut self) -> Result<TreeEntry> {
        if let Some(err) = self.pending_errors.pop_front() {
            return Err(err);
        }

        let (path, depth) = self.stack.pop().ok_or_else(Error::eof)?;
        let kind = classify(&path)?;

        if kind == EntryKind::Dir && (self.max_depth == 0 || depth < self.max_depth) {
            match std::fs::read_dir(&path) {
                Ok(read_dir) => {
                    let mut children: Vec<PathBuf> = read_dir
                        .filter_map(|e| e.ok())
                        .map(|e| e.path())
                        .collect();
                    children.sort();
                    for child in children.into_iter().rev() {
                        self.stack.push((child, depth + 1));
                    }
                }
                Err(err) => self.pending_errors.push_back(Error::os(Kind::Failed, &err)),
            }
        }

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let parent_name = path
            .parent()
            .and_then(|p| p.file_name())
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        Ok(TreeEntry {
            name,
            parent_name,
            full_path: path,
            depth,
            kind,
        })
    }

    pub fn end(self) {}
}

impl Iterator for TreeWalker {
    type Item = Result<TreeEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        match TreeWalker::next(self) {
            Err(err) if err.is_eof() => None,
            other => Some(other),
        }
    }
}

fn classify(path: &Path) -> Result<EntryKind> {
    let meta = std::fs::metadata(path).map_err(|err| Error::os(Kind::Failed, &err))?;
    Ok(if meta.is_dir() {
        EntryKind::Dir
    } else if meta.is_file() {
        EntryKind::File
    } else {
        EntryKind::Other
    })
}

/// Yields pids from `{mount}/{group}/tasks`, one per call.
pub struct TasksReader {
    lines: std::io::Lines<BufReader<File>>,
}

impl TasksReader {
    pub fn begin(tasks_path: &Path) -> Result<Self> {
        let file = File::open(tasks_path).map_err(|err| Error::os(Kind::DoesNotExist, &err))?;
        Ok(Self {
            lines: BufReader::new(file).lines(),
        })
    }

    pub fn next(&mut self) -> Result<i32> {
        loop {
            let line = self
                .lines
                .next()
                .ok_or_else(Error::eof)?
                .map_err(|err| Error::os(Kind::Failed, &err))?;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            return line.parse().map_err(|_| Error::Domain(Kind::Failed));
        }
    }

    pub fn end(self) {}
}

impl Iterator for TasksReader {
    type Item = Result<i32>;

    fn next(&mut self) -> Option<Self::Item> {
        match TasksReader::next(self) {
            Err(err) if err.is_eof() => None,
            other => Some(other),
        }
    }
}

/// Reads one whitespace-separated `(name, value)` pair per line from a
/// controller's `*.stat` file. The library never interprets the value.
pub struct StatsReader {
    lines: std::io::Lines<BufReader<File>>,
}

impl StatsReader {
    pub fn begin(stat_path: &Path) -> Result<Self> {
        let file = File::open(stat_path).map_err(|err| Error::os(Kind::ValueDoesNotExist, &err))?;
        Ok(Self {
            lines: BufReader::new(file).lines(),
        })
    }

    pub fn next(&mut self) -> Result<(String, String)> {
        loop {
            let line = self
                .lines
                .next()
                .ok_or_else(Error::eof)?
                .map_err(|err| Error::os(Kind::Failed, &err))?;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let mut parts = line.splitn(2, char::is_whitespace);
            let name = parts.next().unwrap_or("").to_owned();
            let value = parts.next().unwrap_or("").trim().to_owned();
            return Ok((name, value));
        }
    }

    pub fn end(self) {}
}

impl Iterator for StatsReader {
    type Item = Result<(String, String)>;

    fn next(&mut self) -> Option<Self::Item> {
        match StatsReader::next(self) {
            Err(err) if err.is_eof() => None,
            other => Some(other),
        }
    }
}
