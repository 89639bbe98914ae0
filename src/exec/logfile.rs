// src/exec/logfile.rs

//! Per-task log files.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::debug;

/// Move an existing log out of the way.
///
/// The log is renamed to the lowest unused of `<path>.0`, `<path>.1`, ...
/// so earlier logs are never overwritten. Returns the new name, or `None`
/// if there was nothing to rotate.
pub fn rotate_log(path: &Path) -> io::Result<Option<PathBuf>> {
    if !path.exists() {
        return Ok(None);
    }

    let mut n: u32 = 0;
    let target = loop {
        let mut candidate = path.as_os_str().to_owned();
        candidate.push(format!(".{n}"));
        let candidate = PathBuf::from(candidate);
        if !candidate.exists() {
            break candidate;
        }
        n += 1;
    };

    fs::rename(path, &target)?;
    debug!(from = %path.display(), to = %target.display(), "rotated task log");
    Ok(Some(target))
}

/// Current time as written in banners.
pub fn timestamp() -> String {
    Utc::now().to_rfc3339()
}

/// Append-only handle to one task log.
#[derive(Debug)]
pub struct TaskLog {
    path: PathBuf,
    file: File,
}

impl TaskLog {
    /// Open for append, creating the file (and its directory) if needed.
    pub fn open(path: &Path) -> io::Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            file,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn line(&mut self, text: &str) -> io::Result<()> {
        writeln!(self.file, "{text}")?;
        self.file.flush()
    }

    /// `---- <what> <timestamp> ----`
    pub fn banner(&mut self, what: &str) -> io::Result<()> {
        self.line(&format!("---- {what} {} ----", timestamp()))
    }

    /// Second handle to the same file, for a child's stdout or stderr.
    pub fn try_clone_file(&self) -> io::Result<File> {
        self.file.try_clone()
    }
}

/// Last `n` lines of a log, invalid UTF-8 replaced.
pub fn log_tail(path: &Path, n: usize) -> io::Result<Vec<String>> {
    let reader = BufReader::new(File::open(path)?);
    if n == 0 {
        return Ok(Vec::new());
    }
    let mut tail = std::collections::VecDeque::with_capacity(n);
    for line in reader.split(b'\n') {
        let line = line?;
        if tail.len() == n {
            tail.pop_front();
        }
        tail.push_back(String::from_utf8_lossy(&line).into_owned());
    }
    Ok(tail.into_iter().collect())
}
