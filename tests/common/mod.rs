#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

pub use relbuild_test_utils::{init_tracing, scratch_dir, with_timeout};

pub type TestResult = Result<(), Box<dyn std::error::Error>>;

/// Write `relbuild.toml` into `dir` and return its path.
pub fn write_config(dir: &Path, body: &str) -> PathBuf {
    let path = dir.join("relbuild.toml");
    fs::write(&path, body).expect("writing test config");
    path
}

/// Contents of a file, empty if it does not exist.
pub fn read_or_empty(path: &Path) -> String {
    fs::read_to_string(path).unwrap_or_default()
}

/// Path of `name` inside `dir`, as a string for use in commands.
pub fn path_str(dir: &Path, name: &str) -> String {
    dir.join(name).display().to_string()
}
