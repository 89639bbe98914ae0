// src/failure.rs

//! Global failure state.
//!
//! The marker is a file in the top-level build directory. Its presence is the
//! build-wide "some task has failed" signal, visible to every independently
//! started task process without any connection to the controller.

use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

/// File name of the marker inside the build directory.
pub const FAILURE_MARKER_NAME: &str = "build-failed";

/// Handle to the failure marker of one build directory.
///
/// Cheap to clone; holds only the path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureMarker {
    path: PathBuf,
}

impl FailureMarker {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Marker for the build rooted at `build_dir`.
    pub fn in_build_dir(build_dir: &Path) -> Self {
        Self::new(build_dir.join(FAILURE_MARKER_NAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether some task has already failed.
    ///
    /// A marker raised concurrently may not be visible yet; callers accept
    /// that at most the work of one more task proceeds.
    pub fn check(&self) -> bool {
        self.path.exists()
    }

    /// Create the marker if it does not exist.
    ///
    /// Idempotent and safe under concurrent callers: this is "create if
    /// missing", never "create exclusively", so losing a race is not an error.
    pub fn raise(&self) -> io::Result<()> {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        debug!(marker = %self.path.display(), "failure marker raised");
        Ok(())
    }

    /// Remove the marker at the start of a fresh build.
    pub fn clear(&self) -> io::Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => {
                warn!(
                    marker = %self.path.display(),
                    "removed failure marker left by a previous build"
                );
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }
}
