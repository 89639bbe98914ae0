// src/layout.rs

//! Well-known paths of one build.
//!
//! ```text
//! <build_dir>/build-failed       failure marker
//! <build_dir>/build/GNUmakefile  scheduler input
//! <build_dir>/obj/<component>    default per-component object dir
//! <log_dir>/NNNN-<comp>-<step>-log.txt
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::ReleaseConfig;
use crate::errors::Result;
use crate::failure::FailureMarker;

#[derive(Debug, Clone)]
pub struct BuildLayout {
    build_dir: PathBuf,
    log_dir: PathBuf,
}

impl BuildLayout {
    pub fn new(build_dir: impl Into<PathBuf>, log_dir: impl Into<PathBuf>) -> Self {
        Self {
            build_dir: build_dir.into(),
            log_dir: log_dir.into(),
        }
    }

    pub fn from_config(cfg: &ReleaseConfig) -> Self {
        Self::new(cfg.build_dir(), cfg.log_dir())
    }

    pub fn build_dir(&self) -> &Path {
        &self.build_dir
    }

    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }

    /// Directory holding files that drive the build (the makefile), as
    /// opposed to files produced by building components.
    pub fn control_dir(&self) -> PathBuf {
        self.build_dir.join("build")
    }

    pub fn makefile_path(&self) -> PathBuf {
        self.control_dir().join("GNUmakefile")
    }

    /// Parent of every per-component object directory.
    pub fn obj_root(&self) -> PathBuf {
        self.build_dir.join("obj")
    }

    pub fn objdir(&self, component: &str) -> PathBuf {
        self.obj_root().join(component)
    }

    pub fn marker(&self) -> FailureMarker {
        FailureMarker::in_build_dir(&self.build_dir)
    }

    /// Log file for a task, e.g. `0003-gcc-configure-log.txt`.
    pub fn task_log(&self, number: usize, task_id: &str) -> PathBuf {
        self.log_dir
            .join(format!("{:04}-{}-log.txt", number, task_id.replace('/', "-")))
    }

    /// Prepare directories for a fresh build.
    ///
    /// Recreates the control directory and clears any failure marker left
    /// by a previous invocation. Logs and object directories are kept; task
    /// logs are rotated by the tasks themselves.
    pub fn prepare(&self) -> Result<()> {
        fs::create_dir_all(&self.build_dir)?;
        fs::create_dir_all(&self.log_dir)?;

        let control = self.control_dir();
        if control.exists() {
            fs::remove_dir_all(&control)?;
        }
        fs::create_dir_all(&control)?;

        self.marker().clear()?;
        Ok(())
    }
}
