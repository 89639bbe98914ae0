// src/exec/backend.rs

//! Pluggable scheduler backend.
//!
//! The controller hands the task graph to a `SchedulerBackend` and waits for
//! it to exit. The backend decides how tasks are launched; every task still
//! goes through the shim, which is where failures are detected.
//!
//! - [`MakeBackend`] writes a GNU makefile and runs `make -jN`.
//! - Tests provide their own backend that runs the shim in-process.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::process::Stdio;

use anyhow::Context;
use tokio::process::Command as ProcessCommand;
use tracing::{debug, info, warn};

use crate::dag::makefile::{render, ShimInvocation};
use crate::dag::TaskGraph;
use crate::errors::Result;
use crate::layout::BuildLayout;

/// Everything a backend needs for one build.
#[derive(Debug, Clone, Copy)]
pub struct BuildPlan<'a> {
    pub graph: &'a TaskGraph,
    pub layout: &'a BuildLayout,
    pub socket: &'a Path,
    pub token: &'a str,
}

/// How the scheduler process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerExit {
    pub success: bool,
    pub code: Option<i32>,
}

impl SchedulerExit {
    pub fn ok() -> Self {
        Self {
            success: true,
            code: Some(0),
        }
    }

    pub fn failed(code: Option<i32>) -> Self {
        Self {
            success: false,
            code,
        }
    }
}

/// Trait abstracting how the task graph is scheduled.
pub trait SchedulerBackend: Send {
    /// Run every task of the plan, respecting dependency edges, and return
    /// once all launched tasks have ended.
    fn run<'a>(
        &'a mut self,
        plan: BuildPlan<'a>,
    ) -> Pin<Box<dyn Future<Output = Result<SchedulerExit>> + Send + 'a>>;
}

/// Production backend: GNU make.
#[derive(Debug, Clone)]
pub struct MakeBackend {
    make: String,
    parallelism: usize,
    exe: PathBuf,
}

impl MakeBackend {
    /// `exe` is the `relbuild` binary the makefile re-invokes for every
    /// shim phase.
    pub fn new(make: impl Into<String>, parallelism: usize, exe: impl Into<PathBuf>) -> Self {
        Self {
            make: make.into(),
            parallelism: parallelism.max(1),
            exe: exe.into(),
        }
    }

    /// Backend re-invoking the currently running executable.
    pub fn for_current_exe(make: impl Into<String>, parallelism: usize) -> Result<Self> {
        let exe = std::env::current_exe().context("locating the relbuild executable")?;
        Ok(Self::new(make, parallelism, exe))
    }

    pub fn parallelism(&self) -> usize {
        self.parallelism
    }

    /// Write the makefile for `plan` and return its path.
    pub fn write_makefile(&self, plan: &BuildPlan<'_>) -> Result<PathBuf> {
        let inv = ShimInvocation {
            exe: self.exe.clone(),
            build_dir: plan.layout.build_dir().to_path_buf(),
            socket: plan.socket.to_path_buf(),
            token: plan.token.to_string(),
        };
        let text = render(plan.graph, &inv)?;
        let path = plan.layout.makefile_path();
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        std::fs::write(&path, text)?;
        debug!(makefile = %path.display(), "makefile written");
        Ok(path)
    }
}

impl SchedulerBackend for MakeBackend {
    fn run<'a>(
        &'a mut self,
        plan: BuildPlan<'a>,
    ) -> Pin<Box<dyn Future<Output = Result<SchedulerExit>> + Send + 'a>> {
        Box::pin(async move {
            let makefile = self.write_makefile(&plan)?;
            let control = plan.layout.control_dir();

            info!(
                make = %self.make,
                jobs = self.parallelism,
                tasks = plan.graph.len(),
                "starting scheduler"
            );

            let status = ProcessCommand::new(&self.make)
                .arg("-f")
                .arg(&makefile)
                .arg(format!("-j{}", self.parallelism))
                .current_dir(&control)
                .stdin(Stdio::null())
                .status()
                .await
                .with_context(|| format!("running {}", self.make))?;

            if status.success() {
                Ok(SchedulerExit::ok())
            } else {
                warn!(code = ?status.code(), "scheduler exited unsuccessfully");
                Ok(SchedulerExit::failed(status.code()))
            }
        })
    }
}
