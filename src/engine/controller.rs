// src/engine/controller.rs

use anyhow::Context;
use tracing::{error, info};
use uuid::Uuid;

use crate::config::ReleaseConfig;
use crate::dag::{self, TaskGraph};
use crate::errors::Result;
use crate::exec::{BuildPlan, SchedulerBackend, SchedulerExit};
use crate::ipc::{FailureReport, StatusServer};
use crate::layout::BuildLayout;

/// Outcome of one build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildVerdict {
    pub scheduler: SchedulerExit,
    /// At least one task reported a failure over the socket.
    pub notified_failure: bool,
    /// The failure marker exists after the scheduler exited.
    pub marker_present: bool,
    pub failures: Vec<FailureReport>,
}

impl BuildVerdict {
    /// Success requires all three signals to agree.
    pub fn success(&self) -> bool {
        self.scheduler.success && !self.notified_failure && !self.marker_present
    }

    pub fn exit_code(&self) -> i32 {
        if self.success() { 0 } else { 1 }
    }
}

/// Owns one build invocation: the task graph, the notification socket and
/// the final verdict.
#[derive(Debug)]
pub struct Controller {
    config: ReleaseConfig,
    layout: BuildLayout,
    graph: TaskGraph,
    token: String,
}

impl Controller {
    /// Build the task graph for an already resolved configuration.
    pub fn new(config: ReleaseConfig) -> Result<Self> {
        let layout = BuildLayout::from_config(&config);
        let graph = dag::build(&config, &layout)?;
        Ok(Self {
            config,
            layout,
            graph,
            token: Uuid::new_v4().to_string(),
        })
    }

    pub fn config(&self) -> &ReleaseConfig {
        &self.config
    }

    pub fn layout(&self) -> &BuildLayout {
        &self.layout
    }

    pub fn graph(&self) -> &TaskGraph {
        &self.graph
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    /// Run the build to completion with the given scheduler.
    ///
    /// Errors are infrastructure problems (directories, socket, scheduler
    /// not startable). Task failures are reported through the verdict.
    pub async fn run_build<B: SchedulerBackend>(&self, backend: &mut B) -> Result<BuildVerdict> {
        self.layout.prepare()?;

        let socket_dir = tempfile::Builder::new()
            .prefix("relbuild-")
            .tempdir()
            .context("creating socket directory")?;
        let socket = socket_dir.path().join("server");

        let server = StatusServer::bind(&socket, self.token.clone())?.start();
        info!(
            release = %self.config.name(),
            build = %self.token,
            tasks = self.graph.len(),
            socket = %socket.display(),
            "build started"
        );

        let plan = BuildPlan {
            graph: &self.graph,
            layout: &self.layout,
            socket: &socket,
            token: &self.token,
        };
        let scheduled = backend.run(plan).await;

        // Stop the listener whatever the scheduler did, so queued reports
        // are still printed.
        let status = server.stop().await;
        let scheduler = scheduled?;

        let verdict = BuildVerdict {
            scheduler,
            notified_failure: status.has_failed(),
            marker_present: self.layout.marker().check(),
            failures: status.failures(),
        };

        if verdict.success() {
            info!(build = %self.token, "build succeeded");
        } else {
            error!(
                build = %self.token,
                scheduler_ok = verdict.scheduler.success,
                notified_failure = verdict.notified_failure,
                marker_present = verdict.marker_present,
                failed_tasks = verdict.failures.len(),
                "build failed"
            );
        }

        drop(socket_dir);
        Ok(verdict)
    }
}
