// src/exec/shim.rs

//! Task execution shim.
//!
//! Every task runs through the same sequence: skip if the build already
//! failed, rotate and open the log, prepare its directories, run the
//! commands in order (re-checking the failure marker before each), then
//! close the log. The sequence is
//! available in-process as [`TaskShim::run`] and split at process
//! boundaries as [`start_task`], [`run_command`] and [`end_task`], which is
//! how the generated makefile drives it.
//!
//! Command and directory failures never become an error here: they are
//! turned into the failure marker plus a notification, and the shim
//! completes normally.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::dag::{Command, DirAction, Task, TaskEnv};
use crate::errors::Result;
use crate::failure::FailureMarker;
use crate::ipc::{StatusKind, StatusMessage, StatusSink};

use super::logfile::{rotate_log, TaskLog};
use super::runner::{self, CommandOutcome, TaskIdentity};

/// What one task invocation needs to know.
#[derive(Debug, Clone)]
pub struct TaskContext {
    /// Task description, e.g. `[0002/0004] gcc/build`.
    pub task: String,
    pub log: PathBuf,
    pub marker: FailureMarker,
    pub token: String,
}

impl TaskContext {
    fn identity(&self) -> TaskIdentity<'_> {
        TaskIdentity {
            task: &self.task,
            token: &self.token,
        }
    }
}

/// Result of a shim phase or a whole task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShimOutcome {
    /// The build had already failed; nothing was run.
    Skipped,
    Succeeded,
    /// A command failed and was escalated.
    Failed,
}

/// Start phase: check the marker, rotate the old log, open a fresh one,
/// then prepare `dirs` in order.
///
/// A directory that cannot be prepared fails the task like a failing
/// command would.
pub async fn start_task(
    ctx: &TaskContext,
    dirs: &[DirAction],
    sink: &dyn StatusSink,
) -> Result<ShimOutcome> {
    if ctx.marker.check() {
        info!(task = %ctx.task, "build already failed; skipping task");
        return Ok(ShimOutcome::Skipped);
    }

    rotate_log(&ctx.log)?;
    let mut log = TaskLog::open(&ctx.log)?;
    log.line(&format!("task: {}", ctx.task))?;
    log.banner("starting task")?;

    announce(ctx, sink, StatusKind::Started).await;

    for dir in dirs {
        log.line(&format!("directory setup: {dir}"))?;
        if let Err(e) = prepare_dir(dir) {
            warn!(
                task = %ctx.task,
                dir = %dir.path().display(),
                error = %e,
                "directory setup failed"
            );
            log.line(&format!("directory setup failed: {e}"))?;
            log.banner("task failed")?;
            runner::escalate(&dir.to_string(), &ctx.log, &ctx.marker, sink, &ctx.identity())
                .await?;
            return Ok(ShimOutcome::Failed);
        }
    }
    Ok(ShimOutcome::Succeeded)
}

fn prepare_dir(dir: &DirAction) -> std::io::Result<()> {
    match dir {
        DirAction::Create(path) => fs::create_dir_all(path),
        DirAction::Empty(path) => {
            match fs::remove_dir_all(path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e),
            }
            fs::create_dir_all(path)
        }
    }
}

/// Run one command of a task that has already been started.
pub async fn run_command(
    ctx: &TaskContext,
    command: &Command,
    workdir: &Path,
    env: &TaskEnv,
    sink: &dyn StatusSink,
) -> Result<ShimOutcome> {
    if ctx.marker.check() {
        debug!(task = %ctx.task, command = %command, "build already failed; not running command");
        return Ok(ShimOutcome::Skipped);
    }

    let mut log = TaskLog::open(&ctx.log)?;
    let outcome = runner::run_command(
        command,
        workdir,
        env,
        &mut log,
        &ctx.marker,
        sink,
        &ctx.identity(),
    )
    .await?;

    Ok(match outcome {
        CommandOutcome::Success => ShimOutcome::Succeeded,
        _ => ShimOutcome::Failed,
    })
}

/// End phase: close the log with a completion banner.
pub async fn end_task(ctx: &TaskContext, sink: &dyn StatusSink) -> Result<ShimOutcome> {
    if ctx.marker.check() {
        if ctx.log.exists() {
            let mut log = TaskLog::open(&ctx.log)?;
            log.banner("task abandoned, build failed")?;
        }
        return Ok(ShimOutcome::Skipped);
    }

    let mut log = TaskLog::open(&ctx.log)?;
    log.banner("task complete")?;
    announce(ctx, sink, StatusKind::Finished).await;
    Ok(ShimOutcome::Succeeded)
}

/// Progress messages are informational; losing one is not a failure.
async fn announce(ctx: &TaskContext, sink: &dyn StatusSink, kind: StatusKind) {
    let msg = StatusMessage::new(&ctx.token, &ctx.task, kind);
    if let Err(e) = sink.send(msg).await {
        warn!(task = %ctx.task, error = %e, "could not send progress message");
    }
}

/// Runs whole tasks in-process.
pub struct TaskShim<'s> {
    sink: &'s dyn StatusSink,
}

impl<'s> TaskShim<'s> {
    pub fn new(sink: &'s dyn StatusSink) -> Self {
        Self { sink }
    }

    /// Run every command of a task in sequence.
    ///
    /// Stops after the first failing command, and before any command if
    /// another task has failed meanwhile.
    pub async fn run(&self, ctx: &TaskContext, task: &Task) -> Result<ShimOutcome> {
        match start_task(ctx, &task.dirs, self.sink).await? {
            ShimOutcome::Succeeded => {}
            other => return Ok(other),
        }

        for command in task.commands.iter() {
            match run_command(ctx, command, &task.workdir, &task.env, self.sink).await? {
                ShimOutcome::Succeeded => {}
                ShimOutcome::Failed => {
                    let mut log = TaskLog::open(&ctx.log)?;
                    log.banner("task failed")?;
                    return Ok(ShimOutcome::Failed);
                }
                ShimOutcome::Skipped => {
                    end_task(ctx, self.sink).await?;
                    return Ok(ShimOutcome::Skipped);
                }
            }
        }

        end_task(ctx, self.sink).await
    }
}
