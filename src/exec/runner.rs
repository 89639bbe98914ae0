// src/exec/runner.rs

//! Command runner: executes one command of a task, logging to the task log
//! and escalating failure.

use std::path::Path;
use std::process::Stdio;

use tokio::process::Command as ProcessCommand;
use tracing::{debug, info, warn};

use crate::dag::{Command, TaskEnv};
use crate::errors::Result;
use crate::failure::FailureMarker;
use crate::ipc::{StatusKind, StatusMessage, StatusSink};

use super::logfile::TaskLog;

/// What happened to one command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    Success,
    /// Exited with a non-zero code.
    Exited(i32),
    /// Killed by a signal or otherwise ended without a code.
    Terminated,
    /// Could not be started (missing working directory, spawn failure).
    NotStarted(String),
}

impl CommandOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, CommandOutcome::Success)
    }

    fn describe(&self) -> String {
        match self {
            CommandOutcome::Success => "exit status: 0".to_string(),
            CommandOutcome::Exited(code) => format!("exit status: {code}"),
            CommandOutcome::Terminated => "terminated without exit status".to_string(),
            CommandOutcome::NotStarted(reason) => format!("not started: {reason}"),
        }
    }
}

/// Identity of the task a command belongs to, for escalation.
#[derive(Debug, Clone)]
pub struct TaskIdentity<'a> {
    /// Task description as shown to the operator.
    pub task: &'a str,
    pub token: &'a str,
}

/// Run `command` in `workdir` with `env` added to the inherited
/// environment, appending everything to `log`.
///
/// A command that fails for any reason raises the failure marker and
/// notifies the controller before this returns. The returned error is
/// reserved for infrastructure problems: the marker could not be raised or
/// the controller could not be told.
pub async fn run_command(
    command: &Command,
    workdir: &Path,
    env: &TaskEnv,
    log: &mut TaskLog,
    marker: &FailureMarker,
    sink: &dyn StatusSink,
    id: &TaskIdentity<'_>,
) -> Result<CommandOutcome> {
    let outcome = match execute(command, workdir, env, log).await {
        Ok(outcome) => outcome,
        // Log unwritable: still a failure of this command.
        Err(e) => CommandOutcome::NotStarted(format!("task log unusable: {e}")),
    };

    if outcome.is_success() {
        debug!(task = %id.task, command = %command, "command succeeded");
        return Ok(outcome);
    }

    warn!(task = %id.task, command = %command, outcome = %outcome.describe(), "command failed");
    escalate(&command.to_string(), log.path(), marker, sink, id).await?;
    Ok(outcome)
}

async fn execute(
    command: &Command,
    workdir: &Path,
    env: &TaskEnv,
    log: &mut TaskLog,
) -> std::io::Result<CommandOutcome> {
    log.banner("start")?;
    log.line(&format!("command: {command}"))?;
    log.line(&format!("directory: {}", workdir.display()))?;
    for (var, value) in env.iter() {
        log.line(&format!("env: {var}={value}"))?;
    }

    let outcome = if !workdir.is_dir() {
        CommandOutcome::NotStarted(format!(
            "cannot change to directory {}",
            workdir.display()
        ))
    } else {
        spawn_and_wait(command, workdir, env, log).await
    };

    log.line(&outcome.describe())?;
    log.banner("end")?;
    Ok(outcome)
}

async fn spawn_and_wait(
    command: &Command,
    workdir: &Path,
    env: &TaskEnv,
    log: &TaskLog,
) -> CommandOutcome {
    let (stdout, stderr) = match (log.try_clone_file(), log.try_clone_file()) {
        (Ok(out), Ok(err)) => (out, err),
        (Err(e), _) | (_, Err(e)) => {
            return CommandOutcome::NotStarted(format!("cannot attach task log: {e}"));
        }
    };

    info!(command = %command, cwd = %workdir.display(), "running command");

    let child = ProcessCommand::new(&command.program)
        .args(&command.args)
        .current_dir(workdir)
        .envs(env)
        .stdin(Stdio::null())
        .stdout(Stdio::from(stdout))
        .stderr(Stdio::from(stderr))
        .kill_on_drop(true)
        .spawn();

    let mut child = match child {
        Ok(c) => c,
        Err(e) => return CommandOutcome::NotStarted(format!("spawning {}: {e}", command.program)),
    };

    match child.wait().await {
        Ok(status) if status.success() => CommandOutcome::Success,
        Ok(status) => match status.code() {
            Some(code) => CommandOutcome::Exited(code),
            None => CommandOutcome::Terminated,
        },
        Err(e) => CommandOutcome::NotStarted(format!("waiting for {}: {e}", command.program)),
    }
}

/// Raise the marker, then tell the controller. Both must succeed.
pub(crate) async fn escalate(
    command: &str,
    log: &Path,
    marker: &FailureMarker,
    sink: &dyn StatusSink,
    id: &TaskIdentity<'_>,
) -> Result<()> {
    marker.raise()?;
    let msg = StatusMessage::new(
        id.token,
        id.task,
        StatusKind::Failed {
            command: command.to_string(),
            log: log.to_path_buf(),
        },
    );
    sink.send(msg).await
}
