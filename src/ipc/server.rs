// src/ipc/server.rs

//! Receiving side of the notification channel, owned by the controller.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::oneshot;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::errors::Result;
use crate::exec::logfile::log_tail;

use super::message::{StatusKind, StatusMessage};

/// Lines of the failed task's log shown in the failure report.
pub const REPORT_TAIL_LINES: usize = 25;

/// How long the listener keeps accepting after shutdown is requested,
/// to pick up connections that raced with the scheduler's exit.
const DRAIN_GRACE: Duration = Duration::from_millis(200);

/// One failure reported by a task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureReport {
    pub task: String,
    pub command: String,
    pub log: PathBuf,
}

/// Aggregate state shared between connection handlers.
#[derive(Debug, Default)]
pub struct BuildStatus {
    failed: AtomicBool,
    failures: Mutex<Vec<FailureReport>>,
}

impl BuildStatus {
    /// Whether any failure notification arrived. Never goes back to false.
    pub fn has_failed(&self) -> bool {
        self.failed.load(Ordering::SeqCst)
    }

    pub fn failures(&self) -> Vec<FailureReport> {
        self.failures
            .lock()
            .map(|f| f.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    fn record(&self, report: FailureReport) {
        self.failed.store(true, Ordering::SeqCst);
        match self.failures.lock() {
            Ok(mut f) => f.push(report),
            Err(poisoned) => poisoned.into_inner().push(report),
        }
    }
}

/// Bound but not yet accepting.
#[derive(Debug)]
pub struct StatusServer {
    listener: UnixListener,
    socket: PathBuf,
    token: String,
    status: Arc<BuildStatus>,
}

/// Handle to a running listener.
#[derive(Debug)]
pub struct ServerHandle {
    shutdown: Option<oneshot::Sender<()>>,
    join: tokio::task::JoinHandle<()>,
    status: Arc<BuildStatus>,
}

impl StatusServer {
    /// Bind the socket. Must be called from within a tokio runtime.
    pub fn bind(socket: &Path, token: impl Into<String>) -> Result<Self> {
        let listener = UnixListener::bind(socket)
            .with_context(|| format!("binding status socket {}", socket.display()))?;
        debug!(socket = %socket.display(), "status socket bound");
        Ok(Self {
            listener,
            socket: socket.to_path_buf(),
            token: token.into(),
            status: Arc::new(BuildStatus::default()),
        })
    }

    pub fn socket(&self) -> &Path {
        &self.socket
    }

    pub fn status(&self) -> Arc<BuildStatus> {
        Arc::clone(&self.status)
    }

    /// Start accepting connections in a background task.
    pub fn start(self) -> ServerHandle {
        let (tx, rx) = oneshot::channel();
        let status = Arc::clone(&self.status);
        let join = tokio::spawn(accept_loop(self, rx));
        ServerHandle {
            shutdown: Some(tx),
            join,
            status,
        }
    }
}

impl ServerHandle {
    pub fn status(&self) -> Arc<BuildStatus> {
        Arc::clone(&self.status)
    }

    /// Stop accepting, drain pending connections and wait for every
    /// handler to finish.
    pub async fn stop(mut self) -> Arc<BuildStatus> {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Err(e) = self.join.await {
            warn!(error = %e, "status listener task ended abnormally");
        }
        self.status
    }
}

async fn accept_loop(server: StatusServer, mut shutdown: oneshot::Receiver<()>) {
    let StatusServer {
        listener,
        token,
        status,
        ..
    } = server;
    let token: Arc<str> = Arc::from(token);
    let mut handlers = JoinSet::new();

    loop {
        tokio::select! {
            biased;
            _ = &mut shutdown => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, _)) => {
                    handlers.spawn(handle_connection(stream, Arc::clone(&token), Arc::clone(&status)));
                }
                Err(e) => warn!(error = %e, "accepting status connection failed"),
            },
        }
    }

    // Connections already queued on the socket are still served.
    while let Ok(Ok((stream, _))) = tokio::time::timeout(DRAIN_GRACE, listener.accept()).await {
        handlers.spawn(handle_connection(stream, Arc::clone(&token), Arc::clone(&status)));
    }

    while let Some(res) = handlers.join_next().await {
        if let Err(e) = res {
            warn!(error = %e, "status connection handler panicked");
        }
    }
    debug!("status listener stopped");
}

async fn handle_connection(stream: UnixStream, token: Arc<str>, status: Arc<BuildStatus>) {
    let mut lines = BufReader::new(stream).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                warn!(error = %e, "reading status connection failed");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        match StatusMessage::from_line(&line) {
            Ok(msg) => dispatch(msg, &token, &status).await,
            Err(e) => warn!(error = %e, line = %line, "malformed status message ignored"),
        }
    }
}

async fn dispatch(msg: StatusMessage, token: &str, status: &BuildStatus) {
    if msg.token != token {
        warn!(task = %msg.task, "status message from another build ignored");
        return;
    }

    match msg.kind {
        StatusKind::Started => info!(task = %msg.task, "started"),
        StatusKind::Finished => info!(task = %msg.task, "finished"),
        StatusKind::Failed { command, log } => {
            warn!(task = %msg.task, command = %command, log = %log.display(), "task failed");
            let report = FailureReport {
                task: msg.task,
                command,
                log,
            };
            status.record(report.clone());

            // The log can be large; read its tail off the runtime threads.
            match tokio::task::spawn_blocking(move || render_failure_report(&report)).await {
                Ok(text) => eprint!("{text}"),
                Err(e) => warn!(error = %e, "rendering failure report failed"),
            }
        }
    }
}

/// Operator-facing report: task, command, log path and the last lines of
/// the log, each prefixed with `  | `.
pub fn render_failure_report(report: &FailureReport) -> String {
    let mut text = format!(
        "{} FAILED\n  command: {}\n  log: {}\n",
        report.task,
        report.command,
        report.log.display()
    );
    match log_tail(&report.log, REPORT_TAIL_LINES) {
        Ok(lines) => {
            for line in lines {
                text.push_str("  | ");
                text.push_str(&line);
                text.push('\n');
            }
        }
        Err(e) => text.push_str(&format!("  (log unreadable: {e})\n")),
    }
    text
}
