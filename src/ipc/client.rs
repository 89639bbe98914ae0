// src/ipc/client.rs

//! Sending side of the notification channel.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::time::Duration;

use anyhow::{anyhow, Context};
use tokio::io::AsyncWriteExt;
use tokio::net::UnixStream;
use tracing::debug;

use crate::errors::Result;

use super::message::StatusMessage;

/// Upper bound on connect + write for one notification.
pub const NOTIFY_TIMEOUT: Duration = Duration::from_secs(10);

/// Where task-side code sends status messages.
///
/// Production code uses [`SocketNotifier`]; tests can record messages
/// instead of talking to a controller.
pub trait StatusSink: Send + Sync {
    fn send(&self, msg: StatusMessage) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;
}

/// Delivers messages to the controller's Unix socket.
#[derive(Debug, Clone)]
pub struct SocketNotifier {
    socket: PathBuf,
}

impl SocketNotifier {
    pub fn new(socket: impl Into<PathBuf>) -> Self {
        Self {
            socket: socket.into(),
        }
    }

    pub fn socket(&self) -> &Path {
        &self.socket
    }
}

impl StatusSink for SocketNotifier {
    fn send(&self, msg: StatusMessage) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(notify(&self.socket, msg))
    }
}

/// Send one message to the controller listening on `socket`.
///
/// Single attempt, no retry. Fails if the socket cannot be reached or the
/// write does not complete within [`NOTIFY_TIMEOUT`].
pub async fn notify(socket: &Path, msg: StatusMessage) -> Result<()> {
    let line = msg.to_line()?;

    let send = async {
        let mut stream = UnixStream::connect(socket)
            .await
            .with_context(|| format!("connecting to controller at {}", socket.display()))?;
        stream
            .write_all(line.as_bytes())
            .await
            .context("writing status message")?;
        stream.shutdown().await.context("closing status connection")?;
        anyhow::Ok(())
    };

    tokio::time::timeout(NOTIFY_TIMEOUT, send)
        .await
        .map_err(|_| {
            anyhow!(
                "timed out after {}s notifying controller at {}",
                NOTIFY_TIMEOUT.as_secs(),
                socket.display()
            )
        })??;

    debug!(task = %msg.task, socket = %socket.display(), "status message delivered");
    Ok(())
}
