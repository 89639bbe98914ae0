// src/ipc/message.rs

//! Wire format between task processes and the controller.
//!
//! One JSON object per line, one message per connection:
//!
//! ```json
//! {"token":"6f1c...","task":"[0002/0004] gcc/build","kind":"failed",
//!  "command":"make -C gcc","log":"/logs/0002-gcc-build-log.txt"}
//! ```

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::errors::Result;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusMessage {
    /// Per-build token; messages from other builds are ignored.
    pub token: String,
    /// Task description, e.g. `[0002/0004] gcc/build`.
    pub task: String,
    #[serde(flatten)]
    pub kind: StatusKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StatusKind {
    Started,
    Finished,
    Failed { command: String, log: PathBuf },
}

impl StatusMessage {
    pub fn new(token: impl Into<String>, task: impl Into<String>, kind: StatusKind) -> Self {
        Self {
            token: token.into(),
            task: task.into(),
            kind,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self.kind, StatusKind::Failed { .. })
    }

    /// Encode as a single newline-terminated line.
    pub fn to_line(&self) -> Result<String> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }

    pub fn from_line(line: &str) -> Result<Self> {
        Ok(serde_json::from_str(line.trim_end())?)
    }
}
