// src/ipc/mod.rs

//! Task-to-controller notification channel over a Unix-domain socket.
//!
//! - [`message`] defines the JSON-line wire format.
//! - [`client`] sends one message per connection with a bounded timeout.
//! - [`server`] accepts connections concurrently and aggregates failures.

pub mod client;
pub mod message;
pub mod server;

pub use client::{notify, SocketNotifier, StatusSink};
pub use message::{StatusKind, StatusMessage};
pub use server::{render_failure_report, BuildStatus, FailureReport, ServerHandle, StatusServer};
