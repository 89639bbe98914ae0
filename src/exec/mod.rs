// src/exec/mod.rs

//! Process execution layer.
//!
//! - [`backend`] provides the `SchedulerBackend` trait and the production
//!   `MakeBackend`.
//! - [`shim`] wraps every task: skip-if-failed, log rotation, sequential
//!   commands.
//! - [`runner`] runs one command with its output going to the task log and
//!   escalates failures.
//! - [`logfile`] handles log rotation, banners and log tails.

pub mod backend;
pub mod logfile;
pub mod runner;
pub mod shim;

pub use backend::{BuildPlan, MakeBackend, SchedulerBackend, SchedulerExit};
pub use runner::CommandOutcome;
pub use shim::{ShimOutcome, TaskContext, TaskShim};
