// src/engine/mod.rs

//! Build orchestration.
//!
//! The [`controller`] takes a resolved configuration and builds the task
//! graph. It owns the notification listener for the duration of the build
//! and turns the scheduler's exit, the received notifications and the
//! failure marker into a single verdict.

/// Canonical task name type used throughout the crate (`component/step`).
pub type TaskName = String;

pub mod controller;

pub use controller::{BuildVerdict, Controller};
