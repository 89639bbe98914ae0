// src/dag/mod.rs

//! Task graph.
//!
//! - [`graph`] turns a resolved release configuration into an immutable DAG
//!   of numbered tasks.
//! - [`makefile`] renders that DAG as input for the external scheduler.

pub mod graph;
pub mod makefile;

pub use graph::{build, Command, DirAction, Task, TaskEnv, TaskGraph};
pub use makefile::{render, ShimInvocation};
