// src/cli.rs

//! CLI argument parsing using `clap`.
//!
//! `relbuild build` is the operator-facing command. The remaining
//! subcommands are invoked by the generated makefile for every task and
//! are hidden from `--help`.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// Command-line arguments for `relbuild`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "relbuild",
    version,
    about = "Build multi-component releases from a declarative release configuration.",
    long_about = None
)]
pub struct CliArgs {
    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `RELBUILD_LOG` or a default level will be used.
    #[arg(long, global = true, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Clone, Subcommand)]
pub enum CliCommand {
    /// Evaluate the release configuration and build every active component.
    Build(BuildArgs),

    /// Begin a task: skip if the build failed, rotate and open the log,
    /// prepare directories.
    #[command(hide = true)]
    StartTask(StartTaskArgs),

    /// Run one command of a task.
    #[command(hide = true)]
    RunCommand(RunCommandArgs),

    /// Finish a task.
    #[command(hide = true)]
    EndTask(ShimArgs),

    /// Report a task failure to a running controller.
    Notify(NotifyArgs),
}

#[derive(Debug, Clone, Args)]
pub struct BuildArgs {
    /// Path to the release configuration (TOML).
    #[arg(long, value_name = "PATH", default_value = "relbuild.toml")]
    pub config: PathBuf,

    /// Number of tasks the scheduler may run at once.
    ///
    /// Default: `release.parallelism`, else the available parallelism.
    #[arg(short = 'j', long, value_name = "N")]
    pub parallelism: Option<usize>,

    /// Override a variable, e.g. `--set with_gdb=false`. Repeatable.
    #[arg(long = "set", value_name = "NAME=VALUE")]
    pub overrides: Vec<String>,

    /// Resolve and print the configuration and task graph, run nothing.
    #[arg(long)]
    pub dry_run: bool,

    /// GNU make executable used as the scheduler.
    #[arg(long, value_name = "PROGRAM", default_value = "make")]
    pub make: String,
}

/// Arguments shared by every shim phase.
#[derive(Debug, Clone, Args)]
pub struct ShimArgs {
    #[arg(long, value_name = "DIR")]
    pub build_dir: PathBuf,

    #[arg(long, value_name = "PATH")]
    pub log: PathBuf,

    #[arg(long, value_name = "PATH")]
    pub socket: PathBuf,

    #[arg(long)]
    pub token: String,

    #[arg(long, value_name = "DESCRIPTION")]
    pub task: String,
}

#[derive(Debug, Clone, Args)]
pub struct StartTaskArgs {
    #[command(flatten)]
    pub shim: ShimArgs,

    /// Remove and recreate a directory. Repeatable; done before `--mkdir`.
    #[arg(long = "empty-dir", value_name = "DIR")]
    pub empty_dirs: Vec<PathBuf>,

    /// Create a directory and its parents. Repeatable.
    #[arg(long = "mkdir", value_name = "DIR")]
    pub create_dirs: Vec<PathBuf>,
}

#[derive(Debug, Clone, Args)]
pub struct RunCommandArgs {
    #[command(flatten)]
    pub shim: ShimArgs,

    /// Set an environment variable for the command. Repeatable.
    #[arg(long = "env", value_name = "NAME=VALUE", value_parser = parse_env_pair)]
    pub env: Vec<(String, String)>,

    /// Working directory of the command.
    #[arg(long, value_name = "DIR")]
    pub cwd: PathBuf,

    /// Program and arguments.
    #[arg(last = true, required = true, value_name = "COMMAND")]
    pub command: Vec<String>,
}

#[derive(Debug, Clone, Args)]
pub struct NotifyArgs {
    #[arg(long, value_name = "PATH")]
    pub socket: PathBuf,

    #[arg(long)]
    pub token: String,

    #[arg(long, value_name = "DESCRIPTION")]
    pub task: String,

    /// The command that failed.
    #[arg(long)]
    pub command: Option<String>,

    /// Log of the failed task.
    #[arg(long, value_name = "PATH")]
    pub log: Option<PathBuf>,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

fn parse_env_pair(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((name, value)) if !name.is_empty() => Ok((name.to_string(), value.to_string())),
        _ => Err(format!("expected NAME=VALUE, got '{raw}'")),
    }
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
