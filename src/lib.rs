// src/lib.rs

pub mod cli;
pub mod config;
pub mod dag;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod failure;
pub mod ipc;
pub mod layout;
pub mod logging;
pub mod quote;
pub mod types;

use std::thread;

use anyhow::Result;
use tracing::debug;

use crate::cli::{
    BuildArgs, CliArgs, CliCommand, NotifyArgs, RunCommandArgs, ShimArgs, StartTaskArgs,
};
use crate::config::{apply_overrides, load_and_validate, resolve, ReleaseConfig};
use crate::dag::{Command, DirAction, TaskEnv, TaskGraph};
use crate::engine::Controller;
use crate::exec::shim::{self, TaskContext};
use crate::exec::MakeBackend;
use crate::failure::FailureMarker;
use crate::ipc::{notify, SocketNotifier, StatusKind, StatusMessage};

/// High-level entry point used by `main.rs`. Returns the process exit code.
///
/// Task shim phases always return 0 unless the shim itself could not do its
/// job (log unwritable, controller unreachable); command failures are
/// reported through the failure marker and the controller instead.
pub async fn run(args: CliArgs) -> Result<i32> {
    match args.command {
        CliCommand::Build(build) => run_build(build).await,
        CliCommand::StartTask(a) => start_task(a).await,
        CliCommand::RunCommand(a) => run_command(a).await,
        CliCommand::EndTask(a) => {
            let ctx = task_context(&a);
            shim::end_task(&ctx, &SocketNotifier::new(&a.socket)).await?;
            Ok(0)
        }
        CliCommand::Notify(a) => send_failure(a).await,
    }
}

async fn run_build(args: BuildArgs) -> Result<i32> {
    let mut file = load_and_validate(&args.config)?;
    apply_overrides(&mut file, &args.overrides)?;
    let cfg = resolve(&file)?;
    let controller = Controller::new(cfg)?;

    if args.dry_run {
        print_dry_run(controller.config(), controller.graph());
        return Ok(0);
    }

    let parallelism = args
        .parallelism
        .or(controller.config().parallelism())
        .unwrap_or_else(|| thread::available_parallelism().map_or(1, |n| n.get()));
    let mut backend = MakeBackend::for_current_exe(args.make, parallelism)?;

    let verdict = controller.run_build(&mut backend).await?;
    Ok(verdict.exit_code())
}

async fn start_task(args: StartTaskArgs) -> Result<i32> {
    let ctx = task_context(&args.shim);
    let dirs: Vec<DirAction> = args
        .empty_dirs
        .into_iter()
        .map(DirAction::Empty)
        .chain(args.create_dirs.into_iter().map(DirAction::Create))
        .collect();
    shim::start_task(&ctx, &dirs, &SocketNotifier::new(&args.shim.socket)).await?;
    Ok(0)
}

async fn run_command(args: RunCommandArgs) -> Result<i32> {
    let ctx = task_context(&args.shim);
    let command = Command::from_argv(&args.command)
        .ok_or_else(|| anyhow::anyhow!("run-command needs a command after `--`"))?;
    let env: TaskEnv = args.env.into_iter().collect();
    let sink = SocketNotifier::new(&args.shim.socket);
    shim::run_command(&ctx, &command, &args.cwd, &env, &sink).await?;
    Ok(0)
}

async fn send_failure(args: NotifyArgs) -> Result<i32> {
    let msg = StatusMessage::new(
        args.token,
        args.task,
        StatusKind::Failed {
            command: args.command.unwrap_or_default(),
            log: args.log.unwrap_or_default(),
        },
    );
    notify(&args.socket, msg).await?;
    Ok(0)
}

fn task_context(args: &ShimArgs) -> TaskContext {
    TaskContext {
        task: args.task.clone(),
        log: args.log.clone(),
        marker: FailureMarker::in_build_dir(&args.build_dir),
        token: args.token.clone(),
    }
}

/// Simple dry-run output: resolved variables, then tasks with their
/// dependencies and commands.
pub fn print_dry_run(cfg: &ReleaseConfig, graph: &TaskGraph) {
    println!("relbuild dry-run: {}", cfg.name());
    println!("  build_dir = {}", cfg.build_dir().display());
    println!("  log_dir = {}", cfg.log_dir().display());
    println!();

    println!("variables ({}):", cfg.len());
    for (name, value) in cfg.vars() {
        println!("  {name} = {value}");
    }
    println!();

    println!("components:");
    for comp in cfg.components() {
        let state = if comp.active { "active" } else { "inactive" };
        println!("  - {} ({state})", comp.name);
    }
    println!();

    println!("tasks ({}):", graph.len());
    for task in graph.tasks() {
        println!("  {}", graph.describe(task));
        println!("      cwd: {}", task.workdir.display());
        if !task.deps.is_empty() {
            println!("      after: {:?}", task.deps);
        }
        for (var, value) in task.env.iter() {
            println!("      env: {var}={value}");
        }
        for dir in task.dirs.iter() {
            println!("      setup: {dir}");
        }
        for command in task.commands.iter() {
            println!("      $ {command}");
        }
        println!("      log: {}", task.log.display());
    }

    debug!("dry-run complete (no execution)");
}
