// tests/task_shim.rs

mod common;

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use relbuild::dag::{Command, DirAction, Task, TaskEnv};
use relbuild::exec::shim::{self, ShimOutcome, TaskContext, TaskShim};
use relbuild::failure::FailureMarker;
use relbuild::ipc::StatusKind;
use relbuild_test_utils::backends::RecordingSink;

use common::{init_tracing, path_str, scratch_dir, TestResult};

fn context(dir: &Path, name: &str) -> TaskContext {
    TaskContext {
        task: format!("[0001/0002] demo/{name}"),
        log: dir.join("logs").join(format!("0001-demo-{name}-log.txt")),
        marker: FailureMarker::in_build_dir(dir),
        token: "token-1".to_string(),
    }
}

const NO_ENV: TaskEnv = TaskEnv::new();

fn task_in(dir: &Path, commands: &[Command]) -> Task {
    Task {
        id: "demo/build".to_string(),
        number: 1,
        workdir: dir.to_path_buf(),
        env: TaskEnv::new(),
        dirs: Vec::new(),
        commands: commands.to_vec(),
        deps: BTreeSet::new(),
        log: dir.join("logs").join("0001-demo-build-log.txt"),
    }
}

fn touch(dir: &Path, name: &str) -> Command {
    Command::new("touch", [path_str(dir, name)])
}

#[tokio::test]
async fn marker_set_means_nothing_runs() -> TestResult {
    init_tracing();
    let dir = scratch_dir();
    let ctx = context(dir.path(), "build");
    ctx.marker.raise()?;
    let sink = RecordingSink::new();

    let outcome = TaskShim::new(&sink)
        .run(&ctx, &task_in(dir.path(), &[touch(dir.path(), "ran")]))
        .await?;

    assert_eq!(outcome, ShimOutcome::Skipped);
    assert!(!dir.path().join("ran").exists());
    assert!(!ctx.log.exists());
    assert!(sink.messages().is_empty());
    Ok(())
}

#[tokio::test]
async fn commands_run_in_order_and_progress_is_reported() -> TestResult {
    init_tracing();
    let dir = scratch_dir();
    let ctx = context(dir.path(), "build");
    let sink = RecordingSink::new();
    let order = path_str(dir.path(), "order");

    let commands = [
        Command::new("sh", ["-c".to_string(), format!("echo one >> {order}")]),
        Command::new("sh", ["-c".to_string(), format!("echo two >> {order}")]),
    ];
    let outcome = TaskShim::new(&sink).run(&ctx, &task_in(dir.path(), &commands)).await?;

    assert_eq!(outcome, ShimOutcome::Succeeded);
    assert_eq!(fs::read_to_string(dir.path().join("order"))?, "one\ntwo\n");

    let kinds: Vec<StatusKind> = sink.messages().into_iter().map(|m| m.kind).collect();
    assert_eq!(kinds, vec![StatusKind::Started, StatusKind::Finished]);

    let text = fs::read_to_string(&ctx.log)?;
    assert!(text.contains("starting task"));
    assert!(text.contains("task complete"));
    Ok(())
}

#[tokio::test]
async fn first_failure_stops_the_task() -> TestResult {
    init_tracing();
    let dir = scratch_dir();
    let ctx = context(dir.path(), "build");
    let sink = RecordingSink::new();

    let commands = [
        Command::new("false", Vec::<String>::new()),
        touch(dir.path(), "after-failure"),
    ];
    let outcome = TaskShim::new(&sink).run(&ctx, &task_in(dir.path(), &commands)).await?;

    assert_eq!(outcome, ShimOutcome::Failed);
    assert!(ctx.marker.check());
    assert!(!dir.path().join("after-failure").exists());
    assert_eq!(sink.failures().len(), 1);
    Ok(())
}

#[tokio::test]
async fn rerun_rotates_previous_log() -> TestResult {
    init_tracing();
    let dir = scratch_dir();
    let ctx = context(dir.path(), "build");
    let sink = RecordingSink::new();
    let shim = TaskShim::new(&sink);

    shim.run(&ctx, &task_in(dir.path(), &[Command::new("echo", ["first"])])).await?;
    shim.run(&ctx, &task_in(dir.path(), &[Command::new("echo", ["second"])])).await?;

    let mut rotated = ctx.log.as_os_str().to_owned();
    rotated.push(".0");
    assert!(fs::read_to_string(&rotated)?.contains("first"));
    let current = fs::read_to_string(&ctx.log)?;
    assert!(current.contains("second"));
    assert!(!current.contains("first"));
    Ok(())
}

#[tokio::test]
async fn marker_raised_mid_task_skips_remaining_commands() -> TestResult {
    init_tracing();
    let dir = scratch_dir();
    let ctx = context(dir.path(), "build");
    let sink = RecordingSink::new();

    // The first command stands in for another task failing meanwhile.
    let commands = [
        Command::new("touch", [ctx.marker.path().display().to_string()]),
        touch(dir.path(), "second"),
    ];
    let outcome = TaskShim::new(&sink).run(&ctx, &task_in(dir.path(), &commands)).await?;

    assert_eq!(outcome, ShimOutcome::Skipped);
    assert!(!dir.path().join("second").exists());
    assert!(sink.failures().is_empty());
    Ok(())
}

#[tokio::test]
async fn split_phases_match_in_process_run() -> TestResult {
    init_tracing();
    let dir = scratch_dir();
    let ctx = context(dir.path(), "install");
    let sink = RecordingSink::new();

    let failing = Command::new("false", Vec::<String>::new());

    assert_eq!(shim::start_task(&ctx, &[], &sink).await?, ShimOutcome::Succeeded);
    assert_eq!(
        shim::run_command(&ctx, &touch(dir.path(), "a"), dir.path(), &NO_ENV, &sink).await?,
        ShimOutcome::Succeeded
    );
    assert_eq!(
        shim::run_command(&ctx, &failing, dir.path(), &NO_ENV, &sink).await?,
        ShimOutcome::Failed
    );
    // Later commands of the same task see the marker.
    assert_eq!(
        shim::run_command(&ctx, &touch(dir.path(), "b"), dir.path(), &NO_ENV, &sink).await?,
        ShimOutcome::Skipped
    );
    assert_eq!(shim::end_task(&ctx, &sink).await?, ShimOutcome::Skipped);

    assert!(dir.path().join("a").exists());
    assert!(!dir.path().join("b").exists());
    assert!(fs::read_to_string(&ctx.log)?.contains("task abandoned"));
    Ok(())
}

#[tokio::test]
async fn directories_are_prepared_before_commands() -> TestResult {
    init_tracing();
    let dir = scratch_dir();
    let ctx = context(dir.path(), "configure");
    let sink = RecordingSink::new();
    let fresh = dir.path().join("obj").join("gcc");
    let stale = dir.path().join("obj").join("old");
    fs::create_dir_all(&stale)?;
    fs::write(stale.join("config.cache"), "stale")?;

    let mut task = task_in(&fresh, &[Command::new("touch", ["configured"])]);
    task.dirs = vec![DirAction::Empty(stale.clone()), DirAction::Create(fresh.clone())];
    let outcome = TaskShim::new(&sink).run(&ctx, &task).await?;

    assert_eq!(outcome, ShimOutcome::Succeeded);
    assert!(fresh.join("configured").exists());
    assert!(stale.is_dir());
    assert!(!stale.join("config.cache").exists());
    let text = fs::read_to_string(&ctx.log)?;
    assert!(text.contains(&format!("directory setup: mkdir -p {}", fresh.display())));
    Ok(())
}

#[tokio::test]
async fn directory_that_cannot_be_created_fails_the_task() -> TestResult {
    init_tracing();
    let dir = scratch_dir();
    let ctx = context(dir.path(), "configure");
    let sink = RecordingSink::new();
    let blocker = dir.path().join("blocker");
    fs::write(&blocker, "a file, not a directory")?;

    let mut task = task_in(dir.path(), &[touch(dir.path(), "ran")]);
    task.dirs = vec![DirAction::Create(blocker.join("sub"))];
    let outcome = TaskShim::new(&sink).run(&ctx, &task).await?;

    assert_eq!(outcome, ShimOutcome::Failed);
    assert!(ctx.marker.check());
    assert!(!dir.path().join("ran").exists());
    let failures = sink.failures();
    assert_eq!(failures.len(), 1);
    match &failures[0].kind {
        StatusKind::Failed { command, .. } => assert!(command.starts_with("mkdir -p ")),
        other => panic!("expected failure message, got {other:?}"),
    }
    assert!(fs::read_to_string(&ctx.log)?.contains("directory setup failed"));
    Ok(())
}
