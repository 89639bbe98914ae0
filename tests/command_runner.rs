// tests/command_runner.rs

mod common;

use std::fs;

use relbuild::dag::{Command, TaskEnv};
use relbuild::exec::logfile::TaskLog;
use relbuild::exec::runner::{run_command, CommandOutcome, TaskIdentity};
use relbuild::failure::FailureMarker;
use relbuild::ipc::StatusKind;
use relbuild_test_utils::backends::{RecordingSink, UnreachableSink};

use common::{init_tracing, scratch_dir, TestResult};

const ID: TaskIdentity<'static> = TaskIdentity {
    task: "[0001/0001] demo/build",
    token: "token-1",
};

const NO_ENV: TaskEnv = TaskEnv::new();

#[tokio::test]
async fn successful_command_is_logged_between_banners() -> TestResult {
    init_tracing();
    let dir = scratch_dir();
    let marker = FailureMarker::in_build_dir(dir.path());
    let sink = RecordingSink::new();
    let log_path = dir.path().join("demo-log.txt");
    let mut log = TaskLog::open(&log_path)?;

    let cmd = Command::new("sh", ["-c", "echo hello from stdout; echo hello from stderr >&2"]);
    let outcome = run_command(&cmd, dir.path(), &NO_ENV, &mut log, &marker, &sink, &ID).await?;

    assert_eq!(outcome, CommandOutcome::Success);
    assert!(!marker.check());
    assert!(sink.messages().is_empty());

    let text = fs::read_to_string(&log_path)?;
    let start = text.find("---- start").expect("start banner");
    let out = text.find("hello from stdout").expect("stdout captured");
    let err = text.find("hello from stderr").expect("stderr captured");
    let end = text.find("---- end").expect("end banner");
    assert!(start < out && start < err && out < end && err < end);
    assert!(text.contains("command: sh -c 'echo hello from stdout; echo hello from stderr >&2'"));
    assert!(text.contains(&format!("directory: {}", dir.path().display())));
    assert!(text.contains("exit status: 0"));
    Ok(())
}

#[tokio::test]
async fn failing_command_raises_marker_and_notifies() -> TestResult {
    init_tracing();
    let dir = scratch_dir();
    let marker = FailureMarker::in_build_dir(dir.path());
    let sink = RecordingSink::new();
    let log_path = dir.path().join("demo-log.txt");
    let mut log = TaskLog::open(&log_path)?;

    let cmd = Command::new("sh", ["-c", "exit 3"]);
    let outcome = run_command(&cmd, dir.path(), &NO_ENV, &mut log, &marker, &sink, &ID).await?;

    assert_eq!(outcome, CommandOutcome::Exited(3));
    assert!(marker.check());

    let failures = sink.failures();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].token, "token-1");
    assert_eq!(failures[0].task, "[0001/0001] demo/build");
    match &failures[0].kind {
        StatusKind::Failed { command, log } => {
            assert_eq!(command, "sh -c 'exit 3'");
            assert_eq!(log, &log_path);
        }
        other => panic!("expected failure message, got {other:?}"),
    }

    let text = fs::read_to_string(&log_path)?;
    assert!(text.contains("---- start"));
    assert!(text.contains("exit status: 3"));
    assert!(text.contains("---- end"));
    Ok(())
}

#[tokio::test]
async fn missing_working_directory_is_a_command_failure() -> TestResult {
    init_tracing();
    let dir = scratch_dir();
    let marker = FailureMarker::in_build_dir(dir.path());
    let sink = RecordingSink::new();
    let log_path = dir.path().join("demo-log.txt");
    let mut log = TaskLog::open(&log_path)?;
    let witness = dir.path().join("ran");

    let cmd = Command::new("touch", [witness.display().to_string()]);
    let outcome = run_command(
        &cmd,
        &dir.path().join("does-not-exist"),
        &NO_ENV,
        &mut log,
        &marker,
        &sink,
        &ID,
    )
    .await?;

    assert!(matches!(outcome, CommandOutcome::NotStarted(_)));
    assert!(!witness.exists());
    assert!(marker.check());
    assert_eq!(sink.failures().len(), 1);

    let text = fs::read_to_string(&log_path)?;
    assert!(text.contains("---- start"));
    assert!(text.contains("cannot change to directory"));
    assert!(text.contains("---- end"));
    Ok(())
}

#[tokio::test]
async fn missing_program_is_a_command_failure() -> TestResult {
    init_tracing();
    let dir = scratch_dir();
    let marker = FailureMarker::in_build_dir(dir.path());
    let sink = RecordingSink::new();
    let mut log = TaskLog::open(&dir.path().join("demo-log.txt"))?;

    let cmd = Command::new("relbuild-no-such-program", Vec::<String>::new());
    let outcome = run_command(&cmd, dir.path(), &NO_ENV, &mut log, &marker, &sink, &ID).await?;

    assert!(matches!(outcome, CommandOutcome::NotStarted(_)));
    assert!(marker.check());
    assert_eq!(sink.failures().len(), 1);
    Ok(())
}

#[tokio::test]
async fn task_environment_reaches_the_command_and_the_log() -> TestResult {
    init_tracing();
    let dir = scratch_dir();
    let marker = FailureMarker::in_build_dir(dir.path());
    let sink = RecordingSink::new();
    let log_path = dir.path().join("demo-log.txt");
    let mut log = TaskLog::open(&log_path)?;

    let mut env = TaskEnv::new();
    env.insert("RELBUILD_GREETING".to_string(), "hello world".to_string());

    let cmd = Command::new("sh", ["-c", "echo \"greeting=$RELBUILD_GREETING\""]);
    let outcome = run_command(&cmd, dir.path(), &env, &mut log, &marker, &sink, &ID).await?;

    assert_eq!(outcome, CommandOutcome::Success);
    let text = fs::read_to_string(&log_path)?;
    assert!(text.contains("env: RELBUILD_GREETING=hello world"));
    assert!(text.contains("greeting=hello world"));
    // Environment lines come before the command's own output.
    let env_line = text.find("env: RELBUILD_GREETING").expect("env line");
    let output = text.find("greeting=hello").expect("command output");
    assert!(env_line < output);
    Ok(())
}

#[tokio::test]
async fn command_stdin_is_empty() -> TestResult {
    init_tracing();
    let dir = scratch_dir();
    let marker = FailureMarker::in_build_dir(dir.path());
    let sink = RecordingSink::new();
    let mut log = TaskLog::open(&dir.path().join("demo-log.txt"))?;

    // `cat` returns at once when stdin is at end of file.
    let cmd = Command::new("cat", Vec::<String>::new());
    let outcome = common::with_timeout(run_command(
        &cmd,
        dir.path(),
        &NO_ENV,
        &mut log,
        &marker,
        &sink,
        &ID,
    ))
    .await?;

    assert_eq!(outcome, CommandOutcome::Success);
    Ok(())
}

#[tokio::test]
async fn unreachable_controller_is_an_infrastructure_error() {
    init_tracing();
    let dir = scratch_dir();
    let marker = FailureMarker::in_build_dir(dir.path());
    let mut log = TaskLog::open(&dir.path().join("demo-log.txt")).unwrap();

    let cmd = Command::new("false", Vec::<String>::new());
    let result = run_command(
        &cmd,
        dir.path(),
        &NO_ENV,
        &mut log,
        &marker,
        &UnreachableSink,
        &ID,
    )
    .await;

    assert!(result.is_err());
    // The marker is raised before notifying.
    assert!(marker.check());
}
