// tests/end_to_end.rs

mod common;

use std::fs;
use std::path::Path;
use std::process::Command as StdCommand;

use relbuild::config::{load_and_validate, resolve};
use relbuild::engine::{BuildVerdict, Controller};
use relbuild::errors::BuildError;
use relbuild::exec::{SchedulerExit, ShimOutcome};
use relbuild_test_utils::backends::{ConcurrentBackend, SequentialBackend};
use relbuild_test_utils::builders::{ComponentBuilder, ReleaseFileBuilder, StepBuilder};

use common::{init_tracing, path_str, read_or_empty, scratch_dir, with_timeout, write_config, TestResult};

#[tokio::test]
async fn all_tasks_succeed() -> TestResult {
    init_tracing();
    let dir = scratch_dir();
    let a = path_str(dir.path(), "a-built");
    let b = path_str(dir.path(), "b-built");
    let file = ReleaseFileBuilder::new()
        .in_dir(dir.path())
        .with_component("a", ComponentBuilder::new().step("build", &[&["touch", a.as_str()]]).build())
        .with_component(
            "b",
            ComponentBuilder::new()
                .after("a")
                .step("build", &[&["test", "-e", a.as_str()], &["touch", b.as_str()]])
                .build(),
        )
        .build();

    let controller = Controller::new(resolve(&file)?)?;
    let mut backend = SequentialBackend::new();
    let verdict = with_timeout(controller.run_build(&mut backend)).await?;

    assert!(verdict.success(), "verdict: {verdict:?}");
    assert_eq!(verdict.exit_code(), 0);
    assert!(!controller.layout().marker().check());
    assert!(Path::new(&b).exists());
    assert_eq!(backend.outcome_of("a/build"), Some(ShimOutcome::Succeeded));
    assert_eq!(backend.outcome_of("b/build"), Some(ShimOutcome::Succeeded));
    for task in controller.graph().tasks() {
        assert!(read_or_empty(&task.log).contains("task complete"));
    }
    Ok(())
}

#[tokio::test]
async fn failure_lets_running_task_finish_and_skips_the_rest() -> TestResult {
    init_tracing();
    let dir = scratch_dir();
    let q_second = path_str(dir.path(), "q-second");
    let r_ran = path_str(dir.path(), "r-ran");
    let file = ReleaseFileBuilder::new()
        .in_dir(dir.path())
        .with_component(
            "p",
            ComponentBuilder::new()
                .step("build", &[&["sh", "-c", "sleep 0.2; echo p is failing; exit 1"]])
                .build(),
        )
        .with_component(
            "q",
            ComponentBuilder::new()
                .step("build", &[&["sleep", "1"], &["touch", q_second.as_str()]])
                .build(),
        )
        .with_component(
            "r",
            ComponentBuilder::new()
                .after("p")
                .after("q")
                .step("build", &[&["touch", r_ran.as_str()]])
                .build(),
        )
        .build();

    let controller = Controller::new(resolve(&file)?)?;
    let mut backend = ConcurrentBackend::new();
    let verdict = with_timeout(controller.run_build(&mut backend)).await?;

    assert!(!verdict.success());
    assert_eq!(verdict.exit_code(), 1);
    assert!(verdict.notified_failure);
    assert!(verdict.marker_present);
    assert_eq!(verdict.failures.len(), 1);
    assert!(verdict.failures[0].task.ends_with("p/build"));

    assert_eq!(backend.outcome_of("p/build"), Some(ShimOutcome::Failed));
    assert_eq!(backend.outcome_of("q/build"), Some(ShimOutcome::Skipped));
    assert_eq!(backend.outcome_of("r/build"), Some(ShimOutcome::Skipped));
    assert!(!Path::new(&q_second).exists());
    assert!(!Path::new(&r_ran).exists());

    // Q's in-flight command ran to completion.
    let q_log = read_or_empty(&controller.graph().get("q/build").expect("q").log);
    assert!(q_log.contains("command: sleep 1"));
    assert!(q_log.contains("exit status: 0"));

    let p_log = read_or_empty(&controller.graph().get("p/build").expect("p").log);
    assert!(p_log.contains("p is failing"));
    Ok(())
}

/// compile, link after compile, test after compile but independent of link.
fn compile_link_test(root: &Path, compile: &[&str]) -> relbuild::config::ReleaseFile {
    let linked = path_str(root, "linked");
    let tested = path_str(root, "tested");
    ReleaseFileBuilder::new()
        .in_dir(root)
        .with_component("compile", ComponentBuilder::new().step("run", &[compile]).build())
        .with_component(
            "link",
            ComponentBuilder::new()
                .after("compile")
                .step("run", &[&["touch", linked.as_str()]])
                .build(),
        )
        .with_component(
            "test",
            ComponentBuilder::new()
                .after("compile")
                .step("run", &[&["touch", tested.as_str()]])
                .build(),
        )
        .build()
}

const COMPILE_FAILS: &[&str] = &["sh", "-c", "echo compile attempt one; exit 1"];
const COMPILE_FIXED: &[&str] = &["sh", "-c", "echo compile attempt two"];

#[tokio::test]
async fn failed_compile_skips_link_and_test() -> TestResult {
    init_tracing();
    let dir = scratch_dir();
    let controller = Controller::new(resolve(&compile_link_test(dir.path(), COMPILE_FAILS))?)?;
    let mut backend = ConcurrentBackend::new();

    let verdict = with_timeout(controller.run_build(&mut backend)).await?;

    assert!(!verdict.success());
    assert!(verdict.scheduler.success);
    assert!(verdict.notified_failure);
    assert!(verdict.marker_present);
    assert_eq!(backend.outcome_of("compile/run"), Some(ShimOutcome::Failed));
    assert_eq!(backend.outcome_of("link/run"), Some(ShimOutcome::Skipped));
    assert_eq!(backend.outcome_of("test/run"), Some(ShimOutcome::Skipped));
    assert!(!dir.path().join("linked").exists());
    assert!(!dir.path().join("tested").exists());
    // Skipped tasks never open a log.
    assert!(!controller.graph().get("link/run").expect("link").log.exists());
    Ok(())
}

#[tokio::test]
async fn rerun_after_fix_rotates_log_and_succeeds() -> TestResult {
    init_tracing();
    let dir = scratch_dir();

    let failing = Controller::new(resolve(&compile_link_test(dir.path(), COMPILE_FAILS))?)?;
    let first = with_timeout(failing.run_build(&mut SequentialBackend::new())).await?;
    assert!(!first.success());
    assert!(failing.layout().marker().check());

    let fixed = Controller::new(resolve(&compile_link_test(dir.path(), COMPILE_FIXED))?)?;
    let second = with_timeout(fixed.run_build(&mut SequentialBackend::new())).await?;

    assert!(second.success(), "verdict: {second:?}");
    assert!(!fixed.layout().marker().check());
    assert!(dir.path().join("linked").exists());
    assert!(dir.path().join("tested").exists());

    let log = &fixed.graph().get("compile/run").expect("compile").log;
    let current = fs::read_to_string(log)?;
    assert!(current.contains("compile attempt two"));
    assert!(!current.contains("compile attempt one"));

    let mut rotated = log.as_os_str().to_owned();
    rotated.push(".0");
    let previous = fs::read_to_string(&rotated)?;
    assert!(previous.contains("compile attempt one"));
    assert!(previous.contains("exit status: 1"));
    Ok(())
}

#[tokio::test]
async fn objdir_workdir_exists_before_first_command() -> TestResult {
    init_tracing();
    let dir = scratch_dir();
    let file = ReleaseFileBuilder::new()
        .in_dir(dir.path())
        .with_component(
            "binutils",
            ComponentBuilder::new()
                .workdir("${objdir}")
                .step("configure", &[&["touch", "config.status"]])
                .build(),
        )
        .build();
    let controller = Controller::new(resolve(&file)?)?;

    let verdict = with_timeout(controller.run_build(&mut SequentialBackend::new())).await?;

    assert!(verdict.success(), "verdict: {verdict:?}");
    assert!(controller.layout().objdir("binutils").join("config.status").exists());
    Ok(())
}

#[tokio::test]
async fn step_environment_reaches_commands() -> TestResult {
    init_tracing();
    let dir = scratch_dir();
    let out = path_str(dir.path(), "env.txt");
    let script = format!("echo \"$RELBUILD_TARGET $RELBUILD_MODE\" > {out}");
    let file = ReleaseFileBuilder::new()
        .in_dir(dir.path())
        .with_component(
            "gcc",
            ComponentBuilder::new()
                .env("RELBUILD_TARGET", "${release}")
                .env("RELBUILD_MODE", "component")
                .with_step(
                    StepBuilder::new("build")
                        .env("RELBUILD_MODE", "step")
                        .command(&["sh", "-c", script.as_str()])
                        .build(),
                )
                .build(),
        )
        .name("arm-toolchain")
        .build();
    let controller = Controller::new(resolve(&file)?)?;

    let verdict = with_timeout(controller.run_build(&mut SequentialBackend::new())).await?;

    assert!(verdict.success(), "verdict: {verdict:?}");
    assert_eq!(fs::read_to_string(&out)?, "arm-toolchain step\n");
    Ok(())
}

#[tokio::test]
async fn marker_from_previous_build_is_cleared() -> TestResult {
    init_tracing();
    let dir = scratch_dir();
    let file = ReleaseFileBuilder::new()
        .in_dir(dir.path())
        .with_component("a", ComponentBuilder::new().step("build", &[&["true"]]).build())
        .build();
    let controller = Controller::new(resolve(&file)?)?;
    fs::create_dir_all(controller.layout().build_dir())?;
    controller.layout().marker().raise()?;

    let verdict = with_timeout(controller.run_build(&mut SequentialBackend::new())).await?;

    assert!(verdict.success());
    Ok(())
}

#[test]
fn cyclic_config_fails_before_any_task() -> TestResult {
    let dir = scratch_dir();
    let path = write_config(
        dir.path(),
        r#"
[var.a]
type = "string"
template = "${b}"

[var.b]
type = "string"
template = "${a}"

[component.gcc]
[[component.gcc.step]]
name = "build"
commands = [["touch", "ran"]]
"#,
    );

    let file = load_and_validate(&path)?;
    assert!(matches!(resolve(&file), Err(BuildError::CyclicDependency(_))));
    assert!(!dir.path().join("obj").exists());
    assert!(!dir.path().join("logs").exists());
    Ok(())
}

#[test]
fn verdict_needs_all_three_signals() {
    let clean = BuildVerdict {
        scheduler: SchedulerExit::ok(),
        notified_failure: false,
        marker_present: false,
        failures: vec![],
    };
    assert!(clean.success());

    let scheduler_failed = BuildVerdict {
        scheduler: SchedulerExit::failed(Some(2)),
        ..clean.clone()
    };
    let notified = BuildVerdict {
        notified_failure: true,
        ..clean.clone()
    };
    let marker = BuildVerdict {
        marker_present: true,
        ..clean.clone()
    };
    for v in [scheduler_failed, notified, marker] {
        assert!(!v.success());
        assert_eq!(v.exit_code(), 1);
    }
}

fn make_available() -> bool {
    StdCommand::new("make")
        .arg("--version")
        .output()
        .is_ok_and(|o| o.status.success())
}

const SUCCESS_CONFIG: &str = r#"
[release]
name = "demo"
parallelism = 2

[var.greeting]
type = "string"
value = "hello $USER"

[component.first]
[[component.first.step]]
name = "build"
commands = [["sh", "-c", "echo '${greeting}' > ../first.txt"]]

[component.second]
after = ["first"]
[[component.second.step]]
name = "build"
commands = [["cp", "../first.txt", "../second.txt"]]
"#;

#[test]
fn binary_builds_through_make() -> TestResult {
    if !make_available() {
        eprintln!("make not found; skipping");
        return Ok(());
    }
    let dir = scratch_dir();
    let path = write_config(dir.path(), SUCCESS_CONFIG);

    let status = StdCommand::new(env!("CARGO_BIN_EXE_relbuild"))
        .args(["build", "--config"])
        .arg(&path)
        .status()?;

    assert_eq!(status.code(), Some(0));
    assert_eq!(fs::read_to_string(dir.path().join("second.txt"))?, "hello $USER\n");
    assert!(dir.path().join("obj/build/GNUmakefile").exists());
    assert!(!dir.path().join("obj/build-failed").exists());
    assert!(dir.path().join("logs/0001-first-build-log.txt").exists());
    Ok(())
}

#[test]
fn binary_passes_environment_and_directories_through_make() -> TestResult {
    if !make_available() {
        eprintln!("make not found; skipping");
        return Ok(());
    }
    let dir = scratch_dir();
    let path = write_config(
        dir.path(),
        r#"
[component.tools]
[[component.tools.step]]
name = "install"
create_dirs = ["${build_dir}/bin"]
commands = [["sh", "-c", "printf '#!/bin/sh\\necho tool says $GREETING\\n' > bin/hello-tool && chmod +x bin/hello-tool"]]

[component.user]
after = ["tools"]
workdir = "${objdir}"
env = { GREETING = "hi there" }
env_prepend = { PATH = ["${build_dir}/bin"] }

[[component.user.step]]
name = "run"
commands = [["sh", "-c", "hello-tool > out.txt"]]
"#,
    );

    let status = StdCommand::new(env!("CARGO_BIN_EXE_relbuild"))
        .args(["build", "--config"])
        .arg(&path)
        .status()?;

    assert_eq!(status.code(), Some(0));
    assert_eq!(
        fs::read_to_string(dir.path().join("obj/obj/user/out.txt"))?,
        "tool says hi there\n"
    );
    Ok(())
}

#[test]
fn binary_reports_failure_through_make() -> TestResult {
    if !make_available() {
        eprintln!("make not found; skipping");
        return Ok(());
    }
    let dir = scratch_dir();
    let path = write_config(
        dir.path(),
        r#"
[component.first]
[[component.first.step]]
name = "build"
commands = [["false"]]

[component.second]
after = ["first"]
[[component.second.step]]
name = "build"
commands = [["touch", "../second-ran"]]
"#,
    );

    let output = StdCommand::new(env!("CARGO_BIN_EXE_relbuild"))
        .args(["build", "--config"])
        .arg(&path)
        .output()?;

    assert_eq!(output.status.code(), Some(1));
    assert!(dir.path().join("obj/build-failed").exists());
    assert!(!dir.path().join("second-ran").exists());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("first/build FAILED"), "stderr: {stderr}");
    Ok(())
}

#[test]
fn binary_reports_configuration_errors_plainly() -> TestResult {
    let dir = scratch_dir();
    let path = write_config(
        dir.path(),
        r#"
[var.a]
type = "string"
template = "${b}"

[var.b]
type = "string"
template = "${a}"
"#,
    );

    let output = StdCommand::new(env!("CARGO_BIN_EXE_relbuild"))
        .args(["build", "--config"])
        .arg(&path)
        .output()?;

    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("relbuild: invalid release configuration: "), "stderr: {stderr}");
    assert!(!dir.path().join("obj").exists());
    Ok(())
}

#[test]
fn binary_dry_run_executes_nothing() -> TestResult {
    let dir = scratch_dir();
    let path = write_config(dir.path(), SUCCESS_CONFIG);

    let output = StdCommand::new(env!("CARGO_BIN_EXE_relbuild"))
        .args(["build", "--dry-run", "--set", "greeting=hi", "--config"])
        .arg(&path)
        .output()?;

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("greeting = hi"));
    assert!(stdout.contains("[0002/0002] second/build"));
    assert!(!dir.path().join("first.txt").exists());
    assert!(!dir.path().join("obj").exists());
    Ok(())
}
