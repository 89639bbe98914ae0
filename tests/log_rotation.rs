// tests/log_rotation.rs

mod common;

use std::fs;

use relbuild::exec::logfile::{log_tail, rotate_log, TaskLog};

use common::{scratch_dir, TestResult};

#[test]
fn rotation_picks_lowest_unused_suffix() -> TestResult {
    let dir = scratch_dir();
    let log = dir.path().join("0001-gcc-build-log.txt");
    fs::write(&log, "third run\n")?;
    fs::write(dir.path().join("0001-gcc-build-log.txt.0"), "first run\n")?;

    let rotated = rotate_log(&log)?;

    let expected = dir.path().join("0001-gcc-build-log.txt.1");
    assert_eq!(rotated.as_deref(), Some(expected.as_path()));
    assert_eq!(fs::read_to_string(&expected)?, "third run\n");
    assert_eq!(
        fs::read_to_string(dir.path().join("0001-gcc-build-log.txt.0"))?,
        "first run\n"
    );
    assert!(!log.exists());
    Ok(())
}

#[test]
fn rotation_fills_gaps() -> TestResult {
    let dir = scratch_dir();
    let log = dir.path().join("task-log.txt");
    fs::write(&log, "current\n")?;
    fs::write(dir.path().join("task-log.txt.1"), "older\n")?;

    let rotated = rotate_log(&log)?;

    assert_eq!(rotated, Some(dir.path().join("task-log.txt.0")));
    Ok(())
}

#[test]
fn nothing_to_rotate_is_not_an_error() -> TestResult {
    let dir = scratch_dir();
    assert_eq!(rotate_log(&dir.path().join("missing-log.txt"))?, None);
    Ok(())
}

#[test]
fn task_log_appends_and_tail_returns_last_lines() -> TestResult {
    let dir = scratch_dir();
    let path = dir.path().join("logs").join("0002-x-y-log.txt");

    {
        let mut log = TaskLog::open(&path)?;
        for i in 0..40 {
            log.line(&format!("line {i}"))?;
        }
    }
    {
        let mut log = TaskLog::open(&path)?;
        log.line("appended")?;
    }

    let tail = log_tail(&path, 25)?;
    assert_eq!(tail.len(), 25);
    assert_eq!(tail.first().map(String::as_str), Some("line 16"));
    assert_eq!(tail.last().map(String::as_str), Some("appended"));
    Ok(())
}
