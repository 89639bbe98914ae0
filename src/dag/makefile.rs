// src/dag/makefile.rs

//! Render a [`TaskGraph`] as a GNU makefile for `make -jN`.
//!
//! Every task becomes one phony target whose prerequisites are its
//! dependencies. The recipe re-invokes the `relbuild` binary:
//!
//! ```text
//! 0001-binutils-configure:
//! 	@relbuild start-task --build-dir ... --task binutils/configure --mkdir /obj/obj/binutils
//! 	@relbuild run-command ... --env CC=gcc --cwd /obj/obj/binutils -- ../configure --prefix=/opt
//! 	@relbuild end-task ...
//! ```

use std::fmt::Write as _;
use std::path::PathBuf;

use crate::dag::graph::{Command, DirAction, Task, TaskGraph};
use crate::errors::{BuildError, Result};
use crate::quote::shell_join;

/// Everything a recipe line needs to reach the shim and the controller.
#[derive(Debug, Clone)]
pub struct ShimInvocation {
    /// Path of the `relbuild` executable.
    pub exe: PathBuf,
    pub build_dir: PathBuf,
    pub socket: PathBuf,
    pub token: String,
}

impl ShimInvocation {
    fn common(&self, subcommand: &str, graph: &TaskGraph, task: &Task) -> Vec<String> {
        vec![
            self.exe.display().to_string(),
            subcommand.to_string(),
            "--build-dir".to_string(),
            self.build_dir.display().to_string(),
            "--log".to_string(),
            task.log.display().to_string(),
            "--socket".to_string(),
            self.socket.display().to_string(),
            "--token".to_string(),
            self.token.clone(),
            "--task".to_string(),
            graph.describe(task),
        ]
    }

    pub fn start_task(&self, graph: &TaskGraph, task: &Task) -> Vec<String> {
        let mut argv = self.common("start-task", graph, task);
        for dir in task.dirs.iter() {
            let flag = match dir {
                DirAction::Empty(_) => "--empty-dir",
                DirAction::Create(_) => "--mkdir",
            };
            argv.push(flag.to_string());
            argv.push(dir.path().display().to_string());
        }
        argv
    }

    pub fn run_command(&self, graph: &TaskGraph, task: &Task, command: &Command) -> Vec<String> {
        let mut argv = self.common("run-command", graph, task);
        for (var, value) in task.env.iter() {
            argv.push("--env".to_string());
            argv.push(format!("{var}={value}"));
        }
        argv.push("--cwd".to_string());
        argv.push(task.workdir.display().to_string());
        argv.push("--".to_string());
        argv.extend(command.argv().into_iter().map(str::to_string));
        argv
    }

    pub fn end_task(&self, graph: &TaskGraph, task: &Task) -> Vec<String> {
        self.common("end-task", graph, task)
    }
}

/// Make target name of a task: the log file stem without `-log.txt`.
pub fn target_name(task: &Task) -> String {
    format!("{:04}-{}", task.number, task.id.replace('/', "-"))
}

/// Render the whole graph. The first target is `all`, which depends on
/// every task.
pub fn render(graph: &TaskGraph, inv: &ShimInvocation) -> Result<String> {
    let mut out = String::new();
    let targets: Vec<String> = graph.tasks().map(target_name).collect();

    // Writing to a String cannot fail; map the error anyway to keep `?`.
    let w = |e: std::fmt::Error| BuildError::Other(e.into());

    writeln!(out, "# Generated by relbuild. Do not edit.").map_err(w)?;
    writeln!(out).map_err(w)?;
    writeln!(out, "all: {}", targets.join(" ")).map_err(w)?;
    writeln!(out).map_err(w)?;

    for task in graph.tasks() {
        let deps: Vec<String> = task
            .deps
            .iter()
            .filter_map(|d| graph.get(d))
            .map(target_name)
            .collect();
        if deps.is_empty() {
            writeln!(out, "{}:", target_name(task)).map_err(w)?;
        } else {
            writeln!(out, "{}: {}", target_name(task), deps.join(" ")).map_err(w)?;
        }

        recipe_line(&mut out, &inv.start_task(graph, task))?;
        for command in task.commands.iter() {
            recipe_line(&mut out, &inv.run_command(graph, task, command))?;
        }
        recipe_line(&mut out, &inv.end_task(graph, task))?;
        writeln!(out).map_err(w)?;
    }

    writeln!(out, ".PHONY: all {}", targets.join(" ")).map_err(w)?;
    Ok(out)
}

fn recipe_line(out: &mut String, argv: &[String]) -> Result<()> {
    if let Some(bad) = argv.iter().find(|a| a.contains('\n')) {
        return Err(BuildError::ConfigError(format!(
            "newline in makefile argument {bad:?}"
        )));
    }
    out.push_str("\t@");
    out.push_str(&escape_dollars(&shell_join(argv)));
    out.push('\n');
    Ok(())
}

/// Make expands `$`; a literal dollar is written `$$`.
pub fn escape_dollars(s: &str) -> String {
    s.replace('$', "$$")
}
