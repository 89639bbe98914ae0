// src/dag/graph.rs

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::path::{Component, Path, PathBuf};

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;
use tracing::{debug, info};

use crate::config::template;
use crate::config::{EnvDecl, ReleaseConfig, ResolvedComponent};
use crate::engine::TaskName;
use crate::errors::{BuildError, Result};
use crate::layout::BuildLayout;
use crate::quote::{shell_join, shell_quote};
use crate::types::Value;

/// One executable invocation: program plus arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub program: String,
    pub args: Vec<String>,
}

impl Command {
    pub fn new(program: impl Into<String>, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Build from a non-empty argv.
    pub fn from_argv(argv: &[String]) -> Option<Self> {
        let (program, args) = argv.split_first()?;
        Some(Self {
            program: program.clone(),
            args: args.to_vec(),
        })
    }

    pub fn argv(&self) -> Vec<&str> {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect()
    }
}

/// Shell-quoted form, re-runnable when pasted into a shell.
impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&shell_join(&self.argv()))
    }
}

/// Environment overrides of a task, fully expanded.
pub type TaskEnv = BTreeMap<String, String>;

/// Directory preparation done when a task starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirAction {
    /// `mkdir -p`.
    Create(PathBuf),
    /// `rm -rf` followed by `mkdir -p`.
    Empty(PathBuf),
}

impl DirAction {
    pub fn path(&self) -> &Path {
        match self {
            DirAction::Create(p) | DirAction::Empty(p) => p,
        }
    }
}

/// Shell equivalent, for logs and failure reports.
impl fmt::Display for DirAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let path = self.path().display().to_string();
        let quoted = shell_quote(&path);
        match self {
            DirAction::Create(_) => write!(f, "mkdir -p {quoted}"),
            DirAction::Empty(_) => write!(f, "rm -rf {quoted} && mkdir -p {quoted}"),
        }
    }
}

/// One schedulable unit of work.
#[derive(Debug, Clone)]
pub struct Task {
    /// `component/step`.
    pub id: TaskName,
    /// 1-based position in topological order.
    pub number: usize,
    pub workdir: PathBuf,
    /// Variables added to the inherited environment of every command.
    pub env: TaskEnv,
    /// Emptied directories first, then created ones.
    pub dirs: Vec<DirAction>,
    pub commands: Vec<Command>,
    /// Ids of tasks that must finish before this one starts.
    pub deps: BTreeSet<TaskName>,
    pub log: PathBuf,
}

/// Immutable DAG of tasks, stored in topological order.
#[derive(Debug, Clone, Default)]
pub struct TaskGraph {
    tasks: Vec<Task>,
    index: HashMap<TaskName, usize>,
    dependents: HashMap<TaskName, Vec<TaskName>>,
}

impl TaskGraph {
    /// Tasks in topological order (every task after its dependencies).
    pub fn tasks(&self) -> impl Iterator<Item = &Task> {
        self.tasks.iter()
    }

    pub fn get(&self, id: &str) -> Option<&Task> {
        self.index.get(id).map(|&i| &self.tasks[i])
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Immediate dependencies of a task.
    pub fn dependencies_of(&self, id: &str) -> Vec<&str> {
        self.get(id)
            .map(|t| t.deps.iter().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// Immediate dependents of a task.
    pub fn dependents_of(&self, id: &str) -> &[TaskName] {
        self.dependents
            .get(id)
            .map(|d| d.as_slice())
            .unwrap_or(&[])
    }

    /// Human-readable description used in logs and status messages,
    /// e.g. `[0003/0012] gcc/configure`.
    pub fn describe(&self, task: &Task) -> String {
        format!("[{:04}/{:04}] {}", task.number, self.tasks.len(), task.id)
    }
}

/// Intermediate task before numbering.
struct Draft {
    id: TaskName,
    workdir: PathBuf,
    env: TaskEnv,
    dirs: Vec<DirAction>,
    commands: Vec<Command>,
    deps: BTreeSet<TaskName>,
}

/// Build the task graph for a resolved release configuration.
///
/// One task per active step of each active component. Steps of a component
/// run in sequence; a component starts after the last task of every active
/// component in its `after` list. The result is re-checked for cycles since
/// explicit step ordering can introduce edges the variable graph never had.
///
/// Environment prepends are expanded against the current process
/// environment, so the controller's `PATH` is the base a task's `PATH`
/// entries are put in front of.
pub fn build(cfg: &ReleaseConfig, layout: &BuildLayout) -> Result<TaskGraph> {
    let mut drafts: BTreeMap<TaskName, Draft> = BTreeMap::new();
    let mut last_task: HashMap<&str, TaskName> = HashMap::new();

    for comp in cfg.active_components() {
        let locals = component_locals(comp, layout);
        let lookup = |n: &str| locals.get(n).or_else(|| cfg.get(n));
        let mut prev: Option<TaskName> = None;
        for step in comp.steps.iter().filter(|s| s.active) {
            let id = format!("{}/{}", comp.name, step.name);

            let workdir_tpl = step
                .cwd
                .as_deref()
                .or(comp.workdir.as_deref())
                .unwrap_or("${build_dir}");
            let workdir = template::interpolate(workdir_tpl, &lookup)
                .map_err(|n| unknown_in(&id, &n))?;
            let workdir = absolutize(layout.build_dir(), Path::new(&workdir));

            let expand =
                |tpl: &str| template::interpolate(tpl, &lookup).map_err(|n| unknown_in(&id, &n));
            let env = task_env(&id, [&comp.env, &step.env], &expand)?;
            let dirs = task_dirs(
                &id,
                layout,
                &workdir,
                &step.empty_dirs,
                &step.create_dirs,
                &expand,
            )?;

            let mut commands = Vec::with_capacity(step.commands.len());
            for argv in step.commands.iter() {
                let argv =
                    template::interpolate_list(argv, &lookup).map_err(|n| unknown_in(&id, &n))?;
                if let Some(bad) = argv.iter().find(|a| a.contains('\n')) {
                    return Err(BuildError::ConfigError(format!(
                        "newline in argument {bad:?} of task '{id}'"
                    )));
                }
                let cmd = Command::from_argv(&argv).ok_or_else(|| {
                    BuildError::ConfigError(format!("command in task '{id}' expanded to nothing"))
                })?;
                commands.push(cmd);
            }

            let mut deps = BTreeSet::new();
            if let Some(p) = prev.take() {
                deps.insert(p);
            }
            drafts.insert(
                id.clone(),
                Draft {
                    id: id.clone(),
                    workdir,
                    env,
                    dirs,
                    commands,
                    deps,
                },
            );
            prev = Some(id);
        }
        if let Some(last) = prev {
            last_task.insert(comp.name.as_str(), last);
        }
    }

    // Cross-component and explicit ordering edges.
    for comp in cfg.active_components() {
        let active_steps: Vec<_> = comp.steps.iter().filter(|s| s.active).collect();
        let Some(first) = active_steps.first() else {
            continue;
        };
        let first_id = format!("{}/{}", comp.name, first.name);
        let comp_deps: Vec<TaskName> = comp
            .after
            .iter()
            .filter_map(|c| last_task.get(c.as_str()).cloned())
            .collect();

        if let Some(draft) = drafts.get_mut(&first_id) {
            draft.deps.extend(comp_deps);
        }

        for step in active_steps.iter() {
            let id = format!("{}/{}", comp.name, step.name);
            let extra: Vec<TaskName> = step
                .after
                .iter()
                .filter_map(|target| {
                    if target.contains('/') {
                        drafts.contains_key(target).then(|| target.clone())
                    } else {
                        last_task.get(target.as_str()).cloned()
                    }
                })
                .collect();
            if let Some(draft) = drafts.get_mut(&id) {
                draft.deps.extend(extra);
            }
        }
    }

    let order = topological_order(&drafts)?;

    let mut tasks = Vec::with_capacity(order.len());
    let mut index = HashMap::with_capacity(order.len());
    let mut dependents: HashMap<TaskName, Vec<TaskName>> = HashMap::new();

    for (i, id) in order.into_iter().enumerate() {
        let Some(draft) = drafts.remove(&id) else {
            continue;
        };
        let number = i + 1;
        for dep in draft.deps.iter() {
            dependents.entry(dep.clone()).or_default().push(draft.id.clone());
        }
        debug!(task = %draft.id, number, deps = ?draft.deps, "task added to graph");
        index.insert(draft.id.clone(), tasks.len());
        tasks.push(Task {
            log: layout.task_log(number, &draft.id),
            id: draft.id,
            number,
            workdir: draft.workdir,
            env: draft.env,
            dirs: draft.dirs,
            commands: draft.commands,
            deps: draft.deps,
        });
    }

    info!(tasks = tasks.len(), "task graph built");

    Ok(TaskGraph {
        tasks,
        index,
        dependents,
    })
}

fn component_locals(comp: &ResolvedComponent, layout: &BuildLayout) -> HashMap<&'static str, Value> {
    let mut locals = HashMap::new();
    locals.insert("component", Value::Str(comp.name.clone()));
    locals.insert(
        "objdir",
        Value::Str(layout.objdir(&comp.name).display().to_string()),
    );
    locals
}

/// Apply component then step environment changes.
fn task_env<F>(id: &str, levels: [&EnvDecl; 2], expand: &F) -> Result<TaskEnv>
where
    F: Fn(&str) -> Result<String>,
{
    let mut env = TaskEnv::new();
    for level in levels {
        for (var, tpl) in level.set.iter() {
            let value = expand(tpl)?;
            check_env_value(id, var, &value)?;
            env.insert(var.clone(), value);
        }
        for (var, entries) in level.prepend.iter() {
            let mut parts = Vec::with_capacity(entries.len());
            for tpl in entries {
                let part = expand(tpl)?;
                check_env_value(id, var, &part)?;
                if part.contains(':') {
                    return Err(BuildError::ConfigError(format!(
                        "entry {part:?} prepended to {var} in task '{id}' contains ':'"
                    )));
                }
                parts.push(part);
            }
            let base = env
                .get(var)
                .cloned()
                .or_else(|| std::env::var(var).ok())
                .filter(|b| !b.is_empty());
            let joined = parts.join(":");
            let value = match base {
                Some(base) => format!("{joined}:{base}"),
                None => joined,
            };
            env.insert(var.clone(), value);
        }
    }
    Ok(env)
}

fn check_env_value(id: &str, var: &str, value: &str) -> Result<()> {
    if value.contains('\n') || value.contains('\0') {
        return Err(BuildError::ConfigError(format!(
            "value of {var} in task '{id}' contains a newline or NUL"
        )));
    }
    Ok(())
}

/// Directory preparation for a task. A workdir under the build's object
/// root is always created.
fn task_dirs<F>(
    id: &str,
    layout: &BuildLayout,
    workdir: &Path,
    empty: &[String],
    create: &[String],
    expand: &F,
) -> Result<Vec<DirAction>>
where
    F: Fn(&str) -> Result<String>,
{
    let mut dirs = Vec::with_capacity(empty.len() + create.len() + 1);
    for tpl in empty {
        let dir = absolutize(layout.build_dir(), Path::new(&expand(tpl)?));
        if !is_strictly_inside(&dir, layout.build_dir()) {
            return Err(BuildError::ConfigError(format!(
                "task '{id}' may only empty directories inside the build directory, not {}",
                dir.display()
            )));
        }
        dirs.push(DirAction::Empty(dir));
    }
    for tpl in create {
        dirs.push(DirAction::Create(absolutize(
            layout.build_dir(),
            Path::new(&expand(tpl)?),
        )));
    }
    if workdir.starts_with(layout.obj_root()) && !dirs.iter().any(|d| d.path() == workdir) {
        dirs.push(DirAction::Create(workdir.to_path_buf()));
    }
    Ok(dirs)
}

fn is_strictly_inside(dir: &Path, root: &Path) -> bool {
    dir != root
        && dir.starts_with(root)
        && !dir.components().any(|c| matches!(c, Component::ParentDir))
}

fn unknown_in(task: &str, name: &str) -> BuildError {
    BuildError::UnknownVariable(format!("{name} (read by task '{task}')"))
}

fn absolutize(base: &Path, p: &Path) -> PathBuf {
    if p.is_absolute() {
        p.to_path_buf()
    } else {
        base.join(p)
    }
}

/// Topological order, deterministic for a given set of drafts.
fn topological_order(drafts: &BTreeMap<TaskName, Draft>) -> Result<Vec<TaskName>> {
    // Edge direction: dependency -> dependent.
    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();
    for id in drafts.keys() {
        graph.add_node(id.as_str());
    }
    for draft in drafts.values() {
        for dep in draft.deps.iter() {
            if dep == &draft.id {
                return Err(BuildError::TaskGraphCycle(draft.id.clone()));
            }
            graph.add_edge(dep.as_str(), draft.id.as_str(), ());
        }
    }

    match toposort(&graph, None) {
        Ok(order) => Ok(order.into_iter().map(str::to_string).collect()),
        Err(cycle) => Err(BuildError::TaskGraphCycle(cycle.node_id().to_string())),
    }
}
