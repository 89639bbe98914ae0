// src/config/eval.rs

//! Release configuration evaluation.
//!
//! [`resolve`] turns a validated [`ReleaseFile`] into a [`ReleaseConfig`]:
//! every variable gets exactly one value, computed in topological order of
//! the variable dependency graph, and every component and step is marked
//! active or inactive.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;
use tracing::{debug, info};

use crate::config::condition::Condition;
use crate::config::model::{EnvDecl, ReleaseFile, StepDecl, Template, VarDecl, VarRule};
use crate::config::template;
use crate::config::validate::{check_value, GLOBAL_BUILTINS};
use crate::errors::{BuildError, Result};
use crate::types::Value;

/// A fully resolved release configuration.
#[derive(Debug, Clone)]
pub struct ReleaseConfig {
    name: String,
    build_dir: PathBuf,
    log_dir: PathBuf,
    parallelism: Option<usize>,
    /// Variable names in evaluation order.
    order: Vec<String>,
    values: BTreeMap<String, Value>,
    /// Built-ins (`release`, `build_dir`, `log_dir`).
    builtins: BTreeMap<String, Value>,
    components: Vec<ResolvedComponent>,
}

/// A component after condition evaluation.
#[derive(Debug, Clone)]
pub struct ResolvedComponent {
    pub name: String,
    pub active: bool,
    pub after: Vec<String>,
    pub workdir: Option<String>,
    pub env: EnvDecl,
    pub steps: Vec<ResolvedStep>,
}

/// A step after condition evaluation. Templates are still uninterpolated;
/// they need per-component built-ins supplied by the task graph builder.
#[derive(Debug, Clone)]
pub struct ResolvedStep {
    pub name: String,
    pub active: bool,
    pub cwd: Option<String>,
    pub after: Vec<String>,
    pub commands: Vec<Vec<String>>,
    pub env: EnvDecl,
    pub create_dirs: Vec<String>,
    pub empty_dirs: Vec<String>,
}

impl ReleaseConfig {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn build_dir(&self) -> &Path {
        &self.build_dir
    }

    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }

    pub fn parallelism(&self) -> Option<usize> {
        self.parallelism
    }

    /// Resolved value of a declared variable or a built-in.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name).or_else(|| self.builtins.get(name))
    }

    /// Declared variables and their values, in evaluation order.
    pub fn vars(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.order
            .iter()
            .filter_map(|n| self.values.get(n).map(|v| (n.as_str(), v)))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn components(&self) -> &[ResolvedComponent] {
        &self.components
    }

    pub fn component(&self, name: &str) -> Option<&ResolvedComponent> {
        self.components.iter().find(|c| c.name == name)
    }

    pub fn active_components(&self) -> impl Iterator<Item = &ResolvedComponent> {
        self.components.iter().filter(|c| c.active)
    }
}

/// Resolve every variable and component condition of a release file.
///
/// Fails with [`BuildError::CyclicDependency`] if variables depend on each
/// other circularly and with [`BuildError::UnresolvableCondition`] if a
/// condition cannot be evaluated. Nothing is partially resolved.
pub fn resolve(file: &ReleaseFile) -> Result<ReleaseConfig> {
    let build_dir = file.base_dir.join(&file.release.build_dir);
    let log_dir = file.base_dir.join(&file.release.log_dir);

    let mut builtins = BTreeMap::new();
    builtins.insert("release".to_string(), Value::Str(file.release.name.clone()));
    builtins.insert(
        "build_dir".to_string(),
        Value::Str(build_dir.display().to_string()),
    );
    builtins.insert(
        "log_dir".to_string(),
        Value::Str(log_dir.display().to_string()),
    );

    check_references(file)?;
    let order = evaluation_order(file)?;

    let mut values: BTreeMap<String, Value> = BTreeMap::new();
    for name in order.iter() {
        let decl = &file.vars[name];
        let value = {
            let lookup = |n: &str| values.get(n).or_else(|| builtins.get(n));
            evaluate_var(decl, lookup)?
        };
        debug!(var = %name, value = %value, "resolved release config variable");
        values.insert(name.clone(), value);
    }

    let lookup = |n: &str| values.get(n).or_else(|| builtins.get(n));
    let mut components = Vec::with_capacity(file.components.len());
    for comp in file.components.values() {
        let active = eval_condition(&comp.name, comp.when.as_ref(), &lookup)?;
        let mut steps = Vec::with_capacity(comp.steps.len());
        for step in comp.steps.iter() {
            steps.push(resolve_step(&comp.name, active, step, &lookup)?);
        }
        components.push(ResolvedComponent {
            name: comp.name.clone(),
            active,
            after: comp.after.clone(),
            workdir: comp.workdir.clone(),
            env: comp.env.clone(),
            steps,
        });
    }

    info!(
        release = %file.release.name,
        vars = values.len(),
        active_components = components.iter().filter(|c| c.active).count(),
        "release config resolved"
    );

    Ok(ReleaseConfig {
        name: file.release.name.clone(),
        build_dir,
        log_dir,
        parallelism: file.release.parallelism,
        order,
        values,
        builtins,
        components,
    })
}

/// Every name a variable or condition reads must exist.
fn check_references(file: &ReleaseFile) -> Result<()> {
    let known = |n: &str| file.vars.contains_key(n) || GLOBAL_BUILTINS.contains(&n);

    for decl in file.vars.values() {
        if let Some(cond) = &decl.when {
            if let Some(bad) = cond.variables().into_iter().find(|v| !known(v.as_str())) {
                return Err(BuildError::UnresolvableCondition {
                    name: decl.name.clone(),
                    reason: format!("condition '{cond}' reads unknown variable '{bad}'"),
                });
            }
        }
        if let Some(bad) = decl.deps.iter().find(|d| !known(d.as_str())) {
            return Err(BuildError::UnknownVariable(format!(
                "{bad} (read by '{}')",
                decl.name
            )));
        }
    }

    for comp in file.components.values() {
        let conds = comp
            .when
            .iter()
            .map(|c| (comp.name.clone(), c))
            .chain(comp.steps.iter().filter_map(|s| {
                s.when
                    .as_ref()
                    .map(|c| (format!("{}/{}", comp.name, s.name), c))
            }));
        for (owner, cond) in conds {
            if let Some(bad) = cond.variables().into_iter().find(|v| !known(v.as_str())) {
                return Err(BuildError::UnresolvableCondition {
                    name: owner,
                    reason: format!("condition '{cond}' reads unknown variable '{bad}'"),
                });
            }
        }
    }
    Ok(())
}

/// Topological order over variables: each variable after everything it
/// reads.
fn evaluation_order(file: &ReleaseFile) -> Result<Vec<String>> {
    // Edge direction: dependency -> dependent.
    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();

    for name in file.vars.keys() {
        graph.add_node(name.as_str());
    }
    for decl in file.vars.values() {
        for dep in decl.deps.iter() {
            if dep == &decl.name {
                return Err(BuildError::CyclicDependency(format!(
                    "variable '{}' depends on itself",
                    decl.name
                )));
            }
            graph.add_edge(dep.as_str(), decl.name.as_str(), ());
        }
    }

    match toposort(&graph, None) {
        Ok(order) => Ok(order.into_iter().map(str::to_string).collect()),
        Err(cycle) => Err(BuildError::CyclicDependency(format!(
            "circular dependency involving variable '{}'",
            cycle.node_id()
        ))),
    }
}

fn evaluate_var<'v, F>(decl: &VarDecl, lookup: F) -> Result<Value>
where
    F: Fn(&str) -> Option<&'v Value>,
{
    if !eval_condition(&decl.name, decl.when.as_ref(), &lookup)? {
        return Ok(decl.inactive.clone());
    }

    let unknown = |n: String| BuildError::UnknownVariable(format!("{n} (read by '{}')", decl.name));
    let value = match &decl.rule {
        VarRule::Literal(v) => v.clone(),
        VarRule::Template(Template::Str(t)) => {
            Value::Str(template::interpolate(t, &lookup).map_err(unknown)?)
        }
        VarRule::Template(Template::List(items)) => {
            Value::List(template::interpolate_list(items, &lookup).map_err(unknown)?)
        }
    };

    check_value(&decl.name, decl.ty, &decl.values, &value)?;
    Ok(value)
}

fn eval_condition<'v, F>(owner: &str, cond: Option<&Condition>, lookup: &F) -> Result<bool>
where
    F: Fn(&str) -> Option<&'v Value>,
{
    match cond {
        None => Ok(true),
        Some(c) => c
            .evaluate(lookup)
            .map_err(|reason| BuildError::UnresolvableCondition {
                name: owner.to_string(),
                reason: format!("condition '{c}': {reason}"),
            }),
    }
}

fn resolve_step<'v, F>(
    component: &str,
    component_active: bool,
    step: &StepDecl,
    lookup: &F,
) -> Result<ResolvedStep>
where
    F: Fn(&str) -> Option<&'v Value>,
{
    let owner = format!("{component}/{}", step.name);
    // Conditions of steps in inactive components are still evaluated so
    // that a broken condition is reported whatever the other settings are.
    let own = eval_condition(&owner, step.when.as_ref(), lookup)?;
    Ok(ResolvedStep {
        name: step.name.clone(),
        active: component_active && own,
        cwd: step.cwd.clone(),
        after: step.after.clone(),
        commands: step.commands.clone(),
        env: step.env.clone(),
        create_dirs: step.create_dirs.clone(),
        empty_dirs: step.empty_dirs.clone(),
    })
}
