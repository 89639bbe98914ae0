// src/config/validate.rs

use std::collections::{BTreeMap, BTreeSet};

use crate::config::condition::{Condition, is_valid_name};
use crate::config::model::{
    ComponentDecl, ComponentSpec, EnvDecl, RawReleaseFile, RawVarSpec, ReleaseFile, StepDecl,
    Template, VarDecl, VarRule,
};
use crate::config::template;
use crate::errors::{BuildError, Result};
use crate::types::{Value, VarType};

/// Names provided by the build itself for every variable, condition and
/// command.
pub const GLOBAL_BUILTINS: &[&str] = &["release", "build_dir", "log_dir"];

/// Names that only exist while expanding a component's `workdir`, `env`,
/// directories and commands.
pub const COMPONENT_BUILTINS: &[&str] = &["component", "objdir"];

/// Whether `name` is provided by the build and so cannot be declared.
pub fn is_builtin(name: &str) -> bool {
    GLOBAL_BUILTINS.contains(&name) || COMPONENT_BUILTINS.contains(&name)
}

impl TryFrom<RawReleaseFile> for ReleaseFile {
    type Error = BuildError;

    fn try_from(raw: RawReleaseFile) -> std::result::Result<Self, Self::Error> {
        validate_release_section(&raw)?;

        let mut vars = BTreeMap::new();
        for (name, spec) in raw.var.iter() {
            vars.insert(name.clone(), validate_var(name, spec)?);
        }

        validate_component_references(&raw.component)?;
        let mut components = BTreeMap::new();
        for (name, spec) in raw.component.iter() {
            components.insert(name.clone(), validate_component(name, spec)?);
        }

        Ok(ReleaseFile::new_unchecked(raw.release, vars, components))
    }
}

/// Validate an already-deserialized release file (used by tests/builders).
pub fn validate_config(raw: RawReleaseFile) -> Result<ReleaseFile> {
    ReleaseFile::try_from(raw)
}

fn validate_release_section(raw: &RawReleaseFile) -> Result<()> {
    if raw.release.parallelism == Some(0) {
        return Err(BuildError::ConfigError(
            "[release].parallelism must be >= 1 (got 0)".to_string(),
        ));
    }
    if raw.release.name.trim().is_empty() {
        return Err(BuildError::ConfigError(
            "[release].name must not be empty".to_string(),
        ));
    }
    Ok(())
}

fn validate_var(name: &str, spec: &RawVarSpec) -> Result<VarDecl> {
    if !is_valid_name(name) {
        return Err(BuildError::ConfigError(format!(
            "invalid variable name '{name}'"
        )));
    }
    if is_builtin(name) {
        return Err(BuildError::ConfigError(format!(
            "variable '{name}' is provided by the build and cannot be declared"
        )));
    }

    match spec.ty {
        VarType::Enum if spec.values.is_empty() => {
            return Err(BuildError::ConfigError(format!(
                "enum variable '{name}' must list its `values`"
            )));
        }
        VarType::Enum => {}
        _ if !spec.values.is_empty() => {
            return Err(BuildError::ConfigError(format!(
                "variable '{name}' has `values` but is not an enum"
            )));
        }
        _ => {}
    }

    let when = spec
        .when
        .as_deref()
        .map(|src| {
            Condition::parse(src).map_err(|reason| BuildError::UnresolvableCondition {
                name: name.to_string(),
                reason,
            })
        })
        .transpose()?;

    let rule = match (&spec.value, &spec.template) {
        (Some(_), Some(_)) => {
            return Err(BuildError::ConfigError(format!(
                "variable '{name}' has both `value` and `template`"
            )));
        }
        (Some(v), None) => VarRule::Literal(literal_value(name, spec, v)?),
        (None, Some(t)) => VarRule::Template(template_value(name, spec.ty, t)?),
        (None, None) => VarRule::Literal(inactive_default(spec)),
    };

    let inactive = match &spec.inactive {
        Some(v) => literal_value(name, spec, v)?,
        None => inactive_default(spec),
    };

    let mut deps: BTreeSet<String> = spec.depends.iter().cloned().collect();
    if let Some(cond) = &when {
        deps.extend(cond.variables());
    }
    if let VarRule::Template(t) = &rule {
        match t {
            Template::Str(s) => deps.extend(template::references(s)),
            Template::List(items) => {
                for item in items {
                    deps.extend(template::references(item));
                }
            }
        }
    }
    if let Some(local) = deps.iter().find(|d| COMPONENT_BUILTINS.contains(&d.as_str())) {
        return Err(BuildError::ConfigError(format!(
            "variable '{name}' reads '{local}', which is only defined inside component \
             workdirs, environments and commands"
        )));
    }
    deps.retain(|d| !GLOBAL_BUILTINS.contains(&d.as_str()));

    Ok(VarDecl {
        name: name.to_string(),
        ty: spec.ty,
        rule,
        when,
        inactive,
        values: spec.values.clone(),
        deps,
        doc: spec.doc.clone(),
    })
}

/// Value a variable takes when its condition is false and no `inactive`
/// value is given.
fn inactive_default(spec: &RawVarSpec) -> Value {
    match spec.ty {
        VarType::Bool => Value::Bool(false),
        VarType::String => Value::Str(String::new()),
        VarType::Int => Value::Int(0),
        VarType::List => Value::List(Vec::new()),
        VarType::Enum => Value::Str(spec.values.first().cloned().unwrap_or_default()),
    }
}

fn literal_value(name: &str, spec: &RawVarSpec, raw: &toml::Value) -> Result<Value> {
    let mismatch = |reason: String| BuildError::TypeMismatch {
        name: name.to_string(),
        reason,
    };

    let value = match raw {
        toml::Value::Boolean(b) => Value::Bool(*b),
        toml::Value::String(s) => Value::Str(s.clone()),
        toml::Value::Integer(i) => Value::Int(*i),
        toml::Value::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                match item {
                    toml::Value::String(s) => out.push(s.clone()),
                    other => {
                        return Err(mismatch(format!(
                            "list elements must be strings, got {}",
                            other.type_str()
                        )));
                    }
                }
            }
            Value::List(out)
        }
        other => {
            return Err(mismatch(format!(
                "unsupported value of type {}",
                other.type_str()
            )));
        }
    };

    check_value(name, spec.ty, &spec.values, &value)?;
    Ok(value)
}

/// Check a value against a declared type (and enum values).
pub fn check_value(name: &str, ty: VarType, values: &[String], value: &Value) -> Result<()> {
    if !value.fits(ty) {
        return Err(BuildError::TypeMismatch {
            name: name.to_string(),
            reason: format!("expected {ty}, got {value:?}"),
        });
    }
    if ty == VarType::Enum {
        if let Value::Str(s) = value {
            if !values.contains(s) {
                return Err(BuildError::TypeMismatch {
                    name: name.to_string(),
                    reason: format!("'{s}' is not one of {values:?}"),
                });
            }
        }
    }
    Ok(())
}

fn template_value(name: &str, ty: VarType, raw: &toml::Value) -> Result<Template> {
    match (ty, raw) {
        (VarType::String | VarType::Enum, toml::Value::String(s)) => Ok(Template::Str(s.clone())),
        (VarType::List, toml::Value::Array(items)) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                match item.as_str() {
                    Some(s) => out.push(s.to_string()),
                    None => {
                        return Err(BuildError::ConfigError(format!(
                            "template for list variable '{name}' must contain only strings"
                        )));
                    }
                }
            }
            Ok(Template::List(out))
        }
        _ => Err(BuildError::ConfigError(format!(
            "variable '{name}' of type {ty} cannot use a {} template",
            raw.type_str()
        ))),
    }
}

fn validate_component_references(components: &BTreeMap<String, ComponentSpec>) -> Result<()> {
    for (name, comp) in components.iter() {
        for dep in comp.after.iter() {
            if dep == name {
                return Err(BuildError::ConfigError(format!(
                    "component '{name}' cannot be built after itself"
                )));
            }
            if !components.contains_key(dep) {
                return Err(BuildError::ConfigError(format!(
                    "component '{name}' has unknown dependency '{dep}' in `after`"
                )));
            }
        }

        for step in comp.steps.iter() {
            for target in step.after.iter() {
                let (target_comp, target_step) = match target.split_once('/') {
                    Some((c, s)) => (c, Some(s)),
                    None => (target.as_str(), None),
                };
                let known = components.get(target_comp).is_some_and(|c| match target_step {
                    Some(s) => c.steps.iter().any(|st| st.name == s),
                    None => true,
                });
                if !known {
                    return Err(BuildError::ConfigError(format!(
                        "step '{name}/{}' has unknown ordering target '{target}'",
                        step.name
                    )));
                }
            }
        }
    }
    Ok(())
}

fn validate_component(name: &str, spec: &ComponentSpec) -> Result<ComponentDecl> {
    if !is_valid_name(name) {
        return Err(BuildError::ConfigError(format!(
            "invalid component name '{name}'"
        )));
    }

    let parse_when = |owner: String, src: &Option<String>| -> Result<Option<Condition>> {
        let Some(src) = src.as_deref() else {
            return Ok(None);
        };
        let cond = Condition::parse(src).map_err(|reason| BuildError::UnresolvableCondition {
            name: owner.clone(),
            reason,
        })?;
        if let Some(local) = cond
            .variables()
            .into_iter()
            .find(|v| COMPONENT_BUILTINS.contains(&v.as_str()))
        {
            return Err(BuildError::UnresolvableCondition {
                name: owner,
                reason: format!("'{local}' cannot be used in a condition"),
            });
        }
        Ok(Some(cond))
    };

    let mut seen = BTreeSet::new();
    let mut steps = Vec::with_capacity(spec.steps.len());
    for step in spec.steps.iter() {
        if !is_valid_name(&step.name) {
            return Err(BuildError::ConfigError(format!(
                "invalid step name '{}' in component '{name}'",
                step.name
            )));
        }
        if !seen.insert(step.name.clone()) {
            return Err(BuildError::ConfigError(format!(
                "duplicate step '{}' in component '{name}'",
                step.name
            )));
        }
        for cmd in step.commands.iter() {
            if cmd.first().is_none_or(|program| program.is_empty()) {
                return Err(BuildError::ConfigError(format!(
                    "empty command in step '{name}/{}'",
                    step.name
                )));
            }
        }

        let owner = format!("{name}/{}", step.name);
        steps.push(StepDecl {
            when: parse_when(owner.clone(), &step.when)?,
            env: validate_env(&owner, &step.env, &step.env_prepend)?,
            name: step.name.clone(),
            cwd: step.cwd.clone(),
            after: step.after.clone(),
            commands: step.commands.clone(),
            create_dirs: step.create_dirs.clone(),
            empty_dirs: step.empty_dirs.clone(),
        });
    }

    Ok(ComponentDecl {
        name: name.to_string(),
        when: parse_when(name.to_string(), &spec.when)?,
        after: spec.after.clone(),
        workdir: spec.workdir.clone(),
        env: validate_env(name, &spec.env, &spec.env_prepend)?,
        steps,
    })
}

fn validate_env(
    owner: &str,
    set: &BTreeMap<String, String>,
    prepend: &BTreeMap<String, Vec<String>>,
) -> Result<EnvDecl> {
    for var in set.keys().chain(prepend.keys()) {
        if !is_env_name(var) {
            return Err(BuildError::ConfigError(format!(
                "invalid environment variable name '{var}' in '{owner}'"
            )));
        }
    }
    if let Some(both) = set.keys().find(|k| prepend.contains_key(*k)) {
        return Err(BuildError::ConfigError(format!(
            "environment variable '{both}' is both set and prepended to in '{owner}'"
        )));
    }
    Ok(EnvDecl {
        set: set.clone(),
        prepend: prepend.clone(),
    })
}

/// Portable environment variable name: `[A-Za-z_][A-Za-z0-9_]*`.
fn is_env_name(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
