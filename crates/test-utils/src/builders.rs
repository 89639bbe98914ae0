#![allow(dead_code)]

use std::collections::BTreeMap;
use std::path::Path;

use relbuild::config::{ComponentSpec, RawReleaseFile, RawVarSpec, ReleaseFile, ReleaseSection, StepSpec};
use relbuild::types::VarType;

/// Builder for `ReleaseFile` to simplify test setup.
pub struct ReleaseFileBuilder {
    config: RawReleaseFile,
}

impl ReleaseFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawReleaseFile {
                release: ReleaseSection::default(),
                var: BTreeMap::new(),
                component: BTreeMap::new(),
            },
        }
    }

    pub fn name(mut self, name: &str) -> Self {
        self.config.release.name = name.to_string();
        self
    }

    /// Put the build and log directories under `root`.
    pub fn in_dir(mut self, root: &Path) -> Self {
        self.config.release.build_dir = root.join("obj");
        self.config.release.log_dir = root.join("logs");
        self
    }

    pub fn parallelism(mut self, n: usize) -> Self {
        self.config.release.parallelism = Some(n);
        self
    }

    pub fn with_var(mut self, name: &str, var: RawVarSpec) -> Self {
        self.config.var.insert(name.to_string(), var);
        self
    }

    pub fn with_component(mut self, name: &str, component: ComponentSpec) -> Self {
        self.config.component.insert(name.to_string(), component);
        self
    }

    pub fn raw(self) -> RawReleaseFile {
        self.config
    }

    pub fn build(self) -> ReleaseFile {
        ReleaseFile::try_from(self.config).expect("Failed to build valid release file from builder")
    }
}

impl Default for ReleaseFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `RawVarSpec`.
pub struct VarBuilder {
    var: RawVarSpec,
}

impl VarBuilder {
    pub fn new(ty: VarType) -> Self {
        Self {
            var: RawVarSpec {
                ty,
                ..RawVarSpec::default()
            },
        }
    }

    pub fn bool(value: bool) -> Self {
        Self::new(VarType::Bool).value(toml::Value::Boolean(value))
    }

    pub fn string(value: &str) -> Self {
        Self::new(VarType::String).value(toml::Value::String(value.to_string()))
    }

    pub fn int(value: i64) -> Self {
        Self::new(VarType::Int).value(toml::Value::Integer(value))
    }

    pub fn list(items: &[&str]) -> Self {
        let items = items
            .iter()
            .map(|s| toml::Value::String(s.to_string()))
            .collect();
        Self::new(VarType::List).value(toml::Value::Array(items))
    }

    pub fn enumeration(values: &[&str], value: &str) -> Self {
        let mut b = Self::new(VarType::Enum).value(toml::Value::String(value.to_string()));
        b.var.values = values.iter().map(|s| s.to_string()).collect();
        b
    }

    pub fn value(mut self, value: toml::Value) -> Self {
        self.var.value = Some(value);
        self
    }

    pub fn template(mut self, template: &str) -> Self {
        self.var.value = None;
        self.var.template = Some(toml::Value::String(template.to_string()));
        self
    }

    pub fn when(mut self, cond: &str) -> Self {
        self.var.when = Some(cond.to_string());
        self
    }

    pub fn inactive(mut self, value: toml::Value) -> Self {
        self.var.inactive = Some(value);
        self
    }

    pub fn depends(mut self, name: &str) -> Self {
        self.var.depends.push(name.to_string());
        self
    }

    pub fn build(self) -> RawVarSpec {
        self.var
    }
}

/// Builder for `ComponentSpec`.
pub struct ComponentBuilder {
    component: ComponentSpec,
}

impl ComponentBuilder {
    pub fn new() -> Self {
        Self {
            component: ComponentSpec::default(),
        }
    }

    pub fn when(mut self, cond: &str) -> Self {
        self.component.when = Some(cond.to_string());
        self
    }

    pub fn after(mut self, dep: &str) -> Self {
        self.component.after.push(dep.to_string());
        self
    }

    pub fn workdir(mut self, dir: &str) -> Self {
        self.component.workdir = Some(dir.to_string());
        self
    }

    pub fn env(mut self, var: &str, value: &str) -> Self {
        self.component.env.insert(var.to_string(), value.to_string());
        self
    }

    pub fn env_prepend(mut self, var: &str, entry: &str) -> Self {
        self.component
            .env_prepend
            .entry(var.to_string())
            .or_default()
            .push(entry.to_string());
        self
    }

    /// Add a step with the given commands, each written as `argv` slices.
    pub fn step(mut self, name: &str, commands: &[&[&str]]) -> Self {
        self.component.steps.push(StepBuilder::new(name).commands(commands).build());
        self
    }

    pub fn with_step(mut self, step: StepSpec) -> Self {
        self.component.steps.push(step);
        self
    }

    pub fn build(self) -> ComponentSpec {
        self.component
    }
}

impl Default for ComponentBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `StepSpec`.
pub struct StepBuilder {
    step: StepSpec,
}

impl StepBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            step: StepSpec {
                name: name.to_string(),
                ..StepSpec::default()
            },
        }
    }

    pub fn when(mut self, cond: &str) -> Self {
        self.step.when = Some(cond.to_string());
        self
    }

    pub fn cwd(mut self, dir: &str) -> Self {
        self.step.cwd = Some(dir.to_string());
        self
    }

    pub fn after(mut self, target: &str) -> Self {
        self.step.after.push(target.to_string());
        self
    }

    pub fn env(mut self, var: &str, value: &str) -> Self {
        self.step.env.insert(var.to_string(), value.to_string());
        self
    }

    pub fn env_prepend(mut self, var: &str, entry: &str) -> Self {
        self.step
            .env_prepend
            .entry(var.to_string())
            .or_default()
            .push(entry.to_string());
        self
    }

    pub fn create_dir(mut self, dir: &str) -> Self {
        self.step.create_dirs.push(dir.to_string());
        self
    }

    pub fn empty_dir(mut self, dir: &str) -> Self {
        self.step.empty_dirs.push(dir.to_string());
        self
    }

    pub fn command(mut self, argv: &[&str]) -> Self {
        self.step
            .commands
            .push(argv.iter().map(|s| s.to_string()).collect());
        self
    }

    pub fn commands(mut self, commands: &[&[&str]]) -> Self {
        for argv in commands {
            self = self.command(argv);
        }
        self
    }

    pub fn build(self) -> StepSpec {
        self.step
    }
}
