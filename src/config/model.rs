// src/config/model.rs

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use serde::Deserialize;

use crate::config::condition::Condition;
use crate::types::{Value, VarType};

/// Release configuration as read from a TOML file, before validation.
///
/// ```toml
/// [release]
/// name = "arm-toolchain"
/// build_dir = "obj"
/// log_dir = "logs"
///
/// [var.target]
/// type = "string"
/// value = "arm-none-eabi"
///
/// [var.with_gdb]
/// type = "bool"
/// value = true
///
/// [component.gdb]
/// when = "with_gdb"
/// after = ["binutils"]
/// workdir = "${objdir}"
/// env_prepend = { PATH = ["${build_dir}/install/bin"] }
///
/// [[component.gdb.step]]
/// name = "configure"
/// commands = [["../src/gdb/configure", "--target=${target}"]]
/// ```
///
/// All sections are optional; an empty file is a valid (if useless) release.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawReleaseFile {
    #[serde(default)]
    pub release: ReleaseSection,

    /// Release config variables from `[var.<name>]`.
    #[serde(default)]
    pub var: BTreeMap<String, RawVarSpec>,

    /// Components from `[component.<name>]`.
    #[serde(default)]
    pub component: BTreeMap<String, ComponentSpec>,
}

/// `[release]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct ReleaseSection {
    #[serde(default = "default_release_name")]
    pub name: String,

    /// Top-level build directory, relative to the config file.
    #[serde(default = "default_build_dir")]
    pub build_dir: PathBuf,

    /// Directory for per-task logs, relative to the config file.
    ///
    /// Logs survive across invocations; a re-run rotates them.
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,

    /// Default `make -j` level; the CLI flag wins over this.
    #[serde(default)]
    pub parallelism: Option<usize>,
}

fn default_release_name() -> String {
    "release".to_string()
}

fn default_build_dir() -> PathBuf {
    PathBuf::from("obj")
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("logs")
}

impl Default for ReleaseSection {
    fn default() -> Self {
        Self {
            name: default_release_name(),
            build_dir: default_build_dir(),
            log_dir: default_log_dir(),
            parallelism: None,
        }
    }
}

/// `[var.<name>]` section as written in the file.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawVarSpec {
    #[serde(rename = "type", default)]
    pub ty: VarType,

    /// Literal value used when the variable is active.
    #[serde(default)]
    pub value: Option<toml::Value>,

    /// Computed value: a string (or, for lists, an array of strings) with
    /// `${name}` references to other variables.
    #[serde(default)]
    pub template: Option<toml::Value>,

    /// Condition under which the variable is active.
    #[serde(default)]
    pub when: Option<String>,

    /// Value taken when `when` evaluates false.
    #[serde(default)]
    pub inactive: Option<toml::Value>,

    /// Allowed values for `type = "enum"`.
    #[serde(default)]
    pub values: Vec<String>,

    /// Extra dependencies not visible in `when` or `template`.
    #[serde(default)]
    pub depends: Vec<String>,

    #[serde(default)]
    pub doc: Option<String>,
}

/// `[component.<name>]` section.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ComponentSpec {
    /// Condition under which the component is built at all.
    #[serde(default)]
    pub when: Option<String>,

    /// Components that must be completely built before this one starts.
    ///
    /// Inactive components named here are ignored.
    #[serde(default)]
    pub after: Vec<String>,

    /// Working directory template for all steps; defaults to the build
    /// directory.
    #[serde(default)]
    pub workdir: Option<String>,

    /// Environment variables set for every step, e.g. `{ CC = "gcc" }`.
    #[serde(default)]
    pub env: BTreeMap<String, String>,

    /// Entries prepended to colon-separated variables such as `PATH`, in
    /// the order given.
    #[serde(default)]
    pub env_prepend: BTreeMap<String, Vec<String>>,

    /// Ordered build steps; `[[component.<name>.step]]`.
    #[serde(default, rename = "step")]
    pub steps: Vec<StepSpec>,
}

/// `[[component.<name>.step]]` entry.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct StepSpec {
    pub name: String,

    #[serde(default)]
    pub when: Option<String>,

    /// Overrides the component's `workdir` for this step.
    #[serde(default)]
    pub cwd: Option<String>,

    /// Extra ordering edges, each `"component"` or `"component/step"`.
    #[serde(default)]
    pub after: Vec<String>,

    /// Commands run in sequence; each is `[program, args...]`.
    #[serde(default)]
    pub commands: Vec<Vec<String>>,

    /// Set on top of the component's environment.
    #[serde(default)]
    pub env: BTreeMap<String, String>,

    /// Prepended on top of the component's environment.
    #[serde(default)]
    pub env_prepend: BTreeMap<String, Vec<String>>,

    /// Directories created (`mkdir -p`) before the first command.
    #[serde(default)]
    pub create_dirs: Vec<String>,

    /// Directories removed and recreated before the first command. Must lie
    /// inside the build directory.
    #[serde(default)]
    pub empty_dirs: Vec<String>,
}

/// How a variable's value is computed when it is active.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VarRule {
    Literal(Value),
    Template(Template),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Template {
    Str(String),
    List(Vec<String>),
}

/// Environment changes of one component or step, still uninterpolated.
///
/// A variable is either set or prepended to at one level, never both. A
/// step's settings apply after its component's: a step `env` entry replaces
/// whatever the component did to that variable, a step `env_prepend` entry
/// goes in front of it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvDecl {
    pub set: BTreeMap<String, String>,
    pub prepend: BTreeMap<String, Vec<String>>,
}

impl EnvDecl {
    pub fn is_empty(&self) -> bool {
        self.set.is_empty() && self.prepend.is_empty()
    }
}

/// A validated release config variable.
#[derive(Debug, Clone)]
pub struct VarDecl {
    pub name: String,
    pub ty: VarType,
    pub rule: VarRule,
    pub when: Option<Condition>,
    pub inactive: Value,
    pub values: Vec<String>,
    /// Every variable this one reads: `when`, `template` and `depends`.
    pub deps: BTreeSet<String>,
    pub doc: Option<String>,
}

/// Validated release file.
///
/// Constructed via `ReleaseFile::try_from(RawReleaseFile)` in
/// [`crate::config::validate`].
#[derive(Debug, Clone)]
pub struct ReleaseFile {
    pub release: ReleaseSection,
    pub vars: BTreeMap<String, VarDecl>,
    pub components: BTreeMap<String, ComponentDecl>,
    /// Directory that relative paths in `[release]` are resolved against.
    pub base_dir: PathBuf,
}

/// A validated component, conditions parsed.
#[derive(Debug, Clone)]
pub struct ComponentDecl {
    pub name: String,
    pub when: Option<Condition>,
    pub after: Vec<String>,
    pub workdir: Option<String>,
    pub env: EnvDecl,
    pub steps: Vec<StepDecl>,
}

#[derive(Debug, Clone)]
pub struct StepDecl {
    pub name: String,
    pub when: Option<Condition>,
    pub cwd: Option<String>,
    pub after: Vec<String>,
    pub commands: Vec<Vec<String>>,
    pub env: EnvDecl,
    pub create_dirs: Vec<String>,
    pub empty_dirs: Vec<String>,
}

impl ReleaseFile {
    pub(crate) fn new_unchecked(
        release: ReleaseSection,
        vars: BTreeMap<String, VarDecl>,
        components: BTreeMap<String, ComponentDecl>,
    ) -> Self {
        Self {
            release,
            vars,
            components,
            base_dir: PathBuf::from("."),
        }
    }

    pub fn with_base_dir(mut self, base_dir: impl Into<PathBuf>) -> Self {
        self.base_dir = base_dir.into();
        self
    }
}
