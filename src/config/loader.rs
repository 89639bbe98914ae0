// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::model::{RawReleaseFile, ReleaseFile, VarRule};
use crate::config::validate::check_value;
use crate::errors::{BuildError, Result};
use crate::types::Value;

/// Load a release configuration file and return the raw `RawReleaseFile`.
///
/// This only performs TOML deserialization; it does **not** perform semantic
/// validation. Use [`load_and_validate`] for that.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawReleaseFile> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;

    let config: RawReleaseFile = toml::from_str(&contents)?;

    Ok(config)
}

/// Load a release configuration from path and validate it.
///
/// - Reads TOML.
/// - Checks names, types, literal values and condition syntax.
/// - Checks component `after` references.
///
/// Relative paths in `[release]` are later resolved against the directory
/// containing the file.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<ReleaseFile> {
    let raw_config = load_from_path(&path)?;
    let config = ReleaseFile::try_from(raw_config)?;
    Ok(config.with_base_dir(config_root_dir(path.as_ref())))
}

/// Apply `name=value` overrides from the command line.
///
/// An override replaces the variable's literal or template rule; its `when`
/// condition still applies, and so do the evaluation-order edges of the
/// replaced rule.
pub fn apply_overrides(file: &mut ReleaseFile, overrides: &[String]) -> Result<()> {
    for ov in overrides {
        let (name, raw) = ov.split_once('=').ok_or_else(|| {
            BuildError::ConfigError(format!("override '{ov}' is not of the form name=value"))
        })?;
        let name = name.trim();

        let decl = file
            .vars
            .get_mut(name)
            .ok_or_else(|| BuildError::UnknownVariable(name.to_string()))?;

        let value = Value::parse_as(decl.ty, raw).map_err(|reason| BuildError::TypeMismatch {
            name: name.to_string(),
            reason,
        })?;
        check_value(name, decl.ty, &decl.values, &value)?;

        decl.rule = VarRule::Literal(value);
    }
    Ok(())
}

/// Directory that relative paths in a config file are resolved against.
///
/// A bare filename like `relbuild.toml` (parent = "") resolves to the current
/// working directory.
pub fn config_root_dir(config_path: &Path) -> PathBuf {
    match config_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
    }
}

