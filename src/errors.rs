// src/errors.rs

//! Crate-wide error aliases and helpers.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BuildError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Circular dependency in release config: {0}")]
    CyclicDependency(String),

    #[error("Unresolvable condition for '{name}': {reason}")]
    UnresolvableCondition { name: String, reason: String },

    #[error("Bad value for release config variable '{name}': {reason}")]
    TypeMismatch { name: String, reason: String },

    #[error("Unknown variable '{0}'")]
    UnknownVariable(String),

    #[error("Cycle detected in task graph involving task '{0}'")]
    TaskGraphCycle(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("Status message encoding error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl BuildError {
    /// Whether this error was detected while evaluating configuration, i.e.
    /// before any task could have run.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            BuildError::ConfigError(_)
                | BuildError::CyclicDependency(_)
                | BuildError::UnresolvableCondition { .. }
                | BuildError::TypeMismatch { .. }
                | BuildError::UnknownVariable(_)
                | BuildError::TaskGraphCycle(_)
                | BuildError::TomlError(_)
        )
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, BuildError>;
