// src/config/mod.rs

//! Release configuration: loading, validation and evaluation.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a config file from disk and apply overrides (`loader.rs`).
//! - Validate names, types and condition syntax (`validate.rs`).
//! - Parse and evaluate conditions (`condition.rs`) and `${name}`
//!   templates (`template.rs`).
//! - Resolve the variable graph into a [`ReleaseConfig`] (`eval.rs`).

pub mod condition;
pub mod eval;
pub mod loader;
pub mod model;
pub mod template;
pub mod validate;

pub use condition::Condition;
pub use eval::{resolve, ReleaseConfig, ResolvedComponent, ResolvedStep};
pub use loader::{apply_overrides, load_and_validate, load_from_path};
pub use model::{
    ComponentSpec, EnvDecl, RawReleaseFile, RawVarSpec, ReleaseFile, ReleaseSection, StepSpec,
};
pub use validate::validate_config;
