// src/config/mod.rs

//! Configuration handling.
//!
//! Two kinds of configuration live here:
//!
//! - the per-workspace preview config (`preview.toml`) listing the instances
//!   of a task group, loaded through the [`ConfigLoader`] seam;
//! - the orchestrator's own [`OrchestratorOptions`] (port range, timeouts,
//!   idle threshold, ...).

pub mod loader;
pub mod model;
pub mod options;
pub mod validate;

pub use loader::{ConfigLoader, TomlConfigLoader, load_and_validate, load_from_path};
pub use model::{
    InstallSection, InstallStep, PreviewConfig, PreviewInstanceConfig, RawPreviewConfig,
};
pub use options::{OrchestratorOptions, RawOptions, load_options, parse_duration};
