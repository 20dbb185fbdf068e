// src/config/loader.rs

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::config::model::{PreviewConfig, RawPreviewConfig};
use crate::config::validate::ConfigProblem;
use crate::errors::{PreviewError, Result};

/// Default file name of the per-workspace preview config.
pub const DEFAULT_CONFIG_FILE: &str = "preview.toml";

/// Seam for locating and parsing a workspace's preview config.
///
/// The orchestrator never re-validates what a loader returns.
pub trait ConfigLoader: Send + Sync {
    /// Where the config for `workspace_dir` lives (watched for hot reload).
    fn config_path(&self, workspace_dir: &Path) -> PathBuf;

    /// Parse and validate the config for `workspace_dir`.
    fn load(&self, workspace_dir: &Path) -> Result<PreviewConfig>;
}

/// Loads `<workspace>/<file_name>` as TOML.
#[derive(Debug, Clone)]
pub struct TomlConfigLoader {
    file_name: String,
}

impl TomlConfigLoader {
    pub fn new(file_name: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
        }
    }
}

impl Default for TomlConfigLoader {
    fn default() -> Self {
        Self::new(DEFAULT_CONFIG_FILE)
    }
}

impl ConfigLoader for TomlConfigLoader {
    fn config_path(&self, workspace_dir: &Path) -> PathBuf {
        workspace_dir.join(&self.file_name)
    }

    fn load(&self, workspace_dir: &Path) -> Result<PreviewConfig> {
        load_and_validate(self.config_path(workspace_dir))
    }
}

/// Read a preview config file and return the raw `RawPreviewConfig`.
///
/// This only performs TOML deserialization. A missing file maps to
/// `ConfigMissing`, any other read or parse failure to `ConfigInvalid`.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawPreviewConfig> {
    let path = path.as_ref();
    let contents = match fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(PreviewError::ConfigMissing {
                reason: format!("{} not found", path.display()),
            });
        }
        Err(e) => return Err(PreviewError::config_invalid(path, e.to_string())),
    };

    toml::from_str(&contents).map_err(|e| PreviewError::config_invalid(path, e.to_string()))
}

/// Load a preview config from path and validate it.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<PreviewConfig> {
    let path = path.as_ref();
    let raw = load_from_path(path)?;
    PreviewConfig::try_from(raw).map_err(|problem| match problem {
        ConfigProblem::NoInstances => PreviewError::ConfigMissing {
            reason: format!("{} declares no [[instance]] entries", path.display()),
        },
        ConfigProblem::Invalid(reason) => PreviewError::config_invalid(path, reason),
    })
}
