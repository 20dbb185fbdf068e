// src/config/model.rs

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Preview configuration as read from a workspace's `preview.toml`.
///
/// ```toml
/// [install]
/// inputs = ["package-lock.json"]
/// steps = [{ name = "npm", command = "npm ci" }]
///
/// [[instance]]
/// name = "web"
/// command = "npm run dev -- --port {{PORT}}"
/// workdir = "apps/web"
/// ready_pattern = "ready in"
///
/// [instance.env]
/// API_URL = "http://127.0.0.1:{{PORT}}/api"
/// ```
///
/// This is the raw, unchecked form. Use [`PreviewConfig::try_from`] (or
/// `load_and_validate`) to obtain a validated [`PreviewConfig`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawPreviewConfig {
    #[serde(default)]
    pub install: InstallSection,

    /// All `[[instance]]` tables, in declaration order.
    #[serde(default)]
    pub instance: Vec<PreviewInstanceConfig>,
}

/// One configured dev-server process.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct PreviewInstanceConfig {
    /// Unique within the group; also used in routable paths.
    pub name: String,

    /// Shell command template. `{{PORT}}` is replaced with the allocated port.
    pub command: String,

    /// Working directory relative to the workspace root.
    #[serde(default = "default_workdir")]
    pub workdir: String,

    /// Extra environment; values may contain `{{PORT}}`.
    #[serde(default)]
    pub env: BTreeMap<String, String>,

    /// Regex matched against output lines. When absent, readiness is detected
    /// by polling the allocated port.
    #[serde(default)]
    pub ready_pattern: Option<String>,
}

fn default_workdir() -> String {
    ".".to_string()
}

impl PreviewInstanceConfig {
    pub fn new(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
            workdir: default_workdir(),
            env: BTreeMap::new(),
            ready_pattern: None,
        }
    }
}

/// `[install]` section: how to install dependencies before the first start.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct InstallSection {
    /// Files whose combined content decides whether a new install is needed.
    #[serde(default)]
    pub inputs: Vec<String>,

    #[serde(default)]
    pub steps: Vec<InstallStep>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct InstallStep {
    pub name: String,
    pub command: String,

    #[serde(default = "default_workdir")]
    pub workdir: String,

    /// A failing optional step is recorded but does not abort the start.
    #[serde(default)]
    pub optional: bool,
}

/// Validated preview configuration.
///
/// Guaranteed to contain at least one instance with a unique name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviewConfig {
    pub install: InstallSection,
    pub instances: Vec<PreviewInstanceConfig>,
}

impl PreviewConfig {
    pub(crate) fn new_unchecked(
        install: InstallSection,
        instances: Vec<PreviewInstanceConfig>,
    ) -> Self {
        Self { install, instances }
    }

    pub fn instance(&self, name: &str) -> Option<&PreviewInstanceConfig> {
        self.instances.iter().find(|i| i.name == name)
    }
}
