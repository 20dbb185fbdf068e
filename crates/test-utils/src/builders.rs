#![allow(dead_code)]

use std::collections::BTreeMap;

use previewd::config::{
    InstallSection, InstallStep, PreviewConfig, PreviewInstanceConfig, RawPreviewConfig,
};
use serde::Serialize;

/// Builder for a workspace preview config, as a validated `PreviewConfig` or
/// as `preview.toml` text.
#[derive(Debug, Clone, Default)]
pub struct PreviewConfigBuilder {
    install: InstallSection,
    instances: Vec<PreviewInstanceConfig>,
}

#[derive(Serialize)]
struct TomlDocument<'a> {
    install: &'a InstallSection,
    instance: &'a [PreviewInstanceConfig],
}

impl PreviewConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_instance(mut self, instance: InstanceBuilder) -> Self {
        self.instances.push(instance.build());
        self
    }

    pub fn with_install_input(mut self, path: &str) -> Self {
        self.install.inputs.push(path.to_string());
        self
    }

    pub fn with_install_step(mut self, name: &str, command: &str) -> Self {
        self.install.steps.push(InstallStep {
            name: name.to_string(),
            command: command.to_string(),
            workdir: ".".to_string(),
            optional: false,
        });
        self
    }

    pub fn with_optional_install_step(mut self, name: &str, command: &str) -> Self {
        self.install.steps.push(InstallStep {
            name: name.to_string(),
            command: command.to_string(),
            workdir: ".".to_string(),
            optional: true,
        });
        self
    }

    pub fn build(self) -> PreviewConfig {
        PreviewConfig::try_from(RawPreviewConfig {
            install: self.install,
            instance: self.instances,
        })
        .expect("Failed to build valid preview config from builder")
    }

    pub fn to_toml(&self) -> String {
        toml::to_string(&TomlDocument {
            install: &self.install,
            instance: &self.instances,
        })
        .expect("Failed to serialise preview config")
    }
}

/// Builder for one `[[instance]]`.
#[derive(Debug, Clone)]
pub struct InstanceBuilder {
    instance: PreviewInstanceConfig,
}

impl InstanceBuilder {
    pub fn new(name: &str, command: &str) -> Self {
        Self {
            instance: PreviewInstanceConfig::new(name, command),
        }
    }

    pub fn workdir(mut self, workdir: &str) -> Self {
        self.instance.workdir = workdir.to_string();
        self
    }

    pub fn env(mut self, key: &str, value: &str) -> Self {
        self.instance.env.insert(key.to_string(), value.to_string());
        self
    }

    pub fn ready_pattern(mut self, pattern: &str) -> Self {
        self.instance.ready_pattern = Some(pattern.to_string());
        self
    }

    pub fn build(self) -> PreviewInstanceConfig {
        self.instance
    }
}

/// Env map literal helper.
pub fn env_map(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}
