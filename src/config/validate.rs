// src/config/validate.rs

use std::collections::HashSet;

use regex::Regex;

use crate::config::model::{PreviewConfig, PreviewInstanceConfig, RawPreviewConfig};

/// Placeholder replaced with the allocated port in commands and env values.
pub const PORT_PLACEHOLDER: &str = "{{PORT}}";

/// Why a raw preview config was rejected.
///
/// Zero instances is kept apart from the other problems because it means
/// "preview is not configured" rather than "the config is broken".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigProblem {
    NoInstances,
    Invalid(String),
}

impl TryFrom<RawPreviewConfig> for PreviewConfig {
    type Error = ConfigProblem;

    fn try_from(raw: RawPreviewConfig) -> Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(PreviewConfig::new_unchecked(raw.install, raw.instance))
    }
}

fn validate_raw_config(cfg: &RawPreviewConfig) -> Result<(), ConfigProblem> {
    if cfg.instance.is_empty() {
        return Err(ConfigProblem::NoInstances);
    }

    let mut seen = HashSet::new();
    for instance in &cfg.instance {
        validate_instance(instance)?;
        if !seen.insert(instance.name.as_str()) {
            return Err(ConfigProblem::Invalid(format!(
                "duplicate instance name '{}'",
                instance.name
            )));
        }
    }

    for step in &cfg.install.steps {
        if step.command.trim().is_empty() {
            return Err(ConfigProblem::Invalid(format!(
                "install step '{}' has an empty command",
                step.name
            )));
        }
    }

    Ok(())
}

fn validate_instance(instance: &PreviewInstanceConfig) -> Result<(), ConfigProblem> {
    let name = &instance.name;
    if !is_valid_name(name) {
        return Err(ConfigProblem::Invalid(format!(
            "instance name '{name}' must be non-empty and use only letters, digits, '-' or '_'"
        )));
    }

    if instance.command.trim().is_empty() {
        return Err(ConfigProblem::Invalid(format!(
            "instance '{name}' has an empty command"
        )));
    }

    if let Some(pattern) = &instance.ready_pattern {
        Regex::new(pattern).map_err(|e| {
            ConfigProblem::Invalid(format!("instance '{name}' has an invalid ready_pattern: {e}"))
        })?;
    }

    for (key, value) in &instance.env {
        if is_port_key(key) && !value.contains(PORT_PLACEHOLDER) {
            return Err(ConfigProblem::Invalid(format!(
                "instance '{name}': env {key} must use {PORT_PLACEHOLDER} instead of a fixed port (got '{value}')"
            )));
        }
    }

    Ok(())
}

/// Names and group ids end up in URL paths, so keep them to a safe alphabet.
pub fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

fn is_port_key(key: &str) -> bool {
    let key = key.to_ascii_uppercase();
    key == "PORT" || key.ends_with("_PORT")
}
