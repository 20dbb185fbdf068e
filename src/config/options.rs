// src/config/options.rs

//! Orchestrator-wide options.
//!
//! ```toml
//! [orchestrator]
//! port_range = [10000, 10999]
//! readiness_timeout = "5m"
//! idle_timeout = "30m"
//! public_url_template = "https://{instance}--{group}.preview.example.com"
//! ```
//!
//! Every key is optional. Durations are strings such as `"250ms"`, `"3s"`,
//! `"5m"` or `"1h"`.

use std::fs;
use std::ops::RangeInclusive;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::Deserialize;

use crate::config::loader::DEFAULT_CONFIG_FILE;

#[derive(Debug, Clone, Default, Deserialize)]
struct OptionsFile {
    #[serde(default)]
    orchestrator: RawOptions,
}

/// `[orchestrator]` table as written on disk.
#[derive(Debug, Clone, Deserialize)]
pub struct RawOptions {
    #[serde(default = "default_port_range")]
    pub port_range: [u16; 2],

    #[serde(default = "default_readiness_timeout")]
    pub readiness_timeout: String,

    #[serde(default = "default_readiness_poll_interval")]
    pub readiness_poll_interval: String,

    #[serde(default = "default_stop_grace")]
    pub stop_grace: String,

    #[serde(default = "default_reload_debounce")]
    pub reload_debounce: String,

    #[serde(default = "default_idle_timeout")]
    pub idle_timeout: String,

    #[serde(default = "default_idle_sweep_interval")]
    pub idle_sweep_interval: String,

    #[serde(default = "default_log_capacity")]
    pub log_capacity: usize,

    #[serde(default = "default_diagnostic_lines")]
    pub diagnostic_lines: usize,

    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_config_file")]
    pub config_file: String,

    #[serde(default)]
    pub public_url_template: Option<String>,
}

fn default_port_range() -> [u16; 2] {
    [10000, 10999]
}

fn default_readiness_timeout() -> String {
    "5m".to_string()
}

fn default_readiness_poll_interval() -> String {
    "500ms".to_string()
}

fn default_stop_grace() -> String {
    "3s".to_string()
}

fn default_reload_debounce() -> String {
    "750ms".to_string()
}

fn default_idle_timeout() -> String {
    "30m".to_string()
}

fn default_idle_sweep_interval() -> String {
    "60s".to_string()
}

fn default_log_capacity() -> usize {
    500
}

fn default_diagnostic_lines() -> usize {
    20
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_config_file() -> String {
    DEFAULT_CONFIG_FILE.to_string()
}

impl Default for RawOptions {
    fn default() -> Self {
        Self {
            port_range: default_port_range(),
            readiness_timeout: default_readiness_timeout(),
            readiness_poll_interval: default_readiness_poll_interval(),
            stop_grace: default_stop_grace(),
            reload_debounce: default_reload_debounce(),
            idle_timeout: default_idle_timeout(),
            idle_sweep_interval: default_idle_sweep_interval(),
            log_capacity: default_log_capacity(),
            diagnostic_lines: default_diagnostic_lines(),
            host: default_host(),
            config_file: default_config_file(),
            public_url_template: None,
        }
    }
}

/// Validated orchestrator options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrchestratorOptions {
    pub port_range: RangeInclusive<u16>,
    pub readiness_timeout: Duration,
    pub readiness_poll_interval: Duration,
    pub stop_grace: Duration,
    pub reload_debounce: Duration,
    pub idle_timeout: Duration,
    pub idle_sweep_interval: Duration,
    pub log_capacity: usize,
    pub diagnostic_lines: usize,
    pub host: String,
    pub config_file: String,
    pub public_url_template: Option<String>,
}

impl Default for OrchestratorOptions {
    fn default() -> Self {
        Self {
            port_range: 10000..=10999,
            readiness_timeout: Duration::from_secs(5 * 60),
            readiness_poll_interval: Duration::from_millis(500),
            stop_grace: Duration::from_millis(3000),
            reload_debounce: Duration::from_millis(750),
            idle_timeout: Duration::from_secs(30 * 60),
            idle_sweep_interval: Duration::from_secs(60),
            log_capacity: 500,
            diagnostic_lines: 20,
            host: default_host(),
            config_file: default_config_file(),
            public_url_template: None,
        }
    }
}

impl TryFrom<RawOptions> for OrchestratorOptions {
    type Error = anyhow::Error;

    fn try_from(raw: RawOptions) -> Result<Self> {
        let [start, end] = raw.port_range;
        if start == 0 || start > end {
            bail!(
                "[orchestrator].port_range must be [low, high] with 0 < low <= high (got [{start}, {end}])"
            );
        }
        if raw.log_capacity == 0 {
            bail!("[orchestrator].log_capacity must be >= 1 (got 0)");
        }
        if raw.config_file.trim().is_empty() {
            bail!("[orchestrator].config_file must not be empty");
        }

        let readiness_poll_interval =
            duration_field("readiness_poll_interval", &raw.readiness_poll_interval)?;
        if readiness_poll_interval.is_zero() {
            bail!("[orchestrator].readiness_poll_interval must be greater than zero");
        }
        let idle_sweep_interval =
            duration_field("idle_sweep_interval", &raw.idle_sweep_interval)?;
        if idle_sweep_interval.is_zero() {
            bail!("[orchestrator].idle_sweep_interval must be greater than zero");
        }

        Ok(Self {
            port_range: start..=end,
            readiness_timeout: duration_field("readiness_timeout", &raw.readiness_timeout)?,
            readiness_poll_interval,
            stop_grace: duration_field("stop_grace", &raw.stop_grace)?,
            reload_debounce: duration_field("reload_debounce", &raw.reload_debounce)?,
            idle_timeout: duration_field("idle_timeout", &raw.idle_timeout)?,
            idle_sweep_interval,
            log_capacity: raw.log_capacity,
            diagnostic_lines: raw.diagnostic_lines,
            host: raw.host,
            config_file: raw.config_file,
            public_url_template: raw.public_url_template,
        })
    }
}

fn duration_field(field: &str, value: &str) -> Result<Duration> {
    parse_duration(value).map_err(|e| anyhow::anyhow!("[orchestrator].{field}: {e}"))
}

/// Load options from an optional TOML file; `None` yields the defaults.
pub fn load_options(path: Option<&Path>) -> Result<OrchestratorOptions> {
    let Some(path) = path else {
        return Ok(OrchestratorOptions::default());
    };

    let contents = fs::read_to_string(path)
        .with_context(|| format!("reading options file {}", path.display()))?;
    let file: OptionsFile = toml::from_str(&contents)
        .with_context(|| format!("parsing options file {}", path.display()))?;

    OrchestratorOptions::try_from(file.orchestrator)
}

/// Parse a simple duration string like `"3s"`, `"250ms"`, `"1m"`, `"2h"`.
fn scaled_secs(value: u64, factor: u64, raw: &str) -> std::result::Result<Duration, String> {
    value
        .checked_mul(factor)
        .map(Duration::from_secs)
        .ok_or_else(|| format!("duration '{raw}' is too large"))
}

pub fn parse_duration(s: &str) -> std::result::Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty duration string".to_string());
    }

    // Find the boundary between digits and suffix.
    let idx = s
        .chars()
        .position(|c| !c.is_ascii_digit())
        .ok_or_else(|| "duration missing unit suffix".to_string())?;

    let (num_part, unit_part) = s.split_at(idx);
    let value: u64 = num_part
        .parse()
        .map_err(|e| format!("invalid duration number '{}': {}", num_part, e))?;
    let unit = unit_part.trim().to_lowercase();

    match unit.as_str() {
        "ms" => Ok(Duration::from_millis(value)),
        "s" => Ok(Duration::from_secs(value)),
        "m" => scaled_secs(value, 60, s),
        "h" => scaled_secs(value, 60 * 60, s),
        _ => Err(format!(
            "unsupported duration unit '{}'; expected ms, s, m, or h",
            unit
        )),
    }
}
