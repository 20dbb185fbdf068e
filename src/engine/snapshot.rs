// src/engine/snapshot.rs

//! Public, serialisable views of orchestrator state.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::{OrchestratorOptions, PreviewConfig};
use crate::engine::state::{GroupRuntime, InstanceRuntime};
use crate::errors::ErrorCode;
use crate::install::DependencyResult;
use crate::logs::LogEntry;
use crate::types::InstanceStatus;

/// Why an instance ended up `failed` or `timeout`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Diagnostics {
    pub exit_code: Option<i32>,
    pub signal: Option<String>,
    pub last_log_lines: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceSummary {
    pub name: String,
    pub status: InstanceStatus,
    /// Present only while starting or running.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostics: Option<Diagnostics>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ready_at: Option<DateTime<Utc>>,
}

/// Result of a start call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StartSnapshot {
    pub instances: Vec<InstanceSummary>,
    pub dependencies: DependencyResult,
}

impl StartSnapshot {
    pub fn instance(&self, name: &str) -> Option<&InstanceSummary> {
        self.instances.iter().find(|i| i.name == name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupStatus {
    /// Whether the group has a usable preview configuration.
    pub available: bool,
    pub instances: Vec<InstanceSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<ErrorCode>,
}

impl GroupStatus {
    pub fn instance(&self, name: &str) -> Option<&InstanceSummary> {
        self.instances.iter().find(|i| i.name == name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogSnapshot {
    pub instance: String,
    pub logs: Vec<LogEntry>,
}

/// Where the proxy layer should forward traffic for an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProxyTarget {
    pub port: u16,
    pub status: InstanceStatus,
}

/// Routable path of an instance behind the preview proxy.
pub fn preview_path(group: &str, instance: &str) -> String {
    format!("/preview/{group}/{instance}/")
}

fn public_url(options: &OrchestratorOptions, group: &str, instance: &str) -> Option<String> {
    options
        .public_url_template
        .as_ref()
        .map(|t| t.replace("{group}", group).replace("{instance}", instance))
}

pub(crate) fn stopped_summary(
    options: &OrchestratorOptions,
    group: &str,
    instance: &str,
) -> InstanceSummary {
    InstanceSummary {
        name: instance.to_string(),
        status: InstanceStatus::Stopped,
        port: None,
        path: preview_path(group, instance),
        public_url: public_url(options, group, instance),
        message: None,
        diagnostics: None,
        started_at: None,
        ready_at: None,
    }
}

pub(crate) fn instance_summary(
    options: &OrchestratorOptions,
    runtime: &InstanceRuntime,
) -> InstanceSummary {
    let state = runtime.state();
    let name = runtime.name();

    let diagnostics = state.status.has_diagnostics().then(|| Diagnostics {
        exit_code: state.exit.and_then(|e| e.code),
        signal: state.exit.and_then(|e| e.signal_name()),
        last_log_lines: runtime.log.last_lines(options.diagnostic_lines),
    });

    InstanceSummary {
        name: name.to_string(),
        status: state.status,
        port: state.status.is_live().then_some(runtime.port),
        path: preview_path(&runtime.group, name),
        public_url: public_url(options, &runtime.group, name),
        message: state.message,
        diagnostics,
        started_at: Some(runtime.started_at),
        ready_at: state.ready_at,
    }
}

/// Every configured instance in declaration order, then any runtime-only
/// instances left over from an older config generation.
pub(crate) fn merged_summaries(
    options: &OrchestratorOptions,
    group: &str,
    config: &PreviewConfig,
    runtime: Option<&GroupRuntime>,
) -> Vec<InstanceSummary> {
    let mut summaries: Vec<InstanceSummary> = config
        .instances
        .iter()
        .map(|configured| {
            match runtime.and_then(|r| r.instance(&configured.name)) {
                Some(live) => instance_summary(options, live),
                None => stopped_summary(options, group, &configured.name),
            }
        })
        .collect();

    if let Some(runtime) = runtime {
        for live in &runtime.instances {
            if config.instance(live.name()).is_none() {
                summaries.push(instance_summary(options, live));
            }
        }
    }
    summaries
}

pub(crate) fn runtime_summaries(
    options: &OrchestratorOptions,
    runtime: &GroupRuntime,
) -> Vec<InstanceSummary> {
    runtime
        .instances
        .iter()
        .map(|live| instance_summary(options, live))
        .collect()
}
