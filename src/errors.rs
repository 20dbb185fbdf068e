// src/errors.rs

//! Crate-wide error type and reason codes.
//!
//! Every public orchestrator entry point that can fail returns exactly one
//! [`PreviewError`] variant. The control layer maps [`ErrorCode`] to its own
//! transport status; nothing in this crate relies on the message text.

use std::fmt;
use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PreviewError {
    #[error("invalid task group id '{group}'")]
    InvalidGroup { group: String },

    #[error("task group '{group}' not found")]
    MissingTask { group: String },

    #[error("workspace for task group '{group}' not found at {path:?}")]
    WorkspaceMissing { group: String, path: PathBuf },

    #[error("preview is not configured: {reason}")]
    ConfigMissing { reason: String },

    #[error("preview config {path:?} is invalid: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("preview instance '{instance}' is invalid: {reason}")]
    InstanceInvalid { instance: String, reason: String },

    #[error("dependency installation failed: {reason}")]
    DependencyFailed { reason: String },

    #[error("no ports available in {start}-{end}")]
    PortUnavailable { start: u16, end: u16 },
}

/// Stable reason codes, one per [`PreviewError`] variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    InvalidGroup,
    MissingTask,
    WorkspaceMissing,
    ConfigMissing,
    ConfigInvalid,
    InstanceInvalid,
    DependencyFailed,
    PortUnavailable,
}

impl PreviewError {
    pub fn code(&self) -> ErrorCode {
        match self {
            PreviewError::InvalidGroup { .. } => ErrorCode::InvalidGroup,
            PreviewError::MissingTask { .. } => ErrorCode::MissingTask,
            PreviewError::WorkspaceMissing { .. } => ErrorCode::WorkspaceMissing,
            PreviewError::ConfigMissing { .. } => ErrorCode::ConfigMissing,
            PreviewError::ConfigInvalid { .. } => ErrorCode::ConfigInvalid,
            PreviewError::InstanceInvalid { .. } => ErrorCode::InstanceInvalid,
            PreviewError::DependencyFailed { .. } => ErrorCode::DependencyFailed,
            PreviewError::PortUnavailable { .. } => ErrorCode::PortUnavailable,
        }
    }

    pub(crate) fn instance(instance: &str, reason: impl Into<String>) -> Self {
        PreviewError::InstanceInvalid {
            instance: instance.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn config_invalid(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        PreviewError::ConfigInvalid {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::InvalidGroup => "invalid_group",
            ErrorCode::MissingTask => "missing_task",
            ErrorCode::WorkspaceMissing => "workspace_missing",
            ErrorCode::ConfigMissing => "config_missing",
            ErrorCode::ConfigInvalid => "config_invalid",
            ErrorCode::InstanceInvalid => "instance_invalid",
            ErrorCode::DependencyFailed => "dependency_failed",
            ErrorCode::PortUnavailable => "port_unavailable",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub type Result<T> = std::result::Result<T, PreviewError>;
