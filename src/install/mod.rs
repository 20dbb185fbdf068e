// src/install/mod.rs

//! Dependency installation before a group's first start.
//!
//! The orchestrator talks to a [`DependencyInstaller`]; production code uses
//! [`ShellDependencyInstaller`], tests can swap in fakes that count calls or
//! fail on demand.

pub mod hash;
pub mod shell;

use std::future::Future;
use std::path::Path;
use std::pin::Pin;

use serde::Serialize;

use crate::config::PreviewConfig;
use crate::errors::Result;

pub use hash::{InstallStamps, compute_input_hash};
pub use shell::ShellDependencyInstaller;

pub type InstallFuture<'a> = Pin<Box<dyn Future<Output = Result<DependencyResult>> + Send + 'a>>;

/// Seam for installing a workspace's dependencies.
///
/// A hard failure is an `Err(PreviewError::DependencyFailed)`; a soft failure
/// is an `Ok` result with [`DependencyStatus::Degraded`].
pub trait DependencyInstaller: Send + Sync {
    /// `force` bypasses any "already installed" shortcut.
    fn install<'a>(
        &'a self,
        workspace: &'a Path,
        config: &'a PreviewConfig,
        force: bool,
    ) -> InstallFuture<'a>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DependencyStatus {
    /// Nothing to do: no steps, or inputs unchanged since the last install.
    Skipped,
    Installed,
    /// At least one optional step failed.
    Degraded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DependencyStep {
    pub name: String,
    pub command: String,
    pub status: StepStatus,
    pub exit_code: Option<i32>,
    pub duration_ms: u64,
    /// Last lines of combined output.
    pub output: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DependencyResult {
    pub status: DependencyStatus,
    pub steps: Vec<DependencyStep>,
}

impl DependencyResult {
    pub fn skipped() -> Self {
        Self {
            status: DependencyStatus::Skipped,
            steps: Vec::new(),
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.status == DependencyStatus::Degraded
    }
}

/// Installer that never does anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopInstaller;

impl DependencyInstaller for NoopInstaller {
    fn install<'a>(
        &'a self,
        _workspace: &'a Path,
        _config: &'a PreviewConfig,
        _force: bool,
    ) -> InstallFuture<'a> {
        Box::pin(async { Ok(DependencyResult::skipped()) })
    }
}
