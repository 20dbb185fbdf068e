//! Fake collaborators for orchestrator tests.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use previewd::config::PreviewConfig;
use previewd::errors::PreviewError;
use previewd::install::{DependencyInstaller, DependencyResult, InstallFuture};

/// Counts calls and optionally sleeps, so concurrent starts overlap.
#[derive(Debug, Default)]
pub struct CountingInstaller {
    calls: AtomicUsize,
    forced: AtomicUsize,
    delay: Duration,
}

impl CountingInstaller {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn forced_calls(&self) -> usize {
        self.forced.load(Ordering::SeqCst)
    }
}

impl DependencyInstaller for CountingInstaller {
    fn install<'a>(
        &'a self,
        _workspace: &'a Path,
        _config: &'a PreviewConfig,
        force: bool,
    ) -> InstallFuture<'a> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if force {
                self.forced.fetch_add(1, Ordering::SeqCst);
            }
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            Ok(DependencyResult::skipped())
        })
    }
}

/// Always fails hard.
#[derive(Debug, Clone)]
pub struct FailingInstaller {
    pub reason: String,
}

impl FailingInstaller {
    pub fn new(reason: &str) -> Self {
        Self {
            reason: reason.to_string(),
        }
    }
}

impl DependencyInstaller for FailingInstaller {
    fn install<'a>(
        &'a self,
        _workspace: &'a Path,
        _config: &'a PreviewConfig,
        _force: bool,
    ) -> InstallFuture<'a> {
        Box::pin(async move {
            Err(PreviewError::DependencyFailed {
                reason: self.reason.clone(),
            })
        })
    }
}
