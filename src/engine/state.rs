// src/engine/state.rs

//! Runtime records owned by the orchestrator.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

use chrono::{DateTime, Utc};
use tokio::time::Instant;

use crate::config::{PreviewConfig, PreviewInstanceConfig};
use crate::exec::{ExitInfo, ProcessHandle};
use crate::logs::InstanceLog;
use crate::ports::PortPool;
use crate::types::InstanceStatus;

/// Mutable part of an instance runtime.
#[derive(Debug, Clone)]
pub(crate) struct InstanceState {
    pub status: InstanceStatus,
    pub message: Option<String>,
    pub ready_at: Option<DateTime<Utc>>,
    pub exit: Option<ExitInfo>,
    pub last_access_at: Instant,
}

/// One spawned (or failed-to-spawn) instance.
#[derive(Debug)]
pub(crate) struct InstanceRuntime {
    pub group: String,
    pub config: PreviewInstanceConfig,
    pub port: u16,
    pub started_at: DateTime<Utc>,
    pub log: Arc<InstanceLog>,
    state: Mutex<InstanceState>,
    process: OnceLock<ProcessHandle>,
    port_released: AtomicBool,
}

impl InstanceRuntime {
    pub fn new(
        group: &str,
        config: PreviewInstanceConfig,
        port: u16,
        log: Arc<InstanceLog>,
    ) -> Self {
        Self {
            group: group.to_string(),
            config,
            port,
            started_at: Utc::now(),
            log,
            state: Mutex::new(InstanceState {
                status: InstanceStatus::Starting,
                message: None,
                ready_at: None,
                exit: None,
                last_access_at: Instant::now(),
            }),
            process: OnceLock::new(),
            port_released: AtomicBool::new(false),
        }
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn state(&self) -> InstanceState {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn status(&self) -> InstanceStatus {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).status
    }

    /// Apply `f` under the state lock.
    pub fn update<R>(&self, f: impl FnOnce(&mut InstanceState) -> R) -> R {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut state)
    }

    /// `from` -> `to`, only if currently in `from`. Returns whether it moved.
    pub fn transition(
        &self,
        from: InstanceStatus,
        to: InstanceStatus,
        message: Option<String>,
    ) -> bool {
        self.update(|state| {
            if state.status != from {
                return false;
            }
            state.status = to;
            if message.is_some() {
                state.message = message;
            }
            if to == InstanceStatus::Running {
                state.ready_at = Some(Utc::now());
            }
            true
        })
    }

    pub fn mark_failed(&self, message: impl Into<String>) {
        self.update(|state| {
            state.status = InstanceStatus::Failed;
            state.message = Some(message.into());
        });
    }

    pub fn mark_stopped(&self) {
        self.update(|state| {
            state.status = InstanceStatus::Stopped;
            state.message = Some("Stopped".to_string());
        });
    }

    pub fn touch(&self) {
        self.update(|state| state.last_access_at = Instant::now());
    }

    pub fn attach_process(&self, handle: ProcessHandle) {
        let _ = self.process.set(handle);
    }

    pub fn process(&self) -> Option<&ProcessHandle> {
        self.process.get()
    }

    /// Return this instance's port to `pool`; later calls are no-ops.
    pub fn release_port(&self, pool: &PortPool) {
        if !self.port_released.swap(true, Ordering::AcqRel) {
            pool.release(&self.group, self.port);
        }
    }
}

/// Everything tracked for one started task group.
#[derive(Debug)]
pub(crate) struct GroupRuntime {
    pub group: String,
    pub workspace_dir: PathBuf,
    pub config_path: PathBuf,
    pub config: PreviewConfig,
    pub instances: Vec<Arc<InstanceRuntime>>,
}

impl GroupRuntime {
    pub fn instance(&self, name: &str) -> Option<&Arc<InstanceRuntime>> {
        self.instances.iter().find(|i| i.name() == name)
    }
}
