// src/engine/orchestrator.rs

//! The preview orchestrator: start/stop protocol, status queries, hot reload
//! and idle reaping for every task group of one process.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::{Arc, Mutex, Weak};

use futures_util::future::join_all;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::config::{ConfigLoader, OrchestratorOptions, PreviewConfig};
use crate::engine::idle::group_is_idle;
use crate::engine::launch::{LaunchContext, launch_instance};
use crate::engine::single_flight::SingleFlight;
use crate::engine::snapshot::{
    GroupStatus, LogSnapshot, ProxyTarget, StartSnapshot, merged_summaries, runtime_summaries,
};
use crate::engine::state::GroupRuntime;
use crate::errors::{PreviewError, Result};
use crate::install::{DependencyInstaller, DependencyResult};
use crate::logs::{LogEntry, LogHub, Subscription, stream_key};
use crate::ports::PortPool;
use crate::watch::ConfigWatcher;
use crate::workspace::WorkspaceResolver;

struct Inner {
    options: OrchestratorOptions,
    resolver: Arc<dyn WorkspaceResolver>,
    loader: Arc<dyn ConfigLoader>,
    installer: Arc<dyn DependencyInstaller>,
    ports: Arc<PortPool>,
    logs: LogHub,
    groups: Mutex<HashMap<String, Arc<GroupRuntime>>>,
    starts: SingleFlight<Result<StartSnapshot>>,
    watchers: Mutex<HashMap<String, ConfigWatcher>>,
    reaper: Mutex<Option<JoinHandle<()>>>,
}

/// Owns every preview group of the process.
///
/// Cloning yields another handle to the same orchestrator. Background work
/// (config watchers, the idle reaper) only holds weak references, so dropping
/// the last handle lets it wind down; call [`shutdown`](Self::shutdown) to
/// also stop the processes.
#[derive(Clone)]
pub struct PreviewOrchestrator {
    inner: Arc<Inner>,
}

impl fmt::Debug for PreviewOrchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PreviewOrchestrator")
            .field("options", &self.inner.options)
            .field("active_groups", &self.active_groups())
            .finish_non_exhaustive()
    }
}

impl PreviewOrchestrator {
    pub fn new(
        options: OrchestratorOptions,
        resolver: Arc<dyn WorkspaceResolver>,
        loader: Arc<dyn ConfigLoader>,
        installer: Arc<dyn DependencyInstaller>,
    ) -> Self {
        let ports = Arc::new(PortPool::new(options.port_range.clone()));
        Self {
            inner: Arc::new(Inner {
                options,
                resolver,
                loader,
                installer,
                ports,
                logs: LogHub::new(),
                groups: Mutex::new(HashMap::new()),
                starts: SingleFlight::new(),
                watchers: Mutex::new(HashMap::new()),
                reaper: Mutex::new(None),
            }),
        }
    }

    pub fn options(&self) -> &OrchestratorOptions {
        &self.inner.options
    }

    pub fn ports(&self) -> &PortPool {
        &self.inner.ports
    }

    /// Stop-then-start `group`. Concurrent calls share one start.
    pub async fn start(&self, group: &str) -> Result<StartSnapshot> {
        self.inner.start(group).await
    }

    /// Stop every instance of `group` and forget its runtime.
    pub async fn stop(&self, group: &str) {
        self.inner.stop(group).await
    }

    pub fn status(&self, group: &str) -> GroupStatus {
        self.inner.status(group)
    }

    pub fn logs(&self, group: &str, instance: &str, tail: Option<usize>) -> Result<LogSnapshot> {
        self.inner.log_snapshot(group, instance, tail)
    }

    /// Forwarding target for a starting or running instance.
    pub fn proxy_target(&self, group: &str, instance: &str) -> Option<ProxyTarget> {
        let runtime = self.inner.runtime(group)?;
        let live = runtime.instance(instance)?;
        let status = live.status();
        status.is_live().then_some(ProxyTarget {
            port: live.port,
            status,
        })
    }

    /// Record external traffic for idle tracking.
    pub fn touch(&self, group: &str, instance: &str) {
        if let Some(live) = self
            .inner
            .runtime(group)
            .and_then(|r| r.instance(instance).cloned())
        {
            live.touch();
        }
    }

    /// Stop the group, then run installation on its own, bypassing the
    /// unchanged-inputs shortcut.
    pub async fn install_dependencies(&self, group: &str) -> Result<DependencyResult> {
        let workspace = self.inner.resolver.resolve(group)?;
        let config = self.inner.loader.load(&workspace)?;
        self.inner.stop(group).await;
        info!(group, "running manual dependency installation");
        self.inner.installer.install(&workspace, &config, true).await
    }

    /// Listen to live log entries of one instance.
    pub fn subscribe_logs<F>(&self, group: &str, instance: &str, listener: F) -> Subscription
    where
        F: Fn(&LogEntry) + Send + Sync + 'static,
    {
        self.inner.logs.subscribe(stream_key(group, instance), listener)
    }

    /// Channel flavour of [`subscribe_logs`](Self::subscribe_logs).
    pub fn subscribe_logs_channel(
        &self,
        group: &str,
        instance: &str,
    ) -> (Subscription, tokio::sync::mpsc::UnboundedReceiver<LogEntry>) {
        self.inner.logs.subscribe_channel(stream_key(group, instance))
    }

    /// Task groups with runtime state, sorted.
    pub fn active_groups(&self) -> Vec<String> {
        let groups = self.inner.groups.lock().unwrap_or_else(|e| e.into_inner());
        let mut ids: Vec<String> = groups.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Start the periodic idle sweep. Replaces a previously started reaper.
    pub fn spawn_idle_reaper(&self) {
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        let every = self.inner.options.idle_sweep_interval;

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(inner) = weak.upgrade() else {
                    debug!("orchestrator dropped; idle reaper exiting");
                    break;
                };
                inner.sweep_idle(Instant::now()).await;
            }
        });

        let previous = {
            let mut reaper = self.inner.reaper.lock().unwrap_or_else(|e| e.into_inner());
            reaper.replace(task)
        };
        if let Some(previous) = previous {
            previous.abort();
        }
    }

    /// One idle sweep at the current instant. Returns the groups stopped.
    pub async fn sweep_idle(&self) -> Vec<String> {
        self.inner.sweep_idle(Instant::now()).await
    }

    /// One idle sweep as if it ran at `now`.
    pub async fn sweep_idle_at(&self, now: Instant) -> Vec<String> {
        self.inner.sweep_idle(now).await
    }

    /// Stop the reaper, every watcher and every group.
    pub async fn shutdown(&self) {
        info!("shutting down preview orchestrator");
        let reaper = {
            let mut reaper = self.inner.reaper.lock().unwrap_or_else(|e| e.into_inner());
            reaper.take()
        };
        if let Some(reaper) = reaper {
            reaper.abort();
        }

        let watchers = {
            let mut watchers = self.inner.watchers.lock().unwrap_or_else(|e| e.into_inner());
            std::mem::take(&mut *watchers)
        };
        drop(watchers);

        let groups = self.active_groups();
        join_all(groups.iter().map(|group| self.inner.stop(group))).await;
    }
}

impl Inner {
    fn runtime(&self, group: &str) -> Option<Arc<GroupRuntime>> {
        let groups = self.groups.lock().unwrap_or_else(|e| e.into_inner());
        groups.get(group).cloned()
    }

    fn load_config(&self, group: &str) -> Result<(std::path::PathBuf, PreviewConfig)> {
        let workspace = self.resolver.resolve(group)?;
        let config = self.loader.load(&workspace)?;
        Ok((workspace, config))
    }

    async fn start(self: &Arc<Self>, group: &str) -> Result<StartSnapshot> {
        let inner = Arc::clone(self);
        let key = group.to_string();
        self.starts
            .run(group, move || async move { inner.start_inner(&key).await })
            .await
    }

    async fn start_inner(self: &Arc<Self>, group: &str) -> Result<StartSnapshot> {
        info!(group, "starting preview group");

        let workspace = self.resolver.resolve(group)?;
        let config_path = self.loader.config_path(&workspace);
        let config = self.loader.load(&workspace)?;

        self.stop_group(group, true).await;

        let dependencies = self.installer.install(&workspace, &config, false).await?;
        if dependencies.is_degraded() {
            warn!(group, "dependency installation degraded; starting anyway");
        }

        let ctx = LaunchContext {
            group,
            workspace: &workspace,
            options: &self.options,
            ports: &self.ports,
            logs: &self.logs,
        };

        let mut instances = Vec::with_capacity(config.instances.len());
        let mut failure = None;
        for instance in &config.instances {
            match launch_instance(&ctx, instance) {
                Ok(runtime) => instances.push(runtime),
                Err(e) => {
                    warn!(
                        group,
                        instance = %instance.name,
                        error = %e,
                        code = %e.code(),
                        "instance launch failed; skipping remaining instances"
                    );
                    failure = Some(e);
                    break;
                }
            }
        }

        if instances.is_empty() {
            if let Some(e) = failure {
                return Err(e);
            }
        }

        let runtime = Arc::new(GroupRuntime {
            group: group.to_string(),
            workspace_dir: workspace,
            config_path,
            config,
            instances,
        });
        {
            let mut groups = self.groups.lock().unwrap_or_else(|e| e.into_inner());
            groups.insert(group.to_string(), Arc::clone(&runtime));
        }
        self.attach_watcher(group, &runtime.config_path);

        if let Some(e) = failure {
            return Err(e);
        }

        info!(
            group = %runtime.group,
            instances = runtime.instances.len(),
            workspace = ?runtime.workspace_dir,
            "preview group started"
        );
        Ok(StartSnapshot {
            instances: merged_summaries(&self.options, group, &runtime.config, Some(&runtime)),
            dependencies,
        })
    }

    async fn stop(&self, group: &str) {
        // A start in flight owns the group's newest ports; only release what
        // the stopped generation held.
        let bulk_release = !self.starts.contains(group);
        self.stop_group(group, bulk_release).await
    }

    async fn stop_group(&self, group: &str, bulk_release: bool) {
        let watcher = {
            let mut watchers = self.watchers.lock().unwrap_or_else(|e| e.into_inner());
            watchers.remove(group)
        };
        if watcher.is_some() {
            debug!(group, "detached config watcher");
        }
        drop(watcher);

        let runtime = self.runtime(group);
        if let Some(runtime) = &runtime {
            info!(group, instances = runtime.instances.len(), "stopping preview group");
            for instance in &runtime.instances {
                instance.mark_stopped();
            }

            let grace = self.options.stop_grace;
            join_all(runtime.instances.iter().map(|instance| async move {
                if let Some(process) = instance.process() {
                    let exit = process.terminate(grace).await;
                    debug!(group, instance = instance.name(), exit = %exit, "instance terminated");
                }
                instance.release_port(&self.ports);
            }))
            .await;
        }

        if bulk_release {
            self.ports.release_group(group);
        }

        if let Some(runtime) = runtime {
            let mut groups = self.groups.lock().unwrap_or_else(|e| e.into_inner());
            if groups
                .get(group)
                .is_some_and(|current| Arc::ptr_eq(current, &runtime))
            {
                groups.remove(group);
            }
        }
    }

    fn status(&self, group: &str) -> GroupStatus {
        let runtime = self.runtime(group);
        match self.load_config(group) {
            Ok((_, config)) => GroupStatus {
                available: true,
                instances: merged_summaries(&self.options, group, &config, runtime.as_deref()),
                reason: None,
            },
            Err(e) => GroupStatus {
                available: false,
                instances: runtime
                    .as_deref()
                    .map(|r| runtime_summaries(&self.options, r))
                    .unwrap_or_default(),
                reason: Some(e.code()),
            },
        }
    }

    fn log_snapshot(&self, group: &str, instance: &str, tail: Option<usize>) -> Result<LogSnapshot> {
        if let Some(live) = self
            .runtime(group)
            .and_then(|r| r.instance(instance).cloned())
        {
            return Ok(LogSnapshot {
                instance: instance.to_string(),
                logs: live.log.snapshot(tail),
            });
        }

        let (_, config) = self.load_config(group)?;
        if config.instance(instance).is_none() {
            return Err(PreviewError::instance(instance, "no such instance in this group"));
        }
        Ok(LogSnapshot {
            instance: instance.to_string(),
            logs: Vec::new(),
        })
    }

    fn attach_watcher(self: &Arc<Self>, group: &str, config_path: &Path) {
        let weak = Arc::downgrade(self);
        let key = group.to_string();

        let watcher = ConfigWatcher::spawn(config_path, self.options.reload_debounce, move || {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            let group = key.clone();
            // Own task: the reload stops the group, which aborts this watcher.
            tokio::spawn(async move { inner.reload(&group).await });
        });

        match watcher {
            Ok(watcher) => {
                let previous = {
                    let mut watchers = self.watchers.lock().unwrap_or_else(|e| e.into_inner());
                    watchers.insert(group.to_string(), watcher)
                };
                drop(previous);
            }
            Err(e) => warn!(
                group,
                path = ?config_path,
                error = %e,
                "could not watch preview config; hot reload disabled"
            ),
        }
    }

    async fn reload(self: &Arc<Self>, group: &str) {
        info!(group, "preview config changed; reloading");

        if let Err(e) = self.load_config(group) {
            warn!(group, error = %e, code = %e.code(), "config reload skipped");
            self.note_on_instances(group, &format!("Config reload skipped: {e}"));
            return;
        }

        if let Err(e) = self.start(group).await {
            error!(group, error = %e, code = %e.code(), "config reload failed");
            self.note_on_instances(group, &format!("Config reload failed: {e}"));
        }
    }

    fn note_on_instances(&self, group: &str, message: &str) {
        if let Some(runtime) = self.runtime(group) {
            for instance in &runtime.instances {
                instance.log.system(message);
            }
        }
    }

    async fn sweep_idle(&self, now: Instant) -> Vec<String> {
        let threshold = self.options.idle_timeout;
        let candidates: Vec<(String, Arc<GroupRuntime>)> = {
            let groups = self.groups.lock().unwrap_or_else(|e| e.into_inner());
            groups
                .iter()
                .map(|(id, runtime)| (id.clone(), Arc::clone(runtime)))
                .collect()
        };

        let mut stopped = Vec::new();
        for (group, runtime) in candidates {
            let idle = group_is_idle(
                runtime.instances.iter().map(|i| {
                    let state = i.state();
                    (state.status, state.last_access_at)
                }),
                now,
                threshold,
            );
            if !idle {
                continue;
            }

            info!(group = %group, threshold = ?threshold, "preview group idle; stopping");
            for instance in &runtime.instances {
                instance
                    .log
                    .system(format!("Stopping: no access for more than {threshold:?}"));
            }
            self.stop(&group).await;
            stopped.push(group);
        }
        stopped
    }
}
