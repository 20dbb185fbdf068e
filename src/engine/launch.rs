// src/engine/launch.rs

//! Launching one configured instance and tracking it until it settles.

use std::net::{Ipv4Addr, SocketAddr};
use std::path::Path;
use std::sync::Arc;

use regex::Regex;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::config::{OrchestratorOptions, PreviewInstanceConfig};
use crate::engine::state::InstanceRuntime;
use crate::errors::{PreviewError, Result};
use crate::exec::{
    ProcessHandle, ReadinessOutcome, ReadinessStrategy, SpawnSpec, build_env, render_command,
    spawn_process, utf8_env, wait_ready,
};
use crate::logs::{InstanceLog, LogHub};
use crate::ports::PortPool;
use crate::types::InstanceStatus;
use crate::workspace::resolve_workdir;

/// Shared collaborators for launching the instances of one group.
pub(crate) struct LaunchContext<'a> {
    pub group: &'a str,
    pub workspace: &'a Path,
    pub options: &'a OrchestratorOptions,
    pub ports: &'a Arc<PortPool>,
    pub logs: &'a LogHub,
}

/// Validate, allocate and spawn one instance.
///
/// An `Err` means nothing was spawned and no port is held; the caller aborts
/// the remaining instances. A spawn failure is not an `Err`: it yields a
/// runtime already marked `failed`.
pub(crate) fn launch_instance(
    ctx: &LaunchContext<'_>,
    config: &PreviewInstanceConfig,
) -> Result<Arc<InstanceRuntime>> {
    let workdir = resolve_workdir(ctx.workspace, &config.name, &config.workdir)?;
    let pattern = config
        .ready_pattern
        .as_deref()
        .map(Regex::new)
        .transpose()
        .map_err(|e| PreviewError::instance(&config.name, format!("ready_pattern: {e}")))?;

    let port = ctx.ports.allocate(ctx.group)?;
    let env = build_env(
        utf8_env(std::env::vars_os()),
        &config.env,
        port,
        &ctx.options.host,
    );
    let command = render_command(&config.command, port);

    let log = Arc::new(InstanceLog::new(
        ctx.group,
        &config.name,
        ctx.options.log_capacity,
        ctx.logs.clone(),
    ));
    let runtime = Arc::new(InstanceRuntime::new(ctx.group, config.clone(), port, log));
    runtime
        .log
        .system(format!("Starting `{command}` on port {port}"));

    let (tap, strategy) = match pattern {
        Some(regex) => {
            let (tx, rx) = mpsc::unbounded_channel();
            (Some(tx), ReadinessStrategy::Pattern { regex, lines: rx })
        }
        None => (
            None,
            ReadinessStrategy::PortPoll {
                addr: SocketAddr::from((Ipv4Addr::LOCALHOST, port)),
                interval: ctx.options.readiness_poll_interval,
            },
        ),
    };

    let spec = SpawnSpec {
        name: config.name.clone(),
        command,
        workdir,
        env,
    };
    let handle = match spawn_process(&spec, Arc::clone(&runtime.log), tap) {
        Ok(handle) => handle,
        Err(e) => {
            warn!(group = ctx.group, instance = %config.name, error = %e, "failed to spawn instance");
            let message = format!("Failed to spawn process: {e}");
            runtime.log.system(message.clone());
            runtime.mark_failed(message);
            runtime.release_port(ctx.ports);
            return Ok(runtime);
        }
    };
    runtime.attach_process(handle.clone());

    tokio::spawn(watch_exit(
        Arc::clone(&runtime),
        handle.clone(),
        Arc::clone(ctx.ports),
    ));
    tokio::spawn(track_readiness(
        Arc::clone(&runtime),
        handle,
        strategy,
        Arc::clone(ctx.ports),
        ctx.options.clone(),
    ));

    Ok(runtime)
}

/// Record the exit and free the port as soon as the process is gone.
async fn watch_exit(runtime: Arc<InstanceRuntime>, handle: ProcessHandle, ports: Arc<PortPool>) {
    let exit = handle.wait().await;

    let failed = runtime.update(|state| {
        state.exit = Some(exit);
        if state.status.is_live() {
            state.status = InstanceStatus::Failed;
            state.message = Some(format!("Process {exit}"));
            true
        } else {
            false
        }
    });

    if failed {
        warn!(
            group = %runtime.group,
            instance = runtime.name(),
            exit_code = ?exit.code,
            signal = ?exit.signal_name(),
            "instance exited unexpectedly"
        );
        runtime.log.system(format!("Process {exit}"));
    }
    runtime.release_port(&ports);
}

async fn track_readiness(
    runtime: Arc<InstanceRuntime>,
    handle: ProcessHandle,
    strategy: ReadinessStrategy,
    ports: Arc<PortPool>,
    options: OrchestratorOptions,
) {
    let exited = {
        let handle = handle.clone();
        async move {
            handle.wait().await;
        }
    };

    match wait_ready(strategy, exited, options.readiness_timeout).await {
        ReadinessOutcome::Ready => {
            if runtime.transition(InstanceStatus::Starting, InstanceStatus::Running, None) {
                info!(
                    group = %runtime.group,
                    instance = runtime.name(),
                    port = runtime.port,
                    "instance ready"
                );
                runtime.log.system("Ready");
            }
        }
        ReadinessOutcome::Exited => {}
        ReadinessOutcome::TimedOut => {
            let message = format!(
                "Not ready within {:?}; terminating",
                options.readiness_timeout
            );
            if runtime.transition(
                InstanceStatus::Starting,
                InstanceStatus::Timeout,
                Some(message.clone()),
            ) {
                warn!(
                    group = %runtime.group,
                    instance = runtime.name(),
                    timeout_ms = options.readiness_timeout.as_millis() as u64,
                    "instance readiness timed out"
                );
                runtime.log.system(message);
                handle.terminate(options.stop_grace).await;
                runtime.release_port(&ports);
            }
        }
    }
}
