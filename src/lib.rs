// src/lib.rs

pub mod cli;
pub mod config;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod install;
pub mod logging;
pub mod logs;
pub mod ports;
pub mod types;
pub mod watch;
pub mod workspace;

use std::sync::Arc;

use anyhow::{Context, Result, bail};
use tracing::{debug, error, info};

use crate::cli::CliArgs;
use crate::config::{ConfigLoader, PreviewConfig, TomlConfigLoader, load_options};
use crate::engine::{PreviewOrchestrator, StartSnapshot};
use crate::install::ShellDependencyInstaller;
use crate::logs::{LogSource, Subscription};
use crate::workspace::{DirectoryWorkspaceResolver, WorkspaceResolver};

pub use crate::errors::{ErrorCode, PreviewError};

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - orchestrator options
/// - the directory resolver, TOML config loader and shell installer
/// - the orchestrator and its idle reaper
/// - streaming of instance output to stdout
/// - Ctrl-C handling
pub async fn run(args: CliArgs) -> Result<()> {
    let options = load_options(args.config.as_deref())?;
    let resolver = Arc::new(DirectoryWorkspaceResolver::new(&args.root));
    let loader = Arc::new(TomlConfigLoader::new(options.config_file.clone()));

    if args.dry_run {
        for group in &args.groups {
            let workspace = resolver
                .resolve(group)
                .with_context(|| format!("resolving workspace for '{group}'"))?;
            let config = loader
                .load(&workspace)
                .with_context(|| format!("loading preview config for '{group}'"))?;
            print_dry_run(group, &config);
        }
        debug!("dry-run complete (no execution)");
        return Ok(());
    }

    let orchestrator = PreviewOrchestrator::new(
        options,
        resolver.clone(),
        loader.clone(),
        Arc::new(ShellDependencyInstaller::new()),
    );
    orchestrator.spawn_idle_reaper();

    let mut subscriptions: Vec<Subscription> = Vec::new();
    let mut started = 0usize;

    for group in &args.groups {
        // Subscribe before starting so the first lines are not missed.
        if let Ok(config) = resolver.resolve(group).and_then(|ws| loader.load(&ws)) {
            for instance in &config.instances {
                subscriptions.push(stream_to_stdout(&orchestrator, group, &instance.name));
            }
        }

        match orchestrator.start(group).await {
            Ok(snapshot) => {
                started += 1;
                print_snapshot(group, &snapshot, args.json)?;
            }
            Err(e) => {
                error!(group = %group, code = %e.code(), error = %e, "failed to start preview group");
                eprintln!("{group}: {e} [{}]", e.code());
            }
        }
    }

    if started == 0 {
        orchestrator.shutdown().await;
        bail!("no preview group could be started");
    }

    info!(groups = ?orchestrator.active_groups(), "previews running; press Ctrl-C to stop");
    tokio::signal::ctrl_c()
        .await
        .context("listening for Ctrl-C")?;

    drop(subscriptions);
    orchestrator.shutdown().await;
    Ok(())
}

fn stream_to_stdout(orchestrator: &PreviewOrchestrator, group: &str, instance: &str) -> Subscription {
    let prefix = format!("{group}:{instance}");
    orchestrator.subscribe_logs(group, instance, move |entry| match entry.level {
        LogSource::Stdout | LogSource::Stderr => println!("[{prefix}] {}", entry.message),
        LogSource::System => println!("[{prefix}] -- {}", entry.message),
    })
}

fn print_snapshot(group: &str, snapshot: &StartSnapshot, json: bool) -> Result<()> {
    if json {
        let line = serde_json::to_string(snapshot).context("serialising start snapshot")?;
        println!("{line}");
        return Ok(());
    }

    println!("{group}: dependencies {:?}", snapshot.dependencies.status);
    for instance in &snapshot.instances {
        let port = instance
            .port
            .map(|p| p.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "  {:<16} {:<9} port={:<6} {}",
            instance.name, instance.status, port, instance.path
        );
        if let Some(message) = &instance.message {
            println!("      {message}");
        }
    }
    Ok(())
}

/// Simple dry-run output: print instances and install steps.
fn print_dry_run(group: &str, config: &PreviewConfig) {
    println!("previewd dry-run: {group}");

    if !config.install.steps.is_empty() {
        println!("  install:");
        if !config.install.inputs.is_empty() {
            println!("      inputs: {:?}", config.install.inputs);
        }
        for step in &config.install.steps {
            let optional = if step.optional { " (optional)" } else { "" };
            println!("    - {}: {}{optional}", step.name, step.command);
        }
    }

    println!("  instances ({}):", config.instances.len());
    for instance in &config.instances {
        println!("    - {}", instance.name);
        println!("        command: {}", instance.command);
        println!("        workdir: {}", instance.workdir);
        if !instance.env.is_empty() {
            println!("        env: {:?}", instance.env);
        }
        if let Some(pattern) = &instance.ready_pattern {
            println!("        ready_pattern: {pattern}");
        }
    }
}
