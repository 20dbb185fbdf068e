// src/install/shell.rs

//! Shell-step dependency installer.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::config::{InstallStep, PreviewConfig};
use crate::errors::PreviewError;
use crate::exec::shell_command;
use crate::install::hash::{InstallStamps, compute_input_hash};
use crate::install::{
    DependencyInstaller, DependencyResult, DependencyStatus, DependencyStep, InstallFuture,
    StepStatus,
};
use crate::workspace::resolve_workdir;

/// Output lines kept per step.
const OUTPUT_TAIL: usize = 20;

/// Runs the `[install]` steps of a workspace config through the shell.
///
/// Steps run one after another in declaration order. When `[install].inputs`
/// is non-empty, a successful install records their blake3 hash and later
/// unforced calls with the same hash are skipped.
#[derive(Debug, Default)]
pub struct ShellDependencyInstaller {
    stamps: InstallStamps,
}

impl ShellDependencyInstaller {
    pub fn new() -> Self {
        Self::default()
    }

    async fn run(
        &self,
        workspace: &Path,
        config: &PreviewConfig,
        force: bool,
    ) -> crate::errors::Result<DependencyResult> {
        let install = &config.install;
        if install.steps.is_empty() {
            debug!(workspace = ?workspace, "no install steps configured");
            return Ok(DependencyResult::skipped());
        }

        let hash = if install.inputs.is_empty() {
            None
        } else {
            Some(input_hash(workspace, &install.inputs).await?)
        };

        if !force {
            if let Some(hash) = &hash {
                if self.stamps.matches(workspace, hash) {
                    info!(workspace = ?workspace, "install inputs unchanged; skipping install");
                    return Ok(DependencyResult::skipped());
                }
            }
        }

        let mut steps = Vec::with_capacity(install.steps.len());
        let mut degraded = false;

        for step in &install.steps {
            let outcome = run_step(workspace, step).await?;
            let failed = outcome.status == StepStatus::Failed;
            steps.push(outcome);

            if failed && step.optional {
                warn!(step = %step.name, "optional install step failed; continuing");
                degraded = true;
            } else if failed {
                self.stamps.forget(workspace);
                let last = steps.last().map(failure_reason).unwrap_or_default();
                return Err(PreviewError::DependencyFailed {
                    reason: format!("step '{}' {last}", step.name),
                });
            }
        }

        let status = if degraded {
            DependencyStatus::Degraded
        } else {
            if let Some(hash) = hash {
                self.stamps.record(workspace, hash);
            }
            DependencyStatus::Installed
        };

        info!(workspace = ?workspace, ?status, steps = steps.len(), "dependency install finished");
        Ok(DependencyResult { status, steps })
    }
}

impl DependencyInstaller for ShellDependencyInstaller {
    fn install<'a>(
        &'a self,
        workspace: &'a Path,
        config: &'a PreviewConfig,
        force: bool,
    ) -> InstallFuture<'a> {
        Box::pin(self.run(workspace, config, force))
    }
}

async fn input_hash(workspace: &Path, inputs: &[String]) -> crate::errors::Result<String> {
    let root: PathBuf = workspace.to_path_buf();
    let inputs = inputs.to_vec();
    let joined = tokio::task::spawn_blocking(move || compute_input_hash(&root, &inputs)).await;

    match joined {
        Ok(Ok(hash)) => Ok(hash),
        Ok(Err(e)) => Err(PreviewError::DependencyFailed {
            reason: format!("hashing install inputs: {e:#}"),
        }),
        Err(e) => Err(PreviewError::DependencyFailed {
            reason: format!("hashing task failed: {e}"),
        }),
    }
}

async fn run_step(workspace: &Path, step: &InstallStep) -> crate::errors::Result<DependencyStep> {
    let workdir = resolve_workdir(workspace, &step.name, &step.workdir).map_err(|e| {
        PreviewError::DependencyFailed {
            reason: e.to_string(),
        }
    })?;

    info!(step = %step.name, cmd = %step.command, workdir = ?workdir, "running install step");
    let started = Instant::now();

    let mut cmd = shell_command(&step.command);
    cmd.current_dir(&workdir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let (status, exit_code, output) = match cmd.output().await {
        Ok(out) => {
            let mut lines = output_lines(&out.stdout);
            lines.extend(output_lines(&out.stderr));
            let status = if out.status.success() {
                StepStatus::Succeeded
            } else {
                StepStatus::Failed
            };
            (status, out.status.code(), lines)
        }
        Err(e) => {
            warn!(step = %step.name, error = %e, "failed to spawn install step");
            (StepStatus::Failed, None, vec![format!("spawn failed: {e}")])
        }
    };

    let keep_from = output.len().saturating_sub(OUTPUT_TAIL);
    Ok(DependencyStep {
        name: step.name.clone(),
        command: step.command.clone(),
        status,
        exit_code,
        duration_ms: started.elapsed().as_millis() as u64,
        output: output[keep_from..].to_vec(),
    })
}

fn output_lines(bytes: &[u8]) -> Vec<String> {
    String::from_utf8_lossy(bytes)
        .lines()
        .map(str::to_string)
        .collect()
}

fn failure_reason(step: &DependencyStep) -> String {
    match step.exit_code {
        Some(code) => format!("exited with code {code}"),
        None => "did not complete".to_string(),
    }
}
