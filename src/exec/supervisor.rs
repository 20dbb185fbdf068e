// src/exec/supervisor.rs

//! Spawning and terminating a single instance process.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::{Notify, mpsc, watch};
use tracing::{debug, info, warn};

use crate::exec::command::shell_command;
use crate::exec::signal;
use crate::logs::{InstanceLog, LogSource};

/// Everything needed to launch one instance.
#[derive(Debug, Clone)]
pub struct SpawnSpec {
    pub name: String,
    pub command: String,
    pub workdir: PathBuf,
    /// Complete child environment; nothing else is inherited.
    pub env: BTreeMap<String, String>,
}

/// How a process ended.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ExitInfo {
    pub code: Option<i32>,
    pub signal: Option<i32>,
}

impl ExitInfo {
    fn from_status(status: ExitStatus) -> Self {
        #[cfg(unix)]
        let signal = {
            use std::os::unix::process::ExitStatusExt;
            status.signal()
        };
        #[cfg(not(unix))]
        let signal = None;

        Self {
            code: status.code(),
            signal,
        }
    }

    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    pub fn signal_name(&self) -> Option<String> {
        self.signal.map(signal::signal_name)
    }
}

impl fmt::Display for ExitInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.code, self.signal_name()) {
            (Some(code), _) => write!(f, "exited with code {code}"),
            (None, Some(name)) => write!(f, "terminated by {name}"),
            (None, None) => f.write_str("exited"),
        }
    }
}

/// Shared handle to a spawned process.
///
/// Cloning is cheap; every clone observes the same exit. The child itself is
/// owned by a background waiter task, which publishes the exit exactly once.
#[derive(Debug, Clone)]
pub struct ProcessHandle {
    pid: Option<u32>,
    exit_rx: watch::Receiver<Option<ExitInfo>>,
    kill: Arc<Notify>,
}

impl ProcessHandle {
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// The exit, if the process has already exited.
    pub fn exit_info(&self) -> Option<ExitInfo> {
        *self.exit_rx.borrow()
    }

    /// Wait until the process has exited.
    pub async fn wait(&self) -> ExitInfo {
        let mut rx = self.exit_rx.clone();
        match rx.wait_for(Option::is_some).await {
            Ok(exit) => (*exit).unwrap_or_default(),
            // Waiter task gone without reporting (runtime shutting down).
            Err(_) => ExitInfo::default(),
        }
    }

    /// Graceful signal, then a forced kill if the process is still alive
    /// after `grace`. Resolves only once the process has exited.
    pub async fn terminate(&self, grace: Duration) -> ExitInfo {
        if let Some(exit) = self.exit_info() {
            return exit;
        }

        let graceful_sent = match self.pid {
            Some(pid) => match signal::graceful(pid) {
                Ok(()) => true,
                Err(e) => {
                    debug!(pid, error = %e, "graceful signal not delivered");
                    false
                }
            },
            None => false,
        };

        if graceful_sent {
            if let Ok(exit) = tokio::time::timeout(grace, self.wait()).await {
                return exit;
            }
            warn!(
                pid = ?self.pid,
                grace_ms = grace.as_millis() as u64,
                "process ignored graceful signal; killing"
            );
        }

        self.kill_now();
        self.wait().await
    }

    fn kill_now(&self) {
        if let Some(pid) = self.pid {
            if let Err(e) = signal::force(pid) {
                warn!(pid, error = %e, "forced kill failed; falling back to child kill");
            }
        }
        self.kill.notify_one();
    }
}

/// Spawn `spec` and start piping its output into `log`.
///
/// stdin is closed. Every stdout/stderr line is appended to `log` and, while
/// `tap` is open, forwarded to it; the tap is dropped the first time its
/// receiver is gone.
pub fn spawn_process(
    spec: &SpawnSpec,
    log: Arc<InstanceLog>,
    tap: Option<mpsc::UnboundedSender<String>>,
) -> std::io::Result<ProcessHandle> {
    info!(
        instance = %spec.name,
        cmd = %spec.command,
        workdir = ?spec.workdir,
        "starting instance process"
    );

    let mut cmd = shell_command(&spec.command);
    cmd.current_dir(&spec.workdir)
        .env_clear()
        .envs(&spec.env)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    #[cfg(unix)]
    cmd.process_group(0);

    let mut child = cmd.spawn()?;
    let pid = child.id();

    if let Some(stdout) = child.stdout.take() {
        tokio::spawn(pump_lines(stdout, LogSource::Stdout, Arc::clone(&log), tap.clone()));
    }
    if let Some(stderr) = child.stderr.take() {
        tokio::spawn(pump_lines(stderr, LogSource::Stderr, Arc::clone(&log), tap));
    }

    let (exit_tx, exit_rx) = watch::channel(None);
    let kill = Arc::new(Notify::new());
    let kill_requested = Arc::clone(&kill);
    let name = spec.name.clone();

    tokio::spawn(async move {
        let status = tokio::select! {
            status = child.wait() => status,
            _ = kill_requested.notified() => {
                if let Err(e) = child.start_kill() {
                    debug!(instance = %name, error = %e, "start_kill after forced signal");
                }
                child.wait().await
            }
        };

        let exit = match status {
            Ok(status) => ExitInfo::from_status(status),
            Err(e) => {
                warn!(instance = %name, error = %e, "failed waiting for instance process");
                ExitInfo::default()
            }
        };
        info!(instance = %name, pid = ?pid, exit = %exit, "instance process exited");
        let _ = exit_tx.send(Some(exit));
    });

    Ok(ProcessHandle { pid, exit_rx, kill })
}

async fn pump_lines<R>(
    reader: R,
    level: LogSource,
    log: Arc<InstanceLog>,
    mut tap: Option<mpsc::UnboundedSender<String>>,
) where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf)
                    .trim_end_matches(['\r', '\n'])
                    .to_string();
                log.push(level, line.clone());

                if let Some(tx) = &tap {
                    if tx.send(line).is_err() {
                        tap = None;
                    }
                }
            }
            Err(e) => {
                debug!(key = log.key(), error = %e, "output pipe closed with error");
                break;
            }
        }
    }

    debug!(key = log.key(), ?level, "output pump ended");
}
