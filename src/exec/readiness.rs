// src/exec/readiness.rs

//! Readiness detection for a freshly spawned instance.
//!
//! A single [`wait_ready`] call races the readiness probe against process
//! exit and the overall timeout, and settles exactly once.

use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;

use regex::Regex;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout};
use tracing::{debug, trace};

/// Upper bound for one connect attempt in port-poll mode.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(1);

/// How to decide that an instance is ready.
#[derive(Debug)]
pub enum ReadinessStrategy {
    /// First output line matching `regex`. `lines` is fed by the output
    /// pumps; it is dropped on return, which detaches them.
    Pattern {
        regex: Regex,
        lines: mpsc::UnboundedReceiver<String>,
    },
    /// First successful TCP connect to `addr`, retried every `interval`.
    PortPoll { addr: SocketAddr, interval: Duration },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadinessOutcome {
    Ready,
    /// The process exited first.
    Exited,
    /// Neither readiness nor exit within the timeout.
    TimedOut,
}

/// Settle readiness for one process.
///
/// `exited` must complete when the process exits.
pub async fn wait_ready<E>(
    strategy: ReadinessStrategy,
    exited: E,
    limit: Duration,
) -> ReadinessOutcome
where
    E: Future<Output = ()>,
{
    let probe = async move {
        match strategy {
            ReadinessStrategy::Pattern { regex, lines } => wait_for_pattern(&regex, lines).await,
            ReadinessStrategy::PortPoll { addr, interval } => poll_port(addr, interval).await,
        }
    };

    tokio::select! {
        biased;
        _ = probe => ReadinessOutcome::Ready,
        _ = exited => ReadinessOutcome::Exited,
        _ = sleep(limit) => ReadinessOutcome::TimedOut,
    }
}

/// Completes on the first matching line; never completes if the stream ends
/// without one.
async fn wait_for_pattern(regex: &Regex, mut lines: mpsc::UnboundedReceiver<String>) {
    while let Some(line) = lines.recv().await {
        if regex.is_match(&line) {
            debug!(pattern = %regex, "ready pattern matched");
            return;
        }
    }
    std::future::pending::<()>().await
}

async fn poll_port(addr: SocketAddr, interval: Duration) {
    loop {
        match timeout(CONNECT_TIMEOUT, TcpStream::connect(addr)).await {
            Ok(Ok(_stream)) => {
                debug!(%addr, "port accepted a connection");
                return;
            }
            Ok(Err(e)) => trace!(%addr, error = %e, "port not ready yet"),
            Err(_) => trace!(%addr, "connect attempt timed out"),
        }
        sleep(interval).await;
    }
}
