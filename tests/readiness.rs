// tests/readiness.rs
mod common;
use crate::common::{TestResult, init_tracing};

use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use regex::Regex;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use previewd::exec::{ReadinessOutcome, ReadinessStrategy, wait_ready};

fn never() -> impl std::future::Future<Output = ()> {
    std::future::pending()
}

#[tokio::test]
async fn pattern_match_settles_ready_and_detaches_the_stream() -> TestResult {
    init_tracing();
    let (tx, rx) = mpsc::unbounded_channel();
    tx.send("compiling...".to_string())?;
    tx.send("  ready in 312ms".to_string())?;
    tx.send("ready in 1ms (again)".to_string())?;

    let strategy = ReadinessStrategy::Pattern {
        regex: Regex::new(r"ready in \d+ms")?,
        lines: rx,
    };
    let outcome = wait_ready(strategy, never(), Duration::from_secs(5)).await;

    assert_eq!(outcome, ReadinessOutcome::Ready);
    // The line stream was dropped on the first match: nothing else is read.
    assert!(tx.is_closed());
    assert!(tx.send("late".to_string()).is_err());
    Ok(())
}

#[tokio::test]
async fn port_poll_settles_once_the_port_accepts() -> TestResult {
    let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        while let Ok((_socket, _)) = listener.accept().await {}
    });

    let strategy = ReadinessStrategy::PortPoll {
        addr,
        interval: Duration::from_millis(20),
    };
    let outcome = wait_ready(strategy, never(), Duration::from_secs(5)).await;
    assert_eq!(outcome, ReadinessOutcome::Ready);
    Ok(())
}

#[tokio::test]
async fn port_poll_retries_until_a_listener_appears() -> TestResult {
    // Reserve a free port, release it, and start listening a bit later.
    let addr: SocketAddr = {
        let probe = std::net::TcpListener::bind((Ipv4Addr::LOCALHOST, 0))?;
        probe.local_addr()?
    };
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(150)).await;
        if let Ok(listener) = TcpListener::bind(addr).await {
            while let Ok((_socket, _)) = listener.accept().await {}
        }
    });

    let strategy = ReadinessStrategy::PortPoll {
        addr,
        interval: Duration::from_millis(25),
    };
    let outcome = wait_ready(strategy, never(), Duration::from_secs(5)).await;
    assert_eq!(outcome, ReadinessOutcome::Ready);
    Ok(())
}

#[tokio::test]
async fn exit_before_readiness_settles_exited() -> TestResult {
    let (_tx, rx) = mpsc::unbounded_channel::<String>();
    let strategy = ReadinessStrategy::Pattern {
        regex: Regex::new("ready")?,
        lines: rx,
    };
    let outcome = wait_ready(strategy, async {}, Duration::from_secs(5)).await;
    assert_eq!(outcome, ReadinessOutcome::Exited);
    Ok(())
}

#[tokio::test]
async fn a_match_already_buffered_wins_over_exit() -> TestResult {
    let (tx, rx) = mpsc::unbounded_channel();
    tx.send("server ready".to_string())?;
    drop(tx);

    let strategy = ReadinessStrategy::Pattern {
        regex: Regex::new("ready")?,
        lines: rx,
    };
    let outcome = wait_ready(strategy, async {}, Duration::from_secs(5)).await;
    assert_eq!(outcome, ReadinessOutcome::Ready);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn no_match_and_no_exit_times_out() -> TestResult {
    let (tx, rx) = mpsc::unbounded_channel();
    tx.send("still compiling".to_string())?;

    let strategy = ReadinessStrategy::Pattern {
        regex: Regex::new("ready")?,
        lines: rx,
    };
    let started = tokio::time::Instant::now();
    let outcome = wait_ready(strategy, never(), Duration::from_secs(300)).await;

    assert_eq!(outcome, ReadinessOutcome::TimedOut);
    assert!(started.elapsed() >= Duration::from_secs(300));
    drop(tx);
    Ok(())
}
