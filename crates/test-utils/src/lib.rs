pub mod builders;
pub mod fakes;
pub mod workspace;

use std::sync::Once;
use std::time::Duration;

use previewd::config::OrchestratorOptions;
use tracing_subscriber::{EnvFilter, fmt};

static INIT: Once = Once::new();

/// Initialise tracing for tests.
///
/// - Uses `with_test_writer()`, so logs are captured per-test.
/// - The Rust test harness only prints captured output for **failing** tests
///   (unless you run with `-- --nocapture`).
///
/// Enable levels with e.g.:
/// `RUST_LOG=debug cargo test`
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        fmt()
            .with_env_filter(filter)
            .with_test_writer() // print only for failing tests unless --nocapture
            .with_target(true)
            .init();
    });
}

/// Run a future with a 10-second timeout.
pub async fn with_timeout<F, T>(f: F) -> T
where
    F: std::future::Future<Output = T>,
{
    tokio::time::timeout(Duration::from_secs(10), f)
        .await
        .expect("Test timed out after 10 seconds")
}

/// Options with short timers, on a port range private to the calling test.
pub fn fast_options(low: u16, high: u16) -> OrchestratorOptions {
    OrchestratorOptions {
        port_range: low..=high,
        readiness_timeout: Duration::from_secs(5),
        readiness_poll_interval: Duration::from_millis(50),
        stop_grace: Duration::from_millis(500),
        reload_debounce: Duration::from_millis(200),
        ..OrchestratorOptions::default()
    }
}

/// Poll `check` every 20ms until it returns true or `limit` passes.
pub async fn eventually<F>(limit: Duration, mut check: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + limit;
    loop {
        if check() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}
