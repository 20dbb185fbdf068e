// tests/orchestrator.rs
#![cfg(unix)]
mod common;
use crate::common::{TestResult, eventually, fast_options, init_tracing, with_timeout};

use std::fs;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use previewd::engine::PreviewOrchestrator;
use previewd::errors::{ErrorCode, PreviewError};
use previewd::install::{DependencyStatus, NoopInstaller};
use previewd::types::InstanceStatus;
use previewd_test_utils::builders::{InstanceBuilder, PreviewConfigBuilder};
use previewd_test_utils::fakes::{CountingInstaller, FailingInstaller};
use previewd_test_utils::workspace::TempWorkspace;

const SETTLE: Duration = Duration::from_secs(5);
const MINUTE: Duration = Duration::from_secs(60);

fn ready_instance(name: &str) -> InstanceBuilder {
    InstanceBuilder::new(name, "echo ready on {{PORT}}; exec sleep 30").ready_pattern(r"ready on \d+")
}

fn status_of(orch: &PreviewOrchestrator, group: &str, instance: &str) -> Option<InstanceStatus> {
    orch.status(group).instance(instance).map(|i| i.status)
}

async fn wait_for_status(
    orch: &PreviewOrchestrator,
    group: &str,
    instance: &str,
    expected: InstanceStatus,
) -> bool {
    eventually(SETTLE, || status_of(orch, group, instance) == Some(expected)).await
}

#[tokio::test]
async fn start_runs_instance_and_stop_releases_everything() -> TestResult {
    init_tracing();
    let ws = TempWorkspace::new();
    ws.add_group("g1", &PreviewConfigBuilder::new().with_instance(ready_instance("web")));
    let orch = ws.orchestrator(fast_options(43000, 43019), Arc::new(NoopInstaller));

    let before = orch.status("g1");
    assert!(before.available);
    assert_eq!(before.instance("web").map(|i| i.status), Some(InstanceStatus::Stopped));

    let snapshot = with_timeout(orch.start("g1")).await?;
    let web = snapshot.instance("web").expect("web listed in snapshot");
    assert!(web.status.is_live(), "fresh instance is starting or running");
    let port = web.port.expect("port reported while live");
    assert!((43000..=43019).contains(&port));
    assert_eq!(web.path, "/preview/g1/web/");
    assert_eq!(snapshot.dependencies.status, DependencyStatus::Skipped);

    assert!(wait_for_status(&orch, "g1", "web", InstanceStatus::Running).await);
    let target = orch.proxy_target("g1", "web").expect("running instance is routable");
    assert_eq!(target.port, port);
    assert_eq!(target.status, InstanceStatus::Running);

    let logs = orch.logs("g1", "web", None)?;
    assert_eq!(logs.instance, "web");
    assert!(logs.logs.iter().any(|e| e.message == format!("ready on {port}")));
    assert_eq!(orch.logs("g1", "web", Some(1))?.logs.len(), 1);
    assert_eq!(orch.active_groups(), vec!["g1".to_string()]);

    with_timeout(orch.stop("g1")).await;

    assert!(orch.active_groups().is_empty());
    assert!(orch.proxy_target("g1", "web").is_none());
    assert!(!orch.ports().is_allocated(port));
    let after = orch.status("g1");
    let web = after.instance("web").expect("configured instance still listed");
    assert_eq!(web.status, InstanceStatus::Stopped);
    assert!(web.port.is_none());
    assert!(orch.logs("g1", "web", None)?.logs.is_empty());
    Ok(())
}

#[tokio::test]
async fn concurrent_starts_share_one_generation() -> TestResult {
    init_tracing();
    let ws = TempWorkspace::new();
    ws.add_group(
        "g1",
        &PreviewConfigBuilder::new().with_instance(
            InstanceBuilder::new("web", "echo spawned >> spawns.log; echo ready; exec sleep 30")
                .ready_pattern("^ready$"),
        ),
    );
    let installer = Arc::new(CountingInstaller::with_delay(Duration::from_millis(200)));
    let orch = ws.orchestrator(fast_options(43020, 43039), installer.clone());

    let (a, b) = with_timeout(async { tokio::join!(orch.start("g1"), orch.start("g1")) }).await;
    let (a, b) = (a?, b?);

    assert_eq!(a, b, "both callers observe the same snapshot");
    assert_eq!(installer.calls(), 1);

    let spawns = ws.group_dir("g1").join("spawns.log");
    let count = || {
        fs::read_to_string(&spawns)
            .map(|s| s.lines().count())
            .unwrap_or(0)
    };
    assert!(eventually(SETTLE, || count() >= 1).await);
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(count(), 1, "exactly one process per configured instance");
    assert_eq!(orch.ports().ports_of("g1").len(), 1);

    orch.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn restart_replaces_the_previous_generation() -> TestResult {
    let ws = TempWorkspace::new();
    ws.add_group("g1", &PreviewConfigBuilder::new().with_instance(ready_instance("web")));
    let orch = ws.orchestrator(fast_options(43040, 43059), Arc::new(NoopInstaller));

    let first = with_timeout(orch.start("g1")).await?;
    assert!(wait_for_status(&orch, "g1", "web", InstanceStatus::Running).await);
    let second = with_timeout(orch.start("g1")).await?;

    let old_port = first.instance("web").and_then(|i| i.port).expect("first port");
    let new_port = second.instance("web").and_then(|i| i.port).expect("second port");
    assert_eq!(old_port, new_port, "stop runs before allocation, so the port is reused");
    assert_eq!(orch.ports().ports_of("g1"), vec![new_port]);

    orch.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn escaping_workdir_is_rejected_before_anything_spawns() -> TestResult {
    let ws = TempWorkspace::new();
    ws.add_group(
        "g1",
        &PreviewConfigBuilder::new().with_instance(ready_instance("web").workdir("../etc")),
    );
    ws.add_group(
        "g2",
        &PreviewConfigBuilder::new().with_instance(ready_instance("web").workdir("/tmp")),
    );
    let orch = ws.orchestrator(fast_options(43060, 43079), Arc::new(NoopInstaller));

    for group in ["g1", "g2"] {
        let err = with_timeout(orch.start(group)).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::InstanceInvalid);
        assert!(orch.ports().ports_of(group).is_empty());
    }
    assert!(orch.active_groups().is_empty());
    Ok(())
}

#[tokio::test]
async fn later_instance_failure_keeps_earlier_instances_running() -> TestResult {
    let ws = TempWorkspace::new();
    ws.mkdir("g1", "apps/web");
    ws.add_group(
        "g1",
        &PreviewConfigBuilder::new()
            .with_instance(ready_instance("web").workdir("apps/web"))
            .with_instance(ready_instance("api").workdir("apps/api"))
            .with_instance(ready_instance("docs")),
    );
    let orch = ws.orchestrator(fast_options(43080, 43099), Arc::new(NoopInstaller));

    match with_timeout(orch.start("g1")).await {
        Err(PreviewError::InstanceInvalid { instance, .. }) => assert_eq!(instance, "api"),
        other => panic!("expected InstanceInvalid for api, got {other:?}"),
    }

    assert_eq!(orch.active_groups(), vec!["g1".to_string()]);
    assert!(wait_for_status(&orch, "g1", "web", InstanceStatus::Running).await);
    let status = orch.status("g1");
    assert_eq!(status.instance("api").map(|i| i.status), Some(InstanceStatus::Stopped));
    assert_eq!(status.instance("docs").map(|i| i.status), Some(InstanceStatus::Stopped));
    assert_eq!(orch.ports().ports_of("g1").len(), 1);

    orch.stop("g1").await;
    assert!(orch.ports().ports_of("g1").is_empty());
    Ok(())
}

#[tokio::test]
async fn crashing_instance_reports_failed_with_diagnostics() -> TestResult {
    init_tracing();
    let ws = TempWorkspace::new();
    ws.add_group(
        "g1",
        &PreviewConfigBuilder::new()
            .with_instance(InstanceBuilder::new("crash", "echo boom; exit 3")),
    );
    let orch = ws.orchestrator(fast_options(43100, 43119), Arc::new(NoopInstaller));

    with_timeout(orch.start("g1")).await?;
    assert!(wait_for_status(&orch, "g1", "crash", InstanceStatus::Failed).await);

    let status = orch.status("g1");
    let crash = status.instance("crash").expect("listed");
    assert!(crash.port.is_none());
    assert_eq!(crash.message.as_deref(), Some("Process exited with code 3"));
    let diagnostics = crash.diagnostics.as_ref().expect("failed instances carry diagnostics");
    assert_eq!(diagnostics.exit_code, Some(3));
    assert!(diagnostics.signal.is_none());
    assert!(diagnostics.last_log_lines.iter().any(|l| l == "boom"));

    assert!(eventually(SETTLE, || orch.ports().ports_of("g1").is_empty()).await);
    assert!(orch.proxy_target("g1", "crash").is_none());

    orch.stop("g1").await;
    Ok(())
}

#[tokio::test]
async fn readiness_timeout_terminates_but_keeps_the_timeout_status() -> TestResult {
    let ws = TempWorkspace::new();
    ws.add_group(
        "g1",
        &PreviewConfigBuilder::new()
            .with_instance(InstanceBuilder::new("slow", "exec sleep 30").ready_pattern("never")),
    );
    let mut options = fast_options(43120, 43139);
    options.readiness_timeout = Duration::from_millis(300);
    let orch = ws.orchestrator(options, Arc::new(NoopInstaller));

    with_timeout(orch.start("g1")).await?;
    assert!(wait_for_status(&orch, "g1", "slow", InstanceStatus::Timeout).await);
    assert!(eventually(SETTLE, || orch.ports().ports_of("g1").is_empty()).await);

    // The process is gone; the status still says why.
    tokio::time::sleep(Duration::from_millis(100)).await;
    let status = orch.status("g1");
    let slow = status.instance("slow").expect("listed");
    assert_eq!(slow.status, InstanceStatus::Timeout);
    assert!(slow.message.as_deref().is_some_and(|m| m.contains("Not ready")));
    let diagnostics = slow.diagnostics.as_ref().expect("timed-out instances carry diagnostics");
    assert!(diagnostics.exit_code.is_none(), "killed by a signal, not an exit");
    assert!(
        matches!(diagnostics.signal.as_deref(), Some("SIGTERM" | "SIGKILL")),
        "unexpected signal: {:?}",
        diagnostics.signal
    );

    orch.stop("g1").await;
    Ok(())
}

#[tokio::test]
async fn configuration_problems_are_classified() -> TestResult {
    let ws = TempWorkspace::new();
    fs::create_dir_all(ws.group_dir("unconfigured"))?;
    ws.write_config("empty", "[install]\nsteps = []\n");
    ws.write_config("broken", "[[instance]\nname =");
    let orch = ws.orchestrator(fast_options(43140, 43159), Arc::new(NoopInstaller));

    let cases = [
        ("unconfigured", ErrorCode::ConfigMissing),
        ("empty", ErrorCode::ConfigMissing),
        ("broken", ErrorCode::ConfigInvalid),
        ("nope", ErrorCode::WorkspaceMissing),
        ("../escape", ErrorCode::InvalidGroup),
    ];
    for (group, code) in cases {
        let err = with_timeout(orch.start(group)).await.unwrap_err();
        assert_eq!(err.code(), code, "start({group})");

        let status = orch.status(group);
        assert!(!status.available);
        assert_eq!(status.reason, Some(code));
        assert!(status.instances.is_empty());
    }
    assert!(orch.active_groups().is_empty());
    Ok(())
}

#[tokio::test]
async fn unknown_instance_logs_are_instance_invalid() -> TestResult {
    let ws = TempWorkspace::new();
    ws.add_group("g1", &PreviewConfigBuilder::new().with_instance(ready_instance("web")));
    let orch = ws.orchestrator(fast_options(43160, 43179), Arc::new(NoopInstaller));

    let err = orch.logs("g1", "api", None).unwrap_err();
    assert_eq!(err.code(), ErrorCode::InstanceInvalid);
    Ok(())
}

#[tokio::test]
async fn dependency_failure_aborts_start_without_runtime() -> TestResult {
    let ws = TempWorkspace::new();
    ws.add_group("g1", &PreviewConfigBuilder::new().with_instance(ready_instance("web")));
    let orch = ws.orchestrator(
        fast_options(43180, 43199),
        Arc::new(FailingInstaller::new("npm ci exited with code 1")),
    );

    let err = with_timeout(orch.start("g1")).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::DependencyFailed);
    assert!(orch.active_groups().is_empty());
    assert!(orch.ports().ports_of("g1").is_empty());
    Ok(())
}

#[tokio::test]
async fn config_change_restarts_the_group() -> TestResult {
    init_tracing();
    let ws = TempWorkspace::new();
    let v1 = PreviewConfigBuilder::new().with_instance(
        InstanceBuilder::new("web", "echo gen1 ready; exec sleep 30").ready_pattern("ready"),
    );
    ws.add_group("g1", &v1);
    let orch = ws.orchestrator(fast_options(43200, 43219), Arc::new(NoopInstaller));

    with_timeout(orch.start("g1")).await?;
    assert!(wait_for_status(&orch, "g1", "web", InstanceStatus::Running).await);

    let v2 = PreviewConfigBuilder::new().with_instance(
        InstanceBuilder::new("web", "echo gen2 ready; exec sleep 30").ready_pattern("ready"),
    );
    ws.add_group("g1", &v2);

    let reloaded = eventually(SETTLE, || {
        orch.logs("g1", "web", None)
            .map(|s| s.logs.iter().any(|e| e.message == "gen2 ready"))
            .unwrap_or(false)
    })
    .await;
    assert!(reloaded, "new generation should be running after the config change");
    assert!(wait_for_status(&orch, "g1", "web", InstanceStatus::Running).await);
    assert_eq!(orch.ports().ports_of("g1").len(), 1);

    orch.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn broken_config_change_is_skipped_and_noted() -> TestResult {
    let ws = TempWorkspace::new();
    ws.add_group("g1", &PreviewConfigBuilder::new().with_instance(ready_instance("web")));
    let orch = ws.orchestrator(fast_options(43220, 43239), Arc::new(NoopInstaller));

    with_timeout(orch.start("g1")).await?;
    assert!(wait_for_status(&orch, "g1", "web", InstanceStatus::Running).await);
    let target = orch.proxy_target("g1", "web").expect("running");

    ws.write_config("g1", "[[instance]]\nname = ");

    let noted = eventually(SETTLE, || {
        orch.logs("g1", "web", None)
            .map(|s| s.logs.iter().any(|e| e.message.starts_with("Config reload skipped")))
            .unwrap_or(false)
    })
    .await;
    assert!(noted);
    assert_eq!(orch.proxy_target("g1", "web"), Some(target), "old generation keeps serving");

    orch.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn idle_sweep_stops_only_fully_idle_groups() -> TestResult {
    let ws = TempWorkspace::new();
    ws.add_group("g1", &PreviewConfigBuilder::new().with_instance(ready_instance("web")));
    let orch = ws.orchestrator(fast_options(43240, 43259), Arc::new(NoopInstaller));
    let (_sub, mut rx) = orch.subscribe_logs_channel("g1", "web");

    with_timeout(orch.start("g1")).await?;
    assert!(wait_for_status(&orch, "g1", "web", InstanceStatus::Running).await);

    let t0 = Instant::now();
    tokio::time::sleep(Duration::from_millis(50)).await;
    orch.touch("g1", "web");

    let stopped = orch.sweep_idle_at(t0 + 30 * MINUTE + Duration::from_millis(20)).await;
    assert!(stopped.is_empty(), "recent access keeps the group alive");
    assert_eq!(orch.active_groups(), vec!["g1".to_string()]);

    let stopped = with_timeout(orch.sweep_idle_at(t0 + 45 * MINUTE)).await;
    assert_eq!(stopped, vec!["g1".to_string()]);
    assert!(orch.active_groups().is_empty());
    assert!(orch.ports().ports_of("g1").is_empty());

    let mut reasons = Vec::new();
    while let Ok(entry) = rx.try_recv() {
        reasons.push(entry.message);
    }
    assert!(reasons.iter().any(|m| m.starts_with("Stopping: no access")));
    Ok(())
}

#[tokio::test]
async fn manual_install_stops_the_group_and_forces_installation() -> TestResult {
    let ws = TempWorkspace::new();
    ws.add_group("g1", &PreviewConfigBuilder::new().with_instance(ready_instance("web")));
    let installer = Arc::new(CountingInstaller::new());
    let orch = ws.orchestrator(fast_options(43260, 43279), installer.clone());

    with_timeout(orch.start("g1")).await?;
    let result = with_timeout(orch.install_dependencies("g1")).await?;

    assert_eq!(result.status, DependencyStatus::Skipped);
    assert_eq!(installer.calls(), 2);
    assert_eq!(installer.forced_calls(), 1);
    assert!(orch.active_groups().is_empty());
    Ok(())
}

#[tokio::test]
async fn subscribers_receive_live_output() -> TestResult {
    let ws = TempWorkspace::new();
    ws.add_group("g1", &PreviewConfigBuilder::new().with_instance(ready_instance("web")));
    let orch = ws.orchestrator(fast_options(43280, 43299), Arc::new(NoopInstaller));

    let (subscription, mut rx) = orch.subscribe_logs_channel("g1", "web");
    assert_eq!(subscription.key(), "g1:web");

    with_timeout(orch.start("g1")).await?;
    let got_ready = with_timeout(async {
        while let Some(entry) = rx.recv().await {
            if entry.message.starts_with("ready on ") {
                return true;
            }
        }
        false
    })
    .await;
    assert!(got_ready);

    subscription.unsubscribe();
    orch.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn public_url_follows_the_template() -> TestResult {
    let ws = TempWorkspace::new();
    ws.add_group("g1", &PreviewConfigBuilder::new().with_instance(ready_instance("web")));
    let mut options = fast_options(43300, 43319);
    options.public_url_template = Some("https://{instance}--{group}.preview.test".to_string());
    let orch = ws.orchestrator(options, Arc::new(NoopInstaller));

    let status = orch.status("g1");
    assert_eq!(
        status.instance("web").and_then(|i| i.public_url.clone()).as_deref(),
        Some("https://web--g1.preview.test")
    );
    Ok(())
}

#[tokio::test]
async fn shutdown_stops_every_group() -> TestResult {
    let ws = TempWorkspace::new();
    ws.add_group("g1", &PreviewConfigBuilder::new().with_instance(ready_instance("web")));
    ws.add_group("g2", &PreviewConfigBuilder::new().with_instance(ready_instance("web")));
    let orch = ws.orchestrator(fast_options(43320, 43339), Arc::new(NoopInstaller));
    orch.spawn_idle_reaper();

    with_timeout(orch.start("g1")).await?;
    with_timeout(orch.start("g2")).await?;
    assert_eq!(orch.active_groups(), vec!["g1".to_string(), "g2".to_string()]);

    with_timeout(orch.shutdown()).await;

    assert!(orch.active_groups().is_empty());
    assert!(orch.ports().ports_of("g1").is_empty());
    assert!(orch.ports().ports_of("g2").is_empty());

    // Stopping something that is not running is a no-op.
    orch.stop("g1").await;
    orch.stop("never-started").await;
    Ok(())
}

#[tokio::test]
async fn running_instance_that_exits_later_becomes_failed() -> TestResult {
    init_tracing();
    let ws = TempWorkspace::new();
    ws.add_group(
        "g1",
        &PreviewConfigBuilder::new().with_instance(
            InstanceBuilder::new("web", "echo ready on {{PORT}}; sleep 1; echo bye; exit 4")
                .ready_pattern(r"ready on \d+"),
        ),
    );
    let orch = ws.orchestrator(fast_options(43340, 43359), Arc::new(NoopInstaller));

    let snapshot = with_timeout(orch.start("g1")).await?;
    let port = snapshot.instance("web").and_then(|i| i.port).expect("port while live");
    assert!(wait_for_status(&orch, "g1", "web", InstanceStatus::Running).await);
    assert!(orch.ports().is_allocated(port));

    assert!(wait_for_status(&orch, "g1", "web", InstanceStatus::Failed).await);
    let status = orch.status("g1");
    let web = status.instance("web").expect("listed");
    assert!(web.port.is_none());
    assert_eq!(web.message.as_deref(), Some("Process exited with code 4"));
    let diagnostics = web.diagnostics.as_ref().expect("failed instances carry diagnostics");
    assert_eq!(diagnostics.exit_code, Some(4));
    assert!(diagnostics.last_log_lines.iter().any(|l| l == "bye"));

    assert!(eventually(SETTLE, || !orch.ports().is_allocated(port)).await);
    assert!(orch.proxy_target("g1", "web").is_none());

    orch.stop("g1").await;
    Ok(())
}

#[tokio::test]
async fn instance_without_pattern_is_ready_once_its_port_accepts() -> TestResult {
    init_tracing();
    let ws = TempWorkspace::new();
    ws.add_group(
        "g1",
        &PreviewConfigBuilder::new().with_instance(InstanceBuilder::new(
            "api",
            "exec python3 -m http.server {{PORT}} --bind 127.0.0.1",
        )),
    );
    let orch = ws.orchestrator(fast_options(43360, 43379), Arc::new(NoopInstaller));

    let snapshot = with_timeout(orch.start("g1")).await?;
    let port = snapshot.instance("api").and_then(|i| i.port).expect("port while live");
    assert!(wait_for_status(&orch, "g1", "api", InstanceStatus::Running).await);

    let target = orch.proxy_target("g1", "api").expect("running instance is routable");
    assert_eq!(target.port, port);
    tokio::net::TcpStream::connect(("127.0.0.1", port)).await?;

    orch.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn stop_during_start_keeps_the_new_generation_ports() -> TestResult {
    init_tracing();
    let ws = TempWorkspace::new();
    ws.add_group("g1", &PreviewConfigBuilder::new().with_instance(ready_instance("web")));
    let installer = Arc::new(CountingInstaller::with_delay(Duration::from_millis(500)));
    let orch = ws.orchestrator(fast_options(43380, 43399), installer.clone());

    let starting = {
        let orch = orch.clone();
        tokio::spawn(async move { orch.start("g1").await })
    };
    // Start is now waiting on the installer.
    assert!(eventually(SETTLE, || installer.calls() == 1).await);
    with_timeout(orch.stop("g1")).await;

    let snapshot = with_timeout(starting).await??;
    let port = snapshot.instance("web").and_then(|i| i.port).expect("port while live");
    assert_eq!(orch.ports().ports_of("g1"), vec![port]);
    assert!(orch.ports().is_allocated(port));
    assert!(wait_for_status(&orch, "g1", "web", InstanceStatus::Running).await);
    assert_eq!(orch.active_groups(), vec!["g1".to_string()]);

    orch.shutdown().await;
    assert!(!orch.ports().is_allocated(port));
    Ok(())
}
