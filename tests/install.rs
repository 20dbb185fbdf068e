// tests/install.rs
#![cfg(unix)]
mod common;
use crate::common::{TestResult, init_tracing};

use std::fs;

use tempfile::tempdir;

use previewd::errors::ErrorCode;
use previewd::install::{
    DependencyInstaller, DependencyStatus, NoopInstaller, ShellDependencyInstaller, StepStatus,
    compute_input_hash,
};
use previewd_test_utils::builders::{InstanceBuilder, PreviewConfigBuilder};

fn base() -> PreviewConfigBuilder {
    PreviewConfigBuilder::new().with_instance(InstanceBuilder::new("web", "sleep 30"))
}

#[tokio::test]
async fn no_steps_is_skipped() -> TestResult {
    let ws = tempdir()?;
    let config = base().build();

    let result = ShellDependencyInstaller::new()
        .install(ws.path(), &config, false)
        .await?;
    assert_eq!(result.status, DependencyStatus::Skipped);
    assert!(result.steps.is_empty());

    let noop = NoopInstaller.install(ws.path(), &config, true).await?;
    assert_eq!(noop.status, DependencyStatus::Skipped);
    Ok(())
}

#[tokio::test]
async fn steps_run_in_order_in_the_workspace() -> TestResult {
    init_tracing();
    let ws = tempdir()?;
    let config = base()
        .with_install_step("first", "echo one >> order.txt")
        .with_install_step("second", "echo two >> order.txt; echo to-stderr 1>&2")
        .build();

    let result = ShellDependencyInstaller::new()
        .install(ws.path(), &config, false)
        .await?;

    assert_eq!(result.status, DependencyStatus::Installed);
    assert_eq!(result.steps.len(), 2);
    assert!(result.steps.iter().all(|s| s.status == StepStatus::Succeeded));
    assert_eq!(result.steps[1].output, vec!["to-stderr".to_string()]);
    assert_eq!(fs::read_to_string(ws.path().join("order.txt"))?, "one\ntwo\n");
    Ok(())
}

#[tokio::test]
async fn unchanged_inputs_skip_until_they_change_or_install_is_forced() -> TestResult {
    let ws = tempdir()?;
    fs::write(ws.path().join("package-lock.json"), "{\"v\":1}")?;
    let config = base()
        .with_install_input("package-lock.json")
        .with_install_step("count", "echo run >> runs.txt")
        .build();
    let installer = ShellDependencyInstaller::new();
    let runs = || fs::read_to_string(ws.path().join("runs.txt")).unwrap_or_default().lines().count();

    let first = installer.install(ws.path(), &config, false).await?;
    assert_eq!(first.status, DependencyStatus::Installed);

    let second = installer.install(ws.path(), &config, false).await?;
    assert_eq!(second.status, DependencyStatus::Skipped);
    assert_eq!(runs(), 1);

    fs::write(ws.path().join("package-lock.json"), "{\"v\":2}")?;
    let third = installer.install(ws.path(), &config, false).await?;
    assert_eq!(third.status, DependencyStatus::Installed);
    assert_eq!(runs(), 2);

    let forced = installer.install(ws.path(), &config, true).await?;
    assert_eq!(forced.status, DependencyStatus::Installed);
    assert_eq!(runs(), 3);
    Ok(())
}

#[tokio::test]
async fn failing_required_step_is_a_hard_failure() -> TestResult {
    let ws = tempdir()?;
    let config = base()
        .with_install_step("broken", "echo nope; exit 2")
        .with_install_step("never", "touch never-ran")
        .build();

    let err = ShellDependencyInstaller::new()
        .install(ws.path(), &config, false)
        .await
        .unwrap_err();

    assert_eq!(err.code(), ErrorCode::DependencyFailed);
    assert!(err.to_string().contains("broken"));
    assert!(!ws.path().join("never-ran").exists());
    Ok(())
}

#[tokio::test]
async fn failing_optional_step_degrades_without_aborting() -> TestResult {
    let ws = tempdir()?;
    let config = base()
        .with_optional_install_step("codegen", "exit 1")
        .with_install_step("after", "touch after-ran")
        .build();

    let result = ShellDependencyInstaller::new()
        .install(ws.path(), &config, false)
        .await?;

    assert_eq!(result.status, DependencyStatus::Degraded);
    assert!(result.is_degraded());
    assert_eq!(result.steps[0].status, StepStatus::Failed);
    assert_eq!(result.steps[0].exit_code, Some(1));
    assert_eq!(result.steps[1].status, StepStatus::Succeeded);
    assert!(ws.path().join("after-ran").exists());
    Ok(())
}

#[test]
fn input_hash_ignores_order_but_sees_content_and_presence() -> TestResult {
    let ws = tempdir()?;
    fs::write(ws.path().join("a.lock"), "a")?;
    fs::write(ws.path().join("b.lock"), "b")?;
    let inputs = |names: &[&str]| names.iter().map(|s| s.to_string()).collect::<Vec<_>>();

    let ab = compute_input_hash(ws.path(), &inputs(&["a.lock", "b.lock"]))?;
    let ba = compute_input_hash(ws.path(), &inputs(&["b.lock", "a.lock"]))?;
    assert_eq!(ab, ba);

    let with_missing = compute_input_hash(ws.path(), &inputs(&["a.lock", "c.lock"]))?;
    fs::write(ws.path().join("c.lock"), "")?;
    let with_empty = compute_input_hash(ws.path(), &inputs(&["a.lock", "c.lock"]))?;
    assert_ne!(with_missing, with_empty);

    fs::write(ws.path().join("a.lock"), "changed")?;
    let changed = compute_input_hash(ws.path(), &inputs(&["a.lock", "b.lock"]))?;
    assert_ne!(ab, changed);
    Ok(())
}
