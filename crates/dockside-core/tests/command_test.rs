#![allow(clippy::unwrap_used)]
// Integration tests for mutating verbs, convergence polling, and the
// periodic refresh loop.

mod common;

use std::path::PathBuf;
use std::time::Duration;

use pretty_assertions::assert_eq;
use secrecy::SecretString;
use serde_json::json;
use tokio::time::Instant;

use common::{
    BUILDER_STATUS, FakeRunner, LIST_CONTAINERS, LIST_IMAGES, Reply, config, container,
    controller, controller_with, image,
};
use dockside_core::{
    Command, CommandResult, Convergence, CoreError, CustomKernelRequest, KernelArch,
    RegistryLoginRequest, ResourceClass, SystemStatus,
};

fn list(items: &[serde_json::Value]) -> Reply {
    Reply::json(&json!(items))
}

// ── Container convergence ───────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_stop_converges_when_list_shows_stopped() {
    let runner = FakeRunner::new();
    runner
        .on("stop c1", Reply::Ok("c1\n".into()))
        .on(LIST_CONTAINERS, list(&[container("c1", "running")]))
        .on(LIST_CONTAINERS, list(&[container("c1", "running")]))
        .on(LIST_CONTAINERS, list(&[container("c1", "stopped")]));
    let ctrl = controller(&runner);

    let outcome = ctrl.stop_container("c1").await.unwrap();

    assert_eq!(outcome, Convergence::Converged { attempts: 3 });
    assert!(!ctrl.store().is_busy("c1"));
    assert!(!ctrl.store().container_by_id("c1").unwrap().is_running());
    assert_eq!(
        runner.argvs(),
        vec!["stop c1", LIST_CONTAINERS, LIST_CONTAINERS, LIST_CONTAINERS]
    );
}

#[tokio::test(start_paused = true)]
async fn test_stop_gives_up_after_retry_budget() {
    let runner = FakeRunner::new();
    runner
        .on("stop c1", Reply::Ok(String::new()))
        .on(LIST_CONTAINERS, list(&[container("c1", "running")]));
    let ctrl = controller(&runner);
    let mut busy = ctrl.store().subscribe_busy();

    let started = Instant::now();
    let outcome = ctrl.stop_container("c1").await.unwrap();
    let elapsed = started.elapsed();

    assert_eq!(outcome, Convergence::Exhausted { attempts: 10 });
    assert_eq!(runner.count(LIST_CONTAINERS), 10);
    assert!(elapsed >= Duration::from_millis(4500));
    assert!(elapsed <= Duration::from_secs(5));
    assert!(!ctrl.store().is_busy("c1"));
    assert!(busy.borrow_and_update().is_empty());
    // Timeout stays silent by default.
    assert_eq!(ctrl.store().take_error(), None);
    assert_eq!(ctrl.store().take_success(), None);
}

#[tokio::test(start_paused = true)]
async fn test_timeout_warning_is_opt_in() {
    let runner = FakeRunner::new();
    runner
        .on("start c1", Reply::Ok(String::new()))
        .on(LIST_CONTAINERS, list(&[container("c1", "stopped")]));
    let mut cfg = config();
    cfg.convergence.attempts = 3;
    cfg.convergence.warn_on_timeout = true;
    let ctrl = controller_with(&runner, cfg);

    let outcome = ctrl.start_container("c1").await.unwrap();

    assert!(outcome.is_exhausted());
    assert_eq!(
        ctrl.store().take_error().as_deref(),
        Some("Timed out waiting for c1 to be running")
    );
}

#[tokio::test(start_paused = true)]
async fn test_vanished_container_counts_as_converged() {
    let runner = FakeRunner::new();
    runner
        .on("stop c1", Reply::Ok(String::new()))
        .on(LIST_CONTAINERS, list(&[]));
    let ctrl = controller(&runner);

    let outcome = ctrl.stop_container("c1").await.unwrap();

    assert_eq!(outcome, Convergence::Vanished { attempts: 1 });
    assert!(!ctrl.store().is_busy("c1"));
    assert_eq!(ctrl.store().take_error(), None);
}

#[tokio::test(start_paused = true)]
async fn test_remove_waits_for_absence() {
    let runner = FakeRunner::new();
    runner
        .on("rm c1", Reply::Ok(String::new()))
        .on(LIST_CONTAINERS, list(&[container("c1", "stopped")]))
        .on(LIST_CONTAINERS, list(&[container("c2", "running")]));
    let ctrl = controller(&runner);

    let outcome = ctrl.remove_container("c1").await.unwrap();

    assert_eq!(outcome, Convergence::Vanished { attempts: 2 });
    assert!(ctrl.store().container_by_id("c1").is_none());
}

#[tokio::test(start_paused = true)]
async fn test_rejected_command_skips_convergence() {
    let runner = FakeRunner::new();
    runner.on("start c1", Reply::Fail(1, "Error: notFound: \"c1\"".into()));
    let ctrl = controller(&runner);

    let err = ctrl.start_container("c1").await.unwrap_err();

    assert!(matches!(err, CoreError::CommandFailed { .. }));
    assert_eq!(runner.count(LIST_CONTAINERS), 0);
    assert!(!ctrl.store().is_busy("c1"));
    assert_eq!(
        ctrl.store().take_error().as_deref(),
        Some("Failed to start container c1: Error: notFound: \"c1\"")
    );
}

#[tokio::test(start_paused = true)]
async fn test_busy_container_rejects_second_operation() {
    let runner = FakeRunner::new();
    let ctrl = controller(&runner);
    assert!(ctrl.store().mark_busy("c1"));

    let err = ctrl.stop_container("c1").await.unwrap_err();

    assert!(matches!(err, CoreError::Busy { ref id } if id == "c1"));
    assert!(runner.calls().is_empty());
    assert_eq!(
        ctrl.store().take_error().as_deref(),
        Some("c1 is busy with another operation")
    );
    // The rejected call must not release the holder's claim.
    assert!(ctrl.store().is_busy("c1"));
}

#[tokio::test(start_paused = true)]
async fn test_busy_flag_visible_while_converging() {
    let runner = FakeRunner::new();
    runner
        .on("start c1", Reply::Ok(String::new()))
        .on(LIST_CONTAINERS, list(&[container("c1", "stopped")]))
        .on(LIST_CONTAINERS, list(&[container("c1", "running")]));
    let ctrl = controller(&runner);

    let task = tokio::spawn({
        let ctrl = ctrl.clone();
        async move { ctrl.start_container("c1").await }
    });
    // Let the task issue the verb and the first re-list, then park on its sleep.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(ctrl.store().is_busy("c1"));

    let outcome = task.await.unwrap().unwrap();
    assert_eq!(outcome, Convergence::Converged { attempts: 2 });
    assert!(ctrl.store().busy_ids().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_restart_stops_then_starts() {
    let runner = FakeRunner::new();
    runner
        .on("stop web", Reply::Ok(String::new()))
        .on("start web", Reply::Ok(String::new()))
        .on(LIST_CONTAINERS, list(&[container("web", "stopped")]))
        .on(LIST_CONTAINERS, list(&[container("web", "running")]));
    let ctrl = controller(&runner);

    let result = ctrl
        .execute(Command::RestartContainer { id: "web".into() })
        .await
        .unwrap();

    assert_eq!(
        result,
        CommandResult::Container(Convergence::Converged { attempts: 1 })
    );
    assert_eq!(
        runner.argvs(),
        vec!["stop web", LIST_CONTAINERS, "start web", LIST_CONTAINERS]
    );
    assert!(!ctrl.store().is_busy("web"));
}

#[tokio::test]
async fn test_flag_like_id_is_rejected_before_running() {
    let runner = FakeRunner::new();
    let ctrl = controller(&runner);

    let err = ctrl.remove_container("--all").await.unwrap_err();
    assert!(matches!(err, CoreError::Validation { .. }));
    assert!(runner.calls().is_empty());
}

// ── System verbs ────────────────────────────────────────────────────

#[tokio::test]
async fn test_start_system_refreshes_everything() {
    let runner = FakeRunner::new();
    runner
        .on("system start", Reply::Ok(String::new()))
        .on(LIST_CONTAINERS, list(&[container("c1", "running")]))
        .on(LIST_IMAGES, list(&[]))
        .on(BUILDER_STATUS, Reply::Ok(String::new()))
        .on("ls", Reply::Ok(String::new()));
    let ctrl = controller(&runner);

    ctrl.start_system().await.unwrap();

    assert_eq!(
        runner.argvs(),
        vec!["system start", LIST_CONTAINERS, LIST_IMAGES, BUILDER_STATUS, "ls"]
    );
    assert_eq!(ctrl.store().system_status(), SystemStatus::Running);
    assert_eq!(ctrl.store().container_count(), 1);
    assert_eq!(
        ctrl.store().take_success().as_deref(),
        Some("Container system started")
    );
}

#[tokio::test]
async fn test_stop_system_only_rechecks_status() {
    let runner = FakeRunner::new();
    runner
        .on("system stop", Reply::Ok(String::new()))
        .on("ls", Reply::Fail(1, "XPC connection error".into()));
    let ctrl = controller(&runner);

    ctrl.stop_system().await.unwrap();

    assert_eq!(runner.argvs(), vec!["system stop", "ls"]);
    assert_eq!(ctrl.store().system_status(), SystemStatus::Stopped);
    assert_eq!(ctrl.store().take_error(), None);
    assert!(ctrl.store().take_success().is_some());
}

// ── Images ──────────────────────────────────────────────────────────

#[tokio::test]
async fn test_pull_image_refreshes_images() {
    let runner = FakeRunner::new();
    runner
        .on("images pull alpine:3.20", Reply::Ok(String::new()))
        .on(LIST_IMAGES, list(&[image("docker.io/library/alpine:3.20")]));
    let ctrl = controller(&runner);

    ctrl.pull_image("alpine:3.20").await.unwrap();

    assert_eq!(ctrl.store().image_count(), 1);
    assert_eq!(
        ctrl.store().take_success().as_deref(),
        Some("Pulled image alpine:3.20")
    );
}

// ── Registries ──────────────────────────────────────────────────────

#[tokio::test]
async fn test_login_sends_password_on_stdin_only() {
    let runner = FakeRunner::new();
    runner
        .on(
            "registry login --username me --password-stdin ghcr.io",
            Reply::Ok("Login succeeded\n".into()),
        )
        .on(
            "registry list --format json",
            Reply::json(&json!([{ "server": "ghcr.io", "username": "me" }])),
        )
        .on("registry default inspect", Reply::Ok("ghcr.io\n".into()));
    let ctrl = controller(&runner);

    ctrl.registry_login(RegistryLoginRequest {
        server: "ghcr.io".into(),
        username: "me".into(),
        password: SecretString::from("s3cret-token".to_owned()),
    })
    .await
    .unwrap();

    let login = &runner.calls()[0];
    assert_eq!(login.stdin.as_deref(), Some("s3cret-token"));
    assert!(!login.args.iter().any(|a| a.contains("s3cret")));
    let registries = ctrl.store().registries_snapshot();
    assert_eq!(registries.len(), 1);
    assert!(registries[0].is_default);
}

#[tokio::test]
async fn test_blank_password_never_reaches_cli() {
    let runner = FakeRunner::new();
    let ctrl = controller(&runner);

    let err = ctrl
        .registry_login(RegistryLoginRequest {
            server: "ghcr.io".into(),
            username: "me".into(),
            password: SecretString::from(String::new()),
        })
        .await
        .unwrap_err();

    assert!(matches!(err, CoreError::Validation { .. }));
    assert!(runner.calls().is_empty());
    assert!(ctrl.store().take_error().is_some());
}

#[tokio::test]
async fn test_flag_like_login_server_never_reaches_cli() {
    let runner = FakeRunner::new();
    let ctrl = controller(&runner);

    let err = ctrl
        .registry_login(RegistryLoginRequest {
            server: "--password-stdin".into(),
            username: "me".into(),
            password: SecretString::from("token".to_owned()),
        })
        .await
        .unwrap_err();

    assert!(matches!(err, CoreError::Validation { .. }));
    assert!(runner.calls().is_empty());
}

// ── DNS ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_create_dns_domain_failure_reports_stderr() {
    let runner = FakeRunner::new();
    runner.on(
        "system dns create test",
        Reply::Fail(1, "Error: requires root privileges\n".into()),
    );
    let ctrl = controller(&runner);

    let err = ctrl.create_dns_domain("test").await.unwrap_err();

    assert!(matches!(err, CoreError::CommandFailed { .. }));
    assert_eq!(runner.argvs(), vec!["system dns create test"]);
    assert_eq!(
        ctrl.store().take_error().as_deref(),
        Some("Failed to create DNS domain test: Error: requires root privileges")
    );
    assert_eq!(ctrl.store().take_success(), None);
}

// ── Kernel ──────────────────────────────────────────────────────────

#[tokio::test]
async fn test_custom_kernel_becomes_current_config() {
    let runner = FakeRunner::new();
    runner.on(
        "system kernel set --binary vmlinux --arch arm64",
        Reply::Ok(String::new()),
    );
    let ctrl = controller(&runner);
    assert!(ctrl.kernel_config().is_recommended);

    ctrl.set_custom_kernel(CustomKernelRequest {
        binary_path: PathBuf::from("vmlinux"),
        tar_path: None,
        arch: KernelArch::Arm64,
    })
    .await
    .unwrap();

    let kernel = ctrl.kernel_config();
    assert!(!kernel.is_recommended);
    assert_eq!(kernel.binary_path, Some(PathBuf::from("vmlinux")));
    assert_eq!(kernel.arch, KernelArch::Arm64);
}

// ── Periodic refresh ────────────────────────────────────────────────

fn steady_runtime() -> std::sync::Arc<FakeRunner> {
    let runner = FakeRunner::new();
    runner
        .on(LIST_CONTAINERS, list(&[]))
        .on(LIST_IMAGES, list(&[]))
        .on(BUILDER_STATUS, Reply::Ok(String::new()))
        .on("ls", Reply::Ok(String::new()));
    runner
}

#[tokio::test(start_paused = true)]
async fn test_polling_refreshes_on_interval_until_stopped() {
    let runner = steady_runtime();
    let ctrl = controller(&runner);

    let handle = ctrl.start_polling().unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(runner.count(LIST_CONTAINERS), 1);

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(runner.count(LIST_CONTAINERS), 3);
    assert!(handle.is_active());

    handle.stop().await;
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(runner.count(LIST_CONTAINERS), 3);
}

#[tokio::test(start_paused = true)]
async fn test_dropping_handle_cancels_polling() {
    let runner = steady_runtime();
    let ctrl = controller(&runner);

    let handle = ctrl.start_polling_every(Duration::from_secs(1)).unwrap();
    tokio::time::sleep(Duration::from_millis(1500)).await;
    let seen = runner.count(LIST_CONTAINERS);
    assert_eq!(seen, 2);

    drop(handle);
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(runner.count(LIST_CONTAINERS), seen);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_stops_every_loop() {
    let runner = steady_runtime();
    let ctrl = controller(&runner);

    let first = ctrl.start_polling_every(Duration::from_secs(1)).unwrap();
    let second = ctrl.start_polling_every(Duration::from_secs(1)).unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    ctrl.shutdown();
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(!first.is_active());
    assert!(!second.is_active());
}

#[tokio::test]
async fn test_zero_interval_disables_polling() {
    let runner = steady_runtime();
    let mut cfg = config();
    cfg.refresh_interval = Duration::ZERO;
    let ctrl = controller_with(&runner, cfg);

    assert!(ctrl.start_polling().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_zero_period_is_refused() {
    let runner = steady_runtime();
    let ctrl = controller(&runner);

    assert!(ctrl.start_polling_every(Duration::ZERO).is_none());
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(runner.calls().is_empty());
}

// ── Concurrent refresh and convergence ──────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_stale_list_cannot_undo_converged_stop() {
    let runner = FakeRunner::new();
    runner
        .on("stop c1", Reply::Ok(String::new()))
        .on(
            LIST_CONTAINERS,
            Reply::delayed(Duration::from_secs(1), list(&[container("c1", "running")])),
        )
        .on(LIST_CONTAINERS, list(&[container("c1", "stopped")]));
    let ctrl = controller(&runner);

    // A list issued before the stop is still in flight when the stop lands.
    let slow = tokio::spawn({
        let ctrl = ctrl.clone();
        async move { ctrl.refresh_containers().await }
    });
    tokio::time::sleep(Duration::from_millis(10)).await;

    let outcome = ctrl.stop_container("c1").await.unwrap();
    assert_eq!(outcome, Convergence::Converged { attempts: 1 });
    assert!(ctrl.store().is_loading(ResourceClass::Containers));

    slow.await.unwrap().unwrap();
    assert!(!ctrl.store().container_by_id("c1").unwrap().is_running());
    assert!(!ctrl.store().is_loading(ResourceClass::Containers));
    assert!(ctrl.store().busy_ids().is_empty());
    assert_eq!(ctrl.store().take_error(), None);
}

#[tokio::test(start_paused = true)]
async fn test_polling_alongside_stop_keeps_store_consistent() {
    let runner = FakeRunner::new();
    runner
        .on("stop c1", Reply::Ok(String::new()))
        .on(
            LIST_CONTAINERS,
            Reply::delayed(Duration::from_millis(700), list(&[container("c1", "running")])),
        )
        .on(LIST_CONTAINERS, list(&[container("c1", "stopped")]))
        .on(LIST_IMAGES, list(&[]))
        .on(BUILDER_STATUS, Reply::Ok(String::new()))
        .on("ls", Reply::Ok(String::new()));
    let ctrl = controller(&runner);

    let handle = ctrl.start_polling_every(Duration::from_secs(1)).unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(ctrl.store().is_loading(ResourceClass::Containers));

    let outcome = ctrl.stop_container("c1").await.unwrap();
    assert_eq!(outcome, Convergence::Converged { attempts: 1 });
    assert!(!ctrl.store().is_busy("c1"));
    // The periodic list is still outstanding.
    assert!(ctrl.store().is_loading(ResourceClass::Containers));

    tokio::time::sleep(Duration::from_millis(2500)).await;
    handle.stop().await;

    assert!(runner.count(LIST_CONTAINERS) >= 4);
    assert!(!ctrl.store().container_by_id("c1").unwrap().is_running());
    assert!(ctrl.store().busy_ids().is_empty());
    assert!(!ctrl.store().loading().any());
    assert_eq!(ctrl.store().system_status(), SystemStatus::Running);
}
