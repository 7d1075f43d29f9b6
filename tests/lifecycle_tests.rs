//! Lifecycle integration tests: auto-wake ordering, start deduplication,
//! idle-sleep sweeps and readiness failure modes, all against in-memory
//! fakes.

mod common;

use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

use common::{catalog_fixture, MockProcessController, NullProber};
use hub_gateway::lifecycle::{
    IdleSettings, LifecycleConfig, LifecycleController, ServiceLifecycle,
};
use hub_gateway::registry::{ActualState, ServiceRegistry};
use hub_gateway::types::LifecycleError;

fn test_config() -> LifecycleConfig {
    LifecycleConfig {
        readiness_timeout: Duration::from_millis(500),
        poll_interval: Duration::from_millis(20),
        max_poll_interval: Duration::from_millis(50),
        idle: IdleSettings {
            enabled: true,
            check_interval: Duration::from_secs(600),
            timeout_minutes: 30,
        },
    }
}

fn build_lifecycle(
    dir: &TempDir,
    controller: MockProcessController,
) -> (Arc<ServiceLifecycle>, Arc<MockProcessController>, Arc<ServiceRegistry>) {
    let catalog = catalog_fixture(dir, true);
    let snapshot = catalog.snapshot();
    let names = snapshot.service_names();
    let registry = Arc::new(ServiceRegistry::new(names.iter(), |name| {
        snapshot.aliases.services.get(name).copied()
    }));
    drop(snapshot);
    let controller = Arc::new(controller);
    let lifecycle = ServiceLifecycle::new(
        catalog,
        Arc::clone(&registry),
        controller.clone(),
        Arc::new(NullProber),
        test_config(),
    );
    (lifecycle, controller, registry)
}

#[tokio::test]
async fn ensure_ready_starts_dependencies_first() {
    let dir = TempDir::new().unwrap();
    let (lifecycle, controller, registry) = build_lifecycle(&dir, MockProcessController::new());

    lifecycle.ensure_ready(&["ollama".to_string()]).await.unwrap();

    assert_eq!(controller.start_calls(), vec!["hub-redis", "hub-ollama"]);
    assert_eq!(registry.actual("redis"), Some(ActualState::Running));
    assert_eq!(registry.actual("ollama"), Some(ActualState::Running));
}

#[tokio::test]
async fn already_running_services_are_not_restarted() {
    let dir = TempDir::new().unwrap();
    let (lifecycle, controller, _registry) = build_lifecycle(&dir, MockProcessController::new());
    controller.mark_running("hub-redis");
    controller.mark_running("hub-ollama");

    lifecycle.ensure_ready(&["ollama".to_string()]).await.unwrap();

    assert!(controller.start_calls().is_empty());
}

#[tokio::test]
async fn concurrent_wakes_issue_exactly_one_start_per_service() {
    let dir = TempDir::new().unwrap();
    let (lifecycle, controller, _registry) = build_lifecycle(&dir, MockProcessController::new());

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let lifecycle = Arc::clone(&lifecycle);
            tokio::spawn(async move { lifecycle.ensure_ready(&["ollama".to_string()]).await })
        })
        .collect();
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    assert_eq!(controller.start_count("hub-redis"), 1);
    assert_eq!(controller.start_count("hub-ollama"), 1);
}

#[tokio::test]
async fn dependency_start_failure_names_the_dependency() {
    let dir = TempDir::new().unwrap();
    let (lifecycle, _controller, _registry) =
        build_lifecycle(&dir, MockProcessController::failing(&["hub-redis"]));

    let err = lifecycle
        .ensure_ready(&["ollama".to_string()])
        .await
        .unwrap_err();
    match err {
        LifecycleError::DependencyStartFailed {
            target, dependency, ..
        } => {
            assert_eq!(target, "ollama");
            assert_eq!(dependency, "redis");
        }
        other => panic!("expected DependencyStartFailed, got {:?}", other),
    }
}

#[tokio::test]
async fn direct_start_failure_stays_a_target_failure() {
    let dir = TempDir::new().unwrap();
    let (lifecycle, _controller, _registry) =
        build_lifecycle(&dir, MockProcessController::failing(&["hub-redis"]));

    let err = lifecycle
        .ensure_ready(&["redis".to_string()])
        .await
        .unwrap_err();
    assert!(matches!(err, LifecycleError::TargetStartFailed { service, .. } if service == "redis"));
}

#[tokio::test]
async fn readiness_timeout_when_service_never_turns_healthy() {
    let dir = TempDir::new().unwrap();
    let (lifecycle, controller, _registry) =
        build_lifecycle(&dir, MockProcessController::never_ready());

    let err = lifecycle
        .ensure_ready(&["redis".to_string()])
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        LifecycleError::ReadinessTimeout { service, .. } if service == "redis"
    ));
    // the start command itself was issued exactly once
    assert_eq!(controller.start_count("hub-redis"), 1);
}

#[tokio::test]
async fn idle_sweep_stops_timed_out_services_only() {
    let dir = TempDir::new().unwrap();
    let (lifecycle, controller, registry) = build_lifecycle(&dir, MockProcessController::new());
    controller.mark_running("hub-redis");
    controller.mark_running("hub-ollama");
    registry.set_actual("redis", ActualState::Running);
    registry.set_actual("ollama", ActualState::Running);

    // redis times out instantly, ollama keeps the 30-minute default
    registry.set_idle_sleep("redis", Some(true), Some(0));

    lifecycle.idle_sweep().await;

    assert_eq!(registry.actual("redis"), Some(ActualState::Stopped));
    assert_eq!(registry.actual("ollama"), Some(ActualState::Running));
}

#[tokio::test]
async fn keep_warm_pin_survives_the_sweep() {
    let dir = TempDir::new().unwrap();
    let (lifecycle, controller, registry) = build_lifecycle(&dir, MockProcessController::new());
    controller.mark_running("hub-ollama");
    registry.set_actual("ollama", ActualState::Running);
    registry.set_idle_sleep("ollama", Some(true), Some(0));

    lifecycle
        .keep_warm(&"ollama".to_string(), Duration::from_secs(30 * 60))
        .await
        .unwrap();
    lifecycle.idle_sweep().await;

    assert_eq!(registry.actual("ollama"), Some(ActualState::Running));
}

#[tokio::test]
async fn per_service_disable_overrides_global_idle_sleep() {
    let dir = TempDir::new().unwrap();
    let (lifecycle, controller, registry) = build_lifecycle(&dir, MockProcessController::new());
    controller.mark_running("hub-redis");
    registry.set_actual("redis", ActualState::Running);
    // timed out but exempt
    registry.set_idle_sleep("redis", Some(false), Some(0));

    lifecycle.idle_sweep().await;

    assert_eq!(registry.actual("redis"), Some(ActualState::Running));
}

#[tokio::test]
async fn keep_warm_rejects_unknown_services() {
    let dir = TempDir::new().unwrap();
    let (lifecycle, _controller, _registry) = build_lifecycle(&dir, MockProcessController::new());

    let err = lifecycle
        .keep_warm(&"ghost".to_string(), Duration::from_secs(60))
        .await
        .unwrap_err();
    assert!(matches!(err, LifecycleError::UnknownService { .. }));
}
