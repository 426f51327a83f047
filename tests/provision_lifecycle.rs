//! End-to-end provisioning runs against the in-memory runtime.

use std::future::pending;
use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;

use es_testenv::config::{ConfigOverrides, IMAGE_VAR, ProvisionConfig, Timings};
use es_testenv::error::{ConfigError, ProvisionError};
use es_testenv::provisioner::{Outcome, OutputSink, Provisioner};
use es_testenv::testing::{HealthStep, RecordingRuntime};

const NETWORK: &str = "elasticsearch-8-13-0-rest";

fn config(overrides: ConfigOverrides) -> ProvisionConfig {
    let lookup = |key: &str| (key == IMAGE_VAR).then(|| "elasticsearch:8.13.0".to_string());
    let mut config = ProvisionConfig::resolve_with(&overrides, &lookup).unwrap();
    config.timings = Timings {
        pull_retry_delay: Duration::ZERO,
        poll_interval: Duration::ZERO,
        ..Timings::default()
    };
    config
}

fn detached() -> ProvisionConfig {
    config(ConfigOverrides {
        detach: Some(true),
        ..Default::default()
    })
}

fn attached() -> ProvisionConfig {
    config(ConfigOverrides::default())
}

fn cleanup_only() -> ProvisionConfig {
    config(ConfigOverrides {
        cleanup_only: Some(true),
        ..Default::default()
    })
}

async fn run(
    config: ProvisionConfig,
    runtime: &RecordingRuntime,
) -> Result<Outcome, ProvisionError> {
    Provisioner::new(config, Arc::new(runtime.clone()))
        .with_output(OutputSink::new(std::io::sink()))
        .run(pending())
        .await
}

#[tokio::test]
async fn cleanup_without_network_is_a_no_op() {
    let runtime = RecordingRuntime::new();

    let outcome = run(cleanup_only(), &runtime).await.unwrap();

    let Outcome::CleanedUp(report) = outcome else {
        panic!("expected cleanup outcome");
    };
    assert!(!report.network_existed);
    assert!(report.removed_containers.is_empty());
    assert_eq!(
        runtime.calls(),
        vec!["ping".to_string(), format!("network_exists {}", NETWORK)]
    );
}

#[tokio::test]
async fn cleanup_leaves_other_networks_alone() {
    let runtime = RecordingRuntime::new();
    runtime.insert_container("instance", "elasticsearch-7-17-20-rest", "instance-rest-data");
    runtime.insert_container("instance-b", NETWORK, "instance-b-rest-data");

    run(cleanup_only(), &runtime).await.unwrap();

    assert_eq!(runtime.containers(), vec!["instance".to_string()]);
    assert_eq!(runtime.networks(), vec!["elasticsearch-7-17-20-rest".to_string()]);
    assert_eq!(runtime.volumes(), vec!["instance-rest-data".to_string()]);
}

#[tokio::test]
async fn repeated_cycles_leave_nothing_behind() {
    let runtime = RecordingRuntime::new();

    for _ in 0..2 {
        let outcome = run(attached(), &runtime).await.unwrap();
        assert!(matches!(outcome, Outcome::Finished(_)));
        assert!(runtime.containers().is_empty());
        assert!(runtime.volumes().is_empty());
        assert!(runtime.networks().is_empty());
    }
    assert_eq!(runtime.calls_named("create_network"), 2);
}

#[tokio::test]
async fn detached_then_cleanup_leaves_nothing_behind() {
    let runtime = RecordingRuntime::new();

    let Outcome::Detached(env) = run(detached(), &runtime).await.unwrap() else {
        panic!("expected detached outcome");
    };
    assert_eq!(env.volume, "instance-rest-data");
    assert_eq!(runtime.containers(), vec!["instance".to_string()]);

    run(cleanup_only(), &runtime).await.unwrap();
    assert!(runtime.containers().is_empty());
    assert!(runtime.volumes().is_empty());
    assert!(runtime.networks().is_empty());
}

#[tokio::test]
async fn rerun_replaces_a_leftover_node() {
    let runtime = RecordingRuntime::new();
    runtime.insert_container("instance", NETWORK, "instance-rest-data");

    let outcome = run(detached(), &runtime).await.unwrap();

    assert!(matches!(outcome, Outcome::Detached(_)));
    assert_eq!(runtime.calls_named("run_container"), 1);
    assert_eq!(runtime.calls_named("create_network"), 0);
}

#[test]
fn missing_image_fails_before_any_runtime_call() {
    let lookup = |_: &str| -> Option<String> { None };
    let err = ProvisionConfig::resolve_with(&ConfigOverrides::default(), &lookup).unwrap_err();
    assert!(matches!(err, ConfigError::Missing { ref key, .. } if key == IMAGE_VAR));
}

#[tokio::test]
async fn transient_pull_failures_are_tolerated() {
    let runtime = RecordingRuntime::new().with_pull_failures(4);

    let outcome = run(detached(), &runtime).await.unwrap();

    assert!(matches!(outcome, Outcome::Detached(_)));
    assert_eq!(runtime.calls_named("pull_image"), 5);
    assert_eq!(
        runtime.pulled_images(),
        vec!["docker.elastic.co/elasticsearch/elasticsearch:8.13.0".to_string()]
    );
}

#[tokio::test]
async fn exhausted_pulls_fail_and_clean_up() {
    let runtime = RecordingRuntime::new().with_pull_failures(5);

    let err = run(detached(), &runtime).await.unwrap_err();

    assert!(matches!(err, ProvisionError::Pull { attempts: 5, .. }));
    assert_eq!(runtime.calls_named("run_container"), 0);
    assert_eq!(runtime.networks(), vec![NETWORK.to_string()]);
    assert_eq!(
        runtime.calls().last(),
        Some(&"remove_volume instance-rest-data".to_string())
    );
}

#[tokio::test]
async fn failed_detached_run_leaves_network_for_the_next_run() {
    let runtime = RecordingRuntime::new()
        .with_health_script(vec![HealthStep::starting(""), HealthStep::unhealthy()]);

    run(detached(), &runtime).await.unwrap_err();
    assert_eq!(runtime.networks(), vec![NETWORK.to_string()]);
    assert!(runtime.containers().is_empty());
    assert!(runtime.volumes().is_empty());

    let runtime = runtime.with_health_script(vec![HealthStep::healthy()]);
    let outcome = run(detached(), &runtime).await.unwrap();
    assert!(matches!(outcome, Outcome::Detached(_)));
    assert_eq!(runtime.calls_named("create_network"), 1);
}

#[tokio::test]
async fn healthy_detached_node_keeps_running() {
    let runtime = RecordingRuntime::new().with_health_script(vec![
        HealthStep::starting("waiting for [instance]"),
        HealthStep::starting("waiting for [instance]"),
        HealthStep::healthy(),
    ]);

    let Outcome::Detached(env) = run(detached(), &runtime).await.unwrap() else {
        panic!("expected detached outcome");
    };

    assert_eq!(env.node_name, "instance");
    assert_eq!(env.cluster_name, NETWORK);
    assert!(env.detached);
    assert_eq!(runtime.containers(), vec!["instance".to_string()]);
    assert_eq!(runtime.volumes(), vec!["instance-rest-data".to_string()]);
    assert_eq!(runtime.networks(), vec![NETWORK.to_string()]);
    assert_eq!(runtime.calls_named("remove_network"), 0);
}

#[tokio::test]
async fn node_that_stops_during_startup_is_removed() {
    let runtime = RecordingRuntime::new()
        .with_logs("bootstrap checks failed\n")
        .with_health_script(vec![HealthStep::starting(""), HealthStep::stopped(78)]);

    let err = run(detached(), &runtime).await.unwrap_err();

    assert!(err.to_string().contains("exit code 78"));
    assert_eq!(runtime.calls_named("container_logs"), 1);
    assert!(runtime.containers().is_empty());
    assert!(runtime.volumes().is_empty());
    assert_eq!(runtime.networks(), vec![NETWORK.to_string()]);
}
