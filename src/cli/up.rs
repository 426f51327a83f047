//! `up` and `cleanup` commands.

use std::future::Future;
use std::sync::Arc;

use crate::cli::{TargetArgs, UpArgs};
use crate::config::{ConfigOverrides, ProvisionConfig};
use crate::provisioner::{
    CleanupReport, Outcome, OutputSink, Provisioner, RunningEnvironment, docker_unavailable,
    shutdown_signal,
};
use crate::runtime::{ContainerRuntime, DockerRuntime};

/// Provision a node. Honors `CLEANUP=true` by cleaning up instead.
pub async fn run_up_command(args: &UpArgs, json: bool) -> anyhow::Result<()> {
    let config = ProvisionConfig::resolve(&args.overrides())?;
    provision(config, json).await
}

/// Remove every container on the run's network, then the network.
pub async fn run_cleanup_command(args: &TargetArgs, json: bool) -> anyhow::Result<()> {
    let config = ProvisionConfig::resolve(&ConfigOverrides {
        cleanup_only: Some(true),
        ..args.overrides()
    })?;
    provision(config, json).await
}

async fn provision(config: ProvisionConfig, json: bool) -> anyhow::Result<()> {
    let runtime = DockerRuntime::connect().await.map_err(docker_unavailable)?;
    let streams = Streams {
        stdout: OutputSink::stdout(),
        stderr: OutputSink::stderr(),
    };
    provision_with(Arc::new(runtime), config, json, streams, shutdown_signal()).await
}

struct Streams {
    stdout: OutputSink,
    stderr: OutputSink,
}

/// With `--json`, stdout carries only the result document and container
/// output moves to stderr.
async fn provision_with<S>(
    runtime: Arc<dyn ContainerRuntime>,
    config: ProvisionConfig,
    json: bool,
    streams: Streams,
    shutdown: S,
) -> anyhow::Result<()>
where
    S: Future<Output = &'static str>,
{
    let container_output = if json {
        streams.stderr
    } else {
        streams.stdout.clone()
    };
    let provisioner = Provisioner::new(config, runtime).with_output(container_output);
    let outcome = provisioner.run(shutdown).await?;

    let rendered = if json {
        outcome_json(&outcome)?
    } else {
        outcome_message(&outcome)
    };
    streams.stdout.write_text(&format!("{}\n", rendered));
    Ok(())
}

fn outcome_json(outcome: &Outcome) -> serde_json::Result<String> {
    match outcome {
        Outcome::Detached(env) | Outcome::Finished(env) => serde_json::to_string_pretty(env),
        Outcome::CleanedUp(report) => serde_json::to_string_pretty(report),
    }
}

fn outcome_message(outcome: &Outcome) -> String {
    match outcome {
        Outcome::Detached(RunningEnvironment {
            node_name,
            network,
            url,
            ..
        }) => format!(
            "SUCCESS: Detached and healthy: {} on docker network: {} ({})",
            node_name, network, url
        ),
        Outcome::Finished(env) => {
            format!("SUCCESS: Node {} stopped and cleaned up", env.node_name)
        }
        Outcome::CleanedUp(CleanupReport {
            network,
            network_existed: true,
            ..
        }) => format!("SUCCESS: Cleaned up docker network {}", network),
        Outcome::CleanedUp(report) => {
            format!("SUCCESS: {} is already deleted", report.network)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::future::pending;
    use std::time::Duration;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::config::{IMAGE_VAR, Timings};
    use crate::testing::{RecordingRuntime, SharedBuffer};

    fn detached_config() -> ProvisionConfig {
        let lookup = |key: &str| (key == IMAGE_VAR).then(|| "elasticsearch:8.13.0".to_string());
        let overrides = ConfigOverrides {
            detach: Some(true),
            ..Default::default()
        };
        let mut config = ProvisionConfig::resolve_with(&overrides, &lookup).unwrap();
        config.timings = Timings {
            poll_interval: Duration::ZERO,
            ..Timings::default()
        };
        config
    }

    async fn up(json: bool) -> (SharedBuffer, SharedBuffer) {
        let runtime = RecordingRuntime::new().with_logs("[instance] started\n");
        let (stdout, stderr) = (SharedBuffer::new(), SharedBuffer::new());
        let streams = Streams {
            stdout: OutputSink::new(stdout.clone()),
            stderr: OutputSink::new(stderr.clone()),
        };
        provision_with(Arc::new(runtime), detached_config(), json, streams, pending())
            .await
            .unwrap();
        (stdout, stderr)
    }

    #[tokio::test]
    async fn test_json_stdout_is_only_the_document() {
        let (stdout, stderr) = up(true).await;

        let value: serde_json::Value = serde_json::from_str(&stdout.contents()).unwrap();
        assert_eq!(value["node_name"], "instance");
        assert_eq!(value["url"], "http://localhost:9200");
        assert_eq!(stderr.contents(), "[instance] started\n");
    }

    #[tokio::test]
    async fn test_plain_output_keeps_logs_on_stdout() {
        let (stdout, stderr) = up(false).await;

        let text = stdout.contents();
        assert!(text.starts_with("[instance] started\n"));
        assert!(text.ends_with("(http://localhost:9200)\n"));
        assert_eq!(stderr.contents(), "");
    }

    fn env(detached: bool) -> RunningEnvironment {
        RunningEnvironment {
            node_name: "instance".to_string(),
            container_id: "abc123".to_string(),
            cluster_name: "elasticsearch-8-13-0-rest".to_string(),
            network: "elasticsearch-8-13-0-rest".to_string(),
            volume: "instance-rest-data".to_string(),
            image: "docker.elastic.co/elasticsearch/elasticsearch:8.13.0".to_string(),
            url: "http://localhost:9200".to_string(),
            detached,
        }
    }

    #[test]
    fn test_detached_message() {
        assert_eq!(
            outcome_message(&Outcome::Detached(env(true))),
            concat!(
                "SUCCESS: Detached and healthy: instance on docker network: ",
                "elasticsearch-8-13-0-rest (http://localhost:9200)"
            )
        );
    }

    #[test]
    fn test_cleanup_messages() {
        let mut report = CleanupReport {
            network: "ci-net".to_string(),
            network_existed: false,
            removed_containers: Vec::new(),
        };
        assert_eq!(
            outcome_message(&Outcome::CleanedUp(report.clone())),
            "SUCCESS: ci-net is already deleted"
        );
        report.network_existed = true;
        assert_eq!(
            outcome_message(&Outcome::CleanedUp(report)),
            "SUCCESS: Cleaned up docker network ci-net"
        );
    }

    #[test]
    fn test_outcome_json_is_environment() {
        let json = outcome_json(&Outcome::Detached(env(true))).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["url"], "http://localhost:9200");
        assert_eq!(value["detached"], true);
    }
}
