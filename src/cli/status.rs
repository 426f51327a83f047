//! `status` command: what is running for a run identity.

use serde::Serialize;

use crate::cli::TargetArgs;
use crate::config::ProvisionConfig;
use crate::probe::{ClusterHealth, probe_cluster_health};
use crate::runtime::{ContainerRuntime, ContainerStatus, DockerRuntime};

/// Snapshot of a run's resources.
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub node_name: String,
    pub network: String,
    pub network_exists: bool,
    pub container: Option<ContainerStatus>,
    pub url: String,
    /// Only queried while the container is running.
    pub cluster: Option<ClusterHealth>,
}

pub async fn run_status_command(args: &TargetArgs, json: bool) -> anyhow::Result<()> {
    let config = ProvisionConfig::resolve(&args.overrides())?;
    let runtime = DockerRuntime::connect().await?;
    let report = collect_status(&runtime, &config).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", render_status(&report));
    }
    Ok(())
}

/// Inspect the network and node, then probe the cluster if it is up.
pub async fn collect_status(
    runtime: &dyn ContainerRuntime,
    config: &ProvisionConfig,
) -> anyhow::Result<StatusReport> {
    let network_exists = runtime.network_exists(&config.network_name).await?;
    let container = runtime.inspect_container(&config.node_name).await?;
    let url = config.endpoint_url();

    let cluster = match container {
        Some(ref status) if status.running => {
            match probe_cluster_health(&url, &config.password).await {
                Ok(health) => health,
                Err(e) => {
                    tracing::warn!("Cluster health probe failed: {}", e);
                    None
                }
            }
        }
        _ => None,
    };

    Ok(StatusReport {
        node_name: config.node_name.clone(),
        network: config.network_name.clone(),
        network_exists,
        container,
        url,
        cluster,
    })
}

pub fn render_status(report: &StatusReport) -> String {
    let network = if report.network_exists {
        "present"
    } else {
        "absent"
    };
    let container = match report.container {
        Some(ref c) if c.running => format!("running ({})", c.health),
        Some(ref c) => match c.exit_code {
            Some(code) => format!("exited ({})", code),
            None => "stopped".to_string(),
        },
        None => "absent".to_string(),
    };
    let cluster = match report.cluster {
        Some(ref h) => format!(
            "{} ({}, {} node{})",
            h.cluster_name,
            h.status,
            h.number_of_nodes,
            if h.number_of_nodes == 1 { "" } else { "s" }
        ),
        None => "unreachable".to_string(),
    };

    format!(
        "Network:   {} ({})\nNode:      {} ({})\nEndpoint:  {}\nCluster:   {}\n",
        report.network, network, report.node_name, container, report.url, cluster
    )
}
