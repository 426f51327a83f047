//! Typed client surface over the container runtime.
//!
//! The provisioner never builds command strings. Every operation it needs
//! is one method on [`ContainerRuntime`], implemented for Docker by
//! [`DockerRuntime`] and in memory by
//! [`RecordingRuntime`](crate::testing::RecordingRuntime).
//!
//! Removing something that does not exist is not an error for any of the
//! `remove_*` methods.

pub mod detect;
pub mod docker;

use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use futures::Stream;
use serde::Serialize;

pub use detect::{DockerDiagnosis, DockerState, diagnose_docker, explain_unreachable};
pub use docker::{DockerRuntime, connect_docker};

use crate::error::RuntimeError;

/// Stream of container output, one chunk per item.
pub type LogStream = Pin<Box<dyn Stream<Item = Result<String, RuntimeError>> + Send>>;

/// Health as reported by the runtime's own health probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthState {
    /// No health check configured.
    None,
    Starting,
    Healthy,
    Unhealthy,
}

impl HealthState {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthState::None => "none",
            HealthState::Starting => "starting",
            HealthState::Healthy => "healthy",
            HealthState::Unhealthy => "unhealthy",
        }
    }
}

impl std::fmt::Display for HealthState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time view of a container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContainerStatus {
    pub id: String,
    pub running: bool,
    pub health: HealthState,
    /// Output of the most recent health probe, if any.
    pub last_health_output: Option<String>,
    pub exit_code: Option<i64>,
}

/// Resource limit applied to the container, e.g. `memlock=-1:-1`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ulimit {
    pub name: String,
    pub soft: i64,
    pub hard: i64,
}

impl Ulimit {
    pub fn new(name: &str, soft: i64, hard: i64) -> Self {
        Self {
            name: name.to_string(),
            soft,
            hard,
        }
    }
}

/// Health probe run by the runtime inside the container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthProbe {
    /// Shell command; exit 0 means healthy.
    pub command: String,
    pub interval: Duration,
    pub timeout: Duration,
    pub retries: u32,
}

/// Everything needed to create and start one container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSpec {
    pub name: String,
    pub image: String,
    pub network: String,
    /// Environment as `(name, value)` pairs, in order.
    pub env: Vec<(String, String)>,
    /// Published port: `(host_port, container_port)`.
    pub port: (u16, u16),
    /// Named volume and its mount point.
    pub volume: (String, String),
    pub ulimits: Vec<Ulimit>,
    pub health: Option<HealthProbe>,
}

impl ContainerSpec {
    /// Look up an environment value by name.
    pub fn env_value(&self, key: &str) -> Option<&str> {
        self.env
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Operations the provisioner needs from a container runtime.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Check that the daemon answers.
    async fn ping(&self) -> Result<(), RuntimeError>;

    async fn network_exists(&self, name: &str) -> Result<bool, RuntimeError>;

    async fn create_network(&self, name: &str) -> Result<(), RuntimeError>;

    /// Names of the containers attached to a network.
    async fn network_containers(&self, name: &str) -> Result<Vec<String>, RuntimeError>;

    async fn remove_network(&self, name: &str) -> Result<(), RuntimeError>;

    async fn remove_volume(&self, name: &str) -> Result<(), RuntimeError>;

    /// Pull an image. One attempt; retrying is the caller's business.
    async fn pull_image(&self, image: &str) -> Result<(), RuntimeError>;

    /// Create and start a container, returning its id.
    async fn run_container(&self, spec: &ContainerSpec) -> Result<String, RuntimeError>;

    /// `Ok(None)` if the container does not exist.
    async fn inspect_container(&self, name: &str) -> Result<Option<ContainerStatus>, RuntimeError>;

    /// Everything the container has written so far.
    async fn container_logs(&self, name: &str) -> Result<String, RuntimeError>;

    /// Follow container output until it exits.
    fn stream_logs(&self, name: &str) -> LogStream;

    /// Force-remove a container together with its anonymous volumes.
    async fn remove_container(&self, name: &str) -> Result<(), RuntimeError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_state_display() {
        assert_eq!(HealthState::Starting.to_string(), "starting");
        assert_eq!(HealthState::Healthy.as_str(), "healthy");
        assert_eq!(
            serde_json::to_string(&HealthState::Unhealthy).unwrap(),
            "\"unhealthy\""
        );
    }

    #[test]
    fn test_env_value_lookup() {
        let spec = ContainerSpec {
            name: "instance".to_string(),
            image: "es".to_string(),
            network: "net".to_string(),
            env: vec![("node.name".to_string(), "instance".to_string())],
            port: (9200, 9200),
            volume: ("instance-rest-data".to_string(), "/data".to_string()),
            ulimits: Vec::new(),
            health: None,
        };
        assert_eq!(spec.env_value("node.name"), Some("instance"));
        assert_eq!(spec.env_value("cluster.name"), None);
    }
}
