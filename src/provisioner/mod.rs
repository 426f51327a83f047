//! Disposable Elasticsearch environment provisioning.
//!
//! A run stands up exactly one node on its own network and guarantees that
//! whatever it created is removed again, whichever way the run ends.
//!
//! # Flow
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────────────────┐
//! │                              Provisioner::run                              │
//! │                                                                            │
//! │   ┌──────────────┐     ┌──────────────┐     ┌──────────────────────────┐  │
//! │   │ Pre-clean    │────▶│ Ensure       │────▶│ Pull Image               │  │
//! │   │ node+volume  │     │ Network      │     │ (5 attempts, 10s apart)  │  │
//! │   └──────────────┘     └──────────────┘     └──────────────────────────┘  │
//! │                                                        │                   │
//! │                                                        ▼                   │
//! │   ┌──────────────┐     ┌──────────────┐     ┌──────────────────────────┐  │
//! │   │ Teardown     │◀────│ Wait healthy │◀────│ Start Container          │  │
//! │   │ (attached or │     │ (detached) / │     │                          │  │
//! │   │  on failure) │     │ follow logs  │     │                          │  │
//! │   └──────────────┘     └──────────────┘     └──────────────────────────┘  │
//! └───────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Everything after pre-clean races a shutdown signal; teardown runs after
//! the race no matter which side won. A detached run that fails removes
//! its node and volume but keeps the network.
//!
//! Container output goes to an [`OutputSink`], stdout unless told otherwise.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use es_testenv::config::{ConfigOverrides, ProvisionConfig};
//! use es_testenv::provisioner::{Outcome, Provisioner, shutdown_signal};
//! use es_testenv::runtime::DockerRuntime;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ProvisionConfig::resolve(&ConfigOverrides {
//!     image: Some("elasticsearch:8.13.0".to_string()),
//!     detach: Some(true),
//!     ..Default::default()
//! })?;
//! let runtime = Arc::new(DockerRuntime::connect().await?);
//!
//! let provisioner = Provisioner::new(config, runtime);
//! if let Outcome::Detached(env) = provisioner.run(shutdown_signal()).await? {
//!     println!("Elasticsearch ready at {}", env.url);
//! }
//!
//! // Later, once the test suite is done
//! provisioner.teardown().await;
//! # Ok(())
//! # }
//! ```

pub mod node;
pub mod pull;
pub mod readiness;

use std::future::Future;
use std::io::Write;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};

use futures::StreamExt;
use serde::Serialize;

pub use node::{health_probe, node_spec};
pub use pull::pull_with_retry;
pub use readiness::wait_until_healthy;

use crate::config::ProvisionConfig;
use crate::error::{ProvisionError, Result};
use crate::naming::volume_name;
use crate::runtime::{ContainerRuntime, explain_unreachable};

/// A provisioned node, as handed back to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunningEnvironment {
    pub node_name: String,
    pub container_id: String,
    pub cluster_name: String,
    pub network: String,
    pub volume: String,
    pub image: String,
    /// Base URL reachable from the host.
    pub url: String,
    pub detached: bool,
}

/// What a cleanup-only run removed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    pub network: String,
    /// False when there was nothing to clean up.
    pub network_existed: bool,
    pub removed_containers: Vec<String>,
}

/// How a run ended successfully.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Healthy and left running in the background.
    Detached(RunningEnvironment),
    /// Ran in the foreground and has been torn down.
    Finished(RunningEnvironment),
    /// Cleanup-only mode.
    CleanedUp(CleanupReport),
}

/// Where container output is written.
#[derive(Clone)]
pub struct OutputSink(Arc<Mutex<dyn Write + Send>>);

impl OutputSink {
    pub fn new<W: Write + Send + 'static>(writer: W) -> Self {
        Self(Arc::new(Mutex::new(writer)))
    }

    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }

    pub fn stderr() -> Self {
        Self::new(std::io::stderr())
    }

    /// Write and flush. A closed pipe is logged, not fatal.
    pub fn write_text(&self, text: &str) {
        let mut out = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        if let Err(e) = out.write_all(text.as_bytes()).and_then(|()| out.flush()) {
            tracing::debug!("Dropped output: {}", e);
        }
    }
}

impl std::fmt::Debug for OutputSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("OutputSink")
    }
}

/// Map a failed connection or ping to a preflight error with a remedy.
pub fn docker_unavailable(error: crate::error::RuntimeError) -> ProvisionError {
    ProvisionError::DockerNotAvailable {
        reason: explain_unreachable(&error),
    }
}

/// Drives one provisioning run against a container runtime.
pub struct Provisioner {
    config: ProvisionConfig,
    runtime: Arc<dyn ContainerRuntime>,
    output: OutputSink,
}

impl Provisioner {
    pub fn new(config: ProvisionConfig, runtime: Arc<dyn ContainerRuntime>) -> Self {
        Self {
            config,
            runtime,
            output: OutputSink::stdout(),
        }
    }

    /// Send container output somewhere other than stdout.
    pub fn with_output(mut self, output: OutputSink) -> Self {
        self.output = output;
        self
    }

    pub fn config(&self) -> &ProvisionConfig {
        &self.config
    }

    /// Run to completion.
    ///
    /// `shutdown` resolves with a signal name when the run should stop. In
    /// attached mode that is the normal way to end a run; while
    /// provisioning it aborts with [`ProvisionError::Interrupted`].
    pub async fn run<S>(&self, shutdown: S) -> Result<Outcome>
    where
        S: Future<Output = &'static str>,
    {
        self.runtime.ping().await.map_err(docker_unavailable)?;

        if self.config.cleanup_only {
            return self.cleanup_network().await.map(Outcome::CleanedUp);
        }

        self.pre_clean().await;

        tokio::pin!(shutdown);

        let provisioned = tokio::select! {
            result = self.provision() => result,
            signal = &mut shutdown => {
                tracing::warn!("Received {}, aborting provisioning", signal);
                Err(ProvisionError::Interrupted { signal })
            }
        };

        let result = match provisioned {
            Ok(env) if env.detached => Ok(Outcome::Detached(env)),
            Ok(env) => self
                .follow(&env.node_name, shutdown.as_mut())
                .await
                .map(|()| Outcome::Finished(env)),
            Err(e) => Err(e),
        };

        if !self.config.detach {
            self.teardown().await;
        } else if result.is_err() {
            tracing::info!("Removing failed node, keeping network {}", self.config.network_name);
            self.remove_node(&self.config.node_name, &self.config.volume_name)
                .await;
        }

        result
    }

    /// Create the network, pull the image and start the node.
    ///
    /// In detached mode this also waits for the node to report healthy and
    /// dumps its logs either way. Does not clean up on failure; [`run`]
    /// does that.
    ///
    /// [`run`]: Provisioner::run
    pub async fn provision(&self) -> Result<RunningEnvironment> {
        let config = &self.config;

        self.ensure_network().await?;

        pull_with_retry(
            self.runtime.as_ref(),
            &config.image,
            config.timings.pull_attempts,
            config.timings.pull_retry_delay,
        )
        .await?;

        let spec = node_spec(config);
        let container_id = self.runtime.run_container(&spec).await.map_err(|e| {
            ProvisionError::ContainerStart {
                name: spec.name.clone(),
                reason: e.to_string(),
            }
        })?;

        tracing::info!(
            "Started node {} ({}) on network {}",
            config.node_name,
            config.image,
            config.network_name
        );

        if config.detach {
            let ready = wait_until_healthy(
                self.runtime.as_ref(),
                &config.node_name,
                config.timings.poll_interval,
            )
            .await;
            self.dump_logs().await;
            ready?;
        }

        Ok(RunningEnvironment {
            node_name: config.node_name.clone(),
            container_id,
            cluster_name: config.cluster_name.clone(),
            network: config.network_name.clone(),
            volume: config.volume_name.clone(),
            image: config.image.clone(),
            url: config.endpoint_url(),
            detached: config.detach,
        })
    }

    /// Remove the node, its volume and the network. Best effort.
    pub async fn teardown(&self) {
        tracing::info!("Cleaning up");
        self.remove_node(&self.config.node_name, &self.config.volume_name)
            .await;
        self.remove_network(&self.config.network_name).await;
    }

    /// Remove every container on the configured network, then the network.
    ///
    /// A missing network is not an error and nothing else is touched.
    pub async fn cleanup_network(&self) -> Result<CleanupReport> {
        let network = &self.config.network_name;
        let mut report = CleanupReport {
            network: network.clone(),
            ..Default::default()
        };

        if !self.runtime.network_exists(network).await? {
            tracing::info!("{} is already deleted", network);
            return Ok(report);
        }
        report.network_existed = true;

        for container in self.runtime.network_containers(network).await? {
            let volume = if container == self.config.node_name {
                self.config.volume_name.clone()
            } else {
                volume_name(&container)
            };
            self.remove_node(&container, &volume).await;
            report.removed_containers.push(container);
        }

        self.remove_network(network).await;
        tracing::info!("Cleaned up docker network {}", network);
        Ok(report)
    }

    async fn ensure_network(&self) -> Result<()> {
        let name = &self.config.network_name;
        let to_network_error = |e: crate::error::RuntimeError| ProvisionError::Network {
            name: name.clone(),
            reason: e.to_string(),
        };

        if self.runtime.network_exists(name).await.map_err(to_network_error)? {
            tracing::debug!("Network {} already exists", name);
            return Ok(());
        }

        tracing::info!("Creating network {}", name);
        self.runtime
            .create_network(name)
            .await
            .map_err(to_network_error)
    }

    async fn pre_clean(&self) {
        self.remove_node(&self.config.node_name, &self.config.volume_name)
            .await;
    }

    async fn remove_node(&self, name: &str, volume: &str) {
        tracing::debug!("Removing container {}", name);
        if let Err(e) = self.runtime.remove_container(name).await {
            tracing::warn!("Failed to remove container {}: {}", name, e);
        }
        tracing::debug!("Removing volume {}", volume);
        if let Err(e) = self.runtime.remove_volume(volume).await {
            tracing::warn!("Failed to remove volume {}: {}", volume, e);
        }
    }

    async fn remove_network(&self, name: &str) {
        tracing::debug!("Removing network {}", name);
        if let Err(e) = self.runtime.remove_network(name).await {
            tracing::warn!("Failed to remove network {}: {}", name, e);
        }
    }

    async fn dump_logs(&self) {
        match self.runtime.container_logs(&self.config.node_name).await {
            Ok(logs) => self.output.write_text(&logs),
            Err(e) => tracing::warn!("Could not read logs of {}: {}", self.config.node_name, e),
        }
    }

    /// Stream node output until it exits or `shutdown` fires.
    async fn follow<S>(&self, name: &str, mut shutdown: Pin<&mut S>) -> Result<()>
    where
        S: Future<Output = &'static str>,
    {
        let mut logs = self.runtime.stream_logs(name);

        loop {
            tokio::select! {
                chunk = logs.next() => match chunk {
                    Some(Ok(text)) => self.output.write_text(&text),
                    Some(Err(e)) => {
                        tracing::warn!("Lost log stream of {}: {}", name, e);
                        break;
                    }
                    None => break,
                },
                signal = shutdown.as_mut() => {
                    tracing::info!("Received {}, stopping node {}", signal, name);
                    return Ok(());
                }
            }
        }

        match self.runtime.inspect_container(name).await? {
            Some(status) if status.running => {
                let signal = shutdown.as_mut().await;
                tracing::info!("Received {}, stopping node {}", signal, name);
                Ok(())
            }
            Some(status) => match status.exit_code {
                Some(code) if code != 0 => Err(ProvisionError::ContainerExited {
                    name: name.to_string(),
                    code,
                }),
                _ => Ok(()),
            },
            None => Ok(()),
        }
    }
}

/// Resolves with the name of the first termination signal received.
pub async fn shutdown_signal() -> &'static str {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        if let (Ok(mut sigint), Ok(mut sigterm)) = (
            signal(SignalKind::interrupt()),
            signal(SignalKind::terminate()),
        ) {
            return tokio::select! {
                _ = sigint.recv() => "SIGINT",
                _ = sigterm.recv() => "SIGTERM",
            };
        }
    }

    match tokio::signal::ctrl_c().await {
        Ok(()) => "SIGINT",
        Err(e) => {
            tracing::warn!("Cannot listen for Ctrl-C: {}", e);
            std::future::pending().await
        }
    }
}
