//! Docker implementation of [`ContainerRuntime`] using bollard.

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use bollard::Docker;
use bollard::container::{
    Config, CreateContainerOptions, InspectContainerOptions, LogsOptions, RemoveContainerOptions,
    StartContainerOptions,
};
use bollard::errors::Error as BollardError;
use bollard::image::CreateImageOptions;
use bollard::models::{HealthConfig, HealthStatusEnum, HostConfig, PortBinding, ResourcesUlimits};
use bollard::network::{CreateNetworkOptions, InspectNetworkOptions};
use bollard::volume::RemoveVolumeOptions;
use futures::StreamExt;

use crate::error::RuntimeError;
use crate::runtime::{ContainerRuntime, ContainerSpec, ContainerStatus, HealthState, LogStream};

/// Seconds before a Docker API request times out.
const DOCKER_TIMEOUT_SECS: u64 = 120;

/// Connect to the Docker daemon.
///
/// Tries bollard's local defaults (which honour `DOCKER_HOST`) first, then
/// the per-user sockets used by rootless Docker and Docker Desktop.
pub async fn connect_docker() -> Result<Docker, RuntimeError> {
    let last_error = match Docker::connect_with_local_defaults() {
        Ok(docker) => match docker.ping().await {
            Ok(_) => return Ok(docker),
            Err(e) => e.to_string(),
        },
        Err(e) => e.to_string(),
    };

    for socket in fallback_sockets() {
        if !socket.exists() {
            continue;
        }
        let Some(path) = socket.to_str() else {
            continue;
        };
        if let Ok(docker) =
            Docker::connect_with_socket(path, DOCKER_TIMEOUT_SECS, bollard::API_DEFAULT_VERSION)
            && docker.ping().await.is_ok()
        {
            tracing::debug!("Connected to Docker via {}", path);
            return Ok(docker);
        }
    }

    Err(RuntimeError::Unavailable { reason: last_error })
}

fn fallback_sockets() -> Vec<PathBuf> {
    let mut sockets = Vec::new();
    if let Some(runtime_dir) = std::env::var_os("XDG_RUNTIME_DIR") {
        sockets.push(PathBuf::from(runtime_dir).join("docker.sock"));
    }
    if let Some(home) = dirs::home_dir() {
        sockets.push(home.join(".docker/run/docker.sock"));
        sockets.push(home.join(".docker/desktop/docker.sock"));
    }
    sockets
}

/// Map a bollard error, turning 404 into [`RuntimeError::NotFound`].
fn map_error(
    operation: &'static str,
    kind: &'static str,
    name: &str,
    e: BollardError,
) -> RuntimeError {
    match e {
        BollardError::DockerResponseServerError {
            status_code: 404, ..
        } => RuntimeError::NotFound {
            kind,
            name: name.to_string(),
        },
        other => RuntimeError::Api {
            operation,
            reason: other.to_string(),
        },
    }
}

/// Treat "already gone" as success.
fn ignore_not_found(result: Result<(), RuntimeError>) -> Result<(), RuntimeError> {
    match result {
        Err(e) if e.is_not_found() => Ok(()),
        other => other,
    }
}

/// Container runtime backed by the Docker Engine API.
#[derive(Clone)]
pub struct DockerRuntime {
    docker: Docker,
}

impl DockerRuntime {
    pub fn new(docker: Docker) -> Self {
        Self { docker }
    }

    /// Connect to the local daemon.
    pub async fn connect() -> Result<Self, RuntimeError> {
        Ok(Self::new(connect_docker().await?))
    }

    fn container_config(spec: &ContainerSpec) -> Config<String> {
        let container_port = format!("{}/tcp", spec.port.1);

        let mut port_bindings = HashMap::new();
        port_bindings.insert(
            container_port.clone(),
            Some(vec![PortBinding {
                host_ip: None,
                host_port: Some(spec.port.0.to_string()),
            }]),
        );

        let mut exposed_ports = HashMap::new();
        exposed_ports.insert(container_port, HashMap::new());

        let env: Vec<String> = spec
            .env
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect();

        let ulimits: Vec<ResourcesUlimits> = spec
            .ulimits
            .iter()
            .map(|u| ResourcesUlimits {
                name: Some(u.name.clone()),
                soft: Some(u.soft),
                hard: Some(u.hard),
            })
            .collect();

        let host_config = HostConfig {
            port_bindings: Some(port_bindings),
            binds: Some(vec![format!("{}:{}", spec.volume.0, spec.volume.1)]),
            network_mode: Some(spec.network.clone()),
            ulimits: if ulimits.is_empty() { None } else { Some(ulimits) },
            // Removal is explicit so logs survive a crashed node.
            auto_remove: Some(false),
            ..Default::default()
        };

        let healthcheck = spec.health.as_ref().map(|probe| HealthConfig {
            test: Some(vec!["CMD-SHELL".to_string(), probe.command.clone()]),
            interval: Some(probe.interval.as_nanos() as i64),
            timeout: Some(probe.timeout.as_nanos() as i64),
            retries: Some(i64::from(probe.retries)),
            ..Default::default()
        });

        Config {
            image: Some(spec.image.clone()),
            hostname: Some(spec.name.clone()),
            env: Some(env),
            exposed_ports: Some(exposed_ports),
            host_config: Some(host_config),
            healthcheck,
            ..Default::default()
        }
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn ping(&self) -> Result<(), RuntimeError> {
        self.docker
            .ping()
            .await
            .map(|_| ())
            .map_err(|e| RuntimeError::Unavailable {
                reason: e.to_string(),
            })
    }

    async fn network_exists(&self, name: &str) -> Result<bool, RuntimeError> {
        match self
            .docker
            .inspect_network(name, None::<InspectNetworkOptions<String>>)
            .await
        {
            Ok(_) => Ok(true),
            Err(e) => match map_error("inspect network", "network", name, e) {
                RuntimeError::NotFound { .. } => Ok(false),
                other => Err(other),
            },
        }
    }

    async fn create_network(&self, name: &str) -> Result<(), RuntimeError> {
        let options = CreateNetworkOptions {
            name: name.to_string(),
            check_duplicate: true,
            driver: "bridge".to_string(),
            ..Default::default()
        };
        self.docker
            .create_network(options)
            .await
            .map(|_| ())
            .map_err(|e| map_error("create network", "network", name, e))
    }

    async fn network_containers(&self, name: &str) -> Result<Vec<String>, RuntimeError> {
        let network = self
            .docker
            .inspect_network(name, None::<InspectNetworkOptions<String>>)
            .await
            .map_err(|e| map_error("inspect network", "network", name, e))?;

        let mut names: Vec<String> = network
            .containers
            .unwrap_or_default()
            .into_values()
            .filter_map(|c| c.name)
            .collect();
        names.sort();
        Ok(names)
    }

    async fn remove_network(&self, name: &str) -> Result<(), RuntimeError> {
        ignore_not_found(
            self.docker
                .remove_network(name)
                .await
                .map_err(|e| map_error("remove network", "network", name, e)),
        )
    }

    async fn remove_volume(&self, name: &str) -> Result<(), RuntimeError> {
        ignore_not_found(
            self.docker
                .remove_volume(name, Some(RemoveVolumeOptions { force: true }))
                .await
                .map_err(|e| map_error("remove volume", "volume", name, e)),
        )
    }

    async fn pull_image(&self, image: &str) -> Result<(), RuntimeError> {
        let options = CreateImageOptions {
            from_image: image.to_string(),
            ..Default::default()
        };

        let mut stream = self.docker.create_image(Some(options), None, None);
        while let Some(result) = stream.next().await {
            match result {
                Ok(info) => {
                    if let Some(status) = info.status {
                        tracing::trace!("Pull status: {}", status);
                    }
                }
                Err(e) => return Err(map_error("pull image", "image", image, e)),
            }
        }
        Ok(())
    }

    async fn run_container(&self, spec: &ContainerSpec) -> Result<String, RuntimeError> {
        let options = CreateContainerOptions {
            name: spec.name.clone(),
            ..Default::default()
        };

        let response = self
            .docker
            .create_container(Some(options), Self::container_config(spec))
            .await
            .map_err(|e| map_error("create container", "image", &spec.image, e))?;

        self.docker
            .start_container(&response.id, None::<StartContainerOptions<String>>)
            .await
            .map_err(|e| map_error("start container", "container", &spec.name, e))?;

        Ok(response.id)
    }

    async fn inspect_container(&self, name: &str) -> Result<Option<ContainerStatus>, RuntimeError> {
        let info = match self
            .docker
            .inspect_container(name, None::<InspectContainerOptions>)
            .await
        {
            Ok(info) => info,
            Err(e) => {
                return match map_error("inspect container", "container", name, e) {
                    RuntimeError::NotFound { .. } => Ok(None),
                    other => Err(other),
                };
            }
        };

        let state = info.state.unwrap_or_default();
        let (health, last_health_output) = match state.health {
            Some(health) => {
                let status = match health.status {
                    Some(HealthStatusEnum::STARTING) => HealthState::Starting,
                    Some(HealthStatusEnum::HEALTHY) => HealthState::Healthy,
                    Some(HealthStatusEnum::UNHEALTHY) => HealthState::Unhealthy,
                    _ => HealthState::None,
                };
                let output = health
                    .log
                    .and_then(|log| log.into_iter().last())
                    .and_then(|entry| entry.output)
                    .map(|o| o.trim().to_string())
                    .filter(|o| !o.is_empty());
                (status, output)
            }
            None => (HealthState::None, None),
        };

        Ok(Some(ContainerStatus {
            id: info.id.unwrap_or_default(),
            running: state.running.unwrap_or(false),
            health,
            last_health_output,
            exit_code: state.exit_code,
        }))
    }

    async fn container_logs(&self, name: &str) -> Result<String, RuntimeError> {
        let options = LogsOptions::<String> {
            stdout: true,
            stderr: true,
            tail: "all".to_string(),
            ..Default::default()
        };

        let mut stream = self.docker.logs(name, Some(options));
        let mut output = String::new();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| map_error("read logs", "container", name, e))?;
            output.push_str(&chunk.to_string());
        }
        Ok(output)
    }

    fn stream_logs(&self, name: &str) -> LogStream {
        let options = LogsOptions::<String> {
            follow: true,
            stdout: true,
            stderr: true,
            tail: "all".to_string(),
            ..Default::default()
        };
        let owned = name.to_string();

        Box::pin(self.docker.logs(name, Some(options)).map(move |chunk| {
            chunk
                .map(|c| c.to_string())
                .map_err(|e| map_error("follow logs", "container", &owned, e))
        }))
    }

    async fn remove_container(&self, name: &str) -> Result<(), RuntimeError> {
        ignore_not_found(
            self.docker
                .remove_container(
                    name,
                    Some(RemoveContainerOptions {
                        force: true,
                        v: true,
                        ..Default::default()
                    }),
                )
                .await
                .map_err(|e| map_error("remove container", "container", name, e)),
        )
    }
}
