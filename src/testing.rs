//! In-memory container runtime for tests.
//!
//! [`RecordingRuntime`] keeps networks, containers and volumes in memory,
//! records every call it receives and can be scripted to fail pulls, walk
//! through health states or refuse removals. Clones share state, so a test
//! can hand one clone to the provisioner and inspect another afterwards.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use es_testenv::testing::{HealthStep, RecordingRuntime};
//!
//! let runtime = RecordingRuntime::new()
//!     .with_pull_failures(2)
//!     .with_health_script(vec![HealthStep::starting("waiting"), HealthStep::healthy()]);
//! let shared = Arc::new(runtime.clone());
//! // hand `shared` to a Provisioner, then assert on `runtime.calls()`
//! ```

use std::collections::VecDeque;
use std::io::Write;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use futures::StreamExt;

use crate::error::RuntimeError;
use crate::runtime::{ContainerRuntime, ContainerSpec, ContainerStatus, HealthState, LogStream};

/// One health observation returned by `inspect_container`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthStep {
    pub running: bool,
    pub health: HealthState,
    pub output: Option<String>,
    pub exit_code: Option<i64>,
}

impl HealthStep {
    pub fn starting(output: &str) -> Self {
        Self {
            running: true,
            health: HealthState::Starting,
            output: (!output.is_empty()).then(|| output.to_string()),
            exit_code: None,
        }
    }

    pub fn healthy() -> Self {
        Self {
            running: true,
            health: HealthState::Healthy,
            output: None,
            exit_code: None,
        }
    }

    pub fn unhealthy() -> Self {
        Self {
            running: true,
            health: HealthState::Unhealthy,
            output: None,
            exit_code: None,
        }
    }

    pub fn stopped(exit_code: i64) -> Self {
        Self {
            running: false,
            health: HealthState::Unhealthy,
            output: None,
            exit_code: Some(exit_code),
        }
    }
}

/// What `stream_logs` does once the scripted lines are used up.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
enum StreamEnd {
    /// The stream ends and the container reports its exit code.
    #[default]
    Exit,
    /// The stream ends but the container keeps running.
    Detach,
    /// The stream never ends.
    Never,
}

#[derive(Debug, Clone)]
struct FakeContainer {
    name: String,
    id: String,
    network: String,
    /// Set once the container's output has been followed to the end.
    exited: Option<i64>,
}

#[derive(Debug, Default)]
struct State {
    calls: Vec<String>,
    networks: Vec<String>,
    containers: Vec<FakeContainer>,
    volumes: Vec<String>,
    pulled: Vec<String>,
    pull_failures: u32,
    health_script: VecDeque<HealthStep>,
    logs: String,
    log_lines: Vec<String>,
    stream_end: StreamEnd,
    exit_code: i64,
    failing_removals: bool,
    unavailable: bool,
    next_id: u32,
}

/// Container runtime double that records what it was asked to do.
#[derive(Debug, Clone, Default)]
pub struct RecordingRuntime {
    state: Arc<Mutex<State>>,
}

impl RecordingRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `n` pulls.
    pub fn with_pull_failures(self, n: u32) -> Self {
        self.state().pull_failures = n;
        self
    }

    /// Health observations handed out in order. The last one repeats.
    pub fn with_health_script(self, steps: Vec<HealthStep>) -> Self {
        self.state().health_script = steps.into();
        self
    }

    pub fn with_network(self, name: &str) -> Self {
        self.insert_network(name);
        self
    }

    /// Text returned by `container_logs`.
    pub fn with_logs(self, logs: &str) -> Self {
        self.state().logs = logs.to_string();
        self
    }

    /// Chunks yielded by `stream_logs`.
    pub fn with_log_lines(self, lines: &[&str]) -> Self {
        self.state().log_lines = lines.iter().map(|l| l.to_string()).collect();
        self
    }

    /// Exit code a container reports once its log stream has ended.
    pub fn with_exit_code(self, code: i64) -> Self {
        self.state().exit_code = code;
        self
    }

    /// Keep the container running after its log stream ends.
    pub fn with_stream_ending_early(self) -> Self {
        self.state().stream_end = StreamEnd::Detach;
        self
    }

    /// Never end the log stream; the node runs until stopped.
    pub fn with_endless_stream(self) -> Self {
        self.state().stream_end = StreamEnd::Never;
        self
    }

    /// Make every `remove_*` call fail.
    pub fn with_failing_removals(self) -> Self {
        self.state().failing_removals = true;
        self
    }

    /// Make `ping` fail as if no daemon were running.
    pub fn unavailable(self) -> Self {
        self.state().unavailable = true;
        self
    }

    pub fn insert_network(&self, name: &str) {
        let mut state = self.state();
        if !state.networks.iter().any(|n| n == name) {
            state.networks.push(name.to_string());
        }
    }

    /// Register a running container attached to `network` with its volume.
    pub fn insert_container(&self, name: &str, network: &str, volume: &str) {
        self.insert_network(network);
        let mut state = self.state();
        state.next_id += 1;
        let id = format!("fake-{}", state.next_id);
        state.containers.retain(|c| c.name != name);
        state.containers.push(FakeContainer {
            name: name.to_string(),
            id,
            network: network.to_string(),
            exited: None,
        });
        if !state.volumes.iter().any(|v| v == volume) {
            state.volumes.push(volume.to_string());
        }
    }

    /// Every call received, as `"<method> <argument>"`.
    pub fn calls(&self) -> Vec<String> {
        self.state().calls.clone()
    }

    /// Number of calls to `method`.
    pub fn calls_named(&self, method: &str) -> usize {
        self.state()
            .calls
            .iter()
            .filter(|c| c.split(' ').next() == Some(method))
            .count()
    }

    /// Images pulled successfully.
    pub fn pulled_images(&self) -> Vec<String> {
        self.state().pulled.clone()
    }

    pub fn networks(&self) -> Vec<String> {
        self.state().networks.clone()
    }

    pub fn containers(&self) -> Vec<String> {
        self.state().containers.iter().map(|c| c.name.clone()).collect()
    }

    pub fn volumes(&self) -> Vec<String> {
        self.state().volumes.clone()
    }

    pub fn has_network(&self, name: &str) -> bool {
        self.state().networks.iter().any(|n| n == name)
    }

    pub fn has_container(&self, name: &str) -> bool {
        self.state().containers.iter().any(|c| c.name == name)
    }

    pub fn has_volume(&self, name: &str) -> bool {
        self.state().volumes.iter().any(|v| v == name)
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, call: String) -> MutexGuard<'_, State> {
        let mut state = self.state();
        state.calls.push(call);
        state
    }
}

/// In-memory writer whose clones share one buffer.
#[derive(Debug, Clone, Default)]
pub struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything written so far, lossily decoded.
    pub fn contents(&self) -> String {
        let bytes = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

fn removal_failed(operation: &'static str) -> RuntimeError {
    RuntimeError::Api {
        operation,
        reason: "scripted failure".to_string(),
    }
}

#[async_trait]
impl ContainerRuntime for RecordingRuntime {
    async fn ping(&self) -> Result<(), RuntimeError> {
        let state = self.record("ping".to_string());
        if state.unavailable {
            return Err(RuntimeError::Unavailable {
                reason: "no daemon".to_string(),
            });
        }
        Ok(())
    }

    async fn network_exists(&self, name: &str) -> Result<bool, RuntimeError> {
        let state = self.record(format!("network_exists {}", name));
        Ok(state.networks.iter().any(|n| n == name))
    }

    async fn create_network(&self, name: &str) -> Result<(), RuntimeError> {
        let mut state = self.record(format!("create_network {}", name));
        if state.networks.iter().any(|n| n == name) {
            return Err(RuntimeError::Api {
                operation: "create network",
                reason: format!("network with name {} already exists", name),
            });
        }
        state.networks.push(name.to_string());
        Ok(())
    }

    async fn network_containers(&self, name: &str) -> Result<Vec<String>, RuntimeError> {
        let state = self.record(format!("network_containers {}", name));
        if !state.networks.iter().any(|n| n == name) {
            return Err(RuntimeError::NotFound {
                kind: "network",
                name: name.to_string(),
            });
        }
        Ok(state
            .containers
            .iter()
            .filter(|c| c.network == name)
            .map(|c| c.name.clone())
            .collect())
    }

    async fn remove_network(&self, name: &str) -> Result<(), RuntimeError> {
        let mut state = self.record(format!("remove_network {}", name));
        if state.failing_removals {
            return Err(removal_failed("remove network"));
        }
        if state.containers.iter().any(|c| c.network == name) {
            return Err(RuntimeError::Api {
                operation: "remove network",
                reason: format!("network {} has active endpoints", name),
            });
        }
        state.networks.retain(|n| n != name);
        Ok(())
    }

    async fn remove_volume(&self, name: &str) -> Result<(), RuntimeError> {
        let mut state = self.record(format!("remove_volume {}", name));
        if state.failing_removals {
            return Err(removal_failed("remove volume"));
        }
        state.volumes.retain(|v| v != name);
        Ok(())
    }

    async fn pull_image(&self, image: &str) -> Result<(), RuntimeError> {
        let mut state = self.record(format!("pull_image {}", image));
        if state.pull_failures > 0 {
            state.pull_failures -= 1;
            return Err(RuntimeError::Api {
                operation: "pull image",
                reason: "connection reset by peer".to_string(),
            });
        }
        state.pulled.push(image.to_string());
        Ok(())
    }

    async fn run_container(&self, spec: &ContainerSpec) -> Result<String, RuntimeError> {
        {
            let state = self.record(format!("run_container {}", spec.name));
            if !state.networks.iter().any(|n| *n == spec.network) {
                return Err(RuntimeError::NotFound {
                    kind: "network",
                    name: spec.network.clone(),
                });
            }
            if state.containers.iter().any(|c| c.name == spec.name) {
                return Err(RuntimeError::Api {
                    operation: "create container",
                    reason: format!("name {} is already in use", spec.name),
                });
            }
        }

        self.insert_container(&spec.name, &spec.network, &spec.volume.0);
        let state = self.state();
        Ok(state
            .containers
            .iter()
            .find(|c| c.name == spec.name)
            .map(|c| c.id.clone())
            .unwrap_or_default())
    }

    async fn inspect_container(&self, name: &str) -> Result<Option<ContainerStatus>, RuntimeError> {
        let mut state = self.record(format!("inspect_container {}", name));
        let Some(container) = state.containers.iter().find(|c| c.name == name).cloned() else {
            return Ok(None);
        };

        if let Some(code) = container.exited {
            return Ok(Some(ContainerStatus {
                id: container.id,
                running: false,
                health: HealthState::None,
                last_health_output: None,
                exit_code: Some(code),
            }));
        }

        let step = if state.health_script.len() > 1 {
            state.health_script.pop_front()
        } else {
            state.health_script.front().cloned()
        }
        .unwrap_or_else(HealthStep::healthy);

        Ok(Some(ContainerStatus {
            id: container.id,
            running: step.running,
            health: step.health,
            last_health_output: step.output,
            exit_code: step.exit_code,
        }))
    }

    async fn container_logs(&self, name: &str) -> Result<String, RuntimeError> {
        let state = self.record(format!("container_logs {}", name));
        if !state.containers.iter().any(|c| c.name == name) {
            return Err(RuntimeError::NotFound {
                kind: "container",
                name: name.to_string(),
            });
        }
        Ok(state.logs.clone())
    }

    fn stream_logs(&self, name: &str) -> LogStream {
        let mut state = self.record(format!("stream_logs {}", name));
        let exit_code = state.exit_code;
        let stream_end = state.stream_end;
        let lines = futures::stream::iter(
            state
                .log_lines
                .clone()
                .into_iter()
                .map(Ok::<String, RuntimeError>),
        );
        match stream_end {
            StreamEnd::Exit => {
                if let Some(container) = state.containers.iter_mut().find(|c| c.name == name) {
                    container.exited = Some(exit_code);
                }
                Box::pin(lines)
            }
            StreamEnd::Detach => Box::pin(lines),
            StreamEnd::Never => Box::pin(lines.chain(futures::stream::pending())),
        }
    }

    async fn remove_container(&self, name: &str) -> Result<(), RuntimeError> {
        let mut state = self.record(format!("remove_container {}", name));
        if state.failing_removals {
            return Err(removal_failed("remove container"));
        }
        state.containers.retain(|c| c.name != name);
        Ok(())
    }
}
