//! Readiness wait for a detached node.

use std::time::Duration;

use crate::error::{ProvisionError, Result};
use crate::runtime::{ContainerRuntime, ContainerStatus, HealthState};

/// Poll the container every `interval` until its health leaves `starting`.
///
/// There is no deadline here: the runtime flips the container to
/// `unhealthy` once the probe has failed `retries` times in a row, which
/// bounds the loop.
pub async fn wait_until_healthy(
    runtime: &dyn ContainerRuntime,
    name: &str,
    interval: Duration,
) -> Result<ContainerStatus> {
    loop {
        let Some(status) = runtime.inspect_container(name).await? else {
            return Err(ProvisionError::Readiness {
                name: name.to_string(),
                reason: "container no longer exists".to_string(),
            });
        };

        if !status.running {
            let reason = match status.exit_code {
                Some(code) => format!("container stopped with exit code {}", code),
                None => "container stopped".to_string(),
            };
            return Err(ProvisionError::Readiness {
                name: name.to_string(),
                reason,
            });
        }

        match status.health {
            HealthState::Healthy => return Ok(status),
            HealthState::Starting => {
                if let Some(ref output) = status.last_health_output {
                    tracing::info!("{}", output);
                }
                tracing::info!("Waiting for node {} to be up", name);
                tokio::time::sleep(interval).await;
            }
            other => {
                return Err(ProvisionError::Readiness {
                    name: name.to_string(),
                    reason: format!("health is {}", other),
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{HealthStep, RecordingRuntime};

    #[tokio::test]
    async fn test_healthy_after_starting() {
        let runtime = RecordingRuntime::new().with_health_script(vec![
            HealthStep::starting("waiting for [instance]"),
            HealthStep::starting("waiting for [instance]"),
            HealthStep::healthy(),
        ]);
        runtime.insert_container("instance", "net", "instance-rest-data");

        let status = wait_until_healthy(&runtime, "instance", Duration::ZERO).await.unwrap();
        assert_eq!(status.health, HealthState::Healthy);
        assert_eq!(runtime.calls_named("inspect_container"), 3);
    }

    #[tokio::test]
    async fn test_unhealthy_fails() {
        let runtime = RecordingRuntime::new()
            .with_health_script(vec![HealthStep::starting(""), HealthStep::unhealthy()]);
        runtime.insert_container("instance", "net", "instance-rest-data");

        let err = wait_until_healthy(&runtime, "instance", Duration::ZERO)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ProvisionError::Readiness { ref reason, .. } if reason == "health is unhealthy"
        ));
    }

    #[tokio::test]
    async fn test_stopped_container_fails() {
        let runtime = RecordingRuntime::new()
            .with_health_script(vec![HealthStep::starting(""), HealthStep::stopped(78)]);
        runtime.insert_container("instance", "net", "instance-rest-data");

        let err = wait_until_healthy(&runtime, "instance", Duration::ZERO).await.unwrap_err();
        assert!(err.to_string().contains("exit code 78"));
    }

    #[tokio::test]
    async fn test_missing_container_fails() {
        let runtime = RecordingRuntime::new();
        let err = wait_until_healthy(&runtime, "instance", Duration::ZERO).await.unwrap_err();
        assert!(err.to_string().contains("no longer exists"));
    }
}
