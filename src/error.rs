//! Error types shared across the crate.
//!
//! Each layer has its own enum: configuration problems never touch the
//! container runtime, runtime failures are wrapped by the provisioner, and
//! the binary flattens everything into `anyhow` at the top level.

use thiserror::Error;

/// Configuration could not be resolved.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required variable is not set.
    #[error("Required environment variable [{key}] not set: {hint}")]
    Missing {
        /// Variable name.
        key: String,
        /// What the variable should contain.
        hint: String,
    },

    /// A variable is set to something unusable.
    #[error("Invalid value for {key}: {message}")]
    InvalidValue {
        /// Variable name.
        key: String,
        /// Why the value was rejected.
        message: String,
    },

    /// The `.env` file could not be read.
    #[error("Failed to load env file: {0}")]
    EnvFile(String),
}

/// Errors reported by a [`ContainerRuntime`](crate::runtime::ContainerRuntime).
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// The named resource does not exist.
    #[error("{kind} '{name}' not found")]
    NotFound {
        /// Resource kind (container, network, volume, image).
        kind: &'static str,
        /// Resource name.
        name: String,
    },

    /// The runtime rejected or failed an operation.
    #[error("{operation} failed: {reason}")]
    Api {
        /// Operation that failed, e.g. "create network".
        operation: &'static str,
        /// Reason reported by the runtime.
        reason: String,
    },

    /// The runtime daemon could not be reached.
    #[error("Docker not available: {reason}")]
    Unavailable {
        /// Reason why the daemon is unreachable.
        reason: String,
    },
}

impl RuntimeError {
    /// Returns true if this error means the resource is already gone.
    pub fn is_not_found(&self) -> bool {
        matches!(self, RuntimeError::NotFound { .. })
    }
}

/// Errors that end a provisioning run.
#[derive(Debug, Error)]
pub enum ProvisionError {
    /// Configuration error, raised before any resource is touched.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Docker is not available.
    #[error("Docker not available: {reason}")]
    DockerNotAvailable {
        /// Reason why Docker is unavailable.
        reason: String,
    },

    /// The isolated network could not be ensured.
    #[error("Failed to ensure network '{name}': {reason}")]
    Network {
        /// Network name.
        name: String,
        /// Reason for failure.
        reason: String,
    },

    /// Every pull attempt failed.
    #[error("Failed to pull image '{image}' after {attempts} attempts: {reason}")]
    Pull {
        /// Image reference.
        image: String,
        /// Attempts made.
        attempts: u32,
        /// Reason reported by the last attempt.
        reason: String,
    },

    /// The node container could not be created or started.
    #[error("Failed to start container '{name}': {reason}")]
    ContainerStart {
        /// Container name.
        name: String,
        /// Reason for failure.
        reason: String,
    },

    /// The node never became healthy.
    #[error("Container '{name}' failed to become healthy: {reason}")]
    Readiness {
        /// Container name.
        name: String,
        /// Last observed state.
        reason: String,
    },

    /// An attached container exited with a non-zero code.
    #[error("Container '{name}' exited with code {code}")]
    ContainerExited {
        /// Container name.
        name: String,
        /// Exit code.
        code: i64,
    },

    /// A termination signal arrived while provisioning.
    #[error("Interrupted by {signal} while provisioning")]
    Interrupted {
        /// Signal name.
        signal: &'static str,
    },

    /// Any other runtime failure.
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

/// Errors from the HTTP health check against a running node.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("Health request failed: {0}")]
    Http(String),

    #[error("Health endpoint returned {status}")]
    Status { status: u16 },

    #[error("Unexpected health response: {0}")]
    Decode(String),
}

/// Result type for provisioning operations.
pub type Result<T> = std::result::Result<T, ProvisionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_config_message_names_variable() {
        let err = ConfigError::Missing {
            key: "ELASTICSEARCH_VERSION".to_string(),
            hint: "image reference".to_string(),
        };
        assert!(err.to_string().contains("[ELASTICSEARCH_VERSION]"));
    }

    #[test]
    fn test_not_found_detection() {
        let err = RuntimeError::NotFound {
            kind: "volume",
            name: "instance-rest-data".to_string(),
        };
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "volume 'instance-rest-data' not found");

        let err = RuntimeError::Api {
            operation: "remove volume",
            reason: "in use".to_string(),
        };
        assert!(!err.is_not_found());
    }

    #[test]
    fn test_config_error_is_transparent() {
        let err: ProvisionError = ConfigError::InvalidValue {
            key: "HTTP_PORT".to_string(),
            message: "must be a port number".to_string(),
        }
        .into();
        assert_eq!(err.to_string(), "Invalid value for HTTP_PORT: must be a port number");
    }
}
