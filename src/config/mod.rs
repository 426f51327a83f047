//! Provisioning configuration.
//!
//! The environment is read exactly once, at entry, into an immutable
//! [`ProvisionConfig`]. Nothing downstream looks at environment variables.
//!
//! Priority: CLI override > environment variable > derived default.

pub(crate) mod helpers;

use std::time::Duration;

use secrecy::SecretString;

pub use helpers::{Lookup, load_env_file, process_env, snapshot_env};
use helpers::{optional_env, parse_bool_env, parse_optional_env};

use crate::error::ConfigError;
use crate::naming::{RunIdentity, volume_name};

/// Variable holding the image reference. Required.
pub const IMAGE_VAR: &str = "ELASTICSEARCH_VERSION";

/// Every variable [`ProvisionConfig::resolve`] reads.
pub const ENV_VARS: &[&str] = &[
    IMAGE_VAR,
    "NODE_NAME",
    "MASTER_NODE_NAME",
    "CLUSTER_NAME",
    "HTTP_PORT",
    "ELASTIC_PASSWORD",
    "DETACH",
    "CLEANUP",
    "VOLUME_NAME",
    "NETWORK_NAME",
    "ES_JAVA_OPTS",
    "HEALTH_PROBE_INSECURE",
];

/// Registry prefix for bare `name:tag` references.
pub const DEFAULT_REGISTRY: &str = "docker.elastic.co/elasticsearch/";

pub const DEFAULT_NODE_NAME: &str = "instance";
pub const DEFAULT_HTTP_PORT: u16 = 9200;
pub const DEFAULT_PASSWORD: &str = "changeme";
pub const DEFAULT_JAVA_OPTS: &str = "-Xms1g -Xmx1g";

/// Fixed timing parameters of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timings {
    /// Image pull attempts before giving up.
    pub pull_attempts: u32,
    /// Delay between pull attempts.
    pub pull_retry_delay: Duration,
    /// Interval between container state polls while waiting for health.
    pub poll_interval: Duration,
    /// Interval of the in-container health probe.
    pub probe_interval: Duration,
    /// Timeout of a single health probe.
    pub probe_timeout: Duration,
    /// Consecutive probe failures before the runtime reports unhealthy.
    pub probe_retries: u32,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            pull_attempts: 5,
            pull_retry_delay: Duration::from_secs(10),
            poll_interval: Duration::from_secs(2),
            probe_interval: Duration::from_secs(2),
            probe_timeout: Duration::from_secs(2),
            probe_retries: 20,
        }
    }
}

/// Values given on the command line. `None` defers to the environment.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub image: Option<String>,
    pub node_name: Option<String>,
    pub cluster_name: Option<String>,
    pub http_port: Option<u16>,
    pub network_name: Option<String>,
    pub volume_name: Option<String>,
    pub detach: Option<bool>,
    pub cleanup_only: Option<bool>,
}

/// Fully resolved configuration for one run.
#[derive(Debug, Clone)]
pub struct ProvisionConfig {
    /// Image reference as given, used for the run identity.
    pub image_ref: String,
    /// Pullable image, registry-qualified.
    pub image: String,
    pub identity: RunIdentity,
    pub node_name: String,
    pub master_node_name: String,
    pub cluster_name: String,
    pub http_port: u16,
    /// Password of the `elastic` user.
    pub password: SecretString,
    /// Return once healthy, leaving the node running.
    pub detach: bool,
    /// Only remove what is attached to the network.
    pub cleanup_only: bool,
    pub volume_name: String,
    pub network_name: String,
    /// JVM options passed as `ES_JAVA_OPTS`.
    pub java_opts: String,
    /// Pass `--insecure` to curl in the in-container health probe.
    ///
    /// Only matters if the probe is pointed at TLS; security is disabled on
    /// the node.
    pub insecure_health_probe: bool,
    pub timings: Timings,
}

impl ProvisionConfig {
    /// Resolve from the process environment.
    pub fn resolve(overrides: &ConfigOverrides) -> Result<Self, ConfigError> {
        let vars = snapshot_env(ENV_VARS)?;
        Self::resolve_with(overrides, &|key: &str| vars.get(key).cloned())
    }

    /// Resolve from an arbitrary variable source.
    pub fn resolve_with(
        overrides: &ConfigOverrides,
        lookup: Lookup<'_>,
    ) -> Result<Self, ConfigError> {
        let image_ref = overrides
            .image
            .clone()
            .filter(|s| !s.trim().is_empty())
            .or_else(|| optional_env(lookup, IMAGE_VAR))
            .map(|s| s.trim().to_string())
            .ok_or_else(|| ConfigError::Missing {
                key: IMAGE_VAR.to_string(),
                hint: "set it to an image reference such as 'elasticsearch:8.13.0'".to_string(),
            })?;

        let identity = RunIdentity::from_image(&image_ref);

        let node_name = overrides
            .node_name
            .clone()
            .or_else(|| optional_env(lookup, "NODE_NAME"))
            .unwrap_or_else(|| DEFAULT_NODE_NAME.to_string());
        let master_node_name =
            optional_env(lookup, "MASTER_NODE_NAME").unwrap_or_else(|| node_name.clone());
        let cluster_name = overrides
            .cluster_name
            .clone()
            .or_else(|| optional_env(lookup, "CLUSTER_NAME"))
            .unwrap_or_else(|| identity.cluster_name());

        let http_port = match overrides.http_port {
            Some(port) => port,
            None => parse_optional_env(lookup, "HTTP_PORT", DEFAULT_HTTP_PORT)?,
        };
        if http_port == 0 {
            return Err(ConfigError::InvalidValue {
                key: "HTTP_PORT".to_string(),
                message: "must be a non-zero port".to_string(),
            });
        }

        let password = SecretString::from(
            optional_env(lookup, "ELASTIC_PASSWORD")
                .unwrap_or_else(|| DEFAULT_PASSWORD.to_string()),
        );

        let detach = match overrides.detach {
            Some(detach) => detach,
            None => parse_bool_env(lookup, "DETACH", false)?,
        };
        let cleanup_only = match overrides.cleanup_only {
            Some(cleanup) => cleanup,
            None => parse_bool_env(lookup, "CLEANUP", false)?,
        };

        let volume_name = overrides
            .volume_name
            .clone()
            .or_else(|| optional_env(lookup, "VOLUME_NAME"))
            .unwrap_or_else(|| volume_name(&node_name));
        let network_name = overrides
            .network_name
            .clone()
            .or_else(|| optional_env(lookup, "NETWORK_NAME"))
            .unwrap_or_else(|| identity.network_name());

        let java_opts =
            optional_env(lookup, "ES_JAVA_OPTS").unwrap_or_else(|| DEFAULT_JAVA_OPTS.to_string());
        let insecure_health_probe = parse_bool_env(lookup, "HEALTH_PROBE_INSECURE", true)?;

        Ok(Self {
            image: qualify_image(&image_ref),
            image_ref,
            identity,
            node_name,
            master_node_name,
            cluster_name,
            http_port,
            password,
            detach,
            cleanup_only,
            volume_name,
            network_name,
            java_opts,
            insecure_health_probe,
            timings: Timings::default(),
        })
    }

    /// URL of the node as seen from the host.
    pub fn endpoint_url(&self) -> String {
        format!("http://localhost:{}", self.http_port)
    }
}

/// Prefix bare references with the Elastic registry.
///
/// Anything already containing a `/` is treated as fully qualified.
pub fn qualify_image(image_ref: &str) -> String {
    if image_ref.contains('/') {
        image_ref.to_string()
    } else {
        format!("{}{}", DEFAULT_REGISTRY, image_ref)
    }
}
