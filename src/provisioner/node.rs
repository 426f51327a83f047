//! The single Elasticsearch node a run starts.

use crate::config::ProvisionConfig;
use crate::runtime::{ContainerSpec, HealthProbe, Ulimit};

/// Port Elasticsearch listens on inside the container.
pub const CONTAINER_HTTP_PORT: u16 = 9200;

/// Mount point of the data volume.
pub const DATA_PATH: &str = "/usr/share/elasticsearch/data";

/// Build the container spec for the node described by `config`.
///
/// Security and TLS are off, the node discovers only itself, disk
/// watermarks are ignored and a trial license is generated, which is what
/// an integration suite expects from a throwaway cluster.
pub fn node_spec(config: &ProvisionConfig) -> ContainerSpec {
    use secrecy::ExposeSecret;

    let settings: [(&str, &str); 15] = [
        ("node.name", config.node_name.as_str()),
        ("cluster.name", config.cluster_name.as_str()),
        ("cluster.initial_master_nodes", config.master_node_name.as_str()),
        ("discovery.seed_hosts", config.master_node_name.as_str()),
        ("cluster.routing.allocation.disk.threshold_enabled", "false"),
        ("bootstrap.memory_lock", "true"),
        ("node.attr.testattr", "test"),
        ("path.repo", "/tmp"),
        ("repositories.url.allowed_urls", "http://snapshot.test*"),
        ("ELASTIC_PASSWORD", config.password.expose_secret()),
        ("xpack.license.self_generated.type", "trial"),
        ("xpack.security.enabled", "false"),
        ("xpack.security.http.ssl.enabled", "false"),
        ("xpack.security.transport.ssl.enabled", "false"),
        ("xpack.ml.max_machine_memory_percent", "90"),
    ];

    let mut env: Vec<(String, String)> =
        vec![("ES_JAVA_OPTS".to_string(), config.java_opts.clone())];
    env.extend(settings.iter().map(|(k, v)| (k.to_string(), v.to_string())));

    ContainerSpec {
        name: config.node_name.clone(),
        image: config.image.clone(),
        network: config.network_name.clone(),
        env,
        port: (config.http_port, CONTAINER_HTTP_PORT),
        volume: (config.volume_name.clone(), DATA_PATH.to_string()),
        ulimits: vec![
            Ulimit::new("nofile", 65536, 65536),
            Ulimit::new("memlock", -1, -1),
        ],
        health: Some(health_probe(config)),
    }
}

/// In-container probe against the cluster health endpoint.
pub fn health_probe(config: &ProvisionConfig) -> HealthProbe {
    let insecure = if config.insecure_health_probe {
        "--insecure "
    } else {
        ""
    };
    HealthProbe {
        command: format!(
            "curl {}--fail http://{}:{}/_cluster/health || exit 1",
            insecure, config.node_name, CONTAINER_HTTP_PORT
        ),
        interval: config.timings.probe_interval,
        timeout: config.timings.probe_timeout,
        retries: config.timings.probe_retries,
    }
}
