//! Configuration resolved from `.env` files.
//!
//! Each test writes a `.env` into a tempdir, parses it with dotenvy and
//! resolves through a lookup over the parsed map, so the process
//! environment is never touched.

use std::collections::HashMap;

use pretty_assertions::assert_eq;
use secrecy::ExposeSecret;
use tempfile::tempdir;

use es_testenv::config::{ConfigOverrides, IMAGE_VAR, ProvisionConfig};
use es_testenv::error::ConfigError;

fn read_env_map(contents: &str) -> HashMap<String, String> {
    let dir = tempdir().unwrap();
    let path = dir.path().join(".env");
    std::fs::write(&path, contents).unwrap();
    dotenvy::from_path_iter(&path)
        .expect("dotenvy should parse the .env file")
        .filter_map(|r| r.ok())
        .collect()
}

fn resolve(contents: &str, overrides: &ConfigOverrides) -> Result<ProvisionConfig, ConfigError> {
    let map = read_env_map(contents);
    let lookup = move |key: &str| map.get(key).cloned();
    ProvisionConfig::resolve_with(overrides, &lookup)
}

#[test]
fn ci_env_file_resolves() {
    let config = resolve(
        "# written by the CI job\n\
         ELASTICSEARCH_VERSION=elasticsearch:8.13.0\n\
         DETACH=true\n\
         ELASTIC_PASSWORD=\"s3cret with spaces\"\n",
        &ConfigOverrides::default(),
    )
    .unwrap();

    assert_eq!(config.image, "docker.elastic.co/elasticsearch/elasticsearch:8.13.0");
    assert_eq!(config.network_name, "elasticsearch-8-13-0-rest");
    assert!(config.detach);
    assert_eq!(config.password.expose_secret(), "s3cret with spaces");
}

#[test]
fn snapshot_image_gets_its_own_namespace() {
    let release = resolve(
        "ELASTICSEARCH_VERSION=elasticsearch:8.13.0\n",
        &ConfigOverrides::default(),
    )
    .unwrap();
    let snapshot = resolve(
        "ELASTICSEARCH_VERSION=elasticsearch:8.14.0-SNAPSHOT\n",
        &ConfigOverrides::default(),
    )
    .unwrap();

    assert_eq!(snapshot.network_name, "elasticsearch-8-14-0-SNAPSHOT-rest");
    assert_ne!(release.network_name, snapshot.network_name);
    // Same node name, so the volume name is shared across identities.
    assert_eq!(release.volume_name, snapshot.volume_name);
}

#[test]
fn empty_values_count_as_unset() {
    let err = resolve("ELASTICSEARCH_VERSION=\n", &ConfigOverrides::default()).unwrap_err();
    assert!(matches!(err, ConfigError::Missing { ref key, .. } if key == IMAGE_VAR));

    let config = resolve(
        "ELASTICSEARCH_VERSION=elasticsearch:8.13.0\nNODE_NAME=\nHTTP_PORT=\n",
        &ConfigOverrides::default(),
    )
    .unwrap();
    assert_eq!(config.node_name, "instance");
    assert_eq!(config.http_port, 9200);
}

#[test]
fn malformed_port_names_the_variable() {
    let err = resolve(
        "ELASTICSEARCH_VERSION=elasticsearch:8.13.0\nHTTP_PORT=ninety-two-hundred\n",
        &ConfigOverrides::default(),
    )
    .unwrap_err();
    assert!(err.to_string().starts_with("Invalid value for HTTP_PORT"));
}

#[test]
fn cli_overrides_env_file() {
    let config = resolve(
        "ELASTICSEARCH_VERSION=elasticsearch:8.13.0\nNODE_NAME=from-file\n",
        &ConfigOverrides {
            node_name: Some("from-cli".to_string()),
            cleanup_only: Some(true),
            ..Default::default()
        },
    )
    .unwrap();
    assert_eq!(config.node_name, "from-cli");
    assert_eq!(config.master_node_name, "from-cli");
    assert_eq!(config.volume_name, "from-cli-rest-data");
    assert!(config.cleanup_only);
}
