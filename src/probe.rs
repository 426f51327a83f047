//! Host-side cluster health check.
//!
//! The in-container probe decides readiness. This one runs from the host
//! against the published port and is what `status` reports.

use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::error::ProbeError;

/// Subset of the `_cluster/health` response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterHealth {
    pub cluster_name: String,
    /// `green`, `yellow` or `red`.
    pub status: String,
    pub number_of_nodes: u32,
}

/// Query `<base_url>/_cluster/health`.
///
/// Returns `Ok(None)` when nothing is listening, which is the normal state
/// of a node that is not running.
pub async fn probe_cluster_health(
    base_url: &str,
    password: &SecretString,
) -> Result<Option<ClusterHealth>, ProbeError> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(5))
        .build()
        .map_err(|e| ProbeError::Http(e.to_string()))?;

    let url = format!("{}/_cluster/health", base_url.trim_end_matches('/'));
    let response = client
        .get(&url)
        .basic_auth("elastic", Some(password.expose_secret()))
        .send()
        .await;

    let response = match response {
        Ok(resp) => resp,
        Err(e) if e.is_connect() => return Ok(None),
        Err(e) => return Err(ProbeError::Http(e.to_string())),
    };

    if !response.status().is_success() {
        return Err(ProbeError::Status {
            status: response.status().as_u16(),
        });
    }

    let body = response
        .text()
        .await
        .map_err(|e| ProbeError::Http(e.to_string()))?;
    parse_health(&body).map(Some)
}

fn parse_health(body: &str) -> Result<ClusterHealth, ProbeError> {
    serde_json::from_str(body).map_err(|e| ProbeError::Decode(e.to_string()))
}
