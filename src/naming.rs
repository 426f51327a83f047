//! Deterministic resource names.
//!
//! Every network, container and volume touched by a run is named from the
//! run identity, the node name and the role suffix. Cleanup re-derives the
//! same names instead of keeping a registry of what was created.

use serde::Serialize;

/// Role suffix appended to every derived name.
pub const ROLE_SUFFIX: &str = "rest";

/// Name prefix derived from the image reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunIdentity {
    moniker: String,
}

impl RunIdentity {
    /// Derive the identity from an image reference.
    ///
    /// Every character that is not ASCII alphanumeric becomes `-`, so
    /// `elasticsearch:8.13.0` yields `elasticsearch-8-13-0`.
    pub fn from_image(image: &str) -> Self {
        let moniker = image
            .trim()
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
            .collect();
        Self { moniker }
    }

    pub fn moniker(&self) -> &str {
        &self.moniker
    }

    /// Default network name, `<moniker>-rest`.
    pub fn network_name(&self) -> String {
        format!("{}-{}", self.moniker, ROLE_SUFFIX)
    }

    /// Default cluster name. Same shape as the network name.
    pub fn cluster_name(&self) -> String {
        self.network_name()
    }
}

impl std::fmt::Display for RunIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.moniker)
    }
}

/// Data volume for a node, `<node>-rest-data`.
pub fn volume_name(node_name: &str) -> String {
    format!("{}-{}-data", node_name, ROLE_SUFFIX)
}
