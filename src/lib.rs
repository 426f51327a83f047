//! Disposable single-node Elasticsearch environments for integration tests.
//!
//! A run derives every resource name from the image reference, creates an
//! isolated Docker network, pulls the image with retries and starts one
//! node. In detached mode it returns once the node is healthy; otherwise it
//! follows the node's output. The node and its volume are removed again
//! unless a detached node came up healthy; the network goes with them
//! when the run was attached.

pub mod cli;
pub mod config;
pub mod error;
pub mod naming;
pub mod probe;
pub mod provisioner;
pub mod runtime;
pub mod testing;

pub use config::{ConfigOverrides, ProvisionConfig};
pub use error::{ConfigError, ProvisionError, RuntimeError};
pub use provisioner::{Outcome, Provisioner, RunningEnvironment};
