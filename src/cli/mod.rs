//! CLI command handling.
//!
//! Provides subcommands for:
//! - Provisioning a node (`up`, the default)
//! - Removing everything on a run's network (`cleanup`)
//! - Inspecting a provisioned node (`status`)
//! - Checking Docker availability and configuration (`doctor`)
//! - Generating shell completions (`completion`)

mod completion;
mod doctor;
pub mod status;
mod up;

pub use completion::Completion;
pub use doctor::run_doctor_command;
pub use status::run_status_command;
pub use up::{run_cleanup_command, run_up_command};

use std::path::PathBuf;

use clap::{Args, ColorChoice, Parser, Subcommand, ValueEnum};

use crate::config::ConfigOverrides;

#[derive(Parser, Debug)]
#[command(name = "es-testenv")]
#[command(about = "Disposable single-node Elasticsearch environments for integration tests")]
#[command(
    long_about = "Starts one Elasticsearch node on an isolated Docker network and removes it again.\nExamples:\n  es-testenv up --image elasticsearch:8.13.0 --detach\n  es-testenv cleanup --image elasticsearch:8.13.0"
)]
#[command(version)]
#[command(color = ColorChoice::Auto)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Load variables from this file instead of ./.env
    #[arg(long, global = true)]
    pub env_file: Option<PathBuf>,

    /// Print results as JSON on stdout
    #[arg(long, global = true)]
    pub json: bool,

    /// Log output format
    #[arg(long, global = true, value_enum, env = "LOG_FORMAT", default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Provision a node (default if no subcommand given)
    #[command(
        about = "Provision a node",
        long_about = "Pulls the image, starts the node and either follows it or waits until healthy.\nExample: es-testenv up --detach"
    )]
    Up(UpArgs),

    /// Remove every container on the run's network, then the network
    #[command(
        about = "Remove a run's resources",
        long_about = "Removes the containers, volumes and network of a run.\nExample: es-testenv cleanup --image elasticsearch:8.13.0"
    )]
    Cleanup(TargetArgs),

    /// Show the node container and cluster health
    #[command(
        about = "Show node status",
        long_about = "Inspects the node container and queries cluster health from the host.\nExample: es-testenv status"
    )]
    Status(TargetArgs),

    /// Check that Docker is usable
    #[command(
        about = "Run diagnostics",
        long_about = "Checks Docker availability and configuration.\nExample: es-testenv doctor"
    )]
    Doctor,

    /// Generate shell completion scripts
    #[command(
        about = "Generate completions",
        long_about = "Generates shell completion scripts.\nExample: es-testenv completion --shell bash > es-testenv.bash"
    )]
    Completion(Completion),
}

/// Selects which run a command acts on.
#[derive(Args, Debug, Clone, Default)]
pub struct TargetArgs {
    /// Image reference, e.g. elasticsearch:8.13.0 (default: $ELASTICSEARCH_VERSION)
    #[arg(long)]
    pub image: Option<String>,

    /// Node container name (default: $NODE_NAME or "instance")
    #[arg(long)]
    pub node_name: Option<String>,

    /// Network name (default: derived from the image)
    #[arg(long)]
    pub network: Option<String>,

    /// Host port for HTTP (default: $HTTP_PORT or 9200)
    #[arg(long)]
    pub http_port: Option<u16>,
}

impl TargetArgs {
    pub fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            image: self.image.clone(),
            node_name: self.node_name.clone(),
            network_name: self.network.clone(),
            http_port: self.http_port,
            ..Default::default()
        }
    }
}

#[derive(Args, Debug, Clone, Default)]
pub struct UpArgs {
    #[command(flatten)]
    pub target: TargetArgs,

    /// Cluster name (default: derived from the image)
    #[arg(long)]
    pub cluster_name: Option<String>,

    /// Data volume name (default: <node>-rest-data)
    #[arg(long)]
    pub volume: Option<String>,

    /// Return once the node is healthy and leave it running
    #[arg(long)]
    pub detach: bool,
}

impl UpArgs {
    pub fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            cluster_name: self.cluster_name.clone(),
            volume_name: self.volume.clone(),
            // Absent flag defers to $DETACH.
            detach: self.detach.then_some(true),
            ..self.target.overrides()
        }
    }
}

impl Cli {
    /// The command to run, `up` when none was given.
    pub fn resolved_command(&self) -> Command {
        self.command
            .clone()
            .unwrap_or_else(|| Command::Up(UpArgs::default()))
    }
}
