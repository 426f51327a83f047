//! es-testenv - Main entry point.

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use es_testenv::cli::{
    Cli, Command, LogFormat, run_cleanup_command, run_doctor_command, run_status_command,
    run_up_command,
};
use es_testenv::config::load_env_file;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    init_tracing(cli.log_format);

    match run(&cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("ERROR: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: &Cli) -> anyhow::Result<()> {
    let command = cli.resolved_command();

    // Completion output must stay clean, and it needs no configuration.
    if let Command::Completion(completion) = &command {
        return completion.run();
    }

    load_env_file(cli.env_file.as_deref())?;

    match command {
        Command::Up(args) => run_up_command(&args, cli.json).await,
        Command::Cleanup(args) => run_cleanup_command(&args, cli.json).await,
        Command::Status(args) => run_status_command(&args, cli.json).await,
        Command::Doctor => run_doctor_command(cli.json).await,
        Command::Completion(completion) => completion.run(),
    }
}

fn init_tracing(format: LogFormat) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("es_testenv=info"));

    let registry = tracing_subscriber::registry().with(env_filter);
    match format {
        LogFormat::Text => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_writer(std::io::stderr),
            )
            .init(),
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init(),
    }
}
