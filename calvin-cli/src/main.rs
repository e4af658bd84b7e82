//! # calvin CLI
//!
//! Runs compiled Calvin deployments on a single runtime instance.

mod commands;
mod deployment;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "calvin")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to runtime configuration file
    #[arg(long, global = true, env = "CALVIN_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Deploy and run a compiled deployment description
    Run {
        /// Deployment file (YAML)
        deployment: PathBuf,

        /// Stop after this many fire attempts
        #[arg(long)]
        max_fires: Option<usize>,

        /// Keep running for this many milliseconds, serving timers and wakeups
        #[arg(long, conflicts_with = "max_fires")]
        for_ms: Option<u64>,

        /// Emit the run summary as JSON
        #[arg(long)]
        json: bool,
    },

    /// List the registered actor types
    Actors {
        /// Emit JSON instead of text
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let subscriber = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(if cli.verbose {
                tracing::Level::DEBUG.into()
            } else {
                tracing::Level::INFO.into()
            }),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Run {
            deployment,
            max_fires,
            for_ms,
            json,
        } => {
            let opts = commands::RunOptions {
                max_fires,
                for_ms,
                json,
            };
            commands::run_deployment(cli.config.as_deref(), &deployment, opts).await
        }
        Commands::Actors { json } => commands::list_actors(cli.config.as_deref(), json),
    }
}
