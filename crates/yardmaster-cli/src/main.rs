//! Yardmaster CLI - runs the Warehouse controller and one-shot discovery.

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

use commands::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "yardmaster=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Controller(args) => commands::controller::run(args).await,
        Commands::Discover(args) => commands::discover::run(&args).await,
        Commands::Validate(args) => commands::validate::run(&args),
        Commands::Crd => commands::crd::run(),
        Commands::Version => {
            println!("yardmaster {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}
