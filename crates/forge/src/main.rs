//! forge - Self-Improving Generation Orchestrator CLI
//!
//! Runs simulated sessions against the orchestrator and inspects what it
//! has learned.

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod cli;
mod commands;
mod config;

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = EnvFilter::from_default_env().add_directive("forge=info".parse()?);
    if cli.log_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer().with_writer(std::io::stderr))
            .with(filter)
            .init();
    }

    // Load configuration
    let loaded = config::resolve(cli.config.as_deref())?;

    // Execute command
    match cli.command {
        Commands::Simulate(args) => commands::simulate::execute(args, loaded).await,
        Commands::Report { json } => commands::report::execute(json, &loaded).await,
        Commands::Curriculum(cmd) => commands::curriculum::execute(cmd, &loaded).await,
        Commands::Config(cmd) => commands::config::execute(cmd, &loaded),
        Commands::Version => {
            println!("forge {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}
