//! imggate - Authenticated caching gateway for imgproxy
//!
//! CLI entry point that dispatches to subcommands.

use clap::Parser;
use console::style;
use imggate::cli::{Cli, Commands};
use imggate::config::ConfigManager;
use imggate::error::GateResult;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

async fn run() -> GateResult<()> {
    let cli = Cli::parse();

    // Initialize logging: 0 = warn, 1 = info, 2+ = debug
    let filter = match cli.verbose {
        0 => EnvFilter::new("imggate=warn"),
        1 => EnvFilter::new("imggate=info"),
        _ => EnvFilter::new("imggate=debug"),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let manager = if let Some(path) = cli.config {
        ConfigManager::with_path(path)
    } else {
        ConfigManager::new()
    };
    let config = manager.load().await?;

    match cli.command {
        Commands::Serve(args) => imggate::cli::commands::serve(args, &config).await,
        Commands::Import(args) => imggate::cli::commands::import(args, &config).await,
        Commands::Config(args) => imggate::cli::commands::config(args, &config, &manager).await,
    }
}
