use anyhow::Result;
use clap::Parser;

// Core modules
mod cli;
mod commands;
mod config;

mod domain;
mod error;
mod infrastructure;
mod path_builder;
mod services;
mod ui;

#[cfg(test)]
mod testing;

use cli::{Cli, Commands, MaintenanceCommands};
use commands::{backup, check, cleanup, deploy, maintenance, migrate, releases, restore, rollback};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging with LOGGING env var support
    // LOGGING=debug,info,warn,error or just LOGGING=debug
    let log_level = std::env::var("LOGGING")
        .or_else(|_| std::env::var("LOG_LEVEL"))
        .unwrap_or_else(|_| {
            if cli.verbose {
                "debug".to_string()
            } else {
                "info".to_string()
            }
        });

    tracing_subscriber::fmt()
        .with_env_filter(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_ansi(false) // Disable ANSI escape codes for cleaner output
        .init();

    let config = cli.config.as_str();

    // Execute command
    match cli.command {
        Commands::Deploy => deploy::execute(config).await?,
        Commands::Rollback => rollback::execute(config).await?,
        Commands::Releases { json } => releases::execute(config, json).await?,
        Commands::Migrate { domain, pending } => migrate::execute(config, domain, pending).await?,
        Commands::Backup { domain, kind } => backup::execute(config, domain, kind).await?,
        Commands::Restore { domain, release } => restore::execute(config, domain, release).await?,
        Commands::Cleanup { keep } => cleanup::execute(config, keep).await?,
        Commands::Maintenance { command } => match command {
            MaintenanceCommands::On { domain } => maintenance::execute(config, domain, true).await?,
            MaintenanceCommands::Off { domain } => maintenance::execute(config, domain, false).await?,
        },
        Commands::Check => check::execute(config).await?,
    }

    Ok(())
}
