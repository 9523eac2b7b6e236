// EHRglot - EHR Schema Mapping and PHI Masking Toolkit
// Copyright (c) 2025 EHRglot Contributors
// Licensed under the MIT License

use clap::Parser;
use ehrglot::cli::{exit_code_for, Cli, Commands, EXIT_CONFIG, EXIT_FATAL};
use ehrglot::config::EhrglotConfig;
use ehrglot::logging::init_logging;
use std::process;

#[tokio::main]
async fn main() {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let config = match cli.resolve_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ {e}");
            process::exit(EXIT_CONFIG);
        }
    };

    let log_level = cli
        .log_level
        .as_deref()
        .unwrap_or(&config.application.log_level);
    let guard = match init_logging(log_level, &config.logging) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {e}");
            process::exit(EXIT_FATAL);
        }
    };

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        schema_dir = %config.schemas.schema_dir.display(),
        "EHRglot - EHR Schema Mapping and PHI Masking Toolkit"
    );

    let exit_code = match execute_command(&cli, &config).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = %e, "Command execution failed");
            eprintln!("Error: {e:#}");
            exit_code_for(&e)
        }
    };

    // Flush file logs before exiting
    drop(guard);
    process::exit(exit_code);
}

/// Execute the CLI command
async fn execute_command(cli: &Cli, config: &EhrglotConfig) -> anyhow::Result<i32> {
    match &cli.command {
        Commands::Convert(args) => args.execute(config).await,
        Commands::Validate(args) => args.execute(config).await,
        Commands::ListSources(args) => args.execute(config).await,
        Commands::ListResources(args) => args.execute(config).await,
        Commands::ShowMappings(args) => args.execute(config).await,
        Commands::DetectPii(args) => args.execute(config).await,
        Commands::GenerateMasking(args) => args.execute(config).await,
        Commands::ParseHl7(args) => args.execute(config).await,
    }
}
