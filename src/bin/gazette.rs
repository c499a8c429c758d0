//! Gazette CLI Binary
//!
//! Command-line interface for editing and synchronizing a gazette repository.

use anyhow::Context;
use clap::Parser;
use gazette::cli::{Cli, PromptCredentials, RunContext};
use gazette::config::ConfigLoader;
use gazette::logging::{init_logging, LoggingConfig};
use gazette::sync::{CredentialProvider, EnvCredentials};
use std::process;
use std::sync::Arc;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let logging_config = build_logging_config(&cli);
    init_logging(Some(&logging_config)).context("Failed to initialize logging")?;

    info!("Gazette CLI starting");

    let credentials: Arc<dyn CredentialProvider> = if cli.ask_credentials {
        Arc::new(PromptCredentials::new())
    } else {
        Arc::new(EnvCredentials)
    };

    let context = match RunContext::new(cli.workspace.clone(), cli.config.clone(), credentials) {
        Ok(ctx) => ctx,
        Err(e) => {
            error!("Error opening workspace: {}", e);
            eprintln!("{}", gazette::cli::map_error(&e));
            process::exit(1);
        }
    };

    let outcome = context.execute(&cli.command).await;
    context.shutdown();
    match outcome {
        Ok(output) => {
            println!("{}", output);
            Ok(())
        }
        Err(e) => {
            error!("Command failed: {}", e);
            eprintln!("{}", gazette::cli::map_error(&e));
            process::exit(1);
        }
    }
}

/// Build logging configuration from CLI args and the config file.
/// Precedence: CLI flags override config file override defaults.
fn build_logging_config(cli: &Cli) -> LoggingConfig {
    let mut config = match cli.config {
        Some(ref path) => ConfigLoader::load_from_file(path),
        None => ConfigLoader::load(&cli.workspace),
    }
    .map(|c| c.logging)
    .unwrap_or_default();

    if cli.quiet {
        config.enabled = false;
    }
    if cli.verbose {
        config.level = "debug".to_string();
    }
    if let Some(ref level) = cli.log_level {
        config.level = level.clone();
    }
    if let Some(ref format) = cli.log_format {
        config.format = format.clone();
    }
    if let Some(ref output) = cli.log_output {
        config.output = output.clone();
    }
    if let Some(ref file) = cli.log_file {
        config.file = file.clone();
        if cli.log_output.is_none() {
            config.output = "file".to_string();
        }
    }
    config
}
