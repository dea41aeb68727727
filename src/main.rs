// ABOUTME: Entry point for the sshtask CLI application.
// ABOUTME: Parses arguments and dispatches to appropriate command handlers.

mod cli;
mod commands;

use clap::Parser;
use cli::{Cli, Commands};
use sshtask::config;
use sshtask::error::Result;
use sshtask::output::{Output, OutputFormat};
use std::env;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize tracing subscriber based on verbose flag
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("warn")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let format = if cli.json {
        OutputFormat::Json
    } else if cli.quiet {
        OutputFormat::Quiet
    } else {
        OutputFormat::Normal
    };

    match run(cli, Output::new(format)).await {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            Output::new(format).error(&e.to_string());
            std::process::exit(1);
        }
    }
}

async fn run(cli: Cli, output: Output) -> Result<i32> {
    match cli.command {
        Commands::Init { host, force } => {
            let cwd = env::current_dir()?;
            config::init_config(&cwd, host.as_deref(), force)?;
            output.progress(&format!("Created {}", config::CONFIG_FILENAME));
            Ok(0)
        }
        Commands::Exec(args) => commands::exec_command(args, output).await,
        Commands::Fingerprint { target } => {
            commands::fingerprint_command(&target, &output).await?;
            Ok(0)
        }
    }
}
