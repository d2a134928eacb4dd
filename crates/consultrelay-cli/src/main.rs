//! consultrelay CLI entry point.

use std::process::ExitCode;

use clap::Parser;

use consultrelay_cli::cli::{Cli, Command, ConfigAction};
use consultrelay_cli::commands;
use consultrelay_cli::config::RelayConfig;
use consultrelay_cli::error::{CliError, CliResult};
use consultrelay_core::{TracingConfig, init_tracing};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let tracing_config = if cli.debug {
        TracingConfig::debug()
    } else if cli.json_logs {
        TracingConfig::daemon()
    } else {
        TracingConfig::default()
    };
    if let Err(e) = init_tracing(tracing_config) {
        eprintln!("warning: {}", e);
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> CliResult<()> {
    if let Some(Command::HashPassword { password, cost }) = cli.command {
        return commands::hash_password::run(password, cost);
    }

    // An explicit path must exist; the default one is optional.
    let (config, source) = match cli.config {
        Some(path) => (
            RelayConfig::load_from(&path).map_err(CliError::Config)?,
            path,
        ),
        None => (
            RelayConfig::load().map_err(CliError::Config)?,
            RelayConfig::default_path(),
        ),
    };

    match cli.command {
        None => commands::serve::run(&config, None).await,
        Some(Command::Serve { listen }) => commands::serve::run(&config, listen).await,
        Some(Command::Appointments { user }) => commands::appointments::list(&config, &user),
        Some(Command::Config { action }) => match action {
            ConfigAction::Dump => commands::config::dump(&config, &source),
            ConfigAction::Path => commands::config::path(&source),
        },
        Some(Command::HashPassword { password, cost }) => {
            commands::hash_password::run(password, cost)
        }
    }
}
