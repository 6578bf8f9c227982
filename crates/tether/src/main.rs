mod cli;
mod commands;
mod error;
mod output;

use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use tether_config::{Config, ConfigError};

use crate::cli::{Cli, Command};
use crate::commands::Context;
use crate::error::CliError;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config_path = cli
        .global
        .config
        .clone()
        .unwrap_or_else(tether_config::config_path);
    let loaded = tether_config::load_config_from(&config_path);

    let log_level = loaded.as_ref().ok().and_then(|cfg| cfg.log_level.clone());
    init_tracing(cli.global.verbose, log_level.as_deref());

    // Dispatch and handle errors with proper exit codes
    if let Err(err) = run(cli, loaded, config_path).await {
        let code = err.exit_code();
        eprintln!("{:?}", miette::Report::new(err));
        std::process::exit(code);
    }
}

/// `RUST_LOG` wins, then `-v`, then `log_level` from the config.
fn init_tracing(verbosity: u8, configured: Option<&str>) {
    let filter = match verbosity {
        0 => configured.unwrap_or("warn"),
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

async fn run(
    cli: Cli,
    loaded: Result<Config, ConfigError>,
    config_path: PathBuf,
) -> Result<(), CliError> {
    let Cli {
        mut global,
        command,
    } = cli;

    let config = match loaded {
        Ok(config) => config,
        // Config and completions must work even when the file is broken
        Err(err) if matches!(command, Command::Config(_) | Command::Completions(_)) => {
            tracing::warn!(error = %err, "ignoring unreadable config");
            Config::default()
        }
        Err(err) => return Err(CliError::config(err, &config_path)),
    };
    global.apply_defaults(&config.defaults);

    let ctx = Context {
        config,
        config_path,
    };
    tracing::debug!(command = ?command, "dispatching command");
    commands::dispatch(command, &ctx, &global).await
}
