//! SpatialBN CLI library
//!
//! The binary is a thin wrapper; argument parsing, configuration loading
//! and the commands live here so they can be tested.

pub mod cli;
pub mod commands;
pub mod exit;
pub mod logging;

use anyhow::{Context, Result};
use clap::CommandFactory;
use spatialbn_common::{ConfigBuilder, RuntimeConfig};
use std::path::Path;
use tracing::info;

pub use cli::{Cli, Commands, ConfigAction};

/// Looked up in the working directory when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "spatialbn.toml";

/// Layer configuration: file, then `SPATIALBN_*` variables, then flags.
pub fn load_configuration(cli: &Cli) -> Result<RuntimeConfig> {
    let builder = match &cli.config {
        Some(path) => ConfigBuilder::new()
            .from_file(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None if Path::new(DEFAULT_CONFIG_FILE).is_file() => ConfigBuilder::new()
            .from_file(DEFAULT_CONFIG_FILE)
            .with_context(|| format!("Failed to load {DEFAULT_CONFIG_FILE}"))?,
        None => ConfigBuilder::new(),
    };

    builder
        .from_env()
        .context("Invalid SPATIALBN_* environment variable")?
        .log_level(cli.log_level.clone())
        .log_format(cli.log_format)
        .backend(cli.kernel)
        .num_threads(cli.threads)
        .build()
        .context("Failed to build configuration")
}

/// Dispatch the parsed command.
pub fn run(cli: Cli, config: &RuntimeConfig) -> Result<()> {
    match cli.command {
        Some(Commands::Run(cmd)) => cmd.execute(config),
        Some(Commands::GradDef(cmd)) => cmd.execute(),
        Some(Commands::Info(cmd)) => cmd.execute(config),
        Some(Commands::Config { action: ConfigAction::Show }) => commands::show_config(config),
        None => {
            info!("No command given");
            Cli::command().print_help()?;
            Ok(())
        }
    }
}
