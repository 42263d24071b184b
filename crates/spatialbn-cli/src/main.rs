//! `spatialbn` command-line entry point

use anyhow::Result;
use clap::Parser;
use spatialbn_cli::exit::exit_code;
use spatialbn_cli::logging::setup_logging;
use spatialbn_cli::{Cli, load_configuration, run};
use tracing::error;

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = load_configuration(&cli)?;
    setup_logging(&config.logging)?;

    if let Err(e) = run(cli, &config) {
        error!("Command failed: {}", e);

        let mut source = e.source();
        while let Some(err) = source {
            error!("  Caused by: {}", err);
            source = err.source();
        }

        std::process::exit(exit_code(&e));
    }

    Ok(())
}
