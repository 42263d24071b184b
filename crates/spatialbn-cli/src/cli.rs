//! Command-line arguments

use clap::{Parser, Subcommand};
use spatialbn_common::{BackendPreference, LogFormat};
use std::path::PathBuf;

use crate::commands::{GradDefCommand, InfoCommand, RunCommand};

/// SpatialBN - spatial batch normalization operators
#[derive(Debug, Parser)]
#[command(name = "spatialbn")]
#[command(about = "Run SpatialBN operator definitions against JSON tensors")]
#[command(long_about = r#"
Builds SpatialBN / SpatialBNGradient operators from JSON operator
definitions and runs them on the CPU kernels compiled into this build.

Examples:
  # Training-mode forward pass
  spatialbn run --def bn.json --inputs tensors.json --output out.json

  # Gradient definition for a forward definition
  spatialbn grad-def --def bn.json

  # Available kernel providers
  spatialbn info
"#)]
#[command(version)]
pub struct Cli {
    /// Configuration file path (TOML)
    #[arg(short, long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// Log level or filter directive (trace, debug, info, warn, error)
    #[arg(long, value_name = "LEVEL", global = true)]
    pub log_level: Option<String>,

    /// Log output format (pretty, compact, json)
    #[arg(long, value_name = "FORMAT", global = true)]
    pub log_format: Option<LogFormat>,

    /// Kernel provider (auto, fallback, parallel)
    #[arg(short, long, value_name = "KERNEL", global = true)]
    pub kernel: Option<BackendPreference>,

    /// Threads for the parallel kernel provider
    #[arg(long, value_name = "N", global = true)]
    pub threads: Option<usize>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run an operator definition on a list of input tensors
    Run(RunCommand),

    /// Print the gradient definition of a SpatialBN definition
    #[command(name = "grad-def", alias = "grad")]
    GradDef(GradDefCommand),

    /// Show kernel providers and build capabilities
    Info(InfoCommand),

    /// Inspect configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Debug, Subcommand)]
pub enum ConfigAction {
    /// Show the effective configuration as TOML
    Show,
}
