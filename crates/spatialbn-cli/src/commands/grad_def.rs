//! Gradient definition for a SpatialBN definition

use anyhow::{Context, Result};
use clap::Parser;
use spatialbn_ops::spatial_bn_gradient_def;
use std::path::PathBuf;

use super::{read_operator_def, write_output};

/// Print the SpatialBNGradient definition for a forward definition
#[derive(Debug, Parser)]
pub struct GradDefCommand {
    /// Forward operator definition (JSON)
    #[arg(short, long, value_name = "PATH")]
    pub def: PathBuf,

    /// Write the definition to this file instead of stdout
    #[arg(short, long, value_name = "PATH")]
    pub output: Option<PathBuf>,
}

impl GradDefCommand {
    pub fn execute(&self) -> Result<()> {
        let forward = read_operator_def(&self.def)?;
        let grad = spatial_bn_gradient_def(&forward).context("Cannot derive gradient definition")?;
        write_output(self.output.as_deref(), &grad.to_json_pretty()?)
    }
}
