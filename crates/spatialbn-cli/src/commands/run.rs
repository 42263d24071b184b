//! Run an operator definition on JSON tensors

use anyhow::{Context, Result, bail};
use clap::Parser;
use serde::{Deserialize, Serialize};
use spatialbn_common::{RuntimeConfig, Tensor};
use spatialbn_kernels::{KernelManager, KernelProvider};
use spatialbn_ops::{OperatorDef, create_operator};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Instant;
use tracing::info;

use super::{read_operator_def, write_output};

/// Run an operator definition
#[derive(Debug, Parser)]
pub struct RunCommand {
    /// Operator definition (JSON)
    #[arg(short, long, value_name = "PATH")]
    pub def: PathBuf,

    /// Input tensors (JSON): an array in slot order, or an object keyed by
    /// the definition's input blob names
    #[arg(short, long, value_name = "PATH")]
    pub inputs: PathBuf,

    /// Write outputs to this file instead of stdout
    #[arg(short, long, value_name = "PATH")]
    pub output: Option<PathBuf>,
}

/// Contents of an inputs file.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum InputTensors {
    Positional(Vec<Tensor>),
    Named(BTreeMap<String, Tensor>),
}

impl InputTensors {
    /// Put the tensors in the definition's input order.
    pub fn resolve(self, def: &OperatorDef) -> Result<Vec<Tensor>> {
        match self {
            InputTensors::Positional(tensors) => Ok(tensors),
            InputTensors::Named(by_name) => def
                .inputs
                .iter()
                .map(|blob| {
                    by_name
                        .get(blob)
                        .cloned()
                        .with_context(|| format!("no tensor for input blob '{blob}'"))
                })
                .collect(),
        }
    }
}

/// One output tensor tagged with its blob name.
#[derive(Debug, Serialize)]
pub struct NamedOutput<'a> {
    pub name: &'a str,
    #[serde(flatten)]
    pub tensor: &'a Tensor,
}

/// Construct the operator and run it on `provider`.
pub fn run_operator(
    def: &OperatorDef,
    inputs: InputTensors,
    provider: &dyn KernelProvider,
) -> Result<Vec<Tensor>> {
    let op = create_operator(def).context("Invalid operator definition")?;
    let tensors = inputs.resolve(def)?;
    let refs: Vec<&Tensor> = tensors.iter().collect();

    let start = Instant::now();
    let outputs = op
        .run_with(provider, &refs)
        .with_context(|| format!("{} failed", def.op_type))?;
    info!(
        op = op.op_type(),
        provider = provider.name(),
        elapsed_us = start.elapsed().as_micros() as u64,
        "operator finished"
    );

    if outputs.len() != def.outputs.len() {
        bail!(
            "{} produced {} outputs for {} output blobs",
            def.op_type,
            outputs.len(),
            def.outputs.len()
        );
    }
    Ok(outputs)
}

impl RunCommand {
    pub fn execute(&self, config: &RuntimeConfig) -> Result<()> {
        let def = read_operator_def(&self.def)?;
        let text = std::fs::read_to_string(&self.inputs)
            .with_context(|| format!("Failed to read inputs from {}", self.inputs.display()))?;
        let inputs: InputTensors = serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse tensors in {}", self.inputs.display()))?;

        let manager =
            KernelManager::with_config(&config.kernel).context("Failed to set up kernels")?;
        let provider = manager.select_best()?;
        let outputs = run_operator(&def, inputs, provider)?;

        let named: Vec<NamedOutput<'_>> = def
            .outputs
            .iter()
            .zip(&outputs)
            .map(|(name, tensor)| NamedOutput { name, tensor })
            .collect();
        write_output(self.output.as_deref(), &serde_json::to_string_pretty(&named)?)
    }
}
