//! Kernel and build information

use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;
use spatialbn_common::{KernelCapabilities, RuntimeConfig};
use spatialbn_kernels::KernelManager;

/// Show kernel providers and build capabilities
#[derive(Debug, Parser)]
pub struct InfoCommand {
    /// Print as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Serialize)]
pub struct InfoReport {
    pub version: &'static str,
    pub logical_cpus: usize,
    pub compiled_backends: Vec<String>,
    pub available_providers: Vec<&'static str>,
    pub preference: String,
    pub selected_provider: &'static str,
}

impl InfoReport {
    pub fn collect(config: &RuntimeConfig) -> Result<Self> {
        let caps = KernelCapabilities::detect();
        let manager =
            KernelManager::with_config(&config.kernel).context("Failed to set up kernels")?;
        let selected = manager.select_best()?.name();
        Ok(Self {
            version: env!("CARGO_PKG_VERSION"),
            logical_cpus: caps.logical_cpus,
            compiled_backends: caps.compiled_backends().iter().map(|b| b.to_string()).collect(),
            available_providers: manager.list_available_providers(),
            preference: config.kernel.backend.to_string(),
            selected_provider: selected,
        })
    }
}

impl InfoCommand {
    pub fn execute(&self, config: &RuntimeConfig) -> Result<()> {
        let report = InfoReport::collect(config)?;
        if self.json {
            println!("{}", serde_json::to_string_pretty(&report)?);
            return Ok(());
        }

        println!("spatialbn {}", report.version);
        println!("  logical cpus:        {}", report.logical_cpus);
        println!("  compiled backends:   {}", report.compiled_backends.join(", "));
        println!("  available providers: {}", report.available_providers.join(", "));
        println!("  preference:          {}", report.preference);
        println!("  selected provider:   {}", report.selected_provider);
        Ok(())
    }
}
