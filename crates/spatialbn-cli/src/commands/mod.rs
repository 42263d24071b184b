//! CLI command implementations

pub mod grad_def;
pub mod info;
pub mod run;

pub use grad_def::GradDefCommand;
pub use info::InfoCommand;
pub use run::RunCommand;

use anyhow::{Context, Result};
use spatialbn_common::RuntimeConfig;
use spatialbn_ops::OperatorDef;
use std::path::Path;

pub(crate) fn read_operator_def(path: &Path) -> Result<OperatorDef> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read operator definition {}", path.display()))?;
    OperatorDef::from_json(&text)
        .with_context(|| format!("Failed to parse operator definition {}", path.display()))
}

/// Write `text` to `path`, or to stdout when no path is given.
pub(crate) fn write_output(path: Option<&Path>, text: &str) -> Result<()> {
    match path {
        Some(path) => {
            std::fs::write(path, format!("{text}\n"))
                .with_context(|| format!("Failed to write {}", path.display()))?;
            tracing::info!("Wrote {}", path.display());
        }
        None => println!("{text}"),
    }
    Ok(())
}

/// `config show`
pub fn show_config(config: &RuntimeConfig) -> Result<()> {
    let text = toml::to_string_pretty(config).context("Failed to serialize configuration")?;
    print!("{text}");
    Ok(())
}
