//! Runtime configuration with TOML file and environment variable support

use crate::{ConfigError, KernelBackend, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

pub const ENV_LOG_LEVEL: &str = "SPATIALBN_LOG_LEVEL";
pub const ENV_LOG_FORMAT: &str = "SPATIALBN_LOG_FORMAT";
pub const ENV_KERNEL: &str = "SPATIALBN_KERNEL";
pub const ENV_NUM_THREADS: &str = "SPATIALBN_NUM_THREADS";

/// Complete runtime configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub logging: LoggingConfig,
    pub kernel: KernelConfig,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `tracing` filter directive, e.g. `info` or `spatialbn_ops=debug`.
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), format: LogFormat::Pretty }
    }
}

/// Output format of the log subscriber
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Compact,
    Json,
}

impl FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pretty" => Ok(LogFormat::Pretty),
            "compact" => Ok(LogFormat::Compact),
            "json" => Ok(LogFormat::Json),
            other => Err(ConfigError::InvalidValue {
                key: "logging.format".to_string(),
                reason: format!("unknown log format '{other}'"),
            }),
        }
    }
}

/// Kernel selection configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KernelConfig {
    pub backend: BackendPreference,
    /// Size of the rayon pool used by the parallel provider; `None` uses
    /// the global pool.
    pub num_threads: Option<usize>,
}

/// Which kernel backend to run on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum BackendPreference {
    /// Let the kernel manager pick the best compiled backend.
    #[default]
    Auto,
    Fixed(KernelBackend),
}

impl FromStr for BackendPreference {
    type Err = ConfigError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("auto") {
            return Ok(BackendPreference::Auto);
        }
        s.parse::<KernelBackend>().map(BackendPreference::Fixed).map_err(|e| {
            ConfigError::InvalidValue { key: "kernel.backend".to_string(), reason: e.to_string() }
        })
    }
}

impl TryFrom<String> for BackendPreference {
    type Error = ConfigError;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<BackendPreference> for String {
    fn from(pref: BackendPreference) -> Self {
        pref.to_string()
    }
}

impl fmt::Display for BackendPreference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendPreference::Auto => write!(f, "auto"),
            BackendPreference::Fixed(backend) => write!(f, "{backend}"),
        }
    }
}

/// Configuration builder with environment variable support
///
/// Layers apply in call order; later layers override earlier ones.
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    config: RuntimeConfig,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from a TOML file, replacing current values.
    pub fn from_file<P: AsRef<Path>>(mut self, path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        self.config = toml::from_str(&content)
            .map_err(|e| ConfigError::Parse { reason: e.to_string() })?;
        Ok(self)
    }

    /// Apply `SPATIALBN_*` environment variables.
    pub fn from_env(mut self) -> Result<Self> {
        if let Ok(level) = env::var(ENV_LOG_LEVEL) {
            self.config.logging.level = level;
        }

        if let Ok(format) = env::var(ENV_LOG_FORMAT) {
            self.config.logging.format = format.parse()?;
        }

        if let Ok(kernel) = env::var(ENV_KERNEL) {
            self.config.kernel.backend = kernel.parse()?;
        }

        if let Ok(threads) = env::var(ENV_NUM_THREADS) {
            let n = threads.parse::<usize>().map_err(|e| ConfigError::InvalidValue {
                key: ENV_NUM_THREADS.to_string(),
                reason: e.to_string(),
            })?;
            self.config.kernel.num_threads = Some(n);
        }

        Ok(self)
    }

    pub fn log_level(mut self, level: Option<String>) -> Self {
        if let Some(level) = level {
            self.config.logging.level = level;
        }
        self
    }

    pub fn log_format(mut self, format: Option<LogFormat>) -> Self {
        if let Some(format) = format {
            self.config.logging.format = format;
        }
        self
    }

    pub fn backend(mut self, backend: Option<BackendPreference>) -> Self {
        if let Some(backend) = backend {
            self.config.kernel.backend = backend;
        }
        self
    }

    pub fn num_threads(mut self, threads: Option<usize>) -> Self {
        if threads.is_some() {
            self.config.kernel.num_threads = threads;
        }
        self
    }

    /// Validate and return the configuration.
    pub fn build(self) -> Result<RuntimeConfig> {
        self.config.validate()?;
        tracing::debug!(config = ?self.config, "runtime configuration built");
        Ok(self.config)
    }
}

impl RuntimeConfig {
    pub fn validate(&self) -> Result<()> {
        if self.logging.level.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "logging.level".to_string(),
                reason: "must not be empty".to_string(),
            }
            .into());
        }

        if self.kernel.num_threads == Some(0) {
            return Err(ConfigError::InvalidValue {
                key: "kernel.num_threads".to_string(),
                reason: "must be at least 1".to_string(),
            }
            .into());
        }

        if let BackendPreference::Fixed(backend) = self.kernel.backend {
            backend.ensure_compiled()?;
        }
        Ok(())
    }
}
