//! Kernel capability registry: the backends compiled into this build.
//!
//! Defines the canonical enumeration of kernel backends and the capabilities
//! snapshot that describes what a given build provides.

use crate::{KernelError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The kernel backend variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
#[non_exhaustive]
pub enum KernelBackend {
    /// Scalar CPU kernels; always compiled.
    CpuFallback,
    /// Channel-parallel CPU kernels via `rayon`.
    CpuParallel,
}

impl fmt::Display for KernelBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KernelBackend::CpuFallback => write!(f, "fallback"),
            KernelBackend::CpuParallel => write!(f, "parallel"),
        }
    }
}

impl FromStr for KernelBackend {
    type Err = KernelError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "fallback" | "cpu-fallback" | "scalar" => Ok(KernelBackend::CpuFallback),
            "parallel" | "cpu-parallel" | "rayon" => Ok(KernelBackend::CpuParallel),
            other => Err(KernelError::UnknownProvider { name: other.to_string() }),
        }
    }
}

impl KernelBackend {
    /// Returns true if this backend is compiled in the current build.
    pub fn is_compiled(self) -> bool {
        match self {
            KernelBackend::CpuFallback => true,
            KernelBackend::CpuParallel => cfg!(feature = "parallel"),
        }
    }

    /// Fails with [`KernelError::Unavailable`] if the backend is not compiled.
    pub fn ensure_compiled(self) -> Result<Self> {
        if self.is_compiled() {
            Ok(self)
        } else {
            Err(KernelError::Unavailable { name: self.to_string() }.into())
        }
    }
}

/// Snapshot of what a build configuration provides.
#[derive(Debug, Clone)]
pub struct KernelCapabilities {
    /// Rayon-backed provider is compiled.
    pub parallel_compiled: bool,
    /// Logical CPUs visible to the process.
    pub logical_cpus: usize,
}

impl KernelCapabilities {
    /// Build from compile-time feature flags and the visible CPU count.
    pub fn detect() -> Self {
        KernelCapabilities {
            parallel_compiled: cfg!(feature = "parallel"),
            logical_cpus: std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1),
        }
    }

    /// Returns backends that are compiled in, in priority order (best first).
    pub fn compiled_backends(&self) -> Vec<KernelBackend> {
        let mut backends = Vec::new();
        if self.parallel_compiled {
            backends.push(KernelBackend::CpuParallel);
        }
        backends.push(KernelBackend::CpuFallback);
        backends
    }

    /// Returns the preferred backend.
    ///
    /// The parallel backend only wins when there is more than one CPU to
    /// spread channels over.
    pub fn best_available(&self) -> KernelBackend {
        if self.parallel_compiled && self.logical_cpus > 1 {
            KernelBackend::CpuParallel
        } else {
            KernelBackend::CpuFallback
        }
    }

    /// Returns a human-readable summary string for logs.
    pub fn summary(&self) -> String {
        let backends: Vec<String> =
            self.compiled_backends().iter().map(|b| b.to_string()).collect();
        format!("cpus={} backends=[{}]", self.logical_cpus, backends.join(","))
    }
}
