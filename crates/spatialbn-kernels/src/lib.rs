//! Compute kernels for spatial batch normalization
//!
//! Kernels are exposed through the [`KernelProvider`] trait so callers pick
//! an implementation by capability rather than by type. [`KernelManager`]
//! orders the providers compiled into this build and caches the choice.

use spatialbn_common::{
    BackendPreference, KernelBackend, KernelCapabilities, KernelConfig, KernelError, Result,
    SpatialDims,
};
use std::sync::OnceLock;

pub mod cpu;

pub use cpu::batch_norm::{
    BnParams, ChannelGradients, GradientMode, RunningStats, SavedStats, TrainingOutput,
};
pub use cpu::FallbackKernel;
#[cfg(feature = "parallel")]
pub use cpu::ParallelKernel;

/// Kernel provider trait
///
/// All buffers are flat `f32` slices laid out according to `dims`.
/// Per-channel slices (`scale`, `bias`, statistics) hold `dims.channels`
/// elements.
pub trait KernelProvider: Send + Sync {
    fn name(&self) -> &'static str;
    fn backend(&self) -> KernelBackend;
    fn is_available(&self) -> bool;

    /// Normalize with batch statistics and fold them into `running`.
    fn forward_training(
        &self,
        x: &[f32],
        dims: &SpatialDims,
        scale: &[f32],
        bias: &[f32],
        params: &BnParams,
        running: &mut RunningStats,
    ) -> Result<TrainingOutput>;

    /// Normalize with externally estimated statistics.
    fn forward_inference(
        &self,
        x: &[f32],
        dims: &SpatialDims,
        scale: &[f32],
        bias: &[f32],
        estimated: &RunningStats,
        epsilon: f32,
    ) -> Result<Vec<f32>>;

    /// Gradients with respect to the input, scale and bias.
    fn backward(
        &self,
        x: &[f32],
        dims: &SpatialDims,
        scale: &[f32],
        grad_output: &[f32],
        saved: &SavedStats,
        mode: GradientMode,
    ) -> Result<ChannelGradients>;
}

/// Kernel manager for selecting kernels with cached selection
pub struct KernelManager {
    providers: Vec<Box<dyn KernelProvider>>,
    preference: BackendPreference,
    selected: OnceLock<usize>,
}

impl KernelManager {
    /// Providers for this build in preference order, auto selection.
    pub fn new() -> Self {
        let caps = KernelCapabilities::detect();
        let mut providers: Vec<Box<dyn KernelProvider>> = vec![Box::new(cpu::FallbackKernel)];

        #[cfg(feature = "parallel")]
        {
            if caps.best_available() == KernelBackend::CpuParallel {
                providers.insert(0, Box::new(cpu::ParallelKernel::new()));
            } else {
                providers.push(Box::new(cpu::ParallelKernel::new()));
            }
        }

        tracing::debug!(capabilities = %caps.summary(), "kernel manager initialised");
        Self { providers, preference: BackendPreference::Auto, selected: OnceLock::new() }
    }

    /// Build from a kernel configuration section.
    ///
    /// A fixed backend that is not compiled in fails here rather than at
    /// first use.
    pub fn with_config(config: &KernelConfig) -> Result<Self> {
        let mut manager = Self::new();

        #[cfg(feature = "parallel")]
        {
            if let Some(threads) = config.num_threads {
                let pooled = cpu::ParallelKernel::with_threads(threads)?;
                if let Some(slot) = manager
                    .providers
                    .iter_mut()
                    .find(|p| p.backend() == KernelBackend::CpuParallel)
                {
                    *slot = Box::new(pooled);
                }
            }
        }

        manager.pin(config.backend)?;
        Ok(manager)
    }

    /// Default providers pinned to `preference`.
    pub fn with_preference(preference: BackendPreference) -> Result<Self> {
        let mut manager = Self::new();
        manager.pin(preference)?;
        Ok(manager)
    }

    fn pin(&mut self, preference: BackendPreference) -> Result<()> {
        if let BackendPreference::Fixed(backend) = preference {
            backend.ensure_compiled()?;
        }
        self.preference = preference;
        Ok(())
    }

    pub fn preference(&self) -> BackendPreference {
        self.preference
    }

    /// Process-wide manager with auto selection.
    pub fn global() -> &'static KernelManager {
        static GLOBAL: OnceLock<KernelManager> = OnceLock::new();
        GLOBAL.get_or_init(KernelManager::new)
    }

    /// Select the provider honouring the configured preference
    pub fn select_best(&self) -> Result<&dyn KernelProvider> {
        let preference = self.preference;
        let selected_idx = self.selected.get_or_init(|| {
            let idx = self.providers.iter().position(|p| match preference {
                BackendPreference::Auto => p.is_available(),
                BackendPreference::Fixed(backend) => p.backend() == backend && p.is_available(),
            });
            match idx {
                Some(i) => {
                    tracing::info!("Selected kernel provider: {}", self.providers[i].name());
                    i
                }
                None => {
                    tracing::error!(%preference, "No matching kernel provider found");
                    usize::MAX
                }
            }
        });

        self.providers.get(*selected_idx).map(|p| p.as_ref()).ok_or_else(|| match preference {
            BackendPreference::Fixed(backend) => {
                KernelError::Unavailable { name: backend.to_string() }.into()
            }
            BackendPreference::Auto => KernelError::NoProvider.into(),
        })
    }

    /// Get the name of the currently selected kernel provider
    pub fn selected_provider_name(&self) -> Option<&'static str> {
        self.selected.get().and_then(|&idx| self.providers.get(idx)).map(|p| p.name())
    }

    /// List all available kernel providers
    pub fn list_available_providers(&self) -> Vec<&'static str> {
        self.providers.iter().filter(|p| p.is_available()).map(|p| p.name()).collect()
    }

    /// Look up a provider by backend, ignoring the preference.
    pub fn provider(&self, backend: KernelBackend) -> Result<&dyn KernelProvider> {
        self.providers
            .iter()
            .find(|p| p.backend() == backend && p.is_available())
            .map(|p| p.as_ref())
            .ok_or_else(|| KernelError::Unavailable { name: backend.to_string() }.into())
    }
}

impl Default for KernelManager {
    fn default() -> Self {
        Self::new()
    }
}
