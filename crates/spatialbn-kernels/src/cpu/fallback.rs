//! Fallback CPU kernel implementation
//!
//! Single-threaded implementations of every kernel operation. They work on
//! any architecture and serve as the reference the other providers are
//! checked against.

use super::batch_norm::{self, Sequential};
use crate::{
    BnParams, ChannelGradients, GradientMode, KernelProvider, RunningStats, SavedStats,
    TrainingOutput,
};
use spatialbn_common::{KernelBackend, Result, SpatialDims};

/// Fallback CPU kernel that works on any architecture
///
/// Always available. Channels and elements are processed in order on the
/// calling thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct FallbackKernel;

impl KernelProvider for FallbackKernel {
    fn name(&self) -> &'static str {
        "fallback"
    }

    fn backend(&self) -> KernelBackend {
        KernelBackend::CpuFallback
    }

    fn is_available(&self) -> bool {
        true
    }

    fn forward_training(
        &self,
        x: &[f32],
        dims: &SpatialDims,
        scale: &[f32],
        bias: &[f32],
        params: &BnParams,
        running: &mut RunningStats,
    ) -> Result<TrainingOutput> {
        batch_norm::forward_training_with(&Sequential, x, dims, scale, bias, params, running)
    }

    fn forward_inference(
        &self,
        x: &[f32],
        dims: &SpatialDims,
        scale: &[f32],
        bias: &[f32],
        estimated: &RunningStats,
        epsilon: f32,
    ) -> Result<Vec<f32>> {
        batch_norm::forward_inference_with(&Sequential, x, dims, scale, bias, estimated, epsilon)
    }

    fn backward(
        &self,
        x: &[f32],
        dims: &SpatialDims,
        scale: &[f32],
        grad_output: &[f32],
        saved: &SavedStats,
        mode: GradientMode,
    ) -> Result<ChannelGradients> {
        batch_norm::backward_with(&Sequential, x, dims, scale, grad_output, saved, mode)
    }
}
