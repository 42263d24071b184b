//! Rayon-backed CPU kernel.
//!
//! Reductions are split by channel; the element-wise phase is split into
//! fixed-size chunks of the output buffer.

use super::batch_norm::{self, Executor};
use crate::{
    BnParams, ChannelGradients, GradientMode, KernelProvider, RunningStats, SavedStats,
    TrainingOutput,
};
use rayon::prelude::*;
use spatialbn_common::{KernelBackend, KernelError, Result, SpatialDims};
use std::sync::Arc;

/// Elements per task in the element-wise phase.
const FILL_CHUNK: usize = 4096;

/// Channel-parallel CPU kernel
///
/// Runs on the global rayon pool unless built with [`ParallelKernel::with_threads`].
#[derive(Debug, Clone, Default)]
pub struct ParallelKernel {
    pool: Option<Arc<rayon::ThreadPool>>,
}

impl ParallelKernel {
    pub fn new() -> Self {
        Self { pool: None }
    }

    /// Use a dedicated pool of `num_threads` workers.
    pub fn with_threads(num_threads: usize) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .thread_name(|i| format!("spatialbn-{i}"))
            .build()
            .map_err(|e| KernelError::ExecutionFailed { reason: e.to_string() })?;
        tracing::debug!(num_threads, "created dedicated kernel thread pool");
        Ok(Self { pool: Some(Arc::new(pool)) })
    }

    /// Worker count of the pool this kernel runs on.
    pub fn num_threads(&self) -> usize {
        match &self.pool {
            Some(pool) => pool.current_num_threads(),
            None => rayon::current_num_threads(),
        }
    }

    fn install<R, F>(&self, f: F) -> R
    where
        R: Send,
        F: FnOnce() -> R + Send,
    {
        match &self.pool {
            Some(pool) => pool.install(f),
            None => f(),
        }
    }
}

struct Rayon;

impl Executor for Rayon {
    fn map_channels<T, F>(&self, channels: usize, f: F) -> Vec<T>
    where
        T: Send,
        F: Fn(usize) -> T + Send + Sync,
    {
        (0..channels).into_par_iter().map(f).collect()
    }

    fn fill<F>(&self, out: &mut [f32], f: F)
    where
        F: Fn(usize) -> f32 + Send + Sync,
    {
        out.par_chunks_mut(FILL_CHUNK).enumerate().for_each(|(chunk, ys)| {
            let base = chunk * FILL_CHUNK;
            for (j, y) in ys.iter_mut().enumerate() {
                *y = f(base + j);
            }
        });
    }
}

impl KernelProvider for ParallelKernel {
    fn name(&self) -> &'static str {
        "parallel"
    }

    fn backend(&self) -> KernelBackend {
        KernelBackend::CpuParallel
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
        self.install(|| {
            batch_norm::forward_training_with(&Rayon, x, dims, scale, bias, params, running)
        })
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
        self.install(|| {
            batch_norm::forward_inference_with(&Rayon, x, dims, scale, bias, estimated, epsilon)
        })
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
        self.install(|| {
            batch_norm::backward_with(&Rayon, x, dims, scale, grad_output, saved, mode)
        })
    }
}
