//! CPU spatial batch normalization kernels.
//!
//! Forward (training and inference) and backward passes on contiguous
//! `f32` buffers in NCHW or NHWC order. Statistics are reduced per channel
//! over the batch and all spatial positions, accumulating in `f64`.
//!
//! Every pass is split into a per-channel reduction phase and an
//! element-wise phase. Both phases run through an `Executor`, so the
//! sequential and the rayon providers share the same arithmetic.

use spatialbn_common::{ConfigError, Result, ShapeError, SpatialDims};

// ── Parameters ─────────────────────────────────────────────────────

/// Scalar hyper-parameters of the forward pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BnParams {
    /// Added to the variance before taking the square root.
    pub epsilon: f32,
    /// Decay of the running statistics
    /// (`running = momentum * running + (1 - momentum) * batch`).
    pub momentum: f32,
}

impl BnParams {
    pub const DEFAULT_EPSILON: f32 = 1e-5;
    pub const DEFAULT_MOMENTUM: f32 = 0.9;

    pub fn new(epsilon: f32, momentum: f32) -> Result<Self> {
        validate_epsilon(epsilon)?;
        validate_momentum(momentum)?;
        Ok(Self { epsilon, momentum })
    }
}

impl Default for BnParams {
    fn default() -> Self {
        Self { epsilon: Self::DEFAULT_EPSILON, momentum: Self::DEFAULT_MOMENTUM }
    }
}

/// Epsilon must be strictly positive and finite.
pub fn validate_epsilon(epsilon: f32) -> Result<()> {
    if !epsilon.is_finite() || epsilon <= 0.0 {
        return Err(ConfigError::InvalidEpsilon { value: epsilon }.into());
    }
    Ok(())
}

/// Momentum must lie in `[0, 1]`.
pub fn validate_momentum(momentum: f32) -> Result<()> {
    if !momentum.is_finite() || !(0.0..=1.0).contains(&momentum) {
        return Err(ConfigError::InvalidMomentum { value: momentum }.into());
    }
    Ok(())
}

// ── Statistics ─────────────────────────────────────────────────────

/// Running mean/variance carried across training steps.
#[derive(Debug, Clone, PartialEq)]
pub struct RunningStats {
    pub mean: Vec<f32>,
    pub var: Vec<f32>,
}

impl RunningStats {
    /// Zero mean, unit variance.
    pub fn new(channels: usize) -> Self {
        Self { mean: vec![0.0; channels], var: vec![1.0; channels] }
    }

    pub fn from_parts(mean: Vec<f32>, var: Vec<f32>) -> Result<Self> {
        check_channels("var", &var, mean.len())?;
        Ok(Self { mean, var })
    }

    pub fn channels(&self) -> usize {
        self.mean.len()
    }

    /// Blend batch statistics in with the given momentum.
    pub fn update(&mut self, batch_mean: &[f32], batch_var: &[f32], momentum: f32) {
        let keep = momentum as f64;
        let take = 1.0 - keep;
        for (rm, &bm) in self.mean.iter_mut().zip(batch_mean) {
            *rm = (keep * *rm as f64 + take * bm as f64) as f32;
        }
        for (rv, &bv) in self.var.iter_mut().zip(batch_var) {
            *rv = (keep * *rv as f64 + take * bv as f64) as f32;
        }
    }
}

/// Batch statistics saved by the training forward pass for the gradient.
#[derive(Debug, Clone, PartialEq)]
pub struct SavedStats {
    pub mean: Vec<f32>,
    /// `1 / sqrt(var + epsilon)`.
    pub inv_std: Vec<f32>,
}

/// Result of a training forward pass.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingOutput {
    pub output: Vec<f32>,
    pub saved: SavedStats,
    /// Biased batch variance, before epsilon.
    pub batch_var: Vec<f32>,
}

/// Result of a backward pass.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelGradients {
    pub input: Vec<f32>,
    pub scale: Vec<f32>,
    pub bias: Vec<f32>,
}

/// How the statistics used by the forward pass depend on the input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GradientMode {
    /// Statistics were computed from the batch and are differentiated through.
    Training,
    /// Statistics were fixed estimates and are treated as constants.
    Inference,
}

impl GradientMode {
    pub fn from_is_test(is_test: bool) -> Self {
        if is_test { GradientMode::Inference } else { GradientMode::Training }
    }
}

// ── Execution strategy ─────────────────────────────────────────────

/// Runs the two phases of a pass.
pub(crate) trait Executor {
    /// Evaluate `f` for every channel index.
    fn map_channels<T, F>(&self, channels: usize, f: F) -> Vec<T>
    where
        T: Send,
        F: Fn(usize) -> T + Send + Sync;

    /// Set `out[i] = f(i)` for every element.
    fn fill<F>(&self, out: &mut [f32], f: F)
    where
        F: Fn(usize) -> f32 + Send + Sync;
}

/// Single-threaded executor.
pub(crate) struct Sequential;

impl Executor for Sequential {
    fn map_channels<T, F>(&self, channels: usize, f: F) -> Vec<T>
    where
        T: Send,
        F: Fn(usize) -> T + Send + Sync,
    {
        (0..channels).map(f).collect()
    }

    fn fill<F>(&self, out: &mut [f32], f: F)
    where
        F: Fn(usize) -> f32 + Send + Sync,
    {
        for (i, y) in out.iter_mut().enumerate() {
            *y = f(i);
        }
    }
}

// ── Per-channel arithmetic ─────────────────────────────────────────

/// Two-pass mean and biased variance of channel `c`.
fn channel_moments(x: &[f32], dims: &SpatialDims, c: usize) -> (f64, f64) {
    let count = dims.reduce_size() as f64;
    let mean = dims.channel_offsets(c).map(|i| x[i] as f64).sum::<f64>() / count;
    let var = dims
        .channel_offsets(c)
        .map(|i| {
            let d = x[i] as f64 - mean;
            d * d
        })
        .sum::<f64>()
        / count;
    (mean, var)
}

/// `y = x * alpha + beta` for one channel.
#[derive(Debug, Clone, Copy)]
struct Affine {
    alpha: f64,
    beta: f64,
}

impl Affine {
    fn fold(scale: f32, bias: f32, mean: f64, inv_std: f64) -> Self {
        let alpha = scale as f64 * inv_std;
        Self { alpha, beta: bias as f64 - mean * alpha }
    }

    #[inline]
    fn apply(&self, x: f32) -> f32 {
        (x as f64 * self.alpha + self.beta) as f32
    }
}

/// Coefficients of the input gradient for one channel.
///
/// `dx = gain * (dy - mean_dy - x_hat * mean_dy_xhat)`; in inference mode
/// both means are zero.
#[derive(Debug, Clone, Copy)]
struct InputGrad {
    mean: f64,
    inv_std: f64,
    gain: f64,
    mean_dy: f64,
    mean_dy_xhat: f64,
}

impl InputGrad {
    #[inline]
    fn apply(&self, x: f32, dy: f32) -> f32 {
        let x_hat = (x as f64 - self.mean) * self.inv_std;
        (self.gain * (dy as f64 - self.mean_dy - x_hat * self.mean_dy_xhat)) as f32
    }
}

fn inv_std(var: f64, epsilon: f32) -> f64 {
    1.0 / (var + epsilon as f64).sqrt()
}

// ── Passes, generic over the executor ──────────────────────────────

pub(crate) fn forward_training_with<E: Executor>(
    exec: &E,
    x: &[f32],
    dims: &SpatialDims,
    scale: &[f32],
    bias: &[f32],
    params: &BnParams,
    running: &mut RunningStats,
) -> Result<TrainingOutput> {
    validate_epsilon(params.epsilon)?;
    validate_momentum(params.momentum)?;
    check_input(x, dims)?;
    check_channels("scale", scale, dims.channels)?;
    check_channels("bias", bias, dims.channels)?;
    check_channels("running_mean", &running.mean, dims.channels)?;
    check_channels("running_var", &running.var, dims.channels)?;

    let moments = exec.map_channels(dims.channels, |c| channel_moments(x, dims, c));
    let affine: Vec<Affine> = moments
        .iter()
        .enumerate()
        .map(|(c, &(mean, var))| Affine::fold(scale[c], bias[c], mean, inv_std(var, params.epsilon)))
        .collect();

    let mut output = vec![0.0f32; x.len()];
    exec.fill(&mut output, |i| affine[dims.channel_of(i)].apply(x[i]));

    let mean: Vec<f32> = moments.iter().map(|&(m, _)| m as f32).collect();
    let batch_var: Vec<f32> = moments.iter().map(|&(_, v)| v as f32).collect();
    let inv_std: Vec<f32> =
        moments.iter().map(|&(_, v)| inv_std(v, params.epsilon) as f32).collect();

    running.update(&mean, &batch_var, params.momentum);

    Ok(TrainingOutput { output, saved: SavedStats { mean, inv_std }, batch_var })
}

pub(crate) fn forward_inference_with<E: Executor>(
    exec: &E,
    x: &[f32],
    dims: &SpatialDims,
    scale: &[f32],
    bias: &[f32],
    estimated: &RunningStats,
    epsilon: f32,
) -> Result<Vec<f32>> {
    validate_epsilon(epsilon)?;
    check_input(x, dims)?;
    check_channels("scale", scale, dims.channels)?;
    check_channels("bias", bias, dims.channels)?;
    check_channels("estimated_mean", &estimated.mean, dims.channels)?;
    check_channels("estimated_var", &estimated.var, dims.channels)?;

    let affine: Vec<Affine> = (0..dims.channels)
        .map(|c| {
            let mean = estimated.mean[c] as f64;
            Affine::fold(scale[c], bias[c], mean, inv_std(estimated.var[c] as f64, epsilon))
        })
        .collect();

    let mut output = vec![0.0f32; x.len()];
    exec.fill(&mut output, |i| affine[dims.channel_of(i)].apply(x[i]));
    Ok(output)
}

pub(crate) fn backward_with<E: Executor>(
    exec: &E,
    x: &[f32],
    dims: &SpatialDims,
    scale: &[f32],
    grad_output: &[f32],
    saved: &SavedStats,
    mode: GradientMode,
) -> Result<ChannelGradients> {
    check_input(x, dims)?;
    check_input(grad_output, dims)?;
    check_channels("scale", scale, dims.channels)?;
    check_channels("saved_mean", &saved.mean, dims.channels)?;
    check_channels("saved_inv_std", &saved.inv_std, dims.channels)?;

    // (sum dy, sum dy * x_hat) per channel.
    let sums = exec.map_channels(dims.channels, |c| {
        let mean = saved.mean[c] as f64;
        let inv_std = saved.inv_std[c] as f64;
        dims.channel_offsets(c).fold((0.0f64, 0.0f64), |(dy_sum, dy_xhat_sum), i| {
            let dy = grad_output[i] as f64;
            let x_hat = (x[i] as f64 - mean) * inv_std;
            (dy_sum + dy, dy_xhat_sum + dy * x_hat)
        })
    });

    let count = dims.reduce_size() as f64;
    let coeffs: Vec<InputGrad> = sums
        .iter()
        .enumerate()
        .map(|(c, &(dy_sum, dy_xhat_sum))| {
            let inv_std = saved.inv_std[c] as f64;
            let (mean_dy, mean_dy_xhat) = match mode {
                GradientMode::Training => (dy_sum / count, dy_xhat_sum / count),
                GradientMode::Inference => (0.0, 0.0),
            };
            InputGrad {
                mean: saved.mean[c] as f64,
                inv_std,
                gain: scale[c] as f64 * inv_std,
                mean_dy,
                mean_dy_xhat,
            }
        })
        .collect();

    let mut input = vec![0.0f32; x.len()];
    exec.fill(&mut input, |i| coeffs[dims.channel_of(i)].apply(x[i], grad_output[i]));

    Ok(ChannelGradients {
        input,
        scale: sums.iter().map(|&(_, s)| s as f32).collect(),
        bias: sums.iter().map(|&(s, _)| s as f32).collect(),
    })
}

// ── Public sequential entry points ─────────────────────────────────

/// Per-channel mean and biased variance of `x`.
pub fn compute_batch_stats(x: &[f32], dims: &SpatialDims) -> Result<(Vec<f32>, Vec<f32>)> {
    check_input(x, dims)?;
    let moments = Sequential.map_channels(dims.channels, |c| channel_moments(x, dims, c));
    Ok((
        moments.iter().map(|&(m, _)| m as f32).collect(),
        moments.iter().map(|&(_, v)| v as f32).collect(),
    ))
}

/// Training forward pass.
///
/// Normalizes with batch statistics, updates `running` in place and
/// returns the output together with the saved mean and inverse std.
pub fn spatial_bn_forward_training(
    x: &[f32],
    dims: &SpatialDims,
    scale: &[f32],
    bias: &[f32],
    params: &BnParams,
    running: &mut RunningStats,
) -> Result<TrainingOutput> {
    forward_training_with(&Sequential, x, dims, scale, bias, params, running)
}

/// Inference forward pass using estimated statistics.
pub fn spatial_bn_forward_inference(
    x: &[f32],
    dims: &SpatialDims,
    scale: &[f32],
    bias: &[f32],
    estimated: &RunningStats,
    epsilon: f32,
) -> Result<Vec<f32>> {
    forward_inference_with(&Sequential, x, dims, scale, bias, estimated, epsilon)
}

/// Backward pass.
pub fn spatial_bn_backward(
    x: &[f32],
    dims: &SpatialDims,
    scale: &[f32],
    grad_output: &[f32],
    saved: &SavedStats,
    mode: GradientMode,
) -> Result<ChannelGradients> {
    backward_with(&Sequential, x, dims, scale, grad_output, saved, mode)
}

// ── Internal helpers ───────────────────────────────────────────────

fn check_input(data: &[f32], dims: &SpatialDims) -> Result<()> {
    if data.is_empty() {
        return Err(ShapeError::EmptyInput.into());
    }
    if data.len() != dims.numel() {
        return Err(ShapeError::DataLength { expected: dims.numel(), actual: data.len() }.into());
    }
    Ok(())
}

fn check_channels(name: &str, param: &[f32], channels: usize) -> Result<()> {
    if param.len() != channels {
        return Err(ShapeError::ParamLength {
            name: name.to_string(),
            expected: channels,
            actual: param.len(),
        }
        .into());
    }
    Ok(())
}

// ── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use spatialbn_common::{SpatialBnError, StorageOrder};

    const TOL: f32 = 1e-5;

    fn approx_eq(a: &[f32], b: &[f32], tol: f32) -> bool {
        a.len() == b.len() && a.iter().zip(b).all(|(x, y)| (x - y).abs() <= tol)
    }

    // N=2, C=2, S=2. Channel 0 holds 1..=4, channel 1 holds 10..=40.
    fn nchw_fixture() -> (Vec<f32>, SpatialDims) {
        let x = vec![1.0, 2.0, 10.0, 20.0, 3.0, 4.0, 30.0, 40.0];
        (x, SpatialDims::resolve(&[2, 2, 2], StorageOrder::Nchw).unwrap())
    }

    fn nhwc_fixture() -> (Vec<f32>, SpatialDims) {
        let x = vec![1.0, 10.0, 2.0, 20.0, 3.0, 30.0, 4.0, 40.0];
        (x, SpatialDims::resolve(&[2, 2, 2], StorageOrder::Nhwc).unwrap())
    }

    fn train(x: &[f32], dims: &SpatialDims, momentum: f32) -> (TrainingOutput, RunningStats) {
        let mut running = RunningStats::new(dims.channels);
        let params = BnParams { momentum, ..BnParams::default() };
        let out = spatial_bn_forward_training(
            x,
            dims,
            &vec![1.0; dims.channels],
            &vec![0.0; dims.channels],
            &params,
            &mut running,
        )
        .unwrap();
        (out, running)
    }

    // ── Params ─────────────────────────────────────────────

    #[test]
    fn params_default() {
        let p = BnParams::default();
        assert!((p.epsilon - 1e-5).abs() < 1e-12);
        assert!((p.momentum - 0.9).abs() < 1e-7);
    }

    #[test]
    fn params_reject_bad_values() {
        assert!(BnParams::new(0.0, 0.9).is_err());
        assert!(BnParams::new(-1e-5, 0.9).is_err());
        assert!(BnParams::new(f32::NAN, 0.9).is_err());
        assert!(BnParams::new(1e-5, -0.1).is_err());
        assert!(BnParams::new(1e-5, 1.1).is_err());
        assert!(BnParams::new(1e-5, 0.0).is_ok());
        assert!(BnParams::new(1e-5, 1.0).is_ok());
    }

    // ── Batch statistics ───────────────────────────────────

    #[test]
    fn batch_stats_nchw() {
        let (x, dims) = nchw_fixture();
        let (mean, var) = compute_batch_stats(&x, &dims).unwrap();
        assert!(approx_eq(&mean, &[2.5, 25.0], TOL));
        assert!(approx_eq(&var, &[1.25, 125.0], 1e-4));
    }

    #[test]
    fn batch_stats_layouts_agree() {
        let (x1, d1) = nchw_fixture();
        let (x2, d2) = nhwc_fixture();
        assert_eq!(compute_batch_stats(&x1, &d1).unwrap(), compute_batch_stats(&x2, &d2).unwrap());
    }

    #[test]
    fn batch_stats_uniform_has_zero_var() {
        let dims = SpatialDims::resolve(&[3, 2, 4], StorageOrder::Nchw).unwrap();
        let (_, var) = compute_batch_stats(&[5.0; 24], &dims).unwrap();
        assert!(var.iter().all(|v| v.abs() < TOL));
    }

    // ── Forward (training) ─────────────────────────────────

    #[test]
    fn training_output_is_normalized() {
        let (x, dims) = nchw_fixture();
        let (out, _) = train(&x, &dims, 0.9);
        for c in 0..2 {
            let vals: Vec<f32> = dims.channel_offsets(c).map(|i| out.output[i]).collect();
            let mean = vals.iter().sum::<f32>() / vals.len() as f32;
            let var = vals.iter().map(|v| (v - mean).powi(2)).sum::<f32>() / vals.len() as f32;
            assert!(mean.abs() < TOL, "channel {c} mean {mean}");
            assert!((var - 1.0).abs() < 1e-4, "channel {c} var {var}");
        }
    }

    #[test]
    fn training_saves_mean_and_inv_std() {
        let (x, dims) = nchw_fixture();
        let (out, _) = train(&x, &dims, 0.9);
        assert!(approx_eq(&out.saved.mean, &[2.5, 25.0], TOL));
        let expected = [1.0 / (1.25f32 + 1e-5).sqrt(), 1.0 / (125.0f32 + 1e-5).sqrt()];
        assert!(approx_eq(&out.saved.inv_std, &expected, 1e-5));
        assert!(approx_eq(&out.batch_var, &[1.25, 125.0], 1e-4));
    }

    #[test]
    fn training_applies_scale_and_bias() {
        let (x, dims) = nchw_fixture();
        let mut running = RunningStats::new(2);
        let out = spatial_bn_forward_training(
            &x,
            &dims,
            &[2.0, 0.5],
            &[1.0, -1.0],
            &BnParams::default(),
            &mut running,
        )
        .unwrap();
        let (plain, _) = train(&x, &dims, 0.9);
        for i in 0..x.len() {
            let c = dims.channel_of(i);
            let expected = [2.0, 0.5][c] * plain.output[i] + [1.0, -1.0][c];
            assert!((out.output[i] - expected).abs() < 1e-5);
        }
    }

    #[test]
    fn training_layouts_agree() {
        let (x1, d1) = nchw_fixture();
        let (x2, d2) = nhwc_fixture();
        let (o1, r1) = train(&x1, &d1, 0.9);
        let (o2, r2) = train(&x2, &d2, 0.9);
        assert_eq!(o1.saved, o2.saved);
        assert_eq!(r1, r2);
        // Same logical element (n, c, s) in both layouts.
        for n in 0..2 {
            for c in 0..2 {
                for s in 0..2 {
                    let a = o1.output[d1.offset(n, c, s)];
                    let b = o2.output[d2.offset(n, c, s)];
                    assert!((a - b).abs() < TOL);
                }
            }
        }
    }

    // ── Running stats ──────────────────────────────────────

    #[test]
    fn running_stats_update() {
        let (x, dims) = nchw_fixture();
        let (_, running) = train(&x, &dims, 0.9);
        // 0.9 * 0 + 0.1 * batch_mean, 0.9 * 1 + 0.1 * batch_var
        assert!(approx_eq(&running.mean, &[0.25, 2.5], TOL));
        assert!(approx_eq(&running.var, &[1.025, 13.4], 1e-4));
    }

    #[test]
    fn full_momentum_preserves_running_stats() {
        let (x, dims) = nchw_fixture();
        let (_, running) = train(&x, &dims, 1.0);
        assert_eq!(running, RunningStats::new(2));
    }

    #[test]
    fn zero_momentum_uses_batch_stats() {
        let (x, dims) = nchw_fixture();
        let (out, running) = train(&x, &dims, 0.0);
        assert!(approx_eq(&running.mean, &out.saved.mean, TOL));
        assert!(approx_eq(&running.var, &out.batch_var, TOL));
    }

    // ── Inference ──────────────────────────────────────────

    #[test]
    fn inference_uses_estimates() {
        let (x, dims) = nchw_fixture();
        let est = RunningStats::from_parts(vec![2.0, 20.0], vec![4.0, 100.0]).unwrap();
        let out =
            spatial_bn_forward_inference(&x, &dims, &[1.0, 2.0], &[0.5, 0.0], &est, 1e-5).unwrap();
        for i in 0..x.len() {
            let c = dims.channel_of(i);
            let expected = [1.0f32, 2.0][c] * (x[i] - est.mean[c]) / (est.var[c] + 1e-5).sqrt()
                + [0.5f32, 0.0][c];
            assert!((out[i] - expected).abs() < 1e-5, "element {i}");
        }
    }

    #[test]
    fn inference_identity_with_unit_estimates() {
        let (x, dims) = nchw_fixture();
        let est = RunningStats::new(2);
        let out = spatial_bn_forward_inference(&x, &dims, &[1.0; 2], &[0.0; 2], &est, 1e-5).unwrap();
        assert!(approx_eq(&out, &x, 1e-3));
    }

    #[test]
    fn training_and_inference_differ() {
        let (x, dims) = nchw_fixture();
        let (t, _) = train(&x, &dims, 0.9);
        let i = spatial_bn_forward_inference(
            &x,
            &dims,
            &[1.0; 2],
            &[0.0; 2],
            &RunningStats::new(2),
            1e-5,
        )
        .unwrap();
        assert!(!approx_eq(&t.output, &i, TOL));
    }

    // ── Backward ───────────────────────────────────────────

    fn loss(x: &[f32], dims: &SpatialDims, scale: &[f32], weights: &[f32]) -> f64 {
        let mut running = RunningStats::new(dims.channels);
        let out = spatial_bn_forward_training(
            x,
            dims,
            scale,
            &vec![0.0; dims.channels],
            &BnParams::default(),
            &mut running,
        )
        .unwrap();
        out.output.iter().zip(weights).map(|(&y, &w)| y as f64 * w as f64).sum()
    }

    #[test]
    fn backward_bias_grad_is_sum_of_grad_output() {
        let (x, dims) = nchw_fixture();
        let (out, _) = train(&x, &dims, 0.9);
        let dy: Vec<f32> = (0..8).map(|i| 0.1 * (i + 1) as f32).collect();
        let grads =
            spatial_bn_backward(&x, &dims, &[1.0; 2], &dy, &out.saved, GradientMode::Training)
                .unwrap();
        // channel 0 offsets: 0, 1, 4, 5
        let gb0 = 0.1 + 0.2 + 0.5 + 0.6;
        let gb1 = 0.3 + 0.4 + 0.7 + 0.8;
        assert!(approx_eq(&grads.bias, &[gb0, gb1], 1e-5));
    }

    #[test]
    fn backward_scale_grad_matches_definition() {
        let (x, dims) = nchw_fixture();
        let (out, _) = train(&x, &dims, 0.9);
        let dy: Vec<f32> = (0..8).map(|i| (i as f32 * 0.7).sin()).collect();
        let grads =
            spatial_bn_backward(&x, &dims, &[1.0; 2], &dy, &out.saved, GradientMode::Training)
                .unwrap();
        for c in 0..2 {
            let expected: f32 = dims.channel_offsets(c).map(|i| dy[i] * out.output[i]).sum();
            assert!((grads.scale[c] - expected).abs() < 1e-4);
        }
    }

    #[test]
    fn backward_matches_finite_differences() {
        let (x, dims) = nhwc_fixture();
        // Keep channel 1 on a similar scale so the step size suits both.
        let x: Vec<f32> =
            x.iter().enumerate().map(|(i, &v)| if i % 2 == 1 { v / 10.0 + 0.3 } else { v }).collect();
        let scale = [1.5, 0.8];
        let weights: Vec<f32> = (0..8).map(|i| 0.25 * (i as f32) - 0.6).collect();

        let mut running = RunningStats::new(2);
        let out = spatial_bn_forward_training(
            &x,
            &dims,
            &scale,
            &[0.0; 2],
            &BnParams::default(),
            &mut running,
        )
        .unwrap();
        let grads =
            spatial_bn_backward(&x, &dims, &scale, &weights, &out.saved, GradientMode::Training)
                .unwrap();

        let h = 1e-2f32;
        for i in 0..x.len() {
            let mut plus = x.clone();
            let mut minus = x.clone();
            plus[i] += h;
            minus[i] -= h;
            let numerical = (loss(&plus, &dims, &scale, &weights)
                - loss(&minus, &dims, &scale, &weights))
                / (2.0 * h as f64);
            assert!(
                (grads.input[i] as f64 - numerical).abs() < 1e-2,
                "dX[{i}]: analytic={}, numerical={numerical}",
                grads.input[i]
            );
        }
    }

    #[test]
    fn backward_zero_grad_output_gives_zero_grads() {
        let (x, dims) = nchw_fixture();
        let (out, _) = train(&x, &dims, 0.9);
        let g = spatial_bn_backward(&x, &dims, &[1.0; 2], &[0.0; 8], &out.saved, GradientMode::Training)
            .unwrap();
        assert!(g.input.iter().chain(&g.scale).chain(&g.bias).all(|v| v.abs() < TOL));
    }

    #[test]
    fn inference_mode_gradient_is_scaled_grad_output() {
        let (x, dims) = nchw_fixture();
        let saved = SavedStats { mean: vec![1.0, 2.0], inv_std: vec![0.5, 0.25] };
        let dy = vec![1.0; 8];
        let g = spatial_bn_backward(&x, &dims, &[2.0, 4.0], &dy, &saved, GradientMode::Inference)
            .unwrap();
        for i in 0..8 {
            // scale * inv_std = 1.0 for both channels
            assert!((g.input[i] - 1.0).abs() < TOL);
        }
    }

    #[test]
    fn gradient_mode_from_flag() {
        assert_eq!(GradientMode::from_is_test(true), GradientMode::Inference);
        assert_eq!(GradientMode::from_is_test(false), GradientMode::Training);
    }

    // ── Error cases ────────────────────────────────────────

    #[test]
    fn scale_length_mismatch() {
        let (x, dims) = nchw_fixture();
        let mut running = RunningStats::new(2);
        let err = spatial_bn_forward_training(
            &x,
            &dims,
            &[1.0],
            &[0.0; 2],
            &BnParams::default(),
            &mut running,
        )
        .unwrap_err();
        assert!(matches!(err, SpatialBnError::Shape(ShapeError::ParamLength { .. })));
    }

    #[test]
    fn input_length_mismatch() {
        let (_, dims) = nchw_fixture();
        let err = compute_batch_stats(&[1.0; 7], &dims).unwrap_err();
        assert!(matches!(err, SpatialBnError::Shape(ShapeError::DataLength { .. })));
    }

    #[test]
    fn grad_output_length_mismatch() {
        let (x, dims) = nchw_fixture();
        let (out, _) = train(&x, &dims, 0.9);
        assert!(
            spatial_bn_backward(&x, &dims, &[1.0; 2], &[0.0; 6], &out.saved, GradientMode::Training)
                .is_err()
        );
    }

    #[test]
    fn running_stats_length_mismatch() {
        assert!(RunningStats::from_parts(vec![0.0; 2], vec![1.0; 3]).is_err());
        let (x, dims) = nchw_fixture();
        let mut running = RunningStats::new(3);
        assert!(
            spatial_bn_forward_training(
                &x,
                &dims,
                &[1.0; 2],
                &[0.0; 2],
                &BnParams::default(),
                &mut running,
            )
            .is_err()
        );
    }

    #[test]
    fn invalid_epsilon_rejected_at_run() {
        let (x, dims) = nchw_fixture();
        let err = spatial_bn_forward_inference(
            &x,
            &dims,
            &[1.0; 2],
            &[0.0; 2],
            &RunningStats::new(2),
            0.0,
        )
        .unwrap_err();
        assert!(err.is_config());
    }

    // ── Numerical stability ────────────────────────────────

    #[test]
    fn large_offset_stays_finite() {
        let dims = SpatialDims::resolve(&[2, 2, 2], StorageOrder::Nchw).unwrap();
        let x = vec![1e6, 1e6 + 1.0, 1e10, -1e10, 1e6, 1e6 + 1.0, 0.0, 1e-10];
        let (out, running) = train(&x, &dims, 0.9);
        for v in out.output.iter().chain(&running.mean).chain(&running.var) {
            assert!(v.is_finite());
        }
    }
}
