//! The `SpatialBN` forward operator.
//!
//! In training mode (`is_test == 0`) the operator normalizes with batch
//! statistics, folds them into the running estimates passed as inputs and
//! returns five outputs. In test mode it normalizes with the estimates and
//! returns only `Y`.

use crate::operator::{Operator, channel_param, check_arity, check_input_count};
use crate::operator_def::OperatorDef;
use crate::tags::{ForwardInput, ForwardOutput};
use spatialbn_common::{Result, SpatialDims, StorageOrder, Tensor};
use spatialbn_kernels::{BnParams, KernelProvider, RunningStats, SavedStats};
use tracing::debug;

pub const SPATIAL_BN: &str = "SpatialBN";

pub const ARG_IS_TEST: &str = "is_test";
pub const ARG_EPSILON: &str = "epsilon";
pub const ARG_MOMENTUM: &str = "momentum";
pub const ARG_ORDER: &str = "order";

/// Read the `order` argument, defaulting to NCHW.
pub(crate) fn order_argument(def: &OperatorDef) -> Result<StorageOrder> {
    let raw: String = def.get_single_argument(ARG_ORDER, StorageOrder::Nchw.to_string())?;
    Ok(raw.parse()?)
}

/// Validated `SpatialBN` operator.
#[derive(Debug, Clone)]
pub struct SpatialBnOp {
    name: String,
    is_test: bool,
    params: BnParams,
    order: StorageOrder,
}

impl SpatialBnOp {
    pub fn new(def: &OperatorDef) -> Result<Self> {
        let is_test: bool = def.get_single_argument(ARG_IS_TEST, false)?;
        let epsilon: f32 = def.get_single_argument(ARG_EPSILON, BnParams::DEFAULT_EPSILON)?;
        let momentum: f32 = def.get_single_argument(ARG_MOMENTUM, BnParams::DEFAULT_MOMENTUM)?;
        let order = order_argument(def)?;

        let expected_outputs = if is_test { 1 } else { ForwardOutput::COUNT };
        check_arity(SPATIAL_BN, "output", expected_outputs, def.outputs.len())?;
        check_arity(SPATIAL_BN, "input", ForwardInput::COUNT, def.inputs.len())?;
        let params = BnParams::new(epsilon, momentum)?;

        debug!(name = %def.name, is_test, epsilon, momentum, %order, "constructed SpatialBN");
        Ok(Self { name: def.name.clone(), is_test, params, order })
    }

    pub fn is_test(&self) -> bool {
        self.is_test
    }

    pub fn epsilon(&self) -> f32 {
        self.params.epsilon
    }

    pub fn momentum(&self) -> f32 {
        self.params.momentum
    }

    pub fn order(&self) -> StorageOrder {
        self.order
    }

    /// Number of outputs `run` produces in the configured mode.
    pub fn num_outputs(&self) -> usize {
        if self.is_test { 1 } else { ForwardOutput::COUNT }
    }

    /// One training step: normalize `x` and fold its statistics into `running`.
    pub fn train_step(
        &self,
        provider: &dyn KernelProvider,
        x: &Tensor,
        scale: &Tensor,
        bias: &Tensor,
        running: &mut RunningStats,
    ) -> Result<(Tensor, SavedStats)> {
        let dims = SpatialDims::resolve(x.shape(), self.order)?;
        let scale = channel_param(scale, ForwardInput::Scale.label(), dims.channels)?;
        let bias = channel_param(bias, ForwardInput::Bias.label(), dims.channels)?;

        let out =
            provider.forward_training(x.data(), &dims, scale, bias, &self.params, running)?;
        Ok((Tensor::new(x.shape().to_vec(), out.output)?, out.saved))
    }

    /// Normalize `x` with fixed estimates.
    pub fn infer(
        &self,
        provider: &dyn KernelProvider,
        x: &Tensor,
        scale: &Tensor,
        bias: &Tensor,
        estimated: &RunningStats,
    ) -> Result<Tensor> {
        let dims = SpatialDims::resolve(x.shape(), self.order)?;
        let scale = channel_param(scale, ForwardInput::Scale.label(), dims.channels)?;
        let bias = channel_param(bias, ForwardInput::Bias.label(), dims.channels)?;

        let y = provider.forward_inference(
            x.data(),
            &dims,
            scale,
            bias,
            estimated,
            self.params.epsilon,
        )?;
        Tensor::new(x.shape().to_vec(), y)
    }
}

impl Operator for SpatialBnOp {
    fn op_type(&self) -> &'static str {
        SPATIAL_BN
    }

    fn run_with(&self, provider: &dyn KernelProvider, inputs: &[&Tensor]) -> Result<Vec<Tensor>> {
        check_input_count(SPATIAL_BN, ForwardInput::COUNT, inputs)?;
        let x = inputs[ForwardInput::Input.index()];
        let dims = SpatialDims::resolve(x.shape(), self.order)?;
        let channels = dims.channels;

        let mean = inputs[ForwardInput::EstMean.index()];
        let var = inputs[ForwardInput::EstVar.index()];
        let mean = channel_param(mean, ForwardInput::EstMean.label(), channels)?;
        let var = channel_param(var, ForwardInput::EstVar.label(), channels)?;
        let mut stats = RunningStats::from_parts(mean.to_vec(), var.to_vec())?;

        let scale = inputs[ForwardInput::Scale.index()];
        let bias = inputs[ForwardInput::Bias.index()];

        let _span = tracing::debug_span!(
            "spatial_bn",
            name = %self.name,
            provider = provider.name(),
            is_test = self.is_test
        )
        .entered();

        if self.is_test {
            return Ok(vec![self.infer(provider, x, scale, bias, &stats)?]);
        }

        let (y, saved) = self.train_step(provider, x, scale, bias, &mut stats)?;
        Ok(vec![
            y,
            Tensor::from_vec(stats.mean),
            Tensor::from_vec(stats.var),
            Tensor::from_vec(saved.mean),
            Tensor::from_vec(saved.inv_std),
        ])
    }
}
