//! The `SpatialBNGradient` operator.

use crate::operator::{Operator, channel_param, check_arity, check_input_count};
use crate::operator_def::OperatorDef;
use crate::spatial_bn::{ARG_EPSILON, ARG_IS_TEST, order_argument};
use crate::tags::{GradientInput, GradientOutput};
use spatialbn_common::{Result, SpatialDims, StorageOrder, Tensor};
use spatialbn_kernels::{BnParams, GradientMode, KernelProvider, SavedStats};
use tracing::debug;

pub const SPATIAL_BN_GRADIENT: &str = "SpatialBNGradient";

/// Validated `SpatialBNGradient` operator.
///
/// With `is_test` set the forward statistics are treated as constants, so
/// the input gradient is a per-channel rescale of `dY`.
#[derive(Debug, Clone)]
pub struct SpatialBnGradientOp {
    name: String,
    is_test: bool,
    epsilon: f32,
    order: StorageOrder,
}

impl SpatialBnGradientOp {
    pub fn new(def: &OperatorDef) -> Result<Self> {
        let is_test: bool = def.get_single_argument(ARG_IS_TEST, false)?;
        let epsilon: f32 = def.get_single_argument(ARG_EPSILON, BnParams::DEFAULT_EPSILON)?;
        let order = order_argument(def)?;

        check_arity(SPATIAL_BN_GRADIENT, "input", GradientInput::COUNT, def.inputs.len())?;
        check_arity(SPATIAL_BN_GRADIENT, "output", GradientOutput::COUNT, def.outputs.len())?;

        debug!(name = %def.name, is_test, epsilon, %order, "constructed SpatialBNGradient");
        Ok(Self { name: def.name.clone(), is_test, epsilon, order })
    }

    pub fn is_test(&self) -> bool {
        self.is_test
    }

    pub fn epsilon(&self) -> f32 {
        self.epsilon
    }

    pub fn order(&self) -> StorageOrder {
        self.order
    }
}

impl Operator for SpatialBnGradientOp {
    fn op_type(&self) -> &'static str {
        SPATIAL_BN_GRADIENT
    }

    fn run_with(&self, provider: &dyn KernelProvider, inputs: &[&Tensor]) -> Result<Vec<Tensor>> {
        check_input_count(SPATIAL_BN_GRADIENT, GradientInput::COUNT, inputs)?;
        let x = inputs[GradientInput::Input.index()];
        let dy = inputs[GradientInput::OutputGrad.index()];
        let dims = SpatialDims::resolve(x.shape(), self.order)?;
        dy.expect_shape(GradientInput::OutputGrad.label(), x.shape())?;

        let param = |tag: GradientInput| channel_param(inputs[tag.index()], tag.label(), dims.channels);
        let scale = param(GradientInput::Scale)?;
        let saved = SavedStats {
            mean: param(GradientInput::SavedMean)?.to_vec(),
            inv_std: param(GradientInput::SavedInvVar)?.to_vec(),
        };

        let _span = tracing::debug_span!(
            "spatial_bn_gradient",
            name = %self.name,
            provider = provider.name(),
            is_test = self.is_test
        )
        .entered();

        let grads = provider.backward(
            x.data(),
            &dims,
            scale,
            dy.data(),
            &saved,
            GradientMode::from_is_test(self.is_test),
        )?;

        Ok(vec![
            Tensor::new(x.shape().to_vec(), grads.input)?,
            Tensor::from_vec(grads.scale),
            Tensor::from_vec(grads.bias),
        ])
    }
}
