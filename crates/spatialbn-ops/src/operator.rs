//! Operator trait and construction from definitions.

use crate::operator_def::OperatorDef;
use crate::spatial_bn::{SPATIAL_BN, SpatialBnOp};
use crate::spatial_bn_gradient::{SPATIAL_BN_GRADIENT, SpatialBnGradientOp};
use spatialbn_common::{ConfigError, Result, ShapeError, Tensor};
use spatialbn_kernels::{KernelManager, KernelProvider};

/// A constructed, validated operator.
///
/// Inputs and outputs are positional; see [`crate::tags`] for the slot
/// order of each operator.
pub trait Operator: Send + Sync + std::fmt::Debug {
    fn op_type(&self) -> &'static str;

    /// Run on an explicit kernel provider.
    fn run_with(&self, provider: &dyn KernelProvider, inputs: &[&Tensor]) -> Result<Vec<Tensor>>;

    /// Run on the process-wide kernel manager's selected provider.
    fn run(&self, inputs: &[&Tensor]) -> Result<Vec<Tensor>> {
        let provider = KernelManager::global().select_best()?;
        self.run_with(provider, inputs)
    }
}

/// Build the operator named by `def.op_type`.
pub fn create_operator(def: &OperatorDef) -> Result<Box<dyn Operator>> {
    match def.op_type.as_str() {
        SPATIAL_BN => Ok(Box::new(SpatialBnOp::new(def)?)),
        SPATIAL_BN_GRADIENT => Ok(Box::new(SpatialBnGradientOp::new(def)?)),
        other => Err(ConfigError::UnknownOperator { op_type: other.to_string() }.into()),
    }
}

pub(crate) fn check_arity(
    op: &str,
    slot: &'static str,
    expected: usize,
    actual: usize,
) -> Result<()> {
    if expected != actual {
        return Err(ConfigError::InvalidArity {
            op: op.to_string(),
            slot,
            expected: expected.to_string(),
            actual,
        }
        .into());
    }
    Ok(())
}

pub(crate) fn check_input_count(op: &str, expected: usize, inputs: &[&Tensor]) -> Result<()> {
    if inputs.len() != expected {
        return Err(ShapeError::InputCount {
            op: op.to_string(),
            expected,
            actual: inputs.len(),
        }
        .into());
    }
    Ok(())
}

/// Borrow a per-channel parameter, which must be shaped `[channels]`.
pub(crate) fn channel_param<'a>(
    tensor: &'a Tensor,
    name: &str,
    channels: usize,
) -> Result<&'a [f32]> {
    tensor.expect_shape(name, &[channels])?;
    Ok(tensor.data())
}
