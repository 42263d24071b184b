//! Gradient operator definitions for `SpatialBN`.
//!
//! Only the blob wiring is produced here; nothing records or replays a
//! graph.

use crate::operator_def::OperatorDef;
use crate::spatial_bn::{ARG_EPSILON, ARG_IS_TEST, ARG_ORDER, SPATIAL_BN, SpatialBnOp};
use crate::spatial_bn_gradient::SPATIAL_BN_GRADIENT;
use crate::tags::{ForwardInput, ForwardOutput};
use spatialbn_common::{ConfigError, Result};

pub const GRADIENT_SUFFIX: &str = "_grad";

/// Name of the gradient blob for `blob`.
pub fn gradient_name(blob: &str) -> String {
    format!("{blob}{GRADIENT_SUFFIX}")
}

/// Build the `SpatialBNGradient` definition for a training-mode forward
/// definition.
///
/// Inputs are `[X, scale, grad(Y), saved_mean, saved_inv_var]` and outputs
/// `[grad(X), grad(scale), grad(bias)]`. `epsilon`, `order` and `is_test`
/// are carried over when the forward definition sets them.
pub fn spatial_bn_gradient_def(forward: &OperatorDef) -> Result<OperatorDef> {
    if forward.op_type != SPATIAL_BN {
        return Err(ConfigError::InvalidValue {
            key: "type".to_string(),
            reason: format!("expected {SPATIAL_BN}, got {}", forward.op_type),
        }
        .into());
    }

    let op = SpatialBnOp::new(forward)?;
    if op.is_test() {
        return Err(ConfigError::InvalidValue {
            key: ARG_IS_TEST.to_string(),
            reason: "test-mode SpatialBN has no saved statistics to differentiate".to_string(),
        }
        .into());
    }

    let input = |tag: ForwardInput| forward.inputs[tag.index()].as_str();
    let output = |tag: ForwardOutput| forward.outputs[tag.index()].as_str();

    let mut grad = OperatorDef::new(SPATIAL_BN_GRADIENT)
        .inputs([
            input(ForwardInput::Input).to_string(),
            input(ForwardInput::Scale).to_string(),
            gradient_name(output(ForwardOutput::Output)),
            output(ForwardOutput::SavedMean).to_string(),
            output(ForwardOutput::SavedInvVar).to_string(),
        ])
        .outputs([
            gradient_name(input(ForwardInput::Input)),
            gradient_name(input(ForwardInput::Scale)),
            gradient_name(input(ForwardInput::Bias)),
        ]);
    if !forward.name.is_empty() {
        grad.name = gradient_name(&forward.name);
    }

    for key in [ARG_EPSILON, ARG_ORDER, ARG_IS_TEST] {
        if let Some(value) = forward.argument(key) {
            grad = grad.arg(key, value.clone());
        }
    }

    tracing::debug!(forward = %forward.name, "built SpatialBNGradient definition");
    Ok(grad)
}
