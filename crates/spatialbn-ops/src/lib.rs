//! SpatialBN operators built from operator definitions
//!
//! ```no_run
//! use spatialbn_common::Tensor;
//! use spatialbn_ops::{Operator, OperatorDef, create_operator};
//!
//! let def = OperatorDef::new("SpatialBN")
//!     .inputs(["X", "scale", "bias", "mean", "var"])
//!     .output("Y")
//!     .arg("is_test", 1);
//! let op = create_operator(&def)?;
//!
//! let x = Tensor::zeros(&[1, 3, 4, 4]);
//! let scale = Tensor::full(&[3], 1.0);
//! let bias = Tensor::zeros(&[3]);
//! let mean = Tensor::zeros(&[3]);
//! let var = Tensor::full(&[3], 1.0);
//! let outputs = op.run(&[&x, &scale, &bias, &mean, &var])?;
//! assert_eq!(outputs.len(), 1);
//! # Ok::<(), spatialbn_common::SpatialBnError>(())
//! ```

pub mod gradient;
pub mod operator;
pub mod operator_def;
pub mod spatial_bn;
pub mod spatial_bn_gradient;
pub mod tags;

pub use gradient::{gradient_name, spatial_bn_gradient_def};
pub use operator::{Operator, create_operator};
pub use operator_def::{Argument, ArgumentValue, FromArgument, OperatorDef};
pub use spatial_bn::{SPATIAL_BN, SpatialBnOp};
pub use spatial_bn_gradient::{SPATIAL_BN_GRADIENT, SpatialBnGradientOp};
pub use tags::{ForwardInput, ForwardOutput, GradientInput, GradientOutput};
