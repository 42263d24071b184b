//! Dense `f32` tensor container

use crate::{Result, ShapeError, SpatialBnError};
use serde::{Deserialize, Serialize};

/// Row-major dense tensor.
///
/// The element count always equals the product of `shape`; this is checked
/// on construction and on deserialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "TensorRepr")]
pub struct Tensor {
    shape: Vec<usize>,
    data: Vec<f32>,
}

#[derive(Deserialize)]
struct TensorRepr {
    shape: Vec<usize>,
    data: Vec<f32>,
}

impl TryFrom<TensorRepr> for Tensor {
    type Error = SpatialBnError;

    fn try_from(repr: TensorRepr) -> Result<Self> {
        Tensor::new(repr.shape, repr.data)
    }
}

/// Element count of `shape`, or `None` if the product overflows `usize`.
pub fn checked_numel(shape: &[usize]) -> Option<usize> {
    shape.iter().try_fold(1usize, |acc, &d| acc.checked_mul(d))
}

impl Tensor {
    pub fn new(shape: Vec<usize>, data: Vec<f32>) -> Result<Self> {
        let Some(expected) = checked_numel(&shape) else {
            return Err(ShapeError::TooLarge { shape }.into());
        };
        if expected != data.len() {
            return Err(ShapeError::DataLength { expected, actual: data.len() }.into());
        }
        Ok(Self { shape, data })
    }

    /// One-dimensional tensor over `data`.
    pub fn from_vec(data: Vec<f32>) -> Self {
        Self { shape: vec![data.len()], data }
    }

    pub fn zeros(shape: &[usize]) -> Self {
        Self::full(shape, 0.0)
    }

    /// # Panics
    ///
    /// Panics if the element count of `shape` overflows `usize`. Use
    /// [`Tensor::new`] for shapes that come from outside the program.
    pub fn full(shape: &[usize], value: f32) -> Self {
        let n = checked_numel(shape)
            .unwrap_or_else(|| panic!("tensor shape {shape:?} overflows usize"));
        Self { shape: shape.to_vec(), data: vec![value; n] }
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn rank(&self) -> usize {
        self.shape.len()
    }

    pub fn numel(&self) -> usize {
        self.data.len()
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [f32] {
        &mut self.data
    }

    pub fn into_data(self) -> Vec<f32> {
        self.data
    }

    /// Fails with [`ShapeError::Mismatch`] unless `self` has exactly `shape`.
    pub fn expect_shape(&self, name: &str, shape: &[usize]) -> Result<()> {
        if self.shape != shape {
            return Err(ShapeError::Mismatch {
                name: name.to_string(),
                expected: shape.to_vec(),
                actual: self.shape.clone(),
            }
            .into());
        }
        Ok(())
    }
}
