//! Storage order and spatial layout resolution.

use crate::{ConfigError, Result, ShapeError, checked_numel};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Memory layout of an activation tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum StorageOrder {
    /// Channel-first: `[N, C, spatial...]`.
    #[default]
    #[serde(rename = "NCHW", alias = "nchw")]
    Nchw,
    /// Channel-last: `[N, spatial..., C]`.
    #[serde(rename = "NHWC", alias = "nhwc")]
    Nhwc,
}

impl fmt::Display for StorageOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageOrder::Nchw => write!(f, "NCHW"),
            StorageOrder::Nhwc => write!(f, "NHWC"),
        }
    }
}

impl FromStr for StorageOrder {
    type Err = ConfigError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "NCHW" | "nchw" => Ok(StorageOrder::Nchw),
            "NHWC" | "nhwc" => Ok(StorageOrder::Nhwc),
            other => Err(ConfigError::UnknownStorageOrder { value: other.to_string() }),
        }
    }
}

impl StorageOrder {
    /// Index of the channel axis for a tensor of the given rank.
    pub fn channel_axis(self, rank: usize) -> usize {
        match self {
            StorageOrder::Nchw => 1,
            StorageOrder::Nhwc => rank.saturating_sub(1),
        }
    }
}

/// Batch, channel and flattened spatial extents of an activation tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpatialDims {
    pub batch: usize,
    pub channels: usize,
    /// Product of all spatial extents (1 for rank-2 inputs).
    pub spatial: usize,
    pub order: StorageOrder,
}

impl SpatialDims {
    /// Resolve the layout of `shape` under `order`.
    ///
    /// Rank-2 inputs are treated as `[N, C]` with a single spatial position
    /// regardless of order.
    pub fn resolve(shape: &[usize], order: StorageOrder) -> Result<Self> {
        if shape.len() < 2 {
            return Err(ShapeError::RankTooLow { rank: shape.len() }.into());
        }
        let batch = shape[0];
        let channel_axis = order.channel_axis(shape.len());
        let channels = shape[channel_axis];
        let spatial = shape
            .iter()
            .enumerate()
            .filter(|&(axis, _)| axis != 0 && axis != channel_axis)
            .try_fold(1usize, |acc, (_, &d)| acc.checked_mul(d));

        // numel and reduce_size multiply these extents unchecked.
        let (Some(spatial), Some(numel)) = (spatial, checked_numel(shape)) else {
            return Err(ShapeError::TooLarge { shape: shape.to_vec() }.into());
        };
        if numel == 0 {
            return Err(ShapeError::EmptyInput.into());
        }
        Ok(Self { batch, channels, spatial, order })
    }

    /// Total element count.
    pub fn numel(&self) -> usize {
        self.batch * self.channels * self.spatial
    }

    /// Number of elements reduced per channel (`N * spatial`).
    pub fn reduce_size(&self) -> usize {
        self.batch * self.spatial
    }

    /// Flat offset of element `(n, c, s)`.
    #[inline]
    pub fn offset(&self, n: usize, c: usize, s: usize) -> usize {
        match self.order {
            StorageOrder::Nchw => (n * self.channels + c) * self.spatial + s,
            StorageOrder::Nhwc => (n * self.spatial + s) * self.channels + c,
        }
    }

    /// Channel index of flat offset `i`.
    #[inline]
    pub fn channel_of(&self, i: usize) -> usize {
        match self.order {
            StorageOrder::Nchw => (i / self.spatial) % self.channels,
            StorageOrder::Nhwc => i % self.channels,
        }
    }

    /// Iterate the flat offsets belonging to channel `c`.
    pub fn channel_offsets(&self, c: usize) -> impl Iterator<Item = usize> + '_ {
        (0..self.batch).flat_map(move |n| (0..self.spatial).map(move |s| self.offset(n, c, s)))
    }
}
