//! Common types, traits, and utilities for the spatial batch-norm operators
//!
//! This crate provides the foundational pieces shared across the workspace:
//! the error hierarchy, storage-order handling and layout resolution, the
//! dense tensor container, the kernel-backend capability snapshot, and the
//! runtime configuration.

pub mod config;
pub mod error;
pub mod kernel_registry;
pub mod order;
pub mod tensor;

pub use config::{
    BackendPreference, ConfigBuilder, KernelConfig, LogFormat, LoggingConfig, RuntimeConfig,
};
pub use error::*;
pub use kernel_registry::{KernelBackend, KernelCapabilities};
pub use order::{SpatialDims, StorageOrder};
pub use tensor::{Tensor, checked_numel};
