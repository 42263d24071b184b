//! Error types for the spatial batch-norm workspace

use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, SpatialBnError>;

/// Top-level error type
#[derive(Debug, Error)]
pub enum SpatialBnError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Shape error: {0}")]
    Shape(#[from] ShapeError),

    #[error("Kernel error: {0}")]
    Kernel(#[from] KernelError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures detected while building an operator or a runtime config.
///
/// These are precondition violations: they are raised at construction time
/// and there is no recovery path other than fixing the definition.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("{op} expects {expected} {slot}s, got {actual}")]
    InvalidArity { op: String, slot: &'static str, expected: String, actual: usize },

    #[error("epsilon must be positive and finite, got {value}")]
    InvalidEpsilon { value: f32 },

    #[error("momentum must be in [0, 1], got {value}")]
    InvalidMomentum { value: f32 },

    #[error("Unknown storage order: {value}")]
    UnknownStorageOrder { value: String },

    #[error("Argument '{name}' has the wrong type, expected {expected}")]
    ArgumentType { name: String, expected: &'static str },

    #[error("Unknown operator type: {op_type}")]
    UnknownOperator { op_type: String },

    #[error("Invalid value for {key}: {reason}")]
    InvalidValue { key: String, reason: String },

    #[error("Failed to parse configuration: {reason}")]
    Parse { reason: String },
}

/// Tensor shape problems found when an operator runs.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ShapeError {
    #[error("Input tensor is empty")]
    EmptyInput,

    #[error("Input must have rank >= 2, got {rank}")]
    RankTooLow { rank: usize },

    #[error("Shape {shape:?} has more elements than fit in usize")]
    TooLarge { shape: Vec<usize> },

    #[error("Data length {actual} does not match shape element count {expected}")]
    DataLength { expected: usize, actual: usize },

    #[error("{name} length {actual} != channels {expected}")]
    ParamLength { name: String, expected: usize, actual: usize },

    #[error("{name} shape {actual:?} != expected {expected:?}")]
    Mismatch { name: String, expected: Vec<usize>, actual: Vec<usize> },

    #[error("{op} expects {expected} input tensors, got {actual}")]
    InputCount { op: String, expected: usize, actual: usize },
}

/// Kernel dispatch and execution failures.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum KernelError {
    #[error("No available kernel provider")]
    NoProvider,

    #[error("Unknown kernel provider: {name}")]
    UnknownProvider { name: String },

    #[error("Kernel provider {name} is not available in this build")]
    Unavailable { name: String },

    #[error("Kernel execution failed: {reason}")]
    ExecutionFailed { reason: String },
}

impl SpatialBnError {
    /// Returns true for construction-time validation failures.
    pub fn is_config(&self) -> bool {
        matches!(self, SpatialBnError::Config(_))
    }

    /// Returns true for run-time shape failures.
    pub fn is_shape(&self) -> bool {
        matches!(self, SpatialBnError::Shape(_))
    }
}
