//! CPU kernel implementations

pub mod batch_norm;
pub mod fallback;
#[cfg(feature = "parallel")]
pub mod parallel;

pub use fallback::FallbackKernel;
#[cfg(feature = "parallel")]
pub use parallel::ParallelKernel;
