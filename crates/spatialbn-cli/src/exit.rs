// Exit codes, one per error family
use spatialbn_common::SpatialBnError;

pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_GENERIC_FAIL: i32 = 1;
pub const EXIT_CONFIG: i32 = 2;
pub const EXIT_SHAPE: i32 = 3;
pub const EXIT_KERNEL: i32 = 4;

/// Exit code for an error, by the first `SpatialBnError` in its chain.
pub fn exit_code(err: &anyhow::Error) -> i32 {
    err.chain()
        .find_map(|e| e.downcast_ref::<SpatialBnError>())
        .map(|e| match e {
            SpatialBnError::Config(_) => EXIT_CONFIG,
            SpatialBnError::Shape(_) => EXIT_SHAPE,
            SpatialBnError::Kernel(_) => EXIT_KERNEL,
            SpatialBnError::Io(_) => EXIT_GENERIC_FAIL,
        })
        .unwrap_or(EXIT_GENERIC_FAIL)
}
