//! Error types for the GPU side of the frame pipeline.
//!
//! Everything else in the timeline saturates instead of failing, so this is
//! the only error enum in the crate.

use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GpuError {
    #[error("No GPU adapter available: {0}")]
    AdapterUnavailable(String),

    #[error("Failed to create GPU device: {0}")]
    DeviceCreation(String),

    #[error("Target texture {width}x{height} exceeds the device limit of {limit}")]
    TextureTooLarge { width: u32, height: u32, limit: u32 },

    #[error("Failed to create target texture: {0}")]
    TextureCreation(String),

    #[error("Failed to create transfer buffer: {0}")]
    TransferBufferCreation(String),

    #[error("No command context available")]
    CommandContextUnavailable,

    #[error("GPU fence did not signal within {0:?}")]
    FenceTimeout(Duration),

    #[error("Failed to map transfer buffer: {0}")]
    Map(String),

    #[error("Readback produced {actual} bytes, expected {expected}")]
    ReadbackSize { expected: usize, actual: usize },

    #[error("GPU device lost: {0}")]
    DeviceLost(String),
}

impl GpuError {
    /// Device-level failures that no later frame can recover from.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            GpuError::AdapterUnavailable(_)
                | GpuError::DeviceCreation(_)
                | GpuError::FenceTimeout(_)
                | GpuError::DeviceLost(_)
        )
    }
}
