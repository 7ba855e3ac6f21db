/// Buffer trait and buffer descriptor

use glam::Mat4;
use crate::error::Result;

/// Bytes per instance: one column-major world matrix
pub const INSTANCE_STRIDE: u64 = std::mem::size_of::<Mat4>() as u64;

/// Descriptor for creating an instance buffer
#[derive(Debug, Clone, PartialEq)]
pub struct BufferDesc {
    /// Size in bytes
    pub size: u64,
    /// Debug name shown by backend tooling
    pub name: String,
}

impl BufferDesc {
    /// Descriptor for `capacity` instance transforms
    pub fn instances(capacity: u32, name: String) -> Self {
        Self {
            size: capacity as u64 * INSTANCE_STRIDE,
            name,
        }
    }
}

/// Buffer resource trait
///
/// Implemented by backend-specific buffer types.
/// The buffer is automatically destroyed when dropped.
pub trait Buffer: Send + Sync {
    /// Size in bytes
    fn size(&self) -> u64;

    /// Update buffer data
    ///
    /// # Arguments
    ///
    /// * `offset` - Offset into the buffer in bytes
    /// * `data` - Data to write
    fn update(&self, offset: u64, data: &[u8]) -> Result<()>;
}
