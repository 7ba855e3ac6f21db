/// GraphicsBackend trait — GPU services consumed by the visibility engine.
///
/// Occlusion queries, proxy geometry, instance buffers and draw submission.
/// Implementations record into whatever command stream the renderer uses;
/// the engine only needs the calls to be issued in order.

use std::sync::Arc;
use glam::{Mat4, Vec3};
use crate::error::Result;
use crate::spatial::{GeometryId, Renderable};
use super::buffer::{Buffer, BufferDesc};

/// Opaque handle of a GPU occlusion query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct QueryHandle(pub u64);

/// Non-blocking poll result of an occlusion query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryStatus {
    /// Result not available yet
    NotReady,
    /// At least one sample of the proxy passed the depth test
    Visible,
    /// No sample passed
    Occluded,
}

/// GPU services used by the occlusion controller and the batch compilers
pub trait GraphicsBackend {
    /// Create an axis-aligned box mesh centered on the origin.
    ///
    /// `extents` is the full size along each axis.
    fn create_box_geometry(&mut self, extents: Vec3) -> Result<GeometryId>;

    /// Allocate an occlusion query object
    fn create_occlusion_query(&mut self) -> Result<QueryHandle>;

    /// Draw `proxy` depth-only (no color or depth writes) at `transform`
    /// inside an any-samples-passed query
    fn issue_occlusion_query(&mut self, query: QueryHandle, proxy: GeometryId, transform: &Mat4) -> Result<()>;

    /// Read the query result without waiting for the GPU
    fn poll_occlusion_query(&mut self, query: QueryHandle) -> Result<QueryStatus>;

    /// Release a query object
    fn destroy_occlusion_query(&mut self, query: QueryHandle);

    /// Create a host-writable buffer for per-instance transforms
    fn create_instance_buffer(&mut self, desc: &BufferDesc) -> Result<Arc<dyn Buffer>>;

    /// Draw one item
    fn draw(&mut self, renderable: &Renderable, transform: &Mat4) -> Result<()>;

    /// Draw `instance_count` items reading transforms from `instances`
    fn draw_instanced(&mut self, renderable: &Renderable, instances: &Arc<dyn Buffer>, instance_count: u32) -> Result<()>;

    /// Draw one item into the depth buffer only
    fn draw_depth_only(&mut self, renderable: &Renderable, transform: &Mat4) -> Result<()>;
}
