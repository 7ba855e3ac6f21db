/// Proxy box meshes for occlusion queries, shared by size.
///
/// Octree cells at the same depth have identical outer bounds, so one box
/// per distinct extent covers the whole tree. Proxies are drawn translated
/// to the cell center.

use rustc_hash::FxHashMap;
use glam::Vec3;
use crate::backend::GraphicsBackend;
use crate::error::Result;
use crate::spatial::GeometryId;

#[derive(Debug, Default)]
pub struct GeometryCache {
    /// Extents (as raw float bits) → backend box mesh
    boxes: FxHashMap<[u32; 3], GeometryId>,
}

impl GeometryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Box mesh of the given full extents, created on first request.
    pub fn get_or_create(&mut self, extents: Vec3, backend: &mut dyn GraphicsBackend) -> Result<GeometryId> {
        let key = extents.to_array().map(f32::to_bits);
        if let Some(geometry) = self.boxes.get(&key) {
            return Ok(*geometry);
        }
        let geometry = backend.create_box_geometry(extents)?;
        self.boxes.insert(key, geometry);
        Ok(geometry)
    }

    pub fn len(&self) -> usize {
        self.boxes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.boxes.is_empty()
    }

    /// Forget all meshes (the backend owns their memory)
    pub fn clear(&mut self) {
        self.boxes.clear();
    }
}
