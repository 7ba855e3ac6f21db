/// Mock GraphicsBackend for unit tests (no GPU required)
///
/// Records every call so tests can assert on issued queries, buffer uploads
/// and draws. Query results and failures are scripted by the test.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use glam::{Mat4, Vec3};
use crate::backend::{Buffer, BufferDesc, GraphicsBackend, QueryHandle, QueryStatus};
use crate::error::{Error, Result};
use crate::spatial::{GeometryId, Renderable};
use crate::engine_bail;

// ============================================================================
// Mock Buffer
// ============================================================================

#[derive(Debug)]
pub struct MockBuffer {
    pub size: u64,
    pub name: String,
    pub data: Mutex<Vec<u8>>,
    pub writes: Mutex<u32>,
    pub fail_updates: bool,
}

impl MockBuffer {
    pub fn new(size: u64, name: String) -> Self {
        Self {
            size,
            name,
            data: Mutex::new(vec![0; size as usize]),
            writes: Mutex::new(0),
            fail_updates: false,
        }
    }

    /// First `count` transforms stored in the buffer
    pub fn transforms(&self, count: usize) -> Vec<Mat4> {
        let data = self.data.lock().unwrap();
        data.chunks_exact(64)
            .take(count)
            .map(|chunk| Mat4::from_cols_array(&bytemuck::pod_read_unaligned::<[f32; 16]>(chunk)))
            .collect()
    }

    pub fn write_count(&self) -> u32 {
        *self.writes.lock().unwrap()
    }
}

impl Buffer for MockBuffer {
    fn size(&self) -> u64 {
        self.size
    }

    fn update(&self, offset: u64, data: &[u8]) -> Result<()> {
        if self.fail_updates {
            engine_bail!("galaxy3d::MockBuffer", "upload to '{}' failed", self.name);
        }
        let end = offset as usize + data.len();
        let mut storage = self.data.lock().unwrap();
        if end > storage.len() {
            return Err(Error::InvalidResource(format!(
                "write of {} bytes at {} overflows '{}' ({} bytes)", data.len(), offset, self.name, self.size)));
        }
        storage[offset as usize..end].copy_from_slice(data);
        *self.writes.lock().unwrap() += 1;
        Ok(())
    }
}

// ============================================================================
// Mock Backend
// ============================================================================

/// One recorded draw submission
#[derive(Debug, Clone, PartialEq)]
pub enum DrawCall {
    Single { renderable: Renderable, transform: Mat4 },
    Instanced { renderable: Renderable, buffer: usize, instance_count: u32 },
    DepthOnly { renderable: Renderable, transform: Mat4 },
}

/// Backend that tracks everything it is asked to do
#[derive(Debug)]
pub struct MockBackend {
    /// Extents of every created box geometry, indexed by GeometryId - base
    pub box_geometries: Vec<Vec3>,
    pub live_queries: HashSet<QueryHandle>,
    pub created_queries: u32,
    pub issued_queries: Vec<(QueryHandle, GeometryId, Mat4)>,
    pub polled_queries: Vec<QueryHandle>,
    pub destroyed_queries: Vec<QueryHandle>,
    /// Result returned by a poll for a specific query
    pub query_results: HashMap<QueryHandle, QueryStatus>,
    /// Result returned by a poll for any other query
    pub default_result: QueryStatus,
    pub buffers: Vec<Arc<MockBuffer>>,
    pub draws: Vec<DrawCall>,
    pub fail_buffer_creation: bool,
    pub fail_buffer_updates: bool,
    pub fail_queries: bool,
    pub fail_box_geometry: bool,
    next_query: u64,
}

/// Ids handed out for proxy boxes start here to keep them apart from test renderables
pub const MOCK_GEOMETRY_BASE: u32 = 10_000;

impl MockBackend {
    pub fn new() -> Self {
        Self {
            box_geometries: Vec::new(),
            live_queries: HashSet::new(),
            created_queries: 0,
            issued_queries: Vec::new(),
            polled_queries: Vec::new(),
            destroyed_queries: Vec::new(),
            query_results: HashMap::new(),
            default_result: QueryStatus::Visible,
            buffers: Vec::new(),
            draws: Vec::new(),
            fail_buffer_creation: false,
            fail_buffer_updates: false,
            fail_queries: false,
            fail_box_geometry: false,
            next_query: 1,
        }
    }

    /// Forget recorded calls between frames (keeps resources and scripts)
    pub fn clear_calls(&mut self) {
        self.issued_queries.clear();
        self.polled_queries.clear();
        self.draws.clear();
    }

    /// Total items drawn by the recorded color draws
    pub fn drawn_item_count(&self) -> u32 {
        self.draws
            .iter()
            .map(|draw| match draw {
                DrawCall::Single { .. } => 1,
                DrawCall::Instanced { instance_count, .. } => *instance_count,
                DrawCall::DepthOnly { .. } => 0,
            })
            .sum()
    }

    pub fn depth_only_count(&self) -> usize {
        self.draws.iter().filter(|d| matches!(d, DrawCall::DepthOnly { .. })).count()
    }

    fn buffer_index(&self, buffer: &Arc<dyn Buffer>) -> Option<usize> {
        let target = Arc::as_ptr(buffer) as *const u8;
        self.buffers
            .iter()
            .position(|b| Arc::as_ptr(b) as *const u8 == target)
    }
}

impl GraphicsBackend for MockBackend {
    fn create_box_geometry(&mut self, extents: Vec3) -> Result<GeometryId> {
        if self.fail_box_geometry {
            return Err(Error::OutOfMemory);
        }
        self.box_geometries.push(extents);
        Ok(GeometryId(MOCK_GEOMETRY_BASE + self.box_geometries.len() as u32 - 1))
    }

    fn create_occlusion_query(&mut self) -> Result<QueryHandle> {
        if self.fail_queries {
            return Err(Error::OutOfMemory);
        }
        let handle = QueryHandle(self.next_query);
        self.next_query += 1;
        self.created_queries += 1;
        self.live_queries.insert(handle);
        Ok(handle)
    }

    fn issue_occlusion_query(&mut self, query: QueryHandle, proxy: GeometryId, transform: &Mat4) -> Result<()> {
        if self.fail_queries {
            engine_bail!("galaxy3d::MockBackend", "query {:?} rejected", query);
        }
        if !self.live_queries.contains(&query) {
            return Err(Error::InvalidResource(format!("unknown query {:?}", query)));
        }
        self.issued_queries.push((query, proxy, *transform));
        Ok(())
    }

    fn poll_occlusion_query(&mut self, query: QueryHandle) -> Result<QueryStatus> {
        self.polled_queries.push(query);
        if self.fail_queries {
            engine_bail!("galaxy3d::MockBackend", "query {:?} lost", query);
        }
        Ok(self.query_results.get(&query).copied().unwrap_or(self.default_result))
    }

    fn destroy_occlusion_query(&mut self, query: QueryHandle) {
        self.live_queries.remove(&query);
        self.destroyed_queries.push(query);
    }

    fn create_instance_buffer(&mut self, desc: &BufferDesc) -> Result<Arc<dyn Buffer>> {
        if self.fail_buffer_creation {
            return Err(Error::OutOfMemory);
        }
        let mut buffer = MockBuffer::new(desc.size, desc.name.clone());
        buffer.fail_updates = self.fail_buffer_updates;
        let buffer = Arc::new(buffer);
        self.buffers.push(Arc::clone(&buffer));
        Ok(buffer)
    }

    fn draw(&mut self, renderable: &Renderable, transform: &Mat4) -> Result<()> {
        self.draws.push(DrawCall::Single { renderable: *renderable, transform: *transform });
        Ok(())
    }

    fn draw_instanced(&mut self, renderable: &Renderable, instances: &Arc<dyn Buffer>, instance_count: u32) -> Result<()> {
        let Some(buffer) = self.buffer_index(instances) else {
            return Err(Error::InvalidResource("instance buffer not created by this backend".to_string()));
        };
        self.draws.push(DrawCall::Instanced { renderable: *renderable, buffer, instance_count });
        Ok(())
    }

    fn draw_depth_only(&mut self, renderable: &Renderable, transform: &Mat4) -> Result<()> {
        self.draws.push(DrawCall::DepthOnly { renderable: *renderable, transform: *transform });
        Ok(())
    }
}

#[cfg(test)]
#[path = "mock_backend_tests.rs"]
mod tests;
