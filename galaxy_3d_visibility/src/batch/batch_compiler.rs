/// RenderBatchCompiler — turns the visible set of a pass into draws.
///
/// One compiler per pass kind, each with its own batch map and pass counter.
/// A pass is compiled in three steps:
///
/// 1. (main pass only) occluder pre-pass: the nearest large opaque items are
///    drawn depth-only through the BoundsTree front-to-back traversal, so the
///    occlusion queries issued next have something to be tested against;
/// 2. ordered LooseRegionTree traversal, culled by the frustum and (main
///    pass) the occlusion controller; surviving items are appended to the
///    batch of their renderable;
/// 3. resolve: batches of one item become `Single` draws, larger ones are
///    uploaded to their instance buffer and become `Instanced` draws.

use std::sync::Arc;
use rustc_hash::FxHashMap;
use slotmap::{SecondaryMap, SlotMap};
use glam::Vec3;
use crate::backend::{Buffer, BufferDesc, GraphicsBackend};
use crate::camera::Camera;
use crate::config::BatchConfig;
use crate::error::{Error, Result};
use crate::occlusion::OcclusionController;
use crate::scene::Scene;
use crate::spatial::{AABB, CellId, Item, ItemKey, OctreeCell, OctreeVisitor, Renderable};
use super::render_batch::{BatchDraw, InstanceBuffer, RenderBatch};

const SOURCE: &str = "galaxy3d::BatchCompiler";

/// Which pass a compiler serves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PassKind {
    /// Camera pass: occluder pre-pass + occlusion culling
    Main,
    /// Light pass: shadow casters only, no occlusion queries
    Shadow,
}

/// Per-pass counters, reset at the start of each compile
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchStats {
    /// Distinct items appended to batches
    pub visible_items: u32,
    /// Items skipped because they were already seen this pass
    pub duplicate_items: u32,
    pub active_batches: u32,
    pub single_draws: u32,
    pub instanced_draws: u32,
    pub buffer_allocations: u32,
    pub buffer_uploads: u32,
    /// Batches drawn item by item after an instance buffer failure
    pub fallbacks: u32,
    pub occluders: u32,
    pub reclaimed_batches: u32,
}

pub struct RenderBatchCompiler {
    kind: PassKind,
    config: BatchConfig,
    batches: FxHashMap<Renderable, RenderBatch>,
    /// Renderables touched this pass, in first-touch order
    active: Vec<Renderable>,
    /// Last pass each item was appended in
    visit_stamps: SecondaryMap<ItemKey, u64>,
    pass: u64,
    stats: BatchStats,
}

impl RenderBatchCompiler {
    pub fn new(kind: PassKind, config: BatchConfig) -> Self {
        Self {
            kind,
            config,
            batches: FxHashMap::default(),
            active: Vec::new(),
            visit_stamps: SecondaryMap::new(),
            pass: 0,
            stats: BatchStats::default(),
        }
    }

    pub fn kind(&self) -> PassKind {
        self.kind
    }

    /// Number of the last compiled pass
    pub fn pass(&self) -> u64 {
        self.pass
    }

    pub fn stats(&self) -> &BatchStats {
        &self.stats
    }

    pub fn batch(&self, renderable: &Renderable) -> Option<&RenderBatch> {
        self.batches.get(renderable)
    }

    /// Number of batches kept alive (including ones idle this pass)
    pub fn batch_count(&self) -> usize {
        self.batches.len()
    }

    // ===== COMPILE =====

    /// Compile the visible set of `scene` seen through `camera` into draws.
    ///
    /// `occlusion` is only consulted by a `Main` compiler; the controller's
    /// frame must already be started with `begin_frame`. The scene must be
    /// synced: pending mutations are not visible to the traversal.
    pub fn compile_batches(
        &mut self,
        scene: &Scene,
        camera: &Camera,
        occlusion: Option<&mut OcclusionController>,
        backend: &mut dyn GraphicsBackend,
    ) -> Vec<BatchDraw> {
        self.begin_pass();

        if scene.has_pending_changes() {
            crate::engine_debug!(SOURCE, "{:?} pass {} compiled with unsynced scene changes", self.kind, self.pass);
        }

        let occlusion = match self.kind {
            PassKind::Main => {
                self.draw_occluders(scene, camera, backend);
                occlusion
            }
            PassKind::Shadow => None,
        };

        let eye = camera.position();
        let mut visitor = CollectVisitor {
            items: scene.item_map(),
            compiler: &mut *self,
            occlusion,
            backend: &mut *backend,
            eye,
        };
        scene.region_tree().traverse(camera.frustum(), eye, &mut visitor);

        let draws = self.resolve(backend);
        self.reclaim();
        draws
    }

    fn begin_pass(&mut self) {
        self.pass += 1;
        self.active.clear();
        self.stats = BatchStats::default();
    }

    /// Append one visible item to its batch (once per pass).
    fn collect(&mut self, key: ItemKey, item: &Item) {
        if self.kind == PassKind::Shadow && !item.renderable().casts_shadow() {
            return;
        }
        if self.visit_stamps.get(key) == Some(&self.pass) {
            self.stats.duplicate_items += 1;
            return;
        }
        self.visit_stamps.insert(key, self.pass);

        let renderable = *item.renderable();
        let batch = self
            .batches
            .entry(renderable)
            .or_insert_with(|| RenderBatch::new(renderable));
        if batch.append(self.pass, key, item.transform()) {
            self.active.push(renderable);
        }
        self.stats.visible_items += 1;
    }

    /// Depth-only draw of the nearest large opaque items (main pass).
    fn draw_occluders(&mut self, scene: &Scene, camera: &Camera, backend: &mut dyn GraphicsBackend) {
        let max_occluders = self.config.max_occluders;
        if max_occluders == 0 {
            return;
        }
        let min_ratio = self.config.occluder_min_screen_ratio;
        let eye = camera.position();
        let items = scene.item_map();
        let mut drawn = 0;

        scene.bounds_tree().traverse_frustum(camera.frustum(), eye, |key, bounds| {
            let Some(item) = items.get(key) else {
                return true;
            };
            if !item.renderable().can_occlude() || screen_ratio(bounds, eye) < min_ratio {
                return true;
            }
            match backend.draw_depth_only(item.renderable(), item.transform()) {
                Ok(()) => drawn += 1,
                Err(err) => {
                    crate::engine_warn!(SOURCE, "Occluder {:?} not drawn: {}", key, err);
                }
            }
            drawn < max_occluders
        });

        self.stats.occluders = drawn as u32;
    }

    // ===== RESOLVE =====

    fn resolve(&mut self, backend: &mut dyn GraphicsBackend) -> Vec<BatchDraw> {
        let mut draws = Vec::with_capacity(self.active.len());
        let pass = self.pass;

        for renderable in &self.active {
            let Some(batch) = self.batches.get_mut(renderable) else {
                continue;
            };
            self.stats.active_batches += 1;

            match batch.count() {
                0 => {}
                1 => {
                    draws.push(BatchDraw::Single {
                        renderable: *renderable,
                        transform: batch.transforms()[0],
                    });
                    self.stats.single_draws += 1;
                }
                count => match prepare_instances(batch, self.kind, backend, &mut self.stats) {
                    Ok(instances) => {
                        draws.push(BatchDraw::Instanced {
                            renderable: *renderable,
                            instances,
                            count: count as u32,
                        });
                        self.stats.instanced_draws += 1;
                    }
                    Err(err) => {
                        crate::engine_warn!(SOURCE, "{:?} pass {}: batch {:?} falls back to {} single draws: {}",
                            self.kind, pass, renderable, count, err);
                        self.stats.fallbacks += 1;
                        for transform in batch.transforms() {
                            draws.push(BatchDraw::Single { renderable: *renderable, transform: *transform });
                        }
                        self.stats.single_draws += count as u32;
                    }
                },
            }
        }
        draws
    }

    /// Drop batches idle for more than `reclaim_after_passes` passes.
    fn reclaim(&mut self) {
        let pass = self.pass;
        let keep_for = self.config.reclaim_after_passes;
        let before = self.batches.len();
        self.batches.retain(|_, batch| pass - batch.last_used_pass() <= keep_for);
        let reclaimed = before - self.batches.len();
        if reclaimed > 0 {
            self.stats.reclaimed_batches = reclaimed as u32;
            crate::engine_trace!(SOURCE, "{:?} pass {}: reclaimed {} idle batches", self.kind, pass, reclaimed);
        }
    }

    // ===== SUBMIT =====

    /// Issue resolved draws to the backend, in order.
    pub fn submit(draws: &[BatchDraw], backend: &mut dyn GraphicsBackend) -> Result<()> {
        for draw in draws {
            match draw {
                BatchDraw::Single { renderable, transform } => backend.draw(renderable, transform)?,
                BatchDraw::Instanced { renderable, instances, count } => {
                    backend.draw_instanced(renderable, instances, *count)?
                }
            }
        }
        Ok(())
    }
}

/// Ensure the batch's instance buffer can hold its items and holds the current ones.
fn prepare_instances(
    batch: &mut RenderBatch,
    kind: PassKind,
    backend: &mut dyn GraphicsBackend,
    stats: &mut BatchStats,
) -> Result<Arc<dyn Buffer>> {
    let needed = batch.count() as u32;

    if batch.capacity() < needed {
        let capacity = needed.next_power_of_two();
        let renderable = batch.renderable();
        let name = format!("{:?}-instances-g{}-m{}", kind, renderable.geometry.0, renderable.material.0);
        let buffer = backend.create_instance_buffer(&BufferDesc::instances(capacity, name))?;
        batch.set_instance_buffer(InstanceBuffer::new(buffer, capacity));
        batch.mark_changed();
        stats.buffer_allocations += 1;
    }

    let Some(instance_buffer) = batch.instance_buffer() else {
        return Err(Error::InvalidResource("batch has no instance buffer".to_string()));
    };
    let buffer = Arc::clone(instance_buffer.buffer());

    if batch.is_changed() {
        buffer.update(0, bytemuck::cast_slice(batch.transforms()))?;
        batch.mark_uploaded();
        stats.buffer_uploads += 1;
    }
    Ok(buffer)
}

/// Bounding radius over distance, a cheap proxy for projected size
fn screen_ratio(bounds: &AABB, eye: Vec3) -> f32 {
    let distance = bounds.center().distance(eye);
    if distance <= f32::EPSILON {
        return f32::INFINITY;
    }
    bounds.radius() / distance
}

/// Octree visitor feeding the compiler, gated by the occlusion controller.
struct CollectVisitor<'a> {
    items: &'a SlotMap<ItemKey, Item>,
    compiler: &'a mut RenderBatchCompiler,
    occlusion: Option<&'a mut OcclusionController>,
    backend: &'a mut dyn GraphicsBackend,
    eye: Vec3,
}

impl OctreeVisitor for CollectVisitor<'_> {
    fn enter_node(&mut self, id: CellId, cell: &OctreeCell) -> bool {
        match self.occlusion.as_deref_mut() {
            Some(controller) => controller.visit(id, cell.outer(), self.eye, &mut *self.backend),
            None => true,
        }
    }

    fn visit_item(&mut self, key: ItemKey, _bounds: &AABB) {
        match self.items.get(key) {
            Some(item) => self.compiler.collect(key, item),
            None => crate::engine_warn!(SOURCE, "Indexed item {:?} missing from the scene, skipped", key),
        }
    }
}

#[cfg(test)]
#[path = "batch_compiler_tests.rs"]
mod tests;
