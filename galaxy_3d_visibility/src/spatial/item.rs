/// Items: the renderable units indexed by the spatial trees.
///
/// The owning scene-graph node stays the source of truth for the transform;
/// an `Item` holds a copy plus the world bounds derived from it.

use glam::Mat4;
use bitflags::bitflags;
use slotmap::new_key_type;
use super::aabb::AABB;

// ===== SLOT MAP KEY =====

new_key_type! {
    /// Stable key for an Item within a Scene.
    ///
    /// Keys remain valid even after other items are removed.
    /// A key becomes invalid only when its own item is removed.
    pub struct ItemKey;
}

/// Backend geometry identity (vertex/index buffers + submesh range)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GeometryId(pub u32);

/// Backend material identity (pipeline + bindings)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MaterialId(pub u32);

bitflags! {
    /// Per-renderable flags that take part in the batching key.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
    pub struct RenderFlags: u32 {
        /// Rendered into shadow passes
        const CAST_SHADOW    = 1 << 0;
        /// Samples shadow maps in the main pass
        const RECEIVE_SHADOW = 1 << 1;
        /// Blended material; never used as an occluder
        const TRANSPARENT    = 1 << 2;
        /// Alpha-tested material; never used as an occluder
        const ALPHA_TESTED   = 1 << 3;
    }
}

/// Identity of a (geometry, material, flags) tuple.
///
/// Items sharing a `Renderable` are drawn with one instanced draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Renderable {
    pub geometry: GeometryId,
    pub material: MaterialId,
    pub flags: RenderFlags,
}

impl Renderable {
    pub fn new(geometry: GeometryId, material: MaterialId, flags: RenderFlags) -> Self {
        Self { geometry, material, flags }
    }

    pub fn casts_shadow(&self) -> bool {
        self.flags.contains(RenderFlags::CAST_SHADOW)
    }

    pub fn receives_shadow(&self) -> bool {
        self.flags.contains(RenderFlags::RECEIVE_SHADOW)
    }

    /// Whether this renderable may be drawn depth-only to occlude others.
    pub fn can_occlude(&self) -> bool {
        !self.flags.intersects(RenderFlags::TRANSPARENT | RenderFlags::ALPHA_TESTED)
    }
}

/// A renderable unit inserted into the spatial index.
#[derive(Debug, Clone)]
pub struct Item {
    /// AABB in local space (from the geometry)
    local_bounds: AABB,
    /// World matrix copied from the owning node
    transform: Mat4,
    /// World-space bounds, `local_bounds` transformed by `transform`
    bounds: AABB,
    /// Batching identity
    renderable: Renderable,
}

impl Item {
    pub fn new(local_bounds: AABB, transform: Mat4, renderable: Renderable) -> Self {
        Self {
            local_bounds,
            transform,
            bounds: local_bounds.transformed(&transform),
            renderable,
        }
    }

    /// World-space bounds at the current transform
    pub fn bounds(&self) -> &AABB {
        &self.bounds
    }

    pub fn local_bounds(&self) -> &AABB {
        &self.local_bounds
    }

    pub fn transform(&self) -> &Mat4 {
        &self.transform
    }

    pub fn renderable(&self) -> &Renderable {
        &self.renderable
    }

    /// Replace the transform and recompute the world bounds.
    pub fn set_transform(&mut self, transform: Mat4) {
        self.transform = transform;
        self.bounds = self.local_bounds.transformed(&transform);
    }
}
