/// LooseRegionTree — loose octree with lazily created cells.
///
/// Single-node placement: each item lives in exactly one cell, the smallest
/// one whose `outer` bound (tight cell scaled by the loose factor) fully
/// contains it, bounded by `max_depth`. The candidate child is the octant of
/// the item's center; if that child's outer bound cannot hold the item, it
/// stays in the current cell. Items too large for the root stay at the root.
///
/// Cells are created on demand and destroyed as soon as they hold no items
/// and no children. Destroyed cell ids are recorded so owners of per-cell
/// state (occlusion queries) can release it, see `take_released_nodes`.
///
/// Every cell also tracks `inner`: the union of its items' bounds and its
/// children's inner bounds. Frustum tests and raycasts run against `inner`.

use rustc_hash::FxHashMap;
use glam::Vec3;
use crate::camera::{Frustum, FrustumTest};
use crate::config::OctreeConfig;
use crate::utils::SlotAllocator;
use super::aabb::AABB;
use super::item::ItemKey;
use super::scene_index::SceneIndex;
use super::traversal_order::{front_to_back_order, point_octant};

const SOURCE: &str = "galaxy3d::LooseRegionTree";

/// Arena index of an octree cell. Recycled after the cell is destroyed.
pub type CellId = u32;

/// A single cell of the loose octree.
pub struct OctreeCell {
    center: Vec3,
    half_size: f32,
    outer: AABB,
    inner: Option<AABB>,
    children: [Option<CellId>; 8],
    parent: Option<CellId>,
    /// Octant of this cell within its parent
    octant: u8,
    depth: u32,
    items: Vec<(ItemKey, AABB)>,
}

impl OctreeCell {
    fn free_slot() -> Self {
        Self {
            center: Vec3::ZERO,
            half_size: 0.0,
            outer: AABB::new(Vec3::ZERO, Vec3::ZERO),
            inner: None,
            children: [None; 8],
            parent: None,
            octant: 0,
            depth: 0,
            items: Vec::new(),
        }
    }

    pub fn center(&self) -> Vec3 {
        self.center
    }

    /// Half extent of the tight cell
    pub fn half_size(&self) -> f32 {
        self.half_size
    }

    /// Loose bound: any item stored here is inside it
    pub fn outer(&self) -> &AABB {
        &self.outer
    }

    /// Union of the actual content below this cell
    pub fn inner(&self) -> Option<&AABB> {
        self.inner.as_ref()
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }

    pub fn items(&self) -> &[(ItemKey, AABB)] {
        &self.items
    }

    pub fn parent(&self) -> Option<CellId> {
        self.parent
    }

    pub fn child_count(&self) -> usize {
        self.children.iter().flatten().count()
    }

    fn is_empty(&self) -> bool {
        self.items.is_empty() && self.children.iter().all(Option::is_none)
    }
}

/// Per-cell callbacks for `LooseRegionTree::traverse`.
pub trait OctreeVisitor {
    /// Called for each cell whose inner bound passed the frustum test.
    /// Returning `false` skips the cell's items and its whole subtree.
    fn enter_node(&mut self, id: CellId, cell: &OctreeCell) -> bool;

    /// Called for each frustum-visible item of an entered cell.
    fn visit_item(&mut self, key: ItemKey, bounds: &AABB);
}

/// One raycast intersection
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayHit {
    pub key: ItemKey,
    /// Distance along the normalized ray direction
    pub distance: f32,
}

/// Loose octree spatial index.
pub struct LooseRegionTree {
    center: Vec3,
    half_size: f32,
    loose_factor: f32,
    max_depth: u32,
    cells: Vec<OctreeCell>,
    ids: SlotAllocator,
    root: Option<CellId>,
    /// Reverse lookup: item key → (cell, world AABB)
    locations: FxHashMap<ItemKey, (CellId, AABB)>,
    /// Cells destroyed since the last `take_released_nodes`
    released: Vec<CellId>,
}

impl LooseRegionTree {
    /// Create an empty tree covering the cube `center ± half_size`.
    ///
    /// `loose_factor` is clamped to at least 1 (a plain octree).
    pub fn new(center: Vec3, half_size: f32, loose_factor: f32, max_depth: u32) -> Self {
        Self {
            center,
            half_size,
            loose_factor: loose_factor.max(1.0),
            max_depth,
            cells: Vec::new(),
            ids: SlotAllocator::new(),
            root: None,
            locations: FxHashMap::default(),
            released: Vec::new(),
        }
    }

    pub fn from_config(config: &OctreeConfig) -> Self {
        Self::new(config.center, config.half_size, config.loose_factor, config.max_depth)
    }

    // ===== ACCESSORS =====

    pub fn root(&self) -> Option<CellId> {
        self.root
    }

    pub fn contains(&self, key: ItemKey) -> bool {
        self.locations.contains_key(&key)
    }

    /// Cell currently holding `key`
    pub fn cell_of(&self, key: ItemKey) -> Option<CellId> {
        self.locations.get(&key).map(|(cell, _)| *cell)
    }

    /// Number of live cells
    pub fn cell_count(&self) -> usize {
        self.ids.len() as usize
    }

    pub fn max_depth(&self) -> u32 {
        self.max_depth
    }

    /// Ids of cells destroyed since the last call.
    pub fn take_released_nodes(&mut self) -> Vec<CellId> {
        std::mem::take(&mut self.released)
    }

    // ===== CELL ARENA =====

    fn outer_bound(&self, center: Vec3, half_size: f32) -> AABB {
        AABB::from_center_half_extents(center, Vec3::splat(half_size * self.loose_factor))
    }

    fn alloc_cell(&mut self, cell: OctreeCell) -> CellId {
        let id = self.ids.alloc();
        if id as usize == self.cells.len() {
            self.cells.push(cell);
        } else {
            self.cells[id as usize] = cell;
        }
        id
    }

    fn free_cell(&mut self, id: CellId) {
        self.cells[id as usize] = OctreeCell::free_slot();
        self.ids.free(id);
        self.released.push(id);
    }

    fn ensure_root(&mut self) -> CellId {
        if let Some(root) = self.root {
            return root;
        }
        let cell = OctreeCell {
            center: self.center,
            half_size: self.half_size,
            outer: self.outer_bound(self.center, self.half_size),
            ..OctreeCell::free_slot()
        };
        let root = self.alloc_cell(cell);
        self.root = Some(root);
        crate::engine_trace!(SOURCE, "Created root cell {}", root);
        root
    }

    /// Center and half size of child `octant` of a cell.
    fn child_cell(center: Vec3, half_size: f32, octant: u8) -> (Vec3, f32) {
        let quarter = half_size * 0.5;
        let sign = Vec3::new(
            if octant & 1 != 0 { 1.0 } else { -1.0 },
            if octant & 2 != 0 { 1.0 } else { -1.0 },
            if octant & 4 != 0 { 1.0 } else { -1.0 },
        );
        (center + sign * quarter, quarter)
    }

    fn create_child(&mut self, parent: CellId, octant: u8) -> CellId {
        let (center, half_size) = {
            let p = &self.cells[parent as usize];
            Self::child_cell(p.center, p.half_size, octant)
        };
        let cell = OctreeCell {
            center,
            half_size,
            outer: self.outer_bound(center, half_size),
            parent: Some(parent),
            octant,
            depth: self.cells[parent as usize].depth + 1,
            ..OctreeCell::free_slot()
        };
        let id = self.alloc_cell(cell);
        self.cells[parent as usize].children[octant as usize] = Some(id);
        id
    }

    // ===== PLACEMENT =====

    /// Descend to the smallest cell that can hold `bounds`, creating cells as needed.
    fn place(&mut self, key: ItemKey, bounds: AABB) -> CellId {
        let mut id = self.ensure_root();

        loop {
            let cell = &self.cells[id as usize];
            if cell.depth >= self.max_depth || !cell.outer.contains(&bounds) {
                break;
            }
            let octant = point_octant(cell.center, bounds.center());
            let (child_center, child_half) = Self::child_cell(cell.center, cell.half_size, octant);
            if !self.outer_bound(child_center, child_half).contains(&bounds) {
                break;
            }
            let existing = cell.children[octant as usize];
            id = match existing {
                Some(child) => child,
                None => self.create_child(id, octant),
            };
        }

        self.cells[id as usize].items.push((key, bounds));
        self.locations.insert(key, (id, bounds));

        // Grow inner bounds up to the root
        let mut current = Some(id);
        while let Some(cid) = current {
            let cell = &mut self.cells[cid as usize];
            cell.inner = Some(match cell.inner {
                Some(inner) => inner.union(&bounds),
                None => bounds,
            });
            current = cell.parent;
        }
        id
    }

    /// Take `key` out of its cell without pruning. Returns the cell.
    fn detach(&mut self, key: ItemKey) -> Option<CellId> {
        let (id, _) = self.locations.remove(&key)?;
        let items = &mut self.cells[id as usize].items;
        match items.iter().position(|(k, _)| *k == key) {
            Some(pos) => {
                items.swap_remove(pos);
            }
            None => {
                crate::engine_warn!(SOURCE, "Item {:?} not found in cell {}, skipped", key, id);
            }
        }
        Some(id)
    }

    /// Walk from `start` to the root: destroy empty cells, recompute inner bounds.
    fn prune_and_refit(&mut self, start: CellId) {
        let mut current = Some(start);
        while let Some(id) = current {
            let parent = self.cells[id as usize].parent;

            if self.cells[id as usize].is_empty() {
                let octant = self.cells[id as usize].octant;
                match parent {
                    Some(p) => self.cells[p as usize].children[octant as usize] = None,
                    None => self.root = None,
                }
                self.free_cell(id);
            } else {
                let cell = &self.cells[id as usize];
                let mut inner: Option<AABB> = None;
                let child_inners = cell
                    .children
                    .iter()
                    .flatten()
                    .filter_map(|child| self.cells[*child as usize].inner);
                for bounds in cell.items.iter().map(|(_, b)| *b).chain(child_inners) {
                    inner = Some(match inner {
                        Some(acc) => acc.union(&bounds),
                        None => bounds,
                    });
                }
                self.cells[id as usize].inner = inner;
            }

            current = parent;
        }
    }

    fn insert_item(&mut self, key: ItemKey, bounds: AABB) {
        match self.detach(key) {
            Some(old) => {
                self.place(key, bounds);
                self.prune_and_refit(old);
            }
            None => {
                self.place(key, bounds);
            }
        }
    }

    fn remove_item(&mut self, key: ItemKey) {
        if let Some(old) = self.detach(key) {
            self.prune_and_refit(old);
        }
    }

    // ===== TRAVERSAL =====

    /// Walk the tree front-to-back as seen from `eye`, culled by `frustum`.
    ///
    /// Per cell: the inner bound is classified against the frustum
    /// (`Outside` skips the subtree, `Inside` disables item tests below),
    /// then `visitor.enter_node` decides whether to continue, then items are
    /// visited, then existing children in camera-relative order.
    pub fn traverse<V: OctreeVisitor + ?Sized>(&self, frustum: &Frustum, eye: Vec3, visitor: &mut V) {
        if let Some(root) = self.root {
            self.traverse_cell(root, frustum, eye, false, visitor);
        }
    }

    fn traverse_cell<V: OctreeVisitor + ?Sized>(
        &self,
        id: CellId,
        frustum: &Frustum,
        eye: Vec3,
        inside: bool,
        visitor: &mut V,
    ) {
        let cell = &self.cells[id as usize];
        let Some(inner) = &cell.inner else { return };

        let inside = inside || match frustum.classify_aabb(inner) {
            FrustumTest::Outside => return,
            FrustumTest::Inside => true,
            FrustumTest::Partial => false,
        };

        if !visitor.enter_node(id, cell) {
            return;
        }

        for (key, bounds) in &cell.items {
            if inside || frustum.intersects_aabb(bounds) {
                visitor.visit_item(*key, bounds);
            }
        }

        for &octant in front_to_back_order(cell.center, eye) {
            if let Some(child) = cell.children[octant as usize] {
                self.traverse_cell(child, frustum, eye, inside, visitor);
            }
        }
    }

    fn collect_all(&self, id: CellId, results: &mut Vec<ItemKey>) {
        let cell = &self.cells[id as usize];
        results.extend(cell.items.iter().map(|(key, _)| *key));
        for child in cell.children.iter().flatten() {
            self.collect_all(*child, results);
        }
    }

    fn query_recursive(&self, id: CellId, frustum: &Frustum, results: &mut Vec<ItemKey>) {
        let cell = &self.cells[id as usize];
        let Some(inner) = &cell.inner else { return };

        match frustum.classify_aabb(inner) {
            FrustumTest::Outside => {}
            FrustumTest::Inside => self.collect_all(id, results),
            FrustumTest::Partial => {
                for (key, bounds) in &cell.items {
                    if frustum.intersects_aabb(bounds) {
                        results.push(*key);
                    }
                }
                for child in cell.children.iter().flatten() {
                    self.query_recursive(*child, frustum, results);
                }
            }
        }
    }

    /// All items hit by the ray, nearest first.
    ///
    /// `direction` is normalized; a zero direction or a non-positive
    /// `max_distance` returns no hits.
    pub fn raycast(&self, origin: Vec3, direction: Vec3, max_distance: f32) -> Vec<RayHit> {
        let mut hits = Vec::new();
        let Some(root) = self.root else { return hits };
        let Some(direction) = direction.try_normalize() else { return hits };
        if !(max_distance > 0.0) {
            return hits;
        }

        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            let cell = &self.cells[id as usize];
            let Some(inner) = &cell.inner else { continue };
            if inner.ray_intersection(origin, direction, max_distance).is_none() {
                continue;
            }
            for (key, bounds) in &cell.items {
                if let Some(distance) = bounds.ray_intersection(origin, direction, max_distance) {
                    hits.push(RayHit { key: *key, distance });
                }
            }
            stack.extend(cell.children.iter().flatten());
        }

        hits.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        hits
    }
}

// ===== SCENE INDEX TRAIT =====

impl SceneIndex for LooseRegionTree {
    fn insert(&mut self, key: ItemKey, world_aabb: &AABB) {
        self.insert_item(key, *world_aabb);
    }

    fn remove(&mut self, key: ItemKey) {
        self.remove_item(key);
    }

    fn update(&mut self, key: ItemKey, world_aabb: &AABB) {
        if self.locations.contains_key(&key) {
            self.insert_item(key, *world_aabb);
        }
    }

    fn query_frustum(&self, frustum: &Frustum, results: &mut Vec<ItemKey>) {
        if let Some(root) = self.root {
            self.query_recursive(root, frustum, results);
        }
    }

    fn clear(&mut self) {
        if let Some(root) = self.root {
            let mut stack = vec![root];
            while let Some(id) = stack.pop() {
                stack.extend(self.cells[id as usize].children.iter().flatten());
                self.released.push(id);
            }
        }
        self.cells.clear();
        self.ids.clear();
        self.locations.clear();
        self.root = None;
    }

    fn entity_count(&self) -> usize {
        self.locations.len()
    }

    fn node_count(&self) -> usize {
        self.cell_count()
    }
}

#[cfg(test)]
#[path = "loose_region_tree_tests.rs"]
mod tests;
