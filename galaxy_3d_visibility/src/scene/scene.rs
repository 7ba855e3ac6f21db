/// Scene — renderable items plus the two spatial indexes over them.
///
/// Items live in a SlotMap (stable keys, O(1) insert/remove). Mutations are
/// recorded, not applied: `create_item`, `set_transform` and `remove_item`
/// fill the new / dirty / removed sets, and `sync()` applies them to the
/// BoundsTree and the LooseRegionTree before the next traversal.
/// Traversals borrow the Scene immutably, so nothing can mutate the trees
/// while a frame is being compiled.

use rustc_hash::FxHashSet;
use slotmap::SlotMap;
use glam::Mat4;
use crate::config::VisibilityConfig;
use crate::spatial::{
    AABB, BoundsTree, CellId, Item, ItemKey, LooseRegionTree, Renderable, SceneIndex,
};

const SOURCE: &str = "galaxy3d::Scene";

/// Counters for debug overlays
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DebugInfo {
    /// Items stored in the scene, including unsynced creations and items
    /// still pending removal. Equals the indexed count right after `sync()`.
    pub entity_count: usize,
    pub bvh_node_count: usize,
    pub bvh_depth: usize,
    pub octree_cell_count: usize,
    /// Mutations waiting for `sync()`
    pub pending_creations: usize,
    pub pending_moves: usize,
    pub pending_removals: usize,
}

pub struct Scene {
    items: SlotMap<ItemKey, Item>,
    bounds_tree: BoundsTree,
    region_tree: LooseRegionTree,
    /// Created since the last sync, not yet indexed
    new_items: FxHashSet<ItemKey>,
    /// Moved since the last sync
    dirty_items: FxHashSet<ItemKey>,
    /// Marked for removal, still indexed until the next sync
    removed_items: FxHashSet<ItemKey>,
}

impl Scene {
    pub fn new(config: &VisibilityConfig) -> Self {
        Self {
            items: SlotMap::with_key(),
            bounds_tree: BoundsTree::new(config.bvh.max_items_per_leaf),
            region_tree: LooseRegionTree::from_config(&config.octree),
            new_items: FxHashSet::default(),
            dirty_items: FxHashSet::default(),
            removed_items: FxHashSet::default(),
        }
    }

    // ===== MUTATION =====

    /// Add an item. It becomes visible to queries after the next `sync()`.
    pub fn create_item(&mut self, local_bounds: AABB, transform: Mat4, renderable: Renderable) -> ItemKey {
        let key = self.items.insert(Item::new(local_bounds, transform, renderable));
        self.new_items.insert(key);
        key
    }

    /// Move an item. Returns false if the key is invalid or already removed.
    pub fn set_transform(&mut self, key: ItemKey, transform: Mat4) -> bool {
        if self.removed_items.contains(&key) {
            return false;
        }
        let Some(item) = self.items.get_mut(key) else {
            return false;
        };
        item.set_transform(transform);
        if !self.new_items.contains(&key) {
            self.dirty_items.insert(key);
        }
        true
    }

    /// Mark an item for removal at the next `sync()`.
    /// Returns false if the key is invalid.
    pub fn remove_item(&mut self, key: ItemKey) -> bool {
        if !self.items.contains_key(key) {
            return false;
        }
        self.dirty_items.remove(&key);
        if self.new_items.remove(&key) {
            // Never indexed: drop it right away
            self.items.remove(key);
        } else {
            self.removed_items.insert(key);
        }
        true
    }

    /// Apply all recorded mutations to both spatial indexes.
    ///
    /// Order: removals, then creations, then moves.
    pub fn sync(&mut self) {
        if !self.has_pending_changes() {
            return;
        }

        let removed = std::mem::take(&mut self.removed_items);
        let created = std::mem::take(&mut self.new_items);
        let moved = std::mem::take(&mut self.dirty_items);

        let items = &self.items;
        for index in [&mut self.bounds_tree as &mut dyn SceneIndex, &mut self.region_tree as &mut dyn SceneIndex] {
            for key in &removed {
                index.remove(*key);
            }
            for key in &created {
                match items.get(*key) {
                    Some(item) => index.insert(*key, item.bounds()),
                    None => crate::engine_warn!(SOURCE, "Created item {:?} vanished before sync, skipped", key),
                }
            }
            for key in &moved {
                if let Some(item) = items.get(*key) {
                    index.update(*key, item.bounds());
                }
            }
        }

        for key in &removed {
            self.items.remove(*key);
        }

        crate::engine_debug!(SOURCE, "Synced {} creations, {} moves, {} removals ({} items)",
            created.len(), moved.len(), removed.len(), self.items.len());
    }

    /// Ids of octree cells destroyed by past syncs (for the occlusion controller).
    pub fn take_released_nodes(&mut self) -> Vec<CellId> {
        self.region_tree.take_released_nodes()
    }

    /// Remove every item and reset both indexes.
    pub fn clear(&mut self) {
        self.items.clear();
        self.new_items.clear();
        self.dirty_items.clear();
        self.removed_items.clear();
        self.bounds_tree.clear();
        self.region_tree.clear();
    }

    // ===== ACCESS =====

    pub fn has_pending_changes(&self) -> bool {
        !(self.new_items.is_empty() && self.dirty_items.is_empty() && self.removed_items.is_empty())
    }

    pub fn item(&self, key: ItemKey) -> Option<&Item> {
        self.items.get(key)
    }

    pub fn items(&self) -> impl Iterator<Item = (ItemKey, &Item)> {
        self.items.iter()
    }

    pub(crate) fn item_map(&self) -> &SlotMap<ItemKey, Item> {
        &self.items
    }

    /// Number of stored items (including ones pending removal)
    pub fn item_count(&self) -> usize {
        self.items.len()
    }

    pub fn bounds_tree(&self) -> &BoundsTree {
        &self.bounds_tree
    }

    pub fn region_tree(&self) -> &LooseRegionTree {
        &self.region_tree
    }

    pub fn debug_info(&self) -> DebugInfo {
        DebugInfo {
            entity_count: self.items.len(),
            bvh_node_count: self.bounds_tree.node_count(),
            bvh_depth: self.bounds_tree.depth(),
            octree_cell_count: self.region_tree.cell_count(),
            pending_creations: self.new_items.len(),
            pending_moves: self.dirty_items.len(),
            pending_removals: self.removed_items.len(),
        }
    }
}

#[cfg(test)]
#[path = "scene_tests.rs"]
mod tests;
