/// Spatial acceleration structures for scene queries.
///
/// A SceneIndex indexes Items by their world-space AABB for frustum
/// culling and spatial queries. Both the BoundsTree (BVH) and the
/// LooseRegionTree (octree) implement it, and the Scene keeps them in sync.

use crate::camera::Frustum;
use super::aabb::AABB;
use super::item::ItemKey;

/// Trait for spatial indexing of scene items.
///
/// Structural changes (insert/remove/update) must all be applied before a
/// frame's traversal starts; traversals borrow the index immutably.
pub trait SceneIndex: Send + Sync {
    /// Insert an item with its world-space AABB. Re-inserting a key moves it.
    fn insert(&mut self, key: ItemKey, world_aabb: &AABB);

    /// Remove an item. Removing an absent key is a no-op.
    fn remove(&mut self, key: ItemKey);

    /// Move an item to a new world-space AABB (after a transform change).
    fn update(&mut self, key: ItemKey, world_aabb: &AABB);

    /// Query all items whose world AABB intersects the frustum.
    /// Results are appended to `results`, each key at most once.
    fn query_frustum(&self, frustum: &Frustum, results: &mut Vec<ItemKey>);

    /// Remove all items and nodes.
    fn clear(&mut self);

    /// Number of indexed items.
    fn entity_count(&self) -> usize;

    /// Number of live nodes (cells).
    fn node_count(&self) -> usize;
}
