//! Spatial indexes over renderable items
//!
//! - `BoundsTree`: dynamic BVH with front-to-back frustum traversal
//! - `LooseRegionTree`: loose octree driving occlusion-culled traversal
//! - `FRONT_TO_BACK`: camera-relative child ordering for octree walks

mod aabb;
mod item;
mod scene_index;
mod bounds_tree;
mod loose_region_tree;
mod traversal_order;

pub use aabb::AABB;
pub use item::{Item, ItemKey, Renderable, RenderFlags, GeometryId, MaterialId};
pub use scene_index::SceneIndex;
pub use bounds_tree::BoundsTree;
pub use loose_region_tree::{LooseRegionTree, OctreeCell, OctreeVisitor, CellId, RayHit};
pub use traversal_order::{FRONT_TO_BACK, point_octant, front_to_back_order};
