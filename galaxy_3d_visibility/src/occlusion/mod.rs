//! Hierarchical occlusion culling with asynchronous GPU queries

mod geometry_cache;
mod occlusion_controller;

pub use geometry_cache::GeometryCache;
pub use occlusion_controller::{OcclusionController, OcclusionState, OcclusionStats};
