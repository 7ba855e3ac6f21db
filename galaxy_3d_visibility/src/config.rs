/// Configuration for the visibility engine.
///
/// Plain data with `Default` values tuned for a typical open-world scene.
/// The caller builds a `VisibilityConfig`, adjusts fields, and passes it to
/// `VisibilityEngine::new()`, which validates it once.

use glam::Vec3;
use crate::error::{Error, Result};

/// BoundsTree (BVH) settings
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BvhConfig {
    /// Maximum items in a leaf before it is split
    pub max_items_per_leaf: usize,
}

impl Default for BvhConfig {
    fn default() -> Self {
        Self { max_items_per_leaf: 4 }
    }
}

/// LooseRegionTree (octree) settings
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OctreeConfig {
    /// World-space center of the root cell
    pub center: Vec3,
    /// Half extent of the root cell (tight bound)
    pub half_size: f32,
    /// Outer bound scale relative to the tight cell
    pub loose_factor: f32,
    /// Maximum subdivision depth (root = 0)
    pub max_depth: u32,
}

impl Default for OctreeConfig {
    fn default() -> Self {
        Self {
            center: Vec3::ZERO,
            half_size: 1024.0,
            loose_factor: 2.0,
            max_depth: 8,
        }
    }
}

/// Occlusion Query Controller settings
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OcclusionConfig {
    /// Disable to render every frustum-visible octree node
    pub enabled: bool,
    /// New queries that may be issued per frame
    pub query_budget: u32,
    /// Frames a node stays visible without re-querying after a visible result
    pub visible_skip_frames: u32,
}

impl Default for OcclusionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            query_budget: 100,
            visible_skip_frames: 5,
        }
    }
}

/// Render Batch Compiler settings
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BatchConfig {
    /// Passes a batch may stay unused before its instance buffer is dropped
    pub reclaim_after_passes: u64,
    /// Minimum `radius / distance` for an item to be drawn as an occluder
    pub occluder_min_screen_ratio: f32,
    /// Maximum occluders drawn depth-only per frame
    pub max_occluders: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            reclaim_after_passes: 120,
            occluder_min_screen_ratio: 0.15,
            max_occluders: 32,
        }
    }
}

/// Complete visibility engine configuration
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct VisibilityConfig {
    pub bvh: BvhConfig,
    pub octree: OctreeConfig,
    pub occlusion: OcclusionConfig,
    pub batching: BatchConfig,
}

impl VisibilityConfig {
    /// Check every field for values the trees and compilers cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.bvh.max_items_per_leaf == 0 {
            return Err(Error::InvalidConfig(
                "bvh.max_items_per_leaf must be at least 1".to_string()));
        }
        if !(self.octree.half_size.is_finite() && self.octree.half_size > 0.0) {
            return Err(Error::InvalidConfig(format!(
                "octree.half_size must be positive and finite (got {})", self.octree.half_size)));
        }
        if !self.octree.center.is_finite() {
            return Err(Error::InvalidConfig("octree.center must be finite".to_string()));
        }
        if !(self.octree.loose_factor >= 1.0 && self.octree.loose_factor.is_finite()) {
            return Err(Error::InvalidConfig(format!(
                "octree.loose_factor must be >= 1.0 (got {})", self.octree.loose_factor)));
        }
        if self.octree.max_depth > 16 {
            return Err(Error::InvalidConfig(format!(
                "octree.max_depth must be <= 16 (got {})", self.octree.max_depth)));
        }
        if self.batching.occluder_min_screen_ratio < 0.0 {
            return Err(Error::InvalidConfig(
                "batching.occluder_min_screen_ratio must not be negative".to_string()));
        }
        Ok(())
    }
}
