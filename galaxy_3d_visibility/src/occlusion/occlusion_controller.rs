/// OcclusionController — per-cell occlusion query state machine.
///
/// Called by the octree traversal for every cell that passed the frustum
/// test. Each cell gets an asynchronous any-samples query on its outer
/// bound. Results are read back on a later visit without blocking, so a
/// decision always uses the last known visibility:
///
/// ```text
///   Uninitialized ──issue──▶ (pending, counts as visible)
///   pending ──poll: visible──▶ VisibleSteady (skip_count = N)
///   pending ──poll: occluded─▶ Hidden (subtree skipped, re-queried)
///   VisibleSteady ──N coherent frames──▶ re-queried (VisiblePending)
/// ```
///
/// New queries are limited per frame; cells over budget keep their last
/// known visibility.

use rustc_hash::FxHashMap;
use glam::{Mat4, Vec3};
use crate::backend::{GraphicsBackend, QueryHandle, QueryStatus};
use crate::config::OcclusionConfig;
use crate::spatial::{AABB, CellId};
use super::geometry_cache::GeometryCache;

const SOURCE: &str = "galaxy3d::Occlusion";

/// Derived query state of an octree cell
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OcclusionState {
    /// No result received yet
    Uninitialized,
    /// Visible, no query in flight
    VisibleSteady,
    /// Visible, re-query in flight
    VisiblePending,
    /// Last result was occluded
    Hidden,
}

/// Per-frame occlusion counters, reset by `begin_frame`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OcclusionStats {
    pub queries_issued: u32,
    pub visible_results: u32,
    pub hidden_results: u32,
    /// Visible-steady cells rendered without a query
    pub coherent_skips: u32,
    /// Cells containing the eye, rendered without a query
    pub camera_inside_skips: u32,
    /// Queries not issued because the frame budget was spent
    pub budget_deferrals: u32,
    /// Subtrees skipped as occluded
    pub culled_subtrees: u32,
    pub backend_failures: u32,
}

#[derive(Debug, Default)]
struct CellOcclusion {
    query: Option<QueryHandle>,
    pending: bool,
    visible: bool,
    skip_count: u32,
    initialized: bool,
}

impl CellOcclusion {
    fn state(&self) -> OcclusionState {
        match (self.initialized, self.visible, self.pending) {
            (false, _, _) => OcclusionState::Uninitialized,
            (true, false, _) => OcclusionState::Hidden,
            (true, true, true) => OcclusionState::VisiblePending,
            (true, true, false) => OcclusionState::VisibleSteady,
        }
    }

    /// Visibility to act on while no fresh result is available
    fn last_known_visible(&self) -> bool {
        !self.initialized || self.visible
    }
}

/// Owns every occlusion query and proxy mesh of the engine.
pub struct OcclusionController {
    config: OcclusionConfig,
    cells: FxHashMap<CellId, CellOcclusion>,
    geometry_cache: GeometryCache,
    budget_remaining: u32,
    frame: u64,
    stats: OcclusionStats,
}

impl OcclusionController {
    pub fn new(config: OcclusionConfig) -> Self {
        Self {
            budget_remaining: config.query_budget,
            config,
            cells: FxHashMap::default(),
            geometry_cache: GeometryCache::new(),
            frame: 0,
            stats: OcclusionStats::default(),
        }
    }

    pub fn config(&self) -> &OcclusionConfig {
        &self.config
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    pub fn stats(&self) -> &OcclusionStats {
        &self.stats
    }

    pub fn frame(&self) -> u64 {
        self.frame
    }

    /// Number of cells with attached query state
    pub fn tracked_cells(&self) -> usize {
        self.cells.len()
    }

    pub fn geometry_cache(&self) -> &GeometryCache {
        &self.geometry_cache
    }

    pub fn state(&self, cell: CellId) -> OcclusionState {
        self.cells
            .get(&cell)
            .map_or(OcclusionState::Uninitialized, CellOcclusion::state)
    }

    /// Reset the query budget and the per-frame counters.
    pub fn begin_frame(&mut self) {
        self.frame += 1;
        self.budget_remaining = self.config.query_budget;
        self.stats = OcclusionStats::default();
    }

    /// Decide whether the cell (and its subtree) is rendered this frame.
    ///
    /// `outer` is the cell's loose bound, used as the query proxy.
    pub fn visit(
        &mut self,
        cell: CellId,
        outer: &AABB,
        eye: Vec3,
        backend: &mut dyn GraphicsBackend,
    ) -> bool {
        if !self.config.enabled {
            return true;
        }

        let state = self.cells.entry(cell).or_default();

        // Eye inside the proxy: the query would be meaningless
        if outer.contains_point(eye) {
            state.skip_count = state.skip_count.saturating_sub(1);
            self.stats.camera_inside_skips += 1;
            return true;
        }

        if state.state() == OcclusionState::VisibleSteady && state.skip_count > 0 {
            state.skip_count -= 1;
            self.stats.coherent_skips += 1;
            return true;
        }

        if !state.pending {
            let visible = state.last_known_visible();
            self.try_issue(cell, outer, backend);
            if !visible {
                self.stats.culled_subtrees += 1;
            }
            return visible;
        }

        let Some(query) = state.query else {
            state.pending = false;
            return state.last_known_visible();
        };

        match backend.poll_occlusion_query(query) {
            Ok(QueryStatus::NotReady) => {
                let visible = state.last_known_visible();
                if !visible {
                    self.stats.culled_subtrees += 1;
                }
                visible
            }
            Ok(QueryStatus::Visible) => {
                state.pending = false;
                state.initialized = true;
                state.visible = true;
                state.skip_count = self.config.visible_skip_frames;
                self.stats.visible_results += 1;
                true
            }
            Ok(QueryStatus::Occluded) => {
                state.pending = false;
                state.initialized = true;
                state.visible = false;
                state.skip_count = 0;
                self.stats.hidden_results += 1;
                self.stats.culled_subtrees += 1;
                // Keep testing hidden cells every frame so they reappear promptly
                self.try_issue(cell, outer, backend);
                false
            }
            Err(err) => {
                crate::engine_warn!(SOURCE, "Query for cell {} failed ({}), treated as visible", cell, err);
                state.pending = false;
                state.visible = true;
                self.stats.backend_failures += 1;
                true
            }
        }
    }

    /// Issue a query for `cell` if the frame budget allows.
    ///
    /// The proxy box is fetched here, so cells that are never queried
    /// allocate no backend geometry.
    fn try_issue(&mut self, cell: CellId, outer: &AABB, backend: &mut dyn GraphicsBackend) {
        if self.budget_remaining == 0 {
            self.stats.budget_deferrals += 1;
            return;
        }

        let proxy = match self.geometry_cache.get_or_create(outer.size(), backend) {
            Ok(proxy) => proxy,
            Err(err) => {
                crate::engine_warn!(SOURCE, "Proxy box for cell {} unavailable ({}), drawn unculled", cell, err);
                self.stats.backend_failures += 1;
                return;
            }
        };

        let Some(state) = self.cells.get_mut(&cell) else { return };

        let query = match state.query {
            Some(query) => query,
            None => match backend.create_occlusion_query() {
                Ok(query) => {
                    state.query = Some(query);
                    query
                }
                Err(err) => {
                    crate::engine_warn!(SOURCE, "Cannot create query for cell {}: {}", cell, err);
                    self.stats.backend_failures += 1;
                    return;
                }
            },
        };

        let transform = Mat4::from_translation(outer.center());
        match backend.issue_occlusion_query(query, proxy, &transform) {
            Ok(()) => {
                state.pending = true;
                self.budget_remaining -= 1;
                self.stats.queries_issued += 1;
            }
            Err(err) => {
                crate::engine_warn!(SOURCE, "Cannot issue query for cell {}: {}", cell, err);
                self.stats.backend_failures += 1;
            }
        }
    }

    /// Drop the state of destroyed cells and destroy their queries.
    pub fn release_nodes(&mut self, cells: &[CellId], backend: &mut dyn GraphicsBackend) {
        for cell in cells {
            if let Some(query) = self.cells.remove(cell).and_then(|state| state.query) {
                backend.destroy_occlusion_query(query);
            }
        }
    }

    /// Destroy every query and forget all cell state.
    pub fn clear(&mut self, backend: &mut dyn GraphicsBackend) {
        let released = self.cells.len();
        for (_, state) in self.cells.drain() {
            if let Some(query) = state.query {
                backend.destroy_occlusion_query(query);
            }
        }
        // Proxy boxes are keyed by extents only and stay valid
        crate::engine_debug!(SOURCE, "Cleared occlusion state of {} cells ({} proxy boxes kept)",
            released, self.geometry_cache.len());
    }
}

#[cfg(test)]
#[path = "occlusion_controller_tests.rs"]
mod tests;
