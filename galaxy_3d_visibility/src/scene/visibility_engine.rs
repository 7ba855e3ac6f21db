/// VisibilityEngine — per-frame driver tying the scene, the occlusion
/// controller and the two batch compilers together.
///
/// Typical frame:
///
/// ```ignore
/// let mut engine = VisibilityEngine::new(VisibilityConfig::default())?;
/// let key = engine.scene_mut().create_item(local_bounds, world, renderable);
///
/// // every frame
/// engine.scene_mut().set_transform(key, new_world);
/// engine.render_shadows(&light_camera, &mut backend)?;
/// let stats = engine.render_frame(&camera, &mut backend)?;
/// ```

use crate::backend::GraphicsBackend;
use crate::batch::{BatchStats, PassKind, RenderBatchCompiler};
use crate::camera::Camera;
use crate::config::VisibilityConfig;
use crate::error::Result;
use crate::occlusion::{OcclusionController, OcclusionStats};
use super::scene::{DebugInfo, Scene};

const SOURCE: &str = "galaxy3d::VisibilityEngine";

/// What one rendered pass did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    /// Occlusion counters of the frame (zero for shadow passes)
    pub occlusion: OcclusionStats,
    pub batches: BatchStats,
    /// Draws submitted to the backend (depth-only occluders excluded)
    pub draw_calls: u32,
}

pub struct VisibilityEngine {
    config: VisibilityConfig,
    scene: Scene,
    occlusion: OcclusionController,
    main_pass: RenderBatchCompiler,
    shadow_pass: RenderBatchCompiler,
}

impl VisibilityEngine {
    /// Create an engine after validating `config`.
    pub fn new(config: VisibilityConfig) -> Result<Self> {
        config.validate()?;

        crate::engine_info!(SOURCE, "Visibility engine created (octree half size {}, depth {}, query budget {})",
            config.octree.half_size, config.octree.max_depth, config.occlusion.query_budget);

        Ok(Self {
            scene: Scene::new(&config),
            occlusion: OcclusionController::new(config.occlusion),
            main_pass: RenderBatchCompiler::new(PassKind::Main, config.batching),
            shadow_pass: RenderBatchCompiler::new(PassKind::Shadow, config.batching),
            config,
        })
    }

    pub fn config(&self) -> &VisibilityConfig {
        &self.config
    }

    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    /// Scene access for item creation, moves and removals
    pub fn scene_mut(&mut self) -> &mut Scene {
        &mut self.scene
    }

    pub fn occlusion(&self) -> &OcclusionController {
        &self.occlusion
    }

    pub fn main_compiler(&self) -> &RenderBatchCompiler {
        &self.main_pass
    }

    pub fn shadow_compiler(&self) -> &RenderBatchCompiler {
        &self.shadow_pass
    }

    pub fn debug_info(&self) -> DebugInfo {
        self.scene.debug_info()
    }

    /// Apply pending scene mutations and release queries of destroyed cells.
    ///
    /// Called by both render methods; cell ids are recycled, so released
    /// ids must reach the controller before the next traversal.
    pub fn sync(&mut self, backend: &mut dyn GraphicsBackend) {
        self.scene.sync();
        let released = self.scene.take_released_nodes();
        if !released.is_empty() {
            self.occlusion.release_nodes(&released, backend);
        }
    }

    /// Cull and draw the scene for `camera`.
    pub fn render_frame(&mut self, camera: &Camera, backend: &mut dyn GraphicsBackend) -> Result<FrameStats> {
        self.sync(backend);
        self.occlusion.begin_frame();

        let draws = self
            .main_pass
            .compile_batches(&self.scene, camera, Some(&mut self.occlusion), backend);
        RenderBatchCompiler::submit(&draws, backend)?;

        Ok(FrameStats {
            occlusion: *self.occlusion.stats(),
            batches: *self.main_pass.stats(),
            draw_calls: draws.len() as u32,
        })
    }

    /// Draw the shadow casters seen by `light`.
    pub fn render_shadows(&mut self, light: &Camera, backend: &mut dyn GraphicsBackend) -> Result<FrameStats> {
        self.sync(backend);

        let draws = self.shadow_pass.compile_batches(&self.scene, light, None, backend);
        RenderBatchCompiler::submit(&draws, backend)?;

        Ok(FrameStats {
            occlusion: OcclusionStats::default(),
            batches: *self.shadow_pass.stats(),
            draw_calls: draws.len() as u32,
        })
    }

    /// Remove every item and destroy every query.
    pub fn clear(&mut self, backend: &mut dyn GraphicsBackend) {
        self.occlusion.clear(backend);
        self.scene.clear();
        // Queries are already gone
        self.scene.take_released_nodes();
    }
}
