/*!
# Galaxy 3D Visibility

Spatial visibility and render batching for the Galaxy 3D engine.

Maintains spatial indexes over renderable items, decides each frame which
items a camera can see (frustum + GPU occlusion queries with temporal
coherence), and compiles the visible set into a minimal number of draws
through dynamic instancing.

## Architecture

- **BoundsTree**: dynamic BVH, front-to-back frustum traversal (occluder pre-pass)
- **LooseRegionTree**: loose octree, ordered traversal driving occlusion culling, raycasts
- **OcclusionController**: per-cell asynchronous query state machine with a per-frame budget
- **RenderBatchCompiler**: per-renderable batches, grow-only instance buffers, `BatchDraw`s
- **Scene**: item storage with deferred mutation applied by `sync()`
- **VisibilityEngine**: per-frame driver for the main and shadow passes

The GPU is reached only through the `GraphicsBackend` trait.
*/

// Internal modules
mod error;
mod engine;
pub mod log;
pub mod config;
pub mod camera;
pub mod spatial;
pub mod backend;
pub mod occlusion;
pub mod batch;
pub mod scene;
mod utils;

// Main galaxy3d namespace module
pub mod galaxy3d {
    // Error types
    pub use crate::error::{Error, Result};

    // Engine singleton
    pub use crate::engine::Engine;

    // Frame driver
    pub use crate::scene::VisibilityEngine;

    // Configuration
    pub use crate::config::{
        VisibilityConfig, BvhConfig, OctreeConfig, OcclusionConfig, BatchConfig,
    };

    // Logging sub-module (types only, NOT macros)
    pub mod log {
        pub use crate::log::{Logger, LogEntry, LogSeverity, DefaultLogger, format_entry};
        // Note: engine_* macros are NOT re-exported here - they are internal only
    }

    // Camera sub-module
    pub mod camera {
        pub use crate::camera::*;
    }

    // Spatial index sub-module
    pub mod spatial {
        pub use crate::spatial::*;
    }

    // Graphics backend sub-module
    pub mod backend {
        pub use crate::backend::{
            Buffer, BufferDesc, GraphicsBackend, QueryHandle, QueryStatus, INSTANCE_STRIDE,
        };
    }

    // Occlusion sub-module
    pub mod occlusion {
        pub use crate::occlusion::*;
    }

    // Batching sub-module
    pub mod batch {
        pub use crate::batch::*;
    }

    // Scene sub-module
    pub mod scene {
        pub use crate::scene::*;
    }
}

// Re-export math library at crate root
pub use glam;
