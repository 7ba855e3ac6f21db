//! Scene: item storage with deferred mutation, and the frame-level facade

mod scene;
mod visibility_engine;

pub use scene::{Scene, DebugInfo};
pub use visibility_engine::{VisibilityEngine, FrameStats};
