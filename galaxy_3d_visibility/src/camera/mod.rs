//! Camera module — viewer camera and frustum.
//!
//! Passive data containers consumed by the culling traversals.
//! The engine does NOT store or manage cameras — they are owned and
//! driven by the caller (one for the main view, one per shadow caster).

mod camera;
mod frustum;

pub use camera::Camera;
pub use frustum::{
    Frustum, FrustumTest,
    PLANE_LEFT, PLANE_RIGHT, PLANE_BOTTOM, PLANE_TOP, PLANE_NEAR, PLANE_FAR,
};
