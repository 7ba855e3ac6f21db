/// Camera — low-level passive data container.
///
/// The caller (game engine) computes the view and projection matrices;
/// the culling traversals only read the eye position (for front-to-back
/// ordering and camera-inside-cell tests) and the frustum.

use glam::{Mat4, Vec3};
use super::frustum::Frustum;

/// Low-level camera. A passive data container.
///
/// `position` must be the world-space eye of `view_matrix`; it is stored
/// separately so traversals do not invert the view matrix per frame.
#[derive(Debug, Clone)]
pub struct Camera {
    position: Vec3,
    view_matrix: Mat4,
    projection_matrix: Mat4,
    frustum: Frustum,
}

impl Camera {
    /// Create a new camera with the given parameters.
    pub fn new(position: Vec3, view: Mat4, projection: Mat4, frustum: Frustum) -> Self {
        Self {
            position,
            view_matrix: view,
            projection_matrix: projection,
            frustum,
        }
    }

    /// Create a camera whose frustum is extracted from `projection * view`.
    pub fn from_matrices(position: Vec3, view: Mat4, projection: Mat4) -> Self {
        let frustum = Frustum::from_view_projection(&(projection * view));
        Self::new(position, view, projection, frustum)
    }

    // ===== GETTERS =====

    /// World-space eye position.
    pub fn position(&self) -> Vec3 {
        self.position
    }

    /// View matrix (inverse of the camera's world transform).
    pub fn view_matrix(&self) -> &Mat4 {
        &self.view_matrix
    }

    /// Projection matrix (perspective or orthographic).
    pub fn projection_matrix(&self) -> &Mat4 {
        &self.projection_matrix
    }

    /// Combined view-projection matrix (projection * view).
    pub fn view_projection_matrix(&self) -> Mat4 {
        self.projection_matrix * self.view_matrix
    }

    /// Frustum planes for culling.
    pub fn frustum(&self) -> &Frustum {
        &self.frustum
    }

    // ===== SETTERS — store, compute nothing =====

    pub fn set_position(&mut self, position: Vec3) {
        self.position = position;
    }

    pub fn set_view(&mut self, matrix: Mat4) {
        self.view_matrix = matrix;
    }

    pub fn set_projection(&mut self, matrix: Mat4) {
        self.projection_matrix = matrix;
    }

    pub fn set_frustum(&mut self, frustum: Frustum) {
        self.frustum = frustum;
    }
}
