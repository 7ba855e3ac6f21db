/// Axis-aligned bounding box shared by both spatial trees.

use glam::{Mat4, Vec3};

/// Axis-Aligned Bounding Box
///
/// Items carry a local-space AABB that is transformed into world space
/// (Arvo method) whenever their world matrix changes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AABB {
    /// Minimum corner (x, y, z)
    pub min: Vec3,
    /// Maximum corner (x, y, z)
    pub max: Vec3,
}

impl AABB {
    /// Create an AABB from its two corners.
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// Create an AABB from a center point and half extents.
    pub fn from_center_half_extents(center: Vec3, half_extents: Vec3) -> Self {
        Self {
            min: center - half_extents,
            max: center + half_extents,
        }
    }

    /// Center point of this AABB.
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    /// Full extent along each axis.
    pub fn size(&self) -> Vec3 {
        self.max - self.min
    }

    /// Half extent along each axis.
    pub fn half_extents(&self) -> Vec3 {
        self.size() * 0.5
    }

    /// Radius of the bounding sphere around the box.
    pub fn radius(&self) -> f32 {
        self.half_extents().length()
    }

    /// Volume (zero for flat or inverted boxes).
    pub fn volume(&self) -> f32 {
        let d = self.size().max(Vec3::ZERO);
        d.x * d.y * d.z
    }

    /// Half of the surface area. Non-zero for flat boxes, unlike `volume`.
    pub fn half_area(&self) -> f32 {
        let d = self.size().max(Vec3::ZERO);
        d.x * d.y + d.y * d.z + d.z * d.x
    }

    /// Smallest AABB containing both boxes.
    pub fn union(&self, other: &AABB) -> AABB {
        AABB {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    /// Scale the box around its center.
    pub fn scaled(&self, factor: f32) -> AABB {
        AABB::from_center_half_extents(self.center(), self.half_extents() * factor)
    }

    /// Transform this local-space AABB by a matrix, returning a new AABB.
    ///
    /// Uses the Arvo method: projects each matrix axis onto the AABB extents
    /// for an exact (tight) result without transforming all 8 corners.
    pub fn transformed(&self, matrix: &Mat4) -> AABB {
        let translation = matrix.col(3).truncate();
        let mut new_min = translation;
        let mut new_max = translation;

        for i in 0..3 {
            let axis = matrix.col(i).truncate();
            let a = axis * self.min[i];
            let b = axis * self.max[i];
            new_min += a.min(b);
            new_max += a.max(b);
        }

        AABB { min: new_min, max: new_max }
    }

    /// Test if this AABB fully contains another AABB.
    pub fn contains(&self, other: &AABB) -> bool {
        self.min.x <= other.min.x && self.max.x >= other.max.x
        && self.min.y <= other.min.y && self.max.y >= other.max.y
        && self.min.z <= other.min.z && self.max.z >= other.max.z
    }

    /// Test if a point lies inside (or on the boundary of) this AABB.
    pub fn contains_point(&self, point: Vec3) -> bool {
        point.cmpge(self.min).all() && point.cmple(self.max).all()
    }

    /// Test if this AABB intersects (overlaps or touches) another AABB.
    pub fn intersects(&self, other: &AABB) -> bool {
        self.min.x <= other.max.x && self.max.x >= other.min.x
        && self.min.y <= other.max.y && self.max.y >= other.min.y
        && self.min.z <= other.max.z && self.max.z >= other.min.z
    }

    /// Squared distance from a point to the closest point of the box (0 inside).
    pub fn distance_squared_to(&self, point: Vec3) -> f32 {
        let closest = point.clamp(self.min, self.max);
        closest.distance_squared(point)
    }

    /// Slab test. Returns the entry distance along `direction` in `[0, max_distance]`.
    ///
    /// `direction` need not be normalized; the result is in units of `direction`.
    pub fn ray_intersection(&self, origin: Vec3, direction: Vec3, max_distance: f32) -> Option<f32> {
        let inv = direction.recip();
        let t1 = (self.min - origin) * inv;
        let t2 = (self.max - origin) * inv;

        // NaN from 0 * inf (origin on a slab plane, axis-parallel ray) is ignored by min/max
        let t_near = t1.min(t2);
        let t_far = t1.max(t2);

        let t_enter = t_near.max_element().max(0.0);
        let t_exit = t_far.min_element().min(max_distance);

        if t_enter <= t_exit {
            Some(t_enter)
        } else {
            None
        }
    }
}

#[cfg(test)]
#[path = "aabb_tests.rs"]
mod tests;
