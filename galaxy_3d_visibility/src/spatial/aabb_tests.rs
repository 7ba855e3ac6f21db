use glam::{Mat4, Quat, Vec3};
use super::*;

fn make_aabb(min: Vec3, max: Vec3) -> AABB {
    AABB { min, max }
}

// ============================================================================
// Containment / intersection
// ============================================================================

#[test]
fn test_aabb_contains() {
    let big = make_aabb(Vec3::splat(-10.0), Vec3::splat(10.0));
    let small = make_aabb(Vec3::splat(-1.0), Vec3::splat(1.0));
    let straddling = make_aabb(Vec3::splat(5.0), Vec3::splat(15.0));

    assert!(big.contains(&small));
    assert!(!small.contains(&big));
    assert!(!big.contains(&straddling));
    assert!(big.contains(&big));
}

#[test]
fn test_aabb_intersects() {
    let a = make_aabb(Vec3::splat(-2.0), Vec3::splat(2.0));
    let b = make_aabb(Vec3::splat(1.0), Vec3::splat(3.0));
    let c = make_aabb(Vec3::splat(5.0), Vec3::splat(7.0));
    let touching = make_aabb(Vec3::splat(2.0), Vec3::splat(4.0));

    assert!(a.intersects(&b));
    assert!(!a.intersects(&c));
    assert!(a.intersects(&touching));
}

#[test]
fn test_contains_point() {
    let a = make_aabb(Vec3::ZERO, Vec3::ONE);
    assert!(a.contains_point(Vec3::splat(0.5)));
    assert!(a.contains_point(Vec3::ONE));
    assert!(!a.contains_point(Vec3::new(1.5, 0.5, 0.5)));
}

// ============================================================================
// Measures
// ============================================================================

#[test]
fn test_volume_and_union() {
    let a = make_aabb(Vec3::ZERO, Vec3::new(1.0, 2.0, 3.0));
    assert_eq!(a.volume(), 6.0);

    let b = make_aabb(Vec3::splat(2.0), Vec3::splat(3.0));
    let u = a.union(&b);
    assert_eq!(u.min, Vec3::ZERO);
    assert_eq!(u.max, Vec3::new(3.0, 3.0, 3.0));
}

#[test]
fn test_inverted_box_has_zero_volume() {
    let a = make_aabb(Vec3::ONE, Vec3::ZERO);
    assert_eq!(a.volume(), 0.0);
}

#[test]
fn test_half_area_of_flat_box() {
    let flat = make_aabb(Vec3::ZERO, Vec3::new(2.0, 0.0, 3.0));
    assert_eq!(flat.volume(), 0.0);
    assert_eq!(flat.half_area(), 6.0);

    let cube = make_aabb(Vec3::ZERO, Vec3::splat(2.0));
    assert_eq!(cube.half_area(), 12.0);
}

#[test]
fn test_scaled_keeps_center() {
    let a = make_aabb(Vec3::new(2.0, 2.0, 2.0), Vec3::new(4.0, 4.0, 4.0));
    let s = a.scaled(2.0);
    assert_eq!(s.center(), a.center());
    assert_eq!(s.size(), Vec3::splat(4.0));
}

#[test]
fn test_distance_squared_to() {
    let a = make_aabb(Vec3::ZERO, Vec3::ONE);
    assert_eq!(a.distance_squared_to(Vec3::splat(0.5)), 0.0);
    assert_eq!(a.distance_squared_to(Vec3::new(3.0, 0.5, 0.5)), 4.0);
}

// ============================================================================
// Transform (Arvo)
// ============================================================================

#[test]
fn test_transformed_by_translation() {
    let local = make_aabb(Vec3::splat(-1.0), Vec3::splat(1.0));
    let world = local.transformed(&Mat4::from_translation(Vec3::new(10.0, 0.0, -5.0)));
    assert_eq!(world.min, Vec3::new(9.0, -1.0, -6.0));
    assert_eq!(world.max, Vec3::new(11.0, 1.0, -4.0));
}

#[test]
fn test_transformed_by_rotation_is_conservative() {
    let local = make_aabb(Vec3::new(-2.0, -0.5, -0.5), Vec3::new(2.0, 0.5, 0.5));
    let m = Mat4::from_quat(Quat::from_rotation_y(std::f32::consts::FRAC_PI_4));
    let world = local.transformed(&m);

    // Every rotated corner must lie inside the result
    for i in 0..8 {
        let corner = Vec3::new(
            if i & 1 == 0 { local.min.x } else { local.max.x },
            if i & 2 == 0 { local.min.y } else { local.max.y },
            if i & 4 == 0 { local.min.z } else { local.max.z },
        );
        let p = m.transform_point3(corner);
        assert!(world.min.cmple(p + Vec3::splat(1e-4)).all());
        assert!(world.max.cmpge(p - Vec3::splat(1e-4)).all());
    }
}

// ============================================================================
// Ray
// ============================================================================

#[test]
fn test_ray_hits_box_in_front() {
    let a = make_aabb(Vec3::new(-1.0, -1.0, -6.0), Vec3::new(1.0, 1.0, -4.0));
    let t = a.ray_intersection(Vec3::ZERO, Vec3::NEG_Z, 100.0);
    assert_eq!(t, Some(4.0));
}

#[test]
fn test_ray_misses_box_behind_or_beyond_range() {
    let a = make_aabb(Vec3::new(-1.0, -1.0, -6.0), Vec3::new(1.0, 1.0, -4.0));
    assert_eq!(a.ray_intersection(Vec3::ZERO, Vec3::Z, 100.0), None);
    assert_eq!(a.ray_intersection(Vec3::ZERO, Vec3::NEG_Z, 3.0), None);
}

#[test]
fn test_ray_origin_inside_box() {
    let a = make_aabb(Vec3::splat(-1.0), Vec3::splat(1.0));
    assert_eq!(a.ray_intersection(Vec3::ZERO, Vec3::X, 10.0), Some(0.0));
}
