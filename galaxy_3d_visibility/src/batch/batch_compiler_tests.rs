use glam::{Mat4, Vec3};
use crate::backend::mock_backend::{DrawCall, MockBackend};
use crate::backend::QueryStatus;
use crate::camera::Camera;
use crate::config::{BatchConfig, OcclusionConfig, OctreeConfig, VisibilityConfig};
use crate::occlusion::OcclusionController;
use crate::scene::Scene;
use crate::spatial::{GeometryId, MaterialId, RenderFlags};
use super::*;

// ============================================================================
// Helpers
// ============================================================================

fn renderable(geometry: u32, flags: RenderFlags) -> Renderable {
    Renderable::new(GeometryId(geometry), MaterialId(1), flags)
}

fn unit_bounds() -> AABB {
    AABB::new(Vec3::splat(-0.5), Vec3::splat(0.5))
}

fn top_down_camera(half: f32, height: f32) -> Camera {
    let position = Vec3::new(0.0, height, 0.0);
    let view = Mat4::look_at_rh(position, Vec3::ZERO, Vec3::NEG_Z);
    let projection = Mat4::orthographic_rh(-half, half, -half, half, 0.1, height * 2.0);
    Camera::from_matrices(position, view, projection)
}

/// 10x10 grid 5 units apart; item `i` uses `pick(i)` as renderable.
fn grid_scene(pick: impl Fn(usize) -> Renderable) -> (Scene, Vec<ItemKey>) {
    let mut scene = Scene::new(&VisibilityConfig::default());
    let mut keys = Vec::new();
    for x in 0..10 {
        for z in 0..10 {
            let position = Vec3::new(x as f32 * 5.0 - 22.5, 0.0, z as f32 * 5.0 - 22.5);
            let index = keys.len();
            keys.push(scene.create_item(unit_bounds(), Mat4::from_translation(position), pick(index)));
        }
    }
    scene.sync();
    (scene, keys)
}

fn row_scene(count: usize, r: Renderable) -> (Scene, Vec<ItemKey>) {
    let mut scene = Scene::new(&VisibilityConfig::default());
    let keys = (0..count)
        .map(|i| scene.create_item(unit_bounds(), Mat4::from_translation(Vec3::new(i as f32 * 2.0 - 8.0, 0.0, 0.0)), r))
        .collect();
    scene.sync();
    (scene, keys)
}

fn main_compiler() -> RenderBatchCompiler {
    RenderBatchCompiler::new(PassKind::Main, BatchConfig::default())
}

fn total_items(draws: &[BatchDraw]) -> u32 {
    draws.iter().map(BatchDraw::item_count).sum()
}

// ============================================================================
// Batching
// ============================================================================

#[test]
fn test_counts_sum_to_visible_items() {
    let (scene, _) = grid_scene(|i| renderable(i as u32 % 3, RenderFlags::empty()));
    let camera = top_down_camera(10.0, 50.0);
    let mut backend = MockBackend::new();
    let mut compiler = main_compiler();

    let draws = compiler.compile_batches(&scene, &camera, None, &mut backend);

    let expected = scene
        .items()
        .filter(|(_, item)| camera.frustum().intersects_aabb(item.bounds()))
        .count();
    assert_eq!(expected, 16);
    assert_eq!(total_items(&draws), 16);
    assert_eq!(compiler.stats().visible_items, 16);
    assert_eq!(compiler.stats().active_batches, 3);
    assert_eq!(backend.depth_only_count(), 0);
}

#[test]
fn test_instance_transforms_are_bit_exact() {
    let r = renderable(1, RenderFlags::empty());
    let (scene, keys) = grid_scene(|_| r);
    let camera = top_down_camera(10.0, 50.0);
    let mut backend = MockBackend::new();
    let mut compiler = main_compiler();

    let draws = compiler.compile_batches(&scene, &camera, None, &mut backend);
    assert_eq!(draws.len(), 1);
    let BatchDraw::Instanced { count, .. } = &draws[0] else {
        panic!("16 items of one renderable should be instanced");
    };
    assert_eq!(*count, 16);

    let uploaded = backend.buffers[0].transforms(16);
    let expected: Vec<Mat4> = keys
        .iter()
        .filter_map(|key| scene.item(*key))
        .filter(|item| camera.frustum().intersects_aabb(item.bounds()))
        .map(|item| *item.transform())
        .collect();
    assert_eq!(expected.len(), 16);
    for transform in &expected {
        let matches = uploaded
            .iter()
            .filter(|t| t.to_cols_array().map(f32::to_bits) == transform.to_cols_array().map(f32::to_bits))
            .count();
        assert_eq!(matches, 1);
    }

    // Batch slots line up with the uploaded data
    let batch = compiler.batch(&r).unwrap();
    assert_eq!(batch.transforms(), uploaded.as_slice());
}

#[test]
fn test_single_and_instanced_draws() {
    let lone = renderable(1, RenderFlags::empty());
    let shared = renderable(2, RenderFlags::empty());
    let mut scene = Scene::new(&VisibilityConfig::default());
    scene.create_item(unit_bounds(), Mat4::from_translation(Vec3::new(-3.0, 0.0, 0.0)), lone);
    for i in 0..3 {
        scene.create_item(unit_bounds(), Mat4::from_translation(Vec3::new(i as f32, 0.0, 3.0)), shared);
    }
    scene.sync();

    let mut backend = MockBackend::new();
    let mut compiler = main_compiler();
    let draws = compiler.compile_batches(&scene, &top_down_camera(10.0, 50.0), None, &mut backend);

    assert_eq!(draws.len(), 2);
    let singles: Vec<&BatchDraw> = draws.iter().filter(|d| matches!(d, BatchDraw::Single { .. })).collect();
    assert_eq!(singles.len(), 1);
    assert_eq!(*singles[0].renderable(), lone);
    assert!(draws.iter().any(|d| matches!(d, BatchDraw::Instanced { count: 3, .. })));
    assert_eq!(compiler.stats().single_draws, 1);
    assert_eq!(compiler.stats().instanced_draws, 1);
}

#[test]
fn test_instance_buffer_grows_never_shrinks() {
    let r = renderable(1, RenderFlags::empty());
    let (mut scene, keys) = row_scene(9, r);
    let camera = top_down_camera(20.0, 50.0);
    let mut backend = MockBackend::new();
    let mut compiler = main_compiler();

    // 5 of 9: remove 4
    for key in &keys[5..] {
        scene.remove_item(*key);
    }
    scene.sync();
    compiler.compile_batches(&scene, &camera, None, &mut backend);
    assert_eq!(compiler.batch(&r).map(RenderBatch::capacity), Some(8));

    // 2 left: capacity kept
    for key in &keys[2..5] {
        scene.remove_item(*key);
    }
    scene.sync();
    compiler.compile_batches(&scene, &camera, None, &mut backend);
    assert_eq!(compiler.batch(&r).map(RenderBatch::capacity), Some(8));
    assert_eq!(backend.buffers.len(), 1);

    // 9 visible: next power of two
    for i in 0..7 {
        scene.create_item(unit_bounds(), Mat4::from_translation(Vec3::new(i as f32, 0.0, 5.0)), r);
    }
    scene.sync();
    compiler.compile_batches(&scene, &camera, None, &mut backend);
    assert_eq!(compiler.batch(&r).map(RenderBatch::capacity), Some(16));
    assert_eq!(backend.buffers.len(), 2);
    assert_eq!(backend.buffers[1].size, 16 * 64);
}

#[test]
fn test_static_batch_uploads_once() {
    let r = renderable(1, RenderFlags::empty());
    let (scene, _) = row_scene(4, r);
    let camera = top_down_camera(20.0, 50.0);
    let mut backend = MockBackend::new();
    let mut compiler = main_compiler();

    compiler.compile_batches(&scene, &camera, None, &mut backend);
    assert_eq!(compiler.stats().buffer_uploads, 1);
    compiler.compile_batches(&scene, &camera, None, &mut backend);
    assert_eq!(compiler.stats().buffer_uploads, 0);
    assert_eq!(backend.buffers[0].write_count(), 1);
}

#[test]
fn test_moved_item_triggers_upload() {
    let r = renderable(1, RenderFlags::empty());
    let (mut scene, keys) = row_scene(4, r);
    let camera = top_down_camera(20.0, 50.0);
    let mut backend = MockBackend::new();
    let mut compiler = main_compiler();
    compiler.compile_batches(&scene, &camera, None, &mut backend);

    let moved = Mat4::from_translation(Vec3::new(1.0, 0.0, 1.0));
    scene.set_transform(keys[2], moved);
    scene.sync();
    compiler.compile_batches(&scene, &camera, None, &mut backend);

    assert_eq!(compiler.stats().buffer_uploads, 1);
    assert!(backend.buffers[0].transforms(4).contains(&moved));
}

#[test]
fn test_buffer_failure_falls_back_to_single_draws() {
    let r = renderable(1, RenderFlags::empty());
    let (scene, _) = row_scene(3, r);
    let camera = top_down_camera(20.0, 50.0);
    let mut compiler = main_compiler();

    let mut backend = MockBackend::new();
    backend.fail_buffer_creation = true;
    let draws = compiler.compile_batches(&scene, &camera, None, &mut backend);
    assert_eq!(draws.len(), 3);
    assert!(draws.iter().all(|d| matches!(d, BatchDraw::Single { .. })));
    assert_eq!(compiler.stats().fallbacks, 1);

    // Upload failure also falls back, and retries next pass
    let mut backend = MockBackend::new();
    backend.fail_buffer_updates = true;
    let draws = compiler.compile_batches(&scene, &camera, None, &mut backend);
    assert_eq!(draws.len(), 3);
    assert_eq!(compiler.stats().fallbacks, 1);
    assert!(compiler.batch(&r).is_some_and(RenderBatch::is_changed));
}

#[test]
fn test_duplicate_visit_is_ignored() {
    let r = renderable(1, RenderFlags::empty());
    let (scene, keys) = row_scene(1, r);
    let mut compiler = main_compiler();
    compiler.begin_pass();

    let item = scene.item(keys[0]).unwrap();
    compiler.collect(keys[0], item);
    compiler.collect(keys[0], item);
    assert_eq!(compiler.stats().visible_items, 1);
    assert_eq!(compiler.stats().duplicate_items, 1);
    assert_eq!(compiler.batch(&r).map(RenderBatch::count), Some(1));
}

#[test]
fn test_idle_batches_are_reclaimed() {
    let r = renderable(1, RenderFlags::empty());
    let (mut scene, keys) = row_scene(2, r);
    let camera = top_down_camera(20.0, 50.0);
    let mut backend = MockBackend::new();
    let mut compiler = RenderBatchCompiler::new(PassKind::Main, BatchConfig {
        reclaim_after_passes: 2,
        ..BatchConfig::default()
    });

    compiler.compile_batches(&scene, &camera, None, &mut backend);
    for key in &keys {
        scene.remove_item(*key);
    }
    scene.sync();

    compiler.compile_batches(&scene, &camera, None, &mut backend);
    compiler.compile_batches(&scene, &camera, None, &mut backend);
    assert_eq!(compiler.batch_count(), 1);

    compiler.compile_batches(&scene, &camera, None, &mut backend);
    assert_eq!(compiler.batch_count(), 0);
    assert_eq!(compiler.stats().reclaimed_batches, 1);
}

// ============================================================================
// Passes
// ============================================================================

#[test]
fn test_shadow_pass_keeps_casters_only() {
    let caster = renderable(1, RenderFlags::CAST_SHADOW);
    let receiver = renderable(2, RenderFlags::RECEIVE_SHADOW);
    let (scene, _) = grid_scene(|i| if i % 2 == 0 { caster } else { receiver });
    let light = top_down_camera(10.0, 50.0);
    let mut backend = MockBackend::new();
    let mut controller = OcclusionController::new(OcclusionConfig::default());
    controller.begin_frame();
    let mut compiler = RenderBatchCompiler::new(PassKind::Shadow, BatchConfig::default());

    let draws = compiler.compile_batches(&scene, &light, Some(&mut controller), &mut backend);

    assert_eq!(total_items(&draws), 8);
    assert!(draws.iter().all(|d| *d.renderable() == caster));
    assert!(backend.issued_queries.is_empty());
    assert_eq!(controller.tracked_cells(), 0);
}

#[test]
fn test_main_and_shadow_compilers_are_independent() {
    let r = renderable(1, RenderFlags::CAST_SHADOW);
    let (scene, _) = row_scene(4, r);
    let camera = top_down_camera(20.0, 50.0);
    let mut backend = MockBackend::new();
    let mut main = main_compiler();
    let mut shadow = RenderBatchCompiler::new(PassKind::Shadow, BatchConfig::default());

    main.compile_batches(&scene, &camera, None, &mut backend);
    main.compile_batches(&scene, &camera, None, &mut backend);
    shadow.compile_batches(&scene, &camera, None, &mut backend);

    assert_eq!(main.pass(), 2);
    assert_eq!(shadow.pass(), 1);
    assert_eq!(backend.buffers.len(), 2);
}

#[test]
fn test_occluder_prepass() {
    let opaque = renderable(1, RenderFlags::empty());
    let glass = renderable(2, RenderFlags::TRANSPARENT);
    let big = AABB::new(Vec3::splat(-5.0), Vec3::splat(5.0));

    let mut scene = Scene::new(&VisibilityConfig::default());
    let wall = scene.create_item(big, Mat4::IDENTITY, opaque);
    scene.create_item(big, Mat4::from_translation(Vec3::new(3.0, 0.0, 3.0)), glass);
    scene.create_item(unit_bounds(), Mat4::from_translation(Vec3::new(7.0, 0.0, 7.0)), opaque);
    scene.sync();

    let mut backend = MockBackend::new();
    let mut compiler = main_compiler();
    compiler.compile_batches(&scene, &top_down_camera(20.0, 50.0), None, &mut backend);

    assert_eq!(compiler.stats().occluders, 1);
    let wall_transform = *scene.item(wall).unwrap().transform();
    assert_eq!(backend.draws, vec![DrawCall::DepthOnly { renderable: opaque, transform: wall_transform }]);
}

#[test]
fn test_occluder_limit() {
    let opaque = renderable(1, RenderFlags::empty());
    let big = AABB::new(Vec3::splat(-5.0), Vec3::splat(5.0));
    let mut scene = Scene::new(&VisibilityConfig::default());
    for i in 0..4 {
        scene.create_item(big, Mat4::from_translation(Vec3::new(i as f32 * 3.0, 0.0, 0.0)), opaque);
    }
    scene.sync();

    let mut backend = MockBackend::new();
    let mut compiler = RenderBatchCompiler::new(PassKind::Main, BatchConfig {
        max_occluders: 2,
        ..BatchConfig::default()
    });
    compiler.compile_batches(&scene, &top_down_camera(20.0, 50.0), None, &mut backend);
    assert_eq!(backend.depth_only_count(), 2);
}

#[test]
fn test_occluded_region_draws_nothing() {
    let mut config = VisibilityConfig::default();
    config.octree = OctreeConfig { center: Vec3::ZERO, half_size: 32.0, loose_factor: 2.0, max_depth: 3 };
    let r = renderable(1, RenderFlags::empty());
    let mut scene = Scene::new(&config);
    for i in 0..4 {
        scene.create_item(unit_bounds(), Mat4::from_translation(Vec3::new(i as f32 * 2.0, 0.0, 0.0)), r);
    }
    scene.sync();

    // Camera outside every outer bound so each cell is queried
    let camera = top_down_camera(20.0, 100.0);
    let mut backend = MockBackend::new();
    backend.default_result = QueryStatus::Occluded;
    let mut controller = OcclusionController::new(OcclusionConfig::default());
    let mut compiler = main_compiler();

    controller.begin_frame();
    let first = compiler.compile_batches(&scene, &camera, Some(&mut controller), &mut backend);
    assert_eq!(total_items(&first), 4);
    assert!(!backend.issued_queries.is_empty());

    controller.begin_frame();
    let second = compiler.compile_batches(&scene, &camera, Some(&mut controller), &mut backend);
    assert!(second.is_empty());
    assert!(controller.stats().culled_subtrees >= 1);
}

#[test]
fn test_submit_issues_draws_in_order() {
    let lone = renderable(1, RenderFlags::empty());
    let shared = renderable(2, RenderFlags::empty());
    let mut scene = Scene::new(&VisibilityConfig::default());
    scene.create_item(unit_bounds(), Mat4::IDENTITY, lone);
    for i in 0..3 {
        scene.create_item(unit_bounds(), Mat4::from_translation(Vec3::new(i as f32 + 2.0, 0.0, 0.0)), shared);
    }
    scene.sync();

    let mut backend = MockBackend::new();
    let mut compiler = main_compiler();
    let draws = compiler.compile_batches(&scene, &top_down_camera(20.0, 50.0), None, &mut backend);
    backend.clear_calls();

    RenderBatchCompiler::submit(&draws, &mut backend).unwrap();
    assert_eq!(backend.draws.len(), draws.len());
    assert_eq!(backend.drawn_item_count(), 4);
}
