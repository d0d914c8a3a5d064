use crate::{
    Camera, Gaussian, GaussianStore, RenderConfig, RenderControls, SplatRenderer, TILE_WIDTH,
};
use glam::{Quat, UVec2, Vec2, Vec3};
use rand::{Rng, SeedableRng, rngs::StdRng};


fn test_camera() -> Camera {
    Camera::new(Vec3::ZERO, Quat::IDENTITY, 0.5, glam::vec2(0.5, 0.5))
}

/// World position that projects onto `pixel` at view depth `depth` for `cam`.
fn world_at_pixel(cam: &Camera, img_size: UVec2, pixel: Vec2, depth: f32) -> Vec3 {
    let xy = (pixel - cam.center(img_size)) / cam.focal(img_size) * depth;
    xy.extend(depth)
}

/// A tiny splat that only ever touches the tile its center is in.
fn small_splat(mean: Vec3, rgb: Vec3) -> Gaussian {
    Gaussian::from_rgb(mean, Vec3::splat(0.001), Quat::IDENTITY, 0.9, rgb)
}

fn tile_center(tile: UVec2) -> Vec2 {
    (tile * TILE_WIDTH).as_vec2() + TILE_WIDTH as f32 / 2.0
}

fn renderer(config: RenderConfig, img_size: UVec2, gaussians: Vec<Gaussian>) -> SplatRenderer {
    let mut renderer = SplatRenderer::new(config, img_size).expect("Failed to create renderer");
    let store = GaussianStore::new(gaussians, 0).expect("Invalid scene");
    renderer.load_scene(store).expect("Failed to load scene");
    renderer
}

fn random_scene(seed: u64, num: usize, sh_degree: u32) -> GaussianStore {
    let mut rng = StdRng::seed_from_u64(seed);
    let gaussians = (0..num)
        .map(|_| {
            let mean = glam::vec3(
                rng.random_range(-2.0..2.0),
                rng.random_range(-2.0..2.0),
                rng.random_range(-1.0..8.0),
            );
            let scale = Vec3::from_array(std::array::from_fn(|_| rng.random_range(0.005..0.3)));
            let rotation = Quat::from_xyzw(
                rng.random_range(-1.0..1.0),
                rng.random_range(-1.0..1.0),
                rng.random_range(-1.0..1.0),
                rng.random_range(-1.0..1.0),
            );
            let mut gaussian = Gaussian::from_rgb(
                mean,
                scale,
                rotation,
                rng.random_range(0.0..1.0),
                Vec3::from_array(std::array::from_fn(|_| rng.random_range(0.0..1.0))),
            );
            for coeff in gaussian.sh_coeffs.iter_mut().skip(1) {
                *coeff = Vec3::from_array(std::array::from_fn(|_| rng.random_range(-0.3..0.3)));
            }
            gaussian
        })
        .collect();
    GaussianStore::new(gaussians, sh_degree).expect("Invalid scene")
}

#[test]
fn single_tile_splat() {
    let img_size = glam::uvec2(64, 64);
    let cam = test_camera();
    let mean = world_at_pixel(&cam, img_size, glam::vec2(8.0, 8.0), 5.0);
    let mut renderer = renderer(
        RenderConfig::default(),
        img_size,
        vec![small_splat(mean, Vec3::ONE)],
    );
    renderer
        .render(&cam, &RenderControls::default())
        .expect("Render failed");

    let aux = renderer.aux();
    assert_eq!(aux.tile_counts, [1]);
    assert_eq!(aux.num_intersections, 1);
    assert_eq!(aux.sorted_gids, [0]);
    assert_eq!(aux.tile_offsets[0].start, 0);
    assert_eq!(aux.tile_offsets[0].end, 1);
    assert!(aux.tile_offsets[1..].iter().all(|r| r.is_empty()));
    assert_eq!(renderer.stats().visible_instances, 1);
    assert_eq!(renderer.stats().num_visible, 1);
}

#[test]
fn empty_scene_is_background() {
    let img_size = glam::uvec2(40, 24);
    let mut renderer = renderer(RenderConfig::default(), img_size, vec![]);
    let controls = RenderControls {
        background: glam::vec3(0.2, 0.4, 0.6),
        ..Default::default()
    };
    let image = renderer
        .render(&test_camera(), &controls)
        .expect("Render failed");
    assert_eq!(image.size(), img_size);
    assert!(image.pixels().iter().all(|&p| p == [0.2, 0.4, 0.6, 0.0]));
    assert_eq!(renderer.stats().visible_instances, 0);
    assert_eq!(renderer.aux().num_intersections, 0);
}

#[test]
fn splat_behind_near_plane_culled() {
    let img_size = glam::uvec2(32, 32);
    let splats = vec![
        small_splat(glam::vec3(0.0, 0.0, -1.0), Vec3::ONE),
        small_splat(glam::vec3(0.0, 0.0, 0.005), Vec3::ONE),
    ];
    let mut renderer = renderer(RenderConfig::default(), img_size, splats);
    let image = renderer
        .render(&test_camera(), &RenderControls::default())
        .expect("Render failed");
    assert!(image.pixels().iter().all(|&p| p == [0.0; 4]));
    assert_eq!(renderer.aux().tile_counts, [0, 0]);
    assert_eq!(renderer.stats().visible_instances, 0);
}

#[test]
fn depth_order_within_tile() {
    let img_size = glam::uvec2(64, 64);
    let cam = test_camera();
    let pixel = glam::vec2(40.0, 40.0);
    // The far splat arrives first.
    let splats = vec![
        small_splat(world_at_pixel(&cam, img_size, pixel, 4.0), Vec3::X),
        small_splat(world_at_pixel(&cam, img_size, pixel, 2.0), Vec3::Y),
    ];
    let mut renderer = renderer(RenderConfig::default(), img_size, splats);
    renderer
        .render(&cam, &RenderControls::default())
        .expect("Render failed");

    let aux = renderer.aux();
    let tile_id = 2 * img_size.x.div_ceil(TILE_WIDTH) + 2;
    assert_eq!(aux.tile_splats(tile_id), [1, 0]);
}

#[test]
fn instance_buffers_grow_by_doubling() {
    let img_size = glam::uvec2(256, 256);
    let cam = test_camera();
    let splats: Vec<Gaussian> = (0..250)
        .map(|i| {
            let tile = glam::uvec2(i % 16, i / 16);
            small_splat(world_at_pixel(&cam, img_size, tile_center(tile), 5.0), Vec3::ONE)
        })
        .collect();
    let config = RenderConfig {
        initial_instance_capacity: 100,
        ..Default::default()
    };
    let mut renderer = renderer(config, img_size, splats);
    assert_eq!(renderer.instance_capacity(), 100);

    renderer
        .render(&cam, &RenderControls::default())
        .expect("Render failed");

    assert!(renderer.instance_capacity() >= 250);
    assert_eq!(renderer.instance_capacity(), 400);
    let stats = renderer.stats();
    assert_eq!(stats.visible_instances, 250);
    assert_eq!(stats.required_instances, 250);
    assert!(!stats.clamped);

    let aux = renderer.aux();
    for (tile_id, range) in aux.tile_offsets.iter().enumerate() {
        if tile_id < 250 {
            assert_eq!(range.len(), 1, "Tile {tile_id} should hold one splat");
            assert_eq!(aux.sorted_gids[range.start as usize] as usize, tile_id);
        } else {
            assert!(range.is_empty());
        }
    }
}

#[test]
fn clamps_to_max_instances() {
    let img_size = glam::uvec2(256, 256);
    let cam = test_camera();
    let splats: Vec<Gaussian> = (0..250)
        .map(|i| {
            let tile = glam::uvec2(i % 16, i / 16);
            small_splat(world_at_pixel(&cam, img_size, tile_center(tile), 5.0), Vec3::ONE)
        })
        .collect();
    let config = RenderConfig {
        initial_instance_capacity: 16,
        max_instances: 100,
        ..Default::default()
    };
    let mut renderer = renderer(config, img_size, splats);
    renderer
        .render(&cam, &RenderControls::default())
        .expect("Render failed");

    let stats = renderer.stats();
    assert!(stats.clamped);
    assert_eq!(stats.required_instances, 250);
    assert_eq!(stats.visible_instances, 100);
    assert!(renderer.instance_capacity() <= 100);

    // Intersections are kept in arrival order, so the first hundred splats survive.
    let aux = renderer.aux();
    let mut gids = aux.sorted_gids.to_vec();
    gids.sort_unstable();
    assert_eq!(gids, (0..100).collect::<Vec<u32>>());
}

#[test]
fn random_scene_invariants() {
    let img_size = glam::uvec2(97, 61);
    let mut renderer = SplatRenderer::new(RenderConfig::default(), img_size).expect("Renderer");
    renderer
        .load_scene(random_scene(7, 2000, 3))
        .expect("Load scene");
    let cam = Camera::new(Vec3::ZERO, Quat::IDENTITY, 0.9, glam::vec2(0.5, 0.5));
    renderer
        .render(&cam, &RenderControls::default())
        .expect("Render failed");

    let aux = renderer.aux();
    aux.validate();
    let sum: u32 = aux.tile_counts.iter().sum();
    assert_eq!(sum, aux.num_intersections);
    let ranges: u32 = aux.tile_offsets.iter().map(|r| r.len()).sum();
    assert_eq!(ranges, aux.num_intersections);
    assert!(aux.num_visible() > 0);
    for pixel in renderer.image().pixels() {
        assert!(pixel.iter().all(|c| c.is_finite() && *c >= 0.0));
        assert!(pixel[3] <= 1.0);
    }
}

#[test]
fn deterministic_frames() {
    let img_size = glam::uvec2(80, 48);
    let cam = Camera::new(Vec3::ZERO, Quat::IDENTITY, 0.9, glam::vec2(0.5, 0.5));
    let mut renderer = SplatRenderer::new(RenderConfig::default(), img_size).expect("Renderer");
    renderer
        .load_scene(random_scene(11, 1500, 2))
        .expect("Load scene");

    let first = renderer
        .render(&cam, &RenderControls::default())
        .expect("Render failed")
        .clone();
    let keys = renderer.aux().sorted_keys.to_vec();
    let gids = renderer.aux().sorted_gids.to_vec();
    let offsets = renderer.aux().tile_offsets.to_vec();

    let second = renderer
        .render(&cam, &RenderControls::default())
        .expect("Render failed");
    assert_eq!(&first, second);
    assert_eq!(renderer.aux().sorted_keys, keys);
    assert_eq!(renderer.aux().sorted_gids, gids);
    assert_eq!(renderer.aux().tile_offsets, offsets);
}

#[test]
fn parallel_scan_sort_matches_serial() {
    let img_size = glam::uvec2(128, 72);
    let cam = Camera::new(Vec3::ZERO, Quat::IDENTITY, 0.9, glam::vec2(0.5, 0.5));
    let scene = random_scene(3, 3000, 3);

    let mut outputs = vec![];
    for parallel_scan_sort in [false, true] {
        let config = RenderConfig {
            parallel_scan_sort,
            ..Default::default()
        };
        let mut renderer = SplatRenderer::new(config, img_size).expect("Renderer");
        renderer.load_scene(scene.clone()).expect("Load scene");
        let image = renderer
            .render(&cam, &RenderControls::default())
            .expect("Render failed")
            .clone();
        let aux = renderer.aux();
        outputs.push((
            image,
            aux.cum_tiles_hit.to_vec(),
            aux.sorted_keys.to_vec(),
            aux.sorted_gids.to_vec(),
            aux.tile_offsets.to_vec(),
        ));
    }
    assert!(outputs[0] == outputs[1], "Parallel path gave a different frame");
}
