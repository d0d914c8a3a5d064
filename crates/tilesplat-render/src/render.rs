use std::collections::TryReserveError;

use glam::{UVec2, Vec3};
use rayon::prelude::*;
use thiserror::Error;
use web_time::Instant;

use crate::buffers::{FrameBuffers, try_reserve_len};
use crate::camera::Camera;
use crate::config::{RenderConfig, RenderControls};
use crate::covariance::CovarianceCache;
use crate::gaussian::GaussianStore;
use crate::intersect::{map_gaussians_to_intersects, sorting_bits};
use crate::project::{ProjectUniforms, project_splats};
use crate::rasterize::rasterize;
use crate::render_aux::RenderAux;
use crate::tile_offsets::{TileRange, get_tile_offsets};
use crate::{RenderStats, calc_tile_bounds};

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("Failed to allocate {what}")]
    Allocation {
        what: &'static str,
        #[source]
        source: TryReserveError,
    },
    #[error("Invalid viewport size {width}x{height}")]
    InvalidViewport { width: u32, height: u32 },
    #[error("SH degree {0} is not supported, the maximum is 3")]
    InvalidShDegree(u32),
    #[error("Scene has {0} splats, which is more than can be indexed")]
    TooManySplats(usize),
    #[error("Record buffer of {len} bytes is not a multiple of the {stride} byte record size")]
    MalformedRecords { len: usize, stride: usize },
    #[error("Invalid render config: {0}")]
    InvalidConfig(&'static str),
}

/// Straight (non premultiplied) RGBA image in linear f32.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderedImage {
    size: UVec2,
    pixels: Vec<[f32; 4]>,
}

impl RenderedImage {
    pub fn size(&self) -> UVec2 {
        self.size
    }

    /// Pixels in row-major order.
    pub fn pixels(&self) -> &[[f32; 4]] {
        &self.pixels
    }

    pub fn pixel(&self, x: u32, y: u32) -> [f32; 4] {
        self.pixels[(y * self.size.x + x) as usize]
    }

    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.pixels)
    }

    /// Quantize to 8 bits per channel.
    pub fn to_rgba8(&self) -> Vec<u8> {
        self.pixels
            .iter()
            .flatten()
            .map(|&c| (c.clamp(0.0, 1.0) * 255.0).round() as u8)
            .collect()
    }

    fn clear(&mut self, background: Vec3) {
        self.pixels.fill([background.x, background.y, background.z, 0.0]);
    }
}

/// Renders a scene of Gaussians into an image, one frame at a time.
///
/// All working memory is owned by the renderer and reused across frames. Intersection buffers
/// grow when a frame needs more room, but never shrink.
pub struct SplatRenderer {
    config: RenderConfig,
    img_size: UVec2,
    scene: GaussianStore,
    covariances: CovarianceCache,
    buffers: FrameBuffers,
    image: RenderedImage,
    num_intersections: u32,
    stats: RenderStats,
}

fn check_viewport(img_size: UVec2) -> Result<usize, RenderError> {
    let invalid = RenderError::InvalidViewport {
        width: img_size.x,
        height: img_size.y,
    };
    if img_size.x == 0 || img_size.y == 0 {
        return Err(invalid);
    }
    img_size
        .x
        .checked_mul(img_size.y)
        .map(|n| n as usize)
        .ok_or(invalid)
}

impl SplatRenderer {
    pub fn new(config: RenderConfig, img_size: UVec2) -> Result<Self, RenderError> {
        config.validate()?;
        let mut renderer = Self {
            buffers: FrameBuffers::new(config.initial_instance_capacity)?,
            config,
            img_size: UVec2::ZERO,
            scene: GaussianStore::default(),
            covariances: CovarianceCache::default(),
            image: RenderedImage::default(),
            num_intersections: 0,
            stats: RenderStats::default(),
        };
        renderer.resize(img_size)?;
        Ok(renderer)
    }

    /// Replace the active scene.
    pub fn load_scene(&mut self, scene: GaussianStore) -> Result<(), RenderError> {
        log::info!(
            "Loading scene with {} splats (SH degree {})",
            scene.len(),
            scene.sh_degree()
        );
        self.buffers.resize_splats(scene.len())?;
        self.covariances.invalidate();
        self.scene = scene;
        self.reset_frame();
        Ok(())
    }

    pub fn clear_scene(&mut self) {
        self.scene = GaussianStore::default();
        self.covariances.invalidate();
        self.buffers.projected.clear();
        self.buffers.tile_counts.clear();
        self.buffers.cum_tiles_hit.clear();
        self.reset_frame();
    }

    // Forget the last frame's intersections, they no longer match the scene or viewport.
    fn reset_frame(&mut self) {
        self.num_intersections = 0;
        self.buffers.tile_offsets.fill(TileRange::default());
        self.buffers.tile_counts.fill(0);
        self.buffers.cum_tiles_hit.fill(0);
    }

    /// Change the output size. Reallocates the image and the per tile buffers.
    pub fn resize(&mut self, img_size: UVec2) -> Result<(), RenderError> {
        let num_pixels = check_viewport(img_size)?;
        if img_size == self.img_size {
            return Ok(());
        }

        let tile_bounds = calc_tile_bounds(img_size);
        log::info!(
            "Resizing to {}x{} ({}x{} tiles)",
            img_size.x,
            img_size.y,
            tile_bounds.x,
            tile_bounds.y
        );

        let num_tiles = (tile_bounds.x * tile_bounds.y) as usize;
        try_reserve_len(&mut self.buffers.tile_offsets, num_tiles, "tile offsets")?;
        try_reserve_len(&mut self.image.pixels, num_pixels, "image")?;

        self.buffers
            .tile_offsets
            .resize(num_tiles, TileRange::default());
        self.image.pixels.resize(num_pixels, [0.0; 4]);
        self.image.size = img_size;
        self.img_size = img_size;
        self.reset_frame();
        Ok(())
    }

    /// Render one frame of the active scene.
    pub fn render(
        &mut self,
        camera: &Camera,
        controls: &RenderControls,
    ) -> Result<&RenderedImage, RenderError> {
        let start = Instant::now();
        let _span = tracing::trace_span!("RenderSplats", num = self.scene.len()).entered();

        let img_size = self.img_size;
        let tile_bounds = calc_tile_bounds(img_size);
        let max_instances = self.config.max_instances;
        let parallel = self.config.parallel_scan_sort;

        let sh_degree = controls
            .sh_degree
            .map_or(self.scene.sh_degree(), |d| d.min(self.scene.sh_degree()));

        self.covariances
            .update(self.scene.gaussians(), controls.scale_modifier)?;

        let uniforms = ProjectUniforms::new(camera, img_size, sh_degree, self.config.near_plane);
        let buffers = &mut self.buffers;

        project_splats(
            &uniforms,
            self.scene.gaussians(),
            self.covariances.covariances(),
            &mut buffers.projected,
            &mut buffers.tile_counts,
        );

        let required = {
            let _span = tracing::trace_span!("PrefixSum").entered();
            if parallel {
                tilesplat_prefix_sum::prefix_sum_parallel_into(
                    &buffers.tile_counts,
                    &mut buffers.cum_tiles_hit,
                )
            } else {
                tilesplat_prefix_sum::prefix_sum_into(
                    &buffers.tile_counts,
                    &mut buffers.cum_tiles_hit,
                )
            }
        };

        let clamped = required > max_instances;
        if clamped {
            log::warn!(
                "Frame needs {required} intersections but at most {max_instances} are allowed, \
                 dropping the rest"
            );
        }
        let num_intersections = required.min(max_instances);

        if num_intersections == 0 {
            buffers.tile_offsets.fill(TileRange::default());
            self.image.clear(controls.background);
        } else {
            buffers.reserve_instances(required, max_instances)?;

            let n = num_intersections as usize;
            map_gaussians_to_intersects(
                &buffers.projected,
                &buffers.tile_counts,
                &buffers.cum_tiles_hit,
                tile_bounds,
                &mut buffers.keys[..n],
                &mut buffers.gids[..n],
            );

            {
                let _span = tracing::trace_span!("TileSort", num = n).entered();
                let bits = sorting_bits(tile_bounds.x * tile_bounds.y);
                let sort = if parallel {
                    tilesplat_sort::parallel_argsort
                } else {
                    tilesplat_sort::radix_argsort
                };
                sort(
                    &mut buffers.keys[..n],
                    &mut buffers.gids[..n],
                    &mut buffers.tmp_keys[..n],
                    &mut buffers.tmp_gids[..n],
                    bits,
                );
            }

            get_tile_offsets(&buffers.keys[..n], &mut buffers.tile_offsets);

            rasterize(
                &buffers.projected,
                &buffers.gids[..n],
                &buffers.tile_offsets,
                tile_bounds,
                img_size,
                controls.background,
                &mut self.image.pixels,
            );
        }

        let num_visible = buffers.tile_counts.par_iter().filter(|&&c| c > 0).count() as u32;
        self.num_intersections = num_intersections;
        self.stats = RenderStats {
            num_visible,
            visible_instances: num_intersections,
            required_instances: required,
            clamped,
            frame_time_ms: start.elapsed().as_secs_f64() * 1000.0,
        };

        self.aux().validate();

        Ok(&self.image)
    }

    /// Intermediate buffers of the last frame.
    pub fn aux(&self) -> RenderAux<'_> {
        let n = self.num_intersections as usize;
        RenderAux {
            projected: &self.buffers.projected,
            tile_counts: &self.buffers.tile_counts,
            cum_tiles_hit: &self.buffers.cum_tiles_hit,
            sorted_keys: &self.buffers.keys[..n],
            sorted_gids: &self.buffers.gids[..n],
            tile_offsets: &self.buffers.tile_offsets,
            img_size: self.img_size,
            tile_bounds: calc_tile_bounds(self.img_size),
            num_intersections: self.num_intersections,
        }
    }

    pub fn stats(&self) -> RenderStats {
        self.stats
    }

    pub fn image(&self) -> &RenderedImage {
        &self.image
    }

    pub fn img_size(&self) -> UVec2 {
        self.img_size
    }

    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    pub fn scene(&self) -> &GaussianStore {
        &self.scene
    }

    /// Number of intersections the buffers can currently hold.
    pub fn instance_capacity(&self) -> u32 {
        self.buffers.instance_capacity()
    }
}
