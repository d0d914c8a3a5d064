use glam::{UVec2, Vec2, Vec3};
use rayon::prelude::*;

use crate::TILE_WIDTH;
use crate::project::{MIN_ALPHA, ProjectedSplat};
use crate::tile_offsets::TileRange;

/// Largest alpha a single splat can have.
pub const MAX_ALPHA: f32 = 0.999;

/// Compositing stops once transmittance drops to this level.
pub const MIN_TRANSMITTANCE: f32 = 1e-4;

/// Gaussian falloff exponent of `splat` at `pixel`.
pub fn calc_sigma(pixel: Vec2, conic: [f32; 3], xy: [f32; 2]) -> f32 {
    let [a, b, c] = conic;
    let delta = Vec2::from_array(xy) - pixel;
    0.5 * (a * delta.x * delta.x + c * delta.y * delta.y) + b * delta.x * delta.y
}

/// Composite `splats` front to back at `pixel` over `background`. Returns straight rgba.
pub fn blend_pixel<'a>(
    pixel: Vec2,
    splats: impl IntoIterator<Item = &'a ProjectedSplat>,
    background: Vec3,
) -> [f32; 4] {
    let mut pix_out = Vec3::ZERO;
    let mut trans = 1.0f32;

    for splat in splats {
        let sigma = calc_sigma(pixel, splat.conic, splat.xy);
        let alpha = (splat.opacity * (-sigma).exp()).min(MAX_ALPHA);

        if sigma < 0.0 || alpha < MIN_ALPHA {
            continue;
        }

        let next_t = trans * (1.0 - alpha);
        if next_t <= MIN_TRANSMITTANCE {
            break;
        }

        pix_out += Vec3::from_array(splat.color) * (alpha * trans);
        trans = next_t;
    }

    let rgb = pix_out + trans * background;
    [rgb.x, rgb.y, rgb.z, 1.0 - trans]
}

/// Composite every tile into `out`, a row-major image of `img_size` pixels.
///
/// Rows of tiles are processed in parallel, each owning its band of the image.
pub fn rasterize(
    projected: &[ProjectedSplat],
    sorted_gids: &[u32],
    tile_offsets: &[TileRange],
    tile_bounds: UVec2,
    img_size: UVec2,
    background: Vec3,
    out: &mut [[f32; 4]],
) {
    assert_eq!(
        out.len(),
        (img_size.x * img_size.y) as usize,
        "Output must hold one pixel per image pixel"
    );

    let _span = tracing::trace_span!("Rasterize").entered();

    let width = img_size.x as usize;
    let band = width * TILE_WIDTH as usize;

    out.par_chunks_mut(band)
        .enumerate()
        .for_each(|(tile_y, pixels)| {
            let rows = pixels.len() / width;
            for tile_x in 0..tile_bounds.x {
                let range = tile_offsets[tile_y * tile_bounds.x as usize + tile_x as usize];
                let gids = &sorted_gids[range.as_range()];

                let x_start = tile_x * TILE_WIDTH;
                let x_end = (x_start + TILE_WIDTH).min(img_size.x);

                for row in 0..rows {
                    let py = (tile_y * TILE_WIDTH as usize + row) as f32 + 0.5;
                    for px in x_start..x_end {
                        let pixel = glam::vec2(px as f32 + 0.5, py);
                        let splats = gids.iter().map(|&gid| &projected[gid as usize]);
                        pixels[row * width + px as usize] = blend_pixel(pixel, splats, background);
                    }
                }
            }
        });
}
