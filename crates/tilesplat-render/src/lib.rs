pub mod bounding_box;
pub mod buffers;
pub mod camera;
pub mod config;
pub mod covariance;
pub mod gaussian;
pub mod intersect;
pub mod project;
pub mod rasterize;
pub mod render;
pub mod render_aux;
pub mod sh;
pub mod tile_offsets;

#[cfg(test)]
mod tests;

pub use camera::Camera;
pub use config::{RenderConfig, RenderControls};
pub use gaussian::{Gaussian, GaussianRecord, GaussianStore};
pub use render::{RenderError, RenderedImage, SplatRenderer};
pub use render_aux::RenderAux;

/// Width and height of a screen tile in pixels.
pub const TILE_WIDTH: u32 = 16;

/// Low-pass filter added to the diagonal of every 2D covariance, in pixels squared.
pub const COV_BLUR: f32 = 0.3;

/// Default hard ceiling on the number of (splat, tile) intersections in one frame.
pub const INTERSECTS_UPPER_BOUND: u32 = 10_000_000;

/// Telemetry of the last rendered frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, serde::Serialize)]
pub struct RenderStats {
    /// Splats that survived culling and touch at least one tile.
    pub num_visible: u32,
    /// Intersections that were sorted and composited.
    pub visible_instances: u32,
    /// Intersections the frame asked for before clamping to the ceiling.
    pub required_instances: u32,
    /// Whether the frame lost intersections to the ceiling.
    pub clamped: bool,
    pub frame_time_ms: f64,
}

pub(crate) fn calc_tile_bounds(img_size: glam::UVec2) -> glam::UVec2 {
    glam::uvec2(
        img_size.x.div_ceil(TILE_WIDTH),
        img_size.y.div_ceil(TILE_WIDTH),
    )
}
