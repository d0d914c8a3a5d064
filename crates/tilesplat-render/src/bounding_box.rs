use glam::{UVec2, Vec2};

use crate::TILE_WIDTH;

/// A rectangle of screen tiles, `min` inclusive and `max` exclusive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TileBBox {
    pub min: UVec2,
    pub max: UVec2,
}

impl TileBBox {
    /// Tiles touched by a circle of `radius` pixels around `xy`, clamped to the tile grid.
    pub fn from_circle(xy: Vec2, radius: f32, tile_bounds: UVec2) -> Self {
        let tile_w = TILE_WIDTH as f32;
        let bounds = tile_bounds.as_vec2();
        let min = ((xy - radius) / tile_w).floor().clamp(Vec2::ZERO, bounds);
        let max = ((xy + radius) / tile_w).ceil().clamp(Vec2::ZERO, bounds);
        Self {
            min: min.as_uvec2(),
            max: max.as_uvec2(),
        }
    }

    pub fn from_array([min_x, min_y, max_x, max_y]: [u32; 4]) -> Self {
        Self {
            min: glam::uvec2(min_x, min_y),
            max: glam::uvec2(max_x, max_y),
        }
    }

    pub fn to_array(self) -> [u32; 4] {
        [self.min.x, self.min.y, self.max.x, self.max.y]
    }

    pub fn size(&self) -> UVec2 {
        self.max.saturating_sub(self.min)
    }

    pub fn num_tiles(&self) -> u32 {
        let size = self.size();
        size.x * size.y
    }

    pub fn is_empty(&self) -> bool {
        self.num_tiles() == 0
    }

    /// Tile ids in row-major order.
    pub fn tile_ids(self, tile_bounds: UVec2) -> impl Iterator<Item = u32> {
        (self.min.y..self.max.y).flat_map(move |ty| {
            (self.min.x..self.max.x).map(move |tx| ty * tile_bounds.x + tx)
        })
    }
}
