use glam::UVec2;

use crate::project::ProjectedSplat;
use crate::tile_offsets::TileRange;

/// Intermediate results of the last frame, borrowed from the renderer.
#[derive(Debug, Clone, Copy)]
pub struct RenderAux<'a> {
    pub projected: &'a [ProjectedSplat],
    pub tile_counts: &'a [u32],
    pub cum_tiles_hit: &'a [u32],
    /// Intersection keys, sorted by tile and then depth.
    pub sorted_keys: &'a [u64],
    pub sorted_gids: &'a [u32],
    pub tile_offsets: &'a [TileRange],
    pub img_size: UVec2,
    pub tile_bounds: UVec2,
    pub num_intersections: u32,
}

impl RenderAux<'_> {
    /// Total number of intersections before any clamping, read off the prefix sum.
    pub fn required_intersections(&self) -> u32 {
        self.cum_tiles_hit.last().copied().unwrap_or(0)
    }

    pub fn num_visible(&self) -> u32 {
        self.tile_counts.iter().filter(|&&c| c > 0).count() as u32
    }

    /// Ids of the splats composited in `tile_id`, front to back.
    pub fn tile_splats(&self, tile_id: u32) -> &[u32] {
        &self.sorted_gids[self.tile_offsets[tile_id as usize].as_range()]
    }

    /// Number of splats per tile, row by row.
    pub fn calc_tile_depth(&self) -> Vec<Vec<u32>> {
        self.tile_offsets
            .chunks(self.tile_bounds.x.max(1) as usize)
            .map(|row| row.iter().map(TileRange::len).collect())
            .collect()
    }

    /// Check the frame's internal invariants. Does nothing unless built for tests or with
    /// the `debug-validation` feature.
    pub fn validate(&self) {
        #[cfg(any(test, feature = "debug-validation"))]
        {
            use crate::intersect::{depth_of_key, tile_of_key};

            let n = self.projected.len();
            assert_eq!(self.tile_counts.len(), n, "One tile count per splat");
            assert_eq!(self.cum_tiles_hit.len(), n, "One prefix sum entry per splat");
            assert_eq!(
                self.sorted_keys.len(),
                self.num_intersections as usize,
                "Sorted keys must cover every intersection"
            );
            assert!(
                self.num_intersections <= self.required_intersections(),
                "More intersections ({}) than required ({})",
                self.num_intersections,
                self.required_intersections()
            );

            let clamped = self.num_intersections < self.required_intersections();
            if !clamped {
                let sum: u64 = self.tile_counts.iter().map(|&c| u64::from(c)).sum();
                assert_eq!(
                    sum,
                    u64::from(self.num_intersections),
                    "Tile counts must add up to the number of intersections"
                );
            }

            for &gid in self.sorted_gids {
                assert!((gid as usize) < n, "Invalid splat id {gid} >= {n}");
            }

            let mut covered = 0u32;
            let mut ranges: Vec<(usize, TileRange)> = self
                .tile_offsets
                .iter()
                .copied()
                .enumerate()
                .filter(|(_, r)| !r.is_empty())
                .collect();
            ranges.sort_by_key(|(_, r)| r.start);

            for (tile_id, range) in ranges {
                assert_eq!(
                    range.start, covered,
                    "Tile ranges must be contiguous, tile {tile_id} starts at {} instead of {covered}",
                    range.start
                );
                covered = range.end;

                let keys = &self.sorted_keys[range.as_range()];
                for &key in keys {
                    assert_eq!(
                        tile_of_key(key) as usize,
                        tile_id,
                        "Intersection sorted into the wrong tile"
                    );
                }
                for pair in keys.windows(2) {
                    assert!(
                        depth_of_key(pair[0]) <= depth_of_key(pair[1]),
                        "Depths in tile {tile_id} are not sorted"
                    );
                }
            }
            assert_eq!(
                covered, self.num_intersections,
                "Tile ranges must cover every intersection"
            );
        }
    }
}
