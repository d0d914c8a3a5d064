use glam::UVec2;
use rayon::prelude::*;

use crate::project::ProjectedSplat;

/// Sort key of one (splat, tile) intersection. Tiles are the major key, depth the minor one.
/// Depths are positive, so their bit patterns order the same way the floats do.
pub fn intersect_key(tile_id: u32, depth: f32) -> u64 {
    (u64::from(tile_id) << 32) | u64::from(depth.to_bits())
}

pub fn tile_of_key(key: u64) -> u32 {
    (key >> 32) as u32
}

pub fn depth_of_key(key: u64) -> f32 {
    f32::from_bits(key as u32)
}

/// Number of key bits that need sorting for a grid with `num_tiles` tiles.
pub fn sorting_bits(num_tiles: u32) -> u32 {
    32 + (u32::BITS - num_tiles.leading_zeros())
}

/// Write a key and splat id for every tile each splat overlaps.
///
/// Splat `i` writes its entries starting at `cum_tiles_hit[i - 1]`, walking its tile bbox in
/// row-major order. Only the first `keys.len()` intersections are written, anything past that
/// is dropped.
pub fn map_gaussians_to_intersects(
    projected: &[ProjectedSplat],
    tile_counts: &[u32],
    cum_tiles_hit: &[u32],
    tile_bounds: UVec2,
    keys: &mut [u64],
    gids: &mut [u32],
) {
    assert_eq!(keys.len(), gids.len(), "Keys and ids must have the same length");

    let _span = tracing::trace_span!("MapGaussiansToIntersect", num = keys.len()).entered();

    let total = keys.len();

    // Every splat owns a contiguous range of the output, so hand each one its own slices.
    let mut work = Vec::new();
    let mut rest_keys = keys;
    let mut rest_gids = gids;
    let mut base = 0usize;

    for (gid, (&count, &cum)) in tile_counts.iter().zip(cum_tiles_hit).enumerate() {
        if count == 0 {
            base = cum as usize;
            continue;
        }
        if base >= total {
            break;
        }
        let len = (count as usize).min(total - base);
        let (splat_keys, tail_keys) = std::mem::take(&mut rest_keys).split_at_mut(len);
        let (splat_gids, tail_gids) = std::mem::take(&mut rest_gids).split_at_mut(len);
        rest_keys = tail_keys;
        rest_gids = tail_gids;
        work.push((gid as u32, splat_keys, splat_gids));
        base = cum as usize;
    }

    work.into_par_iter().for_each(|(gid, splat_keys, splat_gids)| {
        let splat = &projected[gid as usize];
        let tiles = splat.tile_bbox().tile_ids(tile_bounds);
        for ((key, out_gid), tile_id) in splat_keys.iter_mut().zip(splat_gids.iter_mut()).zip(tiles) {
            *key = intersect_key(tile_id, splat.depth);
            *out_gid = gid;
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bounding_box::TileBBox;

    fn splat(depth: f32, bbox: [u32; 4]) -> ProjectedSplat {
        ProjectedSplat {
            depth,
            tile_bbox: bbox,
            ..Default::default()
        }
    }

    #[test]
    fn key_layout() {
        let key = intersect_key(7, 2.5);
        assert_eq!(tile_of_key(key), 7);
        assert_eq!(depth_of_key(key), 2.5);
        assert!(intersect_key(1, 100.0) < intersect_key(2, 0.1));
        assert!(intersect_key(3, 0.5) < intersect_key(3, 0.75));
    }

    #[test]
    fn writes_row_major_ranges() {
        let tile_bounds = glam::uvec2(4, 4);
        let projected = [
            splat(1.0, [1, 1, 3, 2]),
            splat(0.0, [0, 0, 0, 0]),
            splat(2.0, [0, 2, 1, 4]),
        ];
        let counts: Vec<u32> = projected.iter().map(|s| s.tile_bbox().num_tiles()).collect();
        assert_eq!(counts, [2, 0, 2]);
        let cum = tilesplat_prefix_sum::prefix_sum(&counts);

        let mut keys = vec![0; 4];
        let mut gids = vec![0; 4];
        map_gaussians_to_intersects(&projected, &counts, &cum, tile_bounds, &mut keys, &mut gids);

        assert_eq!(gids, [0, 0, 2, 2]);
        let tiles: Vec<u32> = keys.iter().map(|&k| tile_of_key(k)).collect();
        assert_eq!(tiles, [5, 6, 8, 12]);
        assert_eq!(depth_of_key(keys[2]), 2.0);
    }

    #[test]
    fn drops_intersections_past_the_end() {
        let tile_bounds = glam::uvec2(4, 4);
        let projected = [splat(1.0, [0, 0, 2, 2]), splat(2.0, [0, 0, 4, 4])];
        let counts = [4, 16];
        let cum = tilesplat_prefix_sum::prefix_sum(&counts);

        let mut keys = vec![u64::MAX; 6];
        let mut gids = vec![u32::MAX; 6];
        map_gaussians_to_intersects(&projected, &counts, &cum, tile_bounds, &mut keys, &mut gids);
        assert_eq!(gids, [0, 0, 0, 0, 1, 1]);
        let expected: Vec<u32> = TileBBox::from_array([0, 0, 4, 4])
            .tile_ids(tile_bounds)
            .take(2)
            .collect();
        assert_eq!(tile_of_key(keys[4]), expected[0]);
        assert_eq!(tile_of_key(keys[5]), expected[1]);
    }

    #[test]
    fn sort_bits_cover_tile_ids() {
        assert_eq!(sorting_bits(1), 33);
        assert_eq!(sorting_bits(16), 37);
        assert!(u64::from(15u32) << 32 < 1u64 << sorting_bits(16));
    }
}
