use rayon::prelude::*;

use crate::intersect::tile_of_key;

/// Range of the sorted intersections belonging to one tile.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct TileRange {
    pub start: u32,
    pub end: u32,
}

impl TileRange {
    pub fn len(&self) -> u32 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    pub fn as_range(&self) -> std::ops::Range<usize> {
        self.start as usize..self.end as usize
    }
}

/// Resolve the range of every tile from tile-sorted keys. Tiles without intersections get
/// an empty `[0, 0)` range.
pub fn get_tile_offsets(sorted_keys: &[u64], tile_offsets: &mut [TileRange]) {
    let _span = tracing::trace_span!("GetTileOffsets", num = sorted_keys.len()).entered();

    tile_offsets.fill(TileRange::default());

    if sorted_keys.is_empty() {
        return;
    }

    // Every index whose tile differs from its predecessor starts a new range.
    let boundaries: Vec<usize> = (1..sorted_keys.len())
        .into_par_iter()
        .filter(|&i| tile_of_key(sorted_keys[i]) != tile_of_key(sorted_keys[i - 1]))
        .collect();

    let mut start = 0;
    for end in boundaries.into_iter().chain(std::iter::once(sorted_keys.len())) {
        let tile = tile_of_key(sorted_keys[start]) as usize;
        tile_offsets[tile] = TileRange {
            start: start as u32,
            end: end as u32,
        };
        start = end;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intersect::intersect_key;

    #[test]
    fn ranges_partition_keys() {
        let keys = [
            intersect_key(0, 1.0),
            intersect_key(0, 2.0),
            intersect_key(2, 1.0),
            intersect_key(3, 0.5),
            intersect_key(3, 0.7),
            intersect_key(3, 0.9),
        ];
        let mut offsets = vec![TileRange { start: 9, end: 9 }; 5];
        get_tile_offsets(&keys, &mut offsets);
        assert_eq!(
            offsets,
            [
                TileRange { start: 0, end: 2 },
                TileRange::default(),
                TileRange { start: 2, end: 3 },
                TileRange { start: 3, end: 6 },
                TileRange::default(),
            ]
        );
        let total: u32 = offsets.iter().map(TileRange::len).sum();
        assert_eq!(total as usize, keys.len());
    }

    #[test]
    fn empty_keys_clear_offsets() {
        let mut offsets = vec![TileRange { start: 1, end: 4 }; 3];
        get_tile_offsets(&[], &mut offsets);
        assert!(offsets.iter().all(TileRange::is_empty));
    }
}
