use crate::project::ProjectedSplat;
use crate::render::RenderError;
use crate::tile_offsets::TileRange;

/// Make sure `buf` can grow to `len` elements without reallocating, reporting allocation
/// failure instead of aborting. Lengths are left alone.
pub(crate) fn try_reserve_len<T>(
    buf: &mut Vec<T>,
    len: usize,
    what: &'static str,
) -> Result<(), RenderError> {
    buf.try_reserve_exact(len.saturating_sub(buf.len()))
        .map_err(|source| RenderError::Allocation { what, source })
}

/// Capacity to grow to so `required` intersections fit, doubling from `current` and never
/// going past `ceiling`.
pub fn grown_capacity(current: u32, required: u32, ceiling: u32) -> u32 {
    let mut capacity = current.max(1);
    while capacity < required {
        capacity = capacity.saturating_mul(2);
    }
    capacity.min(ceiling)
}

/// Working memory of the pipeline, reused between frames.
#[derive(Debug, Default)]
pub struct FrameBuffers {
    // One entry per splat.
    pub projected: Vec<ProjectedSplat>,
    pub tile_counts: Vec<u32>,
    pub cum_tiles_hit: Vec<u32>,

    // One entry per intersection slot.
    pub keys: Vec<u64>,
    pub gids: Vec<u32>,
    pub tmp_keys: Vec<u64>,
    pub tmp_gids: Vec<u32>,

    // One entry per tile.
    pub tile_offsets: Vec<TileRange>,
}

impl FrameBuffers {
    /// Buffers with room for exactly `instance_capacity` intersections.
    pub fn new(instance_capacity: u32) -> Result<Self, RenderError> {
        let mut buffers = Self::default();
        buffers.set_instance_capacity(instance_capacity as usize)?;
        Ok(buffers)
    }

    // Every buffer is reserved before any length changes, so a failed allocation leaves
    // them all at their old size.
    fn set_instance_capacity(&mut self, capacity: usize) -> Result<(), RenderError> {
        try_reserve_len(&mut self.keys, capacity, "intersection keys")?;
        try_reserve_len(&mut self.gids, capacity, "intersection ids")?;
        try_reserve_len(&mut self.tmp_keys, capacity, "sort scratch keys")?;
        try_reserve_len(&mut self.tmp_gids, capacity, "sort scratch ids")?;

        self.keys.resize(capacity, 0);
        self.gids.resize(capacity, 0);
        self.tmp_keys.resize(capacity, 0);
        self.tmp_gids.resize(capacity, 0);
        Ok(())
    }

    pub fn instance_capacity(&self) -> u32 {
        self.keys.len() as u32
    }

    pub fn resize_splats(&mut self, num_splats: usize) -> Result<(), RenderError> {
        try_reserve_len(&mut self.projected, num_splats, "projected splats")?;
        try_reserve_len(&mut self.tile_counts, num_splats, "tile counts")?;
        try_reserve_len(&mut self.cum_tiles_hit, num_splats, "tile count sums")?;

        self.projected.resize(num_splats, ProjectedSplat::default());
        self.tile_counts.resize(num_splats, 0);
        self.cum_tiles_hit.resize(num_splats, 0);
        Ok(())
    }

    /// Make room for at least `required` intersections, doubling the current capacity. Never
    /// shrinks and never grows past `ceiling`.
    pub fn reserve_instances(&mut self, required: u32, ceiling: u32) -> Result<(), RenderError> {
        let current = self.instance_capacity();
        if current >= required.min(ceiling) {
            return Ok(());
        }

        let capacity = grown_capacity(current, required, ceiling);
        log::debug!("Growing intersection buffers from {current} to {capacity}");

        self.set_instance_capacity(capacity as usize)
    }
}
