//! Key/value argsorts used to order splat intersections.
//!
//! [`radix_argsort`] is a single threaded least-significant-digit radix sort processing
//! [`BITS_PER_PASS`] bits per pass: count digits, scan the counts, scatter. It is stable, so
//! values with equal keys keep their input order. [`parallel_argsort`] gives the same result
//! using rayon's stable parallel merge sort.
use rayon::prelude::*;

pub const BITS_PER_PASS: u32 = 4;
pub const BIN_COUNT: usize = 1 << BITS_PER_PASS;

fn check_lengths(keys: &[u64], values: &[u32], tmp_keys: &[u64], tmp_values: &[u32]) {
    assert_eq!(
        keys.len(),
        values.len(),
        "Input keys and values must have the same number of elements"
    );
    assert!(
        tmp_keys.len() == keys.len() && tmp_values.len() == keys.len(),
        "Scratch buffers must match the number of keys"
    );
}

fn digit(key: u64, shift: u32) -> usize {
    ((key >> shift) as usize) & (BIN_COUNT - 1)
}

/// Sort `keys` ascending and apply the same permutation to `values`, in place.
///
/// Only the lowest `sorting_bits` bits of the keys are considered. `tmp_keys` and
/// `tmp_values` are scratch space of the same length as the input.
pub fn radix_argsort(
    keys: &mut [u64],
    values: &mut [u32],
    tmp_keys: &mut [u64],
    tmp_values: &mut [u32],
    sorting_bits: u32,
) {
    check_lengths(keys, values, tmp_keys, tmp_values);
    assert!(sorting_bits <= 64, "Can only sort up to 64 bits");

    let _span = tracing::trace_span!("Radix sort", len = keys.len()).entered();

    if keys.len() < 2 {
        return;
    }

    // Ping-pong between the input and scratch buffers. `in_scratch` tracks where the
    // current data lives.
    let mut in_scratch = false;

    for pass in 0..sorting_bits.div_ceil(BITS_PER_PASS) {
        let shift = pass * BITS_PER_PASS;

        let (src_keys, src_vals, dst_keys, dst_vals) = if in_scratch {
            (&*tmp_keys, &*tmp_values, &mut *keys, &mut *values)
        } else {
            (&*keys, &*values, &mut *tmp_keys, &mut *tmp_values)
        };

        let mut counts = [0usize; BIN_COUNT];
        for &key in src_keys.iter() {
            counts[digit(key, shift)] += 1;
        }

        // Every key has the same digit, this pass would be a no-op.
        if counts.iter().any(|&c| c == src_keys.len()) {
            continue;
        }

        // Exclusive scan of the counts gives the first slot of every bin.
        let mut offsets = [0usize; BIN_COUNT];
        let mut acc = 0;
        for (offset, count) in offsets.iter_mut().zip(counts) {
            *offset = acc;
            acc += count;
        }

        for (&key, &val) in src_keys.iter().zip(src_vals.iter()) {
            let bin = digit(key, shift);
            let slot = offsets[bin];
            dst_keys[slot] = key;
            dst_vals[slot] = val;
            offsets[bin] += 1;
        }

        in_scratch = !in_scratch;
    }

    if in_scratch {
        keys.copy_from_slice(tmp_keys);
        values.copy_from_slice(tmp_values);
    }
}

/// Same contract as [`radix_argsort`], sorting on the rayon pool instead.
pub fn parallel_argsort(
    keys: &mut [u64],
    values: &mut [u32],
    tmp_keys: &mut [u64],
    tmp_values: &mut [u32],
    sorting_bits: u32,
) {
    check_lengths(keys, values, tmp_keys, tmp_values);
    assert!(sorting_bits <= 64, "Can only sort up to 64 bits");

    let _span = tracing::trace_span!("Parallel sort", len = keys.len()).entered();

    let mask = if sorting_bits == 64 {
        u64::MAX
    } else {
        (1u64 << sorting_bits) - 1
    };

    let mut pairs: Vec<(u64, u32)> = keys
        .par_iter()
        .zip(values.par_iter())
        .map(|(&k, &v)| (k, v))
        .collect();

    // Stable, so equal keys keep their arrival order just like the radix sort.
    pairs.par_sort_by_key(|&(k, _)| k & mask);

    keys.par_iter_mut()
        .zip(values.par_iter_mut())
        .zip(pairs.par_iter())
        .for_each(|((k, v), &(pk, pv))| {
            *k = pk;
            *v = pv;
        });
}
