//! Inclusive prefix sums over `u32` counts.
//!
//! Two implementations with identical results are provided:
//!
//! - [`prefix_sum_into`]: a single threaded host scan. This is what the renderer uses by
//!   default, a parallel scan is easy to get subtly wrong and the host scan is cheap compared
//!   to everything around it.
//! - [`prefix_sum_parallel_into`]: a hierarchical block scan. Each group of
//!   [`THREADS_PER_GROUP`] elements is scanned independently, the group totals are scanned
//!   (recursively), and the scanned totals are added back onto every later group.
//!
//! Sums saturate at `u32::MAX` rather than wrapping, so offsets stay monotonic even for
//! absurd inputs.
use rayon::prelude::*;

/// Number of elements scanned per group by the parallel scan.
pub const THREADS_PER_GROUP: usize = 512;

fn scan_group(input: &[u32], output: &mut [u32]) -> u32 {
    let mut acc = 0u32;
    for (out, &val) in output.iter_mut().zip(input) {
        acc = acc.saturating_add(val);
        *out = acc;
    }
    acc
}

/// Scan `input` into `output` on the calling thread. Returns the total.
pub fn prefix_sum_into(input: &[u32], output: &mut [u32]) -> u32 {
    assert_eq!(
        input.len(),
        output.len(),
        "Input and output of a prefix sum must have the same length"
    );
    scan_group(input, output)
}

/// Scan `input` into `output` using the rayon pool. Returns the total.
pub fn prefix_sum_parallel_into(input: &[u32], output: &mut [u32]) -> u32 {
    assert_eq!(
        input.len(),
        output.len(),
        "Input and output of a prefix sum must have the same length"
    );

    if input.len() <= THREADS_PER_GROUP {
        return scan_group(input, output);
    }

    let _span = tracing::trace_span!("PrefixSumParallel", len = input.len()).entered();

    // Scan every group on its own.
    let group_sums: Vec<u32> = input
        .par_chunks(THREADS_PER_GROUP)
        .zip(output.par_chunks_mut(THREADS_PER_GROUP))
        .map(|(inp, out)| scan_group(inp, out))
        .collect();

    // Scan the group totals. This recurses until everything fits in one group.
    let mut scanned_sums = vec![0u32; group_sums.len()];
    let total = prefix_sum_parallel_into(&group_sums, &mut scanned_sums);

    // Group i needs the total of all groups before it.
    output
        .par_chunks_mut(THREADS_PER_GROUP)
        .skip(1)
        .zip(scanned_sums.par_iter())
        .for_each(|(out, &offset)| {
            for val in out {
                *val = val.saturating_add(offset);
            }
        });

    total
}

/// Compute the inclusive prefix sum over all elements.
pub fn prefix_sum(input: &[u32]) -> Vec<u32> {
    let mut output = vec![0; input.len()];
    prefix_sum_into(input, &mut output);
    output
}

/// Compute the inclusive prefix sum over all elements using the parallel scan.
pub fn prefix_sum_parallel(input: &[u32]) -> Vec<u32> {
    let mut output = vec![0; input.len()];
    prefix_sum_parallel_into(input, &mut output);
    output
}
