//! Group-local scan and reduction.
//!
//! These are the building blocks every engine composes. They work on a
//! contiguous slice visible to all lanes of one group and model the lane
//! structure explicitly:
//!
//! - scans are lane-blocked: lane `l` owns the `l`-th chunk of
//!   `⌈len / lanes⌉` elements (trailing lanes own nothing and contribute the
//!   identity), chunk totals are scanned across lanes, then every lane scans
//!   its chunk seeded by its lane prefix;
//! - reductions are lane-strided: lane `l` folds elements `l, l + lanes, …`,
//!   then lane partials are collapsed with a pairwise tree.
//!
//! The association of `op` depends only on the slice length and the lane
//! count, so results are reproducible run to run.

use gridscan_core::{GroupContext, ReductionOp, ReductionScalar, ScanType};

/// Chunk length owned by each lane for a slice of `len` elements.
#[inline]
fn lane_chunk(len: usize, lanes: usize) -> usize {
    len.div_ceil(lanes.max(1)).max(1)
}

/// Left fold of each lane's chunk.
fn lane_totals<T: ReductionScalar>(
    ctx: &GroupContext,
    op: ReductionOp,
    input: &[T],
    chunk: usize,
) -> Vec<T> {
    (0..ctx.lanes())
        .map(|lane| {
            let start = (lane * chunk).min(input.len());
            let end = (start + chunk).min(input.len());
            op.fold(&input[start..end])
        })
        .collect()
}

/// Total of `input` with the same association as [`scan_over_group`].
pub fn aggregate_over_group<T: ReductionScalar>(
    ctx: &GroupContext,
    op: ReductionOp,
    input: &[T],
) -> T {
    let chunk = lane_chunk(input.len(), ctx.lanes());
    let totals = lane_totals(ctx, op, input, chunk);
    ctx.barrier();
    op.fold(&totals)
}

/// Scan `input` into `output` and return the total of `input`.
///
/// With `prefix = Some(p)` every written element is `op(p, local)`, where
/// `local` is the unseeded scan value; the returned total never includes
/// `p`. For exclusive scans the returned total still covers the last
/// element, which the output alone does not.
pub fn scan_over_group<T: ReductionScalar>(
    ctx: &GroupContext,
    op: ReductionOp,
    scan_type: ScanType,
    input: &[T],
    output: &mut [T],
    prefix: Option<T>,
) -> T {
    debug_assert_eq!(input.len(), output.len());
    if input.is_empty() {
        return op.identity();
    }

    let chunk = lane_chunk(input.len(), ctx.lanes());

    // Phase 1: per-lane totals.
    let totals = lane_totals(ctx, op, input, chunk);
    ctx.barrier();

    // Phase 2: exclusive scan of lane totals; lane 0 owns it.
    let mut lane_prefixes = Vec::with_capacity(totals.len());
    let mut running = op.identity();
    for &total in &totals {
        lane_prefixes.push(running);
        running = op.apply(running, total);
    }
    let aggregate = running;
    ctx.barrier();

    // Phase 3: every lane scans its chunk from its lane prefix.
    let seed = |value: T| match prefix {
        Some(p) => op.apply(p, value),
        None => value,
    };
    for (lane, &lane_prefix) in lane_prefixes.iter().enumerate() {
        let start = (lane * chunk).min(input.len());
        let end = (start + chunk).min(input.len());
        let mut acc = lane_prefix;
        for i in start..end {
            match scan_type {
                ScanType::Inclusive => {
                    acc = op.apply(acc, input[i]);
                    output[i] = seed(acc);
                }
                ScanType::Exclusive => {
                    output[i] = seed(acc);
                    acc = op.apply(acc, input[i]);
                }
            }
        }
    }
    ctx.barrier();

    aggregate
}

/// Combine `prefix` into every element of `values`, in place.
pub fn apply_prefix<T: ReductionScalar>(
    ctx: &GroupContext,
    op: ReductionOp,
    prefix: T,
    values: &mut [T],
) {
    for value in values.iter_mut() {
        *value = op.apply(prefix, *value);
    }
    ctx.barrier();
}

/// Lane-strided fold followed by a pairwise tree over lane partials.
///
/// Requires a commutative operator.
pub fn reduce_over_group<T: ReductionScalar>(
    ctx: &GroupContext,
    op: ReductionOp,
    input: &[T],
) -> T {
    let lanes = ctx.lanes().max(1);
    let mut partials: Vec<T> = (0..lanes)
        .map(|lane| {
            input
                .iter()
                .skip(lane)
                .step_by(lanes)
                .fold(op.identity(), |acc, &x| op.apply(acc, x))
        })
        .collect();
    ctx.barrier();

    collapse_partials(ctx, op, &mut partials)
}

/// Pairwise tree reduction of lane partials, as a group collective would do.
pub fn collapse_partials<T: ReductionScalar>(
    ctx: &GroupContext,
    op: ReductionOp,
    partials: &mut [T],
) -> T {
    let mut active = partials.len();
    if active == 0 {
        return op.identity();
    }
    while active > 1 {
        let half = active.div_ceil(2);
        for i in 0..active - half {
            partials[i] = op.apply(partials[i], partials[i + half]);
        }
        active = half;
        ctx.barrier();
    }
    partials[0]
}
