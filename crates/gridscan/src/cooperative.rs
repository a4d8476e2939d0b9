//! Cooperative single-launch scan.
//!
//! Launches exactly as many groups as are guaranteed resident and separates
//! three phases with grid barriers:
//!
//! 1. local scan of each group's balanced partition;
//! 2. after a barrier over all groups, every group except 0 folds the totals
//!    of earlier partitions, read from the output, into its prefix;
//! 3. after a barrier over all groups except 0, the prefix is combined into
//!    every local output element.
//!
//! The second barrier keeps phase 3 writes from racing phase 2 reads. No
//! group holds an exclusive slice of its partition during phase 2.

use tracing::{debug, warn};

use gridscan_core::{
    DevicePtr, ExecutionUnit, GroupContext, LaunchGeometry, Partition, PrimitivesConfig,
    ReductionOp, ReductionScalar, Result, ScanType,
};

use crate::barrier::{GridBarrier, MAX_BARRIER_GROUPS};
use crate::geometry::resident_geometry;
use crate::group_scan::{apply_prefix, scan_over_group};

/// Scan `input` into `output` in one full-occupancy launch.
pub fn cooperative_scan_device<T, E>(
    unit: &E,
    config: &PrimitivesConfig,
    op: ReductionOp,
    scan_type: ScanType,
    input: DevicePtr<'_, T>,
    output: DevicePtr<'_, T>,
) -> Result<()>
where
    T: ReductionScalar,
    E: ExecutionUnit,
{
    debug_assert_eq!(input.len(), output.len());
    let length = input.len();
    if length == 0 {
        return Ok(());
    }

    let resident = resident_geometry(unit, config);
    let geometry = LaunchGeometry::new(
        resident
            .group_count
            .min(MAX_BARRIER_GROUPS)
            .min(length),
        resident.lanes_per_group,
    );

    let arrive = GridBarrier::new(unit, geometry)?;
    let propagate = GridBarrier::with_predicate(unit, geometry, |group| group != 0)?;

    if geometry.group_count == 1 {
        warn!("Cooperative scan of {} elements runs on a single group", length);
    }
    debug!(
        "Cooperative scan: length={}, geometry={}, op={}, {}",
        length, geometry, op, scan_type
    );

    unit.launch(geometry, |ctx| {
        let part = Partition::for_group(ctx.group_count(), ctx.group_id(), length);
        let own = output.slice(part.offset, part.length);

        {
            // SAFETY: input is read-only; before the first barrier each group
            // touches only its own partition of output.
            let (src, dst) = unsafe {
                (
                    input.slice(part.offset, part.length).as_slice(),
                    own.as_mut_slice(),
                )
            };
            scan_over_group(ctx, op, scan_type, src, dst, None);
        }
        arrive.wait(ctx);

        // Phase 2 holds no exclusive slice: later groups read this
        // partition's last element.
        let prefix = (!ctx.is_first_group())
            .then(|| preceding_total(ctx, op, scan_type, input, output, length));

        propagate.wait(ctx);

        if let Some(prefix) = prefix {
            // SAFETY: past the second barrier no group reads output, and each
            // group writes only its own partition.
            let dst = unsafe { own.as_mut_slice() };
            apply_prefix(ctx, op, prefix, dst);
        }
    })
}

/// Left fold of the totals of every partition before this group's.
fn preceding_total<T: ReductionScalar>(
    ctx: &GroupContext,
    op: ReductionOp,
    scan_type: ScanType,
    input: DevicePtr<'_, T>,
    output: DevicePtr<'_, T>,
    length: usize,
) -> T {
    (0..ctx.group_id())
        .map(|group| Partition::for_group(ctx.group_count(), group, length))
        .filter(|part| !part.is_empty())
        .fold(op.identity(), |acc, part| {
            let last = part.end() - 1;
            // SAFETY: every group finished writing its partition before the
            // first barrier, and nobody writes output again until the second.
            let total = unsafe {
                match scan_type {
                    ScanType::Inclusive => output.read(last),
                    ScanType::Exclusive => op.apply(output.read(last), input.read(last)),
                }
            };
            op.apply(acc, total)
        })
}
