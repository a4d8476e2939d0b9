//! Single-pass decoupled-lookback scan.
//!
//! The input is cut into fixed-size partitions that fit one group's local
//! memory. Groups visit partitions `g, g + G, g + 2G, …` in increasing
//! order. For each partition:
//!
//! 1. **Fast path**: the predecessor has already published its inclusive
//!    prefix. Reduce the partition, publish its aggregate and then its
//!    inclusive prefix, and write the scan seeded with the known prefix.
//! 2. **Slow path**: scan the partition unseeded, publish the aggregate,
//!    look back through earlier descriptors for the exclusive prefix, publish
//!    the inclusive prefix, and combine the prefix into the scanned values.
//!
//! Every output element and every descriptor slot is written once. Only
//! lower partitions are ever waited on, so with all groups resident the
//! lowest unfinished partition always makes progress.

use tracing::debug;

use gridscan_core::{
    local_partition_length, partition_count, DevicePtr, ExecutionUnit, GroupContext,
    LaunchGeometry, Partition, PrimitivesConfig, ReductionOp, ReductionScalar, Result, ScanType,
};

use crate::descriptor::{DescriptorArena, FencedDescriptor, PackedDescriptor, StatusDescriptor};
use crate::geometry::resident_geometry;
use crate::group_scan::{aggregate_over_group, apply_prefix, scan_over_group};

/// Scan `input` into `output` with decoupled lookback in one launch.
///
/// Both views must have the same length. Values of at most four bytes use
/// packed descriptors.
pub fn decoupled_scan_device<T, E>(
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
    if <PackedDescriptor as StatusDescriptor<T>>::fits() {
        run::<T, E, PackedDescriptor>(unit, config, op, scan_type, input, output)
    } else {
        run::<T, E, FencedDescriptor<T>>(unit, config, op, scan_type, input, output)
    }
}

fn run<T, E, D>(
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
    D: StatusDescriptor<T>,
{
    debug_assert_eq!(input.len(), output.len());
    let length = input.len();
    if length == 0 {
        return Ok(());
    }

    let resident = resident_geometry(unit, config);
    let partition_length =
        local_partition_length::<T>(unit.info().local_mem_bytes, resident.lanes_per_group);
    let partitions = partition_count(length, partition_length);
    let geometry = LaunchGeometry::new(
        resident.group_count.min(partitions),
        resident.lanes_per_group,
    );

    debug!(
        "Decoupled lookback scan: length={}, partitions={}x{}, geometry={}, op={}, {}",
        length, partitions, partition_length, geometry, op, scan_type
    );

    let arena = DescriptorArena::<T, D>::new(op, partitions);

    unit.launch(geometry, |ctx| {
        let mut local = Vec::with_capacity(partition_length);
        for partition_id in (ctx.group_id()..partitions).step_by(ctx.group_count()) {
            let part = Partition::fixed(partition_id, partition_length, length);
            // SAFETY: input is never written during the launch; each output
            // partition is written only by the group that owns it.
            let (src, dst) = unsafe {
                (
                    input.slice(part.offset, part.length).as_slice(),
                    output.slice(part.offset, part.length).as_mut_slice(),
                )
            };
            local.clear();
            local.extend_from_slice(src);
            scan_partition(ctx, &arena, op, scan_type, partition_id, &local, dst);
        }
    })?;

    Ok(())
}

fn scan_partition<T, D>(
    ctx: &GroupContext,
    arena: &DescriptorArena<T, D>,
    op: ReductionOp,
    scan_type: ScanType,
    partition_id: usize,
    local: &[T],
    output: &mut [T],
) where
    T: ReductionScalar,
    D: StatusDescriptor<T>,
{
    if let Some(prefix) = arena.is_ready(partition_id) {
        let aggregate = aggregate_over_group(ctx, op, local);
        arena.set_aggregate(partition_id, aggregate);
        arena.set_prefix(partition_id, op.apply(prefix, aggregate));
        scan_over_group(ctx, op, scan_type, local, output, Some(prefix));
        return;
    }

    let aggregate = scan_over_group(ctx, op, scan_type, local, output, None);
    arena.set_aggregate(partition_id, aggregate);
    let prefix = arena.run_lookback(partition_id);
    arena.set_prefix(partition_id, op.apply(prefix, aggregate));
    apply_prefix(ctx, op, prefix, output);
}
