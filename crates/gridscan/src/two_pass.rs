//! Two-pass scan, the small-input fallback.
//!
//! 1. **Prescan** launch: every group scans its balanced partition unseeded
//!    and writes its total to a device buffer of group totals.
//! 2. The totals are copied to the host, scanned exclusively there and
//!    copied back.
//! 3. **Propagate** launch: every group except 0 combines its prefix into
//!    its partition.
//!
//! Nothing waits on another group, so any geometry works.

use tracing::{debug, trace};

use gridscan_core::{
    DevicePtr, ExecutionUnit, LaunchGeometry, Partition, ReductionOp, ReductionScalar, Result,
    ScanType,
};

use crate::group_scan::{apply_prefix, scan_over_group};
use crate::host::host_scan;

/// Scan `input` into `output` with a prescan and a propagate launch.
pub fn two_pass_scan_device<T, E>(
    unit: &E,
    geometry: LaunchGeometry,
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

    let group_count = geometry.group_count;
    debug!(
        "Two-pass scan: length={}, geometry={}, op={}, {}",
        length, geometry, op, scan_type
    );

    let mut totals = unit.alloc::<T>(group_count)?;

    {
        let totals_ptr = totals.device_ptr_mut();
        unit.launch(geometry, |ctx| {
            let part = Partition::for_group(group_count, ctx.group_id(), length);
            // SAFETY: input is read-only; output partitions and total slots
            // are written only by their owning group.
            let (src, dst) = unsafe {
                (
                    input.slice(part.offset, part.length).as_slice(),
                    output.slice(part.offset, part.length).as_mut_slice(),
                )
            };
            let total = scan_over_group(ctx, op, scan_type, src, dst, None);
            unsafe { totals_ptr.write(ctx.group_id(), total) };
        })?;
    }

    if group_count == 1 {
        return Ok(());
    }

    let mut host_totals = vec![op.identity(); group_count];
    unit.copy_to_host(&totals, &mut host_totals)?;
    let mut prefixes = vec![op.identity(); group_count];
    host_scan(op, ScanType::Exclusive, &host_totals, &mut prefixes);
    unit.copy_to_device(&mut totals, &prefixes)?;
    trace!("Two-pass group prefixes computed for {} groups", group_count);

    let prefix_ptr = totals.device_ptr();
    unit.launch(geometry, |ctx| {
        if ctx.is_first_group() {
            return;
        }
        let part = Partition::for_group(group_count, ctx.group_id(), length);
        // SAFETY: prefixes are read-only here; each output partition is
        // written only by its owning group.
        let (prefix, dst) = unsafe {
            (
                prefix_ptr.read(ctx.group_id()),
                output.slice(part.offset, part.length).as_mut_slice(),
            )
        };
        apply_prefix(ctx, op, prefix, dst);
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridscan_cpu::{CpuExecutionUnit, CpuUnitConfig};

    fn unit() -> CpuExecutionUnit {
        let config = CpuUnitConfig::builder()
            .compute_units(2)
            .max_lanes_per_group(16)
            .local_mem_bytes(1024)
            .build()
            .unwrap();
        CpuExecutionUnit::with_config(config).unwrap()
    }

    fn run<T: ReductionScalar>(
        unit: &CpuExecutionUnit,
        geometry: LaunchGeometry,
        op: ReductionOp,
        scan_type: ScanType,
        input: &[T],
    ) -> Vec<T> {
        let mut d_in = unit.alloc::<T>(input.len()).unwrap();
        let mut d_out = unit.alloc::<T>(input.len()).unwrap();
        unit.copy_to_device(&mut d_in, input).unwrap();
        two_pass_scan_device(
            unit,
            geometry,
            op,
            scan_type,
            d_in.device_ptr(),
            d_out.device_ptr_mut(),
        )
        .unwrap();
        d_out.as_slice().to_vec()
    }

    #[test]
    fn test_more_groups_than_workers() {
        let unit = unit();
        let input: Vec<u32> = (0..1000).collect();
        let output = run(&unit, LaunchGeometry::new(7, 16), ReductionOp::Sum, ScanType::Inclusive, &input);
        for (i, &value) in output.iter().enumerate() {
            let i = i as u32;
            assert_eq!(value, i * (i + 1) / 2);
        }
        assert_eq!(unit.metrics().launches, 2);
        assert_eq!(unit.metrics().bytes_allocated, 0);
    }

    #[test]
    fn test_exclusive_xor() {
        let unit = unit();
        let input: Vec<u64> = (0..300).map(|i| i * 0x9e37_79b9).collect();
        let output = run(&unit, LaunchGeometry::new(5, 8), ReductionOp::Xor, ScanType::Exclusive, &input);
        let mut acc = 0u64;
        for (i, &x) in input.iter().enumerate() {
            assert_eq!(output[i], acc);
            acc ^= x;
        }
    }

    #[test]
    fn test_single_group_is_one_launch() {
        let unit = unit();
        let input = vec![1i32; 100];
        let output = run(&unit, LaunchGeometry::single_group(16), ReductionOp::Sum, ScanType::Inclusive, &input);
        assert_eq!(output[99], 100);
        assert_eq!(unit.metrics().launches, 1);
    }
}
