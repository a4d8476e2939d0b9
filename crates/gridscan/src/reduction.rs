//! Reduction dispatcher.
//!
//! Large inputs are cut into launches that respect the unit's lane limit.
//! With unroll factor `U` every lane folds `U` elements, so one launch
//! covers up to `max_lanes × U` elements. Full launches are issued at the
//! largest factor; what is left is retried with the next smaller factor,
//! down to `U = 1`. Each launch leaves one partial per group on the device,
//! and the partials of all launches are combined on the host.

use tracing::{debug, trace};

use gridscan_core::memory::align;
use gridscan_core::{
    DevicePtr, ExecutionUnit, LaunchGeometry, PrimitivesConfig, ReductionOp, ReductionScalar,
    Result,
};

use crate::geometry::lanes_per_group;
use crate::group_scan::collapse_partials;

/// One launch of a reduction plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlannedLaunch {
    /// First element covered.
    pub offset: usize,
    /// Elements covered.
    pub length: usize,
    /// Elements folded per lane.
    pub unroll: usize,
}

impl PlannedLaunch {
    /// Lanes needed to cover the launch.
    pub fn lanes(&self) -> usize {
        self.length.div_ceil(self.unroll)
    }

    fn slice<'a, T>(&self, input: DevicePtr<'a, T>) -> DevicePtr<'a, T> {
        input.slice(self.offset, self.length)
    }
}

/// Sequence of launches covering `[0, length)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReductionPlan {
    launches: Vec<PlannedLaunch>,
}

impl ReductionPlan {
    /// Plan launches for `length` elements with at most `max_lanes` lanes
    /// each, trying `unroll_factors` from first to last.
    ///
    /// The last factor must be 1 for the plan to cover every element.
    pub fn new(length: usize, max_lanes: usize, unroll_factors: &[usize]) -> Self {
        let max_lanes = max_lanes.max(1);
        let mut launches = Vec::new();
        let mut offset = 0;

        for (index, &unroll) in unroll_factors.iter().enumerate() {
            let is_last = index + 1 == unroll_factors.len();
            let unroll = unroll.max(1);
            let full = max_lanes * unroll;

            while length - offset >= full {
                launches.push(PlannedLaunch {
                    offset,
                    length: full,
                    unroll,
                });
                offset += full;
            }

            let remaining = length - offset;
            let covered = if is_last {
                remaining
            } else {
                remaining / unroll * unroll
            };
            if covered > 0 {
                launches.push(PlannedLaunch {
                    offset,
                    length: covered,
                    unroll,
                });
                offset += covered;
            }

            if offset == length {
                break;
            }
        }

        Self { launches }
    }

    /// Planned launches in order.
    pub fn launches(&self) -> &[PlannedLaunch] {
        &self.launches
    }

    /// Elements covered by the plan.
    pub fn covered(&self) -> usize {
        self.launches.iter().map(|l| l.length).sum()
    }
}

/// Reduce `input` on the device, combining launch partials on the host.
pub fn reduce_device_ptr<T, E>(
    unit: &E,
    config: &PrimitivesConfig,
    op: ReductionOp,
    input: DevicePtr<'_, T>,
) -> Result<T>
where
    T: ReductionScalar,
    E: ExecutionUnit,
{
    let length = input.len();
    if length == 0 {
        return Ok(op.identity());
    }

    let info = unit.info();
    let lanes = lanes_per_group(info, config);
    let max_lanes = align::round_down(info.max_launch_lanes, lanes).max(lanes);
    let plan = ReductionPlan::new(length, max_lanes, &config.unroll_factors);

    debug!(
        "Reduction: length={}, launches={}, lanes_per_group={}, op={}",
        length,
        plan.launches().len(),
        lanes,
        op
    );

    let max_groups = plan
        .launches()
        .iter()
        .map(|l| l.lanes().div_ceil(lanes))
        .max()
        .unwrap_or(1);
    let mut partials = unit.alloc::<T>(max_groups)?;
    let mut host_partials = vec![op.identity(); max_groups];
    let mut result = op.identity();

    for launch in plan.launches() {
        let group_lanes = lanes.min(launch.lanes());
        let geometry = LaunchGeometry::new(launch.lanes().div_ceil(group_lanes), group_lanes);
        trace!(
            "Reduction launch: offset={}, length={}, unroll={}, geometry={}",
            launch.offset,
            launch.length,
            launch.unroll,
            geometry
        );

        let chunk = launch.slice(input);
        let partials_ptr = partials.device_ptr_mut();
        let unroll = launch.unroll;
        unit.launch(geometry, |ctx| {
            let span = ctx.lanes() * unroll;
            let start = ctx.group_id() * span;
            let end = (start + span).min(chunk.len());
            // SAFETY: input is read-only; each group writes only its own
            // partial slot.
            let values = unsafe { chunk.slice(start, end - start).as_slice() };

            let mut lane_partials: Vec<T> = (0..ctx.lanes())
                .map(|lane| {
                    (0..unroll)
                        .map(|k| lane + k * ctx.lanes())
                        .take_while(|&i| i < values.len())
                        .fold(op.identity(), |acc, i| op.apply(acc, values[i]))
                })
                .collect();
            ctx.barrier();

            let partial = collapse_partials(ctx, op, &mut lane_partials);
            // SAFETY: slot `group_id` belongs to this group.
            unsafe { partials_ptr.write(ctx.group_id(), partial) };
        })?;

        let groups = geometry.group_count;
        unit.copy_to_host(&partials, &mut host_partials[..groups])?;
        result = op.apply(result, op.fold(&host_partials[..groups]));
    }

    Ok(result)
}
