//! Reusable grid-wide barrier for groups of one launch.
//!
//! The barrier is symmetric and has two rendezvous phases per `wait`:
//!
//! 1. **Arrival**: wait until no previous round is still departing, set
//!    this group's bit in `groups_waiting`. The arrival that completes the
//!    mask raises `reached`; everyone else spins until it is raised.
//! 2. **Departure**: clear this group's bit. The departure that empties
//!    `groups_waiting` lowers `reached`; everyone else spins until it is
//!    lowered.
//!
//! A group cannot re-enter until every participant has left, so the same
//! barrier can be waited on repeatedly inside a loop.
//!
//! Every participant must be resident for the whole launch; construction
//! fails fast when the execution unit cannot promise that.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use crossbeam::utils::Backoff;
use tracing::trace;

use gridscan_core::{ExecutionUnit, GridScanError, GroupContext, LaunchGeometry, Result};

/// Width of the participant mask.
pub const MAX_BARRIER_GROUPS: usize = u64::BITS as usize;

/// Grid barrier over a fixed subset of the groups of one launch.
#[derive(Debug)]
pub struct GridBarrier {
    barrier_mask: u64,
    groups_waiting: AtomicU64,
    reached: AtomicBool,
}

impl GridBarrier {
    /// Barrier over every group of `geometry`.
    pub fn new<E: ExecutionUnit>(unit: &E, geometry: LaunchGeometry) -> Result<Self> {
        Self::with_predicate(unit, geometry, |_| true)
    }

    /// Barrier over the listed groups of `geometry`.
    pub fn with_groups<E: ExecutionUnit>(
        unit: &E,
        geometry: LaunchGeometry,
        groups: &[usize],
    ) -> Result<Self> {
        Self::validate(unit, geometry)?;

        let mut mask = 0u64;
        for &group in groups {
            if group >= geometry.group_count {
                return Err(GridScanError::invalid_config(format!(
                    "barrier participant {} is outside a launch of {} groups",
                    group, geometry.group_count
                )));
            }
            mask |= 1 << group;
        }

        Ok(Self::from_mask(mask))
    }

    /// Barrier over the groups of `geometry` selected by `participates`.
    pub fn with_predicate<E, P>(unit: &E, geometry: LaunchGeometry, participates: P) -> Result<Self>
    where
        E: ExecutionUnit,
        P: Fn(usize) -> bool,
    {
        Self::validate(unit, geometry)?;

        let mask = (0..geometry.group_count)
            .filter(|&group| participates(group))
            .fold(0u64, |mask, group| mask | (1 << group));

        Ok(Self::from_mask(mask))
    }

    fn from_mask(barrier_mask: u64) -> Self {
        trace!("Grid barrier mask {:#x}", barrier_mask);
        Self {
            barrier_mask,
            groups_waiting: AtomicU64::new(0),
            reached: AtomicBool::new(false),
        }
    }

    fn validate<E: ExecutionUnit>(unit: &E, geometry: LaunchGeometry) -> Result<()> {
        if geometry.group_count > MAX_BARRIER_GROUPS {
            return Err(GridScanError::BarrierTooWide {
                groups: geometry.group_count,
                max: MAX_BARRIER_GROUPS,
            });
        }

        let info = unit.info();
        if geometry.group_count > info.compute_units {
            return Err(GridScanError::ForwardProgress {
                requested: geometry.group_count,
                available: info.compute_units,
            });
        }

        if geometry.lanes_per_group > info.max_lanes_per_group {
            return Err(GridScanError::ForwardProgress {
                requested: geometry.lanes_per_group,
                available: info.max_lanes_per_group,
            });
        }

        Ok(())
    }

    /// Participating groups, one bit per group id.
    pub fn mask(&self) -> u64 {
        self.barrier_mask
    }

    /// Check whether `group_id` takes part in the barrier.
    pub fn participates(&self, group_id: usize) -> bool {
        group_id < MAX_BARRIER_GROUPS && self.barrier_mask & (1 << group_id) != 0
    }

    /// Block until every participant has called `wait`.
    ///
    /// Returns immediately for non-participants.
    pub fn wait(&self, ctx: &GroupContext) {
        if !self.participates(ctx.group_id()) {
            return;
        }
        let bit = 1u64 << ctx.group_id();
        let backoff = Backoff::new();

        // Enter guard: the previous round must have fully departed.
        while self.reached.load(Ordering::Acquire) {
            backoff.snooze();
        }

        let arrived = self.groups_waiting.fetch_or(bit, Ordering::AcqRel) | bit;
        if arrived == self.barrier_mask {
            self.reached.store(true, Ordering::Release);
        } else {
            backoff.reset();
            while !self.reached.load(Ordering::Acquire) {
                backoff.snooze();
            }
        }

        let remaining = self.groups_waiting.fetch_and(!bit, Ordering::AcqRel) & !bit;
        if remaining == 0 {
            self.reached.store(false, Ordering::Release);
        } else {
            backoff.reset();
            while self.reached.load(Ordering::Acquire) {
                backoff.snooze();
            }
        }

        ctx.barrier();
    }
}
