//! # GridScan
//!
//! Prefix scan and reduction primitives for execution units with many
//! independent worker groups.
//!
//! ## Engines
//!
//! - **Decoupled lookback** ([`lookback`]) - single-pass scan; partitions
//!   publish aggregates and prefixes through status descriptors instead of
//!   a global barrier. The primary engine.
//! - **Cooperative** ([`cooperative`]) - one full-occupancy launch with two
//!   grid barriers.
//! - **Two-pass** ([`two_pass`]) - prescan, host scan of group totals,
//!   propagate. Used for short inputs on throughput units.
//! - **Reduction** ([`reduction`]) - adaptive chunking with per-lane
//!   unrolling and host-side combination of launch partials.
//!
//! Every engine assumes the groups it waits on are resident; see
//! [`descriptor`] and [`barrier`] for the forward-progress requirements.
//!
//! ## Example
//!
//! ```ignore
//! use gridscan::prelude::*;
//! use gridscan_cpu::CpuExecutionUnit;
//!
//! let prims = ParallelPrimitives::new(CpuExecutionUnit::new());
//! let mut out = [0u32; 5];
//! prims.scan(ReductionOp::Sum, ScanType::Inclusive, &[1, 1, 1, 1, 1], &mut out)?;
//! assert_eq!(out, [1, 2, 3, 4, 5]);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_op_in_unsafe_fn)]

pub mod barrier;
pub mod cooperative;
pub mod descriptor;
mod geometry;
pub mod group_scan;
pub mod host;
pub mod lookback;
pub mod primitives;
pub mod reduction;
pub mod two_pass;

pub use gridscan_core;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::barrier::{GridBarrier, MAX_BARRIER_GROUPS};
    pub use crate::primitives::{reduce, reduce_device, scan, scan_device, ParallelPrimitives};
    pub use crate::reduction::{PlannedLaunch, ReductionPlan};
    pub use gridscan_core::prelude::*;
}

pub use primitives::{reduce, reduce_device, scan, scan_device, ParallelPrimitives};
