//! # GridScan Core
//!
//! Core traits and types shared by the gridscan primitives and the execution
//! units they run on.
//!
//! ## Core Abstractions
//!
//! - [`ReductionOp`] / [`ReductionScalar`] - Combining operators with known identities
//! - [`Partition`] - Balanced and local-memory-sized work partitioning
//! - [`ExecutionUnit`] - Allocate, copy and launch on a parallel execution unit
//! - [`DeviceBuffer`] / [`DevicePtr`] - Owned device memory and its kernel view
//! - [`PrimitivesConfig`] - Strategy selection and tuning thresholds
//!
//! ## Example
//!
//! ```ignore
//! use gridscan_core::prelude::*;
//!
//! assert_eq!(ReductionOp::Sum.fold(&[1u32, 2, 3]), 6);
//! assert_eq!(group_work_size(4, 0, 10), 3);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_op_in_unsafe_fn)]

pub mod config;
pub mod error;
pub mod memory;
pub mod partition;
pub mod reduction;
pub mod runtime;
pub mod types;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::{ConfigBuilder, PrimitivesConfig, ScanStrategy};
    pub use crate::error::*;
    pub use crate::memory::{DeviceBuffer, DevicePtr, MemoryTracker};
    pub use crate::partition::{
        group_cumulative_offset, group_work_size, local_partition_length, partition_count,
        Partition,
    };
    pub use crate::reduction::{ReductionOp, ReductionScalar};
    pub use crate::runtime::{DeviceInfo, ExecutionUnit, GroupContext, UnitMetrics};
    pub use crate::types::{DeviceKind, LaunchGeometry, ScanType};
}

pub use config::{ConfigBuilder, PrimitivesConfig, ScanStrategy};
pub use error::{GridScanError, Result};
pub use memory::{DeviceBuffer, DevicePtr, MemoryTracker};
pub use partition::{
    group_cumulative_offset, group_work_size, local_partition_length, partition_count, Partition,
};
pub use reduction::{ReductionOp, ReductionScalar};
pub use runtime::{DeviceInfo, ExecutionUnit, GroupContext, UnitMetrics};
pub use types::{DeviceKind, LaunchGeometry, ScanType};
