//! Execution-unit contract.
//!
//! The primitives never talk to hardware directly. They consume an
//! [`ExecutionUnit`]: allocate zeroed device memory, copy to and from it,
//! and launch a kernel over a [`LaunchGeometry`] with submit-and-wait
//! semantics. Backends (the CPU unit today) implement this trait.

use std::fmt;

use bytemuck::Pod;

use crate::error::Result;
use crate::memory::DeviceBuffer;
use crate::types::{DeviceKind, LaunchGeometry};

/// Static description of an execution unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    /// Human-readable name.
    pub name: String,
    /// Groups guaranteed to be resident at the same time (occupancy).
    pub compute_units: usize,
    /// Largest lane count of one group.
    pub max_lanes_per_group: usize,
    /// Fast on-chip memory available to one group, in bytes.
    pub local_mem_bytes: usize,
    /// Largest total lane count of one launch.
    pub max_launch_lanes: usize,
    /// Throughput- or latency-oriented.
    pub kind: DeviceKind,
}

impl DeviceInfo {
    /// Check whether the unit is throughput-oriented.
    pub fn is_throughput(&self) -> bool {
        self.kind == DeviceKind::Throughput
    }
}

impl fmt::Display for DeviceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({} units, {} lanes/group, {} KiB local)",
            self.name,
            self.compute_units,
            self.max_lanes_per_group,
            self.local_mem_bytes / 1024
        )
    }
}

/// Per-group view handed to a kernel.
#[derive(Debug, Clone, Copy)]
pub struct GroupContext {
    group_id: usize,
    group_count: usize,
    lanes: usize,
    local_mem_bytes: usize,
}

impl GroupContext {
    /// Create a context for `group_id` within `geometry`.
    pub fn new(group_id: usize, geometry: LaunchGeometry, local_mem_bytes: usize) -> Self {
        Self {
            group_id,
            group_count: geometry.group_count,
            lanes: geometry.lanes_per_group,
            local_mem_bytes,
        }
    }

    /// Index of this group in the launch.
    #[inline]
    pub fn group_id(&self) -> usize {
        self.group_id
    }

    /// Number of groups in the launch.
    #[inline]
    pub fn group_count(&self) -> usize {
        self.group_count
    }

    /// Lanes in this group.
    #[inline]
    pub fn lanes(&self) -> usize {
        self.lanes
    }

    /// Check whether this is the first group of the launch.
    #[inline]
    pub fn is_first_group(&self) -> bool {
        self.group_id == 0
    }

    /// Elements of `T` that fit in this group's local memory.
    #[inline]
    pub fn local_mem_elems<T>(&self) -> usize {
        self.local_mem_bytes / std::mem::size_of::<T>().max(1)
    }

    /// Synchronize all lanes of this group.
    ///
    /// Lanes of a group are simulated in order on one host thread, so every
    /// lane has finished the previous phase by the time this returns.
    #[inline]
    pub fn barrier(&self) {}
}

/// Counters reported by an execution unit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UnitMetrics {
    /// Launches issued.
    pub launches: u64,
    /// Worker groups run to completion.
    pub groups_executed: u64,
    /// Device bytes currently allocated.
    pub bytes_allocated: usize,
    /// Highest number of device bytes allocated at once.
    pub peak_bytes: usize,
    /// Bytes copied host to device.
    pub bytes_to_device: u64,
    /// Bytes copied device to host.
    pub bytes_to_host: u64,
}

/// A parallel execution unit the primitives can run on.
pub trait ExecutionUnit: Send + Sync {
    /// Static description of the unit.
    fn info(&self) -> &DeviceInfo;

    /// Allocate `count` zero-initialised elements of device memory.
    ///
    /// The allocation is freed when the returned buffer drops.
    fn alloc<T: Pod>(&self, count: usize) -> Result<DeviceBuffer<T>>;

    /// Copy `src` into the start of `dst`.
    fn copy_to_device<T: Pod>(&self, dst: &mut DeviceBuffer<T>, src: &[T]) -> Result<()> {
        dst.copy_from_host(src)
    }

    /// Copy the start of `src` into `dst`.
    fn copy_to_host<T: Pod>(&self, src: &DeviceBuffer<T>, dst: &mut [T]) -> Result<()> {
        src.copy_to_host(dst)
    }

    /// Run `kernel` once per group of `geometry` and wait for all of them.
    ///
    /// Every group of one launch is resident at the same time; kernels may
    /// therefore spin on progress made by other groups of the same launch.
    fn launch<F>(&self, geometry: LaunchGeometry, kernel: F) -> Result<()>
    where
        F: Fn(&GroupContext) + Sync;

    /// Largest geometry with `lanes_per_group` lanes whose groups are all
    /// guaranteed to be resident at once.
    ///
    /// Never exceeds the unit's `max_launch_lanes`.
    fn occupancy(&self, lanes_per_group: usize) -> LaunchGeometry {
        let info = self.info();
        let lanes = lanes_per_group.clamp(1, info.max_lanes_per_group.max(1));
        let launchable = (info.max_launch_lanes / lanes).max(1);
        LaunchGeometry::new(info.compute_units.min(launchable).max(1), lanes)
    }

    /// Counters since creation.
    fn metrics(&self) -> UnitMetrics;
}
