//! CPU execution unit.

use std::any::Any;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use bytemuck::Pod;
use parking_lot::Mutex;
use tracing::{debug, info, trace};

use gridscan_core::error::{GridScanError, Result};
use gridscan_core::memory::{DeviceBuffer, MemoryTracker};
use gridscan_core::runtime::{DeviceInfo, ExecutionUnit, GroupContext, UnitMetrics};
use gridscan_core::types::LaunchGeometry;

use crate::config::CpuUnitConfig;

/// Execution unit backed by OS threads.
///
/// Each launch runs on `min(groups, compute_units)` scoped worker threads.
/// Workers claim group ids in increasing order, and the lanes of a group
/// are simulated one after another inside the worker that claimed it. A
/// launch of at most `compute_units` groups therefore has every group
/// resident at once, which is what lookback and grid-barrier spins need.
pub struct CpuExecutionUnit {
    info: DeviceInfo,
    memory: Arc<MemoryTracker>,
    launches: AtomicU64,
    groups_executed: AtomicU64,
    bytes_to_device: AtomicU64,
    bytes_to_host: AtomicU64,
    last_geometry: Mutex<Option<LaunchGeometry>>,
}

impl CpuExecutionUnit {
    /// Create a unit with the default configuration.
    pub fn new() -> Self {
        Self::from_validated(CpuUnitConfig::default())
    }

    /// Create a unit from `config`.
    pub fn with_config(config: CpuUnitConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::from_validated(config))
    }

    fn from_validated(config: CpuUnitConfig) -> Self {
        let info = DeviceInfo {
            name: config.name,
            compute_units: config.compute_units,
            max_lanes_per_group: config.max_lanes_per_group,
            local_mem_bytes: config.local_mem_bytes,
            max_launch_lanes: config.max_launch_lanes,
            kind: config.kind,
        };
        info!("Initializing CPU execution unit: {}", info);

        let memory = match config.memory_capacity {
            Some(capacity) => MemoryTracker::with_capacity(capacity),
            None => MemoryTracker::new(),
        };

        Self {
            info,
            memory: Arc::new(memory),
            launches: AtomicU64::new(0),
            groups_executed: AtomicU64::new(0),
            bytes_to_device: AtomicU64::new(0),
            bytes_to_host: AtomicU64::new(0),
            last_geometry: Mutex::new(None),
        }
    }

    /// Geometry of the most recent successful launch.
    pub fn last_geometry(&self) -> Option<LaunchGeometry> {
        *self.last_geometry.lock()
    }

    /// Memory accounting for this unit.
    pub fn memory(&self) -> &MemoryTracker {
        &self.memory
    }

    fn validate_geometry(&self, geometry: LaunchGeometry) -> Result<()> {
        if geometry.is_empty() {
            return Err(GridScanError::invalid_config(format!(
                "launch geometry {} has no lanes",
                geometry
            )));
        }

        if geometry.lanes_per_group > self.info.max_lanes_per_group {
            return Err(GridScanError::invalid_config(format!(
                "{} lanes per group exceeds the maximum of {}",
                geometry.lanes_per_group, self.info.max_lanes_per_group
            )));
        }

        let total = geometry
            .group_count
            .checked_mul(geometry.lanes_per_group)
            .unwrap_or(usize::MAX);
        if total > self.info.max_launch_lanes {
            return Err(GridScanError::invalid_config(format!(
                "launch of {} lanes exceeds the maximum of {}",
                total, self.info.max_launch_lanes
            )));
        }

        Ok(())
    }
}

impl Default for CpuExecutionUnit {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecutionUnit for CpuExecutionUnit {
    fn info(&self) -> &DeviceInfo {
        &self.info
    }

    fn alloc<T: Pod>(&self, count: usize) -> Result<DeviceBuffer<T>> {
        let buffer = DeviceBuffer::zeroed(count, Arc::clone(&self.memory))?;
        trace!(
            "Allocated {} bytes ({} in use)",
            buffer.size_bytes(),
            self.memory.current_bytes()
        );
        Ok(buffer)
    }

    fn copy_to_device<T: Pod>(&self, dst: &mut DeviceBuffer<T>, src: &[T]) -> Result<()> {
        dst.copy_from_host(src)?;
        self.bytes_to_device
            .fetch_add(std::mem::size_of_val(src) as u64, Ordering::Relaxed);
        Ok(())
    }

    fn copy_to_host<T: Pod>(&self, src: &DeviceBuffer<T>, dst: &mut [T]) -> Result<()> {
        src.copy_to_host(dst)?;
        self.bytes_to_host
            .fetch_add(std::mem::size_of_val(dst) as u64, Ordering::Relaxed);
        Ok(())
    }

    fn launch<F>(&self, geometry: LaunchGeometry, kernel: F) -> Result<()>
    where
        F: Fn(&GroupContext) + Sync,
    {
        self.validate_geometry(geometry)?;

        let workers = geometry.group_count.min(self.info.compute_units);
        debug!(
            "Launching {} groups on {} workers (lanes_per_group={})",
            geometry.group_count, workers, geometry.lanes_per_group
        );

        let next_group = AtomicUsize::new(0);
        let completed = AtomicU64::new(0);
        let local_mem_bytes = self.info.local_mem_bytes;

        let worker = || loop {
            let group_id = next_group.fetch_add(1, Ordering::Relaxed);
            if group_id >= geometry.group_count {
                break;
            }
            kernel(&GroupContext::new(group_id, geometry, local_mem_bytes));
            completed.fetch_add(1, Ordering::Relaxed);
        };

        let failure = std::thread::scope(|scope| {
            let mut handles = Vec::with_capacity(workers);
            let mut failure = None;

            for index in 0..workers {
                let spawned = std::thread::Builder::new()
                    .name(format!("gridscan-worker-{index}"))
                    .spawn_scoped(scope, &worker);
                match spawned {
                    Ok(handle) => handles.push(handle),
                    Err(e) => {
                        failure = Some(format!("failed to spawn worker {index}: {e}"));
                        break;
                    }
                }
            }

            for handle in handles {
                if let Err(payload) = handle.join() {
                    failure.get_or_insert_with(|| {
                        format!("worker group panicked: {}", panic_message(&*payload))
                    });
                }
            }

            failure
        });

        let completed = completed.into_inner();
        self.groups_executed.fetch_add(completed, Ordering::Relaxed);

        if let Some(reason) = failure {
            return Err(GridScanError::launch(reason));
        }

        self.launches.fetch_add(1, Ordering::Relaxed);
        *self.last_geometry.lock() = Some(geometry);
        trace!("Launch {} completed ({} groups)", geometry, completed);

        Ok(())
    }

    fn metrics(&self) -> UnitMetrics {
        UnitMetrics {
            launches: self.launches.load(Ordering::Relaxed),
            groups_executed: self.groups_executed.load(Ordering::Relaxed),
            bytes_allocated: self.memory.current_bytes(),
            peak_bytes: self.memory.peak_bytes(),
            bytes_to_device: self.bytes_to_device.load(Ordering::Relaxed),
            bytes_to_host: self.bytes_to_host.load(Ordering::Relaxed),
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
