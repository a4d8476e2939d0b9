//! Integration tests for the lookback protocol under artificial delay.
//!
//! A wrapping execution unit holds one group back before it starts, so the
//! partition it owns publishes last and every later partition has to spin
//! in lookback until it appears.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use gridscan::lookback::decoupled_scan_device;
use gridscan::prelude::*;
use gridscan_cpu::{CpuExecutionUnit, CpuUnitConfig};

/// Delays one group of every launch and records the order groups start in.
struct DelayedUnit {
    inner: CpuExecutionUnit,
    delayed_group: usize,
    delay: Duration,
    started: Arc<Mutex<Vec<usize>>>,
}

impl ExecutionUnit for DelayedUnit {
    fn info(&self) -> &DeviceInfo {
        self.inner.info()
    }

    fn alloc<T: bytemuck::Pod>(&self, count: usize) -> Result<DeviceBuffer<T>> {
        self.inner.alloc(count)
    }

    fn launch<F>(&self, geometry: LaunchGeometry, kernel: F) -> Result<()>
    where
        F: Fn(&GroupContext) + Sync,
    {
        self.inner.launch(geometry, |ctx| {
            if ctx.group_id() == self.delayed_group {
                std::thread::sleep(self.delay);
            }
            self.started.lock().push(ctx.group_id());
            kernel(ctx)
        })
    }

    fn metrics(&self) -> UnitMetrics {
        self.inner.metrics()
    }
}

/// 4 groups of 8 lanes with 256 bytes of local memory: 56 u32 per partition.
fn delayed_unit(delayed_group: usize) -> DelayedUnit {
    let config = CpuUnitConfig::builder()
        .compute_units(4)
        .max_lanes_per_group(8)
        .local_mem_bytes(256)
        .build()
        .expect("Failed to build unit config");
    DelayedUnit {
        inner: CpuExecutionUnit::with_config(config).expect("Failed to create unit"),
        delayed_group,
        delay: Duration::from_millis(100),
        started: Arc::new(Mutex::new(Vec::new())),
    }
}

fn run(unit: &DelayedUnit, scan_type: ScanType, input: &[u32]) -> Vec<u32> {
    let mut d_in = unit.alloc::<u32>(input.len()).expect("Failed to allocate");
    let mut d_out = unit.alloc::<u32>(input.len()).expect("Failed to allocate");
    unit.copy_to_device(&mut d_in, input).expect("Failed to copy");
    decoupled_scan_device(
        unit,
        &PrimitivesConfig::default(),
        ReductionOp::Sum,
        scan_type,
        d_in.device_ptr(),
        d_out.device_ptr_mut(),
    )
    .expect("Failed to scan");
    d_out.as_slice().to_vec()
}

/// Test that partition 3 waits for a late partition 2 and still gets the total.
#[test]
fn test_late_partition_two() {
    let unit = delayed_unit(2);
    let input: Vec<u32> = (1..=4 * 56).collect();

    let output = run(&unit, ScanType::Inclusive, &input);

    for (i, &value) in output.iter().enumerate() {
        let n = i as u32 + 1;
        assert_eq!(value, n * (n + 1) / 2, "index {i}");
    }
    assert_eq!(unit.started.lock().last(), Some(&2));
}

/// Test the exclusive form under the same delay.
#[test]
fn test_late_partition_two_exclusive() {
    let unit = delayed_unit(2);
    let input = vec![1u32; 4 * 56];

    let output = run(&unit, ScanType::Exclusive, &input);

    let expected: Vec<u32> = (0..4 * 56).collect();
    assert_eq!(output, expected);
}

/// Test that a late first partition stalls everything behind it, then resolves.
#[test]
fn test_late_partition_zero_with_revisits() {
    let unit = delayed_unit(0);
    // 10 partitions over 4 groups: groups revisit partitions with stride 4.
    let input = vec![3u32; 10 * 56];

    let output = run(&unit, ScanType::Inclusive, &input);

    assert_eq!(output[0], 3);
    assert_eq!(output[10 * 56 - 1], 3 * 10 * 56);
    assert!(output.windows(2).all(|w| w[1] == w[0] + 3));
}
