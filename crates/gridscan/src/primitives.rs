//! Public entry points.
//!
//! [`ParallelPrimitives`] binds an execution unit to a [`PrimitivesConfig`]
//! and exposes the host-slice (`scan`, `reduce`) and device-resident
//! (`scan_device`, `reduce_device`) forms of each primitive. The free
//! functions of the same names use the default configuration.
//!
//! Host-slice calls allocate device buffers, copy in, dispatch, copy out,
//! and free; buffers are released on every exit path, including errors.
//! All validation happens before anything is allocated or launched.

use tracing::debug;

use gridscan_core::{
    DeviceBuffer, ExecutionUnit, GridScanError, LaunchGeometry, PrimitivesConfig, ReductionOp,
    ReductionScalar, Result, ScanStrategy, ScanType,
};

use crate::cooperative::cooperative_scan_device;
use crate::geometry::{grid_geometry, lanes_per_group};
use crate::host::{host_reduce, host_scan};
use crate::lookback::decoupled_scan_device;
use crate::reduction::reduce_device_ptr;
use crate::two_pass::two_pass_scan_device;

/// Scan and reduction primitives bound to one execution unit.
pub struct ParallelPrimitives<E: ExecutionUnit> {
    unit: E,
    config: PrimitivesConfig,
}

impl<E: ExecutionUnit> ParallelPrimitives<E> {
    /// Create with the default configuration.
    pub fn new(unit: E) -> Self {
        Self {
            unit,
            config: PrimitivesConfig::default(),
        }
    }

    /// Create with `config`.
    pub fn with_config(unit: E, config: PrimitivesConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { unit, config })
    }

    /// The execution unit.
    pub fn unit(&self) -> &E {
        &self.unit
    }

    /// The configuration.
    pub fn config(&self) -> &PrimitivesConfig {
        &self.config
    }

    /// Engine `scan` and `scan_device` will use for `length` elements.
    ///
    /// `Auto` picks decoupled lookback, except on throughput-oriented units
    /// where short inputs go to the host or to the two-pass scan.
    pub fn resolve_strategy(&self, length: usize) -> ScanStrategy {
        resolve_strategy(&self.unit, &self.config, length)
    }

    /// Scan `input` into `output`. Both slices must have the same length.
    pub fn scan<T: ReductionScalar>(
        &self,
        op: ReductionOp,
        scan_type: ScanType,
        input: &[T],
        output: &mut [T],
    ) -> Result<()> {
        scan_with(&self.unit, &self.config, op, scan_type, input, output)
    }

    /// Scan the first `length` elements of a device buffer into another.
    pub fn scan_device<T: ReductionScalar>(
        &self,
        op: ReductionOp,
        scan_type: ScanType,
        input: &DeviceBuffer<T>,
        output: &mut DeviceBuffer<T>,
        length: usize,
    ) -> Result<()> {
        scan_device_with(&self.unit, &self.config, op, scan_type, input, output, length)
    }

    /// Two-pass scan on a single group of the unit's maximum lane count.
    pub fn group_scan_device<T: ReductionScalar>(
        &self,
        op: ReductionOp,
        scan_type: ScanType,
        input: &DeviceBuffer<T>,
        output: &mut DeviceBuffer<T>,
        length: usize,
    ) -> Result<()> {
        group_scan_device_with(&self.unit, op, scan_type, input, output, length)
    }

    /// Reduce `input`.
    pub fn reduce<T: ReductionScalar>(&self, op: ReductionOp, input: &[T]) -> Result<T> {
        reduce_with(&self.unit, &self.config, op, input)
    }

    /// Reduce the first `length` elements of a device buffer.
    pub fn reduce_device<T: ReductionScalar>(
        &self,
        op: ReductionOp,
        input: &DeviceBuffer<T>,
        length: usize,
    ) -> Result<T> {
        reduce_device_with(&self.unit, &self.config, op, input, length)
    }
}

/// Scan `input` into `output` with the default configuration.
pub fn scan<T, E>(
    unit: &E,
    op: ReductionOp,
    scan_type: ScanType,
    input: &[T],
    output: &mut [T],
) -> Result<()>
where
    T: ReductionScalar,
    E: ExecutionUnit,
{
    scan_with(unit, &PrimitivesConfig::default(), op, scan_type, input, output)
}

/// Scan device-resident data with the default configuration.
pub fn scan_device<T, E>(
    unit: &E,
    op: ReductionOp,
    scan_type: ScanType,
    input: &DeviceBuffer<T>,
    output: &mut DeviceBuffer<T>,
    length: usize,
) -> Result<()>
where
    T: ReductionScalar,
    E: ExecutionUnit,
{
    scan_device_with(
        unit,
        &PrimitivesConfig::default(),
        op,
        scan_type,
        input,
        output,
        length,
    )
}

/// Reduce `input` with the default configuration.
pub fn reduce<T, E>(unit: &E, op: ReductionOp, input: &[T]) -> Result<T>
where
    T: ReductionScalar,
    E: ExecutionUnit,
{
    reduce_with(unit, &PrimitivesConfig::default(), op, input)
}

/// Reduce device-resident data with the default configuration.
pub fn reduce_device<T, E>(
    unit: &E,
    op: ReductionOp,
    input: &DeviceBuffer<T>,
    length: usize,
) -> Result<T>
where
    T: ReductionScalar,
    E: ExecutionUnit,
{
    reduce_device_with(unit, &PrimitivesConfig::default(), op, input, length)
}

fn resolve_strategy<E: ExecutionUnit>(
    unit: &E,
    config: &PrimitivesConfig,
    length: usize,
) -> ScanStrategy {
    if config.strategy != ScanStrategy::Auto {
        return config.strategy;
    }
    if unit.info().is_throughput() {
        if length < config.host_scan_threshold {
            return ScanStrategy::Host;
        }
        if length < config.small_scan_threshold {
            return ScanStrategy::TwoPass;
        }
    }
    ScanStrategy::DecoupledLookback
}

fn check_length(expected: usize, actual: usize) -> Result<()> {
    if actual < expected {
        return Err(GridScanError::LengthMismatch { expected, actual });
    }
    Ok(())
}

fn scan_with<T, E>(
    unit: &E,
    config: &PrimitivesConfig,
    op: ReductionOp,
    scan_type: ScanType,
    input: &[T],
    output: &mut [T],
) -> Result<()>
where
    T: ReductionScalar,
    E: ExecutionUnit,
{
    op.check_supported::<T>()?;
    if output.len() != input.len() {
        return Err(GridScanError::LengthMismatch {
            expected: input.len(),
            actual: output.len(),
        });
    }

    let length = input.len();
    if length == 0 {
        return Ok(());
    }

    if resolve_strategy(unit, config, length) == ScanStrategy::Host {
        debug!("Host scan of {} elements", length);
        host_scan(op, scan_type, input, output);
        return Ok(());
    }

    let mut d_input = unit.alloc::<T>(length)?;
    let mut d_output = unit.alloc::<T>(length)?;
    unit.copy_to_device(&mut d_input, input)?;
    scan_device_with(unit, config, op, scan_type, &d_input, &mut d_output, length)?;
    unit.copy_to_host(&d_output, output)
}

fn scan_device_with<T, E>(
    unit: &E,
    config: &PrimitivesConfig,
    op: ReductionOp,
    scan_type: ScanType,
    input: &DeviceBuffer<T>,
    output: &mut DeviceBuffer<T>,
    length: usize,
) -> Result<()>
where
    T: ReductionScalar,
    E: ExecutionUnit,
{
    op.check_supported::<T>()?;
    check_length(length, input.len())?;
    check_length(length, output.len())?;
    if length == 0 {
        return Ok(());
    }

    let strategy = resolve_strategy(unit, config, length);
    debug!("Scan of {} elements using {} strategy", length, strategy);

    match strategy {
        ScanStrategy::Host => {
            let mut host_input = vec![op.identity(); length];
            let mut host_output = vec![op.identity(); length];
            unit.copy_to_host(input, &mut host_input)?;
            host_scan(op, scan_type, &host_input, &mut host_output);
            unit.copy_to_device(output, &host_output)
        }
        ScanStrategy::TwoPass => {
            let geometry = grid_geometry(unit, config, length);
            two_pass_scan_device(
                unit,
                geometry,
                op,
                scan_type,
                input.device_ptr().slice(0, length),
                output.device_ptr_mut().slice(0, length),
            )
        }
        ScanStrategy::Cooperative => cooperative_scan_device(
            unit,
            config,
            op,
            scan_type,
            input.device_ptr().slice(0, length),
            output.device_ptr_mut().slice(0, length),
        ),
        ScanStrategy::DecoupledLookback | ScanStrategy::Auto => decoupled_scan_device(
            unit,
            config,
            op,
            scan_type,
            input.device_ptr().slice(0, length),
            output.device_ptr_mut().slice(0, length),
        ),
    }
}

fn group_scan_device_with<T, E>(
    unit: &E,
    op: ReductionOp,
    scan_type: ScanType,
    input: &DeviceBuffer<T>,
    output: &mut DeviceBuffer<T>,
    length: usize,
) -> Result<()>
where
    T: ReductionScalar,
    E: ExecutionUnit,
{
    op.check_supported::<T>()?;
    check_length(length, input.len())?;
    check_length(length, output.len())?;
    if length == 0 {
        return Ok(());
    }

    let geometry = LaunchGeometry::single_group(unit.info().max_lanes_per_group);
    two_pass_scan_device(
        unit,
        geometry,
        op,
        scan_type,
        input.device_ptr().slice(0, length),
        output.device_ptr_mut().slice(0, length),
    )
}

fn reduce_with<T, E>(unit: &E, config: &PrimitivesConfig, op: ReductionOp, input: &[T]) -> Result<T>
where
    T: ReductionScalar,
    E: ExecutionUnit,
{
    op.check_supported::<T>()?;
    if input.is_empty() {
        return Ok(op.identity());
    }

    if unit.info().is_throughput() && input.len() < config.host_reduce_threshold {
        debug!("Host reduction of {} elements", input.len());
        return Ok(host_reduce(op, input));
    }

    let mut d_input = unit.alloc::<T>(input.len())?;
    unit.copy_to_device(&mut d_input, input)?;
    reduce_device_with(unit, config, op, &d_input, input.len())
}

fn reduce_device_with<T, E>(
    unit: &E,
    config: &PrimitivesConfig,
    op: ReductionOp,
    input: &DeviceBuffer<T>,
    length: usize,
) -> Result<T>
where
    T: ReductionScalar,
    E: ExecutionUnit,
{
    op.check_supported::<T>()?;
    check_length(length, input.len())?;
    if length == 0 {
        return Ok(op.identity());
    }

    if unit.info().is_throughput() && length < config.host_reduce_threshold {
        debug!("Host reduction of {} device elements", length);
        let mut host_input = vec![op.identity(); length];
        unit.copy_to_host(input, &mut host_input)?;
        return Ok(host_reduce(op, &host_input));
    }

    debug!(
        "Device reduction of {} elements (lanes_per_group={})",
        length,
        lanes_per_group(unit.info(), config)
    );
    reduce_device_ptr(unit, config, op, input.device_ptr().slice(0, length))
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridscan_core::{ConfigBuilder, DeviceKind};
    use gridscan_cpu::{CpuExecutionUnit, CpuUnitConfig};

    fn unit(kind: DeviceKind) -> CpuExecutionUnit {
        let config = CpuUnitConfig::builder()
            .compute_units(4)
            .max_lanes_per_group(32)
            .local_mem_bytes(4096)
            .kind(kind)
            .build()
            .unwrap();
        CpuExecutionUnit::with_config(config).unwrap()
    }

    #[test]
    fn test_resolve_strategy_latency_unit() {
        let prims = ParallelPrimitives::new(unit(DeviceKind::Latency));
        assert_eq!(prims.resolve_strategy(10), ScanStrategy::DecoupledLookback);
        assert_eq!(prims.resolve_strategy(1 << 20), ScanStrategy::DecoupledLookback);
    }

    #[test]
    fn test_resolve_strategy_throughput_unit() {
        let prims = ParallelPrimitives::new(unit(DeviceKind::Throughput));
        assert_eq!(prims.resolve_strategy(100), ScanStrategy::Host);
        assert_eq!(prims.resolve_strategy(4_096), ScanStrategy::TwoPass);
        assert_eq!(prims.resolve_strategy(65_535), ScanStrategy::TwoPass);
        assert_eq!(prims.resolve_strategy(65_536), ScanStrategy::DecoupledLookback);
    }

    #[test]
    fn test_explicit_strategy_wins() {
        let config = ConfigBuilder::new()
            .strategy(ScanStrategy::Cooperative)
            .build()
            .unwrap();
        let prims = ParallelPrimitives::with_config(unit(DeviceKind::Throughput), config).unwrap();
        assert_eq!(prims.resolve_strategy(10), ScanStrategy::Cooperative);
    }

    #[test]
    fn test_host_scan_allocates_nothing() {
        let prims = ParallelPrimitives::new(unit(DeviceKind::Throughput));
        let mut output = [0u32; 5];
        prims
            .scan(ReductionOp::Sum, ScanType::Inclusive, &[1, 1, 1, 1, 1], &mut output)
            .unwrap();
        assert_eq!(output, [1, 2, 3, 4, 5]);
        assert_eq!(prims.unit().metrics().peak_bytes, 0);
        assert_eq!(prims.unit().metrics().launches, 0);
    }

    #[test]
    fn test_scan_length_mismatch() {
        let prims = ParallelPrimitives::new(unit(DeviceKind::Latency));
        let err = prims
            .scan(ReductionOp::Sum, ScanType::Inclusive, &[1u32, 2, 3], &mut [0u32; 2])
            .unwrap_err();
        assert!(matches!(
            err,
            GridScanError::LengthMismatch { expected: 3, actual: 2 }
        ));
    }

    #[test]
    fn test_unsupported_operator_rejected_before_allocation() {
        let prims = ParallelPrimitives::new(unit(DeviceKind::Latency));
        let err = prims
            .scan(ReductionOp::And, ScanType::Inclusive, &[1.0f32; 8], &mut [0.0f32; 8])
            .unwrap_err();
        assert!(matches!(err, GridScanError::UnsupportedOperator { .. }));
        assert!(prims.reduce(ReductionOp::Or, &[1.0f64]).is_err());
        assert_eq!(prims.unit().metrics().peak_bytes, 0);
    }

    #[test]
    fn test_zero_length() {
        let prims = ParallelPrimitives::new(unit(DeviceKind::Latency));
        prims
            .scan::<u64>(ReductionOp::Sum, ScanType::Inclusive, &[], &mut [])
            .unwrap();
        assert_eq!(prims.reduce::<i32>(ReductionOp::Max, &[]).unwrap(), i32::MIN);
        assert_eq!(prims.reduce::<f32>(ReductionOp::Product, &[]).unwrap(), 1.0);
        assert_eq!(prims.unit().metrics().launches, 0);
    }

    #[test]
    fn test_scan_device_prefix_of_buffer() {
        let prims = ParallelPrimitives::new(unit(DeviceKind::Latency));
        let unit = prims.unit();
        let mut input = unit.alloc::<i32>(10).unwrap();
        let mut output = unit.alloc::<i32>(10).unwrap();
        unit.copy_to_device(&mut input, &[1; 10]).unwrap();

        prims
            .scan_device(ReductionOp::Sum, ScanType::Inclusive, &input, &mut output, 6)
            .unwrap();
        assert_eq!(output.as_slice(), &[1, 2, 3, 4, 5, 6, 0, 0, 0, 0]);

        let err = prims
            .scan_device(ReductionOp::Sum, ScanType::Inclusive, &input, &mut output, 11)
            .unwrap_err();
        assert!(matches!(err, GridScanError::LengthMismatch { expected: 11, actual: 10 }));
    }

    #[test]
    fn test_group_scan_device() {
        let prims = ParallelPrimitives::new(unit(DeviceKind::Latency));
        let unit = prims.unit();
        let data: Vec<u64> = (1..=100).collect();
        let mut input = unit.alloc::<u64>(100).unwrap();
        let mut output = unit.alloc::<u64>(100).unwrap();
        unit.copy_to_device(&mut input, &data).unwrap();

        prims
            .group_scan_device(ReductionOp::Sum, ScanType::Exclusive, &input, &mut output, 100)
            .unwrap();
        assert_eq!(output.as_slice()[0], 0);
        assert_eq!(output.as_slice()[99], 4950);
        assert_eq!(unit.last_geometry(), Some(LaunchGeometry::single_group(32)));
    }

    #[test]
    fn test_reduce_device() {
        let prims = ParallelPrimitives::new(unit(DeviceKind::Throughput));
        let unit = prims.unit();
        let data: Vec<u32> = (0..10_000).collect();
        let mut input = unit.alloc::<u32>(data.len()).unwrap();
        unit.copy_to_device(&mut input, &data).unwrap();

        // Below the host threshold: no launch.
        assert_eq!(prims.reduce_device(ReductionOp::Sum, &input, 100).unwrap(), 4950);
        assert_eq!(unit.metrics().launches, 0);

        assert_eq!(
            prims.reduce_device(ReductionOp::Max, &input, 10_000).unwrap(),
            9_999
        );
        assert!(unit.metrics().launches > 0);
    }
}
