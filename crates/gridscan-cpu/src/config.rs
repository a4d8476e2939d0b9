//! CPU execution-unit configuration.

use gridscan_core::error::{GridScanError, Result};
use gridscan_core::types::DeviceKind;

/// Shape of a [`CpuExecutionUnit`](crate::CpuExecutionUnit).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CpuUnitConfig {
    /// Human-readable name.
    pub name: String,
    /// Worker threads, and therefore groups guaranteed to be resident.
    pub compute_units: usize,
    /// Largest lane count of one group.
    pub max_lanes_per_group: usize,
    /// Local memory per group, in bytes.
    pub local_mem_bytes: usize,
    /// Largest total lane count of one launch.
    pub max_launch_lanes: usize,
    /// Reported device kind.
    pub kind: DeviceKind,
    /// Device memory capacity in bytes; unbounded when unset.
    pub memory_capacity: Option<usize>,
}

impl Default for CpuUnitConfig {
    fn default() -> Self {
        Self {
            name: "cpu".to_string(),
            compute_units: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
            max_lanes_per_group: 256,
            local_mem_bytes: 64 * 1024,
            max_launch_lanes: 1 << 25,
            kind: DeviceKind::Latency,
            memory_capacity: None,
        }
    }
}

impl CpuUnitConfig {
    /// Create a builder with defaults.
    pub fn builder() -> CpuUnitConfigBuilder {
        CpuUnitConfigBuilder::new()
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.compute_units == 0 {
            return Err(GridScanError::invalid_config(
                "compute_units must be greater than 0",
            ));
        }

        if self.max_lanes_per_group == 0 {
            return Err(GridScanError::invalid_config(
                "max_lanes_per_group must be greater than 0",
            ));
        }

        if self.max_launch_lanes < self.max_lanes_per_group {
            return Err(GridScanError::invalid_config(format!(
                "max_launch_lanes ({}) must hold at least one group of {} lanes",
                self.max_launch_lanes, self.max_lanes_per_group
            )));
        }

        // One lane's worth of scratch plus at least one lane's worth of data.
        let min_local = 2 * self.max_lanes_per_group * std::mem::size_of::<u64>();
        if self.local_mem_bytes < min_local {
            return Err(GridScanError::invalid_config(format!(
                "local_mem_bytes ({}) must be at least {} for {} lanes",
                self.local_mem_bytes, min_local, self.max_lanes_per_group
            )));
        }

        Ok(())
    }
}

/// Builder for [`CpuUnitConfig`].
#[derive(Debug, Clone, Default)]
pub struct CpuUnitConfigBuilder {
    config: CpuUnitConfig,
}

impl CpuUnitConfigBuilder {
    /// Create a builder with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the unit name.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.config.name = name.into();
        self
    }

    /// Set the number of compute units.
    pub fn compute_units(mut self, units: usize) -> Self {
        self.config.compute_units = units;
        self
    }

    /// Set the maximum lanes per group.
    pub fn max_lanes_per_group(mut self, lanes: usize) -> Self {
        self.config.max_lanes_per_group = lanes;
        self
    }

    /// Set local memory per group.
    pub fn local_mem_bytes(mut self, bytes: usize) -> Self {
        self.config.local_mem_bytes = bytes;
        self
    }

    /// Set the maximum lanes of one launch.
    pub fn max_launch_lanes(mut self, lanes: usize) -> Self {
        self.config.max_launch_lanes = lanes;
        self
    }

    /// Set the reported device kind.
    pub fn kind(mut self, kind: DeviceKind) -> Self {
        self.config.kind = kind;
        self
    }

    /// Bound device memory.
    pub fn memory_capacity(mut self, bytes: usize) -> Self {
        self.config.memory_capacity = Some(bytes);
        self
    }

    /// Build the configuration.
    pub fn build(self) -> Result<CpuUnitConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CpuUnitConfig::default();
        assert!(config.compute_units >= 1);
        assert_eq!(config.max_lanes_per_group, 256);
        assert_eq!(config.kind, DeviceKind::Latency);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder() {
        let config = CpuUnitConfig::builder()
            .name("test-unit")
            .compute_units(8)
            .max_lanes_per_group(32)
            .local_mem_bytes(4096)
            .max_launch_lanes(1024)
            .kind(DeviceKind::Throughput)
            .memory_capacity(1 << 20)
            .build()
            .unwrap();

        assert_eq!(config.name, "test-unit");
        assert_eq!(config.compute_units, 8);
        assert_eq!(config.memory_capacity, Some(1 << 20));
    }

    #[test]
    fn test_validation() {
        assert!(CpuUnitConfig::builder().compute_units(0).build().is_err());
        assert!(CpuUnitConfig::builder()
            .max_lanes_per_group(64)
            .max_launch_lanes(32)
            .build()
            .is_err());
        assert!(CpuUnitConfig::builder()
            .max_lanes_per_group(64)
            .local_mem_bytes(512)
            .build()
            .is_err());
    }
}
