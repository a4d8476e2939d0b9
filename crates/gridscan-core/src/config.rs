//! Configuration for the primitives.
//!
//! Loaded from TOML (file or string) with `GRIDSCAN__*` environment
//! overrides through the `config` crate, or built programmatically with
//! [`ConfigBuilder`].
//!
//! # Example
//!
//! ```ignore
//! use gridscan_core::config::{PrimitivesConfig, ScanStrategy};
//!
//! let config = PrimitivesConfig::load_from_str("strategy = \"cooperative\"")?;
//! assert_eq!(config.strategy, ScanStrategy::Cooperative);
//! ```

use std::fmt;
use std::path::Path;

use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{GridScanError, Result};

/// Prefix of environment overrides (`GRIDSCAN__STRATEGY=two_pass`).
pub const ENV_PREFIX: &str = "GRIDSCAN";

/// Which scan engine to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanStrategy {
    /// Decoupled lookback, with small-input fallbacks on throughput units.
    #[default]
    Auto,
    /// Single-pass decoupled-lookback scan.
    DecoupledLookback,
    /// Full-occupancy single launch with grid barriers.
    Cooperative,
    /// Local scans, host scan of group totals, propagation launch.
    TwoPass,
    /// Serial scan on host memory.
    Host,
}

impl fmt::Display for ScanStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ScanStrategy::Auto => "auto",
            ScanStrategy::DecoupledLookback => "decoupled_lookback",
            ScanStrategy::Cooperative => "cooperative",
            ScanStrategy::TwoPass => "two_pass",
            ScanStrategy::Host => "host",
        };
        f.write_str(name)
    }
}

/// Tuning knobs shared by every primitive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrimitivesConfig {
    /// Scan engine selection.
    #[serde(default)]
    pub strategy: ScanStrategy,

    /// Below this length, `Auto` uses the two-pass scan on throughput units.
    #[serde(default = "default_small_scan_threshold")]
    pub small_scan_threshold: usize,

    /// Below this length, `Auto` scans on the host on throughput units.
    #[serde(default = "default_host_scan_threshold")]
    pub host_scan_threshold: usize,

    /// Below this length, reductions run on the host on throughput units.
    #[serde(default = "default_host_reduce_threshold")]
    pub host_reduce_threshold: usize,

    /// Per-lane unroll factors tried by the reduction dispatcher, largest first.
    #[serde(default = "default_unroll_factors")]
    pub unroll_factors: Vec<usize>,

    /// Lanes per group; the unit's maximum when unset.
    #[serde(default)]
    pub lanes_per_group: Option<usize>,

    /// Groups per launch for occupancy-free launches; the unit's compute
    /// units when unset.
    #[serde(default)]
    pub group_count: Option<usize>,
}

fn default_small_scan_threshold() -> usize {
    65_536
}

fn default_host_scan_threshold() -> usize {
    4_096
}

fn default_host_reduce_threshold() -> usize {
    4_096
}

fn default_unroll_factors() -> Vec<usize> {
    vec![64, 16, 4, 1]
}

impl Default for PrimitivesConfig {
    fn default() -> Self {
        Self {
            strategy: ScanStrategy::default(),
            small_scan_threshold: default_small_scan_threshold(),
            host_scan_threshold: default_host_scan_threshold(),
            host_reduce_threshold: default_host_reduce_threshold(),
            unroll_factors: default_unroll_factors(),
            lanes_per_group: None,
            group_count: None,
        }
    }
}

impl PrimitivesConfig {
    /// Load configuration from a TOML file, with environment overrides.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        debug!("Loading configuration from {}", path.as_ref().display());
        let builder = Config::builder()
            .add_source(File::from(path.as_ref()))
            .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

        let config: Self = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML string, with environment overrides.
    pub fn load_from_str(content: &str) -> Result<Self> {
        let builder = Config::builder()
            .add_source(File::from_str(content, FileFormat::Toml))
            .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

        let config: Self = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Create from environment variables only.
    pub fn from_env() -> Result<Self> {
        let builder =
            Config::builder().add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

        let config: Self = builder.build()?.try_deserialize()?;
        config.validate()?;
        debug!("Configuration from environment: strategy={}", config.strategy);
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.unroll_factors.is_empty() {
            return Err(GridScanError::invalid_config(
                "unroll_factors must not be empty",
            ));
        }

        if self.unroll_factors.windows(2).any(|pair| pair[0] <= pair[1]) {
            return Err(GridScanError::invalid_config(format!(
                "unroll_factors must be strictly decreasing, got {:?}",
                self.unroll_factors
            )));
        }

        if self.unroll_factors.last() != Some(&1) {
            return Err(GridScanError::invalid_config(format!(
                "unroll_factors must end at 1, got {:?}",
                self.unroll_factors
            )));
        }

        if self.lanes_per_group == Some(0) {
            return Err(GridScanError::invalid_config(
                "lanes_per_group must be greater than 0",
            ));
        }

        if self.group_count == Some(0) {
            return Err(GridScanError::invalid_config(
                "group_count must be greater than 0",
            ));
        }

        if self.host_scan_threshold > self.small_scan_threshold {
            return Err(GridScanError::invalid_config(format!(
                "host_scan_threshold ({}) must not exceed small_scan_threshold ({})",
                self.host_scan_threshold, self.small_scan_threshold
            )));
        }

        Ok(())
    }
}

/// Configuration builder for programmatic configuration.
pub struct ConfigBuilder {
    config: PrimitivesConfig,
}

impl ConfigBuilder {
    /// Create a new builder with defaults.
    pub fn new() -> Self {
        Self {
            config: PrimitivesConfig::default(),
        }
    }

    /// Set the scan strategy.
    pub fn strategy(mut self, strategy: ScanStrategy) -> Self {
        self.config.strategy = strategy;
        self
    }

    /// Set the two-pass fallback threshold.
    pub fn small_scan_threshold(mut self, threshold: usize) -> Self {
        self.config.small_scan_threshold = threshold;
        self
    }

    /// Set the host scan threshold.
    pub fn host_scan_threshold(mut self, threshold: usize) -> Self {
        self.config.host_scan_threshold = threshold;
        self
    }

    /// Set the host reduction threshold.
    pub fn host_reduce_threshold(mut self, threshold: usize) -> Self {
        self.config.host_reduce_threshold = threshold;
        self
    }

    /// Set the reduction unroll factors.
    pub fn unroll_factors(mut self, factors: impl Into<Vec<usize>>) -> Self {
        self.config.unroll_factors = factors.into();
        self
    }

    /// Override lanes per group.
    pub fn lanes_per_group(mut self, lanes: usize) -> Self {
        self.config.lanes_per_group = Some(lanes);
        self
    }

    /// Override groups per launch.
    pub fn group_count(mut self, groups: usize) -> Self {
        self.config.group_count = Some(groups);
        self
    }

    /// Build the configuration.
    pub fn build(self) -> Result<PrimitivesConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
