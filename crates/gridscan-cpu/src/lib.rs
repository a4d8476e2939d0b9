//! # GridScan CPU
//!
//! CPU execution unit for the gridscan primitives.
//!
//! Worker groups run on scoped OS threads and the lanes of a group are
//! simulated sequentially inside its thread. Used for testing and as the
//! fallback when no accelerator backend is present.
//!
//! ## Example
//!
//! ```ignore
//! use gridscan_cpu::{CpuExecutionUnit, CpuUnitConfig};
//!
//! let unit = CpuExecutionUnit::with_config(CpuUnitConfig::builder().compute_units(8).build()?)?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

mod config;
mod unit;

pub use config::{CpuUnitConfig, CpuUnitConfigBuilder};
pub use unit::CpuExecutionUnit;
