//! Error types for gridscan.
//!
//! Every error is raised on the host before a launch is issued. Kernels
//! themselves never fail: a stalled lookback or barrier is a liveness
//! hazard, not an error, and is never surfaced here.

use thiserror::Error;

/// Result type for gridscan operations.
pub type Result<T> = std::result::Result<T, GridScanError>;

/// Errors that can occur while configuring or dispatching a primitive.
#[derive(Error, Debug)]
pub enum GridScanError {
    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Grid barrier requested over more groups than the mask word holds.
    #[error("Grid barrier over {groups} groups exceeds the {max}-bit participant mask")]
    BarrierTooWide {
        /// Requested group count.
        groups: usize,
        /// Width of the participant mask.
        max: usize,
    },

    /// More groups (or lanes) requested than the execution unit keeps resident.
    #[error(
        "Forward progress not guaranteed: {requested} requested, execution unit guarantees {available}"
    )]
    ForwardProgress {
        /// Requested groups or lanes per group.
        requested: usize,
        /// What the execution unit guarantees concurrently.
        available: usize,
    },

    /// Operator has no identity for the scalar type.
    #[error("Operator {op} is not defined for {scalar}")]
    UnsupportedOperator {
        /// Operator name.
        op: &'static str,
        /// Scalar type name.
        scalar: &'static str,
    },

    /// Buffer length does not cover the requested range.
    #[error("Length mismatch: expected {expected} elements, got {actual}")]
    LengthMismatch {
        /// Required element count.
        expected: usize,
        /// Available element count.
        actual: usize,
    },

    /// Device allocation failed.
    #[error("Allocation of {size} bytes failed: {reason}")]
    AllocationFailed {
        /// Requested size in bytes.
        size: usize,
        /// Failure reason.
        reason: String,
    },

    /// Device memory capacity exhausted.
    #[error("Out of device memory: requested {requested} bytes, {available} available")]
    OutOfMemory {
        /// Requested size in bytes.
        requested: usize,
        /// Remaining capacity in bytes.
        available: usize,
    },

    /// Host/device transfer failed.
    #[error("Transfer failed: {0}")]
    TransferFailed(String),

    /// Launch failed or a worker group aborted.
    #[error("Launch failed: {0}")]
    LaunchFailed(String),

    /// Configuration source could not be read or deserialized.
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),
}

impl GridScanError {
    /// Create an invalid configuration error.
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Create a launch failure.
    pub fn launch(msg: impl Into<String>) -> Self {
        Self::LaunchFailed(msg.into())
    }

    /// Create a transfer failure.
    pub fn transfer(msg: impl Into<String>) -> Self {
        Self::TransferFailed(msg.into())
    }

    /// Check whether this error was raised by pre-launch validation.
    ///
    /// Configuration errors are fatal and must not be retried with the same
    /// parameters.
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidConfig(_)
                | Self::BarrierTooWide { .. }
                | Self::ForwardProgress { .. }
                | Self::UnsupportedOperator { .. }
                | Self::LengthMismatch { .. }
                | Self::Config(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_barrier_error_message() {
        let err = GridScanError::BarrierTooWide {
            groups: 65,
            max: 64,
        };
        assert_eq!(
            err.to_string(),
            "Grid barrier over 65 groups exceeds the 64-bit participant mask"
        );
        assert!(err.is_configuration_error());
    }

    #[test]
    fn test_runtime_errors_are_not_configuration() {
        assert!(!GridScanError::launch("group 3 panicked").is_configuration_error());
        assert!(!GridScanError::OutOfMemory {
            requested: 64,
            available: 0
        }
        .is_configuration_error());
    }
}
