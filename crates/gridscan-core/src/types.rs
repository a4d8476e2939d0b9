//! Launch geometry and scan kinds.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Whether a scan includes the element at each position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanType {
    /// `out[i] = in[0] ⊕ … ⊕ in[i]`.
    #[default]
    Inclusive,
    /// `out[0] = identity`, `out[i] = in[0] ⊕ … ⊕ in[i - 1]`.
    Exclusive,
}

impl fmt::Display for ScanType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScanType::Inclusive => write!(f, "inclusive"),
            ScanType::Exclusive => write!(f, "exclusive"),
        }
    }
}

/// What an execution unit is tuned for.
///
/// Small-input host fallbacks only apply to throughput-oriented units, where
/// launch overhead dominates short inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceKind {
    /// Many wide groups, high launch latency (GPU-like).
    Throughput,
    /// Few groups, cheap launches (CPU-like).
    #[default]
    Latency,
}

/// Shape of one launch: `group_count` worker groups of `lanes_per_group` lanes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LaunchGeometry {
    /// Number of worker groups.
    pub group_count: usize,
    /// Lanes in each group.
    pub lanes_per_group: usize,
}

impl LaunchGeometry {
    /// Create a geometry.
    pub const fn new(group_count: usize, lanes_per_group: usize) -> Self {
        Self {
            group_count,
            lanes_per_group,
        }
    }

    /// A single group.
    pub const fn single_group(lanes_per_group: usize) -> Self {
        Self::new(1, lanes_per_group)
    }

    /// Total lanes across all groups.
    pub const fn total_lanes(&self) -> usize {
        self.group_count * self.lanes_per_group
    }

    /// Check whether the geometry describes at least one lane.
    pub const fn is_empty(&self) -> bool {
        self.group_count == 0 || self.lanes_per_group == 0
    }
}

impl fmt::Display for LaunchGeometry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.group_count, self.lanes_per_group)
    }
}
