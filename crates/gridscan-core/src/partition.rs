//! Work partitioning across worker groups.
//!
//! Two schemes are used by the primitives:
//!
//! - **Balanced tiling** (`group_work_size` / `group_cumulative_offset`): the
//!   `N` elements are split over `G` groups so that sizes differ by at most
//!   one; the first `N mod G` groups own one extra element. Used by the
//!   cooperative and two-pass scans.
//! - **Local-memory partitions** (`local_partition_length`): fixed-size
//!   partitions sized to one group's on-chip memory. Used by the
//!   decoupled-lookback scan, where a group may visit several partitions.
//!
//! Every function is pure: a group computes its own slice from its index and
//! the globally known `(G, N)` without coordination.

use std::ops::Range;

/// Number of elements owned by group `group_id` out of `group_count`.
///
/// Returns `⌈N/G⌉` for the first `N mod G` groups and `⌊N/G⌋` otherwise.
#[inline]
pub const fn group_work_size(group_count: usize, group_id: usize, length: usize) -> usize {
    let work_per_group = length / group_count;
    let remainder = length % group_count;
    if group_id < remainder {
        work_per_group + 1
    } else {
        work_per_group
    }
}

/// Offset of group `group_id`'s slice in the global range.
///
/// `group_cumulative_offset(G, g + 1, N) == group_cumulative_offset(G, g, N) + group_work_size(G, g, N)`.
#[inline]
pub const fn group_cumulative_offset(group_count: usize, group_id: usize, length: usize) -> usize {
    let remainder = length % group_count;
    let extra = if group_id < remainder {
        group_id
    } else {
        remainder
    };
    group_id * (length / group_count) + extra
}

/// A contiguous, disjoint slice `[offset, offset + length)` of the global range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Partition {
    /// First element index.
    pub offset: usize,
    /// Number of elements.
    pub length: usize,
}

impl Partition {
    /// Balanced partition owned by `group_id`.
    #[inline]
    pub const fn for_group(group_count: usize, group_id: usize, length: usize) -> Self {
        Self {
            offset: group_cumulative_offset(group_count, group_id, length),
            length: group_work_size(group_count, group_id, length),
        }
    }

    /// Fixed-size partition `partition_id` of `partition_length` elements,
    /// truncated at `total`.
    #[inline]
    pub fn fixed(partition_id: usize, partition_length: usize, total: usize) -> Self {
        let offset = partition_id * partition_length;
        Self {
            offset,
            length: partition_length.min(total.saturating_sub(offset)),
        }
    }

    /// One past the last element index.
    #[inline]
    pub const fn end(&self) -> usize {
        self.offset + self.length
    }

    /// Index range covered by this partition.
    #[inline]
    pub const fn range(&self) -> Range<usize> {
        self.offset..self.offset + self.length
    }

    /// Check whether the partition holds no elements.
    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.length == 0
    }
}

/// Partition length that fits one group's local memory.
///
/// One lane's worth of elements is reserved for group scratch, and the result
/// is rounded down to a multiple of the lane count (never below one lane per
/// element).
pub fn local_partition_length<T>(local_mem_bytes: usize, lanes: usize) -> usize {
    let lanes = lanes.max(1);
    let capacity = local_mem_bytes / std::mem::size_of::<T>().max(1);
    let usable = capacity.saturating_sub(lanes);
    (lanes * (usable / lanes)).max(lanes)
}

/// Number of fixed-size partitions needed to cover `length` elements.
#[inline]
pub fn partition_count(length: usize, partition_length: usize) -> usize {
    length.div_ceil(partition_length.max(1))
}
