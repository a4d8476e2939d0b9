//! Partition status descriptors for the decoupled-lookback scan.
//!
//! Each partition owns one descriptor moving through
//! `Invalid → AggregateAvailable → PrefixAvailable`. The owning group writes
//! it exactly twice; any later partition may read it.
//!
//! Two layouts implement [`StatusDescriptor`]:
//!
//! - [`PackedDescriptor`]: status and a value of at most four bytes share one
//!   `AtomicU64`, so each publish is a single atomic store.
//! - [`FencedDescriptor`]: value slots are plain cells written before a
//!   release store of the status; readers acquire the status before reading.
//!
//! # Forward progress
//!
//! [`DescriptorArena::run_lookback`] busy-waits on `Invalid` predecessors
//! without bound. It terminates only if every group owning an earlier
//! partition keeps running, i.e. every group of the launch is resident.
//! There is no timeout.

use std::cell::UnsafeCell;
use std::marker::PhantomData;
use std::sync::atomic::{fence, AtomicU64, AtomicU8, Ordering};

use crossbeam::utils::Backoff;
use gridscan_core::{ReductionOp, ReductionScalar};

const STATUS_INVALID: u8 = 0;
const STATUS_AGGREGATE: u8 = 1;
const STATUS_PREFIX: u8 = 2;

/// Observed state of one descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescriptorState<T> {
    /// Nothing published yet.
    Invalid,
    /// Local partition total published.
    AggregateAvailable(T),
    /// Inclusive prefix through this partition published.
    PrefixAvailable(T),
}

/// Storage for one partition's status word and values.
pub trait StatusDescriptor<T>: Send + Sync {
    /// Whether this layout can hold values of `T`.
    fn fits() -> bool;

    /// A descriptor in the `Invalid` state.
    fn invalid() -> Self;

    /// Publish the local aggregate.
    fn publish_aggregate(&self, aggregate: T);

    /// Publish the inclusive prefix.
    fn publish_prefix(&self, prefix: T);

    /// Current state.
    fn load(&self) -> DescriptorState<T>;
}

/// Status and value packed into one 64-bit word.
///
/// Bits `0..32` hold the value's bytes, bits `32..40` the status.
#[derive(Debug, Default)]
pub struct PackedDescriptor {
    word: AtomicU64,
}

impl PackedDescriptor {
    const VALUE_BYTES: usize = 4;

    #[inline]
    fn pack<T: ReductionScalar>(status: u8, value: T) -> u64 {
        let mut bytes = [0u8; Self::VALUE_BYTES];
        bytes[..std::mem::size_of::<T>()].copy_from_slice(bytemuck::bytes_of(&value));
        ((status as u64) << 32) | u32::from_ne_bytes(bytes) as u64
    }

    #[inline]
    fn unpack<T: ReductionScalar>(word: u64) -> (u8, T) {
        let bytes = (word as u32).to_ne_bytes();
        let value = bytemuck::pod_read_unaligned(&bytes[..std::mem::size_of::<T>()]);
        ((word >> 32) as u8, value)
    }
}

impl<T: ReductionScalar> StatusDescriptor<T> for PackedDescriptor {
    fn fits() -> bool {
        std::mem::size_of::<T>() <= Self::VALUE_BYTES
    }

    fn invalid() -> Self {
        Self::default()
    }

    #[inline]
    fn publish_aggregate(&self, aggregate: T) {
        self.word
            .store(Self::pack(STATUS_AGGREGATE, aggregate), Ordering::Release);
    }

    #[inline]
    fn publish_prefix(&self, prefix: T) {
        self.word
            .store(Self::pack(STATUS_PREFIX, prefix), Ordering::Release);
    }

    #[inline]
    fn load(&self) -> DescriptorState<T> {
        let (status, value) = Self::unpack(self.word.load(Ordering::Acquire));
        match status {
            STATUS_AGGREGATE => DescriptorState::AggregateAvailable(value),
            STATUS_PREFIX => DescriptorState::PrefixAvailable(value),
            _ => DescriptorState::Invalid,
        }
    }
}

/// Status byte plus separately stored aggregate and prefix.
pub struct FencedDescriptor<T> {
    status: AtomicU8,
    aggregate: UnsafeCell<T>,
    inclusive_prefix: UnsafeCell<T>,
}

// SAFETY: each value cell is written once by the owning group before the
// release store that publishes it, and read only after an acquire load
// observes that publication. Published cells are never written again.
unsafe impl<T: Send> Send for FencedDescriptor<T> {}
unsafe impl<T: Send + Sync> Sync for FencedDescriptor<T> {}

impl<T: ReductionScalar> StatusDescriptor<T> for FencedDescriptor<T> {
    fn fits() -> bool {
        true
    }

    fn invalid() -> Self {
        Self {
            status: AtomicU8::new(STATUS_INVALID),
            aggregate: UnsafeCell::new(bytemuck::Zeroable::zeroed()),
            inclusive_prefix: UnsafeCell::new(bytemuck::Zeroable::zeroed()),
        }
    }

    #[inline]
    fn publish_aggregate(&self, aggregate: T) {
        // SAFETY: single writer, status still Invalid so no reader looks here.
        unsafe { *self.aggregate.get() = aggregate };
        fence(Ordering::Release);
        self.status.store(STATUS_AGGREGATE, Ordering::Release);
    }

    #[inline]
    fn publish_prefix(&self, prefix: T) {
        // SAFETY: single writer, status not yet PrefixAvailable.
        unsafe { *self.inclusive_prefix.get() = prefix };
        fence(Ordering::Release);
        self.status.store(STATUS_PREFIX, Ordering::Release);
    }

    #[inline]
    fn load(&self) -> DescriptorState<T> {
        match self.status.load(Ordering::Acquire) {
            // SAFETY: the acquire load above synchronizes with the publish.
            STATUS_AGGREGATE => {
                DescriptorState::AggregateAvailable(unsafe { *self.aggregate.get() })
            }
            // SAFETY: as above.
            STATUS_PREFIX => {
                DescriptorState::PrefixAvailable(unsafe { *self.inclusive_prefix.get() })
            }
            _ => DescriptorState::Invalid,
        }
    }
}

/// One descriptor per partition, allocated before a launch and dropped after.
pub struct DescriptorArena<T, D = FencedDescriptor<T>> {
    op: ReductionOp,
    descriptors: Box<[D]>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: ReductionScalar, D: StatusDescriptor<T>> DescriptorArena<T, D> {
    /// Arena of `partitions` invalid descriptors combined with `op`.
    pub fn new(op: ReductionOp, partitions: usize) -> Self {
        debug_assert!(D::fits());
        Self {
            op,
            descriptors: (0..partitions).map(|_| D::invalid()).collect(),
            _marker: PhantomData,
        }
    }

    /// Number of partitions.
    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    /// Check whether the arena has no partitions.
    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    /// Current state of `partition_id`.
    pub fn state(&self, partition_id: usize) -> DescriptorState<T> {
        self.descriptors[partition_id].load()
    }

    /// Publish `aggregate` for `partition_id`.
    pub fn set_aggregate(&self, partition_id: usize, aggregate: T) {
        self.descriptors[partition_id].publish_aggregate(aggregate);
    }

    /// Publish the inclusive prefix of `partition_id`.
    pub fn set_prefix(&self, partition_id: usize, prefix: T) {
        self.descriptors[partition_id].publish_prefix(prefix);
    }

    /// Exclusive prefix of `partition_id` if it is known without lookback.
    ///
    /// Partition 0 is always ready with the identity; any other partition is
    /// ready once its predecessor has published its inclusive prefix.
    pub fn is_ready(&self, partition_id: usize) -> Option<T> {
        if partition_id == 0 {
            return Some(self.op.identity());
        }
        match self.descriptors[partition_id - 1].load() {
            DescriptorState::PrefixAvailable(prefix) => Some(prefix),
            _ => None,
        }
    }

    /// Walk backward from `partition_id - 1` to the first inclusive prefix,
    /// combining aggregates on the way, and return the exclusive prefix.
    ///
    /// Spins on `Invalid` predecessors; see the module docs.
    pub fn run_lookback(&self, partition_id: usize) -> T {
        let op = self.op;
        let mut acc = op.identity();
        let mut index = partition_id;
        let backoff = Backoff::new();

        while index > 0 {
            index -= 1;
            loop {
                match self.descriptors[index].load() {
                    DescriptorState::PrefixAvailable(prefix) => return op.apply(prefix, acc),
                    DescriptorState::AggregateAvailable(aggregate) => {
                        acc = op.apply(aggregate, acc);
                        backoff.reset();
                        break;
                    }
                    DescriptorState::Invalid => backoff.snooze(),
                }
            }
        }

        acc
    }
}
