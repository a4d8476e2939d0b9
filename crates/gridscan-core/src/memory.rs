//! Device memory abstractions.
//!
//! - [`DeviceBuffer`] owns an allocation on an execution unit and frees it on
//!   drop, so every exit path (including errors) releases it.
//! - [`DevicePtr`] is the unowned, copyable view handed to kernels; all groups
//!   of a launch share it and write disjoint ranges through it.
//! - [`MemoryTracker`] accounts for live and peak bytes per execution unit.

use std::alloc::{alloc_zeroed, dealloc, Layout};
use std::marker::PhantomData;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use bytemuck::Pod;

use crate::error::{GridScanError, Result};

/// Live/peak allocation accounting shared by an execution unit and its buffers.
#[derive(Debug, Default)]
pub struct MemoryTracker {
    capacity: Option<usize>,
    current: AtomicUsize,
    peak: AtomicUsize,
    allocations: AtomicU64,
}

impl MemoryTracker {
    /// Create an unbounded tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a tracker that refuses allocations beyond `capacity` bytes.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: Some(capacity),
            ..Self::default()
        }
    }

    /// Reserve `bytes`, failing if capacity would be exceeded.
    pub fn reserve(&self, bytes: usize) -> Result<()> {
        let mut current = self.current.load(Ordering::Relaxed);
        loop {
            let next = current.checked_add(bytes).ok_or(GridScanError::OutOfMemory {
                requested: bytes,
                available: 0,
            })?;
            if let Some(capacity) = self.capacity {
                if next > capacity {
                    return Err(GridScanError::OutOfMemory {
                        requested: bytes,
                        available: capacity.saturating_sub(current),
                    });
                }
            }
            match self.current.compare_exchange_weak(
                current,
                next,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => {
                    self.peak.fetch_max(next, Ordering::Relaxed);
                    self.allocations.fetch_add(1, Ordering::Relaxed);
                    return Ok(());
                }
                Err(actual) => current = actual,
            }
        }
    }

    /// Release `bytes` previously reserved.
    pub fn release(&self, bytes: usize) {
        self.current.fetch_sub(bytes, Ordering::AcqRel);
    }

    /// Bytes currently allocated.
    pub fn current_bytes(&self) -> usize {
        self.current.load(Ordering::Acquire)
    }

    /// Highest number of bytes allocated at once.
    pub fn peak_bytes(&self) -> usize {
        self.peak.load(Ordering::Relaxed)
    }

    /// Number of successful allocations.
    pub fn allocation_count(&self) -> u64 {
        self.allocations.load(Ordering::Relaxed)
    }

    /// Configured capacity, if bounded.
    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }
}

/// Zero-initialised allocation on an execution unit.
///
/// Created through `ExecutionUnit::alloc`; dropped buffers return their bytes
/// to the unit's [`MemoryTracker`].
pub struct DeviceBuffer<T: Pod> {
    ptr: NonNull<T>,
    len: usize,
    layout: Layout,
    tracker: Arc<MemoryTracker>,
}

impl<T: Pod> DeviceBuffer<T> {
    /// Allocate `count` zeroed elements, accounted against `tracker`.
    ///
    /// Zero-length buffers are valid and own no memory.
    pub fn zeroed(count: usize, tracker: Arc<MemoryTracker>) -> Result<Self> {
        let layout = Layout::array::<T>(count).map_err(|_| GridScanError::AllocationFailed {
            size: count.saturating_mul(std::mem::size_of::<T>()),
            reason: "size overflows the address space".to_string(),
        })?;

        if layout.size() == 0 {
            return Ok(Self {
                ptr: NonNull::dangling(),
                len: count,
                layout,
                tracker,
            });
        }

        tracker.reserve(layout.size())?;

        // SAFETY: layout has non-zero size; all-zero bytes are a valid `T: Pod`.
        let raw = unsafe { alloc_zeroed(layout) } as *mut T;
        let Some(ptr) = NonNull::new(raw) else {
            tracker.release(layout.size());
            return Err(GridScanError::AllocationFailed {
                size: layout.size(),
                reason: "allocator returned null".to_string(),
            });
        };

        Ok(Self {
            ptr,
            len: count,
            layout,
            tracker,
        })
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Size in bytes.
    pub fn size_bytes(&self) -> usize {
        self.layout.size()
    }

    /// Host-visible view of the contents.
    pub fn as_slice(&self) -> &[T] {
        // SAFETY: ptr is valid (or dangling with len 0) for len initialised elements.
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }

    /// Mutable host-visible view of the contents.
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        // SAFETY: as above, and `&mut self` excludes other views.
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }

    /// Kernel view of the whole buffer for reading.
    ///
    /// The view is read-only: `write` and `as_mut_slice` on it (or on any
    /// slice of it) are forbidden and trip a debug assertion.
    pub fn device_ptr(&self) -> DevicePtr<'_, T> {
        DevicePtr::new(self.ptr, self.len, false)
    }

    /// Kernel view of the whole buffer for writing.
    pub fn device_ptr_mut(&mut self) -> DevicePtr<'_, T> {
        DevicePtr::new(self.ptr, self.len, true)
    }

    /// Byte-wise copy of `src` into the start of this buffer.
    pub fn copy_from_host(&mut self, src: &[T]) -> Result<()> {
        if src.len() > self.len {
            return Err(GridScanError::transfer(format!(
                "host slice of {} elements does not fit device buffer of {}",
                src.len(),
                self.len
            )));
        }
        let bytes: &[u8] = bytemuck::cast_slice(src);
        let dst: &mut [u8] = bytemuck::cast_slice_mut(&mut self.as_mut_slice()[..src.len()]);
        dst.copy_from_slice(bytes);
        Ok(())
    }

    /// Byte-wise copy of the start of this buffer into `dst`.
    pub fn copy_to_host(&self, dst: &mut [T]) -> Result<()> {
        if dst.len() > self.len {
            return Err(GridScanError::transfer(format!(
                "device buffer of {} elements cannot fill host slice of {}",
                self.len,
                dst.len()
            )));
        }
        let bytes: &[u8] = bytemuck::cast_slice(&self.as_slice()[..dst.len()]);
        bytemuck::cast_slice_mut::<T, u8>(dst).copy_from_slice(bytes);
        Ok(())
    }
}

impl<T: Pod> Drop for DeviceBuffer<T> {
    fn drop(&mut self) {
        if self.layout.size() != 0 {
            // SAFETY: allocated in `zeroed` with this exact layout.
            unsafe { dealloc(self.ptr.as_ptr() as *mut u8, self.layout) };
            self.tracker.release(self.layout.size());
        }
    }
}

impl<T: Pod> std::fmt::Debug for DeviceBuffer<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceBuffer")
            .field("len", &self.len)
            .field("size_bytes", &self.size_bytes())
            .finish()
    }
}

// SAFETY: DeviceBuffer uniquely owns its allocation.
unsafe impl<T: Pod + Send> Send for DeviceBuffer<T> {}
unsafe impl<T: Pod + Sync> Sync for DeviceBuffer<T> {}

/// Unowned view of device memory shared by every group of a launch.
///
/// The lifetime ties the view to the [`DeviceBuffer`] it came from, so a
/// kernel can never outlive the allocation. Element access is `unsafe`:
/// the launching primitive guarantees that no element is written by one
/// group while another group reads or writes it.
pub struct DevicePtr<'a, T> {
    ptr: NonNull<T>,
    len: usize,
    writable: bool,
    _marker: PhantomData<&'a [T]>,
}

impl<'a, T> DevicePtr<'a, T> {
    fn new(ptr: NonNull<T>, len: usize, writable: bool) -> Self {
        Self {
            ptr,
            len,
            writable,
            _marker: PhantomData,
        }
    }

    /// Number of elements in view.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Check if the view is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Whether the view came from [`DeviceBuffer::device_ptr_mut`].
    #[inline]
    pub fn is_writable(&self) -> bool {
        self.writable
    }

    /// Narrow the view to `[offset, offset + len)`.
    #[inline]
    pub fn slice(self, offset: usize, len: usize) -> DevicePtr<'a, T> {
        assert!(
            offset.checked_add(len).is_some_and(|end| end <= self.len),
            "device view [{offset}, {offset}+{len}) out of range {}",
            self.len
        );
        // SAFETY: offset is within the allocation (checked above).
        let ptr = unsafe { NonNull::new_unchecked(self.ptr.as_ptr().add(offset)) };
        DevicePtr::new(ptr, len, self.writable)
    }

    /// Read element `index`.
    ///
    /// # Safety
    ///
    /// `index < len`, and no other group writes the element concurrently.
    #[inline]
    pub unsafe fn read(self, index: usize) -> T
    where
        T: Copy,
    {
        debug_assert!(index < self.len);
        // SAFETY: upheld by caller.
        unsafe { self.ptr.as_ptr().add(index).read() }
    }

    /// Write element `index`.
    ///
    /// # Safety
    ///
    /// `index < len`, the view is writable, and no other group reads or
    /// writes the element concurrently.
    #[inline]
    pub unsafe fn write(self, index: usize, value: T) {
        debug_assert!(self.writable, "write through a read-only device view");
        debug_assert!(index < self.len);
        // SAFETY: upheld by caller.
        unsafe { self.ptr.as_ptr().add(index).write(value) }
    }

    /// Borrow the view as a shared slice.
    ///
    /// # Safety
    ///
    /// No group writes any element of the view while the slice is alive.
    #[inline]
    pub unsafe fn as_slice(self) -> &'a [T] {
        // SAFETY: upheld by caller.
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }

    /// Borrow the view as an exclusive slice.
    ///
    /// # Safety
    ///
    /// The view is writable, and no other group reads or writes any element
    /// of the view while the slice is alive.
    #[inline]
    #[allow(clippy::mut_from_ref)]
    pub unsafe fn as_mut_slice(self) -> &'a mut [T] {
        debug_assert!(self.writable, "write through a read-only device view");
        // SAFETY: upheld by caller.
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }
}

impl<T> Clone for DevicePtr<'_, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for DevicePtr<'_, T> {}

impl<T> std::fmt::Debug for DevicePtr<'_, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DevicePtr")
            .field("ptr", &self.ptr)
            .field("len", &self.len)
            .field("writable", &self.writable)
            .finish()
    }
}

// SAFETY: a DevicePtr is a plain address; data-race freedom is the kernel's
// contract, documented on each accessor.
unsafe impl<T: Send + Sync> Send for DevicePtr<'_, T> {}
unsafe impl<T: Send + Sync> Sync for DevicePtr<'_, T> {}

/// Alignment utilities.
pub mod align {
    /// Round `value` up to a multiple of `multiple`.
    #[inline]
    pub const fn round_up(value: usize, multiple: usize) -> usize {
        value.div_ceil(multiple) * multiple
    }

    /// Round `value` down to a multiple of `multiple`.
    #[inline]
    pub const fn round_down(value: usize, multiple: usize) -> usize {
        (value / multiple) * multiple
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zeroed_buffer() {
        let tracker = Arc::new(MemoryTracker::new());
        let buffer = DeviceBuffer::<u64>::zeroed(128, Arc::clone(&tracker)).unwrap();
        assert_eq!(buffer.len(), 128);
        assert_eq!(buffer.size_bytes(), 1024);
        assert!(buffer.as_slice().iter().all(|&v| v == 0));
        assert_eq!(tracker.current_bytes(), 1024);

        drop(buffer);
        assert_eq!(tracker.current_bytes(), 0);
        assert_eq!(tracker.peak_bytes(), 1024);
        assert_eq!(tracker.allocation_count(), 1);
    }

    #[test]
    fn test_zero_length_buffer() {
        let tracker = Arc::new(MemoryTracker::new());
        let buffer = DeviceBuffer::<f32>::zeroed(0, Arc::clone(&tracker)).unwrap();
        assert!(buffer.is_empty());
        assert!(buffer.as_slice().is_empty());
        assert_eq!(tracker.allocation_count(), 0);
    }

    #[test]
    fn test_capacity_enforced() {
        let tracker = Arc::new(MemoryTracker::with_capacity(100));
        let first = DeviceBuffer::<u32>::zeroed(20, Arc::clone(&tracker)).unwrap();
        let err = DeviceBuffer::<u32>::zeroed(10, Arc::clone(&tracker)).unwrap_err();
        match err {
            GridScanError::OutOfMemory {
                requested,
                available,
            } => {
                assert_eq!(requested, 40);
                assert_eq!(available, 20);
            }
            other => panic!("unexpected error: {other}"),
        }
        drop(first);
        assert!(DeviceBuffer::<u32>::zeroed(25, tracker).is_ok());
    }

    #[test]
    fn test_host_copies() {
        let tracker = Arc::new(MemoryTracker::new());
        let mut buffer = DeviceBuffer::<i32>::zeroed(4, tracker).unwrap();
        buffer.copy_from_host(&[1, -2, 3]).unwrap();
        assert_eq!(buffer.as_slice(), &[1, -2, 3, 0]);

        let mut out = [0i32; 4];
        buffer.copy_to_host(&mut out).unwrap();
        assert_eq!(out, [1, -2, 3, 0]);

        assert!(buffer.copy_from_host(&[0; 5]).is_err());
        assert!(buffer.copy_to_host(&mut [0; 5]).is_err());
    }

    #[test]
    fn test_device_ptr_access() {
        let tracker = Arc::new(MemoryTracker::new());
        let mut buffer = DeviceBuffer::<u32>::zeroed(8, tracker).unwrap();
        let view = buffer.device_ptr_mut();
        let tail = view.slice(4, 4);
        unsafe {
            tail.write(0, 7);
            tail.write(3, 9);
            assert_eq!(view.read(4), 7);
            assert_eq!(tail.as_slice(), &[7, 0, 0, 9]);
        }
        assert_eq!(buffer.as_slice()[7], 9);
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn test_device_ptr_slice_bounds() {
        let tracker = Arc::new(MemoryTracker::new());
        let buffer = DeviceBuffer::<u32>::zeroed(8, tracker).unwrap();
        let _ = buffer.device_ptr().slice(6, 4);
    }

    #[test]
    fn test_read_view_is_not_writable() {
        let tracker = Arc::new(MemoryTracker::new());
        let mut buffer = DeviceBuffer::<u32>::zeroed(8, tracker).unwrap();
        assert!(!buffer.device_ptr().is_writable());
        assert!(!buffer.device_ptr().slice(2, 4).is_writable());
        assert!(buffer.device_ptr_mut().slice(2, 4).is_writable());
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "read-only device view")]
    fn test_write_through_read_view_panics() {
        let tracker = Arc::new(MemoryTracker::new());
        let buffer = DeviceBuffer::<u32>::zeroed(8, tracker).unwrap();
        unsafe { buffer.device_ptr().write(0, 1) };
    }

    #[test]
    fn test_align() {
        assert_eq!(align::round_up(65, 64), 128);
        assert_eq!(align::round_down(127, 64), 64);
        assert_eq!(align::round_up(0, 64), 0);
    }
}
