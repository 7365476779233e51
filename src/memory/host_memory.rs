//! Host-side memory allocation

use std::alloc::{alloc_zeroed, dealloc, Layout};
use std::marker::PhantomData;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicUsize, Ordering};

use bytemuck::Pod;

use crate::error::{Result, UsmError};

/// Live host reservations across all element types, for leak checks.
static LIVE_ALLOCATIONS: AtomicUsize = AtomicUsize::new(0);

/// Contiguous host-addressable buffer of `len` elements.
///
/// Allocation failure is reported as `HostAllocationFailed`, distinct from
/// the device-side variant so callers can diagnose which side failed.
#[derive(Debug)]
pub struct HostBuffer<T> {
    ptr: NonNull<T>,
    len: usize,
    layout: Layout,
    _marker: PhantomData<T>,
}

impl<T: Pod> HostBuffer<T> {
    /// Reserve a zero-initialised buffer of `len` elements.
    pub fn new(len: usize) -> Result<Self> {
        if len == 0 {
            return Err(UsmError::HostAllocationFailed { bytes: 0 });
        }
        let layout = Layout::array::<T>(len)
            .map_err(|_| UsmError::HostAllocationFailed { bytes: usize::MAX })?;

        // SAFETY: layout is non-zero sized; null is handled below.
        let raw = unsafe { alloc_zeroed(layout) };
        let ptr = NonNull::new(raw as *mut T).ok_or(UsmError::HostAllocationFailed {
            bytes: layout.size(),
        })?;

        LIVE_ALLOCATIONS.fetch_add(1, Ordering::SeqCst);
        Ok(Self {
            ptr,
            len,
            layout,
            _marker: PhantomData,
        })
    }

    /// Number of live host buffers process-wide, for leak checks.
    pub fn live_allocations() -> usize {
        LIVE_ALLOCATIONS.load(Ordering::SeqCst)
    }

    /// Get buffer length in elements.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Check if buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// View the buffer as a slice.
    pub fn as_slice(&self) -> &[T] {
        // SAFETY: ptr is valid for len elements for the buffer's lifetime,
        // and T: Pod means the zeroed bytes are a valid value.
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }

    /// View the buffer as a mutable slice.
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        // SAFETY: as above, plus &mut self guarantees exclusive access.
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }

    /// Fill every element with `value`.
    pub fn fill(&mut self, value: T) {
        self.as_mut_slice().fill(value);
    }
}

impl<T> Drop for HostBuffer<T> {
    fn drop(&mut self) {
        // SAFETY: ptr was allocated in new() with exactly this layout.
        unsafe { dealloc(self.ptr.as_ptr() as *mut u8, self.layout) }
        LIVE_ALLOCATIONS.fetch_sub(1, Ordering::SeqCst);
    }
}

// SAFETY: the buffer uniquely owns its allocation; T is Pod.
unsafe impl<T: Pod + Send> Send for HostBuffer<T> {}
unsafe impl<T: Pod + Sync> Sync for HostBuffer<T> {}
