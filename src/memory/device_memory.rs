//! Device-resident memory allocation
//!
//! A `DeviceBuffer` is a device-resident reservation addressed through a
//! backend handle. It holds a clone of the execution context that created
//! it: release goes through that same context on drop, and the context
//! cannot be destroyed first.

use std::marker::PhantomData;

use bytemuck::Pod;

use crate::backend::BufferHandle;
use crate::error::{Result, UsmError};
use crate::runtime::context::ExecutionContext;
use crate::runtime::device::Capability;

/// Contiguous device-resident buffer of `len` elements.
pub struct DeviceBuffer<T> {
    handle: BufferHandle,
    len: usize,
    context: ExecutionContext,
    _marker: PhantomData<T>,
}

impl<T: Pod> DeviceBuffer<T> {
    /// Reserve `len` elements in the device-resident address space bound
    /// to `context`.
    pub fn new(context: &ExecutionContext, len: usize) -> Result<Self> {
        if len == 0 {
            return Err(UsmError::DeviceAllocationFailed {
                device: context.device_name().to_string(),
                bytes: 0,
                reason: "zero-length buffer".to_string(),
            });
        }
        let bytes = len * std::mem::size_of::<T>();
        let handle = context.backend().allocate(bytes)?;

        Ok(Self {
            handle,
            len,
            context: context.clone(),
            _marker: PhantomData,
        })
    }

    /// Get buffer length in elements.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Check if buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The backend handle addressing this allocation.
    pub fn handle(&self) -> BufferHandle {
        self.handle
    }

    /// The context this buffer was allocated through.
    pub fn context(&self) -> &ExecutionContext {
        &self.context
    }

    /// Read the buffer directly from host code.
    ///
    /// Only legal when the device's memory model guarantees host
    /// visibility of device-resident allocations; on any other device this
    /// is undefined behavior in a real runtime, so it is refused here with
    /// `HostVisibilityRequired`. Readback on such devices goes through a
    /// device-executed verification task instead.
    pub fn host_view(&self) -> Result<Vec<T>> {
        if !self
            .context
            .has_capability(Capability::HostVisibleDeviceMemory)
        {
            return Err(UsmError::HostVisibilityRequired {
                device: self.context.device_name().to_string(),
            });
        }
        let mut bytes = vec![0u8; self.len * std::mem::size_of::<T>()];
        self.context.backend().read(self.handle, &mut bytes)?;
        Ok(bytemuck::pod_collect_to_vec(&bytes))
    }
}

impl<T> std::fmt::Debug for DeviceBuffer<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceBuffer")
            .field("handle", &self.handle)
            .field("len", &self.len)
            .finish()
    }
}

impl<T> Drop for DeviceBuffer<T> {
    fn drop(&mut self) {
        if let Err(e) = self.context.backend().free(self.handle) {
            tracing::warn!(
                handle = self.handle.id(),
                error = %e,
                "device buffer release failed"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{Backend, CpuBackend};
    use crate::runtime::device::{Device, DeviceCapabilities, DeviceKind};
    use std::sync::Arc;

    fn test_device(host_visible: bool) -> Device {
        Device {
            name: "emulated device".to_string(),
            vendor: "Test".to_string(),
            driver_version: "1.0".to_string(),
            kind: if host_visible {
                DeviceKind::IntegratedGpu
            } else {
                DeviceKind::DiscreteGpu
            },
            capabilities: DeviceCapabilities {
                unified_device_alloc: true,
                host_visible_device_memory: host_visible,
            },
        }
    }

    #[test]
    fn test_allocation_is_released_on_drop() {
        let backend = Arc::new(CpuBackend::new());
        let (context, _queue) =
            ExecutionContext::with_backend(test_device(true), backend.clone()).unwrap();

        {
            let buf = DeviceBuffer::<u32>::new(&context, 10).unwrap();
            assert_eq!(buf.len(), 10);
            assert_eq!(backend.allocation_count(), 1);
        }
        assert_eq!(backend.allocation_count(), 0);
    }

    #[test]
    fn test_zero_length_rejected() {
        let (context, _queue) = ExecutionContext::create(test_device(true)).unwrap();
        let err = DeviceBuffer::<u32>::new(&context, 0).unwrap_err();
        assert!(matches!(err, UsmError::DeviceAllocationFailed { .. }));
    }

    #[test]
    fn test_host_view_requires_visibility() {
        let (context, _queue) = ExecutionContext::create(test_device(false)).unwrap();
        let buf = DeviceBuffer::<u32>::new(&context, 4).unwrap();
        let err = buf.host_view().unwrap_err();
        assert!(matches!(err, UsmError::HostVisibilityRequired { .. }));
    }

    #[test]
    fn test_host_view_reads_device_bytes() {
        let backend = Arc::new(CpuBackend::new());
        let (context, _queue) =
            ExecutionContext::with_backend(test_device(true), backend.clone()).unwrap();
        let buf = DeviceBuffer::<u32>::new(&context, 4).unwrap();

        let words: Vec<u8> = [5u32, 6, 7, 8].iter().flat_map(|v| v.to_ne_bytes()).collect();
        backend.write(buf.handle(), &words).unwrap();

        assert_eq!(buf.host_view().unwrap(), vec![5, 6, 7, 8]);
    }
}
