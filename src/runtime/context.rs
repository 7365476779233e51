//! Execution context and capability gate
//!
//! The context owns the relationship between one selected device, the
//! backend that services it, and the fault sink registered at creation.
//! It is a cheap-clone handle: device buffers hold a clone so they can be
//! released through the same context that created them, and cannot
//! outlive it.

use std::sync::Arc;

use crate::backend::{Backend, CpuBackend};
use crate::error::{Result, UsmError};
use crate::runtime::device::{Capability, Device};
use crate::runtime::fault::FaultSink;
use crate::runtime::queue::Queue;

pub(crate) struct ContextInner {
    pub(crate) device: Device,
    pub(crate) backend: Arc<dyn Backend>,
    pub(crate) fault_sink: FaultSink,
}

/// Logical execution context bound to one device.
#[derive(Clone)]
pub struct ExecutionContext {
    pub(crate) inner: Arc<ContextInner>,
}

impl ExecutionContext {
    /// Establish a context and a command queue on `device` using the
    /// reference backend.
    pub fn create(device: Device) -> Result<(ExecutionContext, Queue)> {
        Self::with_backend(device, Arc::new(CpuBackend::new()))
    }

    /// Establish a context and queue over an explicit capability provider.
    ///
    /// The fault sink is registered here, before any operation can be
    /// submitted.
    pub fn with_backend(
        device: Device,
        backend: Arc<dyn Backend>,
    ) -> Result<(ExecutionContext, Queue)> {
        let context = ExecutionContext {
            inner: Arc::new(ContextInner {
                device,
                backend,
                fault_sink: FaultSink::new(),
            }),
        };
        let queue = Queue::spawn(context.clone())?;
        Ok((context, queue))
    }

    /// Name of the bound device.
    pub fn device_name(&self) -> &str {
        &self.inner.device.name
    }

    /// The bound device handle.
    pub fn device(&self) -> &Device {
        &self.inner.device
    }

    /// Query a capability flag of the bound device.
    pub fn has_capability(&self, capability: Capability) -> bool {
        self.inner.device.supports(capability)
    }

    /// The fault sink registered at creation.
    pub fn fault_sink(&self) -> &FaultSink {
        &self.inner.fault_sink
    }

    pub(crate) fn backend(&self) -> &Arc<dyn Backend> {
        &self.inner.backend
    }

    pub(crate) fn same_context(&self, other: &ExecutionContext) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

/// Abort cleanly unless the bound device supports unified device-resident
/// allocation.
///
/// Must run before any allocation call; failure is fatal and non-retryable
/// for the current device choice.
pub fn require_unified_device_alloc(context: &ExecutionContext) -> Result<()> {
    if context.has_capability(Capability::UnifiedDeviceAlloc) {
        Ok(())
    } else {
        Err(UsmError::UnsupportedDevice {
            device: context.device_name().to_string(),
        })
    }
}
