//! Shared test doubles and device fixtures
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;

use usm_probe::backend::{Backend, BufferHandle, ElementRecord, Kernel};
use usm_probe::error::{Result, UsmError};
use usm_probe::runtime::{Device, DeviceCapabilities, DeviceKind};

/// Build a device handle with explicit capability flags.
pub fn device(name: &str, vendor: &str, driver: &str, kind: DeviceKind) -> Device {
    Device {
        name: name.to_string(),
        vendor: vendor.to_string(),
        driver_version: driver.to_string(),
        kind,
        capabilities: DeviceCapabilities {
            unified_device_alloc: true,
            host_visible_device_memory: kind != DeviceKind::DiscreteGpu,
        },
    }
}

/// A CPU device with full unified-memory support.
pub fn capable_cpu_device() -> Device {
    device("emulated cpu", "Generic", "6.1.0", DeviceKind::Cpu)
}

/// A device lacking unified device-resident allocation support.
pub fn incapable_device() -> Device {
    let mut dev = device("legacy accelerator", "Vendor X", "0.9", DeviceKind::Other);
    dev.capabilities = DeviceCapabilities {
        unified_device_alloc: false,
        host_visible_device_memory: false,
    };
    dev
}

/// Allocation-tracking capability provider.
///
/// Counts every `allocate` call, can be told to fail allocation, and
/// exposes the number of live reservations so tests can assert nothing
/// leaked.
pub struct TrackingBackend {
    buffers: Mutex<HashMap<u64, Vec<u8>>>,
    next_id: AtomicU64,
    allocate_calls: AtomicUsize,
    fail_allocation: bool,
    fail_write: bool,
}

impl TrackingBackend {
    pub fn new() -> Self {
        Self {
            buffers: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            allocate_calls: AtomicUsize::new(0),
            fail_allocation: false,
            fail_write: false,
        }
    }

    /// A backend whose device allocations always fail.
    pub fn failing_allocation() -> Self {
        Self {
            fail_allocation: true,
            ..Self::new()
        }
    }

    /// A backend whose queued writes fail after submission.
    pub fn failing_write() -> Self {
        Self {
            fail_write: true,
            ..Self::new()
        }
    }

    pub fn allocate_calls(&self) -> usize {
        self.allocate_calls.load(Ordering::SeqCst)
    }

    pub fn live_allocations(&self) -> usize {
        self.buffers.lock().unwrap().len()
    }
}

impl Backend for TrackingBackend {
    fn name(&self) -> &str {
        "tracking"
    }

    fn allocate(&self, bytes: usize) -> Result<BufferHandle> {
        self.allocate_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_allocation {
            return Err(UsmError::DeviceAllocationFailed {
                device: self.name().to_string(),
                bytes,
                reason: "injected allocation failure".to_string(),
            });
        }
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.buffers.lock().unwrap().insert(id, vec![0u8; bytes]);
        Ok(BufferHandle::new(id))
    }

    fn free(&self, handle: BufferHandle) -> Result<()> {
        self.buffers
            .lock()
            .unwrap()
            .remove(&handle.id())
            .map(|_| ())
            .ok_or_else(|| UsmError::AsyncTransfer {
                op: "free".to_string(),
                reason: format!("unknown buffer handle {}", handle.id()),
            })
    }

    fn write(&self, handle: BufferHandle, src: &[u8]) -> Result<()> {
        if self.fail_write {
            return Err(UsmError::AsyncTransfer {
                op: "write".to_string(),
                reason: "injected write failure".to_string(),
            });
        }
        let mut buffers = self.buffers.lock().unwrap();
        let buf = buffers
            .get_mut(&handle.id())
            .ok_or_else(|| UsmError::AsyncTransfer {
                op: "write".to_string(),
                reason: format!("unknown buffer handle {}", handle.id()),
            })?;
        buf[..src.len()].copy_from_slice(src);
        Ok(())
    }

    fn read(&self, handle: BufferHandle, dst: &mut [u8]) -> Result<()> {
        let buffers = self.buffers.lock().unwrap();
        let buf = buffers
            .get(&handle.id())
            .ok_or_else(|| UsmError::AsyncTransfer {
                op: "read".to_string(),
                reason: format!("unknown buffer handle {}", handle.id()),
            })?;
        dst.copy_from_slice(&buf[..dst.len()]);
        Ok(())
    }

    fn dispatch(&self, handle: BufferHandle, n: usize, kernel: Kernel) -> Result<()> {
        let mut buffers = self.buffers.lock().unwrap();
        let buf = buffers
            .get_mut(&handle.id())
            .ok_or_else(|| UsmError::KernelLaunch {
                reason: format!("unknown buffer handle {}", handle.id()),
            })?;
        match kernel {
            Kernel::ReadOut(tx) => {
                for (i, word) in buf[..n * 4].chunks_exact(4).enumerate() {
                    let value = u32::from_ne_bytes([word[0], word[1], word[2], word[3]]);
                    let _ = tx.send(ElementRecord {
                        index: i as u32,
                        value,
                    });
                }
            }
            Kernel::Increment => {
                for word in buf[..n * 4].chunks_exact_mut(4) {
                    let value = u32::from_ne_bytes([word[0], word[1], word[2], word[3]]);
                    word.copy_from_slice(&value.wrapping_add(1).to_ne_bytes());
                }
            }
        }
        Ok(())
    }
}
