//! Reference backend executing device work on host worker threads
//!
//! Emulates a device with its own address space: allocations live in a
//! tracked table keyed by handle, reachable only through the `Backend`
//! contract, and per-element kernels run across scoped worker threads with
//! no ordering guarantee between elements.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::backend::{Backend, BufferHandle, ElementRecord, Kernel};
use crate::error::{Result, UsmError};

const ELEM_SIZE: usize = std::mem::size_of::<u32>();

/// CPU-resident emulation of a compute device.
pub struct CpuBackend {
    /// Allocation table: handle id -> backing bytes.
    buffers: Mutex<HashMap<u64, Vec<u8>>>,
    /// Next handle id, never reused.
    next_id: AtomicU64,
    /// Worker threads used per dispatch.
    workers: usize,
}

impl Default for CpuBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl CpuBackend {
    pub fn new() -> Self {
        let workers = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        Self {
            buffers: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            workers,
        }
    }

    /// Number of live device allocations, for leak checks.
    pub fn allocation_count(&self) -> usize {
        self.buffers.lock().len()
    }

    /// Validate a launch against the allocation table and return a
    /// snapshot of the first `n` elements' backing bytes.
    fn launch_bytes(&self, handle: BufferHandle, n: usize) -> Result<Vec<u8>> {
        if n == 0 {
            return Err(UsmError::KernelLaunch {
                reason: "empty launch: zero elements".to_string(),
            });
        }
        let buffers = self.buffers.lock();
        let buf = buffers
            .get(&handle.id())
            .ok_or_else(|| UsmError::KernelLaunch {
                reason: format!("unknown buffer handle {}", handle.id()),
            })?;
        let bytes = n * ELEM_SIZE;
        if bytes > buf.len() {
            return Err(UsmError::KernelLaunch {
                reason: format!(
                    "launch over {} elements exceeds allocation of {} bytes",
                    n,
                    buf.len()
                ),
            });
        }
        Ok(buf[..bytes].to_vec())
    }
}

impl Backend for CpuBackend {
    fn name(&self) -> &str {
        "cpu-reference"
    }

    fn allocate(&self, bytes: usize) -> Result<BufferHandle> {
        if bytes == 0 {
            return Err(UsmError::DeviceAllocationFailed {
                device: self.name().to_string(),
                bytes,
                reason: "zero-sized allocation".to_string(),
            });
        }
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.buffers.lock().insert(id, vec![0u8; bytes]);
        Ok(BufferHandle::new(id))
    }

    fn free(&self, handle: BufferHandle) -> Result<()> {
        match self.buffers.lock().remove(&handle.id()) {
            Some(_) => Ok(()),
            None => Err(UsmError::AsyncTransfer {
                op: "free".to_string(),
                reason: format!("unknown buffer handle {}", handle.id()),
            }),
        }
    }

    fn write(&self, handle: BufferHandle, src: &[u8]) -> Result<()> {
        let mut buffers = self.buffers.lock();
        let buf = buffers
            .get_mut(&handle.id())
            .ok_or_else(|| UsmError::AsyncTransfer {
                op: "write".to_string(),
                reason: format!("unknown buffer handle {}", handle.id()),
            })?;
        if src.len() > buf.len() {
            return Err(UsmError::AsyncTransfer {
                op: "write".to_string(),
                reason: format!(
                    "write of {} bytes exceeds allocation of {} bytes",
                    src.len(),
                    buf.len()
                ),
            });
        }
        buf[..src.len()].copy_from_slice(src);
        Ok(())
    }

    fn read(&self, handle: BufferHandle, dst: &mut [u8]) -> Result<()> {
        let buffers = self.buffers.lock();
        let buf = buffers
            .get(&handle.id())
            .ok_or_else(|| UsmError::AsyncTransfer {
                op: "read".to_string(),
                reason: format!("unknown buffer handle {}", handle.id()),
            })?;
        if dst.len() > buf.len() {
            return Err(UsmError::AsyncTransfer {
                op: "read".to_string(),
                reason: format!(
                    "read of {} bytes exceeds allocation of {} bytes",
                    dst.len(),
                    buf.len()
                ),
            });
        }
        dst.copy_from_slice(&buf[..dst.len()]);
        Ok(())
    }

    fn dispatch(&self, handle: BufferHandle, n: usize, kernel: Kernel) -> Result<()> {
        match kernel {
            Kernel::ReadOut(tx) => {
                let data = self.launch_bytes(handle, n)?;
                let chunk_elems = n.div_ceil(self.workers.min(n));
                std::thread::scope(|s| {
                    for (chunk_idx, chunk) in data.chunks(chunk_elems * ELEM_SIZE).enumerate() {
                        let tx = tx.clone();
                        let base = (chunk_idx * chunk_elems) as u32;
                        s.spawn(move || {
                            for (i, word) in chunk.chunks_exact(ELEM_SIZE).enumerate() {
                                let value =
                                    u32::from_ne_bytes([word[0], word[1], word[2], word[3]]);
                                // Receiver may be gone; a dropped record is fine.
                                let _ = tx.send(ElementRecord {
                                    index: base + i as u32,
                                    value,
                                });
                            }
                        });
                    }
                });
                Ok(())
            }
            Kernel::Increment => {
                // Validate and detach the backing bytes so element tasks
                // run outside the table lock.
                let mut data = {
                    let mut buffers = self.buffers.lock();
                    let buf = buffers
                        .get_mut(&handle.id())
                        .ok_or_else(|| UsmError::KernelLaunch {
                            reason: format!("unknown buffer handle {}", handle.id()),
                        })?;
                    if n == 0 {
                        return Err(UsmError::KernelLaunch {
                            reason: "empty launch: zero elements".to_string(),
                        });
                    }
                    if n * ELEM_SIZE > buf.len() {
                        return Err(UsmError::KernelLaunch {
                            reason: format!(
                                "launch over {} elements exceeds allocation of {} bytes",
                                n,
                                buf.len()
                            ),
                        });
                    }
                    std::mem::take(buf)
                };

                let chunk_elems = n.div_ceil(self.workers.min(n));
                std::thread::scope(|s| {
                    for chunk in data[..n * ELEM_SIZE].chunks_mut(chunk_elems * ELEM_SIZE) {
                        s.spawn(move || {
                            for word in chunk.chunks_exact_mut(ELEM_SIZE) {
                                let value =
                                    u32::from_ne_bytes([word[0], word[1], word[2], word[3]]);
                                word.copy_from_slice(&value.wrapping_add(1).to_ne_bytes());
                            }
                        });
                    }
                });

                self.buffers.lock().insert(handle.id(), data);
                Ok(())
            }
        }
    }
}
