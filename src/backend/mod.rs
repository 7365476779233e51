//! Opaque capability provider consumed by the runtime
//!
//! The pipeline depends only on this contract: enumeration-independent
//! allocation, byte transfer, and data-parallel dispatch. Which runtime
//! actually backs it (a CPU emulation, a driver binding, a test double) is
//! invisible to the core.

pub mod cpu;

pub use cpu::CpuBackend;

use std::sync::mpsc::Sender;

use serde::Serialize;

use crate::error::Result;

/// Identifies one device-resident allocation held by a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferHandle(u64);

impl BufferHandle {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn id(&self) -> u64 {
        self.0
    }
}

/// Per-element diagnostic emitted by a verification task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ElementRecord {
    pub index: u32,
    pub value: u32,
}

/// Data-parallel kernels the probe dispatches, one task per element.
///
/// Tasks have no defined relative ordering and must not assume one.
pub enum Kernel {
    /// Read every element and stream `(index, value)` records out.
    ReadOut(Sender<ElementRecord>),
    /// Increment every element in place.
    Increment,
}

/// Contract every capability provider implements.
///
/// `allocate`/`free` manage device-resident reservations addressed by
/// stable handles; `write`/`read` move raw bytes across the host/device
/// boundary; `dispatch` runs one `Kernel` task per element against an
/// allocation. All methods are synchronous — asynchrony and ordering are
/// the queue's concern, not the backend's.
pub trait Backend: Send + Sync {
    /// Backend identifier used in diagnostics.
    fn name(&self) -> &str;

    /// Reserve `bytes` of device-resident memory.
    fn allocate(&self, bytes: usize) -> Result<BufferHandle>;

    /// Release a reservation. Must be called through the same backend
    /// that produced the handle.
    fn free(&self, handle: BufferHandle) -> Result<()>;

    /// Copy `src` into the allocation, starting at offset 0.
    fn write(&self, handle: BufferHandle, src: &[u8]) -> Result<()>;

    /// Copy the first `dst.len()` bytes of the allocation into `dst`.
    fn read(&self, handle: BufferHandle, dst: &mut [u8]) -> Result<()>;

    /// Run `kernel` once per element over the first `n` 32-bit elements.
    fn dispatch(&self, handle: BufferHandle, n: usize, kernel: Kernel) -> Result<()>;
}
