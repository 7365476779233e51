//! Device runtime: discovery, selection, context, queue, fault delivery
//!
//! The flow through this module mirrors the probe pipeline: enumerate and
//! select a device, establish an execution context with its command queue
//! and fault sink, then gate on capabilities before touching memory.

pub mod context;
pub mod device;
pub mod fault;
pub mod queue;
pub mod select;

pub use context::{require_unified_device_alloc, ExecutionContext};
pub use device::{Capability, Device, DeviceCapabilities, DeviceKind};
pub use fault::{Fault, FaultSink};
pub use queue::{CompletionToken, Queue};
pub use select::{select, SelectionPolicy, VendorFilter};
