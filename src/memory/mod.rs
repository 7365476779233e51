//! Unified memory allocation
//!
//! Scoped-ownership wrappers for the two sides of the transfer: a plain
//! host reservation and a device-resident reservation bound to the context
//! that must release it. Both guarantee release on every exit path.

pub mod device_memory;
pub mod host_memory;

pub use device_memory::DeviceBuffer;
pub use host_memory::HostBuffer;
