//! Error taxonomy for the probe pipeline
//!
//! Every variant is fatal to the current run: nothing is retried, and the
//! caller tears down whatever was already acquired before exiting non-zero.

use thiserror::Error;

/// Result type for probe operations
pub type Result<T> = std::result::Result<T, UsmError>;

/// Errors that can occur during an allocate→transfer→verify run
#[derive(Debug, Error)]
pub enum UsmError {
    /// No enumerated device satisfied the selection policy
    #[error("no device matched selection policy \"{policy}\"")]
    NoMatchingDevice { policy: String },

    /// Execution context or queue could not be established on the device
    #[error("failed to create execution context on \"{device}\": {reason}")]
    ContextCreation { device: String, reason: String },

    /// The selected device lacks unified device-resident allocation support
    #[error("device \"{device}\" does not support unified device allocations")]
    UnsupportedDevice { device: String },

    /// Plain host-memory reservation failed
    #[error("host allocation of {bytes} bytes failed")]
    HostAllocationFailed { bytes: usize },

    /// Device-resident reservation failed; distinct from host failure so
    /// callers can tell which side gave out
    #[error("device allocation of {bytes} bytes failed on \"{device}\": {reason}")]
    DeviceAllocationFailed {
        device: String,
        bytes: usize,
        reason: String,
    },

    /// An operation failed after successful submission; surfaced through
    /// the fault sink at the next synchronization point
    #[error("asynchronous operation \"{op}\" failed after submission: {reason}")]
    AsyncTransfer { op: String, reason: String },

    /// A data-parallel dispatch was rejected before any element task ran
    #[error("kernel launch failed: {reason}")]
    KernelLaunch { reason: String },

    /// Host and device buffer lengths diverged at submission time
    #[error("transfer size mismatch: host holds {host} elements, device holds {device}")]
    TransferSizeMismatch { host: usize, device: usize },

    /// Direct host access to device memory was requested without the
    /// host-visibility capability; readback must go through a device task
    #[error(
        "device memory on \"{device}\" is not host-visible; read it back through a device task"
    )]
    HostVisibilityRequired { device: String },
}
