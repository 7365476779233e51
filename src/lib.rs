//! Unified shared memory validation harness
//!
//! Proves one load-bearing contract on a heterogeneous compute device:
//! memory allocated in a device-resident address space can be written from
//! the host, read and mutated inside device-executed code, and read back,
//! with correct ordering and without silent corruption.
//!
//! The pipeline is fixed: device selection → context/queue establishment →
//! capability negotiation → allocation → host→device transfer → in-kernel
//! verification → (optionally) device-side mutation with readback. One
//! cycle per run.
//!
//! # Usage
//!
//! ```no_run
//! use usm_probe::{run_with_config, HarnessConfig};
//!
//! let report = run_with_config(HarnessConfig::default())?;
//! assert_eq!(report.verification.len(), 10);
//! # Ok::<(), usm_probe::UsmError>(())
//! ```

pub mod backend;
pub mod config;
pub mod error;
pub mod harness;
pub mod memory;
pub mod runtime;

pub use backend::ElementRecord;
pub use config::HarnessConfig;
pub use error::{Result, UsmError};
pub use harness::{run_with_config, Harness, RunReport};
