//! Lifecycle owner for one allocate→transfer→verify cycle
//!
//! The harness owns the host and device buffers for its lifetime and
//! guarantees release on every exit path: a failure partway through
//! `prepare` (say, device allocation after a successful host allocation)
//! still releases what was already acquired, and no partial-acquisition
//! state leaks out.

use serde::Serialize;

use crate::backend::ElementRecord;
use crate::config::HarnessConfig;
use crate::error::{Result, UsmError};
use crate::memory::{DeviceBuffer, HostBuffer};
use crate::runtime::{
    require_unified_device_alloc, select, Device, ExecutionContext, Queue,
};

/// Outcome of one run: the selected device plus every diagnostic record,
/// so callers can assert on records instead of scraping stdout.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub device_name: String,
    /// One record per element, in arrival order (inherently unordered).
    pub verification: Vec<ElementRecord>,
    /// Probe-element readback before mutation, when that phase ran.
    pub before_mutation: Option<ElementRecord>,
    /// Probe-element readback after mutation, when that phase ran.
    pub after_mutation: Option<ElementRecord>,
}

/// Owns context, queue, and both buffers for one verification cycle.
pub struct Harness {
    config: HarnessConfig,
    host: HostBuffer<u32>,
    device: DeviceBuffer<u32>,
    queue: Queue,
    context: ExecutionContext,
}

impl std::fmt::Debug for Harness {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Harness")
            .field("device_name", &self.context.device_name())
            .field("element_count", &self.config.element_count)
            .finish()
    }
}

impl Harness {
    /// Select a device from the running system and acquire all resources.
    pub fn prepare(config: HarnessConfig) -> Result<Self> {
        let devices = Device::enumerate();
        Self::prepare_on(config, &devices)
    }

    /// Select from an explicit device list (selection stays a pure query).
    pub fn prepare_on(config: HarnessConfig, devices: &[Device]) -> Result<Self> {
        let device = select(devices, &config.policy)?;
        let (context, queue) = ExecutionContext::create(device)?;
        Self::with_context(config, context, queue)
    }

    /// Acquire buffers on an already-established context.
    ///
    /// The capability gate runs before any allocation; host allocation
    /// precedes device allocation, and an allocation failure on either
    /// side drops whatever came before it on the way out.
    pub fn with_context(
        config: HarnessConfig,
        context: ExecutionContext,
        queue: Queue,
    ) -> Result<Self> {
        require_unified_device_alloc(&context)?;

        let host = HostBuffer::<u32>::new(config.element_count)?;
        let device = DeviceBuffer::<u32>::new(&context, config.element_count)?;

        Ok(Self {
            config,
            host,
            device,
            queue,
            context,
        })
    }

    /// Name of the device this harness runs on.
    pub fn device_name(&self) -> &str {
        self.context.device_name()
    }

    /// Fill the host buffer with the deterministic pattern `host[i] = i`.
    pub fn fill_pattern(&mut self) {
        for (i, ele) in self.host.as_mut_slice().iter_mut().enumerate() {
            *ele = i as u32;
        }
    }

    /// Copy the host buffer into the device buffer and wait for the copy
    /// to complete. Nothing may read the device buffer before this
    /// returns Ok.
    pub fn upload(&self) -> Result<()> {
        let token = self.queue.copy_host_to_device(&self.host, &self.device)?;
        token.wait()?;
        tracing::info!(elements = self.host.len(), "host buffer copied to device");
        Ok(())
    }

    /// Dispatch one verification task per element and collect its records.
    ///
    /// Records arrive in no defined order; each index appears exactly once.
    pub fn verify(&self) -> Result<Vec<ElementRecord>> {
        let (token, records) = self.queue.launch_verification(&self.device)?;
        token.wait()?;
        Ok(records.iter().collect())
    }

    /// Dispatch one increment task per element and wait for completion.
    pub fn mutate(&self) -> Result<()> {
        let token = self.queue.launch_mutation(&self.device)?;
        token.wait()?;
        tracing::info!(elements = self.device.len(), "mutation dispatch completed");
        Ok(())
    }

    /// Read one element back through a device-executed task.
    pub fn read_element(&self, index: u32) -> Result<ElementRecord> {
        self.verify()?
            .into_iter()
            .find(|r| r.index == index)
            .ok_or_else(|| UsmError::KernelLaunch {
                reason: format!("readback produced no record for element {index}"),
            })
    }

    /// Run the full cycle and emit the line-oriented diagnostics.
    pub fn run(&mut self) -> Result<RunReport> {
        println!("Using device \"{}\"", self.device_name());

        self.fill_pattern();
        self.upload()?;

        let probe_index = (self.config.element_count / 2) as u32;
        let before_mutation = if self.config.mutation_phase {
            let record = self.read_element(probe_index)?;
            println!(
                "[before mod] device_ele[{}] = {}",
                record.index, record.value
            );
            Some(record)
        } else {
            None
        };

        println!("Test device elements...");
        let verification = self.verify()?;
        for record in &verification {
            println!("  device_ele[{}] = {}", record.index, record.value);
        }

        let after_mutation = if self.config.mutation_phase {
            self.mutate()?;
            let record = self.read_element(probe_index)?;
            println!(
                "[after mod] device_ele[{}] = {}",
                record.index, record.value
            );
            Some(record)
        } else {
            None
        };

        Ok(RunReport {
            device_name: self.device_name().to_string(),
            verification,
            before_mutation,
            after_mutation,
        })
    }
}

/// Run one full cycle under `config` against the devices visible to the
/// process.
pub fn run_with_config(config: HarnessConfig) -> Result<RunReport> {
    let mut harness = Harness::prepare(config)?;
    harness.run()
}
