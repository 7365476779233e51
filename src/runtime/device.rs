//! Device discovery and capability probing
//!
//! A `Device` is an immutable handle describing one physical or virtual
//! compute device: identity strings plus the capability flags the rest of
//! the pipeline gates on. Discovery happens once per process; handles are
//! never mutated afterwards.

/// Broad device classification used for selection ranking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceKind {
    Cpu,
    /// GPU sharing physical memory with the host (UMA).
    IntegratedGpu,
    /// GPU with its own memory behind a bus.
    DiscreteGpu,
    Other,
}

/// Named capability flags queried before relying on a feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    /// Device-resident allocations addressable through a stable handle.
    UnifiedDeviceAlloc,
    /// Device-resident memory is directly readable from host code.
    HostVisibleDeviceMemory,
}

/// Capability flags of one device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeviceCapabilities {
    pub unified_device_alloc: bool,
    pub host_visible_device_memory: bool,
}

/// One compute device visible to the process.
///
/// Attributes are fixed at discovery. Whether device memory may ever be
/// dereferenced from host code is answered by `host_visible_device_memory`,
/// never assumed from the device kind at access time.
#[derive(Debug, Clone)]
pub struct Device {
    pub name: String,
    pub vendor: String,
    pub driver_version: String,
    pub kind: DeviceKind,
    pub capabilities: DeviceCapabilities,
}

impl Device {
    /// Enumerate the devices visible to this process.
    ///
    /// Always yields the host CPU as a device; adds one entry per WebGPU
    /// adapter when an adapter is reachable. Enumeration is a pure query
    /// with no side effects beyond the probe itself.
    pub fn enumerate() -> Vec<Device> {
        let mut devices = vec![Self::cpu_device()];
        if Self::probe_webgpu() {
            devices.extend(Self::enumerate_webgpu());
        }
        devices
    }

    /// Whether this device is a GPU of either kind.
    pub fn is_gpu(&self) -> bool {
        matches!(
            self.kind,
            DeviceKind::IntegratedGpu | DeviceKind::DiscreteGpu
        )
    }

    /// Query a capability flag.
    pub fn supports(&self, capability: Capability) -> bool {
        match capability {
            Capability::UnifiedDeviceAlloc => self.capabilities.unified_device_alloc,
            Capability::HostVisibleDeviceMemory => self.capabilities.host_visible_device_memory,
        }
    }

    /// Build the host-CPU device by reading system information.
    ///
    /// The model name and vendor come from `/proc/cpuinfo`, the "driver"
    /// is the kernel release. CPU memory is trivially host-visible.
    fn cpu_device() -> Device {
        let cpuinfo = std::fs::read_to_string("/proc/cpuinfo").unwrap_or_default();
        let field = |key: &str| {
            cpuinfo
                .lines()
                .find(|l| l.starts_with(key))
                .and_then(|l| l.split(':').nth(1))
                .map(|v| v.trim().to_string())
        };

        let name = field("model name").unwrap_or_else(|| "CPU Device".to_string());
        let vendor = field("vendor_id").unwrap_or_else(|| "Generic".to_string());
        let driver_version = std::fs::read_to_string("/proc/sys/kernel/osrelease")
            .map(|v| v.trim().to_string())
            .unwrap_or_else(|_| "unknown".to_string());

        Device {
            name,
            vendor,
            driver_version,
            kind: DeviceKind::Cpu,
            capabilities: DeviceCapabilities {
                unified_device_alloc: true,
                host_visible_device_memory: true,
            },
        }
    }

    /// Probe whether a WebGPU-compatible adapter is available via wgpu.
    fn probe_webgpu() -> bool {
        use pollster::FutureExt;
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });
        instance
            .request_adapter(&wgpu::RequestAdapterOptions::default())
            .block_on()
            .is_some()
    }

    /// Enumerate WebGPU adapters and map them to device handles.
    ///
    /// Integrated GPUs share physical memory with the host, so their
    /// device-resident allocations are marked host-visible; discrete GPUs
    /// are not.
    fn enumerate_webgpu() -> Vec<Device> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        instance
            .enumerate_adapters(wgpu::Backends::all())
            .into_iter()
            .map(|adapter| {
                let info = adapter.get_info();
                let kind = match info.device_type {
                    wgpu::DeviceType::DiscreteGpu => DeviceKind::DiscreteGpu,
                    wgpu::DeviceType::IntegratedGpu => DeviceKind::IntegratedGpu,
                    wgpu::DeviceType::Cpu => DeviceKind::Cpu,
                    _ => DeviceKind::Other,
                };
                let host_visible = matches!(kind, DeviceKind::Cpu | DeviceKind::IntegratedGpu);

                Device {
                    name: info.name,
                    vendor: Self::vendor_name(info.vendor),
                    driver_version: if info.driver.is_empty() {
                        info.driver_info
                    } else {
                        info.driver
                    },
                    kind,
                    capabilities: DeviceCapabilities {
                        unified_device_alloc: true,
                        host_visible_device_memory: host_visible,
                    },
                }
            })
            .collect()
    }

    /// Map a PCI vendor id to a vendor string.
    fn vendor_name(id: u32) -> String {
        match id {
            0x10DE => "NVIDIA".to_string(),
            0x1002 => "AMD".to_string(),
            0x8086 => "Intel".to_string(),
            other => format!("{other:#06x}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cpu_device_always_present() {
        let devices = Device::enumerate();
        assert!(!devices.is_empty());
        assert!(devices.iter().any(|d| d.kind == DeviceKind::Cpu));
    }

    #[test]
    fn test_cpu_device_is_host_visible() {
        let cpu = Device::cpu_device();
        assert!(!cpu.name.is_empty());
        assert!(cpu.supports(Capability::UnifiedDeviceAlloc));
        assert!(cpu.supports(Capability::HostVisibleDeviceMemory));
        assert!(!cpu.is_gpu());
    }

    #[test]
    fn test_vendor_name_mapping() {
        assert_eq!(Device::vendor_name(0x10DE), "NVIDIA");
        assert_eq!(Device::vendor_name(0x1002), "AMD");
        assert_eq!(Device::vendor_name(0x8086), "Intel");
        assert_eq!(Device::vendor_name(0x1234), "0x1234");
    }
}
