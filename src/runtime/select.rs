//! Device selection policies
//!
//! Selection is a single pure function over the enumerated devices,
//! dispatched on a tagged policy variant. Every candidate is ranked and
//! the highest-ranked eligible device wins; a policy never fails on the
//! first mismatch it sees.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Result, UsmError};
use crate::runtime::device::{Device, DeviceKind};

/// Substring predicate targeting a specific accelerator family among
/// several visible GPUs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VendorFilter {
    /// Substring required in the device name or vendor string.
    pub vendor: String,
    /// Substring required in the driver version, when set.
    pub driver: Option<String>,
}

impl VendorFilter {
    /// Filter on a vendor/name substring alone.
    pub fn new(vendor: impl Into<String>) -> Self {
        Self {
            vendor: vendor.into(),
            driver: None,
        }
    }

    /// Additionally require a driver-version substring.
    pub fn with_driver(mut self, driver: impl Into<String>) -> Self {
        self.driver = Some(driver.into());
        self
    }

    /// Whether this filter accepts `device`. Matching is case-insensitive
    /// and restricted to GPUs, mirroring how accelerator families are
    /// singled out among mixed device lists.
    pub fn matches(&self, device: &Device) -> bool {
        if !device.is_gpu() {
            return false;
        }
        let wanted = self.vendor.to_ascii_lowercase();
        let name_hit = device.name.to_ascii_lowercase().contains(&wanted)
            || device.vendor.to_ascii_lowercase().contains(&wanted);
        let driver_hit = self.driver.as_ref().map_or(true, |d| {
            device
                .driver_version
                .to_ascii_lowercase()
                .contains(&d.to_ascii_lowercase())
        });
        name_hit && driver_hit
    }
}

/// Device-targeting policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SelectionPolicy {
    /// Platform-chosen best-effort device.
    Default,
    /// Only the host CPU is eligible.
    PreferCpu,
    /// Only GPUs are eligible, discrete ranked above integrated.
    PreferGpu,
    /// Only GPUs matching the filter are eligible.
    VendorFilter(VendorFilter),
}

impl fmt::Display for SelectionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SelectionPolicy::Default => write!(f, "default"),
            SelectionPolicy::PreferCpu => write!(f, "prefer-cpu"),
            SelectionPolicy::PreferGpu => write!(f, "prefer-gpu"),
            SelectionPolicy::VendorFilter(filter) => {
                write!(f, "vendor-filter({})", filter.vendor)
            }
        }
    }
}

/// Rank `device` under `policy`; `None` means ineligible.
fn rank(device: &Device, policy: &SelectionPolicy) -> Option<u32> {
    match policy {
        SelectionPolicy::Default => Some(match device.kind {
            DeviceKind::DiscreteGpu => 3,
            DeviceKind::IntegratedGpu => 2,
            DeviceKind::Cpu => 1,
            DeviceKind::Other => 0,
        }),
        SelectionPolicy::PreferCpu => (device.kind == DeviceKind::Cpu).then_some(1),
        SelectionPolicy::PreferGpu => match device.kind {
            DeviceKind::DiscreteGpu => Some(2),
            DeviceKind::IntegratedGpu => Some(1),
            _ => None,
        },
        SelectionPolicy::VendorFilter(filter) => filter.matches(device).then(|| {
            match device.kind {
                DeviceKind::DiscreteGpu => 2,
                _ => 1,
            }
        }),
    }
}

/// Choose one device from `devices` under `policy`.
///
/// Evaluates every candidate, keeps the first device at the highest rank,
/// and fails with `NoMatchingDevice` only when nothing is eligible.
pub fn select(devices: &[Device], policy: &SelectionPolicy) -> Result<Device> {
    let mut best: Option<(u32, &Device)> = None;
    for device in devices {
        if let Some(score) = rank(device, policy) {
            if best.map_or(true, |(b, _)| score > b) {
                best = Some((score, device));
            }
        }
    }
    best.map(|(_, d)| d.clone())
        .ok_or_else(|| UsmError::NoMatchingDevice {
            policy: policy.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::device::DeviceCapabilities;

    fn device(name: &str, vendor: &str, driver: &str, kind: DeviceKind) -> Device {
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

    #[test]
    fn test_default_prefers_discrete_gpu() {
        let devices = vec![
            device("host cpu", "Generic", "6.1", DeviceKind::Cpu),
            device("iGPU", "Intel", "mesa", DeviceKind::IntegratedGpu),
            device("dGPU", "NVIDIA", "CUDA 12.4", DeviceKind::DiscreteGpu),
        ];
        let picked = select(&devices, &SelectionPolicy::Default).unwrap();
        assert_eq!(picked.name, "dGPU");
    }

    #[test]
    fn test_prefer_cpu_ignores_gpus() {
        let devices = vec![
            device("dGPU", "NVIDIA", "CUDA 12.4", DeviceKind::DiscreteGpu),
            device("host cpu", "Generic", "6.1", DeviceKind::Cpu),
        ];
        let picked = select(&devices, &SelectionPolicy::PreferCpu).unwrap();
        assert_eq!(picked.kind, DeviceKind::Cpu);
    }

    #[test]
    fn test_prefer_gpu_fails_without_gpu() {
        let devices = vec![device("host cpu", "Generic", "6.1", DeviceKind::Cpu)];
        let err = select(&devices, &SelectionPolicy::PreferGpu).unwrap_err();
        assert!(matches!(err, UsmError::NoMatchingDevice { .. }));
    }

    #[test]
    fn test_vendor_filter_is_case_insensitive() {
        let filter = VendorFilter::new("nvidia").with_driver("cuda");
        let dev = device("GeForce RTX", "NVIDIA", "CUDA 12.4", DeviceKind::DiscreteGpu);
        assert!(filter.matches(&dev));
    }

    #[test]
    fn test_vendor_filter_skips_cpu() {
        let filter = VendorFilter::new("generic");
        let cpu = device("Generic CPU", "Generic", "6.1", DeviceKind::Cpu);
        assert!(!filter.matches(&cpu));
    }

    #[test]
    fn test_tie_keeps_first_device() {
        let devices = vec![
            device("first", "NVIDIA", "CUDA", DeviceKind::DiscreteGpu),
            device("second", "NVIDIA", "CUDA", DeviceKind::DiscreteGpu),
        ];
        let filter = SelectionPolicy::VendorFilter(VendorFilter::new("NVIDIA"));
        assert_eq!(select(&devices, &filter).unwrap().name, "first");
    }
}
