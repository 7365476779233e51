//! Probe binary: run one allocate→transfer→verify cycle and exit.
//!
//! Takes no arguments. The device-targeting policy is fixed at compile
//! time by Cargo features (`prefer-cpu`, `prefer-gpu`, `vendor-filter`,
//! `mutation`); the default build lets the platform choose.

use std::process::ExitCode;

use usm_probe::config::DEFAULT_ELEMENT_COUNT;
use usm_probe::runtime::SelectionPolicy;
use usm_probe::HarnessConfig;

fn policy_from_features() -> SelectionPolicy {
    if cfg!(feature = "prefer-cpu") {
        SelectionPolicy::PreferCpu
    } else if cfg!(feature = "prefer-gpu") {
        SelectionPolicy::PreferGpu
    } else if cfg!(feature = "vendor-filter") {
        SelectionPolicy::VendorFilter(
            usm_probe::runtime::VendorFilter::new("NVIDIA").with_driver("CUDA"),
        )
    } else {
        SelectionPolicy::Default
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt::init();

    let config = HarnessConfig {
        policy: policy_from_features(),
        element_count: DEFAULT_ELEMENT_COUNT,
        mutation_phase: cfg!(feature = "mutation"),
    };

    match usm_probe::run_with_config(config) {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("usm-probe: {e}");
            ExitCode::FAILURE
        }
    }
}
