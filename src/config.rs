//! Harness configuration
//!
//! One explicit struct handed to the harness at construction. The binary
//! populates it from Cargo features; library callers fill it directly.

use serde::{Deserialize, Serialize};

use crate::runtime::SelectionPolicy;

/// Canonical element count when none is configured.
pub const DEFAULT_ELEMENT_COUNT: usize = 10;

/// Configuration for one allocate→transfer→verify cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HarnessConfig {
    /// Device-targeting policy.
    pub policy: SelectionPolicy,
    /// Number of buffer elements; runtime-configurable, default 10.
    pub element_count: usize,
    /// Run the device-side increment phase with before/after readback.
    pub mutation_phase: bool,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            policy: SelectionPolicy::Default,
            element_count: DEFAULT_ELEMENT_COUNT,
            mutation_phase: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = HarnessConfig::default();
        assert_eq!(config.element_count, DEFAULT_ELEMENT_COUNT);
        assert_eq!(config.policy, SelectionPolicy::Default);
        assert!(!config.mutation_phase);
    }
}
