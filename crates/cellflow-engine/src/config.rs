//! Engine configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::exec::modules::BUILTIN_MODULES;

/// Tunables for the scheduler and the script sandbox.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Quiet period after the last write of a burst before a pass starts.
    pub settle_window_ms: u64,
    /// Let independent cells run while a script is still in flight.
    pub parallel_scripts: bool,
    pub max_operations: u64,
    pub max_call_levels: usize,
    pub max_string_size: usize,
    pub max_array_size: usize,
    /// Modules scripts may `import`.
    pub modules: Vec<String>,
}

impl EngineConfig {
    pub fn settle_window(&self) -> Duration {
        Duration::from_millis(self.settle_window_ms)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            settle_window_ms: 50,
            parallel_scripts: false,
            max_operations: 1_000_000,
            max_call_levels: 64,
            max_string_size: 1_048_576,
            max_array_size: 100_000,
            modules: BUILTIN_MODULES.iter().map(|m| m.to_string()).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settle_window() {
        let config = EngineConfig::default();
        assert_eq!(config.settle_window(), Duration::from_millis(50));
        assert!(!config.parallel_scripts);
        assert!(config.modules.iter().any(|m| m == "stats"));
    }
}
