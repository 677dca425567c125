//! Engine configuration
//!
//! Parsed from the host's configuration file; every field has a default so
//! an empty mapping yields a working engine.

use hexa_core::DEFAULT_REGULATOR_MAX;
use serde::{Deserialize, Serialize};

fn default_regulator_max() -> u8 {
    DEFAULT_REGULATOR_MAX
}

fn default_event_capacity() -> usize {
    1024
}

fn default_auto_off_delay() -> u32 {
    60
}

/// Tunables for a freshly constructed engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Upper bound regulator levels are clamped to
    #[serde(default = "default_regulator_max")]
    pub regulator_max: u8,

    /// Capacity of each event-bus broadcast channel
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,

    /// Auto-off delay the sensor automation starts out with, in seconds
    #[serde(default = "default_auto_off_delay")]
    pub default_auto_off_delay: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            regulator_max: default_regulator_max(),
            event_capacity: default_event_capacity(),
            default_auto_off_delay: default_auto_off_delay(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_mapping_yields_defaults() {
        let config: EngineConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.regulator_max, 6);
        assert_eq!(config.default_auto_off_delay, 60);
    }

    #[test]
    fn test_partial_override() {
        let config: EngineConfig =
            serde_json::from_str("{\"regulator_max\": 10}").unwrap();
        assert_eq!(config.regulator_max, 10);
        assert_eq!(config.event_capacity, 1024);
    }
}
