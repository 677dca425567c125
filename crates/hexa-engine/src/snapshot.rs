//! Engine state snapshot
//!
//! The read side of the engine: one serializable view of everything the UI
//! renders (device cards, channel values, armed countdowns, scenes, and
//! the sensor rule). Snapshots are plain data, detached from the engine.

use hexa_automation::SensorConfig;
use hexa_core::DeviceId;
use hexa_scenes::Scene;
use serde::{Deserialize, Serialize};

/// One device card as the UI shows it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceSnapshot {
    /// Device id
    pub id: DeviceId,

    /// Editable card name
    pub name: String,

    /// Hardware model label
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Current switch values
    pub switches: Vec<bool>,

    /// Current regulator levels
    pub regulators: Vec<u8>,

    /// Seconds left on each switch's auto-off timer (0 = idle),
    /// index-aligned with `switches`
    pub timers: Vec<u32>,
}

/// Full engine state at one point in time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineSnapshot {
    /// All registered devices, ordered by id
    pub devices: Vec<DeviceSnapshot>,

    /// Seconds left on the main-toggle delay (0 = idle)
    pub main_toggle_remaining: u32,

    /// All scenes in first-saved order
    pub scenes: Vec<Scene>,

    /// Current sensor automation configuration
    pub sensor: SensorConfig,
}
