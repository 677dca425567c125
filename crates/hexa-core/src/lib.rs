//! Core types for the Hexa Device Automation & Timed-Switch Engine
//!
//! This crate provides the fundamental types used throughout the engine:
//! DeviceId, SwitchRef, Event, and Context, plus the standard event payloads
//! fired on the event bus.

mod context;
mod device;
mod event;

pub use context::Context;
pub use device::{DeviceId, SwitchRef, SwitchRefError};
pub use event::{Event, EventData, EventType};

/// Highest regulator level a channel accepts unless configured otherwise
/// (the fan-speed slider runs 0..=6)
pub const DEFAULT_REGULATOR_MAX: u8 = 6;

/// Standard event types fired by the engine
pub mod events {
    use super::*;
    use serde::{Deserialize, Serialize};

    /// Event type for switch value changes
    pub const SWITCH_CHANGED: &str = "switch_changed";

    /// Event type for regulator level changes
    pub const REGULATOR_CHANGED: &str = "regulator_changed";

    /// Event type for device registration
    pub const DEVICE_REGISTERED: &str = "device_registered";

    /// Event type for device removal
    pub const DEVICE_REMOVED: &str = "device_removed";

    /// Event type signalling that the main-toggle delay has elapsed
    pub const MAIN_TOGGLE_READY: &str = "main_toggle_ready";

    /// Data for SWITCH_CHANGED events
    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct SwitchChangedData {
        pub device: DeviceId,
        pub index: usize,
        pub old_value: bool,
        pub new_value: bool,
    }

    impl EventData for SwitchChangedData {
        fn event_type() -> &'static str {
            SWITCH_CHANGED
        }
    }

    /// Data for REGULATOR_CHANGED events
    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct RegulatorChangedData {
        pub device: DeviceId,
        pub index: usize,
        pub old_level: u8,
        pub new_level: u8,
    }

    impl EventData for RegulatorChangedData {
        fn event_type() -> &'static str {
            REGULATOR_CHANGED
        }
    }

    /// Data for DEVICE_REGISTERED events
    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct DeviceRegisteredData {
        pub device: DeviceId,
        pub switch_count: usize,
        pub regulator_count: usize,
    }

    impl EventData for DeviceRegisteredData {
        fn event_type() -> &'static str {
            DEVICE_REGISTERED
        }
    }

    /// Data for DEVICE_REMOVED events
    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct DeviceRemovedData {
        pub device: DeviceId,
    }

    impl EventData for DeviceRemovedData {
        fn event_type() -> &'static str {
            DEVICE_REMOVED
        }
    }

    /// Data for MAIN_TOGGLE_READY events
    ///
    /// Carries no payload of its own; the deferred activation is committed
    /// by the host, and the event context traces back to the command that
    /// scheduled the delay.
    #[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
    pub struct MainToggleReadyData {}

    impl EventData for MainToggleReadyData {
        fn event_type() -> &'static str {
            MAIN_TOGGLE_READY
        }
    }
}
