//! Hexa Device Automation & Timed-Switch Engine
//!
//! The authoritative in-memory state store of the Hexa smart-home app:
//! registered devices and their switch/regulator channels, per-switch
//! auto-off countdowns, the global main-toggle activation delay, named
//! scenes, and the PIR sensor automation rule.
//!
//! # Architecture
//!
//! ```text
//! UI / sensor / clock ──commands──▶ Engine ──events──▶ device transport
//!                      ◀─snapshot──
//! ```
//!
//! The engine is a single logical state machine. Commands (toggle, scene
//! run, motion event, tick) are applied one at a time, atomically; the
//! engine runs no threads and owns no wall clock. The host drives time by
//! calling [`Engine::tick`] once per second. Confirmed channel changes are
//! fired on the event bus for the hardware transport to forward.
//!
//! # Key types
//!
//! - [`Engine`] - the command/query facade
//! - [`EngineConfig`] - construction tunables
//! - [`EngineSnapshot`] - the serializable read model
//! - [`TickReport`] - what one clock pulse changed

mod config;
mod engine;
mod error;
mod snapshot;

pub use config::EngineConfig;
pub use engine::{Engine, TickReport};
pub use error::{EngineError, EngineResult};
pub use snapshot::{DeviceSnapshot, EngineSnapshot};

// Re-export the component vocabulary so hosts depend on one crate.
pub use hexa_automation::{MotionReport, SensorConfig};
pub use hexa_core::{events, Context, DeviceId, SwitchRef};
pub use hexa_event_bus::EventBus;
pub use hexa_registry::{DeviceDescriptor, DeviceEntry, RegistryError};
pub use hexa_scenes::{Scene, SceneEntry, SceneError, SceneRun};
pub use hexa_state_store::{ChannelKind, ChannelState, StateError};
pub use hexa_timers::TimerError;
