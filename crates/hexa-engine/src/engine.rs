//! The engine: command dispatch over owned state
//!
//! One method per command, each returning a result; every command is
//! applied atomically under a single internal lock, so no two commands
//! interleave mid-mutation. The cross-cutting invariants live here, inside
//! the one place all mutations flow through:
//!
//! - registering a device seeds its channel state,
//! - removing a device tears down its channel state and timers,
//! - turning a switch off by hand (or by scene) cancels its armed timer,
//! - a per-switch timer expiry forces the switch off,
//! - the main-toggle expiry signals the caller and touches no switch.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use hexa_automation::{MotionReport, SensorAutomation, SensorConfig};
use hexa_core::events::{
    DeviceRegisteredData, DeviceRemovedData, MainToggleReadyData, RegulatorChangedData,
    SwitchChangedData,
};
use hexa_core::{Context, DeviceId, SwitchRef};
use hexa_event_bus::EventBus;
use hexa_registry::{DeviceDescriptor, DeviceEntry, DeviceRegistry, RegistryError};
use hexa_scenes::{Scene, SceneEntry, SceneManager, SceneRun};
use hexa_state_store::{ChannelKind, StateError, SwitchStore};
use hexa_timers::TimerScheduler;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::config::EngineConfig;
use crate::error::EngineResult;
use crate::snapshot::{DeviceSnapshot, EngineSnapshot};

/// What one clock pulse changed
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickReport {
    /// Switches forced off by an expiring auto-off timer
    pub switched_off: Vec<SwitchRef>,

    /// True exactly once per scheduled delay: the main-toggle activation
    /// may now be committed by the host
    pub main_toggle_ready: bool,
}

/// The device automation and timed-switch engine
///
/// Owns the registry, channel state, timers, scenes, and the sensor rule,
/// and exposes the command/query boundary the UI, clock driver, and sensor
/// collaborator call into. The device-transport collaborator subscribes to
/// the event bus returned by [`Engine::bus`].
pub struct Engine {
    bus: Arc<EventBus>,
    registry: DeviceRegistry,
    states: SwitchStore,
    timers: TimerScheduler,
    scenes: SceneManager,
    automation: SensorAutomation,
    /// Serializes command application; commands never suspend, so this is
    /// only ever held for the duration of one synchronous mutation.
    command_lock: Mutex<()>,
}

impl Engine {
    /// Create an engine from configuration
    pub fn new(config: EngineConfig) -> Self {
        let bus = Arc::new(EventBus::with_capacity(config.event_capacity));
        Self {
            states: SwitchStore::with_regulator_max(Arc::clone(&bus), config.regulator_max),
            registry: DeviceRegistry::new(),
            timers: TimerScheduler::new(),
            scenes: SceneManager::new(),
            automation: SensorAutomation::with_config(SensorConfig {
                auto_off_delay: config.default_auto_off_delay,
                ..SensorConfig::default()
            }),
            command_lock: Mutex::new(()),
            bus,
        }
    }

    /// Create an engine with default configuration
    pub fn with_defaults() -> Self {
        Self::new(EngineConfig::default())
    }

    /// Event bus handle for collaborators
    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    fn guard(&self) -> MutexGuard<'_, ()> {
        // State behind the lock is always left coherent by a panicking
        // command, so poisoning is ignored.
        self.command_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    // ---- Device Registry commands ----

    /// Register a device and seed its channel state
    ///
    /// All switches start off, all regulators at level 0. Fails with
    /// `DuplicateDeviceError` on id collision, leaving prior state intact.
    #[instrument(skip(self, descriptor, context), fields(device = %descriptor.id))]
    pub fn register_device(
        &self,
        descriptor: DeviceDescriptor,
        context: &Context,
    ) -> EngineResult<Arc<DeviceEntry>> {
        let _guard = self.guard();

        let entry = self.registry.register(descriptor)?;
        self.states
            .insert_device(entry.id, entry.switch_count, entry.regulator_count);
        self.bus.fire_typed(
            DeviceRegisteredData {
                device: entry.id,
                switch_count: entry.switch_count,
                regulator_count: entry.regulator_count,
            },
            context.clone(),
        );
        Ok(entry)
    }

    /// Remove a device and everything keyed to it
    ///
    /// Deletes channel state and cancels all of the device's timers. Scene
    /// entries and sensor selections referencing the device stay put and
    /// are skipped lazily when replayed or triggered.
    #[instrument(skip(self, context), fields(device = %id))]
    pub fn remove_device(&self, id: DeviceId, context: &Context) -> EngineResult<Arc<DeviceEntry>> {
        let _guard = self.guard();

        let entry = self.registry.remove(id)?;
        self.states.remove_device(id);
        self.timers.cancel_device(id);
        self.bus
            .fire_typed(DeviceRemovedData { device: id }, context.clone());
        Ok(entry)
    }

    /// Rename a device card
    pub fn rename_device(
        &self,
        id: DeviceId,
        name: impl Into<String>,
    ) -> EngineResult<Arc<DeviceEntry>> {
        let _guard = self.guard();
        Ok(self.registry.rename(id, name)?)
    }

    // ---- Switch State Store commands ----

    /// Set one switch to an explicit value
    ///
    /// Turning a switch off also cancels its armed auto-off timer; a switch
    /// that is off has no reason to keep counting down.
    pub fn set_switch(
        &self,
        device: DeviceId,
        index: usize,
        value: bool,
        context: &Context,
    ) -> EngineResult<SwitchChangedData> {
        let _guard = self.guard();
        self.apply_switch(device, index, value, context)
    }

    /// Flip one switch
    pub fn toggle_switch(
        &self,
        device: DeviceId,
        index: usize,
        context: &Context,
    ) -> EngineResult<SwitchChangedData> {
        let _guard = self.guard();
        let current = self.states.switch(device, index)?;
        self.apply_switch(device, index, !current, context)
    }

    fn apply_switch(
        &self,
        device: DeviceId,
        index: usize,
        value: bool,
        context: &Context,
    ) -> EngineResult<SwitchChangedData> {
        let change = self.states.set_switch(device, index, value, context)?;
        if !change.new_value {
            self.timers.cancel(SwitchRef::new(device, index));
        }
        Ok(change)
    }

    /// Set one regulator level, clamped to the configured range
    pub fn set_regulator(
        &self,
        device: DeviceId,
        index: usize,
        level: u8,
        context: &Context,
    ) -> EngineResult<RegulatorChangedData> {
        let _guard = self.guard();
        Ok(self.states.set_regulator(device, index, level, context)?)
    }

    // ---- Timer Scheduler commands ----

    fn validate_switch_ref(&self, device: DeviceId, index: usize) -> EngineResult<SwitchRef> {
        let entry = self
            .registry
            .get(device)
            .ok_or(RegistryError::NotFound(device))?;
        if index >= entry.switch_count {
            return Err(StateError::IndexOutOfRange {
                device,
                kind: ChannelKind::Switch,
                index,
                count: entry.switch_count,
            }
            .into());
        }
        Ok(SwitchRef::new(device, index))
    }

    /// Arm (or re-arm) the auto-off timer of one switch
    pub fn schedule_timer(
        &self,
        device: DeviceId,
        index: usize,
        seconds: u32,
    ) -> EngineResult<()> {
        let _guard = self.guard();
        let sref = self.validate_switch_ref(device, index)?;
        self.timers.schedule(sref, seconds)?;
        Ok(())
    }

    /// Cancel one switch timer, returning the seconds it had left
    ///
    /// Never touches the switch value.
    pub fn cancel_timer(&self, device: DeviceId, index: usize) -> EngineResult<u32> {
        let _guard = self.guard();
        let sref = self.validate_switch_ref(device, index)?;
        Ok(self.timers.cancel(sref))
    }

    /// Arm (or re-arm) the main-toggle activation delay
    pub fn schedule_main_toggle(&self, seconds: u32) -> EngineResult<()> {
        let _guard = self.guard();
        self.timers.schedule_main_toggle(seconds)?;
        Ok(())
    }

    /// Cancel the main-toggle delay, returning the seconds it had left
    pub fn cancel_main_toggle(&self) -> u32 {
        let _guard = self.guard();
        self.timers.cancel_main_toggle()
    }

    /// Advance every armed countdown by one second
    ///
    /// Called by the external clock driver once per second. The sole origin
    /// of expiry-driven changes: per-switch expiries force their switch off
    /// (firing the usual `switch_changed` event), and a main-toggle expiry
    /// reports readiness and fires `main_toggle_ready` without touching any
    /// switch.
    #[instrument(skip(self, context))]
    pub fn tick(&self, context: &Context) -> TickReport {
        let _guard = self.guard();

        let outcome = self.timers.tick();
        let mut report = TickReport::default();

        for sref in outcome.expired {
            match self
                .states
                .set_switch(sref.device, sref.index, false, &context.child())
            {
                Ok(_) => {
                    debug!(switch = %sref, "Auto-off timer expired, switch forced off");
                    report.switched_off.push(sref);
                }
                Err(err) => {
                    warn!(switch = %sref, error = %err, "Expired timer had no backing switch");
                }
            }
        }

        if outcome.main_toggle_fired {
            info!("Main-toggle delay elapsed");
            self.bus
                .fire_typed(MainToggleReadyData {}, context.child());
            report.main_toggle_ready = true;
        }

        report
    }

    // ---- Scene Manager commands ----

    /// Save a scene, replacing any existing scene of the same name
    pub fn save_scene(
        &self,
        name: impl Into<String>,
        entries: Vec<SceneEntry>,
    ) -> EngineResult<Scene> {
        let _guard = self.guard();
        Ok(self.scenes.save(name, entries)?)
    }

    /// Delete a scene by name
    pub fn delete_scene(&self, name: &str) -> EngineResult<Scene> {
        let _guard = self.guard();
        Ok(self.scenes.delete(name)?)
    }

    /// Replay a scene, reporting any entries that no longer resolve
    ///
    /// Entries that turn a switch off cancel the switch's armed timer, the
    /// same as a manual off.
    #[instrument(skip(self, context))]
    pub fn run_scene(&self, name: &str, context: &Context) -> EngineResult<SceneRun> {
        let _guard = self.guard();

        let run = self
            .scenes
            .run(name, &self.registry, &self.states, context)?;

        if let Some(scene) = self.scenes.get(name) {
            for entry in scene.entries.iter().filter(|e| !e.desired) {
                if !run.skipped.contains(entry) {
                    self.timers.cancel(entry.switch_ref());
                }
            }
        }

        Ok(run)
    }

    // ---- Sensor Automation commands ----

    /// Replace the sensor automation configuration wholesale
    pub fn configure_sensor(&self, config: SensorConfig) {
        let _guard = self.guard();
        self.automation.configure(config);
    }

    /// Handle a motion event from the sensor collaborator
    ///
    /// No-op while the rule is disabled; otherwise turns the selected
    /// switches on and arms their auto-off countdowns.
    pub fn on_motion(&self, context: &Context) -> MotionReport {
        let _guard = self.guard();
        self.automation
            .on_motion(&self.registry, &self.states, &self.timers, context)
    }

    // ---- Queries ----

    /// Current sensor automation configuration
    pub fn sensor_config(&self) -> SensorConfig {
        self.automation.config()
    }

    /// Full state snapshot for rendering
    ///
    /// Devices are ordered by id; timers are index-aligned with switches.
    pub fn snapshot(&self) -> EngineSnapshot {
        let _guard = self.guard();

        let mut devices: Vec<DeviceSnapshot> = self
            .registry
            .iter()
            .map(|entry| {
                let channels = self.states.channels(entry.id).unwrap_or_else(|| {
                    // Registration always seeds channel state, so this arm
                    // is unreachable in practice.
                    warn!(device = %entry.id, "Device has no channel state");
                    hexa_state_store::ChannelState {
                        switches: vec![false; entry.switch_count],
                        regulators: vec![0; entry.regulator_count],
                        last_changed: entry.created_at,
                    }
                });
                let timers = (0..entry.switch_count)
                    .map(|index| self.timers.remaining(SwitchRef::new(entry.id, index)))
                    .collect();
                DeviceSnapshot {
                    id: entry.id,
                    name: entry.name.clone(),
                    model: entry.model.clone(),
                    switches: channels.switches,
                    regulators: channels.regulators,
                    timers,
                }
            })
            .collect();
        devices.sort_by_key(|d| d.id);

        EngineSnapshot {
            devices,
            main_toggle_remaining: self.timers.main_toggle_remaining(),
            scenes: self.scenes.all(),
            sensor: self.automation.config(),
        }
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::with_defaults()
    }
}
