//! Sensor Automation Rule
//!
//! A single process-wide rule: when a motion event arrives and the rule is
//! enabled, every selected switch is turned on and an auto-off countdown is
//! armed for it. Re-triggering while the switches are already on re-arms
//! the countdowns; they never stack. Selected switches that no longer
//! resolve are inert: skipped at trigger time and reported, mirroring the
//! scene manager's tolerance.

use hexa_core::{Context, SwitchRef};
use hexa_registry::DeviceRegistry;
use hexa_state_store::SwitchStore;
use hexa_timers::TimerScheduler;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::{PoisonError, RwLock};
use tracing::{debug, info, instrument, warn};

fn default_auto_off_delay() -> u32 {
    60
}

/// The singleton sensor automation configuration
///
/// Replaced wholesale on save. Selected switches are not validated against
/// the registry; stale references stay in the selection and are simply
/// skipped when the rule fires.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensorConfig {
    /// Whether the rule reacts to motion events at all
    #[serde(default)]
    pub enabled: bool,

    /// Switches the rule drives
    #[serde(default)]
    pub switches: Vec<SwitchRef>,

    /// Seconds of inactivity before the rule turns its switches back off
    #[serde(default = "default_auto_off_delay")]
    pub auto_off_delay: u32,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            switches: Vec::new(),
            auto_off_delay: default_auto_off_delay(),
        }
    }
}

/// Report of one motion event
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MotionReport {
    /// Whether the rule was enabled and fired
    pub triggered: bool,

    /// Switches turned on (with auto-off armed)
    pub activated: Vec<SwitchRef>,

    /// Selected switches that no longer resolve and were left alone
    pub skipped: Vec<SwitchRef>,
}

/// The sensor automation rule
pub struct SensorAutomation {
    config: RwLock<SensorConfig>,
}

impl SensorAutomation {
    /// Create the rule with the default (disabled) configuration
    pub fn new() -> Self {
        Self::with_config(SensorConfig::default())
    }

    /// Create the rule with a specific initial configuration
    pub fn with_config(config: SensorConfig) -> Self {
        Self {
            config: RwLock::new(config),
        }
    }

    /// Replace the configuration wholesale
    ///
    /// Duplicate switch selections are collapsed, keeping first-selected
    /// order. References to unknown devices are accepted; they are inert
    /// until the device reappears.
    pub fn configure(&self, mut config: SensorConfig) {
        let mut seen = HashSet::new();
        config.switches.retain(|sref| seen.insert(*sref));

        info!(
            enabled = config.enabled,
            switches = config.switches.len(),
            delay = config.auto_off_delay,
            "Saved sensor automation config"
        );
        *self
            .config
            .write()
            .unwrap_or_else(PoisonError::into_inner) = config;
    }

    /// Current configuration snapshot
    pub fn config(&self) -> SensorConfig {
        self.config
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Handle a motion event from the sensor collaborator
    ///
    /// No-op while disabled. Otherwise turns every resolvable selected
    /// switch on and arms its auto-off countdown; a zero delay turns the
    /// switches on without arming anything. Re-arming overwrites any
    /// countdown already running for the switch.
    #[instrument(skip_all)]
    pub fn on_motion(
        &self,
        registry: &DeviceRegistry,
        states: &SwitchStore,
        timers: &TimerScheduler,
        context: &Context,
    ) -> MotionReport {
        let config = self.config();
        if !config.enabled {
            debug!("Motion ignored, automation disabled");
            return MotionReport::default();
        }

        let mut report = MotionReport {
            triggered: true,
            ..MotionReport::default()
        };

        for sref in &config.switches {
            if !registry.resolves(*sref) {
                warn!(switch = %sref, "Skipping stale sensor selection");
                report.skipped.push(*sref);
                continue;
            }
            match states.set_switch(sref.device, sref.index, true, context) {
                Ok(_) => {
                    if config.auto_off_delay > 0 {
                        // Guarded above, so arming cannot fail.
                        let _ = timers.schedule(*sref, config.auto_off_delay);
                    }
                    report.activated.push(*sref);
                }
                Err(err) => {
                    warn!(switch = %sref, error = %err, "Skipping unappliable sensor selection");
                    report.skipped.push(*sref);
                }
            }
        }

        debug!(
            activated = report.activated.len(),
            skipped = report.skipped.len(),
            "Motion handled"
        );
        report
    }
}

impl Default for SensorAutomation {
    fn default() -> Self {
        Self::new()
    }
}
