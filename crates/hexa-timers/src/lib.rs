//! Timer Scheduler
//!
//! Countdown timers driven by an external clock. The engine owns no
//! wall-clock machinery; the host calls `tick()` once per second and the
//! scheduler advances every armed countdown by exactly one unit. Tests call
//! `tick()` a known number of times instead of waiting on real time.
//!
//! Two kinds of slot share one countdown state machine (Idle -> Armed ->
//! decrement per tick -> fire at 0):
//! - per-switch timers, whose expiry the engine turns into a forced
//!   switch-off,
//! - the single main-toggle timer, whose expiry only signals that the
//!   deferred activation may be committed.
//!
//! The scheduler applies no effects itself; `tick()` reports what fired and
//! the engine interprets it.

use dashmap::DashMap;
use hexa_core::{DeviceId, SwitchRef};
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tracing::{debug, trace};

/// Errors raised when arming a timer
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TimerError {
    #[error("timer duration must be at least one second")]
    InvalidDuration,
}

/// Result type for scheduler operations
pub type TimerResult<T> = Result<T, TimerError>;

/// One countdown slot: Idle at 0, Armed above 0
///
/// Re-arming overwrites the remaining value; countdowns never stack.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
struct Countdown {
    remaining: u32,
}

impl Countdown {
    fn arm(&mut self, seconds: u32) {
        self.remaining = seconds;
    }

    fn cancel(&mut self) -> u32 {
        std::mem::take(&mut self.remaining)
    }

    /// Advance by one second; true when this step reached exactly 0
    fn tick(&mut self) -> bool {
        match self.remaining {
            0 => false,
            1 => {
                self.remaining = 0;
                true
            }
            _ => {
                self.remaining -= 1;
                false
            }
        }
    }

    fn is_armed(&self) -> bool {
        self.remaining > 0
    }
}

/// What a single `tick()` made expire
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickOutcome {
    /// Per-switch timers that reached 0 on this tick
    pub expired: Vec<SwitchRef>,

    /// Whether the main-toggle delay elapsed on this tick
    pub main_toggle_fired: bool,
}

/// The timer scheduler
///
/// Thread-safe; per-switch timers live in a concurrent map (absent entry =
/// Idle), the main-toggle countdown in its own slot.
pub struct TimerScheduler {
    switch_timers: DashMap<SwitchRef, Countdown>,
    main_toggle: Mutex<Countdown>,
}

impl TimerScheduler {
    /// Create a new scheduler with every slot idle
    pub fn new() -> Self {
        Self {
            switch_timers: DashMap::new(),
            main_toggle: Mutex::new(Countdown::default()),
        }
    }

    fn main_toggle_slot(&self) -> MutexGuard<'_, Countdown> {
        // A panic while holding the lock leaves a plain counter; the value
        // is still coherent, so poisoning is ignored.
        self.main_toggle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Arm (or re-arm) the auto-off timer of one switch
    ///
    /// Re-arming overwrites the remaining value; it never stacks.
    pub fn schedule(&self, sref: SwitchRef, seconds: u32) -> TimerResult<()> {
        if seconds == 0 {
            return Err(TimerError::InvalidDuration);
        }
        debug!(switch = %sref, seconds, "Armed switch timer");
        self.switch_timers
            .entry(sref)
            .or_default()
            .arm(seconds);
        Ok(())
    }

    /// Force one switch timer to Idle, returning the seconds it had left
    ///
    /// Never touches the switch value itself.
    pub fn cancel(&self, sref: SwitchRef) -> u32 {
        let remaining = self
            .switch_timers
            .remove(&sref)
            .map(|(_, c)| c.remaining)
            .unwrap_or(0);
        if remaining > 0 {
            debug!(switch = %sref, remaining, "Cancelled switch timer");
        }
        remaining
    }

    /// Drop every timer keyed to a device (removal path)
    pub fn cancel_device(&self, device: DeviceId) {
        self.switch_timers.retain(|sref, _| sref.device != device);
    }

    /// Seconds left on one switch timer (0 = Idle)
    pub fn remaining(&self, sref: SwitchRef) -> u32 {
        self.switch_timers
            .get(&sref)
            .map(|c| c.remaining)
            .unwrap_or(0)
    }

    /// Snapshot of all armed switch timers
    pub fn armed(&self) -> Vec<(SwitchRef, u32)> {
        self.switch_timers
            .iter()
            .filter(|r| r.value().is_armed())
            .map(|r| (*r.key(), r.value().remaining))
            .collect()
    }

    /// Arm (or re-arm) the main-toggle delay
    pub fn schedule_main_toggle(&self, seconds: u32) -> TimerResult<()> {
        if seconds == 0 {
            return Err(TimerError::InvalidDuration);
        }
        debug!(seconds, "Armed main-toggle timer");
        self.main_toggle_slot().arm(seconds);
        Ok(())
    }

    /// Force the main-toggle timer to Idle
    pub fn cancel_main_toggle(&self) -> u32 {
        self.main_toggle_slot().cancel()
    }

    /// Seconds left on the main-toggle timer (0 = Idle)
    pub fn main_toggle_remaining(&self) -> u32 {
        self.main_toggle_slot().remaining
    }

    /// Advance every armed countdown by one second
    ///
    /// The sole place expiries originate. Timers that reach 0 are reported
    /// and return to Idle; values never go negative.
    pub fn tick(&self) -> TickOutcome {
        let mut expired = Vec::new();
        for mut slot in self.switch_timers.iter_mut() {
            if slot.value_mut().tick() {
                expired.push(*slot.key());
            }
        }
        for sref in &expired {
            trace!(switch = %sref, "Switch timer expired");
            self.switch_timers.remove(sref);
        }

        let main_toggle_fired = self.main_toggle_slot().tick();
        if main_toggle_fired {
            trace!("Main-toggle timer expired");
        }

        TickOutcome {
            expired,
            main_toggle_fired,
        }
    }
}

impl Default for TimerScheduler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sref(device: u32, index: usize) -> SwitchRef {
        SwitchRef::new(device, index)
    }

    #[test]
    fn test_countdown_is_strictly_monotonic() {
        let scheduler = TimerScheduler::new();
        scheduler.schedule(sref(1, 0), 3).unwrap();

        assert_eq!(scheduler.remaining(sref(1, 0)), 3);
        assert!(scheduler.tick().expired.is_empty());
        assert_eq!(scheduler.remaining(sref(1, 0)), 2);
        assert!(scheduler.tick().expired.is_empty());
        assert_eq!(scheduler.remaining(sref(1, 0)), 1);

        let outcome = scheduler.tick();
        assert_eq!(outcome.expired, vec![sref(1, 0)]);
        assert_eq!(scheduler.remaining(sref(1, 0)), 0);

        // Idle timers stay at 0, never negative.
        assert!(scheduler.tick().expired.is_empty());
        assert_eq!(scheduler.remaining(sref(1, 0)), 0);
    }

    #[test]
    fn test_rearm_overwrites_instead_of_stacking() {
        let scheduler = TimerScheduler::new();
        scheduler.schedule(sref(1, 0), 10).unwrap();
        scheduler.schedule(sref(1, 0), 5).unwrap();

        assert_eq!(scheduler.remaining(sref(1, 0)), 5);
    }

    #[test]
    fn test_zero_duration_rejected() {
        let scheduler = TimerScheduler::new();
        assert_eq!(
            scheduler.schedule(sref(1, 0), 0).unwrap_err(),
            TimerError::InvalidDuration
        );
        assert_eq!(
            scheduler.schedule_main_toggle(0).unwrap_err(),
            TimerError::InvalidDuration
        );
    }

    #[test]
    fn test_cancel_returns_remaining() {
        let scheduler = TimerScheduler::new();
        scheduler.schedule(sref(2, 1), 30).unwrap();

        assert_eq!(scheduler.cancel(sref(2, 1)), 30);
        assert_eq!(scheduler.remaining(sref(2, 1)), 0);
        assert_eq!(scheduler.cancel(sref(2, 1)), 0);
    }

    #[test]
    fn test_cancel_device_drops_all_its_timers() {
        let scheduler = TimerScheduler::new();
        scheduler.schedule(sref(1, 0), 10).unwrap();
        scheduler.schedule(sref(1, 1), 20).unwrap();
        scheduler.schedule(sref(2, 0), 30).unwrap();

        scheduler.cancel_device(DeviceId::new(1));

        assert_eq!(scheduler.remaining(sref(1, 0)), 0);
        assert_eq!(scheduler.remaining(sref(1, 1)), 0);
        assert_eq!(scheduler.remaining(sref(2, 0)), 30);
    }

    #[test]
    fn test_independent_timers_expire_independently() {
        let scheduler = TimerScheduler::new();
        scheduler.schedule(sref(1, 0), 1).unwrap();
        scheduler.schedule(sref(1, 1), 2).unwrap();

        let outcome = scheduler.tick();
        assert_eq!(outcome.expired, vec![sref(1, 0)]);

        let outcome = scheduler.tick();
        assert_eq!(outcome.expired, vec![sref(1, 1)]);
    }

    #[test]
    fn test_main_toggle_fires_exactly_once() {
        let scheduler = TimerScheduler::new();
        scheduler.schedule_main_toggle(3).unwrap();

        assert!(!scheduler.tick().main_toggle_fired);
        assert!(!scheduler.tick().main_toggle_fired);
        assert!(scheduler.tick().main_toggle_fired);
        assert!(!scheduler.tick().main_toggle_fired);
        assert_eq!(scheduler.main_toggle_remaining(), 0);
    }

    #[test]
    fn test_main_toggle_cancel() {
        let scheduler = TimerScheduler::new();
        scheduler.schedule_main_toggle(5).unwrap();

        assert_eq!(scheduler.cancel_main_toggle(), 5);
        assert!(!scheduler.tick().main_toggle_fired);
    }

    #[test]
    fn test_armed_snapshot() {
        let scheduler = TimerScheduler::new();
        scheduler.schedule(sref(1, 0), 10).unwrap();
        scheduler.schedule(sref(2, 1), 20).unwrap();

        let mut armed = scheduler.armed();
        armed.sort_by_key(|(sref, _)| (sref.device, sref.index));
        assert_eq!(armed, vec![(sref(1, 0), 10), (sref(2, 1), 20)]);
    }
}
