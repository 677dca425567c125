//! Switch State Store
//!
//! Tracks per-device switch booleans and regulator levels and fires
//! channel-change events on the event bus. The store enforces the channel
//! invariant: the sequences always have exactly the lengths the device
//! declared at registration, and an out-of-range index is a contract
//! violation, never a silent no-op.
//!
//! Entry lifecycle is driven by the engine: a registration seeds the entry
//! with every switch off and every regulator at level 0, a removal deletes
//! it. The store itself never creates entries on write.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use hexa_core::events::{RegulatorChangedData, SwitchChangedData};
use hexa_core::{Context, DeviceId, DEFAULT_REGULATOR_MAX};
use hexa_event_bus::EventBus;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, instrument, trace};

/// Which channel sequence an index failed against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    Switch,
    Regulator,
}

impl std::fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChannelKind::Switch => write!(f, "switch"),
            ChannelKind::Regulator => write!(f, "regulator"),
        }
    }
}

/// Errors raised by channel mutations and lookups
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StateError {
    #[error("device not found: {0}")]
    NotFound(DeviceId),

    #[error("{kind} index {index} out of range for device {device} ({count} channels)")]
    IndexOutOfRange {
        device: DeviceId,
        kind: ChannelKind,
        index: usize,
        count: usize,
    },
}

/// Result type for state store operations
pub type StateResult<T> = Result<T, StateError>;

/// Channel state of one device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelState {
    /// Switch values, length equals the device's declared switch count
    pub switches: Vec<bool>,

    /// Regulator levels, length equals the device's declared regulator count
    pub regulators: Vec<u8>,

    /// When a channel value last changed
    pub last_changed: DateTime<Utc>,
}

impl ChannelState {
    fn new(switch_count: usize, regulator_count: usize) -> Self {
        Self {
            switches: vec![false; switch_count],
            regulators: vec![0; regulator_count],
            last_changed: Utc::now(),
        }
    }
}

/// The switch state store
///
/// Thread-safe; every mutation that changes a value fires a typed event on
/// the bus for the device-transport collaborator. Writing the current value
/// again succeeds but stays silent; there is nothing for the transport to
/// forward.
pub struct SwitchStore {
    /// Channel state keyed by device id
    states: DashMap<DeviceId, ChannelState>,
    /// Event bus for firing channel change events
    event_bus: Arc<EventBus>,
    /// Upper bound regulator levels are clamped to
    regulator_max: u8,
}

impl SwitchStore {
    /// Create a new store with the default regulator range (0..=6)
    pub fn new(event_bus: Arc<EventBus>) -> Self {
        Self::with_regulator_max(event_bus, DEFAULT_REGULATOR_MAX)
    }

    /// Create a new store with a custom regulator upper bound
    pub fn with_regulator_max(event_bus: Arc<EventBus>, regulator_max: u8) -> Self {
        Self {
            states: DashMap::new(),
            event_bus,
            regulator_max,
        }
    }

    /// Seed the channel entry for a freshly registered device
    ///
    /// All switches start off, all regulators at level 0.
    pub fn insert_device(&self, device: DeviceId, switch_count: usize, regulator_count: usize) {
        trace!(device = %device, switch_count, regulator_count, "Seeding channel state");
        self.states
            .insert(device, ChannelState::new(switch_count, regulator_count));
    }

    /// Drop the channel entry of a removed device
    pub fn remove_device(&self, device: DeviceId) -> Option<ChannelState> {
        self.states.remove(&device).map(|(_, state)| state)
    }

    /// Set one switch to an explicit value
    ///
    /// Fires a `switch_changed` event when the value actually changed.
    #[instrument(skip(self, context), fields(device = %device))]
    pub fn set_switch(
        &self,
        device: DeviceId,
        index: usize,
        value: bool,
        context: &Context,
    ) -> StateResult<SwitchChangedData> {
        let mut entry = self
            .states
            .get_mut(&device)
            .ok_or(StateError::NotFound(device))?;

        let count = entry.switches.len();
        let slot = entry
            .switches
            .get_mut(index)
            .ok_or(StateError::IndexOutOfRange {
                device,
                kind: ChannelKind::Switch,
                index,
                count,
            })?;

        let old_value = *slot;
        *slot = value;

        let change = SwitchChangedData {
            device,
            index,
            old_value,
            new_value: value,
        };

        if old_value != value {
            entry.last_changed = Utc::now();
            drop(entry);
            debug!(index, value, "Switch changed");
            self.event_bus.fire_typed(change.clone(), context.clone());
        }

        Ok(change)
    }

    /// Flip one switch
    pub fn toggle_switch(
        &self,
        device: DeviceId,
        index: usize,
        context: &Context,
    ) -> StateResult<SwitchChangedData> {
        let current = self.switch(device, index)?;
        self.set_switch(device, index, !current, context)
    }

    /// Set one regulator level, clamped to the configured range
    ///
    /// Fires a `regulator_changed` event when the (clamped) level changed.
    #[instrument(skip(self, context), fields(device = %device))]
    pub fn set_regulator(
        &self,
        device: DeviceId,
        index: usize,
        level: u8,
        context: &Context,
    ) -> StateResult<RegulatorChangedData> {
        let level = level.min(self.regulator_max);

        let mut entry = self
            .states
            .get_mut(&device)
            .ok_or(StateError::NotFound(device))?;

        let count = entry.regulators.len();
        let slot = entry
            .regulators
            .get_mut(index)
            .ok_or(StateError::IndexOutOfRange {
                device,
                kind: ChannelKind::Regulator,
                index,
                count,
            })?;

        let old_level = *slot;
        *slot = level;

        let change = RegulatorChangedData {
            device,
            index,
            old_level,
            new_level: level,
        };

        if old_level != level {
            entry.last_changed = Utc::now();
            drop(entry);
            debug!(index, level, "Regulator changed");
            self.event_bus.fire_typed(change.clone(), context.clone());
        }

        Ok(change)
    }

    /// Read one switch value
    pub fn switch(&self, device: DeviceId, index: usize) -> StateResult<bool> {
        let entry = self
            .states
            .get(&device)
            .ok_or(StateError::NotFound(device))?;
        entry
            .switches
            .get(index)
            .copied()
            .ok_or(StateError::IndexOutOfRange {
                device,
                kind: ChannelKind::Switch,
                index,
                count: entry.switches.len(),
            })
    }

    /// Read one regulator level
    pub fn regulator(&self, device: DeviceId, index: usize) -> StateResult<u8> {
        let entry = self
            .states
            .get(&device)
            .ok_or(StateError::NotFound(device))?;
        entry
            .regulators
            .get(index)
            .copied()
            .ok_or(StateError::IndexOutOfRange {
                device,
                kind: ChannelKind::Regulator,
                index,
                count: entry.regulators.len(),
            })
    }

    /// Get the full channel state of one device
    pub fn channels(&self, device: DeviceId) -> Option<ChannelState> {
        self.states.get(&device).map(|r| r.value().clone())
    }

    /// Snapshot all channel states
    pub fn all(&self) -> Vec<(DeviceId, ChannelState)> {
        self.states
            .iter()
            .map(|r| (*r.key(), r.value().clone()))
            .collect()
    }

    /// Number of devices with channel state
    pub fn len(&self) -> usize {
        self.states.len()
    }

    /// Check if the store is empty
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hexa_core::events::SWITCH_CHANGED;

    fn make_store() -> (Arc<EventBus>, SwitchStore) {
        let bus = Arc::new(EventBus::new());
        let store = SwitchStore::new(bus.clone());
        (bus, store)
    }

    #[test]
    fn test_seed_and_channel_invariant() {
        let (_, store) = make_store();
        store.insert_device(DeviceId::new(1), 3, 1);

        let channels = store.channels(DeviceId::new(1)).unwrap();
        assert_eq!(channels.switches, vec![false, false, false]);
        assert_eq!(channels.regulators, vec![0]);
    }

    #[test]
    fn test_set_and_toggle_switch() {
        let (_, store) = make_store();
        let id = DeviceId::new(1);
        store.insert_device(id, 2, 0);

        let change = store.set_switch(id, 1, true, &Context::new()).unwrap();
        assert!(!change.old_value);
        assert!(change.new_value);
        assert!(store.switch(id, 1).unwrap());

        let change = store.toggle_switch(id, 1, &Context::new()).unwrap();
        assert!(!change.new_value);
        assert!(!store.switch(id, 1).unwrap());
    }

    #[test]
    fn test_unknown_device_fails() {
        let (_, store) = make_store();
        assert_eq!(
            store
                .set_switch(DeviceId::new(9), 0, true, &Context::new())
                .unwrap_err(),
            StateError::NotFound(DeviceId::new(9))
        );
    }

    #[test]
    fn test_out_of_range_index_fails() {
        let (_, store) = make_store();
        let id = DeviceId::new(1);
        store.insert_device(id, 2, 1);

        let err = store.set_switch(id, 2, true, &Context::new()).unwrap_err();
        assert_eq!(
            err,
            StateError::IndexOutOfRange {
                device: id,
                kind: ChannelKind::Switch,
                index: 2,
                count: 2,
            }
        );

        let err = store.set_regulator(id, 1, 3, &Context::new()).unwrap_err();
        assert_eq!(
            err,
            StateError::IndexOutOfRange {
                device: id,
                kind: ChannelKind::Regulator,
                index: 1,
                count: 1,
            }
        );

        // Failed writes leave state untouched.
        let channels = store.channels(id).unwrap();
        assert_eq!(channels.switches, vec![false, false]);
        assert_eq!(channels.regulators, vec![0]);
    }

    #[test]
    fn test_regulator_clamped_to_range() {
        let (_, store) = make_store();
        let id = DeviceId::new(1);
        store.insert_device(id, 1, 1);

        let change = store.set_regulator(id, 0, 200, &Context::new()).unwrap();
        assert_eq!(change.new_level, DEFAULT_REGULATOR_MAX);
        assert_eq!(store.regulator(id, 0).unwrap(), DEFAULT_REGULATOR_MAX);
    }

    #[tokio::test]
    async fn test_change_event_fired_once() {
        let (bus, store) = make_store();
        let id = DeviceId::new(4);
        store.insert_device(id, 1, 0);

        let mut rx = bus.subscribe(SWITCH_CHANGED);

        store.set_switch(id, 0, true, &Context::new()).unwrap();
        // Same value again: no second event.
        store.set_switch(id, 0, true, &Context::new()).unwrap();

        let event = rx.recv().await.unwrap();
        assert_eq!(event.data["device"], 4);
        assert_eq!(event.data["new_value"], true);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_remove_device_drops_state() {
        let (_, store) = make_store();
        let id = DeviceId::new(1);
        store.insert_device(id, 1, 0);

        assert!(store.remove_device(id).is_some());
        assert!(store.channels(id).is_none());
        assert_eq!(
            store.switch(id, 0).unwrap_err(),
            StateError::NotFound(id)
        );
    }
}
