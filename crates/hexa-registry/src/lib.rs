//! Device Registry
//!
//! Tracks all registered devices and their channel topology. The registry is
//! the source of truth for which (device, switch index) pairs are valid;
//! every other component holds references and resolves them here. Channel
//! counts are fixed for a device's lifetime; changing topology means
//! removing and re-registering the device.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use hexa_core::{DeviceId, SwitchRef};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

/// Errors raised by registry operations
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("device already registered: {0}")]
    Duplicate(DeviceId),

    #[error("device not found: {0}")]
    NotFound(DeviceId),
}

/// Result type for registry operations
pub type RegistryResult<T> = Result<T, RegistryError>;

/// Descriptor supplied when registering a device
///
/// Produced by manual setup or scanned provisioning; the channel counts
/// come from the hardware's advertised topology.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceDescriptor {
    /// Device id carried in the provisioning payload
    pub id: DeviceId,

    /// Hardware model label (e.g. "3-channel")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Number of switch channels
    pub switch_count: usize,

    /// Number of regulator channels
    pub regulator_count: usize,
}

/// A registered device entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceEntry {
    /// Device id
    pub id: DeviceId,

    /// Editable card name shown on the device card
    pub name: String,

    /// Hardware model label (e.g. "3-channel")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Number of switch channels, fixed at registration
    pub switch_count: usize,

    /// Number of regulator channels, fixed at registration
    pub regulator_count: usize,

    /// Registration timestamp
    pub created_at: DateTime<Utc>,

    /// Last modified timestamp (rename)
    pub modified_at: DateTime<Utc>,
}

impl DeviceEntry {
    fn new(descriptor: DeviceDescriptor) -> Self {
        let now = Utc::now();
        Self {
            name: format!("Device {}", descriptor.id),
            id: descriptor.id,
            model: descriptor.model,
            switch_count: descriptor.switch_count,
            regulator_count: descriptor.regulator_count,
            created_at: now,
            modified_at: now,
        }
    }
}

/// Device Registry
///
/// Entries are stored as `Arc<DeviceEntry>` to avoid cloning on reads.
pub struct DeviceRegistry {
    devices: DashMap<DeviceId, Arc<DeviceEntry>>,
}

impl DeviceRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            devices: DashMap::new(),
        }
    }

    /// Register a device from its descriptor
    ///
    /// Assigns the default card name. Fails with [`RegistryError::Duplicate`]
    /// if the id is already registered, leaving prior state unchanged.
    pub fn register(&self, descriptor: DeviceDescriptor) -> RegistryResult<Arc<DeviceEntry>> {
        let id = descriptor.id;
        match self.devices.entry(id) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(RegistryError::Duplicate(id)),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                let entry = Arc::new(DeviceEntry::new(descriptor));
                info!(
                    device = %id,
                    switches = entry.switch_count,
                    regulators = entry.regulator_count,
                    "Registered device"
                );
                slot.insert(Arc::clone(&entry));
                Ok(entry)
            }
        }
    }

    /// Remove a device, returning its entry
    ///
    /// Fails with [`RegistryError::NotFound`] if unknown.
    pub fn remove(&self, id: DeviceId) -> RegistryResult<Arc<DeviceEntry>> {
        let (_, entry) = self
            .devices
            .remove(&id)
            .ok_or(RegistryError::NotFound(id))?;
        info!(device = %id, "Removed device");
        Ok(entry)
    }

    /// Rename a device's card
    ///
    /// Updates only the display name; topology is untouched.
    pub fn rename(&self, id: DeviceId, name: impl Into<String>) -> RegistryResult<Arc<DeviceEntry>> {
        let mut slot = self
            .devices
            .get_mut(&id)
            .ok_or(RegistryError::NotFound(id))?;

        let mut entry = (**slot).clone();
        entry.name = name.into();
        entry.modified_at = Utc::now();
        debug!(device = %id, name = %entry.name, "Renamed device card");

        let entry = Arc::new(entry);
        *slot = Arc::clone(&entry);
        Ok(entry)
    }

    /// Get a device entry by id
    ///
    /// Returns an `Arc<DeviceEntry>` - cheap to clone.
    pub fn get(&self, id: DeviceId) -> Option<Arc<DeviceEntry>> {
        self.devices.get(&id).map(|r| Arc::clone(r.value()))
    }

    /// Check whether a switch reference resolves to a real channel
    pub fn resolves(&self, sref: SwitchRef) -> bool {
        self.devices
            .get(&sref.device)
            .map(|entry| sref.index < entry.switch_count)
            .unwrap_or(false)
    }

    /// Get the number of registered devices
    pub fn len(&self) -> usize {
        self.devices.len()
    }

    /// Check if the registry is empty
    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Iterate over all device entries
    ///
    /// Returns `Arc<DeviceEntry>` references - cheap to clone.
    pub fn iter(&self) -> impl Iterator<Item = Arc<DeviceEntry>> + '_ {
        self.devices.iter().map(|r| Arc::clone(r.value()))
    }
}

impl Default for DeviceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(id: u32, switches: usize, regulators: usize) -> DeviceDescriptor {
        DeviceDescriptor {
            id: DeviceId::new(id),
            model: Some(format!("{}-channel", switches)),
            switch_count: switches,
            regulator_count: regulators,
        }
    }

    #[test]
    fn test_register_assigns_default_card_name() {
        let registry = DeviceRegistry::new();
        let entry = registry.register(descriptor(1, 3, 1)).unwrap();

        assert_eq!(entry.name, "Device 1");
        assert_eq!(entry.model.as_deref(), Some("3-channel"));
        assert_eq!(entry.switch_count, 3);
        assert_eq!(entry.regulator_count, 1);
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let registry = DeviceRegistry::new();
        registry.register(descriptor(1, 3, 1)).unwrap();
        registry.rename(DeviceId::new(1), "Hallway").unwrap();

        let err = registry.register(descriptor(1, 5, 2)).unwrap_err();
        assert_eq!(err, RegistryError::Duplicate(DeviceId::new(1)));

        // Prior state unchanged.
        let entry = registry.get(DeviceId::new(1)).unwrap();
        assert_eq!(entry.name, "Hallway");
        assert_eq!(entry.switch_count, 3);
    }

    #[test]
    fn test_remove_unknown_fails() {
        let registry = DeviceRegistry::new();
        assert_eq!(
            registry.remove(DeviceId::new(9)).unwrap_err(),
            RegistryError::NotFound(DeviceId::new(9))
        );
    }

    #[test]
    fn test_rename_updates_only_name() {
        let registry = DeviceRegistry::new();
        let before = registry.register(descriptor(2, 5, 2)).unwrap();
        let after = registry.rename(DeviceId::new(2), "Bedroom Fan").unwrap();

        assert_eq!(after.name, "Bedroom Fan");
        assert_eq!(after.switch_count, before.switch_count);
        assert_eq!(after.created_at, before.created_at);
        assert!(after.modified_at >= before.modified_at);
    }

    #[test]
    fn test_rename_unknown_fails() {
        let registry = DeviceRegistry::new();
        assert_eq!(
            registry.rename(DeviceId::new(3), "x").unwrap_err(),
            RegistryError::NotFound(DeviceId::new(3))
        );
    }

    #[test]
    fn test_resolves() {
        let registry = DeviceRegistry::new();
        registry.register(descriptor(1, 3, 0)).unwrap();

        assert!(registry.resolves(SwitchRef::new(1, 0)));
        assert!(registry.resolves(SwitchRef::new(1, 2)));
        assert!(!registry.resolves(SwitchRef::new(1, 3)));
        assert!(!registry.resolves(SwitchRef::new(2, 0)));
    }
}
