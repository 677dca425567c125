//! Device and switch addressing types

use serde::{Deserialize, Serialize};
use std::fmt;
use std::num::ParseIntError;
use std::str::FromStr;
use thiserror::Error;

/// Error type for invalid switch references
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SwitchRefError {
    #[error("switch reference must be of the form '<device>/<index>'")]
    InvalidFormat,

    #[error("invalid number in switch reference: {0}")]
    InvalidNumber(#[from] ParseIntError),
}

/// Identifier of a registered device
///
/// Device ids are small integers assigned at provisioning time (manual setup
/// uses fixed ids, scanned devices carry theirs in the QR payload). The id is
/// the key for channel state, timers, scene entries, and sensor selections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(pub u32);

impl DeviceId {
    /// Create a new device id
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    /// Get the numeric value
    pub fn value(&self) -> u32 {
        self.0
    }
}

impl From<u32> for DeviceId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

impl FromStr for DeviceId {
    type Err = ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse().map(Self)
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A (device, switch index) pair
///
/// This is the unit of addressing for everything that targets a single
/// switch channel: countdown timers, scene entries, and the sensor
/// automation's switch selection. Whether the pair resolves to a real
/// channel is decided by the registry at use time, not here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SwitchRef {
    /// The owning device
    pub device: DeviceId,

    /// Zero-based switch index on that device
    pub index: usize,
}

impl SwitchRef {
    /// Create a new switch reference
    pub fn new(device: impl Into<DeviceId>, index: usize) -> Self {
        Self {
            device: device.into(),
            index,
        }
    }
}

impl FromStr for SwitchRef {
    type Err = SwitchRefError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (device, index) = s.split_once('/').ok_or(SwitchRefError::InvalidFormat)?;
        Ok(Self {
            device: DeviceId(device.parse()?),
            index: index.parse()?,
        })
    }
}

impl fmt::Display for SwitchRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.device, self.index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_id_display_and_parse() {
        let id = DeviceId::new(7);
        assert_eq!(id.to_string(), "7");
        assert_eq!("7".parse::<DeviceId>().unwrap(), id);
    }

    #[test]
    fn test_switch_ref_display_and_parse() {
        let sref = SwitchRef::new(3, 1);
        assert_eq!(sref.to_string(), "3/1");
        assert_eq!("3/1".parse::<SwitchRef>().unwrap(), sref);
    }

    #[test]
    fn test_switch_ref_parse_errors() {
        assert_eq!(
            "31".parse::<SwitchRef>().unwrap_err(),
            SwitchRefError::InvalidFormat
        );
        assert!(matches!(
            "a/1".parse::<SwitchRef>().unwrap_err(),
            SwitchRefError::InvalidNumber(_)
        ));
    }

    #[test]
    fn test_device_id_serde_transparent() {
        let json = serde_json::to_string(&DeviceId::new(42)).unwrap();
        assert_eq!(json, "42");
        let parsed: DeviceId = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, DeviceId::new(42));
    }
}
