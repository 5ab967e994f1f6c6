//! Buzzer data types
//!
//! Plain value types shared between the reader threads, the dispatcher and
//! the consumer.

use crate::error::ParseKeyError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identity of one physical connection: `(bus, address)`
///
/// Stable while the device stays plugged in. The OS may hand the same pair to
/// a different device (or the same one) after a re-plug, so a key never
/// outlives the session it was created for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DeviceKey {
    /// USB bus number
    pub bus: u8,
    /// Device address on the bus
    pub address: u8,
}

impl DeviceKey {
    pub const fn new(bus: u8, address: u8) -> Self {
        Self { bus, address }
    }
}

impl fmt::Display for DeviceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:03}:{:03}", self.bus, self.address)
    }
}

impl FromStr for DeviceKey {
    type Err = ParseKeyError;

    /// Parses `BUS:ADDR` in decimal, e.g. `1:7` or `001:007`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (bus, address) = s
            .trim()
            .split_once(':')
            .ok_or_else(|| ParseKeyError(s.to_string()))?;

        let bus = bus.parse().map_err(|_| ParseKeyError(s.to_string()))?;
        let address = address.parse().map_err(|_| ParseKeyError(s.to_string()))?;

        Ok(Self { bus, address })
    }
}

/// Team/slot number programmed into a buzzer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LogicalId(pub u8);

impl fmt::Display for LogicalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u8> for LogicalId {
    fn from(id: u8) -> Self {
        Self(id)
    }
}

/// A resolved button press
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PressEvent {
    /// Connection the press was read from
    pub device: DeviceKey,
    /// Logical id the device reported at the time of the press
    pub logical_id: LogicalId,
}

impl PressEvent {
    pub const fn new(device: DeviceKey, logical_id: LogicalId) -> Self {
        Self { device, logical_id }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_key_display() {
        assert_eq!(DeviceKey::new(1, 7).to_string(), "001:007");
        assert_eq!(DeviceKey::new(255, 12).to_string(), "255:012");
    }

    #[test]
    fn test_device_key_parse() {
        assert_eq!("1:7".parse::<DeviceKey>().unwrap(), DeviceKey::new(1, 7));
        assert_eq!("003:042".parse::<DeviceKey>().unwrap(), DeviceKey::new(3, 42));
        assert!("17".parse::<DeviceKey>().is_err());
        assert!("1:300".parse::<DeviceKey>().is_err());
        assert!("a:b".parse::<DeviceKey>().is_err());
    }

    #[test]
    fn test_logical_id_is_transparent_in_json() {
        let json = serde_json::to_string(&LogicalId(4)).unwrap();
        assert_eq!(json, "4");
    }
}
