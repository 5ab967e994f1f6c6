//! Transfer error types

use thiserror::Error;

/// Outcome of a failed transfer against a buzzer
///
/// Kept independent of the USB library so mock transports and the real one
/// report failures the same way.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// No data within the transfer timeout
    #[error("Transfer timed out")]
    Timeout,

    /// Device is gone (unplugged or reset)
    #[error("Device no longer attached")]
    NoDevice,

    /// Insufficient permissions to open or claim the device
    #[error("Access denied")]
    Access,

    /// Interface already claimed by another process or driver
    #[error("Device or interface busy")]
    Busy,

    /// Control transfer returned no payload
    #[error("Short read: expected 1 byte, got 0")]
    ShortRead,

    /// Any other libusb failure
    #[error("Transfer failed: {0}")]
    Transfer(String),
}

impl TransportError {
    /// Whether the error means the device has disappeared
    pub fn is_vanished(&self) -> bool {
        matches!(self, Self::NoDevice)
    }
}

/// Invalid `BUS:ADDR` string
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid device key '{0}', expected BUS:ADDR (e.g. 1:7)")]
pub struct ParseKeyError(pub String);
