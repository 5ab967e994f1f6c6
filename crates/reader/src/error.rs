//! Reader error types
//!
//! None of these reach the press consumer: they are logged by the session or
//! discovery thread that hit them, or returned from explicit facade calls.

use protocol::{DeviceKey, TransportError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BuzzerError {
    /// Interface claim or kernel driver detach failed; the session never starts
    #[error("Failed to open buzzer {key}: {source}")]
    OpenFailed {
        key: DeviceKey,
        #[source]
        source: TransportError,
    },

    /// Control transfer for the logical id failed; the press is dropped
    #[error("Failed to resolve logical id of buzzer {key}: {source}")]
    IdResolutionFailed {
        key: DeviceKey,
        #[source]
        source: TransportError,
    },

    /// Handle invalidated mid-operation
    #[error("Buzzer {key} vanished")]
    DeviceVanished { key: DeviceKey },

    /// Transient transfer failure (timeout, stall, ...)
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Event-driven discovery could not be set up
    #[error("Hot-plug unavailable: {0}")]
    HotplugUnavailable(String),

    /// Id 0 is the firmware's "get" request and cannot be programmed
    #[error("Invalid logical id {0}: must be 1-255")]
    InvalidLogicalId(u8),

    #[error("No buzzer attached at {0}")]
    UnknownDevice(DeviceKey),

    #[error("Buzzer reader already running")]
    AlreadyRunning,

    #[error("USB backend error: {0}")]
    Backend(String),

    #[error("Failed to spawn thread: {0}")]
    Spawn(#[from] std::io::Error),
}

impl BuzzerError {
    /// Classify a transport failure during id resolution
    pub(crate) fn id_resolution(key: DeviceKey, source: TransportError) -> Self {
        if source.is_vanished() {
            BuzzerError::DeviceVanished { key }
        } else {
            BuzzerError::IdResolutionFailed { key, source }
        }
    }
}

pub type Result<T> = std::result::Result<T, BuzzerError>;
