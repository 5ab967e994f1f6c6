//! Buzzer discovery strategies
//!
//! Discovery keeps the registry in sync with the bus. Two interchangeable
//! strategies exist: event-driven hot-plug (libusb notifications) and
//! fixed-interval polling for platforms where hot-plug is unsupported.
//! The strategy is chosen once at startup by [`select_discovery`].

use crate::error::{BuzzerError, Result};
use crate::usb::hotplug::HotplugDiscovery;
use crate::usb::poll::PollDiscovery;
use crate::usb::registry::DeviceRegistry;
use common::UsbBackend;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{error, info, warn};

/// Requested discovery strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiscoveryMode {
    /// Hot-plug if the platform supports it, polling otherwise
    #[default]
    Auto,
    /// Hot-plug; falls back to polling if unsupported
    Hotplug,
    /// Always poll
    Poll,
}

impl fmt::Display for DiscoveryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiscoveryMode::Auto => write!(f, "auto"),
            DiscoveryMode::Hotplug => write!(f, "hotplug"),
            DiscoveryMode::Poll => write!(f, "poll"),
        }
    }
}

/// A discovery loop running on the discovery thread
pub trait DeviceDiscovery<B: UsbBackend>: Send {
    /// Short strategy name for logs and status
    fn name(&self) -> &'static str;

    /// Run until `shutdown` is set
    fn run(&mut self, registry: &DeviceRegistry<B>, shutdown: &AtomicBool) -> Result<()>;
}

/// Pick the discovery strategy for this platform
pub fn select_discovery<B: UsbBackend>(
    backend: &B,
    mode: DiscoveryMode,
    poll_interval: Duration,
) -> Box<dyn DeviceDiscovery<B>> {
    match mode {
        DiscoveryMode::Poll => Box::new(PollDiscovery::new(poll_interval)),
        DiscoveryMode::Auto | DiscoveryMode::Hotplug if backend.has_hotplug() => {
            Box::new(HotplugDiscovery::default())
        }
        DiscoveryMode::Hotplug => {
            warn!("Hot-plug requested but not supported by libusb, polling instead");
            Box::new(PollDiscovery::new(poll_interval))
        }
        DiscoveryMode::Auto => Box::new(PollDiscovery::new(poll_interval)),
    }
}

/// Spawn the discovery thread
///
/// If hot-plug registration fails at runtime the thread continues with
/// polling.
pub fn spawn_discovery<B: UsbBackend>(
    mut strategy: Box<dyn DeviceDiscovery<B>>,
    registry: DeviceRegistry<B>,
    shutdown: Arc<AtomicBool>,
    poll_interval: Duration,
) -> Result<JoinHandle<()>> {
    let handle = std::thread::Builder::new()
        .name("buzzer-discovery".to_string())
        .spawn(move || {
            info!("Buzzer discovery started ({})", strategy.name());

            match strategy.run(&registry, &shutdown) {
                Ok(()) => {}
                Err(BuzzerError::HotplugUnavailable(reason)) => {
                    warn!("{}, polling instead", reason);
                    let mut poll = PollDiscovery::new(poll_interval);
                    if let Err(e) = poll.run(&registry, &shutdown) {
                        error!("Buzzer discovery stopped: {}", e);
                    }
                }
                Err(e) => error!("Buzzer discovery stopped: {}", e),
            }

            info!("Buzzer discovery stopped");
        })?;

    Ok(handle)
}
