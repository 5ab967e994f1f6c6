//! USB subsystem
//!
//! Owns everything that talks to buzzer hardware:
//! - Transport and backend over libusb (rusb)
//! - One reader session per connected buzzer
//! - The registry of live sessions
//! - Discovery by hot-plug notification or bus polling
//!
//! Every blocking USB call runs on a dedicated OS thread, never on the async
//! runtime.

pub mod discovery;
pub mod hotplug;
pub mod poll;
pub mod registry;
pub mod session;
pub mod transport;

// Re-export public types
pub use discovery::{DeviceDiscovery, DiscoveryMode, select_discovery, spawn_discovery};
pub use hotplug::HotplugDiscovery;
pub use poll::{PollDiscovery, ScanReport};
pub use registry::DeviceRegistry;
pub use session::{BuzzerSession, DeviceStatus, SessionState};
pub use transport::{RusbBackend, RusbTransport};
