//! USB quiz buzzer reader
//!
//! Discovers buzzers on the USB bus, reads their press reports, resolves
//! each press to the buzzer's logical id and delivers debounced presses to
//! one consumer callback.
//!
//! ```no_run
//! use reader::{BuzzerReader, ReaderConfig};
//!
//! let mut reader = BuzzerReader::open(ReaderConfig::default())?;
//! reader.register(|id| println!("buzzer {} pressed", id));
//! reader.start()?;
//! // ...
//! reader.stop();
//! # Ok::<(), reader::BuzzerError>(())
//! ```

pub mod admin;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod reader;
pub mod usb;

pub use admin::{ProbedDevice, probe_devices, program_logical_id};
pub use config::{ReaderConfig, load_config};
pub use dispatcher::Dispatcher;
pub use error::{BuzzerError, Result};
pub use reader::{BuzzerReader, PressCallback};
pub use usb::{DeviceStatus, DiscoveryMode, SessionState};
