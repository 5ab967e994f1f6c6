//! Common utilities for the buzzer reader
//!
//! This crate provides the pieces shared between the reader library, its
//! binary and the test suites: error handling, logging setup, the press
//! channel bridge between reader threads and the consumer, the USB transport
//! abstractions, and an in-memory mock bus for tests.

pub mod channel;
pub mod error;
pub mod logging;
pub mod test_utils;
pub mod usb_types;

pub use channel::{DEFAULT_PRESS_CAPACITY, PressReceiver, PressSender, create_press_channel};
pub use error::{Error, Result};
pub use logging::setup_logging;
pub use usb_types::{HotplugEvent, Transport, UsbBackend};
