//! Wire protocol for USB quiz buzzers
//!
//! This crate defines what a compliant buzzer looks like on the bus: the shared
//! vendor/product pair, the interrupt marker byte that signals a press, and the
//! vendor control transfer used to read and program the on-device logical id.
//! It also provides the plain data types passed between the reader threads and
//! the consumer.
//!
//! # Example
//!
//! ```
//! use protocol::{DeviceKey, LogicalId, PressEvent, is_press_marker};
//!
//! assert!(is_press_marker(0xA5));
//! assert!(!is_press_marker(0x00));
//!
//! let event = PressEvent::new(DeviceKey::new(1, 7), LogicalId(3));
//! assert_eq!(event.logical_id, LogicalId(3));
//! assert_eq!(event.device.to_string(), "001:007");
//! ```

pub mod error;
pub mod types;
pub mod wire;

pub use error::{ParseKeyError, TransportError};
pub use types::{DeviceKey, LogicalId, PressEvent};
pub use wire::{
    BUZZER_INTERFACE, BUZZER_MAGIC_MARKER, BUZZER_PRODUCT_ID, BUZZER_VENDOR_ID, ControlRequest,
    DEFAULT_READ_TIMEOUT, FLUSH_TIMEOUT, INTERRUPT_ENDPOINT, is_press_marker,
};
