//! Buzzer wire constants and control transfer layout
//!
//! All compliant buzzers run the same V-USB firmware and therefore share a
//! vendor/product pair. A press is announced by a single marker byte on
//! interrupt endpoint 1; the logical id lives in device EEPROM and is accessed
//! through one vendor IN request whose `wValue` selects get (0) or set (id).

use std::time::Duration;

/// Shared V-USB vendor id used by every buzzer
pub const BUZZER_VENDOR_ID: u16 = 0x16C0;

/// Shared V-USB product id used by every buzzer
pub const BUZZER_PRODUCT_ID: u16 = 0x05DC;

/// Byte sent on the interrupt endpoint when the button is pressed
pub const BUZZER_MAGIC_MARKER: u8 = 0xA5;

/// Interface claimed on open
pub const BUZZER_INTERFACE: u8 = 0;

/// Interrupt IN endpoint (endpoint 1, device-to-host)
pub const INTERRUPT_ENDPOINT: u8 = 0x81;

/// Upper bound for a single interrupt read or control transfer
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(250);

/// Timeout for the discarding read issued by a flush
pub const FLUSH_TIMEOUT: Duration = Duration::from_millis(20);

/// bmRequestType bits
const REQUEST_TYPE_VENDOR: u8 = 0x40;
const RECIPIENT_DEVICE: u8 = 0x00;
const ENDPOINT_IN: u8 = 0x80;

/// Vendor control request addressed to the buzzer firmware
///
/// Both directions of the id exchange use the same IN transfer with a one
/// byte response; the firmware treats `value == 0` as "get" and any other
/// value as "program this id".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlRequest {
    pub request_type: u8,
    pub request: u8,
    pub value: u16,
    pub index: u16,
    pub length: u16,
}

impl ControlRequest {
    /// Request that reads the currently programmed logical id
    pub const fn get_id() -> Self {
        Self::with_value(0)
    }

    /// Request that programs a new logical id
    pub const fn set_id(id: u8) -> Self {
        Self::with_value(id as u16)
    }

    /// Request carrying an arbitrary `wValue`
    pub const fn with_value(value: u16) -> Self {
        Self {
            request_type: REQUEST_TYPE_VENDOR | RECIPIENT_DEVICE | ENDPOINT_IN,
            request: 0,
            value,
            index: 0,
            length: 1,
        }
    }

    /// Whether the request reads data from the device
    pub const fn is_in(&self) -> bool {
        self.request_type & ENDPOINT_IN != 0
    }
}

/// Returns true if an interrupt byte signals a button press
///
/// Anything else is a stale partial read and must be ignored rather than
/// treated as a protocol failure.
pub fn is_press_marker(byte: u8) -> bool {
    byte == BUZZER_MAGIC_MARKER
}
