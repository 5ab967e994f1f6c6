//! USB transport abstractions
//!
//! The reader is written against these traits rather than against libusb
//! directly: the real implementation lives in the reader crate on top of
//! `rusb`, and [`crate::test_utils::MockBackend`] provides an in-memory bus
//! for tests.

use async_channel::Sender;
use protocol::{DeviceKey, TransportError};
use std::time::Duration;

/// One claimed buzzer connection
///
/// All methods take `&self`: the reader thread and the owning session issue
/// transfers concurrently (e.g. a flush or id write while the reader is
/// blocked on the interrupt endpoint).
pub trait Transport: Send + Sync + 'static {
    /// Blocking read of one byte from the interrupt endpoint
    fn read_byte(&self, timeout: Duration) -> Result<u8, TransportError>;

    /// Vendor IN control transfer returning one byte
    ///
    /// `value == 0` reads the logical id, any other value programs it.
    fn control_read(&self, value: u16) -> Result<u8, TransportError>;

    /// Release the interface and close the handle
    ///
    /// Must tolerate a device that has already been unplugged.
    fn close(&self);
}

/// Hot-plug notification forwarded out of the USB event callback
#[derive(Debug, Clone)]
pub enum HotplugEvent<D> {
    /// A matching device was attached (or already present at registration)
    Arrived(D),
    /// A matching device was removed
    Left(DeviceKey),
}

/// Access to the bus: enumeration, opening and hot-plug notifications
pub trait UsbBackend: Send + Sync + 'static {
    /// Unopened device as reported by enumeration or hot-plug
    type Device: Send + 'static;
    /// Open connection produced by [`UsbBackend::open`]
    type Transport: Transport;
    /// Guard keeping the hot-plug callback registered while alive
    type Registration;

    /// Identity key of an unopened device
    fn device_key(&self, device: &Self::Device) -> DeviceKey;

    /// List all attached devices matching the buzzer filter
    fn enumerate(&self) -> Result<Vec<Self::Device>, TransportError>;

    /// Open a device and claim the buzzer interface
    fn open(&self, device: &Self::Device) -> Result<Self::Transport, TransportError>;

    /// Whether event-driven hot-plug is supported on this platform
    fn has_hotplug(&self) -> bool;

    /// Register for arrival/removal notifications
    ///
    /// Devices already attached are reported as arrivals. Events are pushed
    /// into `events`; the callback itself must not open devices.
    fn register_hotplug(
        &self,
        events: Sender<HotplugEvent<Self::Device>>,
    ) -> Result<Self::Registration, TransportError>;

    /// Process pending USB events for at most `timeout`
    fn handle_events(&self, timeout: Duration) -> Result<(), TransportError>;
}
