//! rusb-backed buzzer transport
//!
//! Wraps a claimed `rusb::DeviceHandle` for one buzzer and the `rusb::Context`
//! used to enumerate buzzers and receive hot-plug notifications.

use async_channel::Sender;
use common::{HotplugEvent, Transport, UsbBackend};
use protocol::{
    BUZZER_INTERFACE, ControlRequest, DEFAULT_READ_TIMEOUT, DeviceKey, INTERRUPT_ENDPOINT,
    TransportError,
};
use rusb::{Context, Device, DeviceHandle, Hotplug, HotplugBuilder, Registration, UsbContext};
use std::time::Duration;
use tracing::{debug, warn};

/// Claimed connection to one buzzer
pub struct RusbTransport {
    handle: DeviceHandle<Context>,
    key: DeviceKey,
    /// Whether we detached a kernel driver that should be given back on close
    detached_driver: bool,
}

impl RusbTransport {
    /// Open the device and claim the buzzer interface
    ///
    /// On Linux the HID driver may have bound to the interface; it is
    /// detached first, otherwise the claim fails with `Busy`.
    pub fn open(device: &Device<Context>) -> Result<Self, TransportError> {
        let key = DeviceKey::new(device.bus_number(), device.address());

        let handle = device.open().map_err(|e| {
            warn!("Failed to open buzzer {}: {}", key, e);
            map_rusb_error(e)
        })?;

        let detached_driver = detach_kernel_driver(&handle, key);

        if let Err(e) = handle.claim_interface(BUZZER_INTERFACE) {
            warn!(
                "Failed to claim interface {} on buzzer {}: {}",
                BUZZER_INTERFACE, key, e
            );
            return Err(map_rusb_error(e));
        }

        debug!("Opened buzzer {} (interface {} claimed)", key, BUZZER_INTERFACE);

        Ok(Self {
            handle,
            key,
            detached_driver,
        })
    }

    pub fn key(&self) -> DeviceKey {
        self.key
    }
}

#[cfg(target_os = "linux")]
fn detach_kernel_driver(handle: &DeviceHandle<Context>, key: DeviceKey) -> bool {
    match handle.kernel_driver_active(BUZZER_INTERFACE) {
        Ok(true) => {
            debug!(
                "Detaching kernel driver from interface {} on buzzer {}",
                BUZZER_INTERFACE, key
            );
            match handle.detach_kernel_driver(BUZZER_INTERFACE) {
                Ok(()) => true,
                Err(e) => {
                    // The claim below will report the real failure
                    warn!("Failed to detach kernel driver on buzzer {}: {}", key, e);
                    false
                }
            }
        }
        Ok(false) => false,
        Err(e) => {
            debug!(
                "Could not check kernel driver status on buzzer {}: {}",
                key, e
            );
            false
        }
    }
}

#[cfg(not(target_os = "linux"))]
fn detach_kernel_driver(_handle: &DeviceHandle<Context>, _key: DeviceKey) -> bool {
    false
}

impl Transport for RusbTransport {
    fn read_byte(&self, timeout: Duration) -> Result<u8, TransportError> {
        let mut buf = [0u8; 1];
        match self.handle.read_interrupt(INTERRUPT_ENDPOINT, &mut buf, timeout) {
            Ok(0) => Err(TransportError::ShortRead),
            Ok(_) => Ok(buf[0]),
            Err(e) => Err(map_rusb_error(e)),
        }
    }

    fn control_read(&self, value: u16) -> Result<u8, TransportError> {
        let req = ControlRequest::with_value(value);
        let mut buf = [0u8; 1];

        match self.handle.read_control(
            req.request_type,
            req.request,
            req.value,
            req.index,
            &mut buf,
            DEFAULT_READ_TIMEOUT,
        ) {
            Ok(0) => Err(TransportError::ShortRead),
            Ok(_) => Ok(buf[0]),
            Err(e) => Err(map_rusb_error(e)),
        }
    }

    /// Release the interface; the handle itself closes when dropped
    fn close(&self) {
        if let Err(e) = self.handle.release_interface(BUZZER_INTERFACE) {
            // Expected when the buzzer was unplugged
            debug!("Could not release interface on buzzer {}: {}", self.key, e);
        }

        if self.detached_driver {
            if let Err(e) = self.handle.attach_kernel_driver(BUZZER_INTERFACE) {
                debug!("Could not reattach kernel driver on buzzer {}: {}", self.key, e);
            } else {
                debug!("Reattached kernel driver on buzzer {}", self.key);
            }
        }

        debug!("Closed buzzer {}", self.key);
    }
}

/// Bus access through libusb
pub struct RusbBackend {
    context: Context,
    vendor_id: u16,
    product_id: u16,
}

impl RusbBackend {
    /// Create a libusb context filtering on the given VID/PID
    pub fn new(vendor_id: u16, product_id: u16) -> Result<Self, rusb::Error> {
        let context = Context::new()?;
        Ok(Self {
            context,
            vendor_id,
            product_id,
        })
    }

    fn matches(&self, device: &Device<Context>) -> bool {
        device
            .device_descriptor()
            .map(|d| d.vendor_id() == self.vendor_id && d.product_id() == self.product_id)
            .unwrap_or(false)
    }
}

impl UsbBackend for RusbBackend {
    type Device = Device<Context>;
    type Transport = RusbTransport;
    type Registration = Registration<Context>;

    fn device_key(&self, device: &Device<Context>) -> DeviceKey {
        DeviceKey::new(device.bus_number(), device.address())
    }

    fn enumerate(&self) -> Result<Vec<Device<Context>>, TransportError> {
        let devices = self.context.devices().map_err(map_rusb_error)?;
        Ok(devices.iter().filter(|d| self.matches(d)).collect())
    }

    fn open(&self, device: &Device<Context>) -> Result<RusbTransport, TransportError> {
        RusbTransport::open(device)
    }

    fn has_hotplug(&self) -> bool {
        rusb::has_hotplug()
    }

    fn register_hotplug(
        &self,
        events: Sender<HotplugEvent<Device<Context>>>,
    ) -> Result<Registration<Context>, TransportError> {
        let registration: Registration<Context> = HotplugBuilder::new()
            .vendor_id(self.vendor_id)
            .product_id(self.product_id)
            .enumerate(true)
            .register(&self.context, Box::new(HotplugForwarder { events }))
            .map_err(map_rusb_error)?;

        debug!(
            "Hot-plug callback registered for {:04x}:{:04x}",
            self.vendor_id, self.product_id
        );
        Ok(registration)
    }

    fn handle_events(&self, timeout: Duration) -> Result<(), TransportError> {
        self.context
            .handle_events(Some(timeout))
            .map_err(map_rusb_error)
    }
}

/// Hot-plug callback handler
///
/// libusb does not allow opening devices from inside the callback, so this
/// only forwards the notification to the discovery thread.
struct HotplugForwarder {
    events: Sender<HotplugEvent<Device<Context>>>,
}

impl Hotplug<Context> for HotplugForwarder {
    fn device_arrived(&mut self, device: Device<Context>) {
        debug!(
            "Hot-plug callback: buzzer arrived (bus={}, addr={})",
            device.bus_number(),
            device.address()
        );
        if let Err(e) = self.events.try_send(HotplugEvent::Arrived(device)) {
            warn!("Failed to forward arrival event: {}", e);
        }
    }

    fn device_left(&mut self, device: Device<Context>) {
        let key = DeviceKey::new(device.bus_number(), device.address());
        debug!("Hot-plug callback: buzzer {} left", key);
        if let Err(e) = self.events.try_send(HotplugEvent::Left(key)) {
            warn!("Failed to forward removal event: {}", e);
        }
    }
}

/// Map rusb::Error to protocol::TransportError
pub fn map_rusb_error(err: rusb::Error) -> TransportError {
    match err {
        rusb::Error::Timeout => TransportError::Timeout,
        rusb::Error::NoDevice => TransportError::NoDevice,
        rusb::Error::Access => TransportError::Access,
        rusb::Error::Busy => TransportError::Busy,
        _ => TransportError::Transfer(err.to_string()),
    }
}
