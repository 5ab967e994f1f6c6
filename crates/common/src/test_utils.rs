//! Test utilities for the buzzer reader
//!
//! Provides an in-memory USB bus implementing [`UsbBackend`] so sessions,
//! discovery and the full reader can be exercised without hardware.
//!
//! # Example
//!
//! ```
//! use common::test_utils::MockBackend;
//! use common::{Transport, UsbBackend};
//! use protocol::DeviceKey;
//! use std::time::Duration;
//!
//! let backend = MockBackend::new();
//! let buzzer = backend.plug(DeviceKey::new(1, 4), 3);
//!
//! let devices = backend.enumerate().unwrap();
//! let transport = backend.open(&devices[0]).unwrap();
//!
//! buzzer.press();
//! assert_eq!(transport.read_byte(Duration::from_millis(10)).unwrap(), 0xA5);
//! assert_eq!(transport.control_read(0).unwrap(), 3);
//! ```

use crate::usb_types::{HotplugEvent, Transport, UsbBackend};
use async_channel::Sender;
use protocol::{BUZZER_MAGIC_MARKER, DeviceKey, TransportError};
use std::collections::{BTreeMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

/// Default test timeout (5 seconds)
pub const DEFAULT_TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Poll `predicate` until it returns true or `timeout` elapses
///
/// Returns the final value of the predicate.
pub fn wait_until(timeout: Duration, mut predicate: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if predicate() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
}

struct BuzzerState {
    logical_id: u8,
    pending: VecDeque<u8>,
    attached: bool,
    fail_control: bool,
}

/// Simulated buzzer firmware
pub struct MockBuzzer {
    key: DeviceKey,
    state: Mutex<BuzzerState>,
    ready: Condvar,
    id_reads: AtomicUsize,
    id_writes: AtomicUsize,
    closes: AtomicUsize,
}

impl MockBuzzer {
    /// Create a detached-from-bus buzzer with a programmed id
    pub fn new(key: DeviceKey, logical_id: u8) -> Arc<Self> {
        Arc::new(Self {
            key,
            state: Mutex::new(BuzzerState {
                logical_id,
                pending: VecDeque::new(),
                attached: true,
                fail_control: false,
            }),
            ready: Condvar::new(),
            id_reads: AtomicUsize::new(0),
            id_writes: AtomicUsize::new(0),
            closes: AtomicUsize::new(0),
        })
    }

    pub fn key(&self) -> DeviceKey {
        self.key
    }

    /// Queue a press marker on the interrupt endpoint
    pub fn press(&self) {
        self.push_byte(BUZZER_MAGIC_MARKER);
    }

    /// Queue an arbitrary interrupt byte
    pub fn push_byte(&self, byte: u8) {
        self.state.lock().unwrap().pending.push_back(byte);
        self.ready.notify_all();
    }

    /// Interrupt bytes not yet read
    pub fn pending(&self) -> usize {
        self.state.lock().unwrap().pending.len()
    }

    /// Id currently stored in firmware
    pub fn logical_id(&self) -> u8 {
        self.state.lock().unwrap().logical_id
    }

    /// Change the stored id without going through a transport
    pub fn set_firmware_id(&self, logical_id: u8) {
        self.state.lock().unwrap().logical_id = logical_id;
    }

    /// Make every control transfer fail with a stall
    pub fn fail_control(&self, fail: bool) {
        self.state.lock().unwrap().fail_control = fail;
    }

    /// Simulate physical removal: pending and future transfers fail
    pub fn detach(&self) {
        self.state.lock().unwrap().attached = false;
        self.ready.notify_all();
    }

    pub fn is_attached(&self) -> bool {
        self.state.lock().unwrap().attached
    }

    /// Number of successful "get id" control transfers
    pub fn id_reads(&self) -> usize {
        self.id_reads.load(Ordering::SeqCst)
    }

    /// Number of successful "set id" control transfers
    pub fn id_writes(&self) -> usize {
        self.id_writes.load(Ordering::SeqCst)
    }

    /// Number of times a transport to this buzzer was closed
    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

/// Open connection to a [`MockBuzzer`]
pub struct MockTransport {
    buzzer: Arc<MockBuzzer>,
}

impl Transport for MockTransport {
    fn read_byte(&self, timeout: Duration) -> Result<u8, TransportError> {
        let deadline = Instant::now() + timeout;
        let mut state = self.buzzer.state.lock().unwrap();

        loop {
            if !state.attached {
                return Err(TransportError::NoDevice);
            }
            if let Some(byte) = state.pending.pop_front() {
                return Ok(byte);
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(TransportError::Timeout);
            }
            state = self.buzzer.ready.wait_timeout(state, remaining).unwrap().0;
        }
    }

    fn control_read(&self, value: u16) -> Result<u8, TransportError> {
        let mut state = self.buzzer.state.lock().unwrap();

        if !state.attached {
            return Err(TransportError::NoDevice);
        }
        if state.fail_control {
            return Err(TransportError::Transfer("Pipe error".to_string()));
        }

        if value == 0 {
            self.buzzer.id_reads.fetch_add(1, Ordering::SeqCst);
        } else {
            state.logical_id = value as u8;
            self.buzzer.id_writes.fetch_add(1, Ordering::SeqCst);
        }
        Ok(state.logical_id)
    }

    fn close(&self) {
        self.buzzer.closes.fetch_add(1, Ordering::SeqCst);
    }
}

/// Unopened device on the mock bus
#[derive(Clone)]
pub struct MockDevice {
    buzzer: Arc<MockBuzzer>,
}

impl MockDevice {
    pub fn buzzer(&self) -> &Arc<MockBuzzer> {
        &self.buzzer
    }
}

/// Keeps a mock hot-plug subscription alive
pub struct MockRegistration;

struct BusState {
    devices: BTreeMap<DeviceKey, Arc<MockBuzzer>>,
    hotplug: Option<Sender<HotplugEvent<MockDevice>>>,
    failing_opens: HashSet<DeviceKey>,
}

/// In-memory USB bus
pub struct MockBackend {
    bus: Mutex<BusState>,
    hotplug_supported: bool,
    opens: AtomicUsize,
    enumerations: AtomicUsize,
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBackend {
    /// Bus without hot-plug support (forces polling)
    pub fn new() -> Self {
        Self::build(false)
    }

    /// Bus with hot-plug support
    pub fn with_hotplug() -> Self {
        Self::build(true)
    }

    fn build(hotplug_supported: bool) -> Self {
        Self {
            bus: Mutex::new(BusState {
                devices: BTreeMap::new(),
                hotplug: None,
                failing_opens: HashSet::new(),
            }),
            hotplug_supported,
            opens: AtomicUsize::new(0),
            enumerations: AtomicUsize::new(0),
        }
    }

    /// Attach a fresh buzzer at `key`
    ///
    /// A buzzer already at that key is detached first, as if the OS reused
    /// the address.
    pub fn plug(&self, key: DeviceKey, logical_id: u8) -> Arc<MockBuzzer> {
        let buzzer = MockBuzzer::new(key, logical_id);
        let mut bus = self.bus.lock().unwrap();

        if let Some(old) = bus.devices.insert(key, Arc::clone(&buzzer)) {
            old.detach();
        }
        if let Some(tx) = &bus.hotplug {
            let _ = tx.try_send(HotplugEvent::Arrived(MockDevice {
                buzzer: Arc::clone(&buzzer),
            }));
        }
        buzzer
    }

    /// Remove the buzzer at `key`
    pub fn unplug(&self, key: DeviceKey) -> Option<Arc<MockBuzzer>> {
        let mut bus = self.bus.lock().unwrap();
        let buzzer = bus.devices.remove(&key)?;
        buzzer.detach();

        if let Some(tx) = &bus.hotplug {
            let _ = tx.try_send(HotplugEvent::Left(key));
        }
        Some(buzzer)
    }

    /// Make opening the device at `key` fail with an access error
    pub fn fail_open(&self, key: DeviceKey) {
        self.bus.lock().unwrap().failing_opens.insert(key);
    }

    /// Buzzer currently attached at `key`
    pub fn buzzer(&self, key: DeviceKey) -> Option<Arc<MockBuzzer>> {
        self.bus.lock().unwrap().devices.get(&key).cloned()
    }

    /// Successful opens so far
    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    /// Enumerations so far
    pub fn enumerations(&self) -> usize {
        self.enumerations.load(Ordering::SeqCst)
    }
}

impl UsbBackend for MockBackend {
    type Device = MockDevice;
    type Transport = MockTransport;
    type Registration = MockRegistration;

    fn device_key(&self, device: &MockDevice) -> DeviceKey {
        device.buzzer.key
    }

    fn enumerate(&self) -> Result<Vec<MockDevice>, TransportError> {
        self.enumerations.fetch_add(1, Ordering::SeqCst);
        let bus = self.bus.lock().unwrap();
        Ok(bus
            .devices
            .values()
            .map(|buzzer| MockDevice {
                buzzer: Arc::clone(buzzer),
            })
            .collect())
    }

    fn open(&self, device: &MockDevice) -> Result<MockTransport, TransportError> {
        if self.bus.lock().unwrap().failing_opens.contains(&device.buzzer.key) {
            return Err(TransportError::Access);
        }
        if !device.buzzer.is_attached() {
            return Err(TransportError::NoDevice);
        }
        self.opens.fetch_add(1, Ordering::SeqCst);
        Ok(MockTransport {
            buzzer: Arc::clone(&device.buzzer),
        })
    }

    fn has_hotplug(&self) -> bool {
        self.hotplug_supported
    }

    fn register_hotplug(
        &self,
        events: Sender<HotplugEvent<MockDevice>>,
    ) -> Result<MockRegistration, TransportError> {
        if !self.hotplug_supported {
            return Err(TransportError::Transfer(
                "Hot-plug not supported".to_string(),
            ));
        }

        let mut bus = self.bus.lock().unwrap();
        for buzzer in bus.devices.values() {
            let _ = events.try_send(HotplugEvent::Arrived(MockDevice {
                buzzer: Arc::clone(buzzer),
            }));
        }
        bus.hotplug = Some(events);
        Ok(MockRegistration)
    }

    fn handle_events(&self, timeout: Duration) -> Result<(), TransportError> {
        std::thread::sleep(timeout.min(Duration::from_millis(5)));
        Ok(())
    }
}
