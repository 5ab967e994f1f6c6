//! Event-driven discovery
//!
//! Registers a libusb hot-plug callback filtered on the buzzer VID/PID and
//! runs the USB event loop on the discovery thread. The callback only
//! forwards notifications; opening and closing sessions happens here, after
//! `handle_events` returns.

use crate::error::{BuzzerError, Result};
use crate::usb::discovery::DeviceDiscovery;
use crate::usb::registry::DeviceRegistry;
use common::{HotplugEvent, UsbBackend};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Upper bound for one `handle_events` call, so shutdown is noticed promptly
pub const HOTPLUG_TICK: Duration = Duration::from_millis(100);

pub struct HotplugDiscovery {
    tick: Duration,
}

impl Default for HotplugDiscovery {
    fn default() -> Self {
        Self { tick: HOTPLUG_TICK }
    }
}

impl HotplugDiscovery {
    pub fn new(tick: Duration) -> Self {
        Self { tick }
    }

    fn apply<B: UsbBackend>(registry: &DeviceRegistry<B>, event: HotplugEvent<B::Device>) {
        match event {
            HotplugEvent::Arrived(device) => {
                let key = registry.backend().device_key(&device);
                // A new arrival on a tracked key means the old connection is stale
                if registry.contains(key) {
                    debug!("Buzzer {} re-arrived, replacing stale session", key);
                    registry.detach(key);
                }
                registry.attach(&device);
            }
            HotplugEvent::Left(key) => {
                registry.detach(key);
            }
        }
    }
}

impl<B: UsbBackend> DeviceDiscovery<B> for HotplugDiscovery {
    fn name(&self) -> &'static str {
        "hotplug"
    }

    fn run(&mut self, registry: &DeviceRegistry<B>, shutdown: &AtomicBool) -> Result<()> {
        let backend = registry.backend().clone();
        let (tx, rx) = async_channel::unbounded();

        let _registration = backend
            .register_hotplug(tx)
            .map_err(|e| BuzzerError::HotplugUnavailable(e.to_string()))?;
        info!("Listening for buzzer hot-plug events");

        while !shutdown.load(Ordering::Acquire) {
            if let Err(e) = backend.handle_events(self.tick) {
                warn!("Error handling USB events: {}", e);
                std::thread::sleep(self.tick);
            }

            while let Ok(event) = rx.try_recv() {
                if shutdown.load(Ordering::Acquire) {
                    break;
                }
                Self::apply(registry, event);
            }

            registry.reap();
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::Dispatcher;
    use common::create_press_channel;
    use common::test_utils::{MockBackend, wait_until};
    use protocol::DeviceKey;
    use std::sync::Arc;

    const WAIT: Duration = Duration::from_secs(2);

    fn registry(backend: Arc<MockBackend>) -> DeviceRegistry<MockBackend> {
        let (tx, _rx) = create_press_channel(16);
        let dispatcher = Arc::new(Dispatcher::new(Duration::from_millis(500), tx));
        DeviceRegistry::new(backend, dispatcher, Duration::from_millis(20))
    }

    #[test]
    fn test_hotplug_tracks_arrivals_and_removals() {
        let backend = Arc::new(MockBackend::with_hotplug());
        let existing = DeviceKey::new(1, 1);
        backend.plug(existing, 1);

        let registry = registry(Arc::clone(&backend));
        let shutdown = Arc::new(AtomicBool::new(false));

        let thread = {
            let registry = registry.clone();
            let shutdown = Arc::clone(&shutdown);
            std::thread::spawn(move || {
                HotplugDiscovery::new(Duration::from_millis(5)).run(&registry, &shutdown)
            })
        };

        assert!(wait_until(WAIT, || registry.contains(existing)));

        let added = DeviceKey::new(1, 2);
        backend.plug(added, 2);
        assert!(wait_until(WAIT, || registry.contains(added)));

        backend.unplug(existing);
        assert!(wait_until(WAIT, || !registry.contains(existing)));

        shutdown.store(true, Ordering::Release);
        assert!(thread.join().unwrap().is_ok());
        registry.shutdown();
    }

    #[test]
    fn test_registration_failure_reports_unavailable() {
        let backend = Arc::new(MockBackend::new());
        let registry = registry(backend);
        let shutdown = AtomicBool::new(false);

        let result = HotplugDiscovery::default().run(&registry, &shutdown);
        assert!(matches!(result, Err(BuzzerError::HotplugUnavailable(_))));
    }
}
