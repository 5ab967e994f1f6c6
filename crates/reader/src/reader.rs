//! Buzzer reader facade
//!
//! [`BuzzerReader`] is the one object a consumer holds. It owns the press
//! channel, the debounced dispatcher, the device registry and the two
//! background threads (discovery and delivery). Accepted presses are handed
//! to the registered callback on the `buzzer-dispatch` thread, never on a
//! reader thread.

use crate::config::ReaderConfig;
use crate::dispatcher::Dispatcher;
use crate::error::{BuzzerError, Result};
use crate::usb::{DeviceRegistry, DeviceStatus, RusbBackend, select_discovery, spawn_discovery};
use common::{PressReceiver, UsbBackend, create_press_channel};
use protocol::{DeviceKey, LogicalId, PressEvent};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::thread::JoinHandle;
use tracing::{debug, error, info};

/// Consumer callback for accepted presses
pub type PressCallback = Arc<dyn Fn(PressEvent) + Send + Sync>;

type CallbackSlot = Arc<RwLock<Option<PressCallback>>>;

/// Everything that exists only between `start` and `stop`
struct Running<B: UsbBackend> {
    registry: DeviceRegistry<B>,
    dispatcher: Arc<Dispatcher>,
    shutdown: Arc<AtomicBool>,
    discovery: JoinHandle<()>,
    delivery: JoinHandle<()>,
    strategy: &'static str,
}

pub struct BuzzerReader<B: UsbBackend> {
    backend: Arc<B>,
    config: ReaderConfig,
    callback: CallbackSlot,
    running: Option<Running<B>>,
}

impl BuzzerReader<RusbBackend> {
    /// Create a reader on the system libusb context
    pub fn open(config: ReaderConfig) -> Result<Self> {
        let backend = RusbBackend::new(config.device.vendor_id, config.device.product_id)
            .map_err(|e| BuzzerError::Backend(e.to_string()))?;
        Ok(Self::new(Arc::new(backend), config))
    }
}

impl<B: UsbBackend> BuzzerReader<B> {
    pub fn new(backend: Arc<B>, config: ReaderConfig) -> Self {
        Self {
            backend,
            config,
            callback: Arc::new(RwLock::new(None)),
            running: None,
        }
    }

    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    pub fn config(&self) -> &ReaderConfig {
        &self.config
    }

    /// Set the consumer callback, replacing any previous one
    ///
    /// Takes effect immediately, also while running.
    pub fn register<F>(&self, callback: F)
    where
        F: Fn(LogicalId) + Send + Sync + 'static,
    {
        self.register_events(move |event: PressEvent| callback(event.logical_id));
    }

    /// Like [`register`](Self::register), with the originating device included
    pub fn register_events<F>(&self, callback: F)
    where
        F: Fn(PressEvent) + Send + Sync + 'static,
    {
        *self.callback.write().unwrap() = Some(Arc::new(callback));
    }

    /// Start discovery, reading and delivery
    pub fn start(&mut self) -> Result<()> {
        if self.running.is_some() {
            return Err(BuzzerError::AlreadyRunning);
        }

        let (tx, rx) = create_press_channel(self.config.dispatch.channel_capacity);
        let dispatcher = Arc::new(Dispatcher::new(self.config.debounce(), tx));
        let registry = DeviceRegistry::new(
            Arc::clone(&self.backend),
            Arc::clone(&dispatcher),
            self.config.read_timeout(),
        );

        let strategy = select_discovery(
            self.backend.as_ref(),
            self.config.reader.discovery,
            self.config.poll_interval(),
        );
        let strategy_name = strategy.name();

        let delivery = spawn_delivery(rx, Arc::clone(&self.callback))?;

        let shutdown = Arc::new(AtomicBool::new(false));
        let discovery = match spawn_discovery(
            strategy,
            registry.clone(),
            Arc::clone(&shutdown),
            self.config.poll_interval(),
        ) {
            Ok(handle) => handle,
            Err(e) => {
                dispatcher.close();
                if delivery.join().is_err() {
                    error!("Press delivery thread panicked");
                }
                return Err(e);
            }
        };

        info!(
            "Buzzer reader started ({} discovery, {}ms debounce)",
            strategy_name,
            self.config.debounce().as_millis()
        );

        self.running = Some(Running {
            registry,
            dispatcher,
            shutdown,
            discovery,
            delivery,
            strategy: strategy_name,
        });
        Ok(())
    }

    /// Stop everything and release every buzzer; a no-op when not running
    pub fn stop(&mut self) {
        let Some(running) = self.running.take() else {
            return;
        };
        info!("Stopping buzzer reader...");

        running.registry.signal_all();
        running.shutdown.store(true, Ordering::Release);

        if running.discovery.join().is_err() {
            error!("Buzzer discovery thread panicked");
        }

        running.registry.shutdown();

        // Readers are gone; the delivery thread drains what is left and exits
        running.dispatcher.close();
        if running.delivery.join().is_err() {
            error!("Press delivery thread panicked");
        }

        info!("Buzzer reader stopped");
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// Discovery strategy chosen at start
    pub fn strategy_name(&self) -> Option<&'static str> {
        self.running.as_ref().map(|r| r.strategy)
    }

    /// Discard presses latched on every connected buzzer
    pub fn flush_all(&self) {
        if let Some(running) = &self.running {
            running.registry.flush_all();
        }
    }

    /// Accept the next press even if it repeats the last accepted id
    pub fn reset_debounce(&self) {
        if let Some(running) = &self.running {
            running.dispatcher.reset();
        }
    }

    /// Connected buzzers, sorted by bus and address
    pub fn devices(&self) -> Vec<DeviceStatus> {
        self.running
            .as_ref()
            .map(|r| r.registry.statuses())
            .unwrap_or_default()
    }

    /// Program the logical id of a connected buzzer
    pub fn set_logical_id(&self, key: DeviceKey, id: LogicalId) -> Result<LogicalId> {
        match &self.running {
            Some(running) => running.registry.set_logical_id(key, id),
            None => Err(BuzzerError::UnknownDevice(key)),
        }
    }
}

impl<B: UsbBackend> Drop for BuzzerReader<B> {
    fn drop(&mut self) {
        self.stop();
    }
}

fn spawn_delivery(rx: PressReceiver, callback: CallbackSlot) -> Result<JoinHandle<()>> {
    let handle = std::thread::Builder::new()
        .name("buzzer-dispatch".to_string())
        .spawn(move || {
            debug!("Press delivery started");
            while let Ok(event) = rx.recv_blocking() {
                let current = callback.read().unwrap().clone();
                match current {
                    Some(cb) => cb(event),
                    None => debug!(
                        "No consumer registered, dropping press from id {}",
                        event.logical_id
                    ),
                }
            }
            debug!("Press delivery stopped");
        })?;
    Ok(handle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::test_utils::MockBackend;

    fn reader() -> BuzzerReader<MockBackend> {
        BuzzerReader::new(Arc::new(MockBackend::new()), ReaderConfig::default())
    }

    #[test]
    fn test_start_twice_rejected() {
        let mut reader = reader();
        reader.start().unwrap();
        assert!(matches!(reader.start(), Err(BuzzerError::AlreadyRunning)));
        reader.stop();
        assert!(!reader.is_running());
    }

    #[test]
    fn test_stop_is_idempotent() {
        let mut reader = reader();
        reader.stop();
        reader.start().unwrap();
        reader.stop();
        reader.stop();
    }

    #[test]
    fn test_restart_after_stop() {
        let mut reader = reader();
        reader.start().unwrap();
        reader.stop();
        reader.start().unwrap();
        assert!(reader.is_running());
    }

    #[test]
    fn test_idle_queries() {
        let reader = reader();
        assert!(reader.devices().is_empty());
        assert_eq!(reader.strategy_name(), None);
        assert!(matches!(
            reader.set_logical_id(DeviceKey::new(1, 1), LogicalId(3)),
            Err(BuzzerError::UnknownDevice(_))
        ));
        reader.flush_all();
        reader.reset_debounce();
    }

    #[test]
    fn test_strategy_reported() {
        let mut reader = BuzzerReader::new(
            Arc::new(MockBackend::with_hotplug()),
            ReaderConfig::default(),
        );
        reader.start().unwrap();
        assert_eq!(reader.strategy_name(), Some("hotplug"));
    }
}
