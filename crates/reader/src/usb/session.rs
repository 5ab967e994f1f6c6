//! Buzzer device session
//!
//! A session owns one claimed buzzer connection and the thread reading its
//! interrupt endpoint. Lifecycle: `Starting` (opened, not reading) →
//! `Running` (reader thread active) → `Stopping` (stop requested or device
//! vanished) → `Closed` (thread joined, transport released exactly once).
//!
//! The logical id is cached with a dirty flag: it is read from the device on
//! the first press and after every explicit set, and served from the cache
//! otherwise.

use crate::dispatcher::Dispatcher;
use crate::error::{BuzzerError, Result};
use common::Transport;
use protocol::{DeviceKey, FLUSH_TIMEOUT, LogicalId, PressEvent, TransportError, is_press_marker};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, error, info, trace, warn};

/// Observable session lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Starting,
    Running,
    Stopping,
    Closed,
}

/// Snapshot of one session for listings
#[derive(Debug, Clone, Serialize)]
pub struct DeviceStatus {
    pub key: DeviceKey,
    /// Last known logical id (may be stale while `id_dirty`)
    pub logical_id: Option<LogicalId>,
    pub id_dirty: bool,
    pub state: SessionState,
}

#[derive(Debug)]
struct IdCache {
    id: Option<LogicalId>,
    dirty: bool,
}

/// State shared between the session owner and its reader thread
struct SessionCore<T> {
    key: DeviceKey,
    transport: T,
    id_cache: Mutex<IdCache>,
    running: AtomicBool,
    released: AtomicBool,
    read_timeout: Duration,
}

impl<T: Transport> SessionCore<T> {
    fn ensure_open(&self) -> Result<()> {
        if self.released.load(Ordering::Acquire) {
            return Err(BuzzerError::DeviceVanished { key: self.key });
        }
        Ok(())
    }

    /// Re-read the id from firmware into the cache
    fn refresh(&self, cache: &mut IdCache) -> Result<LogicalId> {
        let raw = self
            .transport
            .control_read(0)
            .map_err(|e| BuzzerError::id_resolution(self.key, e))?;

        let id = LogicalId(raw);
        cache.id = Some(id);
        cache.dirty = false;
        debug!("Buzzer {} reports logical id {}", self.key, id);
        Ok(id)
    }

    fn logical_id(&self) -> Result<LogicalId> {
        self.ensure_open()?;
        let mut cache = self.id_cache.lock().unwrap();
        match cache.id {
            Some(id) if !cache.dirty => Ok(id),
            _ => self.refresh(&mut cache),
        }
    }

    fn set_logical_id(&self, id: LogicalId) -> Result<LogicalId> {
        if id.0 == 0 {
            return Err(BuzzerError::InvalidLogicalId(id.0));
        }
        self.ensure_open()?;

        // Held across write and confirm so the reader never serves the old id
        let mut cache = self.id_cache.lock().unwrap();
        cache.dirty = true;

        let reply = self
            .transport
            .control_read(u16::from(id.0))
            .map_err(|e| BuzzerError::id_resolution(self.key, e))?;
        trace!("Buzzer {} acknowledged id write with {:#04x}", self.key, reply);

        let confirmed = self.refresh(&mut cache)?;
        if confirmed != id {
            warn!(
                "Buzzer {} reports id {} after programming {}",
                self.key, confirmed, id
            );
        } else {
            info!("Programmed buzzer {} with logical id {}", self.key, id);
        }
        Ok(confirmed)
    }

    fn is_id_dirty(&self) -> bool {
        self.id_cache.lock().unwrap().dirty
    }

    fn read_loop(&self, dispatcher: &Dispatcher) {
        debug!("Buzzer {} reader started", self.key);

        while self.running.load(Ordering::Acquire) {
            match self.transport.read_byte(self.read_timeout) {
                Ok(byte) if is_press_marker(byte) => self.handle_press(dispatcher),
                Ok(byte) => {
                    trace!("Ignoring stray byte {:#04x} from buzzer {}", byte, self.key);
                }
                Err(TransportError::Timeout) => {}
                Err(e) if e.is_vanished() => {
                    info!("Buzzer {} vanished", self.key);
                    self.running.store(false, Ordering::Release);
                }
                Err(e) => {
                    debug!("Read error on buzzer {}: {}", self.key, e);
                    std::thread::sleep(self.read_timeout);
                }
            }
        }

        debug!("Buzzer {} reader stopped", self.key);
    }

    fn handle_press(&self, dispatcher: &Dispatcher) {
        match self.logical_id() {
            Ok(id) => {
                trace!("Press on buzzer {} (id {})", self.key, id);
                dispatcher.on_press(PressEvent::new(self.key, id));
            }
            Err(e) => warn!("Dropping press: {}", e),
        }
    }

    fn flush(&self) {
        if self.released.load(Ordering::Acquire) {
            return;
        }
        match self.transport.read_byte(FLUSH_TIMEOUT) {
            Ok(byte) => debug!("Flushed byte {:#04x} from buzzer {}", byte, self.key),
            Err(TransportError::Timeout) => {}
            Err(e) => debug!("Flush on buzzer {} failed: {}", self.key, e),
        }
    }

    /// Close the transport; true only for the call that actually released it
    fn release(&self) -> bool {
        if self.released.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.transport.close();
        true
    }
}

/// One live buzzer connection and its reader thread
pub struct BuzzerSession<T: Transport> {
    core: Arc<SessionCore<T>>,
    thread: Option<JoinHandle<()>>,
    started: bool,
}

impl<T: Transport> BuzzerSession<T> {
    /// Wrap an opened transport; the id cache starts dirty
    pub fn new(key: DeviceKey, transport: T, read_timeout: Duration) -> Self {
        Self {
            core: Arc::new(SessionCore {
                key,
                transport,
                id_cache: Mutex::new(IdCache {
                    id: None,
                    dirty: true,
                }),
                running: AtomicBool::new(false),
                released: AtomicBool::new(false),
                read_timeout,
            }),
            thread: None,
            started: false,
        }
    }

    pub fn key(&self) -> DeviceKey {
        self.core.key
    }

    /// Spawn the reader thread; presses are handed to `dispatcher`
    ///
    /// A press latched by the device before the session existed is
    /// discarded first, before any reader can pick it up.
    pub fn start(&mut self, dispatcher: Arc<Dispatcher>) -> Result<()> {
        if self.started || self.core.released.load(Ordering::Acquire) {
            return Ok(());
        }

        self.core.flush();
        self.core.running.store(true, Ordering::Release);
        let core = Arc::clone(&self.core);
        let key = self.core.key;

        let spawned = std::thread::Builder::new()
            .name(format!("buzzer-{}-{}", key.bus, key.address))
            .spawn(move || core.read_loop(&dispatcher));

        match spawned {
            Ok(handle) => {
                self.thread = Some(handle);
                self.started = true;
                Ok(())
            }
            Err(e) => {
                self.core.running.store(false, Ordering::Release);
                Err(BuzzerError::Spawn(e))
            }
        }
    }

    /// Ask the reader loop to exit; returns immediately
    pub fn request_stop(&self) {
        self.core.running.store(false, Ordering::Release);
    }

    /// Whether the reader thread has exited (stopped or device vanished)
    pub fn is_finished(&self) -> bool {
        self.started && self.thread.as_ref().is_none_or(|h| h.is_finished())
    }

    pub fn state(&self) -> SessionState {
        if self.core.released.load(Ordering::Acquire) {
            SessionState::Closed
        } else if !self.started {
            SessionState::Starting
        } else if self.core.running.load(Ordering::Acquire) {
            SessionState::Running
        } else {
            SessionState::Stopping
        }
    }

    /// Stop, join the reader thread and release the transport
    ///
    /// Safe to call more than once; the transport is released only once.
    pub fn close(&mut self) {
        self.request_stop();

        if let Some(handle) = self.thread.take()
            && handle.join().is_err()
        {
            error!("Reader thread for buzzer {} panicked", self.core.key);
        }

        if self.core.release() {
            debug!("Session for buzzer {} closed", self.core.key);
        }
    }

    /// Logical id, read from the device only if the cache is dirty
    pub fn logical_id(&self) -> Result<LogicalId> {
        self.core.logical_id()
    }

    /// Program a new logical id and return the id the device confirms
    pub fn set_logical_id(&self, id: LogicalId) -> Result<LogicalId> {
        self.core.set_logical_id(id)
    }

    /// Discard a press latched by the device while nobody was listening
    pub fn flush(&self) {
        self.core.flush();
    }

    pub fn is_id_dirty(&self) -> bool {
        self.core.is_id_dirty()
    }

    pub fn status(&self) -> DeviceStatus {
        let cache = self.core.id_cache.lock().unwrap();
        DeviceStatus {
            key: self.core.key,
            logical_id: cache.id,
            id_dirty: cache.dirty,
            state: self.state(),
        }
    }
}

impl<T: Transport> Drop for BuzzerSession<T> {
    fn drop(&mut self) {
        self.close();
    }
}
