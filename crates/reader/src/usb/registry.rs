//! Buzzer device registry
//!
//! Maps `(bus, address)` to the live session for that connection. Mutated by
//! the discovery thread; facade calls (flush, id programming, listing) take
//! the same lock. Sessions never touch the registry themselves.
//!
//! Sessions are always closed outside the lock so a slow thread join never
//! blocks other registry users.

use crate::dispatcher::Dispatcher;
use crate::error::{BuzzerError, Result};
use crate::usb::session::{BuzzerSession, DeviceStatus};
use common::UsbBackend;
use protocol::{DeviceKey, LogicalId};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, error, info, warn};

type SessionMap<B> = HashMap<DeviceKey, BuzzerSession<<B as UsbBackend>::Transport>>;

struct RegistryInner<B: UsbBackend> {
    backend: Arc<B>,
    dispatcher: Arc<Dispatcher>,
    read_timeout: Duration,
    sessions: Mutex<SessionMap<B>>,
}

/// Registry of live buzzer sessions keyed by `(bus, address)`
pub struct DeviceRegistry<B: UsbBackend> {
    inner: Arc<RegistryInner<B>>,
}

impl<B: UsbBackend> Clone for DeviceRegistry<B> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<B: UsbBackend> DeviceRegistry<B> {
    pub fn new(backend: Arc<B>, dispatcher: Arc<Dispatcher>, read_timeout: Duration) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                backend,
                dispatcher,
                read_timeout,
                sessions: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn backend(&self) -> &Arc<B> {
        &self.inner.backend
    }

    /// Open a device and start a session for it
    ///
    /// A no-op if a session for the key already exists. Open failures are
    /// logged and affect only this device. Returns true if a session was
    /// started.
    pub fn attach(&self, device: &B::Device) -> bool {
        let key = self.inner.backend.device_key(device);
        let mut sessions = self.inner.sessions.lock().unwrap();

        if sessions.contains_key(&key) {
            debug!("Buzzer {} already tracked", key);
            return false;
        }

        let transport = match self.inner.backend.open(device) {
            Ok(transport) => transport,
            Err(source) => {
                warn!("{}", BuzzerError::OpenFailed { key, source });
                return false;
            }
        };

        let mut session = BuzzerSession::new(key, transport, self.inner.read_timeout);
        if let Err(e) = session.start(Arc::clone(&self.inner.dispatcher)) {
            error!("Failed to start session for buzzer {}: {}", key, e);
            return false;
        }

        sessions.insert(key, session);
        info!("Buzzer {} connected ({} total)", key, sessions.len());
        true
    }

    /// Stop and remove the session for `key`; a no-op if absent
    pub fn detach(&self, key: DeviceKey) -> bool {
        let session = {
            let mut sessions = self.inner.sessions.lock().unwrap();
            sessions.remove(&key)
        };

        match session {
            Some(mut session) => {
                session.close();
                info!("Buzzer {} disconnected", key);
                true
            }
            None => false,
        }
    }

    /// Remove sessions whose reader exited on its own (device vanished)
    ///
    /// Returns the reaped keys; a device still present is re-attached as a
    /// fresh session by the next discovery pass.
    pub fn reap(&self) -> Vec<DeviceKey> {
        let finished: Vec<_> = {
            let mut sessions = self.inner.sessions.lock().unwrap();
            let keys: Vec<DeviceKey> = sessions
                .iter()
                .filter(|(_, s)| s.is_finished())
                .map(|(k, _)| *k)
                .collect();
            keys.into_iter()
                .filter_map(|k| sessions.remove(&k))
                .collect()
        };

        finished
            .into_iter()
            .map(|mut session| {
                let key = session.key();
                session.close();
                debug!("Reaped finished session for buzzer {}", key);
                key
            })
            .collect()
    }

    pub fn keys(&self) -> HashSet<DeviceKey> {
        self.inner.sessions.lock().unwrap().keys().copied().collect()
    }

    pub fn contains(&self, key: DeviceKey) -> bool {
        self.inner.sessions.lock().unwrap().contains_key(&key)
    }

    pub fn len(&self) -> usize {
        self.inner.sessions.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of every session, sorted by key
    pub fn statuses(&self) -> Vec<DeviceStatus> {
        let sessions = self.inner.sessions.lock().unwrap();
        let mut statuses: Vec<_> = sessions.values().map(|s| s.status()).collect();
        statuses.sort_by_key(|s| s.key);
        statuses
    }

    pub fn status(&self, key: DeviceKey) -> Option<DeviceStatus> {
        let sessions = self.inner.sessions.lock().unwrap();
        sessions.get(&key).map(|s| s.status())
    }

    /// Program the logical id of a connected buzzer
    pub fn set_logical_id(&self, key: DeviceKey, id: LogicalId) -> Result<LogicalId> {
        let sessions = self.inner.sessions.lock().unwrap();
        let session = sessions.get(&key).ok_or(BuzzerError::UnknownDevice(key))?;
        session.set_logical_id(id)
    }

    /// Discard latched presses on every connected buzzer
    pub fn flush_all(&self) {
        let sessions = self.inner.sessions.lock().unwrap();
        for session in sessions.values() {
            session.flush();
        }
    }

    /// Ask every reader to stop without waiting
    pub fn signal_all(&self) {
        let sessions = self.inner.sessions.lock().unwrap();
        for session in sessions.values() {
            session.request_stop();
        }
    }

    /// Stop every session, join all readers, then release all transports
    pub fn shutdown(&self) {
        let mut sessions: Vec<_> = {
            let mut map = self.inner.sessions.lock().unwrap();
            map.drain().map(|(_, s)| s).collect()
        };

        for session in &sessions {
            session.request_stop();
        }
        for session in &mut sessions {
            session.close();
        }

        if !sessions.is_empty() {
            info!("Closed {} buzzer session(s)", sessions.len());
        }
    }
}
