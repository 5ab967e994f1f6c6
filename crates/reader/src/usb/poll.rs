//! Poll-based discovery
//!
//! Re-enumerates the bus at a fixed interval and diffs the result against the
//! registry: new keys get a session, vanished keys lose theirs. Detection
//! latency is bounded by the poll interval.

use crate::error::Result;
use crate::usb::discovery::DeviceDiscovery;
use crate::usb::registry::DeviceRegistry;
use common::UsbBackend;
use protocol::DeviceKey;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Default interval between bus scans
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Longest uninterrupted sleep between shutdown checks
const SLEEP_SLICE: Duration = Duration::from_millis(50);

/// Changes applied by one scan
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ScanReport {
    pub attached: Vec<DeviceKey>,
    pub detached: Vec<DeviceKey>,
}

pub struct PollDiscovery {
    interval: Duration,
}

impl PollDiscovery {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Enumerate once and reconcile the registry with the bus
    pub fn scan<B: UsbBackend>(&self, registry: &DeviceRegistry<B>) -> Result<ScanReport> {
        let backend = registry.backend();
        let devices = backend.enumerate()?;

        // Sessions that died on their own are dropped first so a device still
        // on the bus is picked up again as a fresh session below
        let reaped = registry.reap();
        let known = registry.keys();

        let mut report = ScanReport::default();
        let mut present = HashSet::with_capacity(devices.len());

        for device in &devices {
            let key = backend.device_key(device);
            present.insert(key);
            if !known.contains(&key) && registry.attach(device) {
                report.attached.push(key);
            }
        }

        for key in known.difference(&present) {
            if registry.detach(*key) {
                report.detached.push(*key);
            }
        }
        report
            .detached
            .extend(reaped.into_iter().filter(|key| !present.contains(key)));

        if !report.attached.is_empty() || !report.detached.is_empty() {
            debug!(
                "Scan: {} new, {} gone, {} tracked",
                report.attached.len(),
                report.detached.len(),
                registry.len()
            );
        }
        Ok(report)
    }

    /// Sleep for one interval, waking early on shutdown
    fn wait(&self, shutdown: &AtomicBool) {
        let deadline = Instant::now() + self.interval;
        while !shutdown.load(Ordering::Acquire) {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            std::thread::sleep(remaining.min(SLEEP_SLICE));
        }
    }
}

impl Default for PollDiscovery {
    fn default() -> Self {
        Self::new(DEFAULT_POLL_INTERVAL)
    }
}

impl<B: UsbBackend> DeviceDiscovery<B> for PollDiscovery {
    fn name(&self) -> &'static str {
        "poll"
    }

    fn run(&mut self, registry: &DeviceRegistry<B>, shutdown: &AtomicBool) -> Result<()> {
        while !shutdown.load(Ordering::Acquire) {
            if let Err(e) = self.scan(registry) {
                warn!("Buzzer scan failed: {}", e);
            }
            self.wait(shutdown);
        }
        Ok(())
    }
}
