//! Debounced press dispatcher
//!
//! Sits between the buzzer sessions and the consumer. Every session thread
//! calls [`Dispatcher::on_press`] concurrently; a press is accepted if it
//! comes from a different logical id than the last accepted one, or if the
//! debounce interval has passed since that acceptance. Accepted presses go
//! into the press channel exactly once; rejected ones are dropped.

use common::PressSender;
use protocol::{LogicalId, PressEvent};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::{trace, warn};

/// Last accepted press, updated as a pair
#[derive(Debug, Default)]
struct DebounceState {
    last_id: Option<LogicalId>,
    last_accept: Option<Instant>,
}

impl DebounceState {
    fn allows(&self, id: LogicalId, now: Instant, interval: Duration) -> bool {
        if interval.is_zero() || self.last_id != Some(id) {
            return true;
        }
        self.last_accept
            .is_none_or(|t| now.saturating_duration_since(t) > interval)
    }

    fn record(&mut self, id: LogicalId, now: Instant) {
        self.last_id = Some(id);
        self.last_accept = Some(now);
    }
}

pub struct Dispatcher {
    interval: Duration,
    state: Mutex<DebounceState>,
    sender: PressSender,
}

impl Dispatcher {
    pub fn new(interval: Duration, sender: PressSender) -> Self {
        Self {
            interval,
            state: Mutex::new(DebounceState::default()),
            sender,
        }
    }

    /// Debounce interval in effect
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Handle a resolved press from a session thread
    ///
    /// Returns true if the press was accepted and handed to the channel.
    pub fn on_press(&self, event: PressEvent) -> bool {
        let now = Instant::now();
        let mut state = self.state.lock().unwrap();

        if !state.allows(event.logical_id, now, self.interval) {
            trace!(
                "Suppressed repeated press from id {} ({})",
                event.logical_id, event.device
            );
            return false;
        }

        // Only a press that reached the channel counts as accepted
        if let Err(e) = self.sender.try_send(event) {
            warn!(
                "Dropping press from id {} ({}): {}",
                event.logical_id, event.device, e
            );
            return false;
        }

        state.record(event.logical_id, now);
        true
    }

    /// Apply the acceptance rule for a press observed at `now`
    pub fn accept_at(&self, id: LogicalId, now: Instant) -> bool {
        let mut state = self.state.lock().unwrap();
        if !state.allows(id, now, self.interval) {
            return false;
        }
        state.record(id, now);
        true
    }

    /// Forget the last accepted id so the next press is always accepted
    pub fn reset(&self) {
        self.state.lock().unwrap().last_id = None;
    }

    /// Close the press channel; used on shutdown
    pub(crate) fn close(&self) {
        self.sender.close();
    }
}
