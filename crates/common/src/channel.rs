//! Press channel bridge between reader threads and the consumer
//!
//! Every buzzer session runs on its own OS thread. Accepted presses are handed
//! to the consumer through a bounded async channel so the consumer never runs
//! inside a reader thread and can receive either from async code or from a
//! blocking delivery thread.

use async_channel::{Receiver, Sender, TryRecvError, TrySendError, bounded};
use protocol::PressEvent;
use tracing::debug;

/// Default capacity of the press channel
pub const DEFAULT_PRESS_CAPACITY: usize = 256;

/// Sending half, held by the dispatcher (sync, never blocks)
#[derive(Clone)]
pub struct PressSender {
    tx: Sender<PressEvent>,
}

impl PressSender {
    /// Send a press without blocking
    ///
    /// Fails if the channel is full or closed; the caller decides whether
    /// to log and drop.
    pub fn try_send(&self, event: PressEvent) -> crate::Result<()> {
        self.tx.try_send(event).map_err(|e| match e {
            TrySendError::Full(_) => crate::Error::Channel("press channel full".to_string()),
            TrySendError::Closed(_) => crate::Error::Channel("press channel closed".to_string()),
        })
    }

    /// Close the channel; pending events can still be received
    ///
    /// Returns true only for the call that actually closed it.
    pub fn close(&self) -> bool {
        let closed = self.tx.close();
        if closed {
            debug!("Press channel closed ({} pending)", self.tx.len());
        }
        closed
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Receiving half, held by the consumer
#[derive(Clone)]
pub struct PressReceiver {
    rx: Receiver<PressEvent>,
}

impl PressReceiver {
    /// Receive the next press (async)
    pub async fn recv(&self) -> crate::Result<PressEvent> {
        self.rx
            .recv()
            .await
            .map_err(|e| crate::Error::Channel(e.to_string()))
    }

    /// Receive the next press (blocking)
    ///
    /// Returns an error once the channel is closed and drained.
    pub fn recv_blocking(&self) -> crate::Result<PressEvent> {
        self.rx
            .recv_blocking()
            .map_err(|e| crate::Error::Channel(e.to_string()))
    }

    /// Try to receive a press without blocking
    pub fn try_recv(&self) -> Option<PressEvent> {
        match self.rx.try_recv() {
            Ok(event) => Some(event),
            Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => None,
        }
    }

    /// Number of presses waiting in the channel
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

/// Create the press channel
///
/// Returns (PressSender for the dispatcher, PressReceiver for the consumer)
pub fn create_press_channel(capacity: usize) -> (PressSender, PressReceiver) {
    let (tx, rx) = bounded(capacity.max(1));
    (PressSender { tx }, PressReceiver { rx })
}

#[cfg(test)]
mod tests {
    use super::*;
    use protocol::{DeviceKey, LogicalId};

    fn press(id: u8) -> PressEvent {
        PressEvent::new(DeviceKey::new(1, 1), LogicalId(id))
    }

    #[tokio::test]
    async fn test_press_crosses_threads() {
        let (tx, rx) = create_press_channel(DEFAULT_PRESS_CAPACITY);

        let handle = std::thread::spawn(move || tx.try_send(press(5)));

        let event = rx.recv().await.unwrap();
        assert_eq!(event.logical_id, LogicalId(5));
        assert!(handle.join().unwrap().is_ok());
    }

    #[test]
    fn test_full_channel_rejects() {
        let (tx, rx) = create_press_channel(1);
        assert!(tx.try_send(press(1)).is_ok());
        assert!(tx.try_send(press(2)).is_err());
        assert_eq!(rx.len(), 1);
    }

    #[test]
    fn test_close_drains_then_errors() {
        let (tx, rx) = create_press_channel(4);
        tx.try_send(press(1)).unwrap();
        assert!(tx.close());

        assert_eq!(rx.recv_blocking().unwrap().logical_id, LogicalId(1));
        assert!(rx.recv_blocking().is_err());
        assert!(tx.try_send(press(2)).is_err());
    }

    #[test]
    fn test_close_reports_first_caller_only() {
        let (tx, rx) = create_press_channel(4);
        let other = tx.clone();
        tx.try_send(press(3)).unwrap();

        assert!(tx.close());
        assert!(!other.close());
        assert!(other.is_closed());
        assert_eq!(rx.try_recv().map(|e| e.logical_id), Some(LogicalId(3)));
    }
}
