//! Buzzer Reader Integration Tests
//!
//! Drives a full [`BuzzerReader`] (discovery, sessions, dispatcher and
//! delivery thread) against the in-memory mock bus.
//!
//! # Test Scenarios
//! - Press delivery and debounce timing
//! - Hot-plug and poll discovery
//! - Re-plugging on a reused bus address
//! - Id programming while running
//! - Clean shutdown with readers blocked in a transfer
//!
//! Run with: `cargo test -p reader --test integration_tests`

use common::test_utils::{DEFAULT_TEST_TIMEOUT, MockBackend, wait_until};
use protocol::{DeviceKey, LogicalId};
use reader::{BuzzerReader, DiscoveryMode, ReaderConfig};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

const A: DeviceKey = DeviceKey::new(1, 4);
const B: DeviceKey = DeviceKey::new(1, 5);

fn config(mode: DiscoveryMode) -> ReaderConfig {
    let mut config = ReaderConfig::default();
    config.reader.discovery = mode;
    config.reader.poll_interval_ms = 20;
    config.device.read_timeout_ms = 20;
    config
}

/// Reader with a callback that records every delivered id
fn started_reader(
    backend: Arc<MockBackend>,
    mode: DiscoveryMode,
) -> (BuzzerReader<MockBackend>, Arc<Mutex<Vec<LogicalId>>>) {
    let received = Arc::new(Mutex::new(Vec::new()));
    let mut reader = BuzzerReader::new(backend, config(mode));
    {
        let received = Arc::clone(&received);
        reader.register(move |id| received.lock().unwrap().push(id));
    }
    reader.start().unwrap();
    (reader, received)
}

fn count(received: &Mutex<Vec<LogicalId>>) -> usize {
    received.lock().unwrap().len()
}

#[test]
fn test_debounce_scenario() {
    let backend = Arc::new(MockBackend::new());
    let buzzer = backend.plug(A, 3);
    let (reader, received) = started_reader(Arc::clone(&backend), DiscoveryMode::Poll);
    assert!(wait_until(DEFAULT_TEST_TIMEOUT, || reader.devices().len() == 1));

    buzzer.press();
    assert!(wait_until(DEFAULT_TEST_TIMEOUT, || count(&received) == 1));
    let first = Instant::now();

    // Same id well inside the window
    thread::sleep(Duration::from_millis(100));
    buzzer.press();
    assert!(wait_until(DEFAULT_TEST_TIMEOUT, || buzzer.pending() == 0));
    thread::sleep(Duration::from_millis(50));
    assert_eq!(count(&received), 1);

    // Same id after the window
    thread::sleep(Duration::from_millis(600).saturating_sub(first.elapsed()));
    buzzer.press();
    assert!(wait_until(DEFAULT_TEST_TIMEOUT, || count(&received) == 2));

    assert_eq!(*received.lock().unwrap(), vec![LogicalId(3), LogicalId(3)]);
}

#[test]
fn test_different_ids_both_delivered() {
    let backend = Arc::new(MockBackend::new());
    let a = backend.plug(A, 1);
    let b = backend.plug(B, 2);
    let (reader, received) = started_reader(Arc::clone(&backend), DiscoveryMode::Poll);
    assert!(wait_until(DEFAULT_TEST_TIMEOUT, || reader.devices().len() == 2));

    a.press();
    b.press();
    assert!(wait_until(DEFAULT_TEST_TIMEOUT, || count(&received) == 2));

    let mut ids = received.lock().unwrap().clone();
    ids.sort();
    assert_eq!(ids, vec![LogicalId(1), LogicalId(2)]);
}

#[test]
fn test_id_is_cached_after_first_press() {
    let backend = Arc::new(MockBackend::new());
    let buzzer = backend.plug(A, 6);
    let (reader, received) = started_reader(Arc::clone(&backend), DiscoveryMode::Poll);
    assert!(wait_until(DEFAULT_TEST_TIMEOUT, || reader.devices().len() == 1));
    assert!(reader.devices()[0].id_dirty);

    buzzer.press();
    assert!(wait_until(DEFAULT_TEST_TIMEOUT, || count(&received) == 1));
    reader.reset_debounce();
    buzzer.press();
    assert!(wait_until(DEFAULT_TEST_TIMEOUT, || count(&received) == 2));

    assert_eq!(buzzer.id_reads(), 1);
    let status = &reader.devices()[0];
    assert!(!status.id_dirty);
    assert_eq!(status.logical_id, Some(LogicalId(6)));
}

#[test]
fn test_hotplug_discovery_delivers_presses() {
    let backend = Arc::new(MockBackend::with_hotplug());
    let (reader, received) = started_reader(Arc::clone(&backend), DiscoveryMode::Auto);
    assert_eq!(reader.strategy_name(), Some("hotplug"));

    let buzzer = backend.plug(A, 4);
    assert!(wait_until(DEFAULT_TEST_TIMEOUT, || reader.devices().len() == 1));

    buzzer.press();
    assert!(wait_until(DEFAULT_TEST_TIMEOUT, || count(&received) == 1));
    assert_eq!(received.lock().unwrap()[0], LogicalId(4));

    backend.unplug(A);
    assert!(wait_until(DEFAULT_TEST_TIMEOUT, || reader.devices().is_empty()));
    assert_eq!(buzzer.closes(), 1);
}

#[test]
fn test_poll_detects_attach_and_detach() {
    let backend = Arc::new(MockBackend::new());
    let (reader, _received) = started_reader(Arc::clone(&backend), DiscoveryMode::Poll);
    assert_eq!(reader.strategy_name(), Some("poll"));

    let buzzer = backend.plug(A, 1);
    assert!(wait_until(Duration::from_secs(1), || reader.devices().len() == 1));

    backend.unplug(A);
    assert!(wait_until(Duration::from_secs(1), || reader.devices().is_empty()));
    assert_eq!(buzzer.closes(), 1);
}

#[test]
fn test_replug_gets_fresh_session() {
    for mode in [DiscoveryMode::Poll, DiscoveryMode::Hotplug] {
        let backend = Arc::new(MockBackend::with_hotplug());
        let old = backend.plug(A, 1);
        let (reader, received) = started_reader(Arc::clone(&backend), mode);
        assert!(wait_until(DEFAULT_TEST_TIMEOUT, || reader.devices().len() == 1));

        old.press();
        assert!(wait_until(DEFAULT_TEST_TIMEOUT, || count(&received) == 1));

        // Same bus/address, different buzzer
        let new = backend.plug(A, 5);
        assert!(wait_until(DEFAULT_TEST_TIMEOUT, || {
            backend.opens() == 2 && reader.devices().len() == 1
        }));
        new.press();
        assert!(wait_until(DEFAULT_TEST_TIMEOUT, || count(&received) == 2));

        assert_eq!(received.lock().unwrap()[1], LogicalId(5));
        assert_eq!(new.id_reads(), 1);
        assert!(wait_until(DEFAULT_TEST_TIMEOUT, || old.closes() == 1));
        assert_eq!(reader.devices().len(), 1);
    }
}

#[test]
fn test_set_logical_id_while_running() {
    let backend = Arc::new(MockBackend::new());
    let buzzer = backend.plug(A, 1);
    let (reader, received) = started_reader(Arc::clone(&backend), DiscoveryMode::Poll);
    assert!(wait_until(DEFAULT_TEST_TIMEOUT, || reader.devices().len() == 1));

    assert_eq!(reader.set_logical_id(A, LogicalId(9)).unwrap(), LogicalId(9));
    assert_eq!(buzzer.logical_id(), 9);

    buzzer.press();
    assert!(wait_until(DEFAULT_TEST_TIMEOUT, || count(&received) == 1));
    assert_eq!(received.lock().unwrap()[0], LogicalId(9));

    assert!(reader.set_logical_id(B, LogicalId(2)).is_err());
}

#[test]
fn test_callback_runs_on_delivery_thread() {
    let backend = Arc::new(MockBackend::new());
    let buzzer = backend.plug(A, 2);
    let names = Arc::new(Mutex::new(Vec::new()));

    let mut reader = BuzzerReader::new(Arc::clone(&backend), config(DiscoveryMode::Poll));
    {
        let names = Arc::clone(&names);
        reader.register(move |_| {
            let name = thread::current().name().map(str::to_string);
            names.lock().unwrap().push(name);
        });
    }
    reader.start().unwrap();
    assert!(wait_until(DEFAULT_TEST_TIMEOUT, || reader.devices().len() == 1));

    buzzer.press();
    assert!(wait_until(DEFAULT_TEST_TIMEOUT, || names.lock().unwrap().len() == 1));
    assert_eq!(
        names.lock().unwrap()[0].as_deref(),
        Some("buzzer-dispatch")
    );
}

#[test]
fn test_register_replaces_callback() {
    let backend = Arc::new(MockBackend::new());
    let buzzer = backend.plug(A, 2);
    let (mut reader, first) = started_reader(Arc::clone(&backend), DiscoveryMode::Poll);
    assert!(wait_until(DEFAULT_TEST_TIMEOUT, || reader.devices().len() == 1));

    let second = Arc::new(Mutex::new(Vec::new()));
    {
        let second = Arc::clone(&second);
        reader.register(move |id| second.lock().unwrap().push(id));
    }

    buzzer.press();
    assert!(wait_until(DEFAULT_TEST_TIMEOUT, || count(&second) == 1));
    assert_eq!(count(&first), 0);

    reader.stop();
}

#[test]
fn test_stop_releases_blocked_readers_once() {
    let backend = Arc::new(MockBackend::new());
    let a = backend.plug(A, 1);
    let b = backend.plug(B, 2);
    let (mut reader, _received) = started_reader(Arc::clone(&backend), DiscoveryMode::Poll);
    assert!(wait_until(DEFAULT_TEST_TIMEOUT, || reader.devices().len() == 2));

    let start = Instant::now();
    reader.stop();
    assert!(start.elapsed() < Duration::from_secs(1));

    assert!(!reader.is_running());
    assert!(reader.devices().is_empty());
    assert_eq!(a.closes(), 1);
    assert_eq!(b.closes(), 1);

    // Dropping after stop must not release again
    drop(reader);
    assert_eq!(a.closes(), 1);
}

#[test]
fn test_press_latched_before_start_is_not_delivered() {
    let backend = Arc::new(MockBackend::new());
    let buzzer = backend.plug(A, 3);
    buzzer.press();

    let (reader, received) = started_reader(Arc::clone(&backend), DiscoveryMode::Poll);
    assert!(wait_until(DEFAULT_TEST_TIMEOUT, || reader.devices().len() == 1));
    assert_eq!(buzzer.pending(), 0);

    thread::sleep(Duration::from_millis(200));
    assert_eq!(count(&received), 0);

    buzzer.press();
    assert!(wait_until(DEFAULT_TEST_TIMEOUT, || count(&received) == 1));
    assert_eq!(received.lock().unwrap()[0], LogicalId(3));
}

#[test]
fn test_flush_all_keeps_later_presses() {
    let backend = Arc::new(MockBackend::new());
    let buzzer = backend.plug(A, 3);
    let (reader, received) = started_reader(Arc::clone(&backend), DiscoveryMode::Poll);
    assert!(wait_until(DEFAULT_TEST_TIMEOUT, || reader.devices().len() == 1));

    reader.flush_all();

    buzzer.press();
    assert!(wait_until(DEFAULT_TEST_TIMEOUT, || count(&received) == 1));
}
