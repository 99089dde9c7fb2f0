// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Wait-handle retrieval: contention, caching and duplication failures.

use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use padlink::platform::memory::MemoryBackend;
use padlink::platform::{Backend, FileMapping, HandleDuplicator, SystemEvent, SystemMutex};
use padlink::wire::{DeviceCommand, MessageKind, RemoteHandle};
use padlink::{
    Connection, InteropConfig, InteropError, PlatformError, RawInputReport, ReplyMismatch,
    SimulatedDriver,
};

static COUNTER: AtomicUsize = AtomicUsize::new(0);

fn unique_config(prefix: &str) -> InteropConfig {
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    InteropConfig::with_prefix(&format!("Local\\{prefix}_broker_{n}_"))
}

fn setup(prefix: &str) -> (MemoryBackend, SimulatedDriver, Connection) {
    let config = unique_config(prefix);
    let backend = MemoryBackend::new();
    let driver = SimulatedDriver::install(&backend, config.clone()).expect("install");
    let conn = Connection::open_with(&backend, config).expect("open");
    (backend, driver, conn)
}

fn wait_until(mut cond: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !cond() {
        assert!(Instant::now() < deadline, "condition not reached");
        thread::sleep(Duration::from_millis(1));
    }
}

#[test]
fn request_is_response_only() {
    let (_backend, driver, conn) = setup("kind");
    conn.get_wait_handle(3).expect("wait handle");

    let req = &driver.requests()[0];
    assert_eq!(req.header.kind, MessageKind::ResponseOnly as u32);
    assert_eq!(req.header.command, DeviceCommand::GetWaitHandle as u32);
    assert_eq!(req.header.target_index, 3);
    assert_eq!(req.header.size, 20);
}

#[test]
fn implausible_reply_is_rejected_and_not_cached() {
    let (_backend, driver, conn) = setup("tampered");
    driver.tamper_next_reply(|h| h.size += 4);

    match conn.get_wait_handle(2).unwrap_err() {
        InteropError::UnexpectedReply(ReplyMismatch::Header(h)) => {
            assert_eq!(h.kind, MessageKind::ResponseOnly as u32);
            assert_eq!(h.command, DeviceCommand::GetWaitHandle as u32);
        }
        other => panic!("expected UnexpectedReply, got {other:?}"),
    }
    assert!(!driver.mutex().is_locked());

    conn.get_wait_handle(2).expect("wait handle after rejection");
    assert_eq!(driver.request_count(), 2);
}

#[test]
fn busy_channel_fails_fast() {
    let (_backend, driver, conn) = setup("contention");
    let conn = Arc::new(conn);
    driver.set_reply_delay(Duration::from_millis(300));

    let pinger = {
        let conn = Arc::clone(&conn);
        thread::spawn(move || conn.ping())
    };
    // The driver has the ping, so its sender holds the mutex.
    wait_until(|| driver.request_count() == 1);

    let start = Instant::now();
    let err = conn.get_wait_handle(1).unwrap_err();
    assert!(matches!(err, InteropError::Concurrency), "got {err:?}");
    let err = conn.get_raw_input_report(1, Some(Duration::from_millis(10))).unwrap_err();
    assert!(matches!(err, InteropError::Concurrency), "got {err:?}");
    assert!(start.elapsed() < Duration::from_millis(150));

    pinger.join().expect("pinger panicked").expect("ping");
    driver.set_reply_delay(Duration::ZERO);
    conn.get_wait_handle(1).expect("wait handle once idle");
}

#[test]
fn handle_is_cached_per_device() {
    let (_backend, driver, conn) = setup("cache");

    conn.get_wait_handle(1).expect("first");
    conn.get_wait_handle(1).expect("cached");
    assert_eq!(driver.request_count(), 1);

    conn.get_wait_handle(2).expect("other device");
    assert_eq!(driver.request_count(), 2);

    for _ in 0..3 {
        conn.get_raw_input_report(2, Some(Duration::from_millis(1))).expect("read");
    }
    assert_eq!(driver.request_count(), 2);
}

#[test]
fn handle_outlives_connection() {
    let (_backend, driver, conn) = setup("outlive");
    let handle = conn.get_wait_handle(1).expect("wait handle");
    drop(conn);

    driver.publish_input_report(1, &RawInputReport::default()).expect("publish");
    assert!(handle.wait(Duration::from_millis(500)).expect("wait"));
    assert!(!handle.wait(Duration::from_millis(10)).expect("auto reset"));
}

// ---------------------------------------------------------------------------
// Duplication failure through a backend whose duplicator always fails
// ---------------------------------------------------------------------------

struct FailingDuplicator;

impl HandleDuplicator for FailingDuplicator {
    fn duplicate(
        &self,
        _process_id: u32,
        _remote: RemoteHandle,
    ) -> Result<Arc<dyn SystemEvent>, PlatformError> {
        // ERROR_ACCESS_DENIED
        Err(PlatformError::new("OpenProcess", 5))
    }
}

struct NoDuplication(MemoryBackend);

impl Backend for NoDuplication {
    fn open_mapping(&self, name: &str) -> io::Result<Box<dyn FileMapping>> {
        self.0.open_mapping(name)
    }

    fn open_mutex(&self, name: &str) -> io::Result<Box<dyn SystemMutex>> {
        self.0.open_mutex(name)
    }

    fn open_event(&self, name: &str) -> io::Result<Box<dyn SystemEvent>> {
        self.0.open_event(name)
    }

    fn mapping_exists(&self, name: &str) -> bool {
        self.0.mapping_exists(name)
    }

    fn view_granularity(&self) -> usize {
        self.0.view_granularity()
    }

    fn handle_duplicator(&self) -> Box<dyn HandleDuplicator> {
        Box::new(FailingDuplicator)
    }
}

#[test]
fn duplication_failure_is_platform_error() {
    let config = unique_config("dup_fail");
    let backend = MemoryBackend::new();
    let driver = SimulatedDriver::install(&backend, config.clone()).expect("install");
    let conn = Connection::open_with(&NoDuplication(backend), config).expect("open");

    let err = conn.get_wait_handle(1).unwrap_err();
    match err {
        InteropError::Platform(e) => {
            assert_eq!(e.call, "OpenProcess");
            assert_eq!(e.code, 5);
        }
        other => panic!("expected Platform, got {other:?}"),
    }
    assert!(!driver.mutex().is_locked());

    // Failures are not cached; the next call asks the driver again.
    assert!(conn.get_wait_handle(1).is_err());
    assert_eq!(driver.request_count(), 2);
}
