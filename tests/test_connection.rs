// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Opening, probing and tearing down a driver connection.

use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use padlink::platform::memory::MemoryBackend;
use padlink::platform::{
    Backend, FileMapping, HandleDuplicator, MappedView, SystemEvent, SystemMutex,
};
use padlink::wire::RemoteHandle;
use padlink::{
    Connection, InteropConfig, InteropError, PlatformError, RegionLayout, SimulatedDriver,
};
use parking_lot::Mutex;

static COUNTER: AtomicUsize = AtomicUsize::new(0);

fn unique_config(prefix: &str) -> InteropConfig {
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    InteropConfig::with_prefix(&format!("Local\\{prefix}_conn_{n}_"))
}

#[test]
fn open_without_driver_is_unavailable() {
    let backend = MemoryBackend::new();
    let config = unique_config("no_driver");

    assert!(!Connection::probe_with(&backend, &config));
    let err = Connection::open_with(&backend, config).unwrap_err();
    assert!(matches!(err, InteropError::Unavailable), "got {err:?}");
}

#[cfg(not(windows))]
#[test]
fn system_backend_reports_no_driver() {
    assert!(!Connection::probe());
    assert!(matches!(Connection::open(), Err(InteropError::Unavailable)));
}

#[test]
fn open_with_driver_present() {
    let backend = MemoryBackend::new();
    let config = unique_config("present");
    let _driver = SimulatedDriver::install(&backend, config.clone()).expect("install");

    assert!(Connection::probe_with(&backend, &config));
    let conn = Connection::open_with(&backend, config).expect("open");

    let layout = conn.layout();
    assert_eq!(layout, RegionLayout::compute(1024, 1024, 4096));
    assert_eq!(layout.input_view_offset, 0);
    assert_eq!(layout.input_interior, 1024);
}

#[test]
fn any_missing_object_is_unavailable() {
    let backend = MemoryBackend::new();
    let config = unique_config("partial");
    let _driver = SimulatedDriver::install(&backend, config.clone()).expect("install");

    backend.remove(&config.write_event_name);

    // The mapping alone satisfies the probe, but not a full open.
    assert!(Connection::probe_with(&backend, &config));
    let err = Connection::open_with(&backend, config).unwrap_err();
    assert!(matches!(err, InteropError::Unavailable), "got {err:?}");
}

#[test]
fn probe_acquires_nothing() {
    let backend = MemoryBackend::new();
    let config = unique_config("probe");
    let driver = SimulatedDriver::install(&backend, config.clone()).expect("install");

    assert!(Connection::probe_with(&backend, &config));
    assert_eq!(driver.mutex().lock_attempts(), 0);
    assert_eq!(driver.mapping().accesses(), 0);
}

#[test]
fn second_driver_is_rejected() {
    let backend = MemoryBackend::new();
    let config = unique_config("exclusive");
    let _driver = SimulatedDriver::install(&backend, config.clone()).expect("install");

    let err = SimulatedDriver::install(&backend, config).err().expect("second install");
    assert!(matches!(err, InteropError::ExclusiveAccess), "got {err:?}");
}

#[test]
fn driver_removal_is_visible_to_probe() {
    let backend = MemoryBackend::new();
    let config = unique_config("removal");
    {
        let _driver = SimulatedDriver::install(&backend, config.clone()).expect("install");
        assert!(Connection::probe_with(&backend, &config));
    }
    assert!(!Connection::probe_with(&backend, &config));
}

#[test]
fn input_view_is_aligned_to_granularity() {
    let backend = MemoryBackend::new().with_granularity(512);
    let config = unique_config("aligned").with_region_sizes(1100, 256);
    let driver = SimulatedDriver::install(&backend, config.clone()).expect("install");
    let conn = Connection::open_with(&backend, config).expect("open");

    let layout = conn.layout();
    assert_eq!(layout.input_view_offset, 1024);
    assert_eq!(layout.input_interior, 76);
    assert_eq!(layout.input_start(), 1100);

    // The simulator writes the slot at the absolute input start; the
    // connection must find it there through the aligned view.
    let mut raw = padlink::RawInputReport::default();
    raw.0[0] = 0x01;
    raw.0[8] = 0x42;
    driver.publish_input_report(4, &raw).expect("publish");
    let report = conn.get_raw_input_report(4, None).expect("read").expect("report");
    assert_eq!(report.right_thumb().0, 0x42);
}

#[test]
fn connection_is_shareable() {
    fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<Connection>();
    assert_send_sync::<padlink::WaitHandle>();
}

// ---------------------------------------------------------------------------
// Release order, observed through a backend whose objects record their drop
// ---------------------------------------------------------------------------

type DropLog = Arc<Mutex<Vec<&'static str>>>;

struct Tracked<T> {
    inner: T,
    label: &'static str,
    log: DropLog,
}

impl<T> Tracked<T> {
    fn new(inner: T, label: &'static str, log: &DropLog) -> Self {
        Self { inner, label, log: Arc::clone(log) }
    }
}

impl<T> Drop for Tracked<T> {
    fn drop(&mut self) {
        self.log.lock().push(self.label);
    }
}

impl MappedView for Tracked<Box<dyn MappedView>> {
    fn len(&self) -> usize {
        self.inner.len()
    }

    fn read(&self, offset: usize, dst: &mut [u8]) -> io::Result<()> {
        self.inner.read(offset, dst)
    }

    fn write(&self, offset: usize, src: &[u8]) -> io::Result<()> {
        self.inner.write(offset, src)
    }
}

impl FileMapping for Tracked<Box<dyn FileMapping>> {
    fn map_view(&self, offset: usize, len: usize) -> io::Result<Box<dyn MappedView>> {
        let view = self.inner.map_view(offset, len)?;
        Ok(Box::new(Tracked::new(view, "view", &self.log)))
    }
}

impl<T: SystemMutex> SystemMutex for Tracked<T> {
    fn lock(&self) -> io::Result<()> {
        self.inner.lock()
    }

    fn try_lock(&self) -> io::Result<bool> {
        self.inner.try_lock()
    }

    fn unlock(&self) -> io::Result<()> {
        self.inner.unlock()
    }
}

impl<T: SystemEvent> SystemEvent for Tracked<T> {
    fn set(&self) -> io::Result<()> {
        self.inner.set()
    }

    fn wait(&self, timeout: Duration) -> io::Result<bool> {
        self.inner.wait(timeout)
    }
}

/// Tags every duplicated handle; the duplicator itself is not tracked.
struct TrackingDuplicator {
    inner: Box<dyn HandleDuplicator>,
    log: DropLog,
}

impl HandleDuplicator for TrackingDuplicator {
    fn duplicate(
        &self,
        process_id: u32,
        remote: RemoteHandle,
    ) -> Result<Arc<dyn SystemEvent>, PlatformError> {
        let event = self.inner.duplicate(process_id, remote)?;
        Ok(Arc::new(Tracked::new(event, "wait_handle", &self.log)))
    }
}

struct TrackingBackend {
    inner: MemoryBackend,
    log: DropLog,
}

impl Backend for TrackingBackend {
    fn open_mapping(&self, name: &str) -> io::Result<Box<dyn FileMapping>> {
        let mapping = self.inner.open_mapping(name)?;
        Ok(Box::new(Tracked::new(mapping, "mapping", &self.log)))
    }

    fn open_mutex(&self, name: &str) -> io::Result<Box<dyn SystemMutex>> {
        let mutex: Arc<dyn SystemMutex> = Arc::from(self.inner.open_mutex(name)?);
        Ok(Box::new(Tracked::new(mutex, "mutex", &self.log)))
    }

    fn open_event(&self, name: &str) -> io::Result<Box<dyn SystemEvent>> {
        let event: Arc<dyn SystemEvent> = Arc::from(self.inner.open_event(name)?);
        Ok(Box::new(Tracked::new(event, "event", &self.log)))
    }

    fn mapping_exists(&self, name: &str) -> bool {
        self.inner.mapping_exists(name)
    }

    fn view_granularity(&self) -> usize {
        self.inner.view_granularity()
    }

    fn handle_duplicator(&self) -> Box<dyn HandleDuplicator> {
        Box::new(TrackingDuplicator {
            inner: self.inner.handle_duplicator(),
            log: Arc::clone(&self.log),
        })
    }
}

#[test]
fn drop_releases_in_driver_order() {
    let backend = MemoryBackend::new();
    let config = unique_config("release_order");
    let driver = SimulatedDriver::install(&backend, config.clone()).expect("install");
    let log = DropLog::default();
    let tracking = TrackingBackend { inner: backend, log: Arc::clone(&log) };

    let conn = Connection::open_with(&tracking, config).expect("open");
    drop(conn.get_wait_handle(1).expect("wait handle"));
    let early = log.lock().clone();
    assert!(early.is_empty(), "released early: {early:?}");

    drop(conn);
    assert_eq!(
        *log.lock(),
        ["view", "view", "mapping", "event", "event", "wait_handle", "mutex"]
    );
    assert!(!driver.mutex().is_locked());
}
