// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// In-process implementation of the platform traits.
//
// A `MemoryBackend` is an explicit registry of named objects shared by every
// clone of it. The driver simulator creates objects in it, connections open
// them by name, exactly as they would the Win32 objects. The mutex follows
// Win32 semantics: owned by a thread, recursive for its owner, and only the
// owner may release it.

use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use super::{Backend, FileMapping, HandleDuplicator, MappedView, SystemEvent, SystemMutex};
use crate::error::PlatformError;
use crate::wire::RemoteHandle;

const DEFAULT_GRANULARITY: usize = 4096;

// Win32 error codes reported by the fake duplicator.
const ERROR_INVALID_HANDLE: i32 = 6;
const ERROR_INVALID_PARAMETER: i32 = 87;

fn not_found(name: &str) -> io::Error {
    io::Error::new(io::ErrorKind::NotFound, format!("{name} not found"))
}

fn already_exists(name: &str) -> io::Error {
    io::Error::new(io::ErrorKind::AlreadyExists, format!("{name} already exists"))
}

// ---------------------------------------------------------------------------
// MemoryMapping
// ---------------------------------------------------------------------------

/// A named block of bytes standing in for a file mapping.
pub struct MemoryMapping {
    bytes: Mutex<Vec<u8>>,
    accesses: AtomicU64,
}

impl MemoryMapping {
    fn new(size: usize) -> Self {
        Self { bytes: Mutex::new(vec![0; size]), accesses: AtomicU64::new(0) }
    }

    pub fn len(&self) -> usize {
        self.bytes.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of reads and writes performed through views so far.
    pub fn accesses(&self) -> u64 {
        self.accesses.load(Ordering::Acquire)
    }

    /// Read at an absolute offset, bypassing views (driver side).
    pub fn read_at(&self, offset: usize, dst: &mut [u8]) -> io::Result<()> {
        let bytes = self.bytes.lock();
        let src = bytes.get(offset..offset.saturating_add(dst.len())).ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "read outside mapping")
        })?;
        dst.copy_from_slice(src);
        Ok(())
    }

    /// Write at an absolute offset, bypassing views (driver side).
    pub fn write_at(&self, offset: usize, src: &[u8]) -> io::Result<()> {
        let mut bytes = self.bytes.lock();
        let dst = bytes.get_mut(offset..offset.saturating_add(src.len())).ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "write outside mapping")
        })?;
        dst.copy_from_slice(src);
        Ok(())
    }
}

struct MemoryFileMapping {
    mapping: Arc<MemoryMapping>,
    granularity: usize,
}

impl FileMapping for MemoryFileMapping {
    fn map_view(&self, offset: usize, len: usize) -> io::Result<Box<dyn MappedView>> {
        if offset % self.granularity != 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("view offset {offset} is not a multiple of {}", self.granularity),
            ));
        }
        let end = offset.checked_add(len).unwrap_or(usize::MAX);
        if end > self.mapping.len() {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "view exceeds mapping"));
        }
        Ok(Box::new(MemoryView { mapping: Arc::clone(&self.mapping), offset, len }))
    }
}

struct MemoryView {
    mapping: Arc<MemoryMapping>,
    offset: usize,
    len: usize,
}

impl MemoryView {
    fn absolute(&self, offset: usize, len: usize) -> io::Result<usize> {
        match offset.checked_add(len) {
            Some(end) if end <= self.len => Ok(self.offset + offset),
            _ => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("access {offset}+{len} outside view of {} bytes", self.len),
            )),
        }
    }
}

impl MappedView for MemoryView {
    fn len(&self) -> usize {
        self.len
    }

    fn read(&self, offset: usize, dst: &mut [u8]) -> io::Result<()> {
        let at = self.absolute(offset, dst.len())?;
        self.mapping.accesses.fetch_add(1, Ordering::AcqRel);
        self.mapping.read_at(at, dst)
    }

    fn write(&self, offset: usize, src: &[u8]) -> io::Result<()> {
        let at = self.absolute(offset, src.len())?;
        self.mapping.accesses.fetch_add(1, Ordering::AcqRel);
        self.mapping.write_at(at, src)
    }
}

// ---------------------------------------------------------------------------
// MemoryMutex
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Ownership {
    owner: Option<ThreadId>,
    depth: u32,
}

/// Thread-owned recursive lock with Win32 named-mutex semantics.
#[derive(Default)]
pub struct MemoryMutex {
    state: Mutex<Ownership>,
    released: Condvar,
    attempts: AtomicU64,
}

impl MemoryMutex {
    /// Every `lock` / `try_lock` call made so far, successful or not.
    pub fn lock_attempts(&self) -> u64 {
        self.attempts.load(Ordering::Acquire)
    }

    pub fn is_locked(&self) -> bool {
        self.state.lock().owner.is_some()
    }
}

impl SystemMutex for MemoryMutex {
    fn lock(&self) -> io::Result<()> {
        self.attempts.fetch_add(1, Ordering::AcqRel);
        let me = thread::current().id();
        let mut st = self.state.lock();
        loop {
            match st.owner {
                None => {
                    st.owner = Some(me);
                    st.depth = 1;
                    return Ok(());
                }
                Some(owner) if owner == me => {
                    st.depth += 1;
                    return Ok(());
                }
                Some(_) => self.released.wait(&mut st),
            }
        }
    }

    fn try_lock(&self) -> io::Result<bool> {
        self.attempts.fetch_add(1, Ordering::AcqRel);
        let me = thread::current().id();
        let mut st = self.state.lock();
        match st.owner {
            None => {
                st.owner = Some(me);
                st.depth = 1;
                Ok(true)
            }
            Some(owner) if owner == me => {
                st.depth += 1;
                Ok(true)
            }
            Some(_) => Ok(false),
        }
    }

    fn unlock(&self) -> io::Result<()> {
        let me = thread::current().id();
        let mut st = self.state.lock();
        if st.owner != Some(me) {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "attempt to release mutex not owned by caller",
            ));
        }
        st.depth -= 1;
        if st.depth == 0 {
            st.owner = None;
            self.released.notify_one();
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MemoryEvent
// ---------------------------------------------------------------------------

/// Auto-reset event: a successful wait consumes the signal.
#[derive(Default)]
pub struct MemoryEvent {
    signaled: Mutex<bool>,
    cond: Condvar,
    sets: AtomicU64,
}

impl MemoryEvent {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `set` calls so far.
    pub fn set_count(&self) -> u64 {
        self.sets.load(Ordering::Acquire)
    }
}

impl SystemEvent for MemoryEvent {
    fn set(&self) -> io::Result<()> {
        self.sets.fetch_add(1, Ordering::AcqRel);
        *self.signaled.lock() = true;
        self.cond.notify_one();
        Ok(())
    }

    fn wait(&self, timeout: Duration) -> io::Result<bool> {
        let mut signaled = self.signaled.lock();
        match Instant::now().checked_add(timeout) {
            Some(deadline) => {
                while !*signaled {
                    if self.cond.wait_until(&mut signaled, deadline).timed_out() {
                        break;
                    }
                }
            }
            None => {
                while !*signaled {
                    self.cond.wait(&mut signaled);
                }
            }
        }
        Ok(std::mem::replace(&mut *signaled, false))
    }
}

// ---------------------------------------------------------------------------
// MemoryBackend
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Registry {
    mappings: Mutex<HashMap<String, Arc<MemoryMapping>>>,
    mutexes: Mutex<HashMap<String, Arc<MemoryMutex>>>,
    events: Mutex<HashMap<String, Arc<MemoryEvent>>>,
    /// Per-process handle tables: pid -> handle value -> event.
    processes: Mutex<HashMap<u32, HashMap<usize, Arc<MemoryEvent>>>>,
    next_handle: AtomicUsize,
}

/// In-process namespace of mappings, mutexes and events.
///
/// Cloning shares the namespace.
#[derive(Clone)]
pub struct MemoryBackend {
    registry: Arc<Registry>,
    granularity: usize,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self { registry: Arc::new(Registry::default()), granularity: DEFAULT_GRANULARITY }
    }

    /// Use a different view-offset alignment.
    pub fn with_granularity(mut self, granularity: usize) -> Self {
        self.granularity = granularity.max(1);
        self
    }

    pub fn create_mapping(&self, name: &str, size: usize) -> io::Result<Arc<MemoryMapping>> {
        let mut map = self.registry.mappings.lock();
        if map.contains_key(name) {
            return Err(already_exists(name));
        }
        let mapping = Arc::new(MemoryMapping::new(size));
        map.insert(name.to_owned(), Arc::clone(&mapping));
        Ok(mapping)
    }

    pub fn create_mutex(&self, name: &str) -> io::Result<Arc<MemoryMutex>> {
        let mut map = self.registry.mutexes.lock();
        if map.contains_key(name) {
            return Err(already_exists(name));
        }
        let mutex = Arc::new(MemoryMutex::default());
        map.insert(name.to_owned(), Arc::clone(&mutex));
        Ok(mutex)
    }

    pub fn create_event(&self, name: &str) -> io::Result<Arc<MemoryEvent>> {
        let mut map = self.registry.events.lock();
        if map.contains_key(name) {
            return Err(already_exists(name));
        }
        let event = Arc::new(MemoryEvent::new());
        map.insert(name.to_owned(), Arc::clone(&event));
        Ok(event)
    }

    pub fn mapping(&self, name: &str) -> Option<Arc<MemoryMapping>> {
        self.registry.mappings.lock().get(name).cloned()
    }

    pub fn mutex(&self, name: &str) -> Option<Arc<MemoryMutex>> {
        self.registry.mutexes.lock().get(name).cloned()
    }

    pub fn event(&self, name: &str) -> Option<Arc<MemoryEvent>> {
        self.registry.events.lock().get(name).cloned()
    }

    /// Drop every object called `name`. Already-opened references stay valid.
    pub fn remove(&self, name: &str) {
        self.registry.mappings.lock().remove(name);
        self.registry.mutexes.lock().remove(name);
        self.registry.events.lock().remove(name);
    }

    /// Put `event` into the handle table of process `pid` and return the
    /// value that identifies it there.
    pub fn register_handle(&self, pid: u32, event: Arc<MemoryEvent>) -> RemoteHandle {
        // Win32 handle values are multiples of 4.
        let value = (self.registry.next_handle.fetch_add(1, Ordering::AcqRel) + 1) * 4;
        self.registry.processes.lock().entry(pid).or_default().insert(value, event);
        RemoteHandle(value)
    }

    /// Forget the handle table of `pid`, as if the process exited.
    pub fn close_process(&self, pid: u32) {
        self.registry.processes.lock().remove(&pid);
    }
}

impl Backend for MemoryBackend {
    fn open_mapping(&self, name: &str) -> io::Result<Box<dyn FileMapping>> {
        let mapping = self.mapping(name).ok_or_else(|| not_found(name))?;
        Ok(Box::new(MemoryFileMapping { mapping, granularity: self.granularity }))
    }

    fn open_mutex(&self, name: &str) -> io::Result<Box<dyn SystemMutex>> {
        let mutex = self.mutex(name).ok_or_else(|| not_found(name))?;
        Ok(Box::new(mutex))
    }

    fn open_event(&self, name: &str) -> io::Result<Box<dyn SystemEvent>> {
        let event = self.event(name).ok_or_else(|| not_found(name))?;
        Ok(Box::new(event))
    }

    fn mapping_exists(&self, name: &str) -> bool {
        self.registry.mappings.lock().contains_key(name)
    }

    fn view_granularity(&self) -> usize {
        self.granularity
    }

    fn handle_duplicator(&self) -> Box<dyn HandleDuplicator> {
        Box::new(MemoryDuplicator { registry: Arc::clone(&self.registry) })
    }
}

struct MemoryDuplicator {
    registry: Arc<Registry>,
}

impl HandleDuplicator for MemoryDuplicator {
    fn duplicate(
        &self,
        process_id: u32,
        remote: RemoteHandle,
    ) -> Result<Arc<dyn SystemEvent>, PlatformError> {
        let processes = self.registry.processes.lock();
        let table = processes
            .get(&process_id)
            .ok_or(PlatformError::new("OpenProcess", ERROR_INVALID_PARAMETER))?;
        let event = table
            .get(&remote.0)
            .ok_or(PlatformError::new("DuplicateHandle", ERROR_INVALID_HANDLE))?;
        Ok(Arc::clone(event) as Arc<dyn SystemEvent>)
    }
}
