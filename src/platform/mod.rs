// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Narrow capability traits over the system primitives the protocol engine
// needs. The engine only talks to these traits, so it runs unchanged over
// the Win32 objects published by the driver or over the in-process
// `MemoryBackend` used by the simulator and the tests.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use crate::error::PlatformError;
use crate::wire::RemoteHandle;

pub mod memory;

#[cfg(windows)]
pub mod windows;

/// A view of part of a file mapping. Offsets are relative to the view.
pub trait MappedView: Send + Sync {
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy `dst.len()` bytes starting at `offset` out of the view.
    fn read(&self, offset: usize, dst: &mut [u8]) -> io::Result<()>;

    /// Copy `src` into the view starting at `offset`.
    fn write(&self, offset: usize, src: &[u8]) -> io::Result<()>;
}

/// An opened, named file mapping.
pub trait FileMapping: Send + Sync {
    /// Map `len` bytes starting at `offset`. `offset` must be a multiple of
    /// the backend's [`view_granularity`](Backend::view_granularity).
    fn map_view(&self, offset: usize, len: usize) -> io::Result<Box<dyn MappedView>>;
}

/// A named, system-wide mutual-exclusion lock.
pub trait SystemMutex: Send + Sync {
    /// Block until the lock is held by the calling thread.
    fn lock(&self) -> io::Result<()>;

    /// `Ok(false)` if another owner holds the lock.
    fn try_lock(&self) -> io::Result<bool>;

    fn unlock(&self) -> io::Result<()>;
}

/// A named, auto-reset event.
pub trait SystemEvent: Send + Sync {
    fn set(&self) -> io::Result<()>;

    /// `Ok(true)` if signaled within `timeout`, `Ok(false)` on timeout.
    fn wait(&self, timeout: Duration) -> io::Result<bool>;
}

impl<T: SystemMutex + ?Sized> SystemMutex for Arc<T> {
    fn lock(&self) -> io::Result<()> {
        (**self).lock()
    }

    fn try_lock(&self) -> io::Result<bool> {
        (**self).try_lock()
    }

    fn unlock(&self) -> io::Result<()> {
        (**self).unlock()
    }
}

impl<T: SystemEvent + ?Sized> SystemEvent for Arc<T> {
    fn set(&self) -> io::Result<()> {
        (**self).set()
    }

    fn wait(&self, timeout: Duration) -> io::Result<bool> {
        (**self).wait(timeout)
    }
}

/// Turns a handle value owned by another process into one the caller can
/// wait on directly.
pub trait HandleDuplicator: Send + Sync {
    fn duplicate(
        &self,
        process_id: u32,
        remote: RemoteHandle,
    ) -> Result<Arc<dyn SystemEvent>, PlatformError>;
}

/// Locates the driver's named objects.
///
/// Every `open_*` reports a missing object as [`io::ErrorKind::NotFound`].
pub trait Backend: Send + Sync {
    fn open_mapping(&self, name: &str) -> io::Result<Box<dyn FileMapping>>;

    fn open_mutex(&self, name: &str) -> io::Result<Box<dyn SystemMutex>>;

    fn open_event(&self, name: &str) -> io::Result<Box<dyn SystemEvent>>;

    /// Existence check for a mapping; acquires nothing.
    fn mapping_exists(&self, name: &str) -> bool;

    /// Alignment required for view offsets.
    fn view_granularity(&self) -> usize;

    fn handle_duplicator(&self) -> Box<dyn HandleDuplicator>;
}

/// The backend for the driver on this machine.
#[cfg(windows)]
pub fn system() -> &'static dyn Backend {
    &windows::Win32Backend
}

/// The driver only exists on Windows; elsewhere nothing is ever found.
#[cfg(not(windows))]
pub fn system() -> &'static dyn Backend {
    &Absent
}

#[cfg(not(windows))]
struct Absent;

#[cfg(not(windows))]
impl Absent {
    fn not_found(name: &str) -> io::Error {
        io::Error::new(io::ErrorKind::NotFound, format!("{name} not found"))
    }
}

#[cfg(not(windows))]
impl Backend for Absent {
    fn open_mapping(&self, name: &str) -> io::Result<Box<dyn FileMapping>> {
        Err(Self::not_found(name))
    }

    fn open_mutex(&self, name: &str) -> io::Result<Box<dyn SystemMutex>> {
        Err(Self::not_found(name))
    }

    fn open_event(&self, name: &str) -> io::Result<Box<dyn SystemEvent>> {
        Err(Self::not_found(name))
    }

    fn mapping_exists(&self, _name: &str) -> bool {
        false
    }

    fn view_granularity(&self) -> usize {
        4096
    }

    fn handle_duplicator(&self) -> Box<dyn HandleDuplicator> {
        Box::new(Absent)
    }
}

#[cfg(not(windows))]
impl HandleDuplicator for Absent {
    fn duplicate(
        &self,
        _process_id: u32,
        _remote: RemoteHandle,
    ) -> Result<Arc<dyn SystemEvent>, PlatformError> {
        // ERROR_CALL_NOT_IMPLEMENTED
        Err(PlatformError::new("OpenProcess", 120))
    }
}
