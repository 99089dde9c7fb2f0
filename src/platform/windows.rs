// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Win32 implementation of the platform traits: the driver's file mapping,
// its named mutex and events, and cross-process handle duplication.

use std::io;
use std::ptr;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};
use windows_sys::Win32::Foundation::{
    CloseHandle, DuplicateHandle, DUPLICATE_SAME_ACCESS, FALSE, HANDLE, WAIT_ABANDONED,
    WAIT_OBJECT_0, WAIT_TIMEOUT,
};
use windows_sys::Win32::System::Memory::{
    MapViewOfFile, OpenFileMappingW, UnmapViewOfFile, FILE_MAP_READ, FILE_MAP_WRITE,
    MEMORY_MAPPED_VIEW_ADDRESS,
};
use windows_sys::Win32::System::SystemInformation::{GetSystemInfo, SYSTEM_INFO};
use windows_sys::Win32::System::Threading::{
    GetCurrentProcess, OpenEventW, OpenMutexW, OpenProcess, ReleaseMutex, SetEvent,
    WaitForSingleObject, EVENT_MODIFY_STATE, INFINITE, MUTEX_MODIFY_STATE, PROCESS_DUP_HANDLE,
    SYNCHRONIZATION_SYNCHRONIZE,
};

use super::{Backend, FileMapping, HandleDuplicator, MappedView, SystemEvent, SystemMutex};
use crate::error::PlatformError;
use crate::wire::RemoteHandle;

/// Encode a name as a null-terminated wide string for Win32 APIs.
fn to_wide(s: &str) -> Vec<u16> {
    s.encode_utf16().chain(std::iter::once(0)).collect()
}

/// Milliseconds for `WaitForSingleObject`, saturating below `INFINITE`.
fn wait_millis(timeout: Duration) -> u32 {
    u32::try_from(timeout.as_millis()).unwrap_or(INFINITE - 1).min(INFINITE - 1)
}

// ---------------------------------------------------------------------------
// OwnedHandle: closes on drop
// ---------------------------------------------------------------------------

struct OwnedHandle(HANDLE);

// SAFETY: kernel object handles are process-wide and usable from any thread.
unsafe impl Send for OwnedHandle {}
unsafe impl Sync for OwnedHandle {}

impl OwnedHandle {
    fn new(h: HANDLE) -> io::Result<Self> {
        if h.is_null() {
            return Err(io::Error::last_os_error());
        }
        Ok(Self(h))
    }

    fn wait(&self, millis: u32) -> io::Result<bool> {
        match unsafe { WaitForSingleObject(self.0, millis) } {
            WAIT_OBJECT_0 => Ok(true),
            WAIT_TIMEOUT => Ok(false),
            WAIT_ABANDONED => {
                // The previous owner exited while holding it; ownership is ours now.
                warn!("named mutex was abandoned by its previous owner");
                Ok(true)
            }
            _ => Err(io::Error::last_os_error()),
        }
    }
}

impl Drop for OwnedHandle {
    fn drop(&mut self) {
        if !self.0.is_null() && unsafe { CloseHandle(self.0) } == 0 {
            warn!(error = %io::Error::last_os_error(), "CloseHandle failed");
        }
    }
}

// ---------------------------------------------------------------------------
// File mapping and views
// ---------------------------------------------------------------------------

struct Win32Mapping {
    handle: OwnedHandle,
}

impl FileMapping for Win32Mapping {
    fn map_view(&self, offset: usize, len: usize) -> io::Result<Box<dyn MappedView>> {
        let offset = offset as u64;
        let base = unsafe {
            MapViewOfFile(
                self.handle.0,
                FILE_MAP_READ | FILE_MAP_WRITE,
                (offset >> 32) as u32,
                offset as u32,
                len,
            )
        };
        if base.Value.is_null() {
            return Err(io::Error::last_os_error());
        }
        Ok(Box::new(Win32View { base, len }))
    }
}

struct Win32View {
    base: MEMORY_MAPPED_VIEW_ADDRESS,
    len: usize,
}

// SAFETY: the view stays mapped until drop; all access goes through bounds-checked copies.
unsafe impl Send for Win32View {}
unsafe impl Sync for Win32View {}

impl Win32View {
    fn check(&self, offset: usize, len: usize) -> io::Result<()> {
        match offset.checked_add(len) {
            Some(end) if end <= self.len => Ok(()),
            _ => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("access {offset}+{len} outside view of {} bytes", self.len),
            )),
        }
    }
}

impl MappedView for Win32View {
    fn len(&self) -> usize {
        self.len
    }

    fn read(&self, offset: usize, dst: &mut [u8]) -> io::Result<()> {
        self.check(offset, dst.len())?;
        unsafe {
            let src = (self.base.Value as *const u8).add(offset);
            ptr::copy_nonoverlapping(src, dst.as_mut_ptr(), dst.len());
        }
        Ok(())
    }

    fn write(&self, offset: usize, src: &[u8]) -> io::Result<()> {
        self.check(offset, src.len())?;
        unsafe {
            let dst = (self.base.Value as *mut u8).add(offset);
            ptr::copy_nonoverlapping(src.as_ptr(), dst, src.len());
        }
        Ok(())
    }
}

impl Drop for Win32View {
    fn drop(&mut self) {
        if unsafe { UnmapViewOfFile(self.base) } == 0 {
            warn!(error = %io::Error::last_os_error(), "UnmapViewOfFile failed");
        }
    }
}

// ---------------------------------------------------------------------------
// Named mutex and events
// ---------------------------------------------------------------------------

struct Win32Mutex {
    handle: OwnedHandle,
}

impl SystemMutex for Win32Mutex {
    fn lock(&self) -> io::Result<()> {
        if self.handle.wait(INFINITE)? {
            Ok(())
        } else {
            Err(io::Error::new(io::ErrorKind::TimedOut, "mutex lock timed out"))
        }
    }

    fn try_lock(&self) -> io::Result<bool> {
        self.handle.wait(0)
    }

    fn unlock(&self) -> io::Result<()> {
        if unsafe { ReleaseMutex(self.handle.0) } == 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }
}

struct Win32Event {
    handle: OwnedHandle,
}

impl SystemEvent for Win32Event {
    fn set(&self) -> io::Result<()> {
        if unsafe { SetEvent(self.handle.0) } == 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    fn wait(&self, timeout: Duration) -> io::Result<bool> {
        self.handle.wait(wait_millis(timeout))
    }
}

// ---------------------------------------------------------------------------
// Handle duplication
// ---------------------------------------------------------------------------

struct Win32Duplicator;

impl HandleDuplicator for Win32Duplicator {
    fn duplicate(
        &self,
        process_id: u32,
        remote: RemoteHandle,
    ) -> Result<Arc<dyn SystemEvent>, PlatformError> {
        let process = unsafe { OpenProcess(PROCESS_DUP_HANDLE, FALSE, process_id) };
        let process =
            OwnedHandle::new(process).map_err(|_| PlatformError::last_os_error("OpenProcess"))?;

        let mut local: HANDLE = ptr::null_mut();
        let ok = unsafe {
            DuplicateHandle(
                process.0,
                remote.0 as HANDLE,
                GetCurrentProcess(),
                &mut local,
                0,
                FALSE,
                DUPLICATE_SAME_ACCESS,
            )
        };
        if ok == 0 {
            return Err(PlatformError::last_os_error("DuplicateHandle"));
        }
        // `process` closes here; the duplicate is ours alone.
        debug!(process_id, remote = remote.0, "duplicated driver wait handle");
        let handle = OwnedHandle::new(local)
            .map_err(|_| PlatformError::last_os_error("DuplicateHandle"))?;
        Ok(Arc::new(Win32Event { handle }))
    }
}

// ---------------------------------------------------------------------------
// Backend
// ---------------------------------------------------------------------------

/// The driver's objects as published in the `Global\` namespace.
pub struct Win32Backend;

impl Backend for Win32Backend {
    fn open_mapping(&self, name: &str) -> io::Result<Box<dyn FileMapping>> {
        let wide = to_wide(name);
        let h = unsafe { OpenFileMappingW(FILE_MAP_READ | FILE_MAP_WRITE, FALSE, wide.as_ptr()) };
        Ok(Box::new(Win32Mapping { handle: OwnedHandle::new(h)? }))
    }

    fn open_mutex(&self, name: &str) -> io::Result<Box<dyn SystemMutex>> {
        let wide = to_wide(name);
        let h = unsafe {
            OpenMutexW(SYNCHRONIZATION_SYNCHRONIZE | MUTEX_MODIFY_STATE, FALSE, wide.as_ptr())
        };
        Ok(Box::new(Win32Mutex { handle: OwnedHandle::new(h)? }))
    }

    fn open_event(&self, name: &str) -> io::Result<Box<dyn SystemEvent>> {
        let wide = to_wide(name);
        let h = unsafe {
            OpenEventW(SYNCHRONIZATION_SYNCHRONIZE | EVENT_MODIFY_STATE, FALSE, wide.as_ptr())
        };
        Ok(Box::new(Win32Event { handle: OwnedHandle::new(h)? }))
    }

    fn mapping_exists(&self, name: &str) -> bool {
        let wide = to_wide(name);
        let h = unsafe { OpenFileMappingW(FILE_MAP_READ, FALSE, wide.as_ptr()) };
        OwnedHandle::new(h).is_ok()
    }

    fn view_granularity(&self) -> usize {
        let mut info: SYSTEM_INFO = unsafe { std::mem::zeroed() };
        unsafe { GetSystemInfo(&mut info) };
        info.dwAllocationGranularity as usize
    }

    fn handle_duplicator(&self) -> Box<dyn HandleDuplicator> {
        Box::new(Win32Duplicator)
    }
}
