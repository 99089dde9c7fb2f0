// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Retrieval of the driver's per-device input-report event and its
// duplication into this process.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::channel::LockMode;
use crate::connection::Connection;
use crate::device::DeviceIndex;
use crate::error::Result;
use crate::platform::SystemEvent;
use crate::wire::GetWaitHandleRequest;

/// A locally owned, auto-reset event the driver sets whenever it publishes
/// a new input report for one device.
///
/// Clones share the same handle; it stays valid after the connection that
/// produced it is dropped.
#[derive(Clone)]
pub struct WaitHandle(Arc<dyn SystemEvent>);

impl WaitHandle {
    /// `true` if signaled within `timeout`.
    pub fn wait(&self, timeout: Duration) -> Result<bool> {
        Ok(self.0.wait(timeout)?)
    }
}

impl fmt::Debug for WaitHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("WaitHandle").finish_non_exhaustive()
    }
}

impl Connection {
    /// The input-report event for `device`, fetched once per connection.
    ///
    /// The lookup never waits for the command mutex: if another exchange is
    /// in flight, in this process or any other, it fails with
    /// [`Concurrency`](crate::InteropError::Concurrency).
    pub fn get_wait_handle(&self, device: u32) -> Result<WaitHandle> {
        self.wait_handle(DeviceIndex::new(device)?)
    }

    pub(crate) fn wait_handle(&self, device: DeviceIndex) -> Result<WaitHandle> {
        if let Some(handle) = self.wait_handles.lock().get(&device) {
            return Ok(handle.clone());
        }

        // The cache lock is not held across the exchange.
        let reply = self.exchange(
            &GetWaitHandleRequest { device },
            LockMode::Try,
            self.config().reply_timeout,
        )?;
        let event = self.duplicator.duplicate(reply.process_id, reply.handle)?;
        debug!(%device, process_id = reply.process_id, "obtained input report wait handle");

        let mut cache = self.wait_handles.lock();
        Ok(cache.entry(device).or_insert(WaitHandle(event)).clone())
    }
}
