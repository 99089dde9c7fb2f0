// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors

use std::time::Duration;

use tracing::trace;

use crate::connection::Connection;
use crate::device::DeviceIndex;
use crate::error::{InteropError, ReplyMismatch, Result};
use crate::report::{InputSlot, RawInputReport, SLOT_LEN};

impl Connection {
    /// Copy the latest raw input report of `device` out of the input region.
    ///
    /// With `timeout`, first waits up to that long for the device's
    /// input-report event (fetched on first use, see
    /// [`get_wait_handle`](Self::get_wait_handle)); the slot is read whether
    /// or not the event fired. Without it the slot is read immediately.
    ///
    /// Returns `Ok(None)` when the slot is empty (device disconnected).
    ///
    /// The input region is read without any lock while the driver may be
    /// writing it. Consistency is best effort: the slot is copied in one
    /// piece and a slot tagged with another device is rejected with
    /// [`UnexpectedReply`](InteropError::UnexpectedReply), but a report torn
    /// within the same device is not detected.
    pub fn get_raw_input_report(
        &self,
        device: u32,
        timeout: Option<Duration>,
    ) -> Result<Option<RawInputReport>> {
        let device = DeviceIndex::new(device)?;

        if let Some(timeout) = timeout {
            let handle = self.wait_handle(device)?;
            if !handle.wait(timeout)? {
                trace!(%device, ?timeout, "no input report signaled");
            }
        }

        let mut raw = [0u8; SLOT_LEN];
        self.input.read(0, &mut raw)?;
        let slot = InputSlot::decode(&raw)?;

        if slot.is_disconnected() {
            trace!(%device, "input slot empty");
            return Ok(None);
        }
        if slot.slot_index != device.get() {
            return Err(InteropError::UnexpectedReply(ReplyMismatch::SlotIndex {
                expected: device.get(),
                found: slot.slot_index,
            }));
        }
        Ok(Some(slot.report))
    }
}
