// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// One request/reply exchange over the shared command region.
//
// Protocol, under the command mutex:
//   write request -> set "write finished" -> wait "reply ready"
//   -> read header -> plausibility check -> read payload
// The mutex is released on every exit path by `ChannelGuard`.

use std::time::Duration;

use tracing::{trace, warn};

use crate::connection::Connection;
use crate::error::{InteropError, ReplyMismatch, Result};
use crate::platform::SystemMutex;
use crate::wire::{RawHeader, Reader, Reply, Request, HEADER_LEN};

/// How the command mutex is acquired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LockMode {
    /// Wait as long as it takes.
    Blocking,
    /// Fail with [`InteropError::Concurrency`] if anyone holds it.
    Try,
}

/// Holds the command mutex; releases it on drop.
struct ChannelGuard<'a> {
    mutex: &'a dyn SystemMutex,
}

impl<'a> ChannelGuard<'a> {
    fn acquire(mutex: &'a dyn SystemMutex, mode: LockMode) -> Result<Self> {
        match mode {
            LockMode::Blocking => mutex.lock()?,
            LockMode::Try => {
                if !mutex.try_lock()? {
                    return Err(InteropError::Concurrency);
                }
            }
        }
        Ok(Self { mutex })
    }
}

impl Drop for ChannelGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.mutex.unlock() {
            warn!(error = %e, "failed to release command mutex");
        }
    }
}

impl Connection {
    /// Run one exchange and return the decoded reply.
    ///
    /// After a [`InteropError::ReplyTimeout`] the channel is indeterminate.
    /// A late reply is only discarded if it lands before the next exchange
    /// starts; one that lands afterwards is taken as that exchange's reply
    /// whenever the headers match, since nothing correlates the two.
    pub(crate) fn exchange<Q: Request>(
        &self,
        request: &Q,
        mode: LockMode,
        timeout: Duration,
    ) -> Result<Q::Reply> {
        let _guard = ChannelGuard::acquire(self.mutex.as_ref(), mode)?;

        // A reply that arrived after an earlier exchange timed out is stale.
        if self.reply_ready.wait(Duration::ZERO)? {
            trace!("discarded stale reply signal");
        }

        let bytes = request.encode();
        trace!(
            command = ?request.command(),
            index = request.target_index(),
            size = bytes.len(),
            "sending request"
        );
        self.command.write(0, &bytes)?;
        self.request_ready.set()?;

        if !self.reply_ready.wait(timeout)? {
            warn!(command = ?request.command(), ?timeout, "no reply from driver");
            return Err(InteropError::ReplyTimeout(timeout));
        }

        let mut header = [0u8; HEADER_LEN];
        self.command.read(0, &mut header)?;
        let header = RawHeader::decode(&mut Reader::new(&header))?;
        let expected = request.expected_reply();
        if header != expected {
            warn!(?header, ?expected, "implausible reply header");
            return Err(InteropError::UnexpectedReply(ReplyMismatch::Header(header)));
        }

        let mut payload = vec![0u8; <Q::Reply as Reply>::PAYLOAD_LEN];
        self.command.read(HEADER_LEN, &mut payload)?;
        Ok(<Q::Reply as Reply>::read_payload(&mut Reader::new(&payload))?)
    }
}
