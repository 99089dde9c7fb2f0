// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Typed driver commands. Arguments are validated before the command mutex
// is touched.

use std::time::Duration;

use crate::channel::LockMode;
use crate::connection::Connection;
use crate::device::{DeviceIndex, HostAddress, NtStatus, PlayerIndex, SetHostResult};
use crate::error::Result;
use crate::wire::{PairToRequest, PingRequest, SetPlayerIndexRequest};

impl Connection {
    /// Round-trip a ping through the driver.
    pub fn ping(&self) -> Result<()> {
        self.ping_with_timeout(self.config().reply_timeout)
    }

    /// Ping with an explicit reply timeout.
    ///
    /// If this times out, the driver may still answer later. That late
    /// reply can be read by the next exchange on this connection unless it
    /// arrives before that exchange begins.
    pub fn ping_with_timeout(&self, timeout: Duration) -> Result<()> {
        self.exchange(&PingRequest, LockMode::Blocking, timeout)?;
        Ok(())
    }

    /// Pair `device` with a new host. [`HostAddress::CLEARED`] unpairs it.
    ///
    /// The driver's status codes are passed through unchanged.
    pub fn set_host_address(&self, device: u32, address: HostAddress) -> Result<SetHostResult> {
        let device = DeviceIndex::new(device)?;
        let reply = self.exchange(
            &PairToRequest { device, address },
            LockMode::Blocking,
            self.config().reply_timeout,
        )?;
        Ok(reply.into())
    }

    /// Light the player indicator `player` (1..=7) on `device`.
    pub fn set_player_index(&self, device: u32, player: u8) -> Result<NtStatus> {
        let device = DeviceIndex::new(device)?;
        let player = PlayerIndex::new(player)?;
        let reply = self.exchange(
            &SetPlayerIndexRequest { device, player },
            LockMode::Blocking,
            self.config().reply_timeout,
        )?;
        Ok(NtStatus(reply.status))
    }
}
