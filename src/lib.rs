// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// User-mode side of the DsHidMini driver's shared-memory IPC: a typed
// request/reply channel over the command region, cross-process wait-handle
// brokering and a lock-free input-report feed.

pub mod config;
pub use config::InteropConfig;

mod error;
pub use error::{InteropError, PlatformError, ReplyMismatch, Result};

pub mod device;
pub use device::{DeviceIndex, HostAddress, NtStatus, PlayerIndex, SetHostResult};

pub mod wire;

pub mod report;
pub use report::{BatteryStatus, Buttons, PacketCounter, RawInputReport};

pub mod platform;

mod region;
pub use region::RegionLayout;

mod connection;
pub use connection::Connection;

mod channel;

mod broker;
pub use broker::WaitHandle;

mod reader;

mod commands;

pub mod sim;
pub use sim::SimulatedDriver;
