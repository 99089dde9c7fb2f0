// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Error taxonomy shared by every layer of the protocol engine.

use std::fmt;
use std::io;
use std::time::Duration;

use thiserror::Error;

use crate::wire::RawHeader;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, InteropError>;

/// Every failure the protocol engine reports to its callers.
///
/// None of these are retried internally. A disconnected device is not an
/// error; the input-report reader returns `Ok(None)` for it.
#[derive(Debug, Error)]
pub enum InteropError {
    /// The driver's mapping or one of its named objects does not exist.
    #[error(
        "driver IPC unavailable, make sure that at least one compatible controller is connected and operational"
    )]
    Unavailable,

    /// A device index outside `1..=255`.
    #[error("device index {0} is outside the valid range 1..=255")]
    InvalidDeviceIndex(u32),

    /// A player indicator value outside `1..=7`.
    #[error("player index {0} is outside the valid range 1..=7")]
    PlayerIndexOutOfRange(u8),

    /// The non-blocking lock attempt found the command channel busy.
    #[error("a different thread is currently performing a data exchange")]
    Concurrency,

    /// The driver did not signal a reply within the bounded wait.
    #[error("operation timed out after {0:?} while waiting for a request reply")]
    ReplyTimeout(Duration),

    /// The reply (or input slot) did not match what the request demands.
    #[error("a request reply was malformed: {0}")]
    UnexpectedReply(ReplyMismatch),

    /// Another client already holds the resource exclusively.
    #[error("another client is already connected to the driver, can't continue initialization")]
    ExclusiveAccess,

    /// A process-open or handle-duplicate call failed.
    #[error(transparent)]
    Platform(#[from] PlatformError),

    /// Any other failure of the underlying system primitives.
    #[error("shared region access failed: {0}")]
    Io(#[from] io::Error),
}

/// Diagnostic payload of [`InteropError::UnexpectedReply`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyMismatch {
    /// The reply header failed the plausibility check.
    Header(RawHeader),
    /// The input slot is tagged with a different device.
    SlotIndex { expected: u32, found: u32 },
}

impl fmt::Display for ReplyMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Header(h) => write!(
                f,
                "Type: {}, Target: {}, Command: {}, TargetIndex: {}, Size: {}",
                h.kind, h.target, h.command, h.target_index, h.size
            ),
            Self::SlotIndex { expected, found } => {
                write!(f, "input slot holds device {found}, expected device {expected}")
            }
        }
    }
}

/// A failed platform call in the handle-duplication path.
///
/// Kept apart from the protocol errors: it signals an environment fault
/// (missing privileges, dead driver process), not a protocol fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("{call} call failed (os error {code})")]
pub struct PlatformError {
    /// Name of the failing system call, e.g. `"OpenProcess"`.
    pub call: &'static str,
    /// Raw system error code as reported by the OS.
    pub code: i32,
}

impl PlatformError {
    pub fn new(call: &'static str, code: i32) -> Self {
        Self { call, code }
    }

    /// Capture the calling thread's last OS error for `call`.
    pub fn last_os_error(call: &'static str) -> Self {
        let code = io::Error::last_os_error().raw_os_error().unwrap_or(0);
        Self { call, code }
    }
}

impl InteropError {
    /// Map a failed named-object lookup: "not found" means no driver.
    pub(crate) fn from_open(err: io::Error) -> Self {
        if err.kind() == io::ErrorKind::NotFound {
            Self::Unavailable
        } else {
            Self::Io(err)
        }
    }
}
