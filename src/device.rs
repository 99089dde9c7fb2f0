// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Validated argument types for device-targeted operations.

use std::fmt;
use std::str::FromStr;

use crate::error::{InteropError, Result};

/// One-based device slot index, always within `1..=255`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceIndex(u8);

impl DeviceIndex {
    pub const MIN: u32 = 1;
    pub const MAX: u32 = 255;

    pub fn new(index: u32) -> Result<Self> {
        match u8::try_from(index) {
            Ok(i) if i >= 1 => Ok(Self(i)),
            _ => Err(InteropError::InvalidDeviceIndex(index)),
        }
    }

    pub fn get(self) -> u32 {
        u32::from(self.0)
    }
}

impl fmt::Display for DeviceIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Player indicator (LED) value, always within `1..=7`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PlayerIndex(u8);

impl PlayerIndex {
    pub fn new(value: u8) -> Result<Self> {
        if (1..=7).contains(&value) {
            Ok(Self(value))
        } else {
            Err(InteropError::PlayerIndexOutOfRange(value))
        }
    }

    pub fn get(self) -> u8 {
        self.0
    }
}

/// Six-byte link-layer (Bluetooth) host address. All-zero clears pairing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct HostAddress(pub [u8; 6]);

impl HostAddress {
    pub const CLEARED: Self = Self([0; 6]);

    pub fn is_cleared(&self) -> bool {
        self.0 == [0; 6]
    }

    pub fn octets(&self) -> [u8; 6] {
        self.0
    }
}

impl From<[u8; 6]> for HostAddress {
    fn from(octets: [u8; 6]) -> Self {
        Self(octets)
    }
}

impl fmt::Display for HostAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02X}:{b:02X}:{c:02X}:{d:02X}:{e:02X}:{g:02X}")
    }
}

/// Error returned when parsing a [`HostAddress`] from text fails.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid host address {0:?}, expected six hex octets like 00:1A:7D:DA:71:13")]
pub struct ParseHostAddressError(String);

impl FromStr for HostAddress {
    type Err = ParseHostAddressError;

    /// Accepts `:` or `-` separated octets, or twelve bare hex digits.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let err = || ParseHostAddressError(s.to_owned());
        let digits: String = s.chars().filter(|c| *c != ':' && *c != '-').collect();
        if digits.len() != 12 || !digits.is_ascii() {
            return Err(err());
        }
        let mut out = [0u8; 6];
        for (i, octet) in out.iter_mut().enumerate() {
            let pair = digits.get(i * 2..i * 2 + 2).ok_or_else(err)?;
            *octet = u8::from_str_radix(pair, 16).map_err(|_| err())?;
        }
        Ok(Self(out))
    }
}

/// Raw status code reported by the driver, passed through verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct NtStatus(pub u32);

impl NtStatus {
    pub const SUCCESS: Self = Self(0);

    /// NT convention: success and informational codes have the top bit clear.
    pub fn is_success(self) -> bool {
        self.0 & 0x8000_0000 == 0
    }
}

impl fmt::Display for NtStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08X}", self.0)
    }
}

/// Outcome of a host-address write as reported by the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SetHostResult {
    pub write_status: NtStatus,
    pub read_status: NtStatus,
}
