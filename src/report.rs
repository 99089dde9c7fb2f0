// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Input-report slot layout and read-only decoding of the controller's raw
// HID input report.

use std::collections::HashMap;
use std::mem::size_of;

use bitflags::bitflags;

use crate::device::DeviceIndex;
use crate::wire::{Reader, WireError};

/// Length of the raw input report, report id included.
pub const RAW_REPORT_LEN: usize = 49;

/// Byte length of the slot record at the start of the input region.
pub const SLOT_LEN: usize = size_of::<u32>() + RAW_REPORT_LEN;

/// Trailing motion-sensor bytes ignored when detecting report changes.
const MOTION_TAIL_LEN: usize = 18;

/// Snapshot of the driver's input slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputSlot {
    /// 0 when no device occupies the slot.
    pub slot_index: u32,
    pub report: RawInputReport,
}

impl InputSlot {
    pub fn decode(bytes: &[u8]) -> Result<Self, WireError> {
        let mut r = Reader::new(bytes);
        let slot_index = r.u32()?;
        let report = RawInputReport(r.array::<RAW_REPORT_LEN>()?);
        Ok(Self { slot_index, report })
    }

    pub fn encode(&self) -> [u8; SLOT_LEN] {
        let mut out = [0u8; SLOT_LEN];
        let (index, report) = out.split_at_mut(size_of::<u32>());
        index.copy_from_slice(&self.slot_index.to_ne_bytes());
        report.copy_from_slice(&self.report.0);
        out
    }

    pub fn is_disconnected(&self) -> bool {
        self.slot_index == 0
    }
}

bitflags! {
    /// Digital buttons, bit positions as laid out in report bytes 2..=4.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Buttons: u32 {
        const SELECT   = 1 << 0;
        const L3       = 1 << 1;
        const R3       = 1 << 2;
        const START    = 1 << 3;
        const UP       = 1 << 4;
        const RIGHT    = 1 << 5;
        const DOWN     = 1 << 6;
        const LEFT     = 1 << 7;
        const L2       = 1 << 8;
        const R2       = 1 << 9;
        const L1       = 1 << 10;
        const R1       = 1 << 11;
        const TRIANGLE = 1 << 12;
        const CIRCLE   = 1 << 13;
        const CROSS    = 1 << 14;
        const SQUARE   = 1 << 15;
        const PS       = 1 << 16;
    }
}

impl Buttons {
    pub const DPAD: Self = Self::UP.union(Self::RIGHT).union(Self::DOWN).union(Self::LEFT);
}

/// Battery state as reported in byte 30.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BatteryStatus {
    None,
    Dying,
    Low,
    Medium,
    High,
    Full,
    Charging,
    Charged,
    Unknown(u8),
}

impl From<u8> for BatteryStatus {
    fn from(raw: u8) -> Self {
        match raw {
            0x00 => Self::None,
            0x01 => Self::Dying,
            0x02 => Self::Low,
            0x03 => Self::Medium,
            0x04 => Self::High,
            0x05 => Self::Full,
            0xEE => Self::Charging,
            0xEF => Self::Charged,
            other => Self::Unknown(other),
        }
    }
}

/// Analog pressure of the pressure-sensitive buttons, 0 = released.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Pressure {
    pub up: u8,
    pub right: u8,
    pub down: u8,
    pub left: u8,
    pub l2: u8,
    pub r2: u8,
    pub l1: u8,
    pub r1: u8,
    pub triangle: u8,
    pub circle: u8,
    pub cross: u8,
    pub square: u8,
}

/// Accelerometer and gyroscope readings (big-endian on the wire).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Motion {
    pub accel_x: u16,
    pub accel_y: u16,
    pub accel_z: u16,
    pub gyro: u16,
}

/// The most recent raw input report, copied out of the input region.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct RawInputReport(pub [u8; RAW_REPORT_LEN]);

impl Default for RawInputReport {
    fn default() -> Self {
        Self([0; RAW_REPORT_LEN])
    }
}

impl std::fmt::Debug for RawInputReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawInputReport")
            .field("report_id", &self.report_id())
            .field("buttons", &self.buttons())
            .field("left_thumb", &self.left_thumb())
            .field("right_thumb", &self.right_thumb())
            .field("battery", &self.battery())
            .finish()
    }
}

impl RawInputReport {
    fn byte(&self, offset: usize) -> u8 {
        self.0.get(offset).copied().unwrap_or(0)
    }

    fn be_u16(&self, offset: usize) -> u16 {
        u16::from_be_bytes([self.byte(offset), self.byte(offset + 1)])
    }

    pub fn as_bytes(&self) -> &[u8; RAW_REPORT_LEN] {
        &self.0
    }

    pub fn report_id(&self) -> u8 {
        self.byte(0)
    }

    pub fn buttons(&self) -> Buttons {
        let raw = u32::from_le_bytes([self.byte(2), self.byte(3), self.byte(4), 0]);
        Buttons::from_bits_truncate(raw)
    }

    /// `(x, y)`, 0x80 is centered.
    pub fn left_thumb(&self) -> (u8, u8) {
        (self.byte(6), self.byte(7))
    }

    pub fn right_thumb(&self) -> (u8, u8) {
        (self.byte(8), self.byte(9))
    }

    pub fn pressure(&self) -> Pressure {
        let p = |i: usize| self.byte(14 + i);
        Pressure {
            up: p(0),
            right: p(1),
            down: p(2),
            left: p(3),
            l2: p(4),
            r2: p(5),
            l1: p(6),
            r1: p(7),
            triangle: p(8),
            circle: p(9),
            cross: p(10),
            square: p(11),
        }
    }

    pub fn battery(&self) -> BatteryStatus {
        BatteryStatus::from(self.byte(30))
    }

    pub fn motion(&self) -> Motion {
        Motion {
            accel_x: self.be_u16(41),
            accel_y: self.be_u16(43),
            accel_z: self.be_u16(45),
            gyro: self.be_u16(47),
        }
    }

    /// Equal when everything except the motion-sensor tail matches.
    pub fn same_controls(&self, other: &Self) -> bool {
        let n = RAW_REPORT_LEN - MOTION_TAIL_LEN;
        self.0.get(..n) == other.0.get(..n)
    }
}

/// Per-device packet numbers that advance only when the controls change.
///
/// Motion data jitters constantly, so it is left out of the comparison.
#[derive(Debug, Default)]
pub struct PacketCounter {
    last: HashMap<DeviceIndex, (u32, RawInputReport)>,
}

impl PacketCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `report` for `device` and return its packet number.
    pub fn observe(&mut self, device: DeviceIndex, report: &RawInputReport) -> u32 {
        let entry = self.last.entry(device).or_insert((0, RawInputReport::default()));
        if !entry.1.same_controls(report) {
            entry.0 = entry.0.wrapping_add(1);
        }
        entry.1 = *report;
        entry.0
    }

    /// Forget a device, e.g. after it disconnected.
    pub fn reset(&mut self, device: DeviceIndex) {
        self.last.remove(&device);
    }
}
