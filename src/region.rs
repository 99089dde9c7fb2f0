// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Placement of the command and input-report regions inside the driver's
// mapping, and a bounds-checked window over each.

use std::io;

use crate::platform::{FileMapping, MappedView};

/// Where the two regions live inside the mapping.
///
/// The command region starts at offset 0. The input region follows it
/// immediately, but views can only be mapped at multiples of the system
/// granularity, so its view starts at the closest aligned offset below and
/// `input_interior` skips the bytes in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegionLayout {
    pub command_len: usize,
    pub input_len: usize,
    /// Aligned offset the input view is mapped at.
    pub input_view_offset: usize,
    /// Distance from the input view start to the first input byte.
    pub input_interior: usize,
}

impl RegionLayout {
    pub fn compute(command_len: usize, input_len: usize, granularity: usize) -> Self {
        let granularity = granularity.max(1);
        Self {
            command_len,
            input_len,
            input_view_offset: command_len / granularity * granularity,
            input_interior: command_len % granularity,
        }
    }

    /// Absolute offset of the first input-region byte.
    pub fn input_start(&self) -> usize {
        self.input_view_offset + self.input_interior
    }

    pub fn input_view_len(&self) -> usize {
        self.input_interior + self.input_len
    }

    pub fn mapping_len(&self) -> usize {
        self.command_len + self.input_len
    }
}

/// A byte range inside a mapped view.
pub(crate) struct Region {
    view: Box<dyn MappedView>,
    start: usize,
    len: usize,
}

impl Region {
    /// Map `len` bytes at `view_offset` and expose them from `interior` on.
    pub(crate) fn map(
        mapping: &dyn FileMapping,
        view_offset: usize,
        interior: usize,
        len: usize,
    ) -> io::Result<Self> {
        let view = mapping.map_view(view_offset, interior + len)?;
        Ok(Self { view, start: interior, len })
    }

    fn check(&self, offset: usize, len: usize) -> io::Result<()> {
        match offset.checked_add(len) {
            Some(end) if end <= self.len => Ok(()),
            _ => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{len} bytes at offset {offset} exceed region of {} bytes", self.len),
            )),
        }
    }

    pub(crate) fn read(&self, offset: usize, dst: &mut [u8]) -> io::Result<()> {
        self.check(offset, dst.len())?;
        self.view.read(self.start + offset, dst)
    }

    pub(crate) fn write(&self, offset: usize, src: &[u8]) -> io::Result<()> {
        self.check(offset, src.len())?;
        self.view.write(self.start + offset, src)
    }
}
