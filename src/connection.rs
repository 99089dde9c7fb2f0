// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// An open link to the driver: the mapping, its two region views, the
// handshake events, the command mutex and the per-device wait handles.

use std::collections::HashMap;
use std::fmt;

use parking_lot::Mutex;
use tracing::debug;

use crate::broker::WaitHandle;
use crate::config::InteropConfig;
use crate::device::DeviceIndex;
use crate::error::{InteropError, Result};
use crate::platform::{self, Backend, FileMapping, HandleDuplicator, SystemEvent, SystemMutex};
use crate::region::{Region, RegionLayout};

/// Explicitly owned connection to the driver.
///
/// Share it between threads by reference or `Arc`; every operation takes
/// `&self`. Fields drop in declaration order, which is the release order
/// the driver expects: views, mapping, events, wait handles, mutex.
pub struct Connection {
    pub(crate) command: Region,
    pub(crate) input: Region,
    _mapping: Box<dyn FileMapping>,
    /// "Write finished": the driver may read the command region.
    pub(crate) request_ready: Box<dyn SystemEvent>,
    /// "Reply ready": the driver finished writing its reply.
    pub(crate) reply_ready: Box<dyn SystemEvent>,
    pub(crate) wait_handles: Mutex<HashMap<DeviceIndex, WaitHandle>>,
    pub(crate) duplicator: Box<dyn HandleDuplicator>,
    pub(crate) mutex: Box<dyn SystemMutex>,
    layout: RegionLayout,
    config: InteropConfig,
}

impl Connection {
    /// Connect to the driver installed on this machine.
    pub fn open() -> Result<Self> {
        Self::open_with(platform::system(), InteropConfig::default())
    }

    /// Connect through `backend` using the names and sizes in `config`.
    ///
    /// Fails with [`InteropError::Unavailable`] if the mapping or any of
    /// the named objects is missing.
    pub fn open_with(backend: &dyn Backend, config: InteropConfig) -> Result<Self> {
        let mapping = backend.open_mapping(&config.mapping_name).map_err(InteropError::from_open)?;
        let mutex = backend.open_mutex(&config.mutex_name).map_err(InteropError::from_open)?;
        let request_ready =
            backend.open_event(&config.read_event_name).map_err(InteropError::from_open)?;
        let reply_ready =
            backend.open_event(&config.write_event_name).map_err(InteropError::from_open)?;

        let layout = RegionLayout::compute(
            config.command_region_size,
            config.input_region_size,
            backend.view_granularity(),
        );
        let command = Region::map(mapping.as_ref(), 0, 0, layout.command_len)?;
        let input = Region::map(
            mapping.as_ref(),
            layout.input_view_offset,
            layout.input_interior,
            layout.input_len,
        )?;

        debug!(
            mapping = %config.mapping_name,
            command_len = layout.command_len,
            input_start = layout.input_start(),
            "connected to driver"
        );

        Ok(Self {
            command,
            input,
            _mapping: mapping,
            request_ready,
            reply_ready,
            wait_handles: Mutex::new(HashMap::new()),
            duplicator: backend.handle_duplicator(),
            mutex,
            layout,
            config,
        })
    }

    /// Whether the driver's mapping exists on this machine.
    pub fn probe() -> bool {
        Self::probe_with(platform::system(), &InteropConfig::default())
    }

    /// Checks only for the mapping; no object is opened or locked.
    pub fn probe_with(backend: &dyn Backend, config: &InteropConfig) -> bool {
        backend.mapping_exists(&config.mapping_name)
    }

    pub fn layout(&self) -> RegionLayout {
        self.layout
    }

    pub fn config(&self) -> &InteropConfig {
        &self.config
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("mapping", &self.config.mapping_name)
            .field("layout", &self.layout)
            .field("cached_wait_handles", &self.wait_handles.lock().len())
            .finish_non_exhaustive()
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        debug!(mapping = %self.config.mapping_name, "closing driver connection");
    }
}
