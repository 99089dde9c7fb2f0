// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Names and sizes shared with the driver build.

use std::time::Duration;

/// Name of the driver's file mapping.
pub const MAPPING_NAME: &str = "Global\\DsHidMiniSharedMemory";

/// Event the client sets once it finished writing a request
/// (the driver may now read the command region).
pub const READ_EVENT_NAME: &str = "Global\\DsHidMiniReadEvent";

/// Event the driver sets once the reply is in the command region.
pub const WRITE_EVENT_NAME: &str = "Global\\DsHidMiniWriteEvent";

/// Mutex guarding the command region across threads and processes.
pub const MUTEX_NAME: &str = "Global\\DsHidMiniCommandMutex";

/// Keep in sync with the driver.
pub const COMMAND_REGION_SIZE: usize = 1024;

/// Keep in sync with the driver.
pub const INPUT_REGION_SIZE: usize = 1024;

/// Default bound on the "reply ready" wait.
pub const DEFAULT_REPLY_TIMEOUT: Duration = Duration::from_millis(500);

/// Everything a [`Connection`](crate::Connection) needs to locate the driver.
///
/// `Default` yields the values the shipping driver is built with. Tests and
/// the simulator override the names so parallel runs do not collide.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InteropConfig {
    pub mapping_name: String,
    pub read_event_name: String,
    pub write_event_name: String,
    pub mutex_name: String,
    pub command_region_size: usize,
    pub input_region_size: usize,
    pub reply_timeout: Duration,
}

impl Default for InteropConfig {
    fn default() -> Self {
        Self {
            mapping_name: MAPPING_NAME.to_owned(),
            read_event_name: READ_EVENT_NAME.to_owned(),
            write_event_name: WRITE_EVENT_NAME.to_owned(),
            mutex_name: MUTEX_NAME.to_owned(),
            command_region_size: COMMAND_REGION_SIZE,
            input_region_size: INPUT_REGION_SIZE,
            reply_timeout: DEFAULT_REPLY_TIMEOUT,
        }
    }
}

impl InteropConfig {
    /// Derive all four object names from a common prefix, e.g. `"Local\\test_7"`.
    pub fn with_prefix(prefix: &str) -> Self {
        Self {
            mapping_name: format!("{prefix}SharedMemory"),
            read_event_name: format!("{prefix}ReadEvent"),
            write_event_name: format!("{prefix}WriteEvent"),
            mutex_name: format!("{prefix}CommandMutex"),
            ..Self::default()
        }
    }

    pub fn with_reply_timeout(mut self, timeout: Duration) -> Self {
        self.reply_timeout = timeout;
        self
    }

    pub fn with_region_sizes(mut self, command: usize, input: usize) -> Self {
        self.command_region_size = command;
        self.input_region_size = input;
        self
    }

    /// Total bytes the driver's mapping must span.
    pub fn mapping_size(&self) -> usize {
        self.command_region_size + self.input_region_size
    }
}
