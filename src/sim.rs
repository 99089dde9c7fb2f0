// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// In-process stand-in for the driver side of the channel.
//
// `SimulatedDriver` creates the named objects in a `MemoryBackend` and
// answers requests from a background thread, the way the driver answers
// them from its own process. Hooks let tests corrupt, delay or drop
// replies and publish input reports.

use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use crate::config::InteropConfig;
use crate::device::{DeviceIndex, HostAddress, NtStatus, PlayerIndex};
use crate::error::{InteropError, Result};
use crate::platform::memory::{MemoryBackend, MemoryEvent, MemoryMapping, MemoryMutex};
use crate::platform::{Backend, SystemEvent};
use crate::region::RegionLayout;
use crate::report::{InputSlot, RawInputReport};
use crate::wire::{
    encode_reply, Command, DeviceCommand, DriverCommand, GetWaitHandleReply, GetWaitHandleRequest,
    MessageHeader, PairToReply, PairToRequest, PingReply, PingRequest, RawHeader, Reader,
    RemoteHandle, Request, SetPlayerIndexReply, SetPlayerIndexRequest, Writer, HEADER_LEN,
};

/// How often the serving thread re-checks its stop flag.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Fake process ids; each simulator gets its own handle table.
static NEXT_PID: AtomicU32 = AtomicU32::new(0x1000);

type HeaderTamper = Box<dyn FnOnce(&mut RawHeader) + Send>;

/// A request as the simulator found it in the command region.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRequest {
    pub header: RawHeader,
    pub payload: Vec<u8>,
}

struct DriverState {
    silent: bool,
    reply_delay: Duration,
    tamper: Option<HeaderTamper>,
    requests: Vec<RecordedRequest>,
    hosts: HashMap<DeviceIndex, HostAddress>,
    players: HashMap<DeviceIndex, u8>,
    pair_status: (NtStatus, NtStatus),
    player_status: NtStatus,
    report_events: HashMap<DeviceIndex, (RemoteHandle, Arc<MemoryEvent>)>,
}

impl Default for DriverState {
    fn default() -> Self {
        Self {
            silent: false,
            reply_delay: Duration::ZERO,
            tamper: None,
            requests: Vec::new(),
            hosts: HashMap::new(),
            players: HashMap::new(),
            pair_status: (NtStatus::SUCCESS, NtStatus::SUCCESS),
            player_status: NtStatus::SUCCESS,
            report_events: HashMap::new(),
        }
    }
}

struct Shared {
    backend: MemoryBackend,
    config: InteropConfig,
    layout: RegionLayout,
    pid: u32,
    mapping: Arc<MemoryMapping>,
    mutex: Arc<MemoryMutex>,
    request_ready: Arc<MemoryEvent>,
    reply_ready: Arc<MemoryEvent>,
    stop: AtomicBool,
    state: Mutex<DriverState>,
}

/// Driver side of the channel, served from a background thread.
pub struct SimulatedDriver {
    shared: Arc<Shared>,
    worker: Option<JoinHandle<()>>,
}

impl SimulatedDriver {
    /// Publish the named objects of `config` in `backend` and start serving.
    ///
    /// Fails with [`InteropError::ExclusiveAccess`] if a driver already
    /// owns any of those names.
    pub fn install(backend: &MemoryBackend, config: InteropConfig) -> Result<Self> {
        if backend.mapping_exists(&config.mapping_name)
            || backend.mutex(&config.mutex_name).is_some()
            || backend.event(&config.read_event_name).is_some()
            || backend.event(&config.write_event_name).is_some()
        {
            return Err(InteropError::ExclusiveAccess);
        }

        let exclusive = |e: io::Error| match e.kind() {
            io::ErrorKind::AlreadyExists => InteropError::ExclusiveAccess,
            _ => InteropError::Io(e),
        };
        let mapping =
            backend.create_mapping(&config.mapping_name, config.mapping_size()).map_err(exclusive)?;
        let mutex = backend.create_mutex(&config.mutex_name).map_err(exclusive)?;
        let request_ready = backend.create_event(&config.read_event_name).map_err(exclusive)?;
        let reply_ready = backend.create_event(&config.write_event_name).map_err(exclusive)?;

        let layout = RegionLayout::compute(
            config.command_region_size,
            config.input_region_size,
            backend.view_granularity(),
        );
        let shared = Arc::new(Shared {
            backend: backend.clone(),
            config,
            layout,
            pid: NEXT_PID.fetch_add(4, Ordering::Relaxed),
            mapping,
            mutex,
            request_ready,
            reply_ready,
            stop: AtomicBool::new(false),
            state: Mutex::new(DriverState::default()),
        });

        let worker = {
            let shared = Arc::clone(&shared);
            thread::Builder::new()
                .name("padlink-sim".into())
                .spawn(move || shared.serve())?
        };
        debug!(
            mapping = %shared.config.mapping_name,
            pid = shared.pid,
            "simulated driver installed"
        );
        Ok(Self { shared, worker: Some(worker) })
    }

    pub fn config(&self) -> &InteropConfig {
        &self.shared.config
    }

    /// Fake process id reported in wait-handle replies.
    pub fn process_id(&self) -> u32 {
        self.shared.pid
    }

    pub fn mutex(&self) -> &Arc<MemoryMutex> {
        &self.shared.mutex
    }

    pub fn mapping(&self) -> &Arc<MemoryMapping> {
        &self.shared.mapping
    }

    /// Stop replying; requests are still consumed and recorded.
    pub fn set_silent(&self, silent: bool) {
        self.shared.state.lock().silent = silent;
    }

    /// Sleep this long before writing each reply.
    pub fn set_reply_delay(&self, delay: Duration) {
        self.shared.state.lock().reply_delay = delay;
    }

    /// Rewrite the header of the next reply before it is published.
    pub fn tamper_next_reply(&self, f: impl FnOnce(&mut RawHeader) + Send + 'static) {
        self.shared.state.lock().tamper = Some(Box::new(f));
    }

    pub fn set_pair_status(&self, write: NtStatus, read: NtStatus) {
        self.shared.state.lock().pair_status = (write, read);
    }

    pub fn set_player_status(&self, status: NtStatus) {
        self.shared.state.lock().player_status = status;
    }

    pub fn request_count(&self) -> usize {
        self.shared.state.lock().requests.len()
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.shared.state.lock().requests.clone()
    }

    pub fn host_address(&self, device: DeviceIndex) -> Option<HostAddress> {
        self.shared.state.lock().hosts.get(&device).copied()
    }

    pub fn player_index(&self, device: DeviceIndex) -> Option<u8> {
        self.shared.state.lock().players.get(&device).copied()
    }

    /// Write `report` into the input slot tagged with `slot_index` and set
    /// that device's input-report event, if one was handed out.
    pub fn publish_input_report(&self, slot_index: u32, report: &RawInputReport) -> io::Result<()> {
        let slot = InputSlot { slot_index, report: *report };
        self.shared.mapping.write_at(self.shared.layout.input_start(), &slot.encode())?;

        let event = DeviceIndex::new(slot_index).ok().and_then(|d| {
            self.shared.state.lock().report_events.get(&d).map(|(_, ev)| Arc::clone(ev))
        });
        if let Some(event) = event {
            event.set()?;
        }
        Ok(())
    }

    /// Mark the input slot empty.
    pub fn disconnect(&self) -> io::Result<()> {
        self.shared.mapping.write_at(self.shared.layout.input_start(), &0u32.to_ne_bytes())
    }
}

impl Drop for SimulatedDriver {
    fn drop(&mut self) {
        self.shared.stop.store(true, Ordering::Release);
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("simulated driver thread panicked");
            }
        }
        let cfg = &self.shared.config;
        let names =
            [&cfg.mapping_name, &cfg.mutex_name, &cfg.read_event_name, &cfg.write_event_name];
        for name in names {
            self.shared.backend.remove(name);
        }
        self.shared.backend.close_process(self.shared.pid);
        debug!(mapping = %cfg.mapping_name, "simulated driver removed");
    }
}

impl Shared {
    fn serve(&self) {
        while !self.stop.load(Ordering::Acquire) {
            match self.request_ready.wait(POLL_INTERVAL) {
                Ok(true) => {}
                Ok(false) => continue,
                Err(e) => {
                    warn!(error = %e, "simulated driver wait failed");
                    continue;
                }
            }
            if let Err(e) = self.handle_request() {
                warn!(error = %e, "simulated driver failed to handle request");
            }
        }
    }

    fn handle_request(&self) -> io::Result<()> {
        let mut head = [0u8; HEADER_LEN];
        self.mapping.read_at(0, &mut head)?;
        let raw = RawHeader::decode(&mut Reader::new(&head))
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

        let payload_len = (raw.size as usize)
            .min(self.layout.command_len)
            .saturating_sub(HEADER_LEN);
        let mut payload = vec![0u8; payload_len];
        self.mapping.read_at(HEADER_LEN, &mut payload)?;
        trace!(?raw, "simulated driver received request");

        let (silent, delay) = {
            let mut st = self.state.lock();
            st.requests.push(RecordedRequest { header: raw, payload: payload.clone() });
            (st.silent, st.reply_delay)
        };
        if silent {
            return Ok(());
        }

        let Some(reply) = raw.parse_request().and_then(|h| self.answer(h, &payload)) else {
            warn!(?raw, "simulated driver ignored malformed request");
            return Ok(());
        };

        if !delay.is_zero() {
            thread::sleep(delay);
        }
        let mut reply = reply;
        if let Some(tamper) = self.state.lock().tamper.take() {
            let mut header = RawHeader::decode(&mut Reader::new(&reply))
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
            tamper(&mut header);
            let mut w = Writer::with_capacity(HEADER_LEN);
            header.encode(&mut w);
            reply[..HEADER_LEN].copy_from_slice(&w.into_bytes());
        }

        self.mapping.write_at(0, &reply)?;
        self.reply_ready.set()
    }

    /// Build the reply bytes for a well-formed request, `None` otherwise.
    fn answer(&self, header: MessageHeader, payload: &[u8]) -> Option<Vec<u8>> {
        let mut st = self.state.lock();
        match header.command {
            Command::Driver(DriverCommand::Ping) => {
                sized(header, PingRequest::SIZE)?;
                Some(encode_reply(&PingRequest, &PingReply))
            }
            Command::Device(DeviceCommand::PairTo) => {
                sized(header, PairToRequest::SIZE)?;
                let device = DeviceIndex::new(header.target_index).ok()?;
                let octets: [u8; 6] = payload.get(..6)?.try_into().ok()?;
                let request = PairToRequest { device, address: HostAddress(octets) };
                st.hosts.insert(device, request.address);
                let (write, read) = st.pair_status;
                let reply = PairToReply { write_status: write.0, read_status: read.0 };
                Some(encode_reply(&request, &reply))
            }
            Command::Device(DeviceCommand::SetPlayerIndex) => {
                sized(header, SetPlayerIndexRequest::SIZE)?;
                let device = DeviceIndex::new(header.target_index).ok()?;
                let player = PlayerIndex::new(*payload.first()?).ok()?;
                st.players.insert(device, player.get());
                let request = SetPlayerIndexRequest { device, player };
                Some(encode_reply(&request, &SetPlayerIndexReply { status: st.player_status.0 }))
            }
            Command::Device(DeviceCommand::GetWaitHandle) => {
                sized(header, GetWaitHandleRequest::SIZE)?;
                let device = DeviceIndex::new(header.target_index).ok()?;
                let (handle, _) = st
                    .report_events
                    .entry(device)
                    .or_insert_with(|| {
                        let event = Arc::new(MemoryEvent::new());
                        (self.backend.register_handle(self.pid, Arc::clone(&event)), event)
                    })
                    .clone();
                let request = GetWaitHandleRequest { device };
                Some(encode_reply(&request, &GetWaitHandleReply { process_id: self.pid, handle }))
            }
            Command::Driver(DriverCommand::None) | Command::Device(DeviceCommand::None) => None,
        }
    }
}

fn sized(header: MessageHeader, expected: usize) -> Option<()> {
    (header.size as usize == expected).then_some(())
}
