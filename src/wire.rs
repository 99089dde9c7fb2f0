// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Fixed-layout command/reply messages exchanged through the command region.
//
// Every field is a native-endian fixed-width integer, tightly packed.
// Messages are (de)serialized field by field at fixed offsets; the mapped
// region is never reinterpreted as a Rust struct.

use std::io;
use std::mem::size_of;

use crate::device::{DeviceIndex, HostAddress, NtStatus, PlayerIndex, SetHostResult};
use crate::error::InteropError;

// ---------------------------------------------------------------------------
// Header
// ---------------------------------------------------------------------------

/// Size in bytes of [`RawHeader`] on the wire.
pub const HEADER_LEN: usize = 5 * size_of::<u32>();

/// Width of a wait-handle value on the wire (pointer width).
pub const HANDLE_LEN: usize = size_of::<usize>();

/// Request/reply behavior of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum MessageKind {
    Noop = 0,
    /// A request the driver answers with a [`RequestReply`](Self::RequestReply).
    RequestResponse = 1,
    /// The driver's answer to a `RequestResponse`.
    RequestReply = 2,
    /// A request whose answer carries the same kind back.
    ResponseOnly = 3,
}

impl MessageKind {
    pub fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            0 => Some(Self::Noop),
            1 => Some(Self::RequestResponse),
            2 => Some(Self::RequestReply),
            3 => Some(Self::ResponseOnly),
            _ => None,
        }
    }

    /// Kind the driver must put on the reply to a request of this kind.
    pub fn reply_kind(self) -> Self {
        match self {
            Self::RequestResponse => Self::RequestReply,
            other => other,
        }
    }
}

/// Addressee of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum Target {
    Driver = 0,
    Device = 1,
    /// Replies are addressed back to the client.
    Client = 2,
}

impl Target {
    pub fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            0 => Some(Self::Driver),
            1 => Some(Self::Device),
            2 => Some(Self::Client),
            _ => None,
        }
    }
}

/// Commands understood by the driver as a whole.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum DriverCommand {
    None = 0,
    Ping = 1,
}

/// Commands addressed at one device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum DeviceCommand {
    None = 0,
    PairTo = 1,
    SetPlayerIndex = 2,
    GetWaitHandle = 3,
}

/// The command tag. Which tag space is valid follows from the variant,
/// and so does the request's [`Target`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    Driver(DriverCommand),
    Device(DeviceCommand),
}

impl Command {
    pub fn raw(self) -> u32 {
        match self {
            Self::Driver(c) => c as u32,
            Self::Device(c) => c as u32,
        }
    }

    pub fn target(self) -> Target {
        match self {
            Self::Driver(_) => Target::Driver,
            Self::Device(_) => Target::Device,
        }
    }

    /// Interpret `raw` in the tag space selected by `target`.
    pub fn from_raw(target: Target, raw: u32) -> Option<Self> {
        match target {
            Target::Driver => match raw {
                0 => Some(Self::Driver(DriverCommand::None)),
                1 => Some(Self::Driver(DriverCommand::Ping)),
                _ => None,
            },
            Target::Device => match raw {
                0 => Some(Self::Device(DeviceCommand::None)),
                1 => Some(Self::Device(DeviceCommand::PairTo)),
                2 => Some(Self::Device(DeviceCommand::SetPlayerIndex)),
                3 => Some(Self::Device(DeviceCommand::GetWaitHandle)),
                _ => None,
            },
            Target::Client => None,
        }
    }
}

/// Header fields exactly as found in the region, without interpretation.
///
/// This is what diagnostics carry when a reply fails the plausibility check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RawHeader {
    pub kind: u32,
    pub target: u32,
    pub command: u32,
    pub target_index: u32,
    pub size: u32,
}

impl RawHeader {
    pub fn encode(&self, w: &mut Writer) {
        w.put_u32(self.kind);
        w.put_u32(self.target);
        w.put_u32(self.command);
        w.put_u32(self.target_index);
        w.put_u32(self.size);
    }

    pub fn decode(r: &mut Reader<'_>) -> Result<Self, WireError> {
        Ok(Self {
            kind: r.u32()?,
            target: r.u32()?,
            command: r.u32()?,
            target_index: r.u32()?,
            size: r.u32()?,
        })
    }

    /// The request as the driver would interpret it, if the tags are known.
    pub fn parse_request(&self) -> Option<MessageHeader> {
        let kind = MessageKind::from_raw(self.kind)?;
        let target = Target::from_raw(self.target)?;
        let command = Command::from_raw(target, self.command)?;
        Some(MessageHeader { kind, command, target_index: self.target_index, size: self.size })
    }
}

/// A typed request header. The target is implied by `command`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageHeader {
    pub kind: MessageKind,
    pub command: Command,
    pub target_index: u32,
    pub size: u32,
}

impl MessageHeader {
    pub fn target(&self) -> Target {
        self.command.target()
    }

    pub fn to_raw(self) -> RawHeader {
        RawHeader {
            kind: self.kind as u32,
            target: self.target() as u32,
            command: self.command.raw(),
            target_index: self.target_index,
            size: self.size,
        }
    }
}

// ---------------------------------------------------------------------------
// Field cursors
// ---------------------------------------------------------------------------

/// Decoding ran past the end of the supplied bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("message truncated: needed {needed} bytes at offset {offset}, {available} available")]
pub struct WireError {
    pub offset: usize,
    pub needed: usize,
    pub available: usize,
}

impl From<WireError> for InteropError {
    fn from(e: WireError) -> Self {
        InteropError::Io(io::Error::new(io::ErrorKind::InvalidData, e))
    }
}

/// Appends fixed-width native-endian fields.
#[derive(Debug, Default)]
pub struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    pub fn with_capacity(cap: usize) -> Self {
        Self { buf: Vec::with_capacity(cap) }
    }

    pub fn put_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    pub fn put_u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_ne_bytes());
    }

    pub fn put_usize(&mut self, v: usize) {
        self.buf.extend_from_slice(&v.to_ne_bytes());
    }

    pub fn put_bytes(&mut self, v: &[u8]) {
        self.buf.extend_from_slice(v);
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

/// Reads fixed-width native-endian fields with bounds checks.
#[derive(Debug)]
pub struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn array<const N: usize>(&mut self) -> Result<[u8; N], WireError> {
        let err = WireError { offset: self.pos, needed: N, available: self.buf.len() };
        let end = self.pos.checked_add(N).ok_or(err)?;
        let src = self.buf.get(self.pos..end).ok_or(err)?;
        let mut out = [0u8; N];
        out.copy_from_slice(src);
        self.pos = end;
        Ok(out)
    }

    pub fn u8(&mut self) -> Result<u8, WireError> {
        let [b] = self.array::<1>()?;
        Ok(b)
    }

    pub fn u32(&mut self) -> Result<u32, WireError> {
        self.array::<4>().map(u32::from_ne_bytes)
    }

    pub fn usize(&mut self) -> Result<usize, WireError> {
        self.array::<HANDLE_LEN>().map(usize::from_ne_bytes)
    }
}

// ---------------------------------------------------------------------------
// Message contracts
// ---------------------------------------------------------------------------

/// A request the client writes into the command region.
pub trait Request {
    type Reply: Reply;

    const KIND: MessageKind;
    const PAYLOAD_LEN: usize;
    /// Exact byte length of header + payload.
    const SIZE: usize = HEADER_LEN + Self::PAYLOAD_LEN;

    fn command(&self) -> Command;

    /// 0 for driver-targeted requests, the device index otherwise.
    fn target_index(&self) -> u32;

    fn write_payload(&self, w: &mut Writer);

    fn header(&self) -> MessageHeader {
        MessageHeader {
            kind: Self::KIND,
            command: self.command(),
            target_index: self.target_index(),
            size: wire_size(Self::SIZE),
        }
    }

    fn encode(&self) -> Vec<u8> {
        let mut w = Writer::with_capacity(Self::SIZE);
        self.header().to_raw().encode(&mut w);
        self.write_payload(&mut w);
        debug_assert_eq!(w.len(), Self::SIZE);
        w.into_bytes()
    }

    /// The only header a plausible reply may carry.
    fn expected_reply(&self) -> RawHeader {
        RawHeader {
            kind: Self::KIND.reply_kind() as u32,
            target: Target::Client as u32,
            command: self.command().raw(),
            target_index: self.target_index(),
            size: wire_size(<Self::Reply as Reply>::SIZE),
        }
    }
}

/// A reply the driver writes back over the request.
pub trait Reply: Sized {
    const PAYLOAD_LEN: usize;
    const SIZE: usize = HEADER_LEN + Self::PAYLOAD_LEN;

    fn read_payload(r: &mut Reader<'_>) -> Result<Self, WireError>;

    fn write_payload(&self, w: &mut Writer);
}

/// Message sizes are tiny constants; a size that does not fit is a layout bug.
fn wire_size(len: usize) -> u32 {
    u32::try_from(len).unwrap_or(u32::MAX)
}

// ---------------------------------------------------------------------------
// Ping
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PingRequest;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PingReply;

impl Request for PingRequest {
    type Reply = PingReply;
    const KIND: MessageKind = MessageKind::RequestResponse;
    const PAYLOAD_LEN: usize = 0;

    fn command(&self) -> Command {
        Command::Driver(DriverCommand::Ping)
    }

    fn target_index(&self) -> u32 {
        0
    }

    fn write_payload(&self, _w: &mut Writer) {}
}

impl Reply for PingReply {
    const PAYLOAD_LEN: usize = 0;

    fn read_payload(_r: &mut Reader<'_>) -> Result<Self, WireError> {
        Ok(Self)
    }

    fn write_payload(&self, _w: &mut Writer) {}
}

// ---------------------------------------------------------------------------
// Pair-To (set host address)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PairToRequest {
    pub device: DeviceIndex,
    pub address: HostAddress,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PairToReply {
    pub write_status: u32,
    pub read_status: u32,
}

impl Request for PairToRequest {
    type Reply = PairToReply;
    const KIND: MessageKind = MessageKind::RequestResponse;
    const PAYLOAD_LEN: usize = 6;

    fn command(&self) -> Command {
        Command::Device(DeviceCommand::PairTo)
    }

    fn target_index(&self) -> u32 {
        self.device.get()
    }

    fn write_payload(&self, w: &mut Writer) {
        w.put_bytes(&self.address.octets());
    }
}

impl Reply for PairToReply {
    const PAYLOAD_LEN: usize = 2 * size_of::<u32>();

    fn read_payload(r: &mut Reader<'_>) -> Result<Self, WireError> {
        Ok(Self { write_status: r.u32()?, read_status: r.u32()? })
    }

    fn write_payload(&self, w: &mut Writer) {
        w.put_u32(self.write_status);
        w.put_u32(self.read_status);
    }
}

impl From<PairToReply> for SetHostResult {
    fn from(r: PairToReply) -> Self {
        Self { write_status: NtStatus(r.write_status), read_status: NtStatus(r.read_status) }
    }
}

// ---------------------------------------------------------------------------
// Set Player Index
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetPlayerIndexRequest {
    pub device: DeviceIndex,
    pub player: PlayerIndex,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SetPlayerIndexReply {
    pub status: u32,
}

impl Request for SetPlayerIndexRequest {
    type Reply = SetPlayerIndexReply;
    const KIND: MessageKind = MessageKind::RequestResponse;
    const PAYLOAD_LEN: usize = size_of::<u8>();

    fn command(&self) -> Command {
        Command::Device(DeviceCommand::SetPlayerIndex)
    }

    fn target_index(&self) -> u32 {
        self.device.get()
    }

    fn write_payload(&self, w: &mut Writer) {
        w.put_u8(self.player.get());
    }
}

impl Reply for SetPlayerIndexReply {
    const PAYLOAD_LEN: usize = size_of::<u32>();

    fn read_payload(r: &mut Reader<'_>) -> Result<Self, WireError> {
        Ok(Self { status: r.u32()? })
    }

    fn write_payload(&self, w: &mut Writer) {
        w.put_u32(self.status);
    }
}

// ---------------------------------------------------------------------------
// Get Wait Handle
// ---------------------------------------------------------------------------

/// A handle value that is only meaningful inside the process that owns it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct RemoteHandle(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GetWaitHandleRequest {
    pub device: DeviceIndex,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GetWaitHandleReply {
    pub process_id: u32,
    pub handle: RemoteHandle,
}

impl Request for GetWaitHandleRequest {
    type Reply = GetWaitHandleReply;
    const KIND: MessageKind = MessageKind::ResponseOnly;
    const PAYLOAD_LEN: usize = 0;

    fn command(&self) -> Command {
        Command::Device(DeviceCommand::GetWaitHandle)
    }

    fn target_index(&self) -> u32 {
        self.device.get()
    }

    fn write_payload(&self, _w: &mut Writer) {}
}

impl Reply for GetWaitHandleReply {
    const PAYLOAD_LEN: usize = size_of::<u32>() + HANDLE_LEN;

    fn read_payload(r: &mut Reader<'_>) -> Result<Self, WireError> {
        Ok(Self { process_id: r.u32()?, handle: RemoteHandle(r.usize()?) })
    }

    fn write_payload(&self, w: &mut Writer) {
        w.put_u32(self.process_id);
        w.put_usize(self.handle.0);
    }
}

/// Encode a complete reply (header + payload) for `request`.
/// Used by the driver side of the simulator.
pub fn encode_reply<Q: Request>(request: &Q, reply: &Q::Reply) -> Vec<u8> {
    let mut w = Writer::with_capacity(<Q::Reply as Reply>::SIZE);
    request.expected_reply().encode(&mut w);
    reply.write_payload(&mut w);
    w.into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dev(i: u32) -> DeviceIndex {
        DeviceIndex::new(i).unwrap()
    }

    #[test]
    fn sizes_are_packed() {
        assert_eq!(HEADER_LEN, 20);
        assert_eq!(PingRequest::SIZE, 20);
        assert_eq!(PingReply::SIZE, 20);
        assert_eq!(PairToRequest::SIZE, 26);
        assert_eq!(PairToReply::SIZE, 28);
        assert_eq!(SetPlayerIndexRequest::SIZE, 21);
        assert_eq!(SetPlayerIndexReply::SIZE, 24);
        assert_eq!(GetWaitHandleRequest::SIZE, 20);
        assert_eq!(GetWaitHandleReply::SIZE, 24 + size_of::<usize>());
    }

    #[test]
    fn header_fields_at_fixed_offsets() {
        let req = PairToRequest { device: dev(3), address: HostAddress([1, 2, 3, 4, 5, 6]) };
        let bytes = req.encode();
        assert_eq!(bytes.len(), PairToRequest::SIZE);

        let field = |off: usize| u32::from_ne_bytes(bytes[off..off + 4].try_into().unwrap());
        assert_eq!(field(0), MessageKind::RequestResponse as u32);
        assert_eq!(field(4), Target::Device as u32);
        assert_eq!(field(8), DeviceCommand::PairTo as u32);
        assert_eq!(field(12), 3);
        assert_eq!(field(16), 26);
        assert_eq!(&bytes[20..26], &[1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn player_index_is_single_trailing_byte() {
        let req = SetPlayerIndexRequest { device: dev(1), player: PlayerIndex::new(7).unwrap() };
        let bytes = req.encode();
        assert_eq!(bytes.len(), 21);
        assert_eq!(bytes[20], 7);
    }

    #[test]
    fn reply_expectations_follow_kind() {
        let ping = PingRequest.expected_reply();
        assert_eq!(ping.kind, MessageKind::RequestReply as u32);
        assert_eq!(ping.target, Target::Client as u32);
        assert_eq!(ping.target_index, 0);
        assert_eq!(ping.size, 20);

        let wh = GetWaitHandleRequest { device: dev(9) }.expected_reply();
        assert_eq!(wh.kind, MessageKind::ResponseOnly as u32);
        assert_eq!(wh.command, DeviceCommand::GetWaitHandle as u32);
        assert_eq!(wh.target_index, 9);
    }

    #[test]
    fn command_tag_space_follows_target() {
        assert_eq!(
            Command::from_raw(Target::Driver, 1),
            Some(Command::Driver(DriverCommand::Ping))
        );
        assert_eq!(
            Command::from_raw(Target::Device, 1),
            Some(Command::Device(DeviceCommand::PairTo))
        );
        assert_eq!(Command::from_raw(Target::Driver, 2), None);
        assert_eq!(Command::from_raw(Target::Client, 0), None);
    }

    #[test]
    fn parse_request_recovers_typed_header() {
        let raw = SetPlayerIndexRequest { device: dev(4), player: PlayerIndex::new(2).unwrap() }
            .header()
            .to_raw();
        let typed = raw.parse_request().unwrap();
        assert_eq!(typed.command, Command::Device(DeviceCommand::SetPlayerIndex));
        assert_eq!(typed.target(), Target::Device);
        assert_eq!(typed.target_index, 4);
    }

    #[test]
    fn wait_handle_reply_decodes() {
        let req = GetWaitHandleRequest { device: dev(2) };
        let reply = GetWaitHandleReply { process_id: 1234, handle: RemoteHandle(0x2a8) };
        let bytes = encode_reply(&req, &reply);
        assert_eq!(bytes.len(), GetWaitHandleReply::SIZE);

        let mut r = Reader::new(&bytes);
        let header = RawHeader::decode(&mut r).unwrap();
        assert_eq!(header, req.expected_reply());
        assert_eq!(GetWaitHandleReply::read_payload(&mut r).unwrap(), reply);
    }

    #[test]
    fn reader_reports_truncation() {
        let mut r = Reader::new(&[1, 2, 3]);
        let err = r.u32().unwrap_err();
        assert_eq!(err, WireError { offset: 0, needed: 4, available: 3 });
    }
}
