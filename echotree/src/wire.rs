//! Wire format serialization and deserialization.
//!
//! Every frame starts with a one-byte message type. Integers that grow with
//! the network (latencies) are varints; ids are single bytes.
//!
//! ## Flood Wire Format
//!
//! ```text
//! 0x01 || kind (1) || from (1) || latency (varint)
//! || tag_len (1) || tag || path_len (1) || path (path_len)
//!
//! kind: 0x01 = Request (seeded by the sink), 0x02 = Retransmit
//! ```
//!
//! ## Directed Wire Format
//!
//! ```text
//! 0x02 || kind (1) || from (1) || to (1) || [candidate]
//!
//! kind: 0x01 = RegisterChild, 0x02 = TokenGrant, 0x03 = TokenReturn, 0x04 = Answer
//! candidate (Answer only): latency (varint) || weight (f64 bits, 8 BE)
//! || tag_len (1) || tag || path_len (1) || path (path_len)
//! ```
//!
//! Decoding is strict: unknown kinds, invalid ids, non-simple paths,
//! non-finite weights and trailing bytes are all rejected.

use alloc::vec::Vec;

use crate::path::{Path, PathCandidate};
use crate::traits::Outgoing;
use crate::types::{is_valid_node_id, NodeId, Priority, Tag, MAX_NODES, MAX_TAG_LEN};

/// Decoding error types.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DecodeError {
    /// Unexpected end of buffer.
    UnexpectedEof,
    /// Invalid varint encoding.
    InvalidVarint,
    /// Non-canonical varint encoding (must use minimal bytes).
    NonCanonicalVarint,
    /// Invalid length value or trailing bytes.
    InvalidLength,
    /// Unknown message type byte.
    InvalidMessageType,
    /// Unknown flood or directed kind.
    InvalidKind,
    /// Node id outside `1..=MAX_NODES`.
    InvalidNodeId,
    /// Collection capacity exceeded.
    CapacityExceeded,
    /// Semantic validation failed (repeated hop, bad tag, non-finite weight).
    InvalidValue,
}

impl core::fmt::Display for DecodeError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let msg = match self {
            DecodeError::UnexpectedEof => "unexpected end of frame",
            DecodeError::InvalidVarint => "invalid varint",
            DecodeError::NonCanonicalVarint => "non-canonical varint",
            DecodeError::InvalidLength => "invalid length or trailing bytes",
            DecodeError::InvalidMessageType => "unknown message type",
            DecodeError::InvalidKind => "unknown message kind",
            DecodeError::InvalidNodeId => "invalid node id",
            DecodeError::CapacityExceeded => "capacity exceeded",
            DecodeError::InvalidValue => "invalid field value",
        };
        f.write_str(msg)
    }
}

/// Zero-copy reader over a byte slice.
pub struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.buf.len().saturating_sub(self.pos)
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    pub fn read_u8(&mut self) -> Result<u8, DecodeError> {
        let v = *self.buf.get(self.pos).ok_or(DecodeError::UnexpectedEof)?;
        self.pos += 1;
        Ok(v)
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], DecodeError> {
        if len > self.remaining() {
            return Err(DecodeError::UnexpectedEof);
        }
        let slice = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    pub fn read_u64_be(&mut self) -> Result<u64, DecodeError> {
        let bytes = self.read_bytes(8)?;
        let mut arr = [0u8; 8];
        arr.copy_from_slice(bytes);
        Ok(u64::from_be_bytes(arr))
    }

    /// Read a varint (1-5 bytes for u32), rejecting non-minimal encodings.
    pub fn read_varint(&mut self) -> Result<u32, DecodeError> {
        let mut result: u32 = 0;
        for i in 0..5 {
            let byte = self.read_u8()?;
            let shift = 7 * i;
            // Fifth byte may only carry the top four bits
            if i == 4 && byte & 0xF0 != 0 {
                return Err(DecodeError::InvalidVarint);
            }
            result |= u32::from(byte & 0x7F) << shift;
            if byte & 0x80 == 0 {
                // A zero final byte after the first means padding
                if i > 0 && byte == 0 {
                    return Err(DecodeError::NonCanonicalVarint);
                }
                return Ok(result);
            }
        }
        Err(DecodeError::InvalidVarint)
    }

    pub fn read_node_id(&mut self) -> Result<NodeId, DecodeError> {
        let id = self.read_u8()?;
        if !is_valid_node_id(id) {
            return Err(DecodeError::InvalidNodeId);
        }
        Ok(id)
    }

    pub fn read_f64(&mut self) -> Result<f64, DecodeError> {
        Ok(f64::from_bits(self.read_u64_be()?))
    }

    pub fn read_tag(&mut self) -> Result<Tag, DecodeError> {
        let len = self.read_u8()? as usize;
        if len > MAX_TAG_LEN {
            return Err(DecodeError::CapacityExceeded);
        }
        Tag::from_bytes(self.read_bytes(len)?).ok_or(DecodeError::InvalidValue)
    }

    /// Path of 1..=MAX_NODES distinct, valid ids.
    pub fn read_path(&mut self) -> Result<Path, DecodeError> {
        let len = self.read_u8()? as usize;
        if len == 0 {
            return Err(DecodeError::InvalidLength);
        }
        if len > MAX_NODES {
            return Err(DecodeError::CapacityExceeded);
        }
        let hops = self.read_bytes(len)?;
        if !hops.iter().all(|&id| is_valid_node_id(id)) {
            return Err(DecodeError::InvalidNodeId);
        }
        Path::from_hops(hops).map_err(|_| DecodeError::InvalidValue)
    }
}

/// Writer for encoding messages.
#[derive(Default)]
pub struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    pub fn new() -> Self {
        Self { buf: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn write_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    pub fn write_bytes(&mut self, v: &[u8]) {
        self.buf.extend_from_slice(v);
    }

    pub fn write_u64_be(&mut self, v: u64) {
        self.write_bytes(&v.to_be_bytes());
    }

    pub fn write_varint(&mut self, mut v: u32) {
        while v >= 0x80 {
            self.buf.push((v as u8) | 0x80);
            v >>= 7;
        }
        self.buf.push(v as u8);
    }

    pub fn write_f64(&mut self, v: f64) {
        self.write_u64_be(v.to_bits());
    }

    pub fn write_tag(&mut self, tag: &Tag) {
        // Tag length is bounded by MAX_TAG_LEN
        self.write_u8(tag.as_bytes().len() as u8);
        self.write_bytes(tag.as_bytes());
    }

    pub fn write_path(&mut self, path: &Path) {
        // Path length is bounded by MAX_NODES
        self.write_u8(path.len() as u8);
        self.write_bytes(path.hops());
    }

    pub fn finish(self) -> Vec<u8> {
        self.buf
    }
}

/// Trait for types that can be encoded to wire format.
pub trait Encode {
    fn encode(&self, w: &mut Writer);

    fn encode_to_vec(&self) -> Vec<u8> {
        let mut w = Writer::new();
        self.encode(&mut w);
        w.finish()
    }
}

/// Trait for types that can be decoded from wire format.
pub trait Decode: Sized {
    fn decode(r: &mut Reader<'_>) -> Result<Self, DecodeError>;

    /// Decode from a byte slice (strict: rejects trailing bytes).
    fn decode_from_slice(data: &[u8]) -> Result<Self, DecodeError> {
        let mut r = Reader::new(data);
        let result = Self::decode(&mut r)?;
        if !r.is_empty() {
            return Err(DecodeError::InvalidLength);
        }
        Ok(result)
    }
}

const WIRE_TYPE_FLOOD: u8 = 0x01;
const WIRE_TYPE_DIRECTED: u8 = 0x02;

/// How a flood's latency field is to be read.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RequirementKind {
    /// Seeded by the sink. Receivers take only the link cost to the sender.
    Request = 0x01,
    /// Re-flooded by a relay. Receivers add the link cost to `latency`.
    Retransmit = 0x02,
}

impl RequirementKind {
    fn from_u8(v: u8) -> Result<Self, DecodeError> {
        match v {
            0x01 => Ok(RequirementKind::Request),
            0x02 => Ok(RequirementKind::Retransmit),
            _ => Err(DecodeError::InvalidKind),
        }
    }
}

/// Requirement broadcast carrying the sender's best own route.
#[derive(Clone, Debug, PartialEq)]
pub struct Flood {
    pub kind: RequirementKind,
    pub from: NodeId,
    /// Accumulated latency of `path`.
    pub latency: u32,
    pub tag: Tag,
    /// Ends at `from`.
    pub path: Path,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DirectedKind {
    RegisterChild = 0x01,
    TokenGrant = 0x02,
    TokenReturn = 0x03,
    Answer = 0x04,
}

impl DirectedKind {
    fn from_u8(v: u8) -> Result<Self, DecodeError> {
        match v {
            0x01 => Ok(DirectedKind::RegisterChild),
            0x02 => Ok(DirectedKind::TokenGrant),
            0x03 => Ok(DirectedKind::TokenReturn),
            0x04 => Ok(DirectedKind::Answer),
            _ => Err(DecodeError::InvalidKind),
        }
    }

    pub fn priority(self) -> Priority {
        match self {
            DirectedKind::TokenGrant | DirectedKind::TokenReturn => Priority::TokenControl,
            DirectedKind::RegisterChild => Priority::Registration,
            DirectedKind::Answer => Priority::Answer,
        }
    }
}

/// Frame meant for a single neighbour. Radios overhear it; only `to` acts.
#[derive(Clone, Debug, PartialEq)]
pub struct Directed {
    pub kind: DirectedKind,
    pub from: NodeId,
    pub to: NodeId,
    /// Present exactly when `kind` is `Answer`.
    pub candidate: Option<PathCandidate>,
}

impl Directed {
    pub fn control(kind: DirectedKind, from: NodeId, to: NodeId) -> Self {
        Self {
            kind,
            from,
            to,
            candidate: None,
        }
    }

    pub fn answer(from: NodeId, to: NodeId, candidate: PathCandidate) -> Self {
        Self {
            kind: DirectedKind::Answer,
            from,
            to,
            candidate: Some(candidate),
        }
    }
}

/// Wrapper enum for encoding/decoding top-level messages.
#[derive(Clone, Debug, PartialEq)]
pub enum Message {
    Flood(Flood),
    Directed(Directed),
}

impl Encode for Flood {
    fn encode(&self, w: &mut Writer) {
        w.write_u8(self.kind as u8);
        w.write_u8(self.from);
        w.write_varint(self.latency);
        w.write_tag(&self.tag);
        w.write_path(&self.path);
    }
}

impl Decode for Flood {
    fn decode(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        let kind = RequirementKind::from_u8(r.read_u8()?)?;
        let from = r.read_node_id()?;
        let latency = r.read_varint()?;
        let tag = r.read_tag()?;
        let path = r.read_path()?;
        if path.last() != Some(from) {
            return Err(DecodeError::InvalidValue);
        }
        Ok(Flood {
            kind,
            from,
            latency,
            tag,
            path,
        })
    }
}

impl Encode for PathCandidate {
    fn encode(&self, w: &mut Writer) {
        w.write_varint(self.latency);
        w.write_f64(self.weight);
        w.write_tag(&self.tag);
        w.write_path(&self.path);
    }
}

impl Decode for PathCandidate {
    fn decode(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        let latency = r.read_varint()?;
        let weight = r.read_f64()?;
        if !weight.is_finite() || weight < 0.0 {
            return Err(DecodeError::InvalidValue);
        }
        let tag = r.read_tag()?;
        let path = r.read_path()?;
        Ok(PathCandidate {
            path,
            latency,
            weight,
            tag,
        })
    }
}

impl Encode for Directed {
    fn encode(&self, w: &mut Writer) {
        w.write_u8(self.kind as u8);
        w.write_u8(self.from);
        w.write_u8(self.to);
        if let Some(candidate) = &self.candidate {
            candidate.encode(w);
        }
    }
}

impl Decode for Directed {
    fn decode(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        let kind = DirectedKind::from_u8(r.read_u8()?)?;
        let from = r.read_node_id()?;
        let to = r.read_node_id()?;
        let candidate = match kind {
            DirectedKind::Answer => Some(PathCandidate::decode(r)?),
            _ => None,
        };
        Ok(Directed {
            kind,
            from,
            to,
            candidate,
        })
    }
}

impl Encode for Message {
    fn encode(&self, w: &mut Writer) {
        match self {
            Message::Flood(f) => {
                w.write_u8(WIRE_TYPE_FLOOD);
                f.encode(w);
            }
            Message::Directed(d) => {
                w.write_u8(WIRE_TYPE_DIRECTED);
                d.encode(w);
            }
        }
    }
}

impl Decode for Message {
    fn decode(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        match r.read_u8()? {
            WIRE_TYPE_FLOOD => Ok(Message::Flood(Flood::decode(r)?)),
            WIRE_TYPE_DIRECTED => Ok(Message::Directed(Directed::decode(r)?)),
            _ => Err(DecodeError::InvalidMessageType),
        }
    }
}

impl Outgoing for Message {
    fn priority(&self) -> Priority {
        match self {
            Message::Flood(_) => Priority::Flood,
            Message::Directed(d) => d.kind.priority(),
        }
    }

    fn encode(&self) -> Vec<u8> {
        self.encode_to_vec()
    }
}
