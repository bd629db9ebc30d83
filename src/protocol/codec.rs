//! Binary field codec shared by every packet type.
//!
//! Field encodings:
//! - `bool`: one byte, `0` or `1` (anything else is malformed)
//! - unsigned integers and enum ordinals: LEB128 varints
//! - `f32`, `i64`: raw big-endian
//! - UUIDs: two raw big-endian `u64` halves (most significant first)
//! - strings and byte blobs: varint length + bytes
//! - optional fields: a presence `bool`, then the value when present
//! - timestamps: `i64` milliseconds since the Unix epoch
//!
//! Decoding an enum ordinal outside the known range is a hard error; there is
//! no fallback variant.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use chrono::{DateTime, TimeZone, Utc};
use thiserror::Error;

use crate::ids::{ContextId, NotificationId, UserId};

/// Upper bound on a single string field.
pub const MAX_STRING_BYTES: usize = 16 * 1024;
/// Upper bound on a single byte blob (voice, audio, images).
pub const MAX_BLOB_BYTES: usize = 1024 * 1024;
/// Upper bound on the element count of any list field.
pub const MAX_LIST_LEN: usize = 4096;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtoError {
    #[error("packet too short: need {need} more bytes, got {got}")]
    TooShort { need: usize, got: usize },

    #[error("unknown packet type: 0x{0:02x}")]
    UnknownType(u8),

    #[error("{name} ordinal {ordinal} out of range")]
    InvalidOrdinal { name: &'static str, ordinal: u32 },

    #[error("varint overflows {bits} bits")]
    VarIntOverflow { bits: u32 },

    #[error("string field is not valid utf-8")]
    InvalidUtf8,

    #[error("length {len} exceeds limit {max}")]
    LengthExceeded { len: usize, max: usize },

    #[error("frame of {len} bytes exceeds max frame size {max}")]
    FrameTooLarge { len: usize, max: usize },

    #[error("{len} trailing bytes after {packet}")]
    TrailingBytes { packet: &'static str, len: usize },

    #[error("{packet} may not be sent {direction}")]
    WrongDirection {
        packet: &'static str,
        direction: &'static str,
    },

    #[error("malformed packet: {0}")]
    Malformed(&'static str),
}

/// Closed enumeration transmitted as its ordinal.
///
/// `VARIANTS` lists every variant in wire order; the ordinal is the index.
pub trait WireEnum: Sized + Copy + PartialEq + 'static {
    const NAME: &'static str;
    const VARIANTS: &'static [Self];

    fn ordinal(self) -> u32 {
        Self::VARIANTS
            .iter()
            .position(|v| *v == self)
            .map(|i| i as u32)
            .unwrap_or_default()
    }

    fn from_ordinal(ordinal: u32) -> Option<Self> {
        Self::VARIANTS.get(ordinal as usize).copied()
    }
}

pub trait Encode {
    fn encode(&self, w: &mut PacketWriter);
}

pub trait Decode: Sized {
    fn decode(r: &mut PacketReader) -> Result<Self, ProtoError>;
}

/// Growable output buffer for one packet payload.
#[derive(Debug, Default)]
pub struct PacketWriter {
    buf: BytesMut,
}

impl PacketWriter {
    pub fn new() -> Self {
        Self {
            buf: BytesMut::with_capacity(128),
        }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn into_bytes(self) -> Bytes {
        self.buf.freeze()
    }

    pub fn write_u8(&mut self, v: u8) {
        self.buf.put_u8(v);
    }

    pub fn write_bool(&mut self, v: bool) {
        self.buf.put_u8(v as u8);
    }

    pub fn write_var_u64(&mut self, mut v: u64) {
        loop {
            let byte = (v & 0x7F) as u8;
            v >>= 7;
            if v == 0 {
                self.buf.put_u8(byte);
                return;
            }
            self.buf.put_u8(byte | 0x80);
        }
    }

    pub fn write_var_u32(&mut self, v: u32) {
        self.write_var_u64(v as u64);
    }

    pub fn write_len(&mut self, len: usize) {
        self.write_var_u64(len as u64);
    }

    pub fn write_f32(&mut self, v: f32) {
        self.buf.put_f32(v);
    }

    pub fn write_i64(&mut self, v: i64) {
        self.buf.put_i64(v);
    }

    pub fn write_uuid_halves(&mut self, (high, low): (u64, u64)) {
        self.buf.put_u64(high);
        self.buf.put_u64(low);
    }

    pub fn write_str(&mut self, s: &str) {
        self.write_len(s.len());
        self.buf.put_slice(s.as_bytes());
    }

    pub fn write_blob(&mut self, b: &[u8]) {
        self.write_len(b.len());
        self.buf.put_slice(b);
    }

    pub fn write_enum<E: WireEnum>(&mut self, e: E) {
        self.write_var_u32(e.ordinal());
    }

    pub fn write_enum_list<E: WireEnum>(&mut self, list: &[E]) {
        self.write_len(list.len());
        for e in list {
            self.write_enum(*e);
        }
    }

    pub fn write_optional_enum<E: WireEnum>(&mut self, e: Option<E>) {
        self.write_bool(e.is_some());
        if let Some(e) = e {
            self.write_enum(e);
        }
    }

    /// Pack up to 32 boolean flags into one varint; flag `i` is bit `i`.
    pub fn write_flags(&mut self, flags: &[bool]) {
        debug_assert!(flags.len() <= 32);
        let bits = flags
            .iter()
            .enumerate()
            .fold(0u32, |acc, (i, set)| if *set { acc | (1 << i) } else { acc });
        self.write_var_u32(bits);
    }

    pub fn write_timestamp(&mut self, at: DateTime<Utc>) {
        self.write_i64(at.timestamp_millis());
    }

    pub fn put<T: Encode + ?Sized>(&mut self, value: &T) {
        value.encode(self);
    }
}

/// Cursor over one packet payload.
#[derive(Debug)]
pub struct PacketReader {
    buf: Bytes,
}

impl PacketReader {
    pub fn new(buf: Bytes) -> Self {
        Self { buf }
    }

    pub fn remaining(&self) -> usize {
        self.buf.remaining()
    }

    fn ensure(&self, need: usize) -> Result<(), ProtoError> {
        if self.buf.remaining() < need {
            return Err(ProtoError::TooShort {
                need,
                got: self.buf.remaining(),
            });
        }
        Ok(())
    }

    /// Fail if anything is left after the last field of `packet`.
    pub fn finish(&self, packet: &'static str) -> Result<(), ProtoError> {
        match self.buf.remaining() {
            0 => Ok(()),
            len => Err(ProtoError::TrailingBytes { packet, len }),
        }
    }

    pub fn read_u8(&mut self) -> Result<u8, ProtoError> {
        self.ensure(1)?;
        Ok(self.buf.get_u8())
    }

    pub fn read_bool(&mut self) -> Result<bool, ProtoError> {
        match self.read_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            _ => Err(ProtoError::Malformed("boolean byte must be 0 or 1")),
        }
    }

    pub fn read_var_u64(&mut self) -> Result<u64, ProtoError> {
        let mut value = 0u64;
        let mut shift = 0u32;
        loop {
            let byte = self.read_u8()?;
            if shift == 63 && byte > 1 {
                return Err(ProtoError::VarIntOverflow { bits: 64 });
            }
            value |= ((byte & 0x7F) as u64) << shift;
            if byte & 0x80 == 0 {
                return Ok(value);
            }
            shift += 7;
            if shift > 63 {
                return Err(ProtoError::VarIntOverflow { bits: 64 });
            }
        }
    }

    pub fn read_var_u32(&mut self) -> Result<u32, ProtoError> {
        let v = self.read_var_u64()?;
        u32::try_from(v).map_err(|_| ProtoError::VarIntOverflow { bits: 32 })
    }

    fn read_len(&mut self, max: usize) -> Result<usize, ProtoError> {
        let len = self.read_var_u64()? as usize;
        if len > max {
            return Err(ProtoError::LengthExceeded { len, max });
        }
        Ok(len)
    }

    pub fn read_list_len(&mut self) -> Result<usize, ProtoError> {
        self.read_len(MAX_LIST_LEN)
    }

    pub fn read_f32(&mut self) -> Result<f32, ProtoError> {
        self.ensure(4)?;
        Ok(self.buf.get_f32())
    }

    pub fn read_i64(&mut self) -> Result<i64, ProtoError> {
        self.ensure(8)?;
        Ok(self.buf.get_i64())
    }

    pub fn read_uuid_halves(&mut self) -> Result<(u64, u64), ProtoError> {
        self.ensure(16)?;
        Ok((self.buf.get_u64(), self.buf.get_u64()))
    }

    pub fn read_string(&mut self) -> Result<String, ProtoError> {
        let len = self.read_len(MAX_STRING_BYTES)?;
        self.ensure(len)?;
        let raw = self.buf.split_to(len);
        String::from_utf8(raw.to_vec()).map_err(|_| ProtoError::InvalidUtf8)
    }

    /// Zero-copy slice of the payload.
    pub fn read_blob(&mut self) -> Result<Bytes, ProtoError> {
        let len = self.read_len(MAX_BLOB_BYTES)?;
        self.ensure(len)?;
        Ok(self.buf.split_to(len))
    }

    pub fn read_enum<E: WireEnum>(&mut self) -> Result<E, ProtoError> {
        let ordinal = self.read_var_u32()?;
        E::from_ordinal(ordinal).ok_or(ProtoError::InvalidOrdinal {
            name: E::NAME,
            ordinal,
        })
    }

    pub fn read_enum_list<E: WireEnum>(&mut self) -> Result<Vec<E>, ProtoError> {
        let len = self.read_list_len()?;
        let mut out = Vec::with_capacity(len.min(64));
        for _ in 0..len {
            out.push(self.read_enum()?);
        }
        Ok(out)
    }

    pub fn read_optional_enum<E: WireEnum>(&mut self) -> Result<Option<E>, ProtoError> {
        if self.read_bool()? {
            Ok(Some(self.read_enum()?))
        } else {
            Ok(None)
        }
    }

    /// Unpack `N` flags written by [`PacketWriter::write_flags`].
    pub fn read_flags<const N: usize>(&mut self) -> Result<[bool; N], ProtoError> {
        let bits = self.read_var_u32()?;
        if N < 32 && bits >> N != 0 {
            return Err(ProtoError::Malformed("unknown bits set in flag field"));
        }
        let mut out = [false; N];
        for (i, flag) in out.iter_mut().enumerate() {
            *flag = bits & (1 << i) != 0;
        }
        Ok(out)
    }

    pub fn read_timestamp(&mut self) -> Result<DateTime<Utc>, ProtoError> {
        let millis = self.read_i64()?;
        Utc.timestamp_millis_opt(millis)
            .single()
            .ok_or(ProtoError::Malformed("timestamp out of range"))
    }

    pub fn get<T: Decode>(&mut self) -> Result<T, ProtoError> {
        T::decode(self)
    }
}

impl Encode for str {
    fn encode(&self, w: &mut PacketWriter) {
        w.write_str(self);
    }
}

impl Encode for String {
    fn encode(&self, w: &mut PacketWriter) {
        w.write_str(self);
    }
}

impl Decode for String {
    fn decode(r: &mut PacketReader) -> Result<Self, ProtoError> {
        r.read_string()
    }
}

impl Encode for UserId {
    fn encode(&self, w: &mut PacketWriter) {
        w.write_uuid_halves(self.halves());
    }
}

impl Decode for UserId {
    fn decode(r: &mut PacketReader) -> Result<Self, ProtoError> {
        let (high, low) = r.read_uuid_halves()?;
        Ok(UserId::from_halves(high, low))
    }
}

impl Encode for NotificationId {
    fn encode(&self, w: &mut PacketWriter) {
        w.write_uuid_halves(self.halves());
    }
}

impl Decode for NotificationId {
    fn decode(r: &mut PacketReader) -> Result<Self, ProtoError> {
        let (high, low) = r.read_uuid_halves()?;
        Ok(NotificationId::from_halves(high, low))
    }
}

impl Encode for ContextId {
    fn encode(&self, w: &mut PacketWriter) {
        w.write_str(self.as_str());
    }
}

impl Decode for ContextId {
    fn decode(r: &mut PacketReader) -> Result<Self, ProtoError> {
        Ok(ContextId::from_raw(r.read_string()?))
    }
}

impl Encode for Bytes {
    fn encode(&self, w: &mut PacketWriter) {
        w.write_blob(self);
    }
}

impl Decode for Bytes {
    fn decode(r: &mut PacketReader) -> Result<Self, ProtoError> {
        r.read_blob()
    }
}

impl Encode for DateTime<Utc> {
    fn encode(&self, w: &mut PacketWriter) {
        w.write_timestamp(*self);
    }
}

impl Decode for DateTime<Utc> {
    fn decode(r: &mut PacketReader) -> Result<Self, ProtoError> {
        r.read_timestamp()
    }
}

impl<T: Encode> Encode for Option<T> {
    fn encode(&self, w: &mut PacketWriter) {
        w.write_bool(self.is_some());
        if let Some(v) = self {
            v.encode(w);
        }
    }
}

impl<T: Decode> Decode for Option<T> {
    fn decode(r: &mut PacketReader) -> Result<Self, ProtoError> {
        if r.read_bool()? {
            Ok(Some(T::decode(r)?))
        } else {
            Ok(None)
        }
    }
}

impl<T: Encode> Encode for Vec<T> {
    fn encode(&self, w: &mut PacketWriter) {
        w.write_len(self.len());
        for item in self {
            item.encode(w);
        }
    }
}

impl<T: Decode> Decode for Vec<T> {
    fn decode(r: &mut PacketReader) -> Result<Self, ProtoError> {
        let len = r.read_list_len()?;
        let mut out = Vec::with_capacity(len.min(64));
        for _ in 0..len {
            out.push(T::decode(r)?);
        }
        Ok(out)
    }
}
