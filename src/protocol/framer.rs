//! Varint length-delimited framing for the TCP stream.
//!
//! Frames on the wire are:
//!
//!   `<varint length><type byte><payload>`
//!
//! [`Framer`] can be fed arbitrary chunks and yields whole frames when they
//! are available. A declared length above the configured ceiling is a hard
//! error: the connection is expected to be dropped.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use super::codec::ProtoError;

/// Longest length prefix we accept (enough for 2^28 - 1).
const MAX_VARINT_BYTES: usize = 4;

pub struct Framer {
    buf: BytesMut,
    max_frame: usize,
}

impl Framer {
    pub fn new(max_frame: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(4096),
            max_frame,
        }
    }

    pub fn push(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Extract the next complete frame, `Ok(None)` if more bytes are needed.
    pub fn next_frame(&mut self) -> Result<Option<Bytes>, ProtoError> {
        let mut len: usize = 0;
        let mut varint_len = 0usize;
        let mut terminated = false;
        for (i, b) in self.buf.iter().enumerate() {
            if i >= MAX_VARINT_BYTES {
                return Err(ProtoError::VarIntOverflow { bits: 28 });
            }
            varint_len += 1;
            len |= ((b & 0x7F) as usize) << (7 * i);
            if b & 0x80 == 0 {
                terminated = true;
                break;
            }
        }
        if !terminated {
            return Ok(None);
        }
        if len > self.max_frame {
            return Err(ProtoError::FrameTooLarge {
                len,
                max: self.max_frame,
            });
        }
        if self.buf.len() < varint_len + len {
            return Ok(None);
        }
        self.buf.advance(varint_len);
        Ok(Some(self.buf.split_to(len).freeze()))
    }
}

/// Prefix `payload` with its varint length, enforcing the ceiling.
pub fn encode_frame(payload: &[u8], max_frame: usize) -> Result<Bytes, ProtoError> {
    if payload.len() > max_frame {
        return Err(ProtoError::FrameTooLarge {
            len: payload.len(),
            max: max_frame,
        });
    }
    let mut out = BytesMut::with_capacity(payload.len() + MAX_VARINT_BYTES);
    let mut len = payload.len();
    loop {
        let byte = (len & 0x7F) as u8;
        len >>= 7;
        if len == 0 {
            out.put_u8(byte);
            break;
        }
        out.put_u8(byte | 0x80);
    }
    out.put_slice(payload);
    Ok(out.freeze())
}
