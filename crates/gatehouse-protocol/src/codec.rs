//! The binary codec: primitive field readers/writers and the
//! [`WireFormat`] trait every message implements.
//!
//! Messages are flat records (no nesting, no optional fields), so a
//! hand-written reader is simpler and stricter than a general-purpose
//! serializer. Each reader checks the remaining length *before* touching
//! the buffer, which means a truncated or hostile payload always produces
//! a [`ProtocolError`] instead of a panic.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::ProtocolError;

/// Largest string a 2-byte length prefix can describe.
const MAX_STR_LEN: usize = u16::MAX as usize;

/// A message that can be written to and read from the binary wire format.
///
/// Implementors only provide [`write_to`](Self::write_to) and
/// [`read_from`](Self::read_from); the byte-buffer conveniences come for
/// free.
pub trait WireFormat: Sized {
    /// Appends this message's fields to `out`.
    ///
    /// # Errors
    /// Returns [`ProtocolError::StringTooLong`] if a string field does not
    /// fit its length prefix.
    fn write_to(&self, out: &mut BytesMut) -> Result<(), ProtocolError>;

    /// Reads one message from the front of `input`, advancing it.
    ///
    /// # Errors
    /// Returns a [`ProtocolError`] if the bytes are truncated or malformed.
    fn read_from(input: &mut &[u8]) -> Result<Self, ProtocolError>;

    /// Encodes this message into a fresh buffer.
    fn to_bytes(&self) -> Result<Bytes, ProtocolError> {
        let mut out = BytesMut::new();
        self.write_to(&mut out)?;
        Ok(out.freeze())
    }

    /// Decodes a message from a complete payload.
    ///
    /// Trailing bytes after the message are tolerated: newer senders may
    /// append fields that older receivers don't know about.
    fn from_bytes(data: &[u8]) -> Result<Self, ProtocolError> {
        let mut input = data;
        Self::read_from(&mut input)
    }
}

// ---------------------------------------------------------------------------
// Field writers
// ---------------------------------------------------------------------------

/// Writes a length-prefixed UTF-8 string.
pub fn put_str(out: &mut BytesMut, value: &str) -> Result<(), ProtocolError> {
    let bytes = value.as_bytes();
    if bytes.len() > MAX_STR_LEN {
        return Err(ProtocolError::StringTooLong(bytes.len()));
    }
    out.put_u16(bytes.len() as u16);
    out.put_slice(bytes);
    Ok(())
}

/// Writes a boolean as a single byte.
pub fn put_bool(out: &mut BytesMut, value: bool) {
    out.put_u8(u8::from(value));
}

/// Writes an 8-byte big-endian signed integer.
pub fn put_i64(out: &mut BytesMut, value: i64) {
    out.put_i64(value);
}

// ---------------------------------------------------------------------------
// Field readers
// ---------------------------------------------------------------------------

fn ensure(input: &[u8], needed: usize) -> Result<(), ProtocolError> {
    if input.remaining() < needed {
        return Err(ProtocolError::Truncated {
            needed: needed - input.remaining(),
        });
    }
    Ok(())
}

/// Reads a length-prefixed UTF-8 string.
pub fn get_str(input: &mut &[u8]) -> Result<String, ProtocolError> {
    ensure(input, 2)?;
    let len = input.get_u16() as usize;
    ensure(input, len)?;
    let raw = input.copy_to_bytes(len);
    String::from_utf8(raw.to_vec()).map_err(|_| ProtocolError::InvalidUtf8)
}

/// Reads a one-byte boolean. Any value other than 0 or 1 is rejected.
pub fn get_bool(input: &mut &[u8]) -> Result<bool, ProtocolError> {
    ensure(input, 1)?;
    match input.get_u8() {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(ProtocolError::InvalidMessage(format!(
            "boolean byte must be 0 or 1, got {other}"
        ))),
    }
}

/// Reads an 8-byte big-endian signed integer.
pub fn get_i64(input: &mut &[u8]) -> Result<i64, ProtocolError> {
    ensure(input, 8)?;
    Ok(input.get_i64())
}
