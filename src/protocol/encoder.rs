//! RESP Encoder
//!
//! Turns a [`RespValue`] into its exact wire bytes. Encoding is pure: it only
//! appends to a buffer, and writing that buffer to a socket is the caller's job.
//!
//! Two kinds of value cannot be encoded: a simple string or error whose text
//! contains CR or LF, since those types are delimited by CRLF, and arrays
//! nested deeper than [`MAX_ENCODE_DEPTH`]. On either error the destination
//! buffer is left exactly as it was.

use crate::protocol::types::{prefix, RespValue, CRLF};
use bytes::{BufMut, Bytes, BytesMut};
use thiserror::Error;

/// Deepest array nesting the encoder will write; a top-level array is level 1
pub const MAX_ENCODE_DEPTH: usize = 512;

/// Errors that can occur while encoding a value.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EncodeError {
    /// Simple string or error text contains a CR or LF byte
    #[error("{kind} text contains CR or LF: {text:?}")]
    InvalidText { kind: &'static str, text: String },

    /// Arrays nested deeper than [`MAX_ENCODE_DEPTH`]
    #[error("array nesting exceeds {max} levels")]
    NestingTooDeep { max: usize },
}

/// Encodes a value into a freshly allocated buffer.
///
/// # Example
///
/// ```
/// use respd::protocol::{encode, RespValue};
/// let bytes = encode(&RespValue::pong()).unwrap();
/// assert_eq!(&bytes[..], b"+PONG\r\n");
/// ```
pub fn encode(value: &RespValue) -> Result<Bytes, EncodeError> {
    let mut buf = BytesMut::with_capacity(encoded_len_hint(value));
    encode_into(value, &mut buf)?;
    Ok(buf.freeze())
}

/// Appends the encoding of `value` to `dst`.
///
/// On error nothing is appended.
pub fn encode_into(value: &RespValue, dst: &mut BytesMut) -> Result<(), EncodeError> {
    let start = dst.len();
    if let Err(e) = write_value(value, dst, 0) {
        dst.truncate(start);
        return Err(e);
    }
    Ok(())
}

/// `depth` is the number of arrays enclosing `value`.
fn write_value(value: &RespValue, buf: &mut BytesMut, depth: usize) -> Result<(), EncodeError> {
    match value {
        RespValue::SimpleString(s) => write_line(buf, prefix::SIMPLE_STRING, "simple string", s),
        RespValue::Error(s) => write_line(buf, prefix::ERROR, "error", s),
        RespValue::Integer(n) => {
            buf.put_u8(prefix::INTEGER);
            buf.extend_from_slice(n.to_string().as_bytes());
            buf.extend_from_slice(CRLF);
            Ok(())
        }
        RespValue::BulkString(None) => {
            buf.extend_from_slice(b"$-1\r\n");
            Ok(())
        }
        RespValue::BulkString(Some(data)) => {
            buf.put_u8(prefix::BULK_STRING);
            buf.extend_from_slice(data.len().to_string().as_bytes());
            buf.extend_from_slice(CRLF);
            buf.extend_from_slice(data);
            buf.extend_from_slice(CRLF);
            Ok(())
        }
        RespValue::Array(None) => {
            buf.extend_from_slice(b"*-1\r\n");
            Ok(())
        }
        RespValue::Array(Some(values)) => {
            if depth >= MAX_ENCODE_DEPTH {
                return Err(EncodeError::NestingTooDeep {
                    max: MAX_ENCODE_DEPTH,
                });
            }
            buf.put_u8(prefix::ARRAY);
            buf.extend_from_slice(values.len().to_string().as_bytes());
            buf.extend_from_slice(CRLF);
            for value in values {
                write_value(value, buf, depth + 1)?;
            }
            Ok(())
        }
    }
}

fn write_line(
    buf: &mut BytesMut,
    type_prefix: u8,
    kind: &'static str,
    text: &str,
) -> Result<(), EncodeError> {
    if text.bytes().any(|b| b == b'\r' || b == b'\n') {
        return Err(EncodeError::InvalidText {
            kind,
            text: text.to_string(),
        });
    }
    buf.put_u8(type_prefix);
    buf.extend_from_slice(text.as_bytes());
    buf.extend_from_slice(CRLF);
    Ok(())
}

/// Cheap upper-bound-ish guess for the top level, so small replies allocate once.
fn encoded_len_hint(value: &RespValue) -> usize {
    match value {
        RespValue::SimpleString(s) | RespValue::Error(s) => s.len() + 3,
        RespValue::Integer(_) => 24,
        RespValue::BulkString(Some(data)) => data.len() + 16,
        RespValue::BulkString(None) | RespValue::Array(None) => 5,
        RespValue::Array(Some(values)) => 16 + values.len() * 16,
    }
}

impl RespValue {
    /// Serializes the value to its wire form. See [`encode`].
    pub fn encode(&self) -> Result<Bytes, EncodeError> {
        encode(self)
    }
}
