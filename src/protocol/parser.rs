//! Incremental RESP Protocol Parser
//!
//! This module implements the synchronous half of the decoder. It never
//! performs I/O; see [`RespDecoder`](crate::protocol::RespDecoder) for the half
//! that reads from a stream.
//!
//! ## How the Parser Works
//!
//! Parsing happens in two passes over the buffered bytes:
//!
//! 1. [`RespParser::check`] walks the value without allocating and reports
//!    whether it is complete. All validation happens here: type bytes,
//!    integers, UTF-8, CRLF terminators, limits and nesting. Its progress is
//!    kept in a [`ScanState`], so when more bytes arrive the walk resumes where
//!    it stopped. Finished elements are never looked at again, a partial line
//!    is not rescanned, and a bulk payload is only ever measured, not scanned.
//! 2. [`RespParser::parse_frame`] builds the value from the complete frame in
//!    one pass. Bulk payloads are slices of the frame, not copies.
//!
//! [`RespParser::parse`] combines both for callers that hold a plain slice:
//! - `Ok(Some((value, consumed)))` - Successfully parsed a value, `consumed` bytes were used
//! - `Ok(None)` - Need more data, the message is incomplete
//! - `Err(ProtocolError)` - Invalid protocol data
//!
//! A message split across any number of reads, including in the middle of a
//! length field or inside a bulk payload, parses to the same value as the
//! unsplit message.
//!
//! ## Limits
//!
//! Declared bulk lengths and array counts are checked against [`DecodeLimits`]
//! as soon as the header line is complete, before any payload is awaited or
//! allocated. Open arrays are tracked on an explicit stack, so hostile nesting
//! is rejected without recursion.

use crate::protocol::types::{prefix, RespValue, CRLF};
use bytes::Bytes;
use thiserror::Error;

/// Errors that can occur during RESP parsing.
///
/// Any of these leaves the stream framing untrustworthy, so the connection
/// that produced it must be closed.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// The stream ended in the middle of a message
    #[error("unexpected end of stream inside a message")]
    Truncated,

    /// Unknown type prefix byte
    #[error("unknown type prefix: {0:#04x}")]
    UnknownType(u8),

    /// Integer payload or length field is not a base-10 signed integer
    #[error("invalid integer: {0:?}")]
    InvalidInteger(String),

    /// Simple string or error text is not valid UTF-8
    #[error("invalid UTF-8 in {0}")]
    InvalidUtf8(&'static str),

    /// A CRLF terminator was expected but something else was found
    #[error("expected CRLF {0}")]
    ExpectedCrlf(&'static str),

    /// A declared length or count is larger than the configured maximum
    #[error("{what} {len} exceeds limit of {max}")]
    LimitExceeded {
        what: &'static str,
        len: usize,
        max: usize,
    },

    /// Arrays are nested deeper than the configured maximum
    #[error("array nesting exceeds {max} levels")]
    NestingTooDeep { max: usize },
}

/// Result type for parsing operations.
pub type ParseResult<T> = Result<T, ProtocolError>;

/// Maximum size for a single bulk string (512 MB, same as Redis)
pub const MAX_BULK_SIZE: usize = 512 * 1024 * 1024;

/// Maximum number of elements in a single array (same as Redis' multibulk limit)
pub const MAX_ARRAY_LEN: usize = 1024 * 1024;

/// Maximum array nesting depth (prevent stack overflow)
pub const MAX_NESTING_DEPTH: usize = 32;

/// Maximum length of a CRLF-terminated line (simple string, error, integer or header)
pub const MAX_LINE_LEN: usize = 64 * 1024;

/// Size limits enforced while decoding untrusted input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeLimits {
    /// Largest accepted bulk string payload, in bytes
    pub max_bulk_len: usize,
    /// Largest accepted array element count
    pub max_array_len: usize,
    /// Deepest accepted array nesting; a top-level array is level 1.
    ///
    /// Empty arrays count as a level, the null array `*-1` does not since it
    /// opens nothing.
    pub max_nesting_depth: usize,
    /// Longest accepted CRLF-terminated line, in bytes, excluding the CRLF
    pub max_line_len: usize,
}

impl Default for DecodeLimits {
    fn default() -> Self {
        Self {
            max_bulk_len: MAX_BULK_SIZE,
            max_array_len: MAX_ARRAY_LEN,
            max_nesting_depth: MAX_NESTING_DEPTH,
            max_line_len: MAX_LINE_LEN,
        }
    }
}

/// How far [`RespParser::check`] got through a partially received value.
///
/// Positions are offsets from the first byte of the value. Reset it (or use a
/// fresh one) once the value has been consumed.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ScanState {
    /// Start of the first element not yet known to be complete
    pos: usize,
    /// Elements still owed by each open array, outermost first
    open: Vec<usize>,
    /// Bytes of the pending line already known to hold no CRLF
    line_scanned: usize,
    /// Payload start and length of a bulk string whose header is done
    bulk: Option<(usize, usize)>,
}

impl ScanState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes already validated.
    pub fn position(&self) -> usize {
        self.pos
    }
}

/// An incremental RESP protocol parser.
///
/// # Example
///
/// ```
/// use respd::protocol::{RespParser, RespValue};
/// use bytes::Bytes;
///
/// let parser = RespParser::new();
/// let buffer = b"*2\r\n$3\r\nGET\r\n$4\r\nname\r\n";
///
/// let (value, consumed) = parser.parse(buffer).unwrap().unwrap();
/// assert_eq!(consumed, buffer.len());
/// assert_eq!(value.as_array().unwrap()[1], RespValue::bulk_string(Bytes::from("name")));
///
/// // Half a message is not an error, just not a value yet.
/// assert!(parser.parse(&buffer[..10]).unwrap().is_none());
/// ```
#[derive(Debug, Default, Clone)]
pub struct RespParser {
    limits: DecodeLimits,
}

impl RespParser {
    /// Creates a parser with the default limits.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limits(limits: DecodeLimits) -> Self {
        Self { limits }
    }

    pub fn limits(&self) -> &DecodeLimits {
        &self.limits
    }

    /// Attempts to parse one RESP value from the start of the buffer.
    ///
    /// # Returns
    ///
    /// - `Ok(Some((value, consumed)))` - Successfully parsed a value
    /// - `Ok(None)` - Incomplete data, need more bytes
    /// - `Err(e)` - Parse error
    pub fn parse(&self, buf: &[u8]) -> ParseResult<Option<(RespValue, usize)>> {
        let Some(len) = self.check(buf, &mut ScanState::new())? else {
            return Ok(None);
        };
        let value = self.parse_frame(&Bytes::copy_from_slice(&buf[..len]))?;
        Ok(Some((value, len)))
    }

    /// Checks whether `buf` starts with one complete, valid value.
    ///
    /// Returns the value's length in bytes once it is complete. On `Ok(None)`
    /// call again with the same `scan` after appending more bytes to `buf`;
    /// the bytes already covered by `scan` must not change.
    pub fn check(&self, buf: &[u8], scan: &mut ScanState) -> ParseResult<Option<usize>> {
        loop {
            let end = match scan.bulk {
                Some((start, len)) => match self.check_payload(buf, start, len)? {
                    Some(end) => {
                        scan.bulk = None;
                        end
                    }
                    None => return Ok(None),
                },
                None => match self.check_element(buf, scan)? {
                    Some(end) => end,
                    None => return Ok(None),
                },
            };

            // One element is complete; close every array it completes.
            scan.pos = end;
            loop {
                let Some(remaining) = scan.open.last_mut() else {
                    return Ok(Some(end));
                };
                *remaining -= 1;
                if *remaining > 0 {
                    break;
                }
                scan.open.pop();
            }
        }
    }

    /// Checks the element at `scan.pos` and returns its end.
    ///
    /// Array headers are stepped into rather than returned: their count is
    /// pushed onto `scan.open` and checking continues with the first element.
    /// `None` means the bytes run out first.
    fn check_element(&self, buf: &[u8], scan: &mut ScanState) -> ParseResult<Option<usize>> {
        loop {
            let Some(&type_byte) = buf.get(scan.pos) else {
                return Ok(None);
            };
            if !matches!(
                type_byte,
                prefix::SIMPLE_STRING
                    | prefix::ERROR
                    | prefix::INTEGER
                    | prefix::BULK_STRING
                    | prefix::ARRAY
            ) {
                return Err(ProtocolError::UnknownType(type_byte));
            }

            let Some((line, next)) = self.scan_line(buf, scan.pos + 1, &mut scan.line_scanned)?
            else {
                return Ok(None);
            };
            scan.line_scanned = 0;

            match type_byte {
                prefix::SIMPLE_STRING => return utf8(line, "simple string").map(|_| Some(next)),
                prefix::ERROR => return utf8(line, "error").map(|_| Some(next)),
                prefix::INTEGER => return parse_decimal(line).map(|_| Some(next)),
                prefix::BULK_STRING => {
                    let Some(len) = parse_length(line, "bulk length", self.limits.max_bulk_len)?
                    else {
                        return Ok(Some(next));
                    };
                    let end = self.check_payload(buf, next, len)?;
                    if end.is_none() {
                        scan.bulk = Some((next, len));
                    }
                    return Ok(end);
                }
                _ => {}
            }

            let Some(count) = parse_length(line, "array length", self.limits.max_array_len)? else {
                return Ok(Some(next));
            };
            self.check_depth(scan.open.len())?;
            if count == 0 {
                return Ok(Some(next));
            }
            scan.open.push(count);
            scan.pos = next;
        }
    }

    /// `depth` is the number of arrays enclosing a new, non-null array.
    fn check_depth(&self, depth: usize) -> ParseResult<()> {
        if depth >= self.limits.max_nesting_depth {
            return Err(ProtocolError::NestingTooDeep {
                max: self.limits.max_nesting_depth,
            });
        }
        Ok(())
    }

    /// Checks that a bulk payload of `len` bytes at `start` is fully buffered
    /// and followed by CRLF. The payload itself is never scanned, which is what
    /// makes bulk strings binary safe.
    fn check_payload(&self, buf: &[u8], start: usize, len: usize) -> ParseResult<Option<usize>> {
        let too_long = || ProtocolError::LimitExceeded {
            what: "bulk length",
            len,
            max: self.limits.max_bulk_len,
        };
        let data_end = start.checked_add(len).ok_or_else(too_long)?;
        let end = data_end.checked_add(CRLF.len()).ok_or_else(too_long)?;

        if buf.len() < end {
            // Reject a wrong terminator as soon as its first byte is visible.
            if buf.len() > data_end && buf[data_end] != b'\r' {
                return Err(ProtocolError::ExpectedCrlf("after bulk string payload"));
            }
            return Ok(None);
        }
        if &buf[data_end..end] != CRLF {
            return Err(ProtocolError::ExpectedCrlf("after bulk string payload"));
        }
        Ok(Some(end))
    }

    /// Finds the CRLF ending the line that starts at `start`.
    ///
    /// `scanned` is how much of the line earlier calls already searched; only
    /// the bytes after it are examined, and it is advanced on `Ok(None)`.
    /// Returns the line without its terminator and the position after the CRLF.
    fn scan_line<'a>(
        &self,
        buf: &'a [u8],
        start: usize,
        scanned: &mut usize,
    ) -> ParseResult<Option<(&'a [u8], usize)>> {
        let rest = &buf[start.min(buf.len())..];
        let from = (*scanned).min(rest.len());
        let max = self.limits.max_line_len;

        match find_crlf(&rest[from..]) {
            Some(offset) => {
                let len = from + offset;
                if len > max {
                    return Err(line_too_long(len, max));
                }
                reject_bare_cr_lf(&rest[from..len])?;
                Ok(Some((&rest[..len], start + len + CRLF.len())))
            }
            None => {
                // A trailing '\r' may still be completed by the next read.
                let complete = match rest.last() {
                    Some(b'\r') => rest.len() - 1,
                    _ => rest.len(),
                };
                if complete > max {
                    return Err(line_too_long(complete, max));
                }
                reject_bare_cr_lf(&rest[from.min(complete)..complete])?;
                *scanned = complete;
                Ok(None)
            }
        }
    }

    /// Builds the value from a frame that [`check`](Self::check) accepted.
    ///
    /// Bulk strings in the result share `frame`'s memory.
    pub fn parse_frame(&self, frame: &Bytes) -> ParseResult<RespValue> {
        self.build(frame, 0, 0).map(|(value, _)| value)
    }

    /// Builds the value at `pos`. `depth` is the number of enclosing arrays.
    fn build(&self, frame: &Bytes, pos: usize, depth: usize) -> ParseResult<(RespValue, usize)> {
        let type_byte = *frame.get(pos).ok_or(ProtocolError::Truncated)?;
        let (line, next) = frame_line(frame, pos + 1)?;

        match type_byte {
            prefix::SIMPLE_STRING => {
                Ok((RespValue::SimpleString(utf8(line, "simple string")?.to_string()), next))
            }
            prefix::ERROR => Ok((RespValue::Error(utf8(line, "error")?.to_string()), next)),
            prefix::INTEGER => Ok((RespValue::Integer(parse_decimal(line)?), next)),
            prefix::BULK_STRING => {
                let Some(len) = parse_length(line, "bulk length", self.limits.max_bulk_len)? else {
                    return Ok((RespValue::BulkString(None), next));
                };
                let end = self
                    .check_payload(frame, next, len)?
                    .ok_or(ProtocolError::Truncated)?;
                let data = frame.slice(next..next + len);
                Ok((RespValue::BulkString(Some(data)), end))
            }
            prefix::ARRAY => {
                let Some(count) = parse_length(line, "array length", self.limits.max_array_len)?
                else {
                    return Ok((RespValue::Array(None), next));
                };
                self.check_depth(depth)?;

                // Every element takes at least three bytes.
                let mut elements = Vec::with_capacity(count.min(frame.len() / 3));
                let mut pos = next;
                for _ in 0..count {
                    let (value, end) = self.build(frame, pos, depth + 1)?;
                    elements.push(value);
                    pos = end;
                }
                Ok((RespValue::Array(Some(elements)), pos))
            }
            other => Err(ProtocolError::UnknownType(other)),
        }
    }
}

/// Reads a line from a complete frame.
fn frame_line(frame: &[u8], start: usize) -> ParseResult<(&[u8], usize)> {
    let rest = &frame[start.min(frame.len())..];
    let len = find_crlf(rest).ok_or(ProtocolError::Truncated)?;
    Ok((&rest[..len], start + len + CRLF.len()))
}

fn utf8<'a>(line: &'a [u8], kind: &'static str) -> ParseResult<&'a str> {
    std::str::from_utf8(line).map_err(|_| ProtocolError::InvalidUtf8(kind))
}

fn line_too_long(len: usize, max: usize) -> ProtocolError {
    ProtocolError::LimitExceeded {
        what: "line length",
        len,
        max,
    }
}

fn reject_bare_cr_lf(bytes: &[u8]) -> ParseResult<()> {
    if bytes.iter().any(|&b| b == b'\r' || b == b'\n') {
        return Err(ProtocolError::ExpectedCrlf("instead of bare CR or LF"));
    }
    Ok(())
}

/// Parses a strict base-10 signed integer: optional `-`, then one or more digits.
fn parse_decimal(line: &[u8]) -> ParseResult<i64> {
    let invalid = || ProtocolError::InvalidInteger(String::from_utf8_lossy(line).into_owned());

    let digits = line.strip_prefix(b"-").unwrap_or(line);
    if digits.is_empty() || !digits.iter().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }

    // All bytes are ASCII at this point; only overflow can fail.
    std::str::from_utf8(line)
        .ok()
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or_else(invalid)
}

/// Parses a length header. `Ok(None)` is the null marker `-1`.
fn parse_length(line: &[u8], what: &'static str, max: usize) -> ParseResult<Option<usize>> {
    match parse_decimal(line)? {
        -1 => Ok(None),
        n if n < 0 => Err(ProtocolError::InvalidInteger(n.to_string())),
        n => {
            let len = usize::try_from(n).unwrap_or(usize::MAX);
            if len > max {
                return Err(ProtocolError::LimitExceeded { what, len, max });
            }
            Ok(Some(len))
        }
    }
}

/// Finds the position of CRLF in the buffer.
///
/// Returns the position of `\r` if found, or None if CRLF is not present.
#[inline]
fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|window| window == CRLF)
}

/// Helper function to parse a single RESP message with the default limits.
pub fn parse_message(buf: &[u8]) -> ParseResult<Option<(RespValue, usize)>> {
    RespParser::new().parse(buf)
}
