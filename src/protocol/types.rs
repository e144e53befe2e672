//! Protocol Values
//!
//! A [`RespValue`] is one decoded request or one reply. Five kinds exist on
//! the wire, told apart by their first byte:
//!
//! | Byte | Kind          | Wire form                                   |
//! |------|---------------|---------------------------------------------|
//! | `+`  | SimpleString  | `+OK\r\n`                                   |
//! | `-`  | Error         | `-ERR bad thing\r\n`                        |
//! | `:`  | Integer       | `:1000\r\n`                                 |
//! | `$`  | BulkString    | `$5\r\nhello\r\n`, null is `$-1\r\n`        |
//! | `*`  | Array         | `*1\r\n$4\r\nPING\r\n`, null is `*-1\r\n`   |

use super::encoder::MAX_ENCODE_DEPTH;
use bytes::Bytes;
use std::fmt;

/// Line terminator
pub const CRLF: &[u8] = b"\r\n";

/// First byte of each value kind
pub mod prefix {
    pub const SIMPLE_STRING: u8 = b'+';
    pub const ERROR: u8 = b'-';
    pub const INTEGER: u8 = b':';
    pub const BULK_STRING: u8 = b'$';
    pub const ARRAY: u8 = b'*';
}

/// A single protocol value.
///
/// The null bulk string and the null array are their own states (`None`),
/// so `$-1\r\n` never compares equal to `$0\r\n\r\n` and `*-1\r\n` never
/// compares equal to `*0\r\n`.
///
/// Encoding and `Display` stop at [`MAX_ENCODE_DEPTH`] levels of arrays.
/// Decoded values are bounded by [`DecodeLimits`](super::DecodeLimits);
/// a handler building its own reply keeps it shallow enough that the
/// derived `Clone` and `Drop` do not exhaust the stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RespValue {
    /// One line of text without CR or LF
    SimpleString(String),

    /// One line of error text, conventionally starting with a code like `ERR`
    Error(String),

    Integer(i64),

    /// Length-prefixed bytes, any content allowed; `None` is the null bulk string
    BulkString(Option<Bytes>),

    /// Counted sequence of values, possibly nested; `None` is the null array
    Array(Option<Vec<RespValue>>),
}

impl RespValue {
    /// Simple string reply. The text must not contain CR or LF, or encoding fails.
    ///
    /// ```
    /// use respd::protocol::RespValue;
    /// assert_eq!(&RespValue::simple_string("QUEUED").encode().unwrap()[..], b"+QUEUED\r\n");
    /// ```
    pub fn simple_string(s: impl Into<String>) -> Self {
        RespValue::SimpleString(s.into())
    }

    /// Error reply, e.g. `RespValue::error("ERR no such key")`.
    pub fn error(s: impl Into<String>) -> Self {
        RespValue::Error(s.into())
    }

    pub fn integer(n: i64) -> Self {
        RespValue::Integer(n)
    }

    /// Non-null bulk string.
    ///
    /// ```
    /// use respd::protocol::RespValue;
    /// let payload = RespValue::bulk_string(&b"a\r\nb"[..]);
    /// assert_eq!(payload.as_bytes(), Some(&b"a\r\nb"[..]));
    /// ```
    pub fn bulk_string(data: impl Into<Bytes>) -> Self {
        RespValue::BulkString(Some(data.into()))
    }

    /// The null bulk string, `$-1\r\n`.
    pub fn null_bulk_string() -> Self {
        RespValue::BulkString(None)
    }

    /// Creates a (non-null) array.
    pub fn array(values: Vec<RespValue>) -> Self {
        RespValue::Array(Some(values))
    }

    /// The null array, `*-1\r\n`.
    pub fn null_array() -> Self {
        RespValue::Array(None)
    }

    /// `+OK`
    pub fn ok() -> Self {
        Self::simple_string("OK")
    }

    /// `+PONG`
    pub fn pong() -> Self {
        Self::simple_string("PONG")
    }

    /// Returns true for the null bulk string and the null array.
    pub fn is_null(&self) -> bool {
        matches!(self, RespValue::BulkString(None) | RespValue::Array(None))
    }

    pub fn is_error(&self) -> bool {
        matches!(self, RespValue::Error(_))
    }

    /// Returns the payload of a non-null bulk string, or the text of a simple string.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            RespValue::BulkString(Some(b)) => Some(b),
            RespValue::SimpleString(s) => Some(s.as_bytes()),
            _ => None,
        }
    }

    /// Attempts to view a SimpleString or a UTF-8 BulkString as text.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            RespValue::SimpleString(s) => Some(s),
            RespValue::BulkString(Some(b)) => std::str::from_utf8(b).ok(),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            RespValue::Integer(n) => Some(*n),
            _ => None,
        }
    }

    /// Returns the elements of a non-null array.
    pub fn as_array(&self) -> Option<&[RespValue]> {
        match self {
            RespValue::Array(Some(arr)) => Some(arr),
            _ => None,
        }
    }

    /// Consumes self and returns the elements if this is a non-null array.
    pub fn into_array(self) -> Option<Vec<RespValue>> {
        match self {
            RespValue::Array(Some(arr)) => Some(arr),
            _ => None,
        }
    }
}

impl From<i64> for RespValue {
    fn from(n: i64) -> Self {
        RespValue::Integer(n)
    }
}

impl From<Bytes> for RespValue {
    fn from(data: Bytes) -> Self {
        RespValue::BulkString(Some(data))
    }
}

impl From<Vec<RespValue>> for RespValue {
    fn from(values: Vec<RespValue>) -> Self {
        RespValue::Array(Some(values))
    }
}

/// Human readable form, in the style of `redis-cli`. Used for logging only.
impl fmt::Display for RespValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.render(f, 0)
    }
}

impl RespValue {
    /// Arrays nested deeper than [`MAX_ENCODE_DEPTH`] are shown as `(...)`.
    fn render(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        match self {
            RespValue::SimpleString(text) => write!(f, "{text}"),
            RespValue::Error(text) => write!(f, "(error) {text}"),
            RespValue::Integer(n) => write!(f, "(integer) {n}"),
            RespValue::BulkString(None) | RespValue::Array(None) => write!(f, "(nil)"),
            RespValue::BulkString(Some(data)) => {
                match std::str::from_utf8(data) {
                    Ok(text) => write!(f, "{:?}", text),
                    Err(_) => write!(f, "({} bytes)", data.len()),
                }
            }
            RespValue::Array(Some(_)) if depth >= MAX_ENCODE_DEPTH => write!(f, "(...)"),
            RespValue::Array(Some(values)) => {
                if values.is_empty() {
                    return write!(f, "(empty array)");
                }
                let mut sep = "";
                for (n, value) in values.iter().enumerate() {
                    write!(f, "{sep}{}) ", n + 1)?;
                    value.render(f, depth + 1)?;
                    sep = " ";
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_and_empty_are_distinct() {
        assert_ne!(
            RespValue::null_bulk_string(),
            RespValue::bulk_string(Bytes::new())
        );
        assert_ne!(RespValue::null_array(), RespValue::array(vec![]));
        assert!(RespValue::null_bulk_string().is_null());
        assert!(RespValue::null_array().is_null());
        assert!(!RespValue::array(vec![]).is_null());
    }

    #[test]
    fn test_accessors() {
        let value = RespValue::array(vec![
            RespValue::bulk_string(Bytes::from("GET")),
            RespValue::integer(7),
        ]);
        let items = value.as_array().unwrap();
        assert_eq!(items[0].as_str(), Some("GET"));
        assert_eq!(items[0].as_bytes(), Some(&b"GET"[..]));
        assert_eq!(items[1].as_integer(), Some(7));
        assert_eq!(RespValue::null_array().into_array(), None);
        assert!(RespValue::error("ERR nope").is_error());
    }

    #[test]
    fn test_display() {
        assert_eq!(RespValue::pong().to_string(), "PONG");
        assert_eq!(RespValue::null_bulk_string().to_string(), "(nil)");
        assert_eq!(RespValue::integer(-3).to_string(), "(integer) -3");
        assert_eq!(
            RespValue::bulk_string(Bytes::from_static(b"a\r\n")).to_string(),
            "\"a\\r\\n\""
        );
        assert_eq!(
            RespValue::bulk_string(Bytes::from_static(&[0xff, 0x00])).to_string(),
            "(2 bytes)"
        );
        assert_eq!(
            RespValue::array(vec![RespValue::ok(), RespValue::integer(1)]).to_string(),
            "1) OK 2) (integer) 1"
        );
    }

    #[test]
    fn test_display_stops_at_encode_depth() {
        let deep = (0..MAX_ENCODE_DEPTH + 3)
            .fold(RespValue::integer(7), |inner, _| RespValue::array(vec![inner]));
        let shown = deep.to_string();

        assert_eq!(shown.matches("1) ").count(), MAX_ENCODE_DEPTH);
        assert!(shown.ends_with("1) (...)"));
        assert!(!shown.contains("(integer) 7"));
    }
}
