//! RESP Protocol Implementation
//!
//! This module provides the codec for the Redis Serialization Protocol (RESP2
//! subset: simple strings, errors, integers, bulk strings and arrays).
//!
//! ## Modules
//!
//! - `types`: Defines the `RespValue` enum
//! - `parser`: Incremental parser over buffered bytes, limits and `ProtocolError`
//! - `decoder`: Drives the parser over an async byte stream
//! - `encoder`: Serializes values to wire bytes
//!
//! ## Example
//!
//! ```
//! use respd::protocol::{parse_message, RespValue};
//! use bytes::Bytes;
//!
//! // Parsing incoming data
//! let data = b"*2\r\n$3\r\nGET\r\n$4\r\nname\r\n";
//! let (value, consumed) = parse_message(data).unwrap().unwrap();
//! assert_eq!(consumed, data.len());
//!
//! // Creating responses
//! let response = RespValue::bulk_string(Bytes::from("Ariz"));
//! assert_eq!(&response.encode().unwrap()[..], b"$4\r\nAriz\r\n");
//! ```

pub mod decoder;
pub mod encoder;
pub mod parser;
pub mod types;

// Re-export commonly used types for convenience
pub use decoder::{DecodeError, RespDecoder};
pub use encoder::{encode, encode_into, EncodeError, MAX_ENCODE_DEPTH};
pub use parser::{parse_message, DecodeLimits, ParseResult, ProtocolError, RespParser, ScanState};
pub use types::RespValue;
