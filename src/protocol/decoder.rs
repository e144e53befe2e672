//! Stream Decoder
//!
//! [`RespDecoder`] pulls bytes from any [`AsyncRead`] into its own buffer and
//! hands them to [`RespParser`] until one complete value is available.
//!
//! TCP is a stream protocol: one read may return half a request, or three
//! requests and the start of a fourth. The decoder keeps whatever it has not
//! consumed in its buffer, so the next call starts exactly at the next value
//! and no byte is ever lost or read twice.
//!
//! While a value is still arriving, the decoder also keeps the parser's
//! [`ScanState`], so each read costs time proportional to the new bytes, not to
//! everything buffered so far. Once the value is complete it is split off the
//! buffer and built without copying bulk payloads.

use crate::protocol::parser::{DecodeLimits, ProtocolError, RespParser, ScanState};
use crate::protocol::types::RespValue;
use bytes::BytesMut;
use std::io;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::trace;

/// Initial buffer capacity
const INITIAL_BUFFER_SIZE: usize = 4096;

/// Spare capacity we make sure exists before every read
const MIN_READ_CAPACITY: usize = 1024;

/// Errors returned by [`RespDecoder::decode`].
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The peer sent bytes that are not valid RESP
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// The underlying stream failed
    #[error("transport error: {0}")]
    Transport(#[from] io::Error),
}

/// Reads one RESP value at a time from a byte stream.
///
/// # Example
///
/// ```
/// # tokio_test::block_on(async {
/// use respd::protocol::{RespDecoder, RespValue};
///
/// let mut stream = &b"+OK\r\n:42\r\n"[..];
/// let mut decoder = RespDecoder::default();
///
/// assert_eq!(decoder.decode(&mut stream).await.unwrap(), Some(RespValue::ok()));
/// assert_eq!(decoder.decode(&mut stream).await.unwrap(), Some(RespValue::integer(42)));
/// // Clean end of stream
/// assert_eq!(decoder.decode(&mut stream).await.unwrap(), None);
/// # });
/// ```
#[derive(Debug)]
pub struct RespDecoder {
    parser: RespParser,

    /// Bytes read from the stream but not yet consumed by a parsed value
    buffer: BytesMut,

    /// Progress through the partially buffered value at the front of `buffer`
    scan: ScanState,
}

impl Default for RespDecoder {
    fn default() -> Self {
        Self::new(DecodeLimits::default())
    }
}

impl RespDecoder {
    pub fn new(limits: DecodeLimits) -> Self {
        Self {
            parser: RespParser::with_limits(limits),
            buffer: BytesMut::with_capacity(INITIAL_BUFFER_SIZE),
            scan: ScanState::new(),
        }
    }

    /// Number of bytes buffered but not yet decoded.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Decodes the next value, reading from `stream` only as much as needed.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(value))` - One complete value
    /// - `Ok(None)` - The stream ended cleanly between values (disconnect)
    /// - `Err(DecodeError::Protocol(ProtocolError::Truncated))` - The stream ended inside a value
    /// - `Err(_)` - Malformed input or an I/O failure
    ///
    /// Cancelling the returned future (e.g. on a timeout) loses no data: bytes
    /// already read stay buffered for the next call.
    pub async fn decode<R>(&mut self, stream: &mut R) -> Result<Option<RespValue>, DecodeError>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        loop {
            if let Some(value) = self.try_decode()? {
                return Ok(Some(value));
            }

            if self.buffer.capacity() - self.buffer.len() < MIN_READ_CAPACITY {
                self.buffer.reserve(INITIAL_BUFFER_SIZE);
            }

            let n = stream.read_buf(&mut self.buffer).await?;
            if n == 0 {
                if self.buffer.is_empty() {
                    return Ok(None);
                }
                trace!(buffered = self.buffer.len(), "Stream ended inside a message");
                return Err(ProtocolError::Truncated.into());
            }
            trace!(bytes = n, buffered = self.buffer.len(), "Read data");
        }
    }

    /// Decodes a value from already buffered bytes, without touching the stream.
    pub fn try_decode(&mut self) -> Result<Option<RespValue>, ProtocolError> {
        if self.buffer.is_empty() {
            return Ok(None);
        }

        let Some(len) = self.parser.check(&self.buffer, &mut self.scan)? else {
            return Ok(None);
        };
        self.scan = ScanState::new();

        let frame = self.buffer.split_to(len).freeze();
        trace!(consumed = len, remaining = self.buffer.len(), "Parsed value");
        Ok(Some(self.parser.parse_frame(&frame)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::parser::parse_message;
    use bytes::Bytes;
    use tokio_test::io::Builder;

    #[tokio::test]
    async fn test_split_read_invariance() {
        let messages: [&[u8]; 5] = [
            b"*3\r\n$3\r\nSET\r\n$5\r\nmykey\r\n$7\r\nmyvalue\r\n",
            b"*2\r\n*3\r\n:1\r\n:-2\r\n$-1\r\n*2\r\n+Hello\r\n-World\r\n",
            b"$12\r\nab\r\ncd\r\n\r\nef\r\n",
            b":-9223372036854775808\r\n",
            b"*4\r\n*-1\r\n*0\r\n$0\r\n\r\n$-1\r\n",
        ];

        for message in messages {
            let (expected, _) = parse_message(message).unwrap().unwrap();

            for split in 1..message.len() {
                let mut stream = Builder::new()
                    .read(&message[..split])
                    .read(&message[split..])
                    .build();
                let mut decoder = RespDecoder::default();

                let value = decoder.decode(&mut stream).await.unwrap();
                assert_eq!(value.as_ref(), Some(&expected), "split at {}", split);
                assert_eq!(decoder.buffered(), 0);
                assert!(decoder.decode(&mut stream).await.unwrap().is_none());
            }
        }
    }

    #[tokio::test]
    async fn test_byte_at_a_time() {
        let message = b"*2\r\n$4\r\nECHO\r\n$6\r\nhi\r\nyo\r\n";
        let mut builder = Builder::new();
        for byte in message.iter() {
            builder.read(std::slice::from_ref(byte));
        }
        let mut stream = builder.build();
        let mut decoder = RespDecoder::default();

        let value = decoder.decode(&mut stream).await.unwrap().unwrap();
        assert_eq!(
            value,
            RespValue::array(vec![
                RespValue::bulk_string(Bytes::from("ECHO")),
                RespValue::bulk_string(Bytes::from("hi\r\nyo")),
            ])
        );
    }

    #[tokio::test]
    async fn test_pipelined_values_keep_their_order() {
        let mut stream = Builder::new()
            .read(b"+first\r\n:2\r\n$5\r\nthi")
            .read(b"rd\r\n")
            .build();
        let mut decoder = RespDecoder::default();

        assert_eq!(
            decoder.decode(&mut stream).await.unwrap(),
            Some(RespValue::simple_string("first"))
        );
        assert_eq!(
            decoder.decode(&mut stream).await.unwrap(),
            Some(RespValue::integer(2))
        );
        assert_eq!(
            decoder.decode(&mut stream).await.unwrap(),
            Some(RespValue::bulk_string(Bytes::from("third")))
        );
        assert!(decoder.decode(&mut stream).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_clean_disconnect() {
        let mut stream = Builder::new().build();
        let mut decoder = RespDecoder::default();
        assert!(decoder.decode(&mut stream).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_truncated_inside_bulk_payload() {
        let mut stream = Builder::new().read(b"*1\r\n$4\r\nPI").build();
        let mut decoder = RespDecoder::default();

        let err = decoder.decode(&mut stream).await.unwrap_err();
        assert!(matches!(err, DecodeError::Protocol(ProtocolError::Truncated)));
    }

    #[tokio::test]
    async fn test_limit_rejected_from_header_alone() {
        let mut stream = Builder::new().read(b"$1000000\r\n").build();
        let mut decoder = RespDecoder::new(DecodeLimits {
            max_bulk_len: 1024,
            ..DecodeLimits::default()
        });

        let err = decoder.decode(&mut stream).await.unwrap_err();
        assert!(matches!(
            err,
            DecodeError::Protocol(ProtocolError::LimitExceeded { len: 1_000_000, .. })
        ));
    }

    #[tokio::test]
    async fn test_transport_error() {
        let mut stream = Builder::new()
            .read(b"*1\r\n")
            .read_error(io::Error::new(io::ErrorKind::ConnectionReset, "reset"))
            .build();
        let mut decoder = RespDecoder::default();

        let err = decoder.decode(&mut stream).await.unwrap_err();
        assert!(matches!(err, DecodeError::Transport(ref e) if e.kind() == io::ErrorKind::ConnectionReset));
    }

    /// Each read costs time for the new bytes only, so a large value
    /// arriving in small reads decodes in linear time.
    #[tokio::test]
    async fn test_large_value_over_small_reads() {
        const PAYLOAD: usize = 16 * 1024 * 1024;

        let first = vec![b'a'; PAYLOAD];
        let second = vec![b'b'; PAYLOAD];
        let mut message = format!("*2\r\n${PAYLOAD}\r\n").into_bytes();
        message.extend_from_slice(&first);
        message.extend_from_slice(format!("\r\n${PAYLOAD}\r\n").as_bytes());
        message.extend_from_slice(&second);
        message.extend_from_slice(b"\r\n");

        let (mut client, mut server) = tokio::io::duplex(4096);
        let writer = tokio::spawn(async move {
            use tokio::io::AsyncWriteExt;
            client.write_all(&message).await.unwrap();
        });

        let mut decoder = RespDecoder::new(DecodeLimits {
            max_bulk_len: PAYLOAD,
            ..DecodeLimits::default()
        });
        let started = std::time::Instant::now();
        let value = decoder.decode(&mut server).await.unwrap().unwrap();
        let elapsed = started.elapsed();
        writer.await.unwrap();

        assert!(elapsed < std::time::Duration::from_secs(2), "took {elapsed:?}");
        let items = value.as_array().unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0], RespValue::bulk_string(Bytes::from(first)));
        assert_eq!(items[1], RespValue::bulk_string(Bytes::from(second)));
        assert_eq!(decoder.buffered(), 0);
    }

    #[test]
    fn test_try_decode_without_io() {
        let mut decoder = RespDecoder::default();
        assert_eq!(decoder.try_decode(), Ok(None));
    }
}
