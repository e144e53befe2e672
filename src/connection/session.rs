//! Client Session
//!
//! A [`Session`] owns one client connection and runs the request loop for it.
//! Each session runs on its own task; sessions share nothing except the
//! command handler and the statistics counters.
//!
//! ## Session Lifecycle
//!
//! ```text
//!        ┌──────────────────┐   clean EOF    ┌────────────────┐
//!   ┌───>│ AwaitingRequest  │──────────────>│ Closed(Normal) │
//!   │    └────────┬─────────┘               └────────────────┘
//!   │             │ request decoded
//!   │             ▼                          ┌────────────────┐
//!   │    ┌──────────────────┐  protocol /   │ Closed(Error)  │
//!   │    │   Dispatching    │  I/O error,   └────────────────┘
//!   │    └────────┬─────────┘  timeout             ▲
//!   │             │ reply                          │
//!   │             ▼                                │
//!   │    ┌──────────────────┐                      │
//!   └────│  WritingReply    │──────────────────────┘
//!        └──────────────────┘
//! ```
//!
//! Requests are handled strictly one at a time: the reply to a request is
//! written and flushed before the next request is decoded, so replies come
//! back in request order even when the client pipelines.
//!
//! A malformed request ends the session. Once framing is broken there is no
//! reliable way to find the start of the next request, so the session sends a
//! best-effort `-ERR Protocol error: ...` reply and closes.
//!
//! Closing the connection is the only cancellation mechanism: a peer that
//! goes away makes the pending read return EOF or an error, which ends the
//! loop.

use crate::commands::{dispatch, sanitize_line, CommandHandler};
use crate::config::ServerConfig;
use crate::protocol::{encode_into, DecodeError, EncodeError, ProtocolError, RespDecoder, RespValue};
use bytes::BytesMut;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, info, instrument, trace, warn};

/// Sent instead of a handler reply whose text contains CR or LF
const INVALID_REPLY: &[u8] = b"-ERR reply contained invalid characters\r\n";

/// Sent instead of a handler reply nested too deeply to encode
const NESTED_REPLY: &[u8] = b"-ERR reply nested too deeply\r\n";

/// Initial write buffer capacity
const INITIAL_WRITE_BUFFER_SIZE: usize = 1024;

/// Statistics for connection handling
#[derive(Debug, Default)]
pub struct ConnectionStats {
    /// Total number of connections accepted
    pub connections_accepted: AtomicU64,
    /// Currently active connections
    pub active_connections: AtomicU64,
    /// Total requests answered
    pub commands_processed: AtomicU64,
    /// Sessions closed because of malformed input
    pub protocol_errors: AtomicU64,
}

impl ConnectionStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connection_opened(&self) {
        self.connections_accepted.fetch_add(1, Ordering::Relaxed);
        self.active_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn command_processed(&self) {
        self.commands_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn protocol_error(&self) {
        self.protocol_errors.fetch_add(1, Ordering::Relaxed);
    }
}

/// How a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseKind {
    /// The client disconnected between requests
    Normal,
    /// Protocol error, I/O error or timeout
    Error,
}

/// Where a session is in its request loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    AwaitingRequest,
    Dispatching,
    WritingReply,
    Closed(CloseKind),
}

/// Why a session ended with [`CloseKind::Error`].
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The client sent malformed RESP
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// I/O error (network issue)
    #[error("I/O error: {0}")]
    Transport(#[from] io::Error),

    #[error("no request received within {0:?}")]
    ReadTimeout(Duration),

    #[error("reply not written within {0:?}")]
    WriteTimeout(Duration),
}

impl From<DecodeError> for SessionError {
    fn from(e: DecodeError) -> Self {
        match e {
            DecodeError::Protocol(e) => SessionError::Protocol(e),
            DecodeError::Transport(e) => SessionError::Transport(e),
        }
    }
}

/// Runs the decode, dispatch, write loop for a single connection.
///
/// The stream can be anything readable and writable: a `TcpStream` in
/// production, an in-memory duplex or mock in tests.
pub struct Session<S> {
    /// The connection, owned exclusively by this session
    stream: S,

    /// Request decoder, holds bytes read but not yet decoded
    decoder: RespDecoder,

    /// Reply buffer, reused across requests
    write_buf: BytesMut,

    /// The command handler (shared across connections)
    handler: Arc<dyn CommandHandler>,

    /// Connection statistics (shared)
    stats: Arc<ConnectionStats>,

    read_timeout: Option<Duration>,
    write_timeout: Option<Duration>,

    state: SessionState,
}

impl<S> Session<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(
        stream: S,
        config: &ServerConfig,
        handler: Arc<dyn CommandHandler>,
        stats: Arc<ConnectionStats>,
    ) -> Self {
        stats.connection_opened();

        Self {
            stream,
            decoder: RespDecoder::new(config.limits),
            write_buf: BytesMut::with_capacity(INITIAL_WRITE_BUFFER_SIZE),
            handler,
            stats,
            read_timeout: config.read_timeout,
            write_timeout: config.write_timeout,
            state: SessionState::AwaitingRequest,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Runs the session until the client disconnects or an error occurs.
    ///
    /// `Ok(())` means the client closed the connection between requests. The
    /// stream is shut down before this returns, in both cases.
    pub async fn run(&mut self) -> Result<(), SessionError> {
        let result = self.main_loop().await;

        let kind = match &result {
            Ok(()) => CloseKind::Normal,
            Err(_) => CloseKind::Error,
        };
        self.transition(SessionState::Closed(kind));

        if let Err(e) = self.stream.shutdown().await {
            trace!(error = %e, "Shutdown after close failed");
        }

        result
    }

    /// The main read-dispatch-respond loop.
    async fn main_loop(&mut self) -> Result<(), SessionError> {
        loop {
            self.transition(SessionState::AwaitingRequest);

            let request = match self.read_request().await {
                Ok(Some(request)) => request,
                Ok(None) => return Ok(()),
                Err(SessionError::Protocol(e)) => {
                    self.stats.protocol_error();
                    self.reply_protocol_error(&e).await;
                    return Err(SessionError::Protocol(e));
                }
                Err(e) => return Err(e),
            };

            self.transition(SessionState::Dispatching);
            trace!(request = %request, "Dispatching request");
            let reply = dispatch(self.handler.as_ref(), request);
            self.stats.command_processed();

            self.transition(SessionState::WritingReply);
            self.write_reply(&reply).await?;
        }
    }

    /// Decodes the next request, bounded by the read timeout.
    async fn read_request(&mut self) -> Result<Option<RespValue>, SessionError> {
        let decode = self.decoder.decode(&mut self.stream);

        let result = match self.read_timeout {
            Some(limit) => timeout(limit, decode)
                .await
                .map_err(|_| SessionError::ReadTimeout(limit))?,
            None => decode.await,
        };

        Ok(result?)
    }

    /// Encodes and writes one reply, then flushes.
    async fn write_reply(&mut self, reply: &RespValue) -> Result<(), SessionError> {
        self.write_buf.clear();
        if let Err(e) = encode_into(reply, &mut self.write_buf) {
            warn!(error = %e, "Handler produced a reply that cannot be encoded");
            self.write_buf.extend_from_slice(match e {
                EncodeError::InvalidText { .. } => INVALID_REPLY,
                EncodeError::NestingTooDeep { .. } => NESTED_REPLY,
            });
        }

        let write = write_and_flush(&mut self.stream, &self.write_buf);
        match self.write_timeout {
            Some(limit) => timeout(limit, write)
                .await
                .map_err(|_| SessionError::WriteTimeout(limit))??,
            None => write.await?,
        }

        trace!(bytes = self.write_buf.len(), "Sent reply");
        Ok(())
    }

    /// Tells the client why it is being disconnected. Failure to do so is
    /// ignored, the session is closing either way.
    async fn reply_protocol_error(&mut self, error: &ProtocolError) {
        let reply = RespValue::error(sanitize_line(&format!("ERR Protocol error: {}", error)));
        if let Err(e) = self.write_reply(&reply).await {
            debug!(error = %e, "Could not deliver protocol error reply");
        }
    }

    fn transition(&mut self, next: SessionState) {
        trace!(from = ?self.state, to = ?next, "Session state");
        self.state = next;
    }
}

impl<S> Drop for Session<S> {
    fn drop(&mut self) {
        self.stats.connection_closed();
    }
}

async fn write_and_flush<W>(stream: &mut W, bytes: &[u8]) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    stream.write_all(bytes).await?;
    stream.flush().await
}

/// Handles a client connection.
///
/// This is a convenience function that creates a [`Session`] for an accepted
/// TCP connection, runs it to completion and logs how it ended. The
/// connection is closed when this returns.
#[instrument(name = "connection", skip_all, fields(client = %addr))]
pub async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    config: Arc<ServerConfig>,
    handler: Arc<dyn CommandHandler>,
    stats: Arc<ConnectionStats>,
) {
    if let Err(e) = stream.set_nodelay(true) {
        debug!(error = %e, "Could not set TCP_NODELAY");
    }

    info!("Client connected");
    let mut session = Session::new(stream, &config, handler, stats);

    match session.run().await {
        Ok(()) => debug!("Client disconnected"),
        Err(SessionError::Transport(ref e)) if e.kind() == io::ErrorKind::ConnectionReset => {
            debug!("Connection reset by client")
        }
        Err(e) => warn!(error = %e, "Connection closed with error"),
    }
}
