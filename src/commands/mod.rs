//! Command Handling
//!
//! Command semantics live behind the [`CommandHandler`] trait so the
//! connection layer never depends on what a command does. This module owns
//! the small amount of policy every server needs regardless of its command
//! table:
//!
//! - requests must be non-empty arrays of strings
//! - a bare `PING` is always answered with `+PONG`
//! - handler errors become `-ERR ...` replies and never close the session
//!
//! ## Architecture
//!
//! ```text
//! Decoded RespValue
//!          │
//!          ▼
//! ┌───────────────────┐
//! │ Request::try_from │  name + args, or -ERR reply
//! └─────────┬─────────┘
//!           │
//!           ▼
//! ┌───────────────────┐
//! │    dispatch()     │  PING liveness, error conversion
//! └─────────┬─────────┘
//!           │
//!           ▼
//! ┌───────────────────┐
//! │  CommandHandler   │  (pluggable, e.g. BuiltinHandler)
//! └───────────────────┘
//! ```

pub mod handler;

pub use handler::BuiltinHandler;

use crate::protocol::RespValue;
use bytes::Bytes;
use thiserror::Error;

/// Maps one request to one reply.
///
/// A single handler instance is shared by every session, so `handle` may be
/// called concurrently from many tasks. Implementations that keep state must
/// synchronize it themselves. `handle` runs on the session's task and must not
/// block for long.
pub trait CommandHandler: Send + Sync {
    fn handle(&self, request: Request) -> Result<RespValue, CommandError>;
}

/// A handler that recognizes no commands at all.
///
/// Useful on its own only to show the policy `dispatch` applies: bare `PING`
/// still works and everything else is an unknown command.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullHandler;

impl CommandHandler for NullHandler {
    fn handle(&self, request: Request) -> Result<RespValue, CommandError> {
        Err(request.unknown())
    }
}

/// A command invocation: the command name followed by its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// Command name as sent by the client
    pub name: String,
    pub args: Vec<Bytes>,
}

impl Request {
    pub fn new(name: impl Into<String>, args: Vec<Bytes>) -> Self {
        Self {
            name: name.into(),
            args,
        }
    }

    /// Case-insensitive command name comparison.
    pub fn is(&self, command: &str) -> bool {
        self.name.eq_ignore_ascii_case(command)
    }

    /// The error for a command the handler does not know.
    pub fn unknown(self) -> CommandError {
        CommandError::UnknownCommand {
            name: self.name,
            args: self.args,
        }
    }
}

impl TryFrom<RespValue> for Request {
    type Error = CommandError;

    fn try_from(value: RespValue) -> Result<Self, Self::Error> {
        // Clients send commands to the server as RESP arrays.
        let parts = value.into_array().ok_or(CommandError::MalformedRequest)?;
        let mut parts = parts.into_iter().map(|part| match part {
            RespValue::BulkString(Some(bytes)) => Ok(bytes),
            RespValue::SimpleString(s) => Ok(Bytes::from(s)),
            _ => Err(CommandError::MalformedRequest),
        });

        let name = match parts.next() {
            Some(name) => name?,
            None => return Err(CommandError::EmptyCommand),
        };
        let name = String::from_utf8(name.to_vec()).map_err(|_| CommandError::MalformedRequest)?;
        let args = parts.collect::<Result<Vec<_>, _>>()?;

        Ok(Self { name, args })
    }
}

/// Errors a command can fail with. All of them are reported to the client
/// as an error reply and leave the session open.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CommandError {
    /// The request is not an array of strings
    #[error("ERR Protocol error: expected a non-null array of bulk strings")]
    MalformedRequest,

    /// The request is an empty array
    #[error("ERR empty command")]
    EmptyCommand,

    #[error("ERR unknown command '{name}', with args beginning with: {}", args_preview(.args))]
    UnknownCommand { name: String, args: Vec<Bytes> },

    #[error("ERR wrong number of arguments for '{0}' command")]
    WrongArity(String),

    #[error("ERR {0}")]
    InvalidArgument(String),
}

impl CommandError {
    /// Converts the error into the reply sent to the client.
    ///
    /// Client-supplied text may end up in the message, so CR and LF are
    /// replaced to keep the reply encodable.
    pub fn to_resp(&self) -> RespValue {
        RespValue::Error(sanitize_line(&self.to_string()))
    }
}

fn args_preview(args: &[Bytes]) -> String {
    args.iter()
        .map(|arg| format!("'{}' ", String::from_utf8_lossy(arg)))
        .collect()
}

/// Replaces CR and LF so the text fits in a simple string or error.
pub fn sanitize_line(text: &str) -> String {
    text.replace(['\r', '\n'], " ")
}

/// Runs one decoded request through `handler` and produces the reply.
///
/// This never fails: every problem becomes an error reply.
pub fn dispatch(handler: &dyn CommandHandler, value: RespValue) -> RespValue {
    let request = match Request::try_from(value) {
        Ok(request) => request,
        Err(e) => return e.to_resp(),
    };

    // Liveness does not depend on which handler is wired in.
    if request.is("PING") && request.args.is_empty() {
        return RespValue::pong();
    }

    match handler.handle(request) {
        Ok(reply) => reply,
        Err(e) => e.to_resp(),
    }
}
