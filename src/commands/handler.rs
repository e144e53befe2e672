//! Built-in Command Handler
//!
//! The handler the `respd` binary wires in by default. It holds no data and
//! only implements the connection-level commands:
//!
//! - `PING [message]` - Test connection
//! - `ECHO message` - Echo message
//! - `COMMAND` - Command introspection (always an empty list)
//!
//! Anything else is answered with an unknown command error. A real data store
//! plugs in by implementing [`CommandHandler`] and falling back to this
//! handler for the commands it does not own.

use crate::commands::{CommandError, CommandHandler, Request};
use crate::protocol::RespValue;
use bytes::Bytes;

/// Stateless handler for connection-level commands.
#[derive(Debug, Default, Clone, Copy)]
pub struct BuiltinHandler;

impl BuiltinHandler {
    pub fn new() -> Self {
        Self
    }

    /// Dispatches a command to its handler.
    fn dispatch(&self, cmd: &str, request: Request) -> Result<RespValue, CommandError> {
        match cmd {
            "PING" => self.cmd_ping(request.args),
            "ECHO" => self.cmd_echo(request.args),
            "COMMAND" => Ok(RespValue::array(vec![])),
            _ => Err(request.unknown()),
        }
    }

    /// PING [message]
    fn cmd_ping(&self, mut args: Vec<Bytes>) -> Result<RespValue, CommandError> {
        match args.len() {
            0 => Ok(RespValue::pong()),
            1 => Ok(RespValue::bulk_string(args.remove(0))),
            _ => Err(CommandError::WrongArity("ping".to_string())),
        }
    }

    /// ECHO message
    fn cmd_echo(&self, mut args: Vec<Bytes>) -> Result<RespValue, CommandError> {
        if args.len() != 1 {
            return Err(CommandError::WrongArity("echo".to_string()));
        }
        Ok(RespValue::bulk_string(args.remove(0)))
    }
}

impl CommandHandler for BuiltinHandler {
    fn handle(&self, request: Request) -> Result<RespValue, CommandError> {
        let cmd = request.name.to_ascii_uppercase();
        self.dispatch(&cmd, request)
    }
}
