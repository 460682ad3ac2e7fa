//! Error command
//!
//! The single command shape used to report failures to the client.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::{Command, CommandOut};
use crate::describe::{Describe, Describer};

/// No handler is registered under the requested name, or none is eligible
pub const COMMAND_HANDLER_NOT_FOUND: &str = "command_handler_not_found";

/// The handler returned a plain error
pub const EXEC_ERROR: &str = "exec_error";

/// Outbound encoding failed
pub const INTERNAL_ERROR: &str = "internal_error";

/// The inbound packet could not be parsed
pub const PARSE_ERROR: &str = "cannot parse command";

/// Message for a command name that was never registered
pub const NOT_FOUND_AT_ALL: &str = "command_handler_not_found at all";

/// Message for a command registered only above the caller's version
pub const NOT_FOUND_VERSION: &str = "command_handler_not_found version";

/// Error reported to the client as `{ "type": <kind>, "msg": <message> }`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorCommand {
    #[serde(rename = "type")]
    pub kind: String,

    #[serde(rename = "msg")]
    pub message: String,
}

impl ErrorCommand {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
        }
    }

    /// Wire form of this error; never fails
    pub fn to_command_out(&self) -> CommandOut {
        CommandOut::new(
            Self::NAME,
            Some(json!({ "type": self.kind, "msg": self.message })),
        )
    }
}

impl Command for ErrorCommand {
    const NAME: &'static str = "Error";
}

impl Describe for ErrorCommand {
    fn describe(d: &mut Describer<'_>) -> Value {
        d.object::<Self>(|o| {
            o.field::<String>("type");
            o.field::<String>("msg");
        })
    }
}

impl fmt::Display for ErrorCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}
