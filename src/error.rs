//! Error types for cmdlink
//!
//! `LinkError` covers everything the framework itself can fail at.
//! `Fault` is what handler bodies return; the router turns it into an
//! error command on the wire.

use std::fmt;

use thiserror::Error;

use crate::protocol::ErrorCommand;

/// Result type alias using LinkError
pub type Result<T> = std::result::Result<T, LinkError>;

/// Result type returned by handler bodies
pub type HandlerResult<T> = std::result::Result<T, Fault>;

/// Unified error type for cmdlink operations
#[derive(Debug, Error)]
pub enum LinkError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Protocol Errors
    // -------------------------------------------------------------------------
    #[error("Frame too large: {size} bytes (max {max})")]
    FrameTooLarge { size: usize, max: usize },

    // -------------------------------------------------------------------------
    // Serialization Errors
    // -------------------------------------------------------------------------
    #[error("Cannot decode command payload: {0}")]
    Deserialize(#[source] serde_json::Error),

    #[error("Cannot encode outbound data: {0}")]
    Serialize(#[source] serde_json::Error),

    // -------------------------------------------------------------------------
    // Handler Errors
    // -------------------------------------------------------------------------
    #[error("{0}")]
    Handler(Box<dyn std::error::Error + Send + Sync + 'static>),

    // -------------------------------------------------------------------------
    // Registration Errors
    // -------------------------------------------------------------------------
    #[error("Handler registration failed: {0}")]
    Registration(String),

    // -------------------------------------------------------------------------
    // Connection Errors
    // -------------------------------------------------------------------------
    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Connection limit reached ({0})")]
    ConnectionLimit(usize),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

impl LinkError {
    /// True for errors that mean the peer went away rather than misbehaved
    pub fn is_disconnect(&self) -> bool {
        match self {
            LinkError::ConnectionClosed => true,
            LinkError::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::UnexpectedEof
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::NotConnected
            ),
            _ => false,
        }
    }
}

/// Failure returned from a handler body.
///
/// A handler fails either with an ordinary error, which the router reports
/// as an `exec_error` command carrying the error's message, or with a
/// ready-made [`ErrorCommand`] that is passed to the client unchanged.
/// Either way no business commands from that handler reach the wire.
///
/// `Fault` is not itself a `std::error::Error`, so any error type converts
/// into it with `?`.
pub enum Fault {
    /// Plain error; surfaced as `exec_error`
    Exec(Box<dyn std::error::Error + Send + Sync + 'static>),

    /// Error command; surfaced as-is
    Command(ErrorCommand),
}

impl Fault {
    /// Plain error from a message
    pub fn msg(message: impl Into<String>) -> Self {
        Fault::Exec(Box::new(Message(message.into())))
    }

    /// Error command with the given kind and message
    pub fn command(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Fault::Command(ErrorCommand::new(kind, message))
    }
}

impl<E> From<E> for Fault
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn from(err: E) -> Self {
        Fault::Exec(Box::new(err))
    }
}

impl From<ErrorCommand> for Fault {
    fn from(cmd: ErrorCommand) -> Self {
        Fault::Command(cmd)
    }
}

impl fmt::Debug for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Fault::Exec(e) => f.debug_tuple("Exec").field(&e.to_string()).finish(),
            Fault::Command(c) => f.debug_tuple("Command").field(c).finish(),
        }
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Fault::Exec(e) => write!(f, "{e}"),
            Fault::Command(c) => write!(f, "{c}"),
        }
    }
}

#[derive(Debug)]
struct Message(String);

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for Message {}
