//! Command Router
//!
//! Maps command names to versioned handlers and turns inbound packets into
//! exactly one outbound packet each.
//!
//! ## Version resolution
//! Entries for a name are kept sorted by version, highest first (stable for
//! equal versions). A command resolved at version `v` runs the first entry
//! whose version is `<= v`.
//!
//! ## Errors on the wire
//! - unknown name: `command_handler_not_found` / "... at all"
//! - no entry at or below `v`: `command_handler_not_found` / "... version"
//! - handler or payload decode error: `exec_error` with the error message
//! - handler-returned error command: passed through unchanged
//! - output encoding failure: `internal_error`
//! - unparseable packet: one `cannot parse command` error, no cid

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use serde_json::Value;

use crate::describe::{Describe, Describer, TypeOverrides};
use crate::error::{LinkError, Result};
use crate::handler::{Handler, OutputSlot};
use crate::network::{Conn, Session};
use crate::protocol::{
    decode_packet, encode_packet, Command, CommandOut, ErrorCommand, PacketOut, COMMAND_HANDLER_NOT_FOUND,
    EXEC_ERROR, INTERNAL_ERROR, NOT_FOUND_AT_ALL, NOT_FOUND_VERSION, PARSE_ERROR,
};

/// Target for inbound/outbound packet logging
pub const TRAFFIC_TARGET: &str = "cmdlink::traffic";

/// Resolves the protocol version a connection speaks
pub type VersionResolver<S> = Box<dyn Fn(&Conn<S>) -> i32 + Send + Sync>;

/// One protocol-version implementation of a command
pub struct HandlerEntry<S> {
    pub version: i32,
    pub handler: Handler<S>,
}

/// Command router
pub struct Router<S> {
    handlers: HashMap<String, Vec<HandlerEntry<S>>>,
    resolve_version: VersionResolver<S>,
    log_traffic: bool,
}

impl<S: Session> Router<S> {
    /// Empty router resolving every connection to version 0
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
            resolve_version: Box::new(|_: &Conn<S>| 0),
            log_traffic: false,
        }
    }

    // =========================================================================
    // Registration
    // =========================================================================

    /// Register a handler for `name` at `version`.
    ///
    /// Registration happens before traffic; a failure here is a programming
    /// error and should abort startup.
    pub fn register(&mut self, version: i32, name: &str, handler: Handler<S>) -> Result<&mut Self> {
        if name.is_empty() {
            return Err(LinkError::Registration("command name must not be empty".to_string()));
        }
        handler
            .validate()
            .map_err(|e| LinkError::Registration(format!("{}: {}", name, e)))?;

        tracing::debug!(command = name, version, signature = %handler.signature(), "Registered handler");

        let entries = self.handlers.entry(name.to_string()).or_default();
        entries.push(HandlerEntry { version, handler });
        // sort_by is stable: equal versions keep insertion order
        entries.sort_by(|a, b| b.version.cmp(&a.version));
        Ok(self)
    }

    /// Replace the version resolver
    pub fn set_version_resolver<F>(&mut self, resolver: F) -> &mut Self
    where
        F: Fn(&Conn<S>) -> i32 + Send + Sync + 'static,
    {
        self.resolve_version = Box::new(resolver);
        self
    }

    /// Log every inbound and outbound packet under [`TRAFFIC_TARGET`]
    pub fn set_log_traffic(&mut self, enabled: bool) -> &mut Self {
        self.log_traffic = enabled;
        self
    }

    // =========================================================================
    // Lookup
    // =========================================================================

    /// Registered command names, sorted
    pub fn commands(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Entries for a command, highest version first
    pub fn entries(&self, name: &str) -> Option<&[HandlerEntry<S>]> {
        self.handlers.get(name).map(Vec::as_slice)
    }

    pub fn resolve_version(&self, conn: &Conn<S>) -> i32 {
        (self.resolve_version)(conn)
    }

    // =========================================================================
    // Dispatch
    // =========================================================================

    /// Run one command at the given version
    pub fn process_command(
        &self,
        conn: &Conn<S>,
        version: i32,
        name: &str,
        data: Option<&RawValue>,
    ) -> Vec<CommandOut> {
        let Some(entries) = self.handlers.get(name) else {
            tracing::trace!(conn = conn.id(), command = name, "No handler registered");
            return vec![error_out(COMMAND_HANDLER_NOT_FOUND, NOT_FOUND_AT_ALL)];
        };

        let Some(entry) = entries.iter().find(|e| e.version <= version) else {
            tracing::trace!(conn = conn.id(), command = name, version, "No handler for version");
            return vec![error_out(COMMAND_HANDLER_NOT_FOUND, NOT_FOUND_VERSION)];
        };

        tracing::trace!(conn = conn.id(), command = name, version, handler_version = entry.version, "Dispatching");

        match entry.handler.invoke(conn, data) {
            Ok(commands) => commands,
            Err(e @ LinkError::Serialize(_)) => {
                tracing::error!(command = name, "Handler output cannot be encoded: {}", e);
                vec![error_out(INTERNAL_ERROR, e.to_string())]
            }
            Err(e) => vec![error_out(EXEC_ERROR, e.to_string())],
        }
    }

    /// Decode a packet, run its commands in order and build the response
    /// frame. Always returns exactly one encoded packet.
    pub fn handle_packet(&self, conn: &Conn<S>, frame: &[u8]) -> Vec<u8> {
        if self.log_traffic {
            tracing::debug!(target: TRAFFIC_TARGET, conn = conn.id(), "IN: {}", String::from_utf8_lossy(frame));
        }

        let response = match decode_packet(frame) {
            Ok(packet) => {
                let mut commands = Vec::new();
                for cmd in &packet.commands {
                    let version = self.resolve_version(conn);
                    commands.extend(self.process_command(conn, version, &cmd.name, cmd.data.as_deref()));
                }
                PacketOut::new(packet.cid, commands)
            }
            Err(e) => {
                let reason = match &e {
                    LinkError::Deserialize(inner) => inner.to_string(),
                    other => other.to_string(),
                };
                tracing::debug!(conn = conn.id(), "Cannot parse packet: {}", reason);
                PacketOut::new(0, vec![error_out(PARSE_ERROR, reason)])
            }
        };

        let bytes = encode_response(&response);
        if self.log_traffic {
            tracing::debug!(target: TRAFFIC_TARGET, conn = conn.id(), "OUT: {}", String::from_utf8_lossy(&bytes));
        }
        bytes
    }

    /// Handle one inbound frame and write the response to the connection
    pub fn process_packet(&self, conn: &Conn<S>, frame: &[u8]) {
        let response = self.handle_packet(conn, frame);
        // A failed write has already closed the connection
        if let Err(e) = conn.send(&response) {
            tracing::debug!(conn = conn.id(), "Response not delivered: {}", e);
        }
    }

    // =========================================================================
    // Introspection
    // =========================================================================

    /// Describe every registered command and every command it can emit.
    ///
    /// Server commands are described by their highest-version handler;
    /// client commands are collected from all versions. Both lists are
    /// sorted by name.
    pub fn describe_api(&self, overrides: &TypeOverrides) -> ApiDescription {
        let mut server_commands = Vec::with_capacity(self.handlers.len());
        let mut client_slots: BTreeMap<&'static str, OutputSlot> = BTreeMap::new();

        for name in self.commands() {
            let Some(entries) = self.handlers.get(name) else {
                continue;
            };
            for entry in entries {
                for slot in entry.handler.outputs() {
                    client_slots.entry(slot.name).or_insert(*slot);
                }
            }

            let Some(latest) = entries.first() else {
                continue;
            };
            let params = match latest.handler.input() {
                Some(input) => input.describe(&mut Describer::new(overrides)),
                None => Value::Null,
            };
            server_commands.push(ServerCommandDescription {
                name: name.to_string(),
                replay_commands: latest
                    .handler
                    .outputs()
                    .iter()
                    .map(|slot| slot.name.to_string())
                    .collect(),
                params,
            });
        }

        let client_commands = client_slots
            .into_values()
            .map(|slot| ClientCommandDescription {
                name: slot.name.to_string(),
                params: slot.describe(&mut Describer::new(overrides)),
            })
            .collect();

        ApiDescription {
            server_commands,
            client_commands,
        }
    }
}

impl<S> std::fmt::Debug for Router<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("handlers", &self.handlers.keys().collect::<Vec<_>>())
            .field("log_traffic", &self.log_traffic)
            .finish_non_exhaustive()
    }
}

impl<S: Session> Default for Router<S> {
    fn default() -> Self {
        Self::new()
    }
}

/// Published API: commands clients send and commands servers emit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiDescription {
    pub server_commands: Vec<ServerCommandDescription>,
    pub client_commands: Vec<ClientCommandDescription>,
}

/// A command the server accepts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerCommandDescription {
    pub name: String,

    /// Names of the commands the handler may answer with
    pub replay_commands: Vec<String>,

    /// Shape of the input payload; `null` when the handler takes none
    pub params: Value,
}

/// A command the server sends
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientCommandDescription {
    pub name: String,
    pub params: Value,
}

impl Command for ApiDescription {
    const NAME: &'static str = "apiDescription";
}

impl Describe for ApiDescription {
    fn describe(d: &mut Describer<'_>) -> Value {
        d.object::<Self>(|o| {
            o.field::<Vec<ServerCommandDescription>>("serverCommands")
                .field::<Vec<ClientCommandDescription>>("clientCommands");
        })
    }
}

impl Describe for ServerCommandDescription {
    fn describe(d: &mut Describer<'_>) -> Value {
        d.object::<Self>(|o| {
            o.field::<String>("name")
                .field::<Vec<String>>("replayCommands")
                .field::<Value>("params");
        })
    }
}

impl Describe for ClientCommandDescription {
    fn describe(d: &mut Describer<'_>) -> Value {
        d.object::<Self>(|o| {
            o.field::<String>("name").field::<Value>("params");
        })
    }
}

fn error_out(kind: &str, message: impl Into<String>) -> CommandOut {
    ErrorCommand::new(kind, message).to_command_out()
}

/// Encode a response packet; an encoding failure degrades to a single
/// `internal_error` command under the same cid
fn encode_response(packet: &PacketOut) -> Vec<u8> {
    match encode_packet(packet) {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::error!("Response packet cannot be encoded: {}", e);
            let fallback = PacketOut::new(packet.cid, vec![error_out(INTERNAL_ERROR, e.to_string())]);
            encode_packet(&fallback).unwrap_or_else(|_| {
                br#"{"cmds":[{"name":"Error","data":{"type":"internal_error","msg":"encoding failed"}}]}"#.to_vec()
            })
        }
    }
}
