//! Shared fixtures for the integration tests

#![allow(dead_code)]

use std::time::Duration;

use cmdlink::network::memory::{self, MemoryPeer, MemoryReader};
use cmdlink::{Command, Conn, Connection, Describe, Describer, Router, Session};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const WAIT: Duration = Duration::from_secs(2);

// =============================================================================
// Commands
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pong {
    pub msg: String,
}

impl Pong {
    pub fn new(msg: &str) -> Self {
        Self {
            msg: msg.to_string(),
        }
    }
}

impl Command for Pong {
    const NAME: &'static str = "pong";
}

impl Describe for Pong {
    fn describe(d: &mut Describer<'_>) -> Value {
        d.object::<Self>(|o| {
            o.field::<String>("msg");
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tick {
    pub n: u32,
}

impl Command for Tick {
    const NAME: &'static str = "tick";
}

impl Describe for Tick {
    fn describe(d: &mut Describer<'_>) -> Value {
        d.object::<Self>(|o| {
            o.field::<u32>("n");
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Echo {
    pub ping: String,
}

impl Describe for Echo {
    fn describe(d: &mut Describer<'_>) -> Value {
        d.object::<Self>(|o| {
            o.field::<String>("ping");
        })
    }
}

// =============================================================================
// Connections
// =============================================================================

/// Connection over an in-memory pair, without a read loop
pub fn memory_conn<S: Session>(session: S) -> (Conn<S>, MemoryReader, MemoryPeer) {
    let (reader, writer, peer) = memory::pair();
    let conn = Connection::new(session, writer, "memory");
    (conn, reader, peer)
}

/// Run `frame` through the router and parse the response
pub fn dispatch<S: Session>(router: &Router<S>, conn: &Conn<S>, frame: &str) -> Value {
    let bytes = router.handle_packet(conn, frame.as_bytes());
    serde_json::from_slice(&bytes).unwrap()
}

pub fn json(text: &str) -> Value {
    serde_json::from_str(text).unwrap()
}
