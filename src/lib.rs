//! # cmdlink
//!
//! A bidirectional command/response framework over duplex frame streams:
//! - Named commands batched into packets with correlation ids
//! - Typed handlers bound once, dispatched by name and protocol version
//! - Per-handler middleware chains
//! - Server-initiated pushes on the same connection
//! - Self-describing API (input and output shapes as JSON)
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 Server / Transport                           │
//! │        (TCP frames, in-memory pair, one thread each)         │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │ frames
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                     Connection                               │
//! │       (read loop, serialized writes, idempotent close)       │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │ packets
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                      Router                                  │
//! │        (name + version lookup, error commands)               │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//!          ┌────────────┴────────────┐
//!          │                         │
//!          ▼                         ▼
//!   ┌─────────────┐          ┌─────────────┐
//!   │   Handler   │          │  Describer  │
//!   │ (middleware)│          │  (schemas)  │
//!   └─────────────┘          └─────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod protocol;
pub mod describe;
pub mod handler;
pub mod router;
pub mod network;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{Fault, HandlerResult, LinkError, Result};
pub use config::ServerConfig;
pub use protocol::{Command, CommandIn, CommandOut, ErrorCommand, PacketIn, PacketOut};
pub use describe::{Describe, Describer, TypeOverrides};
pub use handler::{Flow, Handler, Reply};
pub use router::{ApiDescription, Router};
pub use network::{Client, Conn, Connection, Server, Session};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of cmdlink
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
