//! Network Module
//!
//! Connections, transports, server and client.
//!
//! ## Architecture
//! - Single acceptor thread (non-blocking accept, polled)
//! - One thread per connection: read frame, dispatch, write response, repeat
//! - Pushes from any thread share the connection's single write lock

mod client;
mod connection;
pub mod memory;
mod server;
pub mod tcp;
mod transport;

pub use client::Client;
pub use connection::{Conn, Connection, Session};
pub use server::Server;
pub use transport::{FrameReader, FrameWriter, ShutdownHandle};
