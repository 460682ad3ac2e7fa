//! In-memory transport
//!
//! A connected pair of frame channels: the server side implements the
//! transport traits, the [`MemoryPeer`] plays the client. Useful for tests
//! and for embedding a connection without a socket.

use std::time::Duration;

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use crossbeam::select;
use serde_json::Value;

use super::transport::{FrameReader, FrameWriter};
use crate::error::{LinkError, Result};

/// Server-side read half
pub struct MemoryReader {
    inbound: Receiver<Vec<u8>>,
    closed: Receiver<()>,
}

/// Server-side write half
pub struct MemoryWriter {
    outbound: Option<Sender<Vec<u8>>>,
    closed: Option<Sender<()>>,
}

/// Client side of an in-memory pair
pub struct MemoryPeer {
    to_server: Option<Sender<Vec<u8>>>,
    from_server: Receiver<Vec<u8>>,
}

/// Create a connected in-memory pair
pub fn pair() -> (MemoryReader, MemoryWriter, MemoryPeer) {
    let (to_server, inbound) = channel::unbounded();
    let (outbound, from_server) = channel::unbounded();
    let (closed_tx, closed_rx) = channel::bounded(0);

    (
        MemoryReader {
            inbound,
            closed: closed_rx,
        },
        MemoryWriter {
            outbound: Some(outbound),
            closed: Some(closed_tx),
        },
        MemoryPeer {
            to_server: Some(to_server),
            from_server,
        },
    )
}

impl FrameReader for MemoryReader {
    fn read_frame(&mut self) -> Result<Option<Vec<u8>>> {
        // The close channel never carries a message; it only disconnects
        select! {
            recv(self.inbound) -> frame => Ok(frame.ok()),
            recv(self.closed) -> _ => Ok(None),
        }
    }
}

impl FrameWriter for MemoryWriter {
    fn write_frame(&mut self, frame: &[u8]) -> Result<()> {
        let outbound = self.outbound.as_ref().ok_or(LinkError::ConnectionClosed)?;
        outbound.send(frame.to_vec()).map_err(|_| {
            LinkError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "memory peer dropped",
            ))
        })
    }

    fn shutdown(&mut self) -> Result<()> {
        self.outbound.take();
        self.closed.take();
        Ok(())
    }
}

impl MemoryPeer {
    /// Send one frame to the server
    pub fn send(&self, frame: impl Into<Vec<u8>>) -> Result<()> {
        let to_server = self.to_server.as_ref().ok_or(LinkError::ConnectionClosed)?;
        to_server
            .send(frame.into())
            .map_err(|_| LinkError::ConnectionClosed)
    }

    /// Block for the next frame; `None` once the server side is gone
    pub fn recv(&self) -> Option<Vec<u8>> {
        self.from_server.recv().ok()
    }

    /// Wait up to `timeout` for the next frame
    pub fn recv_timeout(&self, timeout: Duration) -> Option<Vec<u8>> {
        match self.from_server.recv_timeout(timeout) {
            Ok(frame) => Some(frame),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Next frame parsed as JSON
    pub fn recv_json(&self, timeout: Duration) -> Option<Value> {
        self.recv_timeout(timeout)
            .and_then(|frame| serde_json::from_slice(&frame).ok())
    }

    /// Frames already delivered and not yet received
    pub fn pending(&self) -> usize {
        self.from_server.len()
    }

    /// End the stream toward the server (the server reads end-of-stream)
    pub fn close(&mut self) {
        self.to_server.take();
    }
}
