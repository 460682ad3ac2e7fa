//! Connection Handler
//!
//! Owns one duplex frame stream and the session bound to it.
//!
//! ## Lifecycle
//! `Open -> Reading -> Closing -> Closed`
//!
//! - The read loop is the only reader. It hands each frame to the dispatch
//!   entry point and does not read the next frame until dispatch returns,
//!   so packets are processed strictly in arrival order.
//! - Every write goes through one lock, whether it is a response from the
//!   read loop or a push from another thread.
//! - Teardown runs exactly once: session close hook, close callback, then
//!   transport release. Read errors, write errors and explicit `close()`
//!   all lead here.
//! - Release fires the transport's shutdown handle before taking the write
//!   lock, so a write blocked on the peer fails instead of stalling close.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use super::transport::{FrameReader, FrameWriter, ShutdownHandle};
use crate::error::{LinkError, Result};
use crate::protocol::{encode_packet, Command, CommandOut, PacketOut};

/// Shared handle to a connection; what handlers receive and may keep
pub type Conn<S> = Arc<Connection<S>>;

/// Per-connection state owned by the embedding application.
///
/// The framework never locks the session. Handlers on one connection never
/// run concurrently, but pushes from other threads may touch it at any
/// time, so shared fields need their own synchronization.
pub trait Session: Send + Sync + 'static {
    /// Called once when the connection closes
    fn on_close(&self) {}
}

impl Session for () {}

type CloseCallback<S> = Box<dyn FnOnce(&Connection<S>) + Send>;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Handles a single client connection
pub struct Connection<S> {
    /// Process-unique id
    id: u64,

    /// Peer label for logging
    peer: String,

    session: S,

    /// Write half; `None` once closed
    writer: Mutex<Option<Box<dyn FrameWriter>>>,

    /// Transport closer held outside the write lock
    closer: Mutex<Option<ShutdownHandle>>,

    closed: AtomicBool,

    on_close: Mutex<Option<CloseCallback<S>>>,
}

impl<S: Session> Connection<S> {
    /// Create a connection around a session and the write half of a transport
    pub fn new<W>(session: S, writer: W, peer: impl Into<String>) -> Conn<S>
    where
        W: FrameWriter + 'static,
    {
        let closer = writer.shutdown_handle();
        Arc::new(Self {
            id: NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed),
            peer: peer.into(),
            session,
            writer: Mutex::new(Some(Box::new(writer))),
            closer: Mutex::new(closer),
            closed: AtomicBool::new(false),
            on_close: Mutex::new(None),
        })
    }

    /// Set the callback run during teardown, after the session hook
    pub fn on_close<F>(&self, callback: F)
    where
        F: FnOnce(&Connection<S>) + Send + 'static,
    {
        *self.on_close.lock() = Some(Box::new(callback));
    }

    /// Read and dispatch frames until the stream ends, then close.
    ///
    /// Blocks the calling thread for the life of the connection.
    pub fn run<R, D>(self: &Arc<Self>, mut reader: R, dispatch: D)
    where
        R: FrameReader,
        D: Fn(&Conn<S>, &[u8]),
    {
        tracing::debug!(conn = self.id, peer = %self.peer, "Connection established");

        while !self.is_closed() {
            match reader.read_frame() {
                Ok(Some(frame)) => {
                    tracing::trace!(conn = self.id, bytes = frame.len(), "Frame received");
                    dispatch(self, &frame);
                }
                Ok(None) => {
                    tracing::debug!(conn = self.id, peer = %self.peer, "Client disconnected");
                    break;
                }
                Err(e) if e.is_disconnect() || self.is_closed() => {
                    tracing::debug!(conn = self.id, peer = %self.peer, "Connection dropped: {}", e);
                    break;
                }
                Err(e) => {
                    tracing::warn!(conn = self.id, peer = %self.peer, "Error reading frame: {}", e);
                    break;
                }
            }
        }

        self.close();
    }

    /// Write one raw frame.
    ///
    /// Fails with [`LinkError::ConnectionClosed`] after close. A write error
    /// closes the connection.
    pub fn send(&self, frame: &[u8]) -> Result<()> {
        if self.is_closed() {
            return Err(LinkError::ConnectionClosed);
        }

        let result = {
            let mut writer = self.writer.lock();
            match writer.as_mut() {
                Some(w) => w.write_frame(frame),
                None => return Err(LinkError::ConnectionClosed),
            }
        };

        if let Err(e) = &result {
            if e.is_disconnect() {
                tracing::debug!(conn = self.id, peer = %self.peer, "Write to departed client: {}", e);
            } else {
                tracing::warn!(conn = self.id, peer = %self.peer, "Error writing frame: {}", e);
            }
            self.close();
        }
        result
    }

    /// Encode and write a packet
    pub fn send_packet(&self, packet: &PacketOut) -> Result<()> {
        let frame = encode_packet(packet)?;
        self.send(&frame)
    }

    /// Push one command as an unsolicited packet
    pub fn push<C: Command>(&self, cmd: &C) -> Result<()> {
        self.push_all(vec![CommandOut::encode(cmd)?])
    }

    /// Push several commands as one unsolicited packet
    pub fn push_all(&self, commands: Vec<CommandOut>) -> Result<()> {
        self.send_packet(&PacketOut::push(commands))
    }

    /// Tear the connection down; later calls are no-ops
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        tracing::debug!(conn = self.id, peer = %self.peer, "Closing connection");

        self.session.on_close();

        let callback = self.on_close.lock().take();
        if let Some(callback) = callback {
            callback(self);
        }

        let closer = self.closer.lock().take();
        if let Some(closer) = closer {
            if let Err(e) = closer() {
                tracing::debug!(conn = self.id, "Transport shutdown failed: {}", e);
            }
        }

        let writer = self.writer.lock().take();
        if let Some(mut writer) = writer {
            if let Err(e) = writer.shutdown() {
                tracing::debug!(conn = self.id, "Transport shutdown failed: {}", e);
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn session(&self) -> &S {
        &self.session
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Get the peer label
    pub fn peer(&self) -> &str {
        &self.peer
    }
}

impl<S> std::fmt::Debug for Connection<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("peer", &self.peer)
            .field("closed", &self.closed.load(Ordering::Relaxed))
            .finish()
    }
}
