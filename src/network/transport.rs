//! Transport seams
//!
//! A connection reads whole frames on its own thread and writes whole
//! frames under its write lock; the two halves never share state.

use crate::error::Result;

/// Separately owned closer for a transport.
///
/// Runs without the connection's write lock, so it can interrupt a
/// `write_frame` that is blocked on the peer.
pub type ShutdownHandle = Box<dyn FnOnce() -> Result<()> + Send>;

/// Read half of a duplex frame stream
pub trait FrameReader: Send {
    /// Block for the next frame; `None` on clean end-of-stream
    fn read_frame(&mut self) -> Result<Option<Vec<u8>>>;
}

/// Write half of a duplex frame stream
pub trait FrameWriter: Send {
    /// Write one complete frame
    fn write_frame(&mut self, frame: &[u8]) -> Result<()>;

    /// Release the transport; must unblock a pending `read_frame` on the
    /// paired reader
    fn shutdown(&mut self) -> Result<()>;

    /// Closer taken once when the connection is created. Writers whose
    /// `write_frame` can block on the peer must return one.
    fn shutdown_handle(&self) -> Option<ShutdownHandle> {
        None
    }
}

impl<R: FrameReader + ?Sized> FrameReader for Box<R> {
    fn read_frame(&mut self) -> Result<Option<Vec<u8>>> {
        (**self).read_frame()
    }
}

impl<W: FrameWriter + ?Sized> FrameWriter for Box<W> {
    fn write_frame(&mut self, frame: &[u8]) -> Result<()> {
        (**self).write_frame(frame)
    }

    fn shutdown(&mut self) -> Result<()> {
        (**self).shutdown()
    }

    fn shutdown_handle(&self) -> Option<ShutdownHandle> {
        (**self).shutdown_handle()
    }
}
