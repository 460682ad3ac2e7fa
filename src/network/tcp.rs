//! TCP transport
//!
//! Length-prefixed frames over a `TcpStream`, split into buffered halves.

use std::io::{BufReader, BufWriter, Write};
use std::net::{Shutdown, TcpStream};
use std::time::Duration;

use super::transport::{FrameReader, FrameWriter, ShutdownHandle};
use crate::config::ServerConfig;
use crate::error::Result;
use crate::protocol::{read_frame, write_frame};

/// Read half of a framed TCP stream
pub struct TcpFrameReader {
    reader: BufReader<TcpStream>,
    max_frame_size: usize,
}

/// Write half of a framed TCP stream
pub struct TcpFrameWriter {
    writer: BufWriter<TcpStream>,
    max_frame_size: usize,
}

/// Split a stream into framed halves
pub fn split(stream: TcpStream, max_frame_size: usize) -> Result<(TcpFrameReader, TcpFrameWriter)> {
    // Clone stream for separate read/write handles
    let read_stream = stream.try_clone()?;
    let write_stream = stream;

    Ok((
        TcpFrameReader {
            reader: BufReader::new(read_stream),
            max_frame_size,
        },
        TcpFrameWriter {
            writer: BufWriter::new(write_stream),
            max_frame_size,
        },
    ))
}

/// Apply socket options from the server config
pub fn configure(stream: &TcpStream, config: &ServerConfig) -> Result<()> {
    stream.set_nodelay(config.nodelay)?;

    if config.read_timeout_ms > 0 {
        stream.set_read_timeout(Some(Duration::from_millis(config.read_timeout_ms)))?;
    }
    if config.write_timeout_ms > 0 {
        stream.set_write_timeout(Some(Duration::from_millis(config.write_timeout_ms)))?;
    }

    Ok(())
}

impl TcpFrameReader {
    pub fn get_ref(&self) -> &TcpStream {
        self.reader.get_ref()
    }
}

impl FrameReader for TcpFrameReader {
    fn read_frame(&mut self) -> Result<Option<Vec<u8>>> {
        read_frame(&mut self.reader, self.max_frame_size)
    }
}

impl TcpFrameWriter {
    pub fn get_ref(&self) -> &TcpStream {
        self.writer.get_ref()
    }
}

impl FrameWriter for TcpFrameWriter {
    fn write_frame(&mut self, frame: &[u8]) -> Result<()> {
        write_frame(&mut self.writer, frame, self.max_frame_size)
    }

    fn shutdown(&mut self) -> Result<()> {
        // Best effort: the peer may already be gone
        let _ = self.writer.flush();
        shutdown_both(self.writer.get_ref())
    }

    fn shutdown_handle(&self) -> Option<ShutdownHandle> {
        let stream = match self.writer.get_ref().try_clone() {
            Ok(stream) => stream,
            Err(e) => {
                tracing::warn!("Cannot clone stream for shutdown: {}", e);
                return None;
            }
        };
        Some(Box::new(move || shutdown_both(&stream)))
    }
}

fn shutdown_both(stream: &TcpStream) -> Result<()> {
    match stream.shutdown(Shutdown::Both) {
        Err(e) if e.kind() != std::io::ErrorKind::NotConnected => Err(e.into()),
        _ => Ok(()),
    }
}
