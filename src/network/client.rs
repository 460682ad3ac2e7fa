//! Blocking client
//!
//! Talks to a server over framed TCP. Responses and pushes arrive on the
//! same stream; [`Client::call`] waits for the response whose cid matches
//! and queues anything else for [`Client::recv`].

use std::collections::VecDeque;
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use serde::Serialize;

use super::tcp::{self, TcpFrameReader, TcpFrameWriter};
use super::transport::{FrameReader, FrameWriter};
use crate::error::{LinkError, Result};
use crate::protocol::{
    decode_response, encode_request, CommandIn, PacketIn, PacketOut, DEFAULT_MAX_FRAME_SIZE,
};

/// Blocking client for a cmdlink server
pub struct Client {
    reader: TcpFrameReader,
    writer: TcpFrameWriter,
    queued: VecDeque<PacketOut>,
    next_cid: i32,
}

impl Client {
    /// Connect to a server
    pub fn connect(addr: impl ToSocketAddrs) -> Result<Self> {
        let stream = TcpStream::connect(addr)?;
        stream.set_nodelay(true)?;
        let (reader, writer) = tcp::split(stream, DEFAULT_MAX_FRAME_SIZE)?;
        Ok(Self {
            reader,
            writer,
            queued: VecDeque::new(),
            next_cid: 1,
        })
    }

    /// Set or clear the read timeout for `recv`/`call`
    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        self.reader.get_ref().set_read_timeout(timeout)?;
        Ok(())
    }

    /// Send raw frame bytes as-is
    pub fn send_raw(&mut self, frame: &[u8]) -> Result<()> {
        self.writer.write_frame(frame)
    }

    pub fn send_packet(&mut self, packet: &PacketIn) -> Result<()> {
        let frame = encode_request(packet)?;
        self.writer.write_frame(&frame)
    }

    /// Next packet from the server, response or push
    pub fn recv(&mut self) -> Result<PacketOut> {
        if let Some(packet) = self.queued.pop_front() {
            return Ok(packet);
        }
        self.read_packet()
    }

    /// Send one command and wait for its response packet
    pub fn call<T: Serialize + ?Sized>(&mut self, name: &str, data: Option<&T>) -> Result<PacketOut> {
        let cid = self.next_cid;
        self.next_cid = self.next_cid.checked_add(1).unwrap_or(1);

        let command = match data {
            Some(data) => CommandIn::with_data(name, data)?,
            None => CommandIn::new(name),
        };
        self.send_packet(&PacketIn::new(cid, vec![command]))?;

        loop {
            let packet = self.read_packet()?;
            if packet.cid == cid {
                return Ok(packet);
            }
            self.queued.push_back(packet);
        }
    }

    /// Close both directions
    pub fn close(mut self) -> Result<()> {
        self.writer.shutdown()
    }

    fn read_packet(&mut self) -> Result<PacketOut> {
        match self.reader.read_frame()? {
            Some(frame) => decode_response(&frame),
            None => Err(LinkError::ConnectionClosed),
        }
    }
}
