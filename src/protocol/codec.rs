//! Protocol codec
//!
//! Encoding and decoding functions for the wire protocol.
//!
//! ## Wire Format
//!
//! ### Frame
//! ```text
//! ┌──────────┬─────────────────────────────┐
//! │ Len (4)  │         Payload             │
//! └──────────┴─────────────────────────────┘
//! ```
//!
//! `Len` is big-endian. The payload is one JSON packet.

use std::io::{ErrorKind, Read, Write};

use bytes::{BufMut, Bytes, BytesMut};

use super::{PacketIn, PacketOut};
use crate::error::{LinkError, Result};

/// Header size: 4 bytes length
pub const HEADER_SIZE: usize = 4;

/// Default maximum frame payload (16 MB)
pub const DEFAULT_MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

// =============================================================================
// Packet Encoding/Decoding
// =============================================================================

/// Decode an inbound packet
pub fn decode_packet(bytes: &[u8]) -> Result<PacketIn> {
    serde_json::from_slice(bytes).map_err(LinkError::Deserialize)
}

/// Encode an outbound packet
pub fn encode_packet(packet: &PacketOut) -> Result<Vec<u8>> {
    serde_json::to_vec(packet).map_err(LinkError::Serialize)
}

/// Encode an inbound packet (client side)
pub fn encode_request(packet: &PacketIn) -> Result<Vec<u8>> {
    serde_json::to_vec(packet).map_err(LinkError::Serialize)
}

/// Decode an outbound packet (client side)
pub fn decode_response(bytes: &[u8]) -> Result<PacketOut> {
    serde_json::from_slice(bytes).map_err(LinkError::Deserialize)
}

// =============================================================================
// Frame Encoding
// =============================================================================

/// Encode a payload into a single frame
///
/// Format: payload_len (4) + payload
pub fn encode_frame(payload: &[u8], max_frame_size: usize) -> Result<Bytes> {
    let too_large = LinkError::FrameTooLarge {
        size: payload.len(),
        max: max_frame_size,
    };
    if payload.len() > max_frame_size {
        return Err(too_large);
    }
    let payload_len = u32::try_from(payload.len()).map_err(|_| too_large)?;

    let mut frame = BytesMut::with_capacity(HEADER_SIZE + payload.len());
    frame.put_u32(payload_len);
    frame.put_slice(payload);

    Ok(frame.freeze())
}

// =============================================================================
// Stream-based I/O helpers
// =============================================================================

/// Read a complete frame from a stream
///
/// Blocks until a complete frame is received. Returns `None` when the stream
/// ends cleanly on a frame boundary; ending mid-frame is an error.
pub fn read_frame<R: Read>(reader: &mut R, max_frame_size: usize) -> Result<Option<Vec<u8>>> {
    let mut header = [0u8; HEADER_SIZE];
    if !fill_header(reader, &mut header)? {
        return Ok(None);
    }

    let payload_len = u32::from_be_bytes(header) as usize;
    if payload_len > max_frame_size {
        return Err(LinkError::FrameTooLarge {
            size: payload_len,
            max: max_frame_size,
        });
    }

    let mut payload = vec![0u8; payload_len];
    if payload_len > 0 {
        reader.read_exact(&mut payload)?;
    }

    Ok(Some(payload))
}

/// Write a frame to a stream
pub fn write_frame<W: Write>(writer: &mut W, payload: &[u8], max_frame_size: usize) -> Result<()> {
    let frame = encode_frame(payload, max_frame_size)?;
    writer.write_all(&frame)?;
    writer.flush()?;
    Ok(())
}

/// Fill the header, distinguishing a clean end-of-stream from a torn frame
fn fill_header<R: Read>(reader: &mut R, header: &mut [u8; HEADER_SIZE]) -> Result<bool> {
    let mut filled = 0;
    while filled < HEADER_SIZE {
        match reader.read(&mut header[filled..]) {
            Ok(0) if filled == 0 => return Ok(false),
            Ok(0) => {
                return Err(LinkError::Io(std::io::Error::new(
                    ErrorKind::UnexpectedEof,
                    format!("stream ended after {} header bytes", filled),
                )))
            }
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(true)
}
