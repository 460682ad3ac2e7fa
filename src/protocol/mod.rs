//! Protocol Module
//!
//! Defines the wire protocol for client-server communication.
//!
//! ## Framing
//! ```text
//! ┌──────────┬─────────────────────────────────────────┐
//! │ Len (4)  │        JSON packet (Len bytes)          │
//! └──────────┴─────────────────────────────────────────┘
//! ```
//!
//! ## Packets
//! ```text
//! Inbound:  { "cid": <int32, omitted when 0>, "cmds": [ { "name": <string>, "data": <any> }, ... ] }
//! Outbound: { "cid": <int32, omitted when 0>, "cmds": [ { "name": <string>, "data": <any> }, ... ] | null }
//! ```
//!
//! ### Error Command
//! ```text
//! { "name": "Error", "data": { "type": <kind>, "msg": <message> } }
//! ```

mod codec;
mod command;
mod error_command;
mod packet;

pub use codec::{
    decode_packet, decode_response, encode_frame, encode_packet, encode_request, read_frame,
    write_frame, DEFAULT_MAX_FRAME_SIZE, HEADER_SIZE,
};
pub use command::{Command, CommandIn, CommandOut};
pub use error_command::{
    ErrorCommand, COMMAND_HANDLER_NOT_FOUND, EXEC_ERROR, INTERNAL_ERROR, NOT_FOUND_AT_ALL,
    NOT_FOUND_VERSION, PARSE_ERROR,
};
pub use packet::{PacketIn, PacketOut};
