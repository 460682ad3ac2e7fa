//! Packet definitions
//!
//! One packet is one frame: an optional correlation id and a batch of commands.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::{CommandIn, CommandOut};

/// Packet received from a client
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PacketIn {
    /// Correlation id; 0 means none and is omitted on the wire
    #[serde(default, skip_serializing_if = "is_zero")]
    pub cid: i32,

    #[serde(rename = "cmds", default, deserialize_with = "null_as_empty")]
    pub commands: Vec<CommandIn>,
}

impl PacketIn {
    pub fn new(cid: i32, commands: Vec<CommandIn>) -> Self {
        Self { cid, commands }
    }
}

/// Packet sent to a client, either as a response or as a push
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PacketOut {
    /// Mirrors the inbound cid; 0 for pushes and unparseable requests
    #[serde(default, skip_serializing_if = "is_zero")]
    pub cid: i32,

    /// Serialized as `null` when empty
    #[serde(
        rename = "cmds",
        default,
        serialize_with = "empty_as_null",
        deserialize_with = "null_as_empty"
    )]
    pub commands: Vec<CommandOut>,
}

impl PacketOut {
    pub fn new(cid: i32, commands: Vec<CommandOut>) -> Self {
        Self { cid, commands }
    }

    /// Push packet (no correlation id)
    pub fn push(commands: Vec<CommandOut>) -> Self {
        Self { cid: 0, commands }
    }
}

fn is_zero(cid: &i32) -> bool {
    *cid == 0
}

fn empty_as_null<S: Serializer>(commands: &[CommandOut], serializer: S) -> Result<S::Ok, S::Error> {
    if commands.is_empty() {
        serializer.serialize_none()
    } else {
        serializer.collect_seq(commands)
    }
}

fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}
