//! Command definitions
//!
//! Named units of work inside a packet.

use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use serde_json::Value;

use crate::describe::Describe;
use crate::error::{LinkError, Result};

/// A value that travels on the wire under a stable command name.
///
/// Every handler output and every pushed event is a `Command`.
///
/// ```
/// use cmdlink::{Command, Describe, Describer};
/// use serde::Serialize;
/// use serde_json::Value;
///
/// #[derive(Serialize)]
/// struct Pong {
///     msg: String,
/// }
///
/// impl Command for Pong {
///     const NAME: &'static str = "pong";
/// }
///
/// impl Describe for Pong {
///     fn describe(d: &mut Describer<'_>) -> Value {
///         d.object::<Self>(|o| {
///             o.field::<String>("msg");
///         })
///     }
/// }
/// ```
pub trait Command: Serialize + Describe {
    /// Name the command carries on the wire
    const NAME: &'static str;
}

/// Inbound command: a name and an undecoded payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandIn {
    pub name: String,

    /// Raw JSON payload, decoded by the handler that receives it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Box<RawValue>>,
}

impl CommandIn {
    /// Command without a payload
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data: None,
        }
    }

    /// Command with a serialized payload
    pub fn with_data<T: Serialize + ?Sized>(name: impl Into<String>, data: &T) -> Result<Self> {
        let raw = serde_json::value::to_raw_value(data).map_err(LinkError::Serialize)?;
        Ok(Self {
            name: name.into(),
            data: Some(raw),
        })
    }

    /// Payload text, if any
    pub fn data_str(&self) -> Option<&str> {
        self.data.as_deref().map(RawValue::get)
    }
}

impl PartialEq for CommandIn {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.data_str() == other.data_str()
    }
}

/// Outbound command: a name and an already-serialized value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandOut {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl CommandOut {
    /// Serialize a command under its declared name
    pub fn encode<C: Command>(cmd: &C) -> Result<Self> {
        let data = serde_json::to_value(cmd).map_err(LinkError::Serialize)?;
        Ok(Self {
            name: C::NAME.to_string(),
            data: Some(data),
        })
    }

    /// Build a command from a name and an arbitrary value
    pub fn new(name: impl Into<String>, data: Option<Value>) -> Self {
        Self {
            name: name.into(),
            data,
        }
    }
}
