//! Handler outputs
//!
//! Flattens whatever a handler returns into an ordered command list.

use std::any::type_name;

use serde_json::Value;

use crate::describe::{Describe, Describer};
use crate::error::Result;
use crate::protocol::{Command, CommandOut};

/// Static description of one handler output position
#[derive(Clone, Copy)]
pub struct OutputSlot {
    /// Command name the output carries on the wire
    pub name: &'static str,

    /// Whether the position yields any number of commands
    pub sequence: bool,

    /// Rust type of the command
    pub type_name: &'static str,

    describe: fn(&mut Describer<'_>) -> Value,
}

impl OutputSlot {
    fn of<C: Command>(sequence: bool) -> Self {
        Self {
            name: C::NAME,
            sequence,
            type_name: type_name::<C>(),
            describe: visit::<C>,
        }
    }

    /// Shape of the command's data
    pub fn describe(&self, d: &mut Describer<'_>) -> Value {
        (self.describe)(d)
    }
}

impl std::fmt::Debug for OutputSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputSlot")
            .field("name", &self.name)
            .field("sequence", &self.sequence)
            .field("type_name", &self.type_name)
            .finish()
    }
}

fn visit<T: Describe>(d: &mut Describer<'_>) -> Value {
    d.visit::<T>()
}

/// Successful handler output.
///
/// Implemented for `()`, any [`Command`], `Option<C>`, `Vec<C>`,
/// `Vec<Option<C>>` and tuples of up to six replies. Tuple members are
/// emitted in declaration order, sequence elements in element order, and
/// `None` values are dropped.
pub trait Reply: 'static {
    /// Record the output positions this reply type can produce
    fn slots(out: &mut Vec<OutputSlot>);

    /// Append the reply's commands in order
    fn flatten(self, out: &mut Vec<CommandOut>) -> Result<()>;
}

impl Reply for () {
    fn slots(_: &mut Vec<OutputSlot>) {}

    fn flatten(self, _: &mut Vec<CommandOut>) -> Result<()> {
        Ok(())
    }
}

impl<C: Command> Reply for C {
    fn slots(out: &mut Vec<OutputSlot>) {
        out.push(OutputSlot::of::<C>(false));
    }

    fn flatten(self, out: &mut Vec<CommandOut>) -> Result<()> {
        out.push(CommandOut::encode(&self)?);
        Ok(())
    }
}

impl<C: Command> Reply for Option<C> {
    fn slots(out: &mut Vec<OutputSlot>) {
        out.push(OutputSlot::of::<C>(false));
    }

    fn flatten(self, out: &mut Vec<CommandOut>) -> Result<()> {
        if let Some(cmd) = self {
            out.push(CommandOut::encode(&cmd)?);
        }
        Ok(())
    }
}

impl<C: Command> Reply for Vec<C> {
    fn slots(out: &mut Vec<OutputSlot>) {
        out.push(OutputSlot::of::<C>(true));
    }

    fn flatten(self, out: &mut Vec<CommandOut>) -> Result<()> {
        out.reserve(self.len());
        for cmd in &self {
            out.push(CommandOut::encode(cmd)?);
        }
        Ok(())
    }
}

impl<C: Command> Reply for Vec<Option<C>> {
    fn slots(out: &mut Vec<OutputSlot>) {
        out.push(OutputSlot::of::<C>(true));
    }

    fn flatten(self, out: &mut Vec<CommandOut>) -> Result<()> {
        for cmd in self.iter().flatten() {
            out.push(CommandOut::encode(cmd)?);
        }
        Ok(())
    }
}

macro_rules! reply_tuple {
    ($($part:ident),+) => {
        impl<$($part: Reply),+> Reply for ($($part,)+) {
            fn slots(out: &mut Vec<OutputSlot>) {
                $($part::slots(out);)+
            }

            #[allow(non_snake_case)]
            fn flatten(self, out: &mut Vec<CommandOut>) -> Result<()> {
                let ($($part,)+) = self;
                $($part.flatten(out)?;)+
                Ok(())
            }
        }
    };
}

reply_tuple!(A);
reply_tuple!(A, B);
reply_tuple!(A, B, C);
reply_tuple!(A, B, C, D);
reply_tuple!(A, B, C, D, E);
reply_tuple!(A, B, C, D, E, F);
