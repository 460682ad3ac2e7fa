//! Handler Binder
//!
//! Turns a typed handler function into the uniform dispatch contract
//! "connection + raw payload in, ordered commands or error out".
//!
//! ## Shapes
//! - `Fn(&Conn<S>) -> HandlerResult<R>`: no input, payload ignored
//! - `Fn(&Conn<S>, I) -> HandlerResult<R>`: payload decoded into a fresh `I`
//!
//! `R` is any [`Reply`]. Shape checks beyond what the type system already
//! enforces run once, when the router registers the handler.
//!
//! ## Middleware
//! Steps run in registration order before the handler body. Each may emit
//! commands; the first step returning [`Flow::Stop`] ends the invocation
//! and the body never runs.

mod reply;

pub use reply::{OutputSlot, Reply};

use std::any::type_name;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::value::RawValue;
use serde_json::Value;

use crate::describe::{Describe, Describer};
use crate::error::{Fault, HandlerResult, LinkError, Result};
use crate::network::{Conn, Session};
use crate::protocol::{CommandOut, ErrorCommand};

/// Outcome of one middleware step
#[derive(Debug, Clone, PartialEq)]
pub enum Flow {
    /// Keep going; commands are emitted ahead of the handler's
    Continue(Vec<CommandOut>),

    /// Skip the handler; only the accumulated commands are returned
    Stop(Vec<CommandOut>),
}

impl Flow {
    /// Continue without emitting anything
    pub fn proceed() -> Self {
        Flow::Continue(Vec::new())
    }

    /// Stop with a single error command
    pub fn deny(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Flow::Stop(vec![ErrorCommand::new(kind, message).to_command_out()])
    }
}

/// Middleware step run before a handler body
pub type Middleware<S> = Arc<dyn Fn(&Conn<S>) -> Flow + Send + Sync>;

/// Static description of a handler's input
#[derive(Clone, Copy)]
pub struct InputSlot {
    pub type_name: &'static str,
    describe: fn(&mut Describer<'_>) -> Value,
}

impl InputSlot {
    pub fn describe(&self, d: &mut Describer<'_>) -> Value {
        (self.describe)(d)
    }
}

/// What a handler body produced
enum Outcome {
    Reply(Vec<CommandOut>),
    /// Terminal error command; replaces every other output
    Refused(CommandOut),
}

type BoundFn<S> = Box<dyn Fn(&Conn<S>, Option<&RawValue>) -> Result<Outcome> + Send + Sync>;

/// A handler function bound to the uniform dispatch contract
pub struct Handler<S> {
    call: BoundFn<S>,
    middleware: Vec<Middleware<S>>,
    input: Option<InputSlot>,
    outputs: Vec<OutputSlot>,
}

impl<S: Session> Handler<S> {
    /// Bind a handler that takes no input
    pub fn new<F, R>(f: F) -> Self
    where
        F: Fn(&Conn<S>) -> HandlerResult<R> + Send + Sync + 'static,
        R: Reply,
    {
        Self {
            call: Box::new(move |conn: &Conn<S>, _data: Option<&RawValue>| settle(f(conn))),
            middleware: Vec::new(),
            input: None,
            outputs: slots::<R>(),
        }
    }

    /// Bind a handler whose input is decoded from the command payload
    ///
    /// A missing payload decodes as JSON `null`, so `I = Option<T>` accepts it.
    pub fn with_input<F, I, R>(f: F) -> Self
    where
        F: Fn(&Conn<S>, I) -> HandlerResult<R> + Send + Sync + 'static,
        I: DeserializeOwned + Describe,
        R: Reply,
    {
        Self {
            call: Box::new(move |conn: &Conn<S>, data: Option<&RawValue>| {
                let text = data.map(RawValue::get).unwrap_or("null");
                let input: I = serde_json::from_str(text).map_err(LinkError::Deserialize)?;
                settle(f(conn, input))
            }),
            middleware: Vec::new(),
            input: Some(InputSlot {
                type_name: type_name::<I>(),
                describe: visit::<I>,
            }),
            outputs: slots::<R>(),
        }
    }

    /// Append a middleware step
    pub fn middleware<M>(mut self, step: M) -> Self
    where
        M: Fn(&Conn<S>) -> Flow + Send + Sync + 'static,
    {
        self.middleware.push(Arc::new(step));
        self
    }

    /// Append a shared middleware step
    pub fn shared_middleware(mut self, step: Middleware<S>) -> Self {
        self.middleware.push(step);
        self
    }

    /// Run middleware and, unless stopped, the handler body.
    ///
    /// On success returns middleware commands followed by handler commands.
    /// A handler-returned error command is returned alone, without the
    /// middleware output. Decode failures, plain handler errors and output
    /// encoding failures are returned as errors.
    pub fn invoke(&self, conn: &Conn<S>, data: Option<&RawValue>) -> Result<Vec<CommandOut>> {
        let mut out = Vec::new();
        for step in &self.middleware {
            match step(conn) {
                Flow::Continue(cmds) => out.extend(cmds),
                Flow::Stop(cmds) => {
                    out.extend(cmds);
                    return Ok(out);
                }
            }
        }

        match (self.call)(conn, data)? {
            Outcome::Reply(cmds) => {
                out.extend(cmds);
                Ok(out)
            }
            Outcome::Refused(cmd) => Ok(vec![cmd]),
        }
    }

    pub fn input(&self) -> Option<&InputSlot> {
        self.input.as_ref()
    }

    pub fn outputs(&self) -> &[OutputSlot] {
        &self.outputs
    }

    pub fn middleware_count(&self) -> usize {
        self.middleware.len()
    }

    /// `Input -> Out1 Out2 `, for diagnostics
    pub fn signature(&self) -> String {
        let mut sig = self.input.map(|i| i.type_name).unwrap_or("()").to_string();
        if !self.outputs.is_empty() {
            sig.push_str(" -> ");
            for slot in &self.outputs {
                if slot.sequence {
                    sig.push_str(&format!("[{}] ", slot.type_name));
                } else {
                    sig.push_str(slot.type_name);
                    sig.push(' ');
                }
            }
        }
        sig
    }

    /// Registration-time shape check
    pub(crate) fn validate(&self) -> Result<()> {
        for slot in &self.outputs {
            if slot.name.is_empty() {
                return Err(LinkError::Registration(format!(
                    "output type {} has an empty command name",
                    slot.type_name
                )));
            }
        }
        Ok(())
    }
}

impl<S> std::fmt::Debug for Handler<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Handler")
            .field("input", &self.input.map(|i| i.type_name))
            .field("outputs", &self.outputs)
            .field("middleware", &self.middleware.len())
            .finish()
    }
}

/// Turn a handler result into commands or a terminal error
fn settle<R: Reply>(result: HandlerResult<R>) -> Result<Outcome> {
    match result {
        Ok(reply) => {
            let mut out = Vec::new();
            reply.flatten(&mut out)?;
            Ok(Outcome::Reply(out))
        }
        Err(Fault::Command(cmd)) => Ok(Outcome::Refused(cmd.to_command_out())),
        Err(Fault::Exec(err)) => Err(LinkError::Handler(err)),
    }
}

fn slots<R: Reply>() -> Vec<OutputSlot> {
    let mut out = Vec::new();
    R::slots(&mut out);
    out
}

fn visit<T: Describe>(d: &mut Describer<'_>) -> Value {
    d.visit::<T>()
}
