//! Executing compiled choreography programs.
//!
//! The engine is deliberately passive: it owns the scope stack and the
//! pending schedule, and is poked forward by a periodic driver calling
//! [`ExecutionContext::execute_if_scheduled`] with the current instant.
//! Motor effects never happen here: turn and stop intents go to the
//! [`EngineHost`], which the daemon wires to the planner and tests wire
//! to a recorder.

use crate::language::TurnDirection;
use crate::shaft::DeviceId;
use std::fmt;

pub mod executor;
pub mod scope;

pub use executor::ExecutionContext;
pub use scope::{Scope, Symbols};

/// A message surfaced by the engine while executing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeMessage {
    /// Something odd but survivable; execution continues with corrected
    /// state.
    Warning(String),
    /// An authoring bug the engine cannot run past; the program is
    /// terminated.
    Fatal(String),
}

impl RuntimeMessage {
    /// The message text.
    pub fn message(&self) -> &str {
        match self {
            RuntimeMessage::Warning(message) | RuntimeMessage::Fatal(message) => message,
        }
    }
}

impl fmt::Display for RuntimeMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuntimeMessage::Warning(message) => write!(f, "warning: {message}"),
            RuntimeMessage::Fatal(message) => write!(f, "fatal: {message}"),
        }
    }
}

/// Receives the effects of executed commands.
pub trait EngineHost {
    /// A turn intent for a resolved device.
    fn turn(
        &mut self,
        device: &DeviceId,
        direction: TurnDirection,
        section: Option<u32>,
        speed: u32,
    );

    /// A stop intent for a resolved device.
    fn stop(&mut self, device: &DeviceId);

    /// A warning or fatal error raised during execution.
    fn runtime_message(&mut self, message: RuntimeMessage);
}
