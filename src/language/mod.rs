//! The choreography language.
//!
//! Programs are indentation-structured text: one root timeline of commands,
//! plus optional `def name(P):` function blocks. Compilation is staged the
//! way the text is shaped: [`line`] scans physical lines, [`block`] groups
//! them into the root and function blocks, [`command`] compiles each line
//! into a typed [`Command`], and [`program`] assembles the whole
//! [`Program`]. Errors never abort compilation; they accumulate as
//! [`SyntaxError`] values so an author sees every problem at once.

use serde::{Deserialize, Serialize};
use std::fmt;

pub mod args;
pub mod block;
pub mod command;
pub mod line;
pub mod program;

pub use command::{Command, TurnDirection};
pub use program::{CompileOutcome, Function, Program, RuntimeParameters, compile_program};

/// A compile-time problem, tied to a source line when one is known.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyntaxError {
    /// One-based source line, `None` for whole-program problems.
    pub line: Option<u32>,
    /// Human-readable description.
    pub message: String,
}

impl SyntaxError {
    /// Create an error, optionally tied to a line.
    pub fn new(line: impl Into<Option<u32>>, message: impl Into<String>) -> Self {
        Self {
            line: line.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for SyntaxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.line {
            Some(line) => write!(f, "line {line}: {}", self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

impl std::error::Error for SyntaxError {}
