//! Physical line scanning.
//!
//! The first compilation stage: split source text into lines, measure
//! indentation in units of [`INDENT_UNIT`] spaces, and classify comments.
//! Blank lines disappear here; every surviving line keeps its one-based
//! source line number so later stages can point errors at it.

use super::SyntaxError;

/// Number of leading spaces per indentation level.
pub const INDENT_UNIT: usize = 4;

/// A non-blank source line carrying program text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramLine {
    /// Line text with surrounding whitespace removed.
    pub text: String,
    /// Indentation depth in units of [`INDENT_UNIT`].
    pub indentation: u32,
    /// One-based source line number.
    pub line: u32,
}

/// A scanned line: either program text or a `#` comment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceLine {
    /// A line of program text.
    Command(ProgramLine),
    /// A comment line, kept only for line accounting.
    Comment(ProgramLine),
}

impl SourceLine {
    /// The line when it carries program text.
    pub fn as_command(&self) -> Option<&ProgramLine> {
        match self {
            SourceLine::Command(line) => Some(line),
            SourceLine::Comment(_) => None,
        }
    }
}

/// Scan source text into classified lines.
///
/// Indentation counts leading spaces only; a count that is not a multiple
/// of [`INDENT_UNIT`] is recorded as a syntax error and the line keeps
/// depth zero. Comment classification happens after the indentation check,
/// so a misindented comment is still an error.
pub fn parse_lines(source: &str, errors: &mut Vec<SyntaxError>) -> Vec<SourceLine> {
    let mut lines = Vec::new();
    for (index, raw) in source.split('\n').enumerate() {
        let line_num = index as u32 + 1;
        let raw = raw.trim_end();
        if raw.is_empty() {
            continue;
        }

        let leading_spaces = raw.chars().take_while(|ch| *ch == ' ').count();
        let mut indentation = 0;
        if leading_spaces > 0 {
            if leading_spaces % INDENT_UNIT != 0 {
                errors.push(SyntaxError::new(
                    line_num,
                    "Indentation must be multiple of 4 characters",
                ));
            } else {
                indentation = (leading_spaces / INDENT_UNIT) as u32;
            }
        }

        let text = raw.trim_start();
        let line = ProgramLine {
            text: text.to_string(),
            indentation,
            line: line_num,
        };
        if text.starts_with('#') {
            lines.push(SourceLine::Comment(line));
        } else {
            lines.push(SourceLine::Command(line));
        }
    }
    lines
}
