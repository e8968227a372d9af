//! Grouping scanned lines into the root timeline and function blocks.
//!
//! A single pass walks the program lines tracking the expected depth and
//! the currently open `def` block. A header line opens a function (flushing
//! any gathered root lines first); a one-level dedent closes it. Any other
//! depth mismatch is a syntax error that stops grouping; lines past a
//! broken header cannot be attributed to a block.

use super::SyntaxError;
use super::line::{ProgramLine, SourceLine, parse_lines};

/// A grouped region of the program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Block {
    /// The root timeline: commands executed from program start.
    Root(Vec<ProgramLine>),
    /// One `def name(P):` block.
    Function {
        /// Function name, unique per program.
        name: String,
        /// The single optional formal parameter.
        parameter: Option<String>,
        /// Source line of the `def` header.
        line: u32,
        /// Body lines, one indentation level below the header.
        lines: Vec<ProgramLine>,
    },
}

/// Group source text into blocks, collecting syntax errors.
///
/// Line-scanning errors abandon grouping entirely; grouping errors stop the
/// pass at the offending line but keep everything collected so far.
pub fn parse_blocks(source: &str, errors: &mut Vec<SyntaxError>) -> Vec<Block> {
    let mut line_errors = Vec::new();
    let lines = parse_lines(source, &mut line_errors);
    if !line_errors.is_empty() {
        errors.append(&mut line_errors);
        return Vec::new();
    }

    let mut blocks = Vec::new();
    let mut expected_indentation = 0u32;
    let mut open_function: Option<(String, Option<String>, u32)> = None;
    let mut current_block: Vec<ProgramLine> = Vec::new();

    for line in lines.iter().filter_map(SourceLine::as_command) {
        if line.indentation > expected_indentation {
            errors.push(SyntaxError::new(line.line, "Unexpected indentation"));
            break;
        } else if open_function.is_some() && line.indentation + 1 == expected_indentation {
            if current_block.is_empty() {
                errors.push(SyntaxError::new(line.line, "Function without a body"));
                break;
            }
            if let Some((name, parameter, header_line)) = open_function.take() {
                blocks.push(Block::Function {
                    name,
                    parameter,
                    line: header_line,
                    lines: std::mem::take(&mut current_block),
                });
            }
            expected_indentation -= 1;
        } else if line.indentation != expected_indentation {
            errors.push(SyntaxError::new(line.line, "Unexpected indentation"));
            break;
        }

        let tokens: Vec<&str> = line.text.split(' ').filter(|t| !t.is_empty()).collect();
        if tokens.first() == Some(&"def") {
            if tokens.len() != 2 {
                errors.push(SyntaxError::new(line.line, "Too many tokens in line"));
                break;
            }
            let header = tokens[1];
            let Some(header) = header.strip_suffix(':') else {
                errors.push(SyntaxError::new(
                    line.line,
                    "Function definition must end with colon (:)",
                ));
                break;
            };
            let Some((name, parameter)) = match_function_definition(header) else {
                errors.push(SyntaxError::new(line.line, "Invalid function definition"));
                break;
            };

            if !current_block.is_empty() {
                blocks.push(Block::Root(std::mem::take(&mut current_block)));
            }
            open_function = Some((name, parameter, line.line));
            expected_indentation += 1;
        } else {
            current_block.push(line.clone());
        }
    }

    if !current_block.is_empty() {
        match open_function {
            Some((name, parameter, header_line)) => blocks.push(Block::Function {
                name,
                parameter,
                line: header_line,
                lines: current_block,
            }),
            None => blocks.push(Block::Root(current_block)),
        }
    }
    blocks
}

/// Match `name()` or `name(P)`: a name of at least two word characters
/// starting with a letter, with an optional single uppercase parameter.
fn match_function_definition(header: &str) -> Option<(String, Option<String>)> {
    let open = header.find('(')?;
    let name = &header[..open];
    let mut chars = name.chars();
    let first = chars.next()?;
    if !first.is_ascii_alphabetic() {
        return None;
    }
    let rest = chars.as_str();
    if rest.is_empty() || !rest.chars().all(|ch| ch.is_ascii_alphanumeric() || ch == '_') {
        return None;
    }

    let inner = header[open..].strip_prefix('(')?.strip_suffix(')')?;
    let parameter = match inner.chars().collect::<Vec<_>>().as_slice() {
        [] => None,
        [param] if param.is_ascii_uppercase() => Some(param.to_string()),
        _ => return None,
    };
    Some((name.to_string(), parameter))
}
