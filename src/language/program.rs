//! Whole-program compilation.
//!
//! Groups the source into blocks, checks the one-root-block rule, then
//! compiles the root timeline and every function body. Function names are
//! collected up front so the timeline can call functions defined below it.
//! The outcome always carries the full error list; a program is only
//! handed back when that list is empty.

use super::SyntaxError;
use super::block::{Block, parse_blocks};
use super::command::{Command, compile_line};
use super::line::ProgramLine;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Validation ranges supplied by the runtime environment.
///
/// Derived from the decoder's section count and the ramp controller's
/// power table, so a program can only name positions and speeds the
/// hardware can reach.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuntimeParameters {
    /// Upper bound for `to=`: the number of wheel sections.
    pub num_turn_sections: u32,
    /// Upper bound for `speed=`: the number of power table entries.
    pub num_speeds: u32,
}

/// One compiled function body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Function {
    /// The single formal parameter, if declared.
    pub parameter: Option<String>,
    /// Compiled body commands, shared with every scope that enters them.
    pub commands: Arc<[Command]>,
}

/// A compiled program: the root timeline plus its functions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Program {
    /// Root timeline commands, in source order.
    pub commands: Arc<[Command]>,
    /// Function bodies by name.
    pub functions: HashMap<String, Function>,
}

/// What compiling a source text produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileOutcome {
    /// The program, present only when no errors were collected.
    pub program: Option<Program>,
    /// Every problem found, in discovery order.
    pub errors: Vec<SyntaxError>,
}

impl CompileOutcome {
    /// The program, or the error list that prevented one.
    pub fn into_program(self) -> Result<Program, Vec<SyntaxError>> {
        self.program.ok_or(self.errors)
    }
}

/// Compile source text against the declared device symbols.
///
/// `device_symbols` are the names a program may move: device ids at the
/// root, extended by the formal parameter inside a function body.
pub fn compile_program(
    source: &str,
    device_symbols: &[String],
    params: &RuntimeParameters,
) -> CompileOutcome {
    let mut errors = Vec::new();
    let blocks = parse_blocks(source, &mut errors);
    if !errors.is_empty() {
        return CompileOutcome {
            program: None,
            errors,
        };
    }

    let root_blocks: Vec<&Vec<ProgramLine>> = blocks
        .iter()
        .filter_map(|block| match block {
            Block::Root(lines) => Some(lines),
            Block::Function { .. } => None,
        })
        .collect();
    let root_lines = match root_blocks.as_slice() {
        [] => {
            errors.push(SyntaxError::new(None, "Missing root-level commands"));
            return CompileOutcome {
                program: None,
                errors,
            };
        }
        [root] => *root,
        _ => {
            errors.push(SyntaxError::new(
                None,
                "Multiple root-level blocks of commands are not allowed",
            ));
            return CompileOutcome {
                program: None,
                errors,
            };
        }
    };

    let mut function_names = HashSet::new();
    for block in &blocks {
        if let Block::Function { name, line, .. } = block {
            if !function_names.insert(name.clone()) {
                errors.push(SyntaxError::new(
                    *line,
                    format!("Duplicate function name \"{name}\""),
                ));
            }
        }
    }

    let symbols: HashSet<String> = device_symbols.iter().cloned().collect();
    let commands = compile_lines(root_lines, &function_names, &symbols, params, &mut errors);

    let mut functions = HashMap::new();
    for block in &blocks {
        let Block::Function {
            name,
            parameter,
            lines,
            ..
        } = block
        else {
            continue;
        };
        if functions.contains_key(name) {
            // Duplicate already reported; the first definition stands.
            continue;
        }
        let mut body_symbols = symbols.clone();
        if let Some(parameter) = parameter {
            body_symbols.insert(parameter.clone());
        }
        let commands = compile_lines(lines, &function_names, &body_symbols, params, &mut errors);
        functions.insert(
            name.clone(),
            Function {
                parameter: parameter.clone(),
                commands,
            },
        );
    }

    let program = errors.is_empty().then(|| Program {
        commands,
        functions,
    });
    CompileOutcome { program, errors }
}

fn compile_lines(
    lines: &[ProgramLine],
    functions: &HashSet<String>,
    symbols: &HashSet<String>,
    params: &RuntimeParameters,
    errors: &mut Vec<SyntaxError>,
) -> Arc<[Command]> {
    lines
        .iter()
        .filter_map(|line| compile_line(line, functions, symbols, params, errors))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::language::TurnDirection;

    const PARAMS: RuntimeParameters = RuntimeParameters {
        num_turn_sections: 64,
        num_speeds: 5,
    };

    fn devices() -> Vec<String> {
        vec!["A".to_string(), "B".to_string()]
    }

    fn compile(source: &str) -> CompileOutcome {
        compile_program(source, &devices(), &PARAMS)
    }

    #[test]
    fn compiles_program_with_functions() {
        let source = "\
def main():
    right(A, to=12, speed=1)

    0:06
    left(A, to=6, speed=4)
    left(B, to=6, speed=4)

def test(X):
    left(X, to=1, speed=2)

0:01
main()
test(A)
";
        let outcome = compile(source);
        assert!(outcome.errors.is_empty(), "{:?}", outcome.errors);
        let program = outcome.program.unwrap();

        assert_eq!(
            program.commands.as_ref(),
            &[
                Command::TimeFromStart { millis: 1_000 },
                Command::FunctionCall {
                    name: "main".to_string(),
                    argument: None,
                },
                Command::FunctionCall {
                    name: "test".to_string(),
                    argument: Some("A".to_string()),
                },
            ]
        );

        let main = &program.functions["main"];
        assert_eq!(main.parameter, None);
        assert_eq!(main.commands.len(), 4);

        let test = &program.functions["test"];
        assert_eq!(test.parameter.as_deref(), Some("X"));
        assert_eq!(
            test.commands.as_ref(),
            &[Command::Turn {
                direction: TurnDirection::Left,
                target: "X".to_string(),
                section: Some(1),
                speed: 2,
            }]
        );
    }

    #[test]
    fn preserves_command_order_without_functions() {
        let source = "\
0:01
left(A, to=10, speed=2)
+0:03
right(B, speed=1)
stop(A)
";
        let program = compile(source).into_program().unwrap();
        assert!(program.functions.is_empty());
        assert_eq!(
            program.commands.as_ref(),
            &[
                Command::TimeFromStart { millis: 1_000 },
                Command::Turn {
                    direction: TurnDirection::Left,
                    target: "A".to_string(),
                    section: Some(10),
                    speed: 2,
                },
                Command::TimeJump { millis: 3_000 },
                Command::Turn {
                    direction: TurnDirection::Right,
                    target: "B".to_string(),
                    section: None,
                    speed: 1,
                },
                Command::Stop {
                    target: "A".to_string()
                },
            ]
        );
    }

    #[test]
    fn requires_a_root_block() {
        let source = "def main():\n    stop(A)\n";
        let outcome = compile(source);
        assert_eq!(
            outcome.errors,
            vec![SyntaxError::new(None, "Missing root-level commands")]
        );
        assert!(outcome.program.is_none());
    }

    #[test]
    fn rejects_split_root_blocks() {
        let source = "\
0:01
stop(A)

def pause(X):
    stop(X)

0:02
stop(B)
";
        let outcome = compile(source);
        assert_eq!(
            outcome.errors,
            vec![SyntaxError::new(
                None,
                "Multiple root-level blocks of commands are not allowed"
            )]
        );
    }

    #[test]
    fn rejects_duplicate_function_names() {
        let source = "\
def spin(X):
    left(X, to=1, speed=1)

def spin(Y):
    right(Y, to=2, speed=1)

0:01
spin(A)
";
        let outcome = compile(source);
        assert_eq!(
            outcome.errors,
            vec![SyntaxError::new(4, "Duplicate function name \"spin\"")]
        );
        assert!(outcome.program.is_none());
    }

    #[test]
    fn parameter_is_visible_only_inside_its_function() {
        let source = "\
def spin(X):
    left(X, to=1, speed=1)

0:01
spin(A)
left(X, to=1, speed=1)
";
        let outcome = compile(source);
        assert_eq!(
            outcome.errors,
            vec![SyntaxError::new(6, "Unknown symbol \"X\"")]
        );
    }

    #[test]
    fn collects_errors_across_lines_and_blocks() {
        let source = "\
def spin(X):
    left(X, to=99, speed=1)

0:01
wiggle(A)
left(A, speed=9)
";
        let outcome = compile(source);
        assert_eq!(
            outcome.errors,
            vec![
                SyntaxError::new(5, "Unknown function \"wiggle\""),
                SyntaxError::new(6, "Argument \"speed\" must be between 1 and 5"),
                SyntaxError::new(2, "Argument \"to\" must be between 1 and 64"),
            ]
        );
        assert!(outcome.into_program().is_err());
    }

    #[test]
    fn into_program_hands_back_errors() {
        let ok = compile("0:01\nstop(A)\n");
        assert!(ok.into_program().is_ok());

        let bad = compile("nonsense\n");
        assert_eq!(
            bad.into_program().unwrap_err(),
            vec![SyntaxError::new(1, "Invalid command")]
        );
    }
}
