//! Compiling program lines into typed commands.
//!
//! Each line is tried in order as an invocation `name(args)`, an absolute
//! time marker `[HH:]MM:SS`, then a relative `+[HH:]MM:SS` jump. Reserved
//! names `left`, `right`, `stop`, and `restart` compile to motor and
//! control commands; any other declared name compiles to a function call.
//! All argument validation happens at compile time; the execution engine
//! never range-checks.

use super::SyntaxError;
use super::args::{ArgValue, CallArgs, parse_call_args};
use super::line::ProgramLine;
use super::program::RuntimeParameters;
use std::collections::HashSet;
use std::fmt;

/// Which way a turn command spins the wheel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnDirection {
    /// `left(...)`: clockwise when facing the wheel.
    Left,
    /// `right(...)`: counter-clockwise when facing the wheel.
    Right,
}

impl fmt::Display for TurnDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TurnDirection::Left => write!(f, "left"),
            TurnDirection::Right => write!(f, "right"),
        }
    }
}

/// One compiled program command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Turn a wheel, optionally until an absolute section is reached.
    Turn {
        /// Spin direction.
        direction: TurnDirection,
        /// Symbol naming the wheel, resolved at execution time.
        target: String,
        /// Absolute section to stop at, if given.
        section: Option<u32>,
        /// Speed magnitude, an index into the power table.
        speed: u32,
    },
    /// Ramp a wheel down to rest.
    Stop {
        /// Symbol naming the wheel.
        target: String,
    },
    /// Start the program again from the top.
    Restart,
    /// Wait until a fixed offset from program start.
    TimeFromStart {
        /// Offset from program start.
        millis: u64,
    },
    /// Wait for a fixed interval from now.
    TimeJump {
        /// Interval length.
        millis: u64,
    },
    /// Enter a function body, optionally re-binding its parameter.
    FunctionCall {
        /// Callee name.
        name: String,
        /// Caller-scope symbol bound to the callee's parameter.
        argument: Option<String>,
    },
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Turn {
                direction,
                target,
                section,
                speed,
            } => match section {
                Some(section) => write!(f, "{direction}({target}, to={section}, speed={speed})"),
                None => write!(f, "{direction}({target}, speed={speed})"),
            },
            Command::Stop { target } => write!(f, "stop({target})"),
            Command::Restart => write!(f, "restart()"),
            Command::TimeFromStart { millis } => write!(f, "{}", format_marker(*millis)),
            Command::TimeJump { millis } => write!(f, "+{}", format_marker(*millis)),
            Command::FunctionCall { name, argument } => match argument {
                Some(argument) => write!(f, "{name}({argument})"),
                None => write!(f, "{name}()"),
            },
        }
    }
}

fn format_marker(millis: u64) -> String {
    let total_secs = millis / 1000;
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;
    if hours > 0 {
        format!("{hours}:{minutes:02}:{seconds:02}")
    } else {
        format!("{minutes}:{seconds:02}")
    }
}

/// Compile one program line.
///
/// On failure, pushes an error carrying the line number and returns `None`;
/// compilation of surrounding lines carries on regardless.
pub fn compile_line(
    line: &ProgramLine,
    functions: &HashSet<String>,
    symbols: &HashSet<String>,
    params: &RuntimeParameters,
    errors: &mut Vec<SyntaxError>,
) -> Option<Command> {
    if let Some((name, raw_args)) = match_invocation(&line.text) {
        return match name {
            "left" => compile_turn(TurnDirection::Left, line, raw_args, symbols, params, errors),
            "right" => compile_turn(TurnDirection::Right, line, raw_args, symbols, params, errors),
            "stop" => compile_stop(line, raw_args, symbols, errors),
            "restart" => compile_restart(line, raw_args, errors),
            called if functions.contains(called) => {
                compile_function_call(called, line, raw_args, symbols, errors)
            }
            unknown => {
                errors.push(SyntaxError::new(
                    line.line,
                    format!("Unknown function \"{unknown}\""),
                ));
                None
            }
        };
    }

    let (is_jump, body) = match line.text.strip_prefix('+') {
        Some(rest) => (true, rest),
        None => (false, line.text.as_str()),
    };
    if let Some((hours, minutes, seconds)) = match_time_parts(body) {
        if minutes >= 60 || seconds >= 60 {
            errors.push(SyntaxError::new(line.line, "Invalid time format"));
            return None;
        }
        let millis = u64::from((hours * 60 + minutes) * 60 + seconds) * 1000;
        return Some(if is_jump {
            Command::TimeJump { millis }
        } else {
            Command::TimeFromStart { millis }
        });
    }

    errors.push(SyntaxError::new(line.line, "Invalid command"));
    None
}

/// Match `name(` + rest: a name of at least two word characters starting
/// with a letter, followed by an opening parenthesis.
fn match_invocation(text: &str) -> Option<(&str, &str)> {
    let open = text.find('(')?;
    let name = &text[..open];
    let mut chars = name.chars();
    let first = chars.next()?;
    if !first.is_ascii_alphabetic() {
        return None;
    }
    let rest = chars.as_str();
    if rest.is_empty() || !rest.chars().all(|ch| ch.is_ascii_alphanumeric() || ch == '_') {
        return None;
    }
    Some((name, &text[open..]))
}

/// Match the `[HH:]MM:SS` shape: hours and minutes one or two digits,
/// seconds exactly two. Range checking happens later.
fn match_time_parts(text: &str) -> Option<(u32, u32, u32)> {
    let parts: Vec<&str> = text.split(':').collect();
    let (hours, minutes, seconds) = match parts.as_slice() {
        [minutes, seconds] => ("0", *minutes, *seconds),
        [hours, minutes, seconds] => (*hours, *minutes, *seconds),
        _ => return None,
    };

    let short_digits = |part: &str| {
        (1..=2).contains(&part.len()) && part.bytes().all(|digit| digit.is_ascii_digit())
    };
    if !short_digits(hours) || !short_digits(minutes) {
        return None;
    }
    if seconds.len() != 2 || !seconds.bytes().all(|digit| digit.is_ascii_digit()) {
        return None;
    }
    Some((
        hours.parse().ok()?,
        minutes.parse().ok()?,
        seconds.parse().ok()?,
    ))
}

fn scan_args(line: &ProgramLine, raw: &str, errors: &mut Vec<SyntaxError>) -> Option<CallArgs> {
    match parse_call_args(raw) {
        Ok(args) => Some(args),
        Err(message) => {
            errors.push(SyntaxError::new(line.line, message));
            None
        }
    }
}

/// The single positional argument, which must name a declared symbol.
fn expect_device(
    line: &ProgramLine,
    args: &CallArgs,
    symbols: &HashSet<String>,
    errors: &mut Vec<SyntaxError>,
) -> Option<String> {
    match args.positional.as_slice() {
        [ArgValue::Symbol(name)] => {
            if symbols.contains(name) {
                Some(name.clone())
            } else {
                errors.push(SyntaxError::new(
                    line.line,
                    format!("Unknown symbol \"{name}\""),
                ));
                None
            }
        }
        [] => {
            errors.push(SyntaxError::new(line.line, "Missing target device"));
            None
        }
        _ => {
            errors.push(SyntaxError::new(line.line, "Invalid target device"));
            None
        }
    }
}

/// An integer named argument in `[1, max]`.
fn expect_range(
    line: &ProgramLine,
    name: &str,
    value: &ArgValue,
    max: u32,
    errors: &mut Vec<SyntaxError>,
) -> Option<u32> {
    match value {
        ArgValue::Integer(n) if (1..=i64::from(max)).contains(n) => Some(*n as u32),
        ArgValue::Integer(_) => {
            errors.push(SyntaxError::new(
                line.line,
                format!("Argument \"{name}\" must be between 1 and {max}"),
            ));
            None
        }
        ArgValue::Symbol(_) => {
            errors.push(SyntaxError::new(
                line.line,
                format!("Argument \"{name}\" must be an integer"),
            ));
            None
        }
    }
}

fn compile_turn(
    direction: TurnDirection,
    line: &ProgramLine,
    raw_args: &str,
    symbols: &HashSet<String>,
    params: &RuntimeParameters,
    errors: &mut Vec<SyntaxError>,
) -> Option<Command> {
    let args = scan_args(line, raw_args, errors)?;
    let target = expect_device(line, &args, symbols, errors)?;

    let mut section = None;
    let mut speed = None;
    for (name, value) in &args.named {
        match name.as_str() {
            "to" => section = Some(expect_range(line, "to", value, params.num_turn_sections, errors)?),
            "speed" => speed = Some(expect_range(line, "speed", value, params.num_speeds, errors)?),
            other => {
                errors.push(SyntaxError::new(
                    line.line,
                    format!("Unknown argument \"{other}\""),
                ));
                return None;
            }
        }
    }
    let Some(speed) = speed else {
        errors.push(SyntaxError::new(
            line.line,
            "Missing required argument \"speed\"",
        ));
        return None;
    };

    Some(Command::Turn {
        direction,
        target,
        section,
        speed,
    })
}

fn compile_stop(
    line: &ProgramLine,
    raw_args: &str,
    symbols: &HashSet<String>,
    errors: &mut Vec<SyntaxError>,
) -> Option<Command> {
    let args = scan_args(line, raw_args, errors)?;
    if let Some((name, _)) = args.named.first() {
        errors.push(SyntaxError::new(
            line.line,
            format!("Unknown argument \"{name}\""),
        ));
        return None;
    }
    let target = expect_device(line, &args, symbols, errors)?;
    Some(Command::Stop { target })
}

fn compile_restart(
    line: &ProgramLine,
    raw_args: &str,
    errors: &mut Vec<SyntaxError>,
) -> Option<Command> {
    let args = scan_args(line, raw_args, errors)?;
    if !args.positional.is_empty() || !args.named.is_empty() {
        errors.push(SyntaxError::new(line.line, "restart() takes no arguments"));
        return None;
    }
    Some(Command::Restart)
}

fn compile_function_call(
    name: &str,
    line: &ProgramLine,
    raw_args: &str,
    symbols: &HashSet<String>,
    errors: &mut Vec<SyntaxError>,
) -> Option<Command> {
    let args = scan_args(line, raw_args, errors)?;
    if !args.named.is_empty() {
        errors.push(SyntaxError::new(
            line.line,
            "Named arguments are not allowed in function calls",
        ));
        return None;
    }

    let argument = match args.positional.as_slice() {
        [] => None,
        [ArgValue::Symbol(symbol)] => {
            if !symbols.contains(symbol) {
                errors.push(SyntaxError::new(
                    line.line,
                    format!("Unknown symbol \"{symbol}\""),
                ));
                return None;
            }
            Some(symbol.clone())
        }
        [ArgValue::Integer(_)] => {
            errors.push(SyntaxError::new(
                line.line,
                "Function argument must be a declared name",
            ));
            return None;
        }
        _ => {
            errors.push(SyntaxError::new(
                line.line,
                "Too many parameters in function call",
            ));
            return None;
        }
    };

    Some(Command::FunctionCall {
        name: name.to_string(),
        argument,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(text: &str) -> ProgramLine {
        ProgramLine {
            text: text.to_string(),
            indentation: 0,
            line: 7,
        }
    }

    fn compile(text: &str) -> (Option<Command>, Vec<SyntaxError>) {
        let functions = HashSet::from(["dance".to_string()]);
        let symbols = HashSet::from(["A".to_string(), "B".to_string()]);
        let params = RuntimeParameters {
            num_turn_sections: 64,
            num_speeds: 5,
        };
        let mut errors = Vec::new();
        let command = compile_line(&line(text), &functions, &symbols, &params, &mut errors);
        (command, errors)
    }

    fn compile_ok(text: &str) -> Command {
        let (command, errors) = compile(text);
        assert!(errors.is_empty(), "unexpected errors: {errors:?}");
        command.expect("expected a command")
    }

    fn compile_err(text: &str) -> Vec<SyntaxError> {
        let (command, errors) = compile(text);
        assert_eq!(command, None);
        assert!(!errors.is_empty(), "expected errors for {text:?}");
        errors
    }

    #[test]
    fn compiles_turns() {
        assert_eq!(
            compile_ok("left(A, to=12, speed=1)"),
            Command::Turn {
                direction: TurnDirection::Left,
                target: "A".to_string(),
                section: Some(12),
                speed: 1,
            }
        );
        assert_eq!(
            compile_ok("right(B, speed=5)"),
            Command::Turn {
                direction: TurnDirection::Right,
                target: "B".to_string(),
                section: None,
                speed: 5,
            }
        );
    }

    #[test]
    fn compiles_stop_and_restart() {
        assert_eq!(
            compile_ok("stop(A)"),
            Command::Stop {
                target: "A".to_string()
            }
        );
        assert_eq!(compile_ok("restart()"), Command::Restart);
    }

    #[test]
    fn compiles_time_markers() {
        assert_eq!(compile_ok("0:06"), Command::TimeFromStart { millis: 6_000 });
        assert_eq!(
            compile_ok("10:00:00"),
            Command::TimeFromStart { millis: 36_000_000 }
        );
        assert_eq!(compile_ok("1:2:03"), Command::TimeFromStart { millis: 3_723_000 });
        assert_eq!(compile_ok("+0:03"), Command::TimeJump { millis: 3_000 });
        assert_eq!(compile_ok("+1:00"), Command::TimeJump { millis: 60_000 });
    }

    #[test]
    fn compiles_function_calls() {
        assert_eq!(
            compile_ok("dance(A)"),
            Command::FunctionCall {
                name: "dance".to_string(),
                argument: Some("A".to_string()),
            }
        );
        assert_eq!(
            compile_ok("dance()"),
            Command::FunctionCall {
                name: "dance".to_string(),
                argument: None,
            }
        );
    }

    #[test]
    fn rejects_unknown_function() {
        assert_eq!(
            compile_err("wiggle(A)"),
            vec![SyntaxError::new(7, "Unknown function \"wiggle\"")]
        );
    }

    #[test]
    fn rejects_unparsable_lines() {
        assert_eq!(compile_err("left"), vec![SyntaxError::new(7, "Invalid command")]);
        assert_eq!(compile_err("123:00"), vec![SyntaxError::new(7, "Invalid command")]);
        assert_eq!(compile_err("0:0"), vec![SyntaxError::new(7, "Invalid command")]);
    }

    #[test]
    fn rejects_out_of_range_marker_fields() {
        assert_eq!(
            compile_err("0:99"),
            vec![SyntaxError::new(7, "Invalid time format")]
        );
        assert_eq!(
            compile_err("+0:0:60"),
            vec![SyntaxError::new(7, "Invalid time format")]
        );
        assert_eq!(
            compile_err("1:60:00"),
            vec![SyntaxError::new(7, "Invalid time format")]
        );
    }

    #[test]
    fn rejects_out_of_range_turn_arguments() {
        assert_eq!(
            compile_err("left(A, to=65, speed=1)"),
            vec![SyntaxError::new(7, "Argument \"to\" must be between 1 and 64")]
        );
        assert_eq!(
            compile_err("left(A, to=0, speed=1)"),
            vec![SyntaxError::new(7, "Argument \"to\" must be between 1 and 64")]
        );
        assert_eq!(
            compile_err("left(A, to=1, speed=6)"),
            vec![SyntaxError::new(
                7,
                "Argument \"speed\" must be between 1 and 5"
            )]
        );
    }

    #[test]
    fn requires_speed() {
        assert_eq!(
            compile_err("left(A, to=3)"),
            vec![SyntaxError::new(7, "Missing required argument \"speed\"")]
        );
    }

    #[test]
    fn rejects_unknown_named_argument() {
        assert_eq!(
            compile_err("left(A, until=3, speed=1)"),
            vec![SyntaxError::new(7, "Unknown argument \"until\"")]
        );
    }

    #[test]
    fn rejects_undeclared_target() {
        assert_eq!(
            compile_err("left(C, speed=1)"),
            vec![SyntaxError::new(7, "Unknown symbol \"C\"")]
        );
        assert_eq!(
            compile_err("stop(Q)"),
            vec![SyntaxError::new(7, "Unknown symbol \"Q\"")]
        );
    }

    #[test]
    fn rejects_overfull_function_calls() {
        assert_eq!(
            compile_err("dance(A, B)"),
            vec![SyntaxError::new(7, "Too many parameters in function call")]
        );
        assert_eq!(
            compile_err("restart(A)"),
            vec![SyntaxError::new(7, "restart() takes no arguments")]
        );
    }

    #[test]
    fn renders_commands_for_logs() {
        assert_eq!(
            compile_ok("left(A, to=12, speed=1)").to_string(),
            "left(A, to=12, speed=1)"
        );
        assert_eq!(compile_ok("right(B, speed=2)").to_string(), "right(B, speed=2)");
        assert_eq!(compile_ok("0:06").to_string(), "0:06");
        assert_eq!(compile_ok("+1:00").to_string(), "+1:00");
        assert_eq!(compile_ok("1:02:03").to_string(), "1:02:03");
        assert_eq!(compile_ok("dance(A)").to_string(), "dance(A)");
    }
}
