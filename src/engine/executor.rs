//! The execution context: scope stack, pending schedule, drain loop.

use super::scope::{Scope, Symbols};
use super::{EngineHost, RuntimeMessage};
use crate::language::{Command, Program};
use crate::shaft::DeviceId;
use chrono::{DateTime, Utc};

/// Interprets one compiled program against a logical clock.
///
/// The context never sleeps. A periodic driver calls
/// [`ExecutionContext::execute_if_scheduled`]; when the pending schedule is
/// due, commands drain until one blocks on a genuinely future instant or
/// the scope stack empties. Time markers therefore resolve at the driver's
/// period, which is the language's effective time resolution.
#[derive(Debug)]
pub struct ExecutionContext {
    program: Program,
    base_symbols: Symbols,
    scopes: Vec<Scope>,
    start_time: DateTime<Utc>,
    next_execution_secs: Option<f64>,
    terminated: bool,
}

impl ExecutionContext {
    /// Build a context over a program and the devices it may address.
    ///
    /// The context starts initialized: the first
    /// [`ExecutionContext::execute_if_scheduled`] call runs the program's
    /// opening commands.
    pub fn new(
        program: Program,
        devices: impl IntoIterator<Item = DeviceId>,
        now: DateTime<Utc>,
    ) -> Self {
        let mut context = Self {
            base_symbols: Symbols::from_devices(devices),
            program,
            scopes: Vec::new(),
            start_time: now,
            next_execution_secs: None,
            terminated: false,
        };
        context.initialize_execution(now);
        context
    }

    /// Reset to a fresh run: one scope over the root commands, `now` as the
    /// program start, and an immediately-due schedule.
    pub fn initialize_execution(&mut self, now: DateTime<Utc>) {
        self.scopes = vec![Scope::new(
            self.program.commands.clone(),
            self.base_symbols.clone(),
        )];
        self.start_time = now;
        self.next_execution_secs = Some(0.0);
        self.terminated = false;
    }

    /// True once the scope stack has emptied or a fatal error fired.
    pub fn terminated(&self) -> bool {
        self.terminated
    }

    /// The instant the current run started.
    pub fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    /// Drain pending commands when the schedule is due.
    ///
    /// Returns whether anything ran.
    pub fn execute_if_scheduled(&mut self, now: DateTime<Utc>, host: &mut dyn EngineHost) -> bool {
        if self.terminated {
            return false;
        }
        match self.next_execution_secs {
            Some(due) if self.elapsed_secs(now) >= due => {
                self.drain(now, host);
                true
            }
            _ => false,
        }
    }

    fn elapsed_secs(&self, now: DateTime<Utc>) -> f64 {
        (now - self.start_time).num_milliseconds() as f64 / 1000.0
    }

    fn drain(&mut self, now: DateTime<Utc>, host: &mut dyn EngineHost) {
        self.next_execution_secs = None;
        loop {
            let Some(command) = self.next_command() else {
                self.terminated = true;
                break;
            };
            tracing::debug!(command = %command, "executing");

            let mut blocking = self.execute(&command, now, host);
            if blocking && self.schedule_landed_in_past(now) {
                blocking = false;
                self.next_execution_secs = None;
            }
            if blocking || self.terminated {
                break;
            }
        }

        if self.next_execution_secs.is_none() && !self.terminated {
            self.fatal(
                host,
                "No more commands to execute in current cycle, no execution scheduled but program not terminated either",
            );
        }
    }

    /// The command under the innermost live scope, popping exhausted
    /// scopes as they are found. Popping cascades: several frames can
    /// retire in one fetch when nested calls end together.
    fn next_command(&mut self) -> Option<Command> {
        loop {
            match self.scopes.last() {
                None => return None,
                Some(scope) if scope.exhausted() => {
                    self.scopes.pop();
                }
                Some(scope) => return scope.current_command().cloned(),
            }
        }
    }

    /// Execute one command; returns whether it blocks the drain.
    fn execute(&mut self, command: &Command, now: DateTime<Utc>, host: &mut dyn EngineHost) -> bool {
        match command {
            Command::Turn {
                direction,
                target,
                section,
                speed,
            } => {
                let Some(device) = self.resolve(target) else {
                    self.unknown_symbol(host, target);
                    return true;
                };
                host.turn(&device, *direction, *section, *speed);
                self.advance_pc();
                false
            }
            Command::Stop { target } => {
                let Some(device) = self.resolve(target) else {
                    self.unknown_symbol(host, target);
                    return true;
                };
                host.stop(&device);
                self.advance_pc();
                false
            }
            Command::Restart => {
                self.initialize_execution(now);
                true
            }
            Command::TimeFromStart { millis } => {
                self.schedule_at(*millis, now, host);
                self.advance_pc();
                true
            }
            Command::TimeJump { millis } => {
                self.schedule_in(*millis, now, host);
                self.advance_pc();
                true
            }
            Command::FunctionCall { name, argument } => {
                self.enter_function(name, argument.as_deref(), host)
            }
        }
    }

    fn enter_function(
        &mut self,
        name: &str,
        argument: Option<&str>,
        host: &mut dyn EngineHost,
    ) -> bool {
        let Some(function) = self.program.functions.get(name).cloned() else {
            self.fatal(host, format!("Unknown function \"{name}\""));
            return true;
        };
        let caller_symbols = match self.scopes.last() {
            Some(scope) => scope.symbols().clone(),
            None => self.base_symbols.clone(),
        };
        let symbols = match (function.parameter.as_deref(), argument) {
            (Some(parameter), Some(argument)) => {
                let Some(device) = caller_symbols.resolve(argument).cloned() else {
                    self.unknown_symbol(host, argument);
                    return true;
                };
                caller_symbols.with_binding(parameter.to_string(), device)
            }
            _ => caller_symbols,
        };
        self.advance_pc();
        self.scopes.push(Scope::new(function.commands, symbols));
        false
    }

    fn resolve(&self, name: &str) -> Option<DeviceId> {
        self.scopes
            .last()
            .and_then(|scope| scope.symbols().resolve(name))
            .cloned()
    }

    fn schedule_at(&mut self, millis: u64, now: DateTime<Utc>, host: &mut dyn EngineHost) {
        let due = millis as f64 / 1000.0;
        if due < self.elapsed_secs(now) {
            host.runtime_message(RuntimeMessage::Warning(
                "Scheduling execution in the past".to_string(),
            ));
        }
        if self.next_execution_secs.is_some() {
            host.runtime_message(RuntimeMessage::Warning(
                "Overwriting scheduled execution".to_string(),
            ));
        }
        self.next_execution_secs = Some(due);
    }

    fn schedule_in(&mut self, millis: u64, now: DateTime<Utc>, host: &mut dyn EngineHost) {
        if self.next_execution_secs.is_some() {
            host.runtime_message(RuntimeMessage::Warning(
                "Overwriting scheduled execution".to_string(),
            ));
        }
        self.next_execution_secs = Some(self.elapsed_secs(now) + millis as f64 / 1000.0);
    }

    /// A schedule of zero is the fire-immediately sentinel used by
    /// initialization and restart; it never counts as past.
    fn schedule_landed_in_past(&self, now: DateTime<Utc>) -> bool {
        matches!(self.next_execution_secs, Some(due) if due > 0.0 && due < self.elapsed_secs(now))
    }

    fn advance_pc(&mut self) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.advance_pc();
        }
    }

    fn unknown_symbol(&mut self, host: &mut dyn EngineHost, name: &str) {
        self.fatal(host, format!("Unknown symbol \"{name}\""));
    }

    fn fatal(&mut self, host: &mut dyn EngineHost, message: impl Into<String>) {
        host.runtime_message(RuntimeMessage::Fatal(message.into()));
        self.terminated = true;
    }
}
