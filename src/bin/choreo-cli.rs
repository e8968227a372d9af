//! Choreo CLI - command-line companion for choreography programs.
//!
//! Provides subcommands for checking a program file against a wheel
//! geometry and for replaying a program's timeline on a simulated clock,
//! without a daemon or hardware anywhere near.

use anyhow::{Context, Result};
use choreo::clock::{Clock, ManualClock};
use choreo::engine::{EngineHost, ExecutionContext, RuntimeMessage};
use choreo::language::{RuntimeParameters, TurnDirection, compile_program};
use choreo::shaft::DeviceId;
use chrono::{DateTime, Duration, TimeZone, Utc};
use clap::{Parser, Subcommand};
use std::fs;
use std::path::PathBuf;
use std::process;

#[derive(Parser)]
#[command(name = "choreo")]
#[command(about = "Check and simulate wheel choreography programs", long_about = None)]
struct Cli {
    /// Device symbols programs may address
    #[arg(long, value_delimiter = ',', default_value = "A,B")]
    devices: Vec<String>,

    /// Gray-code bands per wheel; a wheel has 2^bits sections
    #[arg(long, default_value = "6")]
    bits: u32,

    /// Number of entries in the motor power table
    #[arg(long, default_value = "5")]
    speeds: u32,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a program file and report every error found
    Check {
        /// Program source file
        file: PathBuf,
    },

    /// Execute a program on a simulated clock, printing each command
    Simulate {
        /// Program source file
        file: PathBuf,

        /// How much simulated time to cover
        #[arg(long, default_value = "120")]
        seconds: u64,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .init();

    let cli = Cli::parse();
    let parameters = RuntimeParameters {
        num_turn_sections: 1 << cli.bits,
        num_speeds: cli.speeds,
    };

    match cli.command {
        Commands::Check { file } => {
            let source = fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {:?}", file))?;

            match compile_program(&source, &cli.devices, &parameters).into_program() {
                Ok(program) => {
                    println!(
                        "OK: {} root command(s), {} function(s)",
                        program.commands.len(),
                        program.functions.len()
                    );
                }
                Err(errors) => {
                    for error in &errors {
                        println!("{error}");
                    }
                    process::exit(1);
                }
            }
        }

        Commands::Simulate { file, seconds } => {
            let source = fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {:?}", file))?;

            let program = match compile_program(&source, &cli.devices, &parameters).into_program()
            {
                Ok(program) => program,
                Err(errors) => {
                    for error in &errors {
                        println!("{error}");
                    }
                    process::exit(1);
                }
            };

            let start = Utc
                .with_ymd_and_hms(2000, 1, 1, 0, 0, 0)
                .single()
                .context("simulation start instant")?;
            let clock = ManualClock::new(start);
            let devices = cli.devices.iter().map(|name| DeviceId::new(name));
            let mut execution = ExecutionContext::new(program, devices, clock.now());
            let mut host = PrintingHost {
                clock: clock.clone(),
                start,
            };

            let horizon = Duration::seconds(seconds as i64);
            loop {
                execution.execute_if_scheduled(clock.now(), &mut host);
                if execution.terminated() {
                    println!("[{}] program terminated", offset(start, clock.now()));
                    break;
                }
                if clock.now() - start >= horizon {
                    println!("[{}] simulation horizon reached", offset(start, clock.now()));
                    break;
                }
                clock.advance(Duration::milliseconds(50));
            }
        }
    }

    Ok(())
}

/// Prints every engine effect with its simulated-time offset.
struct PrintingHost {
    clock: ManualClock,
    start: DateTime<Utc>,
}

impl EngineHost for PrintingHost {
    fn turn(
        &mut self,
        device: &DeviceId,
        direction: TurnDirection,
        section: Option<u32>,
        speed: u32,
    ) {
        let target = match section {
            Some(section) => format!("to section {section}"),
            None => "free running".to_string(),
        };
        println!(
            "[{}] turn {device} {direction} {target} at speed {speed}",
            offset(self.start, self.clock.now())
        );
    }

    fn stop(&mut self, device: &DeviceId) {
        println!("[{}] stop {device}", offset(self.start, self.clock.now()));
    }

    fn runtime_message(&mut self, message: RuntimeMessage) {
        println!("[{}] {message}", offset(self.start, self.clock.now()));
    }
}

fn offset(start: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let secs = (now - start).num_milliseconds() as f64 / 1000.0;
    format!("{secs:7.2}s")
}
