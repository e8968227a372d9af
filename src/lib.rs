//! Choreo – timed choreography for a pair of sensed motors
//!
//! This crate drives two slow display motors through choreographed moves:
//! - A small indentation-based scheduling language with absolute and
//!   relative time markers, compiled ahead of execution
//! - A polled execution engine that replays compiled programs against a clock
//! - Gray-code shaft decoding that turns reflective band sensor edges into
//!   absolute wheel positions and plausibility-checked speed estimates
//! - Bounded-rate motor power ramping so heavy wheels never jerk
//! - A planner closing the loop: turn intents become power targets, and a
//!   wheel reaching its target section ramps back down to rest
//! - NDJSON control plane for program storage, status, and start/stop

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

/// Wall-clock and test-clock time sources.
pub mod clock;
/// Daemon configuration: devices, decoder limits, power tables, periods.
pub mod config;
/// Single-writer assembly of engine, decoder, planner, and ramp controller.
pub mod core;
/// Compiled-program execution: scopes, scheduling, and motor intents.
pub mod engine;
/// Traits binding the daemon to motor drivers and band sensors.
pub mod hardware;
/// The choreography language: line scanning, block grouping, compilation.
pub mod language;
/// Motor power ramping and the position-chasing planner.
pub mod motion;
/// NDJSON control-plane service for the choreo daemon.
pub mod service;
/// Gray-code tables and the absolute shaft position decoder.
pub mod shaft;
/// Persisted program library backing the control plane.
pub mod store;

// Re-export key types for convenience
pub use config::ChoreoConfig;
pub use core::ControlCore;
pub use shaft::DeviceId;

/// Current version of the choreo crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Protocol version for control plane communication
pub const PROTOCOL_VERSION: &str = "1.0.0";
