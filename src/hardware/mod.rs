//! Hardware binding points for the choreo daemon.
//!
//! The daemon itself never talks to GPIO pins or motor buses. It drives a
//! [`motors::MotorDriver`] with power levels and consumes band edges from a
//! [`sensors::SensorSource`]; physical implementations live outside this
//! crate and plug in through these traits. The built-in mocks let the
//! daemon, the simulator, and the tests run on plain hardware-free state.

use thiserror::Error;

pub mod motors;
pub mod sensors;

pub use motors::MotorDriver;
pub use sensors::SensorSource;

/// Errors raised while bringing hardware bindings up.
#[derive(Debug, Error)]
pub enum HardwareError {
    /// The motor driver could not be initialized.
    #[error("motor driver initialization failed: {0}")]
    DriverInit(String),

    /// The sensor source could not be started.
    #[error("sensor source failed to start: {0}")]
    SensorStart(String),
}
