//! Motor power planning: discrete speeds, bounded ramps, stop-on-target.
//!
//! Programs speak in small speed numbers and wheel sections; drivers speak
//! in signed power fractions. This module owns the translation. The
//! [`ramp::MotorPowerController`] walks each motor's power toward a target
//! at a bounded rate, and the [`planner::Planner`] closes the loop between
//! decoded shaft positions and pending turn plans.

pub mod planner;
pub mod ramp;

pub use planner::Planner;
pub use ramp::MotorPowerController;

use crate::shaft::DeviceId;
use serde::{Deserialize, Serialize};

/// Rotation sense as seen from the audience side of the wheel.
///
/// Positive motor power turns counter-clockwise; the sign convention runs
/// through the controller, the driver, and every log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RotationDirection {
    /// Negative power territory.
    Clockwise,
    /// Positive power territory.
    CounterClockwise,
}

impl std::fmt::Display for RotationDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RotationDirection::Clockwise => write!(f, "cw"),
            RotationDirection::CounterClockwise => write!(f, "ccw"),
        }
    }
}

/// Tuning shared by every motor: the discrete power table and how fast
/// power may slew.
#[derive(Debug, Clone, PartialEq)]
pub struct MotorControllerConstants {
    /// Power fraction per speed number, index 0 holding speed 1. Must be
    /// positive and is conventionally increasing.
    pub power_definitions: Vec<f64>,
    /// Seconds a ramp from zero power to the table's top entry takes.
    pub ramp_up_secs_zero_to_max: f64,
}

impl MotorControllerConstants {
    /// Translate a signed speed number into a signed power fraction.
    ///
    /// Zero maps to zero power; magnitudes index the table 1-based. A
    /// magnitude beyond the table is refused rather than clamped so a
    /// mis-sized configuration surfaces early.
    pub fn power_for_speed(&self, speed: i32) -> Result<f64, MotionError> {
        if speed == 0 {
            return Ok(0.0);
        }
        let magnitude = speed.unsigned_abs() as usize;
        let Some(power) = self.power_definitions.get(magnitude - 1) else {
            return Err(MotionError::InvalidSpeed(speed));
        };
        Ok(power.copysign(speed as f64))
    }

    /// Maximum power change per second, derived from the top table entry
    /// and the zero-to-max ramp time.
    pub fn max_rate(&self) -> f64 {
        let top = self.power_definitions.last().copied().unwrap_or(0.0);
        top / self.ramp_up_secs_zero_to_max
    }
}

/// Errors from the motion layer.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MotionError {
    /// A command addressed a motor the controller was not built with.
    #[error("unknown motor \"{0}\"")]
    UnknownMotor(DeviceId),
    /// A speed number fell outside the configured power table.
    #[error("speed {0} outside the configured power table")]
    InvalidSpeed(i32),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn constants() -> MotorControllerConstants {
        MotorControllerConstants {
            power_definitions: vec![0.2, 0.4, 0.6, 0.8, 1.0],
            ramp_up_secs_zero_to_max: 0.5,
        }
    }

    #[test]
    fn speed_signs_select_power_signs() {
        let constants = constants();
        assert_eq!(constants.power_for_speed(0).unwrap(), 0.0);
        assert_eq!(constants.power_for_speed(1).unwrap(), 0.2);
        assert_eq!(constants.power_for_speed(5).unwrap(), 1.0);
        assert_eq!(constants.power_for_speed(-3).unwrap(), -0.6);
    }

    #[test]
    fn out_of_table_speed_is_refused() {
        assert_eq!(
            constants().power_for_speed(6),
            Err(MotionError::InvalidSpeed(6))
        );
        assert_eq!(
            constants().power_for_speed(-6),
            Err(MotionError::InvalidSpeed(-6))
        );
    }

    #[test]
    fn max_rate_spans_the_table_top() {
        // Full power in half a second means two power units per second.
        assert_eq!(constants().max_rate(), 2.0);
    }
}
