//! Motor driver binding.

use super::HardwareError;
use crate::shaft::DeviceId;
use std::collections::BTreeMap;

/// Writes power levels to physical motors.
///
/// Power is a fraction of full drive in `[-1.0, 1.0]`; positive spins the
/// wheel counter-clockwise. The ramp controller re-sends every motor's
/// level on a fixed period, so boards with a communication-loss failsafe
/// keep turning as long as the daemon is alive.
pub trait MotorDriver: Send {
    /// Bring the driver up. Called once before any power is written.
    fn initialize(&mut self) -> Result<(), HardwareError>;

    /// Drive one motor at the given power level.
    fn set_power(&mut self, motor: &DeviceId, power: f64);

    /// Cut power to every motor. Called on shutdown.
    fn stop(&mut self);
}

/// Driver that records power levels instead of moving anything.
#[derive(Debug, Default)]
pub struct MockMotorDriver {
    powers: BTreeMap<DeviceId, f64>,
}

impl MockMotorDriver {
    /// Create a mock driver with no recorded power levels.
    pub fn new() -> Self {
        Self::default()
    }

    /// The most recent power written for a motor.
    pub fn power_of(&self, motor: &DeviceId) -> Option<f64> {
        self.powers.get(motor).copied()
    }
}

impl MotorDriver for MockMotorDriver {
    fn initialize(&mut self) -> Result<(), HardwareError> {
        tracing::info!("mock motor driver ready");
        Ok(())
    }

    fn set_power(&mut self, motor: &DeviceId, power: f64) {
        tracing::trace!(motor = %motor, power, "mock motor power");
        self.powers.insert(motor.clone(), power);
    }

    fn stop(&mut self) {
        tracing::info!("mock motor driver stopped");
        for power in self.powers.values_mut() {
            *power = 0.0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mock_driver_records_last_power() {
        let motor = DeviceId::new("A");
        let mut driver = MockMotorDriver::new();
        driver.initialize().unwrap();

        assert_eq!(driver.power_of(&motor), None);
        driver.set_power(&motor, 0.4);
        driver.set_power(&motor, -0.8);
        assert_eq!(driver.power_of(&motor), Some(-0.8));

        driver.stop();
        assert_eq!(driver.power_of(&motor), Some(0.0));
    }
}
