//! Per-motor power state and bounded-rate transitions.

use super::{MotionError, MotorControllerConstants};
use crate::hardware::MotorDriver;
use crate::shaft::DeviceId;
use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeMap;

/// One linear power transition, fixed at creation time.
///
/// The segment is pure arithmetic over the clock: querying it never
/// mutates anything, so a missed tick costs accuracy only at the driver
/// refresh period, never correctness.
#[derive(Debug, Clone, PartialEq)]
pub struct RampUp {
    start_power: f64,
    target_power: f64,
    start_time: DateTime<Utc>,
    target_time: DateTime<Utc>,
    slope: f64,
}

impl RampUp {
    /// Plan a transition between two powers at `rate` power units per
    /// second. Returns `None` when the powers already agree.
    pub fn between(
        start_power: f64,
        target_power: f64,
        now: DateTime<Utc>,
        rate: f64,
    ) -> Option<RampUp> {
        let delta = target_power - start_power;
        if delta == 0.0 {
            return None;
        }
        let secs = delta.abs() / rate;
        Some(RampUp {
            start_power,
            target_power,
            start_time: now,
            target_time: now + Duration::milliseconds((secs * 1000.0).round() as i64),
            slope: rate.copysign(delta),
        })
    }

    /// Power the motor should carry at `now`. Clamps to the target once
    /// the segment has elapsed, so the endpoint is hit exactly.
    pub fn power_at(&self, now: DateTime<Utc>) -> f64 {
        if now >= self.target_time {
            return self.target_power;
        }
        let elapsed = (now - self.start_time).num_milliseconds() as f64 / 1000.0;
        self.start_power + self.slope * elapsed
    }

    /// Whether the segment has run its course.
    pub fn complete(&self, now: DateTime<Utc>) -> bool {
        now >= self.target_time
    }
}

#[derive(Debug)]
struct MotorState {
    power: f64,
    ramp: Option<RampUp>,
}

/// Tracks the commanded power of every motor and slews it toward targets.
///
/// [`MotorPowerController::apply_power`] re-sends the held power of every
/// motor on every call, ramping or not. Driver boards with a watchdog
/// treat a silent controller as a fault, so the refresh doubles as a
/// keep-alive.
#[derive(Debug)]
pub struct MotorPowerController {
    motors: BTreeMap<DeviceId, MotorState>,
}

impl MotorPowerController {
    /// A controller holding zero power for each listed motor.
    pub fn new(motors: impl IntoIterator<Item = DeviceId>) -> Self {
        Self {
            motors: motors
                .into_iter()
                .map(|id| {
                    (
                        id,
                        MotorState {
                            power: 0.0,
                            ramp: None,
                        },
                    )
                })
                .collect(),
        }
    }

    /// Begin ramping a motor toward the power for `speed`.
    ///
    /// Speed zero ramps down to rest; a motor already at the target keeps
    /// its power with no ramp. Any transition in flight is replaced and
    /// the new ramp departs from the power actually held right now.
    pub fn set_target_speed(
        &mut self,
        motor: &DeviceId,
        speed: i32,
        constants: &MotorControllerConstants,
        now: DateTime<Utc>,
    ) -> Result<(), MotionError> {
        let target = constants.power_for_speed(speed)?;
        let state = self
            .motors
            .get_mut(motor)
            .ok_or_else(|| MotionError::UnknownMotor(motor.clone()))?;
        state.ramp = RampUp::between(state.power, target, now, constants.max_rate());
        Ok(())
    }

    /// Drop a motor to zero power without ramping. The next
    /// [`MotorPowerController::apply_power`] pushes the zero out.
    pub fn stop_motor_immediately(&mut self, motor: &DeviceId) -> Result<(), MotionError> {
        let state = self
            .motors
            .get_mut(motor)
            .ok_or_else(|| MotionError::UnknownMotor(motor.clone()))?;
        state.power = 0.0;
        state.ramp = None;
        Ok(())
    }

    /// Advance every in-flight ramp to `now` and push each motor's power
    /// to the driver.
    pub fn apply_power(&mut self, now: DateTime<Utc>, driver: &mut dyn MotorDriver) {
        for (id, state) in &mut self.motors {
            if let Some(ramp) = &state.ramp {
                state.power = ramp.power_at(now);
                if ramp.complete(now) {
                    state.ramp = None;
                }
            }
            driver.set_power(id, state.power);
        }
    }

    /// Snapshot of every motor's held power.
    pub fn powers(&self) -> BTreeMap<DeviceId, f64> {
        self.motors
            .iter()
            .map(|(id, state)| (id.clone(), state.power))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::motors::MockMotorDriver;
    use chrono::TimeZone;
    use proptest::prelude::*;

    fn constants() -> MotorControllerConstants {
        MotorControllerConstants {
            power_definitions: vec![0.2, 0.4, 0.6, 0.8, 1.0],
            ramp_up_secs_zero_to_max: 1.0,
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2019, 4, 9, 22, 5, 0).unwrap()
    }

    fn after_ms(ms: i64) -> DateTime<Utc> {
        t0() + Duration::milliseconds(ms)
    }

    fn motor() -> DeviceId {
        DeviceId::new("A")
    }

    #[test]
    fn ramp_hits_both_endpoints_exactly() {
        let constants = constants();
        let mut controller = MotorPowerController::new([motor()]);
        let mut driver = MockMotorDriver::default();

        controller
            .set_target_speed(&motor(), 5, &constants, t0())
            .unwrap();
        controller.apply_power(t0(), &mut driver);
        assert_eq!(driver.power_of(&motor()), Some(0.0));
        controller.apply_power(after_ms(500), &mut driver);
        assert_eq!(driver.power_of(&motor()), Some(0.5));
        controller.apply_power(after_ms(1_000), &mut driver);
        assert_eq!(driver.power_of(&motor()), Some(1.0));

        // Reversing direction walks down through zero on the same slope.
        controller
            .set_target_speed(&motor(), -5, &constants, after_ms(1_000))
            .unwrap();
        controller.apply_power(after_ms(1_500), &mut driver);
        assert_eq!(driver.power_of(&motor()), Some(0.5));
        controller.apply_power(after_ms(2_000), &mut driver);
        assert_eq!(driver.power_of(&motor()), Some(0.0));
        controller.apply_power(after_ms(2_500), &mut driver);
        assert_eq!(driver.power_of(&motor()), Some(-0.5));
        controller.apply_power(after_ms(3_000), &mut driver);
        assert_eq!(driver.power_of(&motor()), Some(-1.0));
    }

    #[test]
    fn matching_target_keeps_power_without_a_ramp() {
        let constants = constants();
        let mut controller = MotorPowerController::new([motor()]);
        let mut driver = MockMotorDriver::default();

        controller
            .set_target_speed(&motor(), 3, &constants, t0())
            .unwrap();
        controller.apply_power(after_ms(2_000), &mut driver);
        assert_eq!(driver.power_of(&motor()), Some(0.6));

        controller
            .set_target_speed(&motor(), 3, &constants, after_ms(2_000))
            .unwrap();
        controller.apply_power(after_ms(2_050), &mut driver);
        assert_eq!(driver.power_of(&motor()), Some(0.6));
    }

    #[test]
    fn stop_cuts_power_without_ramping() {
        let constants = constants();
        let mut controller = MotorPowerController::new([motor()]);
        let mut driver = MockMotorDriver::default();

        controller
            .set_target_speed(&motor(), 5, &constants, t0())
            .unwrap();
        controller.apply_power(after_ms(500), &mut driver);
        assert_eq!(driver.power_of(&motor()), Some(0.5));

        controller.stop_motor_immediately(&motor()).unwrap();
        controller.apply_power(after_ms(550), &mut driver);
        assert_eq!(driver.power_of(&motor()), Some(0.0));
        // No leftover ramp re-inflates the power later.
        controller.apply_power(after_ms(5_000), &mut driver);
        assert_eq!(driver.power_of(&motor()), Some(0.0));
    }

    #[test]
    fn idle_motors_are_refreshed_every_tick() {
        let constants = constants();
        let other = DeviceId::new("B");
        let mut controller = MotorPowerController::new([motor(), other.clone()]);
        let mut driver = MockMotorDriver::default();

        controller
            .set_target_speed(&motor(), 1, &constants, t0())
            .unwrap();
        controller.apply_power(after_ms(100), &mut driver);
        assert_eq!(driver.power_of(&motor()), Some(0.2));
        assert_eq!(driver.power_of(&other), Some(0.0));
    }

    #[test]
    fn unknown_motor_is_refused() {
        let constants = constants();
        let mut controller = MotorPowerController::new([motor()]);
        let ghost = DeviceId::new("Z");

        assert_eq!(
            controller.set_target_speed(&ghost, 1, &constants, t0()),
            Err(MotionError::UnknownMotor(ghost.clone()))
        );
        assert_eq!(
            controller.stop_motor_immediately(&ghost),
            Err(MotionError::UnknownMotor(ghost))
        );
    }

    proptest! {
        #[test]
        fn ramp_power_stays_between_endpoints(
            start in -1.0f64..1.0,
            target in -1.0f64..1.0,
            offset_ms in 0i64..5_000,
        ) {
            if let Some(ramp) = RampUp::between(start, target, t0(), 2.0) {
                let power = ramp.power_at(after_ms(offset_ms));
                let lo = start.min(target);
                let hi = start.max(target);
                prop_assert!(power >= lo - 1e-9);
                prop_assert!(power <= hi + 1e-9);
            }
        }
    }
}
