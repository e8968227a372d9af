//! Turn plans: remember where each wheel should stop, and stop it there.

use super::ramp::MotorPowerController;
use super::{MotionError, MotorControllerConstants, RotationDirection};
use crate::shaft::{DeviceId, ShaftUpdate};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet};

/// Connects decoded shaft positions to motor power targets.
///
/// A plan is a target section (or none, for a free-running turn) plus the
/// ramp the controller is already executing. The planner itself holds no
/// clock and no ramp state; it only decides *when* to hand the controller
/// a new target speed.
#[derive(Debug)]
pub struct Planner {
    devices: BTreeSet<DeviceId>,
    targets: BTreeMap<DeviceId, Option<u32>>,
    constants: MotorControllerConstants,
}

impl Planner {
    /// A planner for the given devices with no plans in flight.
    pub fn new(
        devices: impl IntoIterator<Item = DeviceId>,
        constants: MotorControllerConstants,
    ) -> Self {
        Self {
            devices: devices.into_iter().collect(),
            targets: BTreeMap::new(),
            constants,
        }
    }

    /// Start a turn: record the optional target section and ramp the motor
    /// up in the requested direction.
    ///
    /// When the wheel already rests on the target section no ramp is
    /// issued; the plan is recorded and immediately satisfied, so the
    /// wheel stays put instead of driving a full revolution back to where
    /// it started.
    pub fn set_plan(
        &mut self,
        device: &DeviceId,
        target: Option<u32>,
        speed: u32,
        direction: RotationDirection,
        current_position: Option<u32>,
        motors: &mut MotorPowerController,
        now: DateTime<Utc>,
    ) -> Result<(), MotionError> {
        if !self.devices.contains(device) {
            return Err(MotionError::UnknownMotor(device.clone()));
        }
        let signed_speed = match direction {
            RotationDirection::CounterClockwise => speed as i32,
            RotationDirection::Clockwise => -(speed as i32),
        };
        self.targets.insert(device.clone(), target);
        if target.is_some() && target == current_position {
            tracing::debug!(device = %device, ?target, "wheel already on target");
            return Ok(());
        }
        tracing::debug!(
            device = %device,
            ?target,
            speed = signed_speed,
            %direction,
            "turn plan",
        );
        motors.set_target_speed(device, signed_speed, &self.constants, now)
    }

    /// Feed one decode cycle's position changes; any wheel arriving on its
    /// planned section gets ramped down to rest.
    ///
    /// The plan stays recorded after arrival, so a wheel that coasts past
    /// and swings back is stopped again.
    pub fn on_shaft_position(
        &mut self,
        update: &ShaftUpdate,
        motors: &mut MotorPowerController,
        now: DateTime<Utc>,
    ) -> Result<(), MotionError> {
        for (device, wheel) in &update.positions {
            if self.targets.get(device) == Some(&Some(wheel.position)) {
                tracing::debug!(device = %device, position = wheel.position, "target reached");
                motors.set_target_speed(device, 0, &self.constants, now)?;
            }
        }
        Ok(())
    }

    /// Drop a device's plan and cut its motor power without ramping.
    pub fn set_stop_plan(
        &mut self,
        device: &DeviceId,
        motors: &mut MotorPowerController,
    ) -> Result<(), MotionError> {
        if !self.devices.contains(device) {
            return Err(MotionError::UnknownMotor(device.clone()));
        }
        self.targets.remove(device);
        motors.stop_motor_immediately(device)
    }

    /// The recorded target for a device: `None` when no plan is active,
    /// `Some(None)` for a free-running turn.
    pub fn target_of(&self, device: &DeviceId) -> Option<Option<u32>> {
        self.targets.get(device).copied()
    }
}
