//! The control core: one struct wiring the interpreter to the hardware.
//!
//! [`ControlCore`] owns the shaft decoder, the turn planner, the motor
//! power controller, and the running program, and exposes the three
//! entry points the daemon's loops call: the program tick, the power
//! tick, and the sensor batch. It holds no clock, no sockets, and no
//! threads, which is what makes the whole control path testable against
//! a manual clock.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::ChoreoConfig;
use crate::engine::{EngineHost, ExecutionContext, RuntimeMessage};
use crate::hardware::MotorDriver;
use crate::hardware::sensors::{InitialReadings, SensorBatch};
use crate::language::{RuntimeParameters, SyntaxError, TurnDirection, compile_program};
use crate::motion::{MotorPowerController, Planner, RotationDirection};
use crate::shaft::{DeviceId, ShaftDecoder, ShaftError, ShaftUpdate, WheelPosition};

/// Lifecycle of the loaded program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgramState {
    /// No program loaded.
    Idle,
    /// A program is loaded and executing.
    Running,
    /// The loaded program ran to completion or died on a fatal error.
    Terminated,
}

/// Snapshot of the core for the control service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoreStatus {
    /// Lifecycle of the loaded program.
    pub program: ProgramState,
    /// When the current run started, if one is loaded.
    pub started_at: Option<DateTime<Utc>>,
    /// Committed wheel position per device.
    pub positions: BTreeMap<DeviceId, WheelPosition>,
    /// Held motor power per device.
    pub powers: BTreeMap<DeviceId, f64>,
    /// Message of the fatal runtime error that ended the last run, if any.
    pub last_fatal: Option<String>,
}

/// Owns every control-path component and the program driving them.
pub struct ControlCore {
    parameters: RuntimeParameters,
    devices: Vec<DeviceId>,
    symbols: Vec<String>,
    decoder: ShaftDecoder,
    planner: Planner,
    motors: MotorPowerController,
    execution: Option<ExecutionContext>,
    last_fatal: Option<String>,
}

impl ControlCore {
    /// Build the core from a validated configuration. Wheels start at
    /// position 0 until [`ControlCore::seed_decoder`] delivers real
    /// readings.
    pub fn new(config: &ChoreoConfig) -> Self {
        let devices = config.devices.clone();
        Self {
            parameters: config.runtime_parameters(),
            symbols: config.device_symbols(),
            decoder: ShaftDecoder::new(
                config.bits_per_device,
                &devices,
                config.stasis_timeout_secs,
                config.max_speed_deg_per_sec,
            ),
            planner: Planner::new(devices.iter().cloned(), config.motor_constants()),
            motors: MotorPowerController::new(devices.iter().cloned()),
            execution: None,
            last_fatal: None,
            devices,
        }
    }

    /// Align the decoder with the sensor levels read at startup.
    pub fn seed_decoder(
        &mut self,
        readings: &InitialReadings,
        now: DateTime<Utc>,
    ) -> Result<BTreeMap<DeviceId, WheelPosition>, ShaftError> {
        self.decoder.seed(readings, now)
    }

    /// Compile `source` and start executing it on the next program tick,
    /// replacing any run in progress.
    pub fn load_program(
        &mut self,
        source: &str,
        now: DateTime<Utc>,
    ) -> Result<(), Vec<SyntaxError>> {
        let program = compile_program(source, &self.symbols, &self.parameters).into_program()?;
        self.execution = Some(ExecutionContext::new(
            program,
            self.devices.iter().cloned(),
            now,
        ));
        self.last_fatal = None;
        tracing::info!("program loaded");
        Ok(())
    }

    /// Drop the loaded program without touching motor power.
    pub fn unload_program(&mut self) {
        self.execution = None;
    }

    /// Run the interpreter if its schedule is due. Returns whether any
    /// commands executed.
    pub fn on_program_tick(&mut self, now: DateTime<Utc>) -> bool {
        let Some(execution) = self.execution.as_mut() else {
            return false;
        };
        let mut host = CoreEngineHost {
            planner: &mut self.planner,
            motors: &mut self.motors,
            decoder: &self.decoder,
            last_fatal: &mut self.last_fatal,
            now,
        };
        execution.execute_if_scheduled(now, &mut host)
    }

    /// Advance every ramp and refresh every motor's power on the driver.
    pub fn on_power_tick(&mut self, now: DateTime<Utc>, driver: &mut dyn MotorDriver) {
        self.motors.apply_power(now, driver);
    }

    /// Decode a settled batch of sensor edges and feed any position
    /// changes back into the planner.
    pub fn on_sensor_batch(&mut self, batch: &SensorBatch, now: DateTime<Utc>) -> Option<ShaftUpdate> {
        let update = self.decoder.apply_edges(batch, now)?;
        if let Err(error) = self
            .planner
            .on_shaft_position(&update, &mut self.motors, now)
        {
            tracing::error!(%error, "position feedback rejected");
        }
        Some(update)
    }

    /// Panic button: drop the program, forget every plan, and cut all
    /// motor power without ramping.
    pub fn stop_all(&mut self) {
        tracing::info!("stopping all motors");
        self.execution = None;
        for device in &self.devices {
            if let Err(error) = self.planner.set_stop_plan(device, &mut self.motors) {
                tracing::error!(device = %device, %error, "stop rejected");
            }
        }
    }

    /// Snapshot for the control service.
    pub fn status(&self) -> CoreStatus {
        let program = match &self.execution {
            None => ProgramState::Idle,
            Some(execution) if execution.terminated() => ProgramState::Terminated,
            Some(_) => ProgramState::Running,
        };
        CoreStatus {
            program,
            started_at: self.execution.as_ref().map(|e| e.start_time()),
            positions: self.decoder.positions(),
            powers: self.motors.powers(),
            last_fatal: self.last_fatal.clone(),
        }
    }
}

/// Borrowed view handed to the interpreter for one tick.
struct CoreEngineHost<'a> {
    planner: &'a mut Planner,
    motors: &'a mut MotorPowerController,
    decoder: &'a ShaftDecoder,
    last_fatal: &'a mut Option<String>,
    now: DateTime<Utc>,
}

impl EngineHost for CoreEngineHost<'_> {
    fn turn(
        &mut self,
        device: &DeviceId,
        direction: TurnDirection,
        section: Option<u32>,
        speed: u32,
    ) {
        // Seen from the audience, `left` turns the wheel clockwise.
        let rotation = match direction {
            TurnDirection::Left => RotationDirection::Clockwise,
            TurnDirection::Right => RotationDirection::CounterClockwise,
        };
        let current = self.decoder.position_of(device);
        if let Err(error) =
            self.planner
                .set_plan(device, section, speed, rotation, current, self.motors, self.now)
        {
            tracing::error!(device = %device, %error, "turn rejected");
        }
    }

    fn stop(&mut self, device: &DeviceId) {
        if let Err(error) = self.planner.set_stop_plan(device, self.motors) {
            tracing::error!(device = %device, %error, "stop rejected");
        }
    }

    fn runtime_message(&mut self, message: RuntimeMessage) {
        match &message {
            RuntimeMessage::Warning(text) => tracing::warn!("{text}"),
            RuntimeMessage::Fatal(text) => {
                tracing::error!("{text}");
                *self.last_fatal = Some(text.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::motors::MockMotorDriver;
    use crate::hardware::sensors::SensorEdge;
    use chrono::{Duration, TimeZone};

    fn config() -> ChoreoConfig {
        let mut config = ChoreoConfig::default();
        config.devices = vec![DeviceId::new("A")];
        config.bits_per_device = 3;
        config
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2019, 4, 9, 22, 5, 0).unwrap()
    }

    fn after_ms(ms: i64) -> DateTime<Utc> {
        t0() + Duration::milliseconds(ms)
    }

    fn batch(band: u32, level: bool) -> SensorBatch {
        SensorBatch {
            edges: vec![SensorEdge {
                device: DeviceId::new("A"),
                band,
                level,
            }],
        }
    }

    fn seeded_core() -> ControlCore {
        let mut core = ControlCore::new(&config());
        let readings: InitialReadings =
            [(DeviceId::new("A"), vec![false, false, false])].into();
        core.seed_decoder(&readings, t0()).unwrap();
        core
    }

    #[test]
    fn turn_command_closes_the_loop_on_target() {
        let mut core = seeded_core();
        let mut driver = MockMotorDriver::default();
        let device = DeviceId::new("A");

        // `right` drives counter-clockwise, walking the position downward
        // from 0 through 7 toward the target section 6.
        core.load_program("right(A, to=6, speed=5)\n", t0()).unwrap();
        assert!(core.on_program_tick(t0()));
        core.on_power_tick(after_ms(1_000), &mut driver);
        assert_eq!(driver.power_of(&device), Some(1.0));
        assert_eq!(core.status().program, ProgramState::Terminated);

        // 000 -> 100 is position 7; not the target, power holds.
        let update = core.on_sensor_batch(&batch(0, true), after_ms(1_200)).unwrap();
        assert_eq!(update.positions[&device].position, 7);
        core.on_power_tick(after_ms(1_250), &mut driver);
        assert_eq!(driver.power_of(&device), Some(1.0));

        // 100 -> 101 is position 6; the planner ramps the motor to rest.
        let update = core.on_sensor_batch(&batch(2, true), after_ms(1_400)).unwrap();
        assert_eq!(update.positions[&device].position, 6);
        core.on_power_tick(after_ms(2_400), &mut driver);
        assert_eq!(driver.power_of(&device), Some(0.0));

        let status = core.status();
        assert_eq!(status.positions[&device].position, 6);
        assert_eq!(status.powers[&device], 0.0);
        assert_eq!(status.last_fatal, None);
    }

    #[test]
    fn stop_all_cuts_power_and_unloads_the_program() {
        let mut core = seeded_core();
        let mut driver = MockMotorDriver::default();
        let device = DeviceId::new("A");

        core.load_program("left(A, speed=2)\n0:30\nstop(A)\n", t0())
            .unwrap();
        core.on_program_tick(t0());
        core.on_power_tick(after_ms(500), &mut driver);
        assert_eq!(driver.power_of(&device), Some(-0.4));
        assert_eq!(core.status().program, ProgramState::Running);

        core.stop_all();
        core.on_power_tick(after_ms(600), &mut driver);
        assert_eq!(driver.power_of(&device), Some(0.0));
        assert_eq!(core.status().program, ProgramState::Idle);
    }

    #[test]
    fn load_program_surfaces_compile_errors() {
        let mut core = seeded_core();
        let errors = core
            .load_program("left(A, speed=9)\n", t0())
            .unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(core.status().program, ProgramState::Idle);
    }
}
