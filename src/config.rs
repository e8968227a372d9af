//! Daemon configuration
//!
//! One JSON file describes the whole installation: which devices exist, how
//! their position encoders are built, motor power tuning, loop periods, and
//! where the daemon listens and stores programs. The daemon writes a
//! complete file with defaults on first start, so there is always a full
//! document to edit.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use crate::language::RuntimeParameters;
use crate::motion::MotorControllerConstants;
use crate::shaft::DeviceId;
use crate::store::write_atomic;

/// Program seeded into an empty library so a fresh installation has
/// something to run: both wheels take a bow.
pub const DEFAULT_PROGRAM: &str = "\
def bow(W):
    left(W, to=1, speed=2)
    +0:02
    right(W, to=12, speed=1)

0:01
bow(A)
0:06
bow(B)
0:12
stop(A)
stop(B)
";

/// Everything the daemon needs to know about one installation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChoreoConfig {
    /// Directory holding the program library (default: .choreo/)
    pub data_root: PathBuf,

    /// TCP address the control service listens on
    pub listen_addr: String,

    /// The motor-and-wheel assemblies, in display order. Device names are
    /// the root symbols programs address.
    pub devices: Vec<DeviceId>,

    /// Sensor bands per wheel; positions per revolution is two to this power
    pub bits_per_device: u32,

    /// Readings further apart than this yield no speed estimate
    pub stasis_timeout_secs: f64,

    /// Decoded speeds above this are treated as sensor faults
    pub max_speed_deg_per_sec: f64,

    /// Power fraction per speed number, speed 1 first
    pub power_definitions: Vec<f64>,

    /// Seconds a ramp from rest to full power takes
    pub ramp_up_secs_zero_to_max: f64,

    /// Period of the motor power refresh loop
    pub apply_power_every_ms: u64,

    /// Period of the program execution loop
    pub step_program_every_ms: u64,

    /// Name given to the program seeded into an empty library
    pub default_program_name: String,

    /// Code of the program seeded into an empty library
    pub default_program_code: String,
}

impl Default for ChoreoConfig {
    fn default() -> Self {
        Self {
            data_root: PathBuf::from(".choreo"),
            listen_addr: "127.0.0.1:4000".to_string(),
            devices: vec![DeviceId::new("A"), DeviceId::new("B")],
            bits_per_device: 6,
            stasis_timeout_secs: 1.0,
            max_speed_deg_per_sec: 800.0,
            power_definitions: vec![0.2, 0.4, 0.6, 0.8, 1.0],
            ramp_up_secs_zero_to_max: 0.5,
            apply_power_every_ms: 50,
            step_program_every_ms: 50,
            default_program_name: "Program 1".to_string(),
            default_program_code: DEFAULT_PROGRAM.to_string(),
        }
    }
}

impl ChoreoConfig {
    /// Load a configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let data =
            std::fs::read(path).with_context(|| format!("Failed to read config: {:?}", path))?;
        serde_json::from_slice(&data).context("Failed to deserialize config")
    }

    /// Write the configuration as pretty JSON.
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_vec_pretty(self).context("Failed to serialize config")?;
        write_atomic(path, &json)
    }

    /// Load `path`, or write defaults there and return them when the file
    /// does not exist yet.
    pub fn load_or_create(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            let config = Self::default();
            config.save(path)?;
            tracing::info!(path = %path.display(), "wrote default configuration");
            Ok(config)
        }
    }

    /// Check the configuration is usable before bringing hardware up.
    pub fn validate(&self) -> Result<()> {
        if self.devices.is_empty() {
            bail!("at least one device is required");
        }
        let mut seen = std::collections::BTreeSet::new();
        for device in &self.devices {
            if !valid_symbol(&device.0) {
                bail!("device name {:?} is not a valid program symbol", device.0);
            }
            if !seen.insert(device) {
                bail!("duplicate device name {:?}", device.0);
            }
        }
        if !(1..=16).contains(&self.bits_per_device) {
            bail!("bits_per_device must be between 1 and 16");
        }
        if self.power_definitions.is_empty() {
            bail!("power_definitions must name at least one speed");
        }
        for power in &self.power_definitions {
            if !power.is_finite() || *power <= 0.0 || *power > 1.0 {
                bail!("power definitions must lie in (0, 1]");
            }
        }
        if self.ramp_up_secs_zero_to_max <= 0.0 {
            bail!("ramp_up_secs_zero_to_max must be positive");
        }
        if self.stasis_timeout_secs <= 0.0 {
            bail!("stasis_timeout_secs must be positive");
        }
        if self.max_speed_deg_per_sec <= 0.0 {
            bail!("max_speed_deg_per_sec must be positive");
        }
        if self.apply_power_every_ms == 0 || self.step_program_every_ms == 0 {
            bail!("loop periods must be positive");
        }
        if self.listen_addr.parse::<SocketAddr>().is_err() {
            bail!("listen_addr {:?} is not a socket address", self.listen_addr);
        }
        Ok(())
    }

    /// Motor tuning shared by the ramp controller and the planner.
    pub fn motor_constants(&self) -> MotorControllerConstants {
        MotorControllerConstants {
            power_definitions: self.power_definitions.clone(),
            ramp_up_secs_zero_to_max: self.ramp_up_secs_zero_to_max,
        }
    }

    /// Limits the compiler enforces on turn arguments.
    pub fn runtime_parameters(&self) -> RuntimeParameters {
        RuntimeParameters {
            num_turn_sections: 1 << self.bits_per_device,
            num_speeds: self.power_definitions.len() as u32,
        }
    }

    /// The symbols programs may address, in configured order.
    pub fn device_symbols(&self) -> Vec<String> {
        self.devices.iter().map(|device| device.0.clone()).collect()
    }
}

fn valid_symbol(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    }
}
