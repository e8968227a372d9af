//! Shaft position sensing for slow, heavy wheels.
//!
//! Each wheel carries a ring of reflective bands read by one sensor per
//! band. The band pattern around the wheel follows a reflected binary Gray
//! code, so any single sensor edge moves the decoded position by exactly one
//! section and a misread is detectable as an implausible jump. [`gray`]
//! builds the code tables; [`decoder`] turns sensor edges into absolute
//! positions and speed estimates.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

pub mod decoder;
pub mod gray;

pub use decoder::ShaftDecoder;

/// Identifies one motor-and-wheel assembly, e.g. `A` or `B`.
///
/// Device ids double as the root symbols of the choreography language: a
/// program names the wheel it moves by this id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DeviceId(pub String);

impl DeviceId {
    /// Create a new device ID with the given name.
    pub fn new(name: &str) -> Self {
        DeviceId(name.to_string())
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An absolute wheel position decoded from the sensor bands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WheelPosition {
    /// Position index in `0..2^bits`, counting clockwise from the top.
    pub position: u32,
    /// Angle in degrees, in `[0, 360)`. Position 0 is 0°, higher indexes
    /// sit further clockwise, so the angle decreases as the index grows.
    pub angle: f64,
    /// The Gray code word the bands currently show, most significant first.
    pub code: String,
}

/// One decode cycle's worth of change, delivered to the planner.
///
/// Only devices whose position actually changed appear in the maps. A speed
/// of `None` means the wheel had been still for longer than the stasis
/// timeout, so no rate can be inferred from the last two readings.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ShaftUpdate {
    /// New absolute position per changed device.
    pub positions: BTreeMap<DeviceId, WheelPosition>,
    /// Estimated speed in degrees per second per changed device.
    pub speeds: BTreeMap<DeviceId, Option<f64>>,
}

impl ShaftUpdate {
    /// True when no device changed position.
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}

/// Errors raised while wiring sensor readings to the decoder.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ShaftError {
    /// Initial readings name a device the decoder was not built for.
    #[error("unknown device \"{0}\" in sensor readings")]
    UnknownDevice(DeviceId),

    /// A configured device is missing from the initial readings.
    #[error("no sensor readings for device \"{0}\"")]
    MissingDevice(DeviceId),

    /// A device reports a different number of bands than the code width.
    #[error("device \"{device}\" has {got} sensor bands, expected {expected}")]
    BandCount {
        /// The misconfigured device.
        device: DeviceId,
        /// Configured code width in bits.
        expected: u32,
        /// Number of bands the readings actually carry.
        got: usize,
    },
}
