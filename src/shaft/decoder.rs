//! Absolute shaft position decoding with plausibility checking.
//!
//! The decoder keeps one bit of state per sensor band and device. Sensor
//! edges flip single bits; after each batch the bands are re-read as a Gray
//! code word, giving the wheel's absolute section index and its angle from
//! the top. Because a real wheel cannot jump, the implied angular speed of
//! every change is checked against a configured maximum: a cycle implying an
//! implausible speed is logged and withheld from the planner, while the raw
//! band bits are kept so the following cycle re-reads honest state.

use super::{DeviceId, ShaftError, ShaftUpdate, WheelPosition, gray};
use crate::hardware::sensors::SensorBatch;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};

/// Per-device decoding state.
#[derive(Debug, Clone)]
struct DeviceState {
    /// Current band levels, most significant band first. `true` is a dark
    /// (absorbing) band, read as bit `1`.
    bands: Vec<bool>,
    /// Last committed position index.
    position: u32,
    /// Instant of the last committed position change (or the seed).
    last_change: DateTime<Utc>,
}

/// Decodes sensor band edges into absolute wheel positions.
#[derive(Debug)]
pub struct ShaftDecoder {
    bits: u32,
    degrees_per_section: f64,
    inverse: HashMap<String, u32>,
    configured: Vec<DeviceId>,
    stasis_timeout_secs: f64,
    max_speed_deg_per_sec: f64,
    states: BTreeMap<DeviceId, DeviceState>,
}

impl ShaftDecoder {
    /// Create a decoder for `bits`-wide codes over the given devices.
    ///
    /// The decoder reports nothing until [`ShaftDecoder::seed`] establishes
    /// the initial band state of every device.
    pub fn new(
        bits: u32,
        devices: &[DeviceId],
        stasis_timeout_secs: f64,
        max_speed_deg_per_sec: f64,
    ) -> Self {
        let codes = gray::generate(bits);
        Self {
            bits,
            degrees_per_section: 360.0 / (1u64 << bits) as f64,
            inverse: gray::inverse(&codes),
            configured: devices.to_vec(),
            stasis_timeout_secs,
            max_speed_deg_per_sec,
            states: BTreeMap::new(),
        }
    }

    /// Establish initial positions from a full read of every device's bands.
    ///
    /// Readings must cover exactly the configured devices, each with one
    /// level per band. Returns the decoded starting positions.
    pub fn seed(
        &mut self,
        readings: &BTreeMap<DeviceId, Vec<bool>>,
        now: DateTime<Utc>,
    ) -> Result<BTreeMap<DeviceId, WheelPosition>, ShaftError> {
        for device in readings.keys() {
            if !self.configured.contains(device) {
                return Err(ShaftError::UnknownDevice(device.clone()));
            }
        }

        let mut states = BTreeMap::new();
        let mut positions = BTreeMap::new();
        for device in &self.configured {
            let bands = readings
                .get(device)
                .ok_or_else(|| ShaftError::MissingDevice(device.clone()))?;
            if bands.len() != self.bits as usize {
                return Err(ShaftError::BandCount {
                    device: device.clone(),
                    expected: self.bits,
                    got: bands.len(),
                });
            }

            let code = code_word(bands);
            // The Gray table is a permutation of all fixed-width words, so
            // a correctly sized reading always decodes.
            let position = self
                .inverse
                .get(&code)
                .copied()
                .ok_or_else(|| ShaftError::BandCount {
                    device: device.clone(),
                    expected: self.bits,
                    got: bands.len(),
                })?;

            states.insert(
                device.clone(),
                DeviceState {
                    bands: bands.clone(),
                    position,
                    last_change: now,
                },
            );
            positions.insert(
                device.clone(),
                WheelPosition {
                    position,
                    angle: self.angle_of(position),
                    code,
                },
            );
        }

        self.states = states;
        Ok(positions)
    }

    /// Apply one batch of sensor edges and report what changed.
    ///
    /// Returns `None` when nothing changed or when the batch was discarded
    /// as a fault (unknown device or band, or an implied speed above the
    /// plausible maximum). On a fault the band bits already flipped stay in
    /// place but no position is committed, so the next batch decodes from
    /// the wheel's true band state.
    pub fn apply_edges(&mut self, batch: &SensorBatch, now: DateTime<Utc>) -> Option<ShaftUpdate> {
        for edge in &batch.edges {
            let Some(state) = self.states.get_mut(&edge.device) else {
                tracing::warn!(device = %edge.device, "edge for unknown device, discarding cycle");
                return None;
            };
            let Some(band) = state.bands.get_mut(edge.band as usize) else {
                tracing::warn!(
                    device = %edge.device,
                    band = edge.band,
                    "edge for band out of range, discarding cycle"
                );
                return None;
            };
            *band = edge.level;
        }

        let mut update = ShaftUpdate::default();
        for (device, state) in &self.states {
            let code = code_word(&state.bands);
            let Some(position) = self.inverse.get(&code).copied() else {
                tracing::warn!(device = %device, code, "unmapped band pattern, discarding cycle");
                return None;
            };
            if position == state.position {
                continue;
            }

            let elapsed = duration_secs(now - state.last_change);
            let old_angle = self.angle_of(state.position);
            let new_angle = self.angle_of(position);
            let speed = if elapsed < self.stasis_timeout_secs {
                Some(angular_distance(old_angle, new_angle) / elapsed)
            } else {
                None
            };

            if let Some(speed) = speed {
                if speed > self.max_speed_deg_per_sec {
                    tracing::warn!(
                        device = %device,
                        speed,
                        max = self.max_speed_deg_per_sec,
                        "implausible shaft speed, discarding cycle"
                    );
                    return None;
                }
            }

            update.positions.insert(
                device.clone(),
                WheelPosition {
                    position,
                    angle: new_angle,
                    code,
                },
            );
            update.speeds.insert(device.clone(), speed);
        }

        if update.is_empty() {
            return None;
        }

        for (device, position) in &update.positions {
            if let Some(state) = self.states.get_mut(device) {
                state.position = position.position;
                state.last_change = now;
            }
            tracing::debug!(device = %device, position = position.position, angle = position.angle, "shaft moved");
        }
        Some(update)
    }

    /// Committed position of one device, if seeded.
    pub fn position_of(&self, device: &DeviceId) -> Option<u32> {
        self.states.get(device).map(|state| state.position)
    }

    /// Committed positions of every seeded device.
    pub fn positions(&self) -> BTreeMap<DeviceId, WheelPosition> {
        self.states
            .iter()
            .map(|(device, state)| {
                (
                    device.clone(),
                    WheelPosition {
                        position: state.position,
                        angle: self.angle_of(state.position),
                        code: code_word(&state.bands),
                    },
                )
            })
            .collect()
    }

    /// Angle in degrees for a section index, in `[0, 360)`.
    pub fn angle_of(&self, position: u32) -> f64 {
        (360.0 - self.degrees_per_section * f64::from(position)) % 360.0
    }
}

/// Render band levels as a Gray code word, most significant band first.
fn code_word(bands: &[bool]) -> String {
    bands.iter().map(|&dark| if dark { '1' } else { '0' }).collect()
}

/// Shortest angular distance between two angles in `[0, 360)`.
fn angular_distance(a: f64, b: f64) -> f64 {
    let diff = (a - b).abs();
    diff.min(360.0 - diff)
}

fn duration_secs(duration: chrono::Duration) -> f64 {
    duration.num_milliseconds() as f64 / 1000.0
}
