//! Band sensor binding.

use super::HardwareError;
use crate::shaft::DeviceId;
use std::collections::BTreeMap;
use tokio::sync::mpsc;

/// One observed band level change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SensorEdge {
    /// Device whose band changed.
    pub device: DeviceId,
    /// Band index, most significant band of the code word first.
    pub band: u32,
    /// New level: `true` for a dark band, read as bit `1`.
    pub level: bool,
}

/// Edges observed close together, delivered to the decoder as one cycle.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SensorBatch {
    /// The edges, in observation order.
    pub edges: Vec<SensorEdge>,
}

/// A full read of every device's band levels, msb first.
pub type InitialReadings = BTreeMap<DeviceId, Vec<bool>>;

/// Produces band edges for the decoder.
///
/// `start` returns a complete snapshot of every band so the decoder can
/// seed absolute positions, then the source pushes [`SensorBatch`]es into
/// the channel as levels change. Physical sources typically debounce on
/// their own thread and use [`mpsc::Sender::blocking_send`].
pub trait SensorSource: Send {
    /// Read every band once and begin watching for edges.
    fn start(&mut self, events: mpsc::Sender<SensorBatch>) -> Result<InitialReadings, HardwareError>;

    /// Stop watching. Called on shutdown.
    fn stop(&mut self);
}

/// Sensor source backed by fixed readings, for tests and hardware-free runs.
#[derive(Debug)]
pub struct MockSensorSource {
    readings: InitialReadings,
    events: Option<mpsc::Sender<SensorBatch>>,
}

impl MockSensorSource {
    /// A source where every band of every device reads light (`0`),
    /// decoding every wheel at position 0.
    pub fn new(devices: &[DeviceId], bits: u32) -> Self {
        let readings = devices
            .iter()
            .map(|device| (device.clone(), vec![false; bits as usize]))
            .collect();
        Self {
            readings,
            events: None,
        }
    }

    /// A source seeded with specific band levels.
    pub fn with_readings(readings: InitialReadings) -> Self {
        Self {
            readings,
            events: None,
        }
    }

    /// Handle for pushing synthetic edges once the source is started.
    pub fn injector(&self) -> Option<mpsc::Sender<SensorBatch>> {
        self.events.clone()
    }
}

impl SensorSource for MockSensorSource {
    fn start(&mut self, events: mpsc::Sender<SensorBatch>) -> Result<InitialReadings, HardwareError> {
        tracing::info!(devices = self.readings.len(), "mock sensor source started");
        self.events = Some(events);
        Ok(self.readings.clone())
    }

    fn stop(&mut self) {
        self.events = None;
        tracing::info!("mock sensor source stopped");
    }
}
