use std::collections::BTreeMap;

use command_transport::{RawSample, SampleBatch};
use device_registry::{DeviceRegistry, StandMetrics};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{decode_feedback, ActuatorFeedback, ChannelHistory, FeedbackKind};

/// Tuning for the ingest path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub history_capacity: usize,
    pub rate_window: usize,
    pub calibration_enabled: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            history_capacity: 100,
            rate_window: 50,
            calibration_enabled: true,
        }
    }
}

/// One processed sample for a configured sensor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    pub name: String,
    pub hat: u8,
    pub channel: u8,
    pub value: f64,
    pub unit: String,
    pub timestamp: f64,
    pub average: f64,
    /// `None` until two samples with increasing timestamps are held.
    pub rate: Option<f64>,
}

/// Immutable view of the latest telemetry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySnapshot {
    pub sequence: u64,
    /// One reading per sensor that has reported, in address order.
    pub sensors: Vec<SensorReading>,
    pub actuators: Vec<ActuatorFeedback>,
}

impl TelemetrySnapshot {
    pub fn sensor(&self, name: &str) -> Option<&SensorReading> {
        self.sensors.iter().find(|r| r.name == name)
    }
}

pub struct TelemetryPipeline {
    config: PipelineConfig,
    histories: BTreeMap<u16, ChannelHistory>,
    latest: BTreeMap<u16, SensorReading>,
    actuators: BTreeMap<(FeedbackKind, u16), ActuatorFeedback>,
    sequence: u64,
    metrics: Option<StandMetrics>,
}

impl TelemetryPipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            histories: BTreeMap::new(),
            latest: BTreeMap::new(),
            actuators: BTreeMap::new(),
            sequence: 0,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: StandMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn history(&self, hat: u8, channel: u8) -> Option<&ChannelHistory> {
        let key = device_registry::SensorAddress::new(hat, channel).key();
        self.histories.get(&key)
    }

    /// Switch between calibrated and raw values. Histories are cleared because the
    /// two modes do not share units.
    pub fn set_calibration_enabled(&mut self, enabled: bool) {
        if self.config.calibration_enabled == enabled {
            return;
        }
        self.config.calibration_enabled = enabled;
        self.histories.clear();
        self.latest.clear();
        info!(enabled, "calibration mode changed");
    }

    /// Drop state for channels the registry no longer maps to the same sensor.
    pub fn retain_configured(&mut self, registry: &DeviceRegistry) {
        let keep = |key: &u16, name: &str| {
            registry
                .sensor_by_key(*key)
                .is_some_and(|spec| spec.name == name)
        };
        self.latest.retain(|key, reading| keep(key, &reading.name));
        let latest = &self.latest;
        self.histories.retain(|key, _| latest.contains_key(key));
        self.actuators.retain(|(kind, channel), fb| {
            let current = match kind {
                FeedbackKind::Relay => registry.relay_by_channel(*channel).map(|r| r.name.as_str()),
                FeedbackKind::Servo => registry.servo_by_channel(*channel).map(|s| s.name.as_str()),
            };
            current == Some(fb.name.as_str())
        });
    }

    /// Process one sample. Returns `None` when it is skipped: the address is not
    /// configured or the raw value is not finite.
    pub fn ingest(&mut self, registry: &DeviceRegistry, sample: &RawSample) -> Option<SensorReading> {
        let Some(spec) = registry.sensor_by_address(sample.hat, sample.channel) else {
            debug!(hat = sample.hat, channel = sample.channel, "sample for unconfigured channel");
            self.count_skip();
            return None;
        };
        if !sample.value.is_finite() {
            debug!(sensor = %spec.name, value = sample.value, "non-finite sample");
            self.count_skip();
            return None;
        }

        let value = if self.config.calibration_enabled {
            spec.calibration.apply(sample.value)
        } else {
            sample.value
        };
        let key = spec.address.key();
        let capacity = self.config.history_capacity;
        let history = self
            .histories
            .entry(key)
            .or_insert_with(|| ChannelHistory::new(capacity));
        history.push(sample.timestamp, value);

        let reading = SensorReading {
            name: spec.name.clone(),
            hat: sample.hat,
            channel: sample.channel,
            value,
            unit: spec.unit.clone(),
            timestamp: sample.timestamp,
            average: history.average().unwrap_or(value),
            rate: history.rate(self.config.rate_window),
        };
        self.latest.insert(key, reading.clone());
        if let Some(m) = &self.metrics {
            m.samples_ingested.inc();
        }
        Some(reading)
    }

    /// Process a whole batch and return the resulting snapshot.
    pub fn ingest_batch(&mut self, registry: &DeviceRegistry, batch: &SampleBatch) -> TelemetrySnapshot {
        let mut accepted = 0usize;
        for sample in &batch.sensors {
            if self.ingest(registry, sample).is_some() {
                accepted += 1;
            }
        }
        for fb in decode_feedback(registry, &batch.relays, &batch.servos) {
            self.actuators.insert((fb.kind, fb.channel), fb);
        }
        self.sequence += 1;
        debug!(
            sequence = self.sequence,
            accepted,
            skipped = batch.sensors.len() - accepted,
            "batch ingested"
        );
        self.snapshot()
    }

    /// The current snapshot without advancing the sequence number.
    pub fn snapshot(&self) -> TelemetrySnapshot {
        TelemetrySnapshot {
            sequence: self.sequence,
            sensors: self.latest.values().cloned().collect(),
            actuators: self.actuators.values().cloned().collect(),
        }
    }

    fn count_skip(&self) {
        if let Some(m) = &self.metrics {
            m.samples_skipped.inc();
        }
    }
}

impl Default for TelemetryPipeline {
    fn default() -> Self {
        Self::new(PipelineConfig::default())
    }
}
