use prometheus::{Encoder, IntCounter, IntGauge, Registry, TextEncoder};

use crate::RegistrySummary;

#[derive(Clone)]
pub struct StandMetrics {
    pub sensors_loaded: IntGauge,
    pub actuators_loaded: IntGauge,
    pub samples_ingested: IntCounter,
    pub samples_skipped: IntCounter,
    pub batches_dropped: IntCounter,
    pub commands_compiled: IntCounter,
    pub commands_rejected: IntCounter,
    pub commands_published: IntCounter,
}

#[derive(Clone)]
pub struct MetricsHub {
    pub registry: Registry,
    pub stand: StandMetrics,
}

impl MetricsHub {
    pub fn new() -> Result<Self, String> {
        let registry = Registry::new();
        let gauge = |name: &str, help: &str| {
            IntGauge::new(name, help).map_err(|e| format!("metrics init error: {e}"))
        };
        let counter = |name: &str, help: &str| {
            IntCounter::new(name, help).map_err(|e| format!("metrics init error: {e}"))
        };
        let stand = StandMetrics {
            sensors_loaded: gauge("stand_sensors_loaded", "Number of configured sensors")?,
            actuators_loaded: gauge(
                "stand_actuators_loaded",
                "Number of configured relays, servos and gpios",
            )?,
            samples_ingested: counter("stand_samples_ingested", "Raw samples turned into readings")?,
            samples_skipped: counter(
                "stand_samples_skipped",
                "Raw samples for unconfigured channels or with invalid values",
            )?,
            batches_dropped: counter(
                "stand_batches_dropped",
                "Sample batches dropped because the ingest queue was full",
            )?,
            commands_compiled: counter("stand_commands_compiled", "Intents compiled successfully")?,
            commands_rejected: counter("stand_commands_rejected", "Intents rejected by the compiler")?,
            commands_published: counter(
                "stand_commands_published",
                "Low-level commands handed to the transport",
            )?,
        };
        let _ = registry.register(Box::new(stand.sensors_loaded.clone()));
        let _ = registry.register(Box::new(stand.actuators_loaded.clone()));
        let _ = registry.register(Box::new(stand.samples_ingested.clone()));
        let _ = registry.register(Box::new(stand.samples_skipped.clone()));
        let _ = registry.register(Box::new(stand.batches_dropped.clone()));
        let _ = registry.register(Box::new(stand.commands_compiled.clone()));
        let _ = registry.register(Box::new(stand.commands_rejected.clone()));
        let _ = registry.register(Box::new(stand.commands_published.clone()));
        Ok(Self { registry, stand })
    }

    pub fn record_registry(&self, summary: &RegistrySummary) {
        self.stand.sensors_loaded.set(summary.sensors as i64);
        self.stand
            .actuators_loaded
            .set((summary.relays + summary.servos + summary.gpios) as i64);
    }

    pub fn encode_text(&self) -> String {
        let mut buf = Vec::new();
        let encoder = TextEncoder::new();
        if let Err(e) = encoder.encode(&self.registry.gather(), &mut buf) {
            return format!("error encoding metrics: {e}");
        }
        String::from_utf8(buf).unwrap_or_default()
    }
}
