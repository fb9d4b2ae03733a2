//! telemetry-pipeline: raw DAQ samples in, calibrated readings out
//!
//! Samples are matched to configured sensors, calibrated, and folded into a bounded
//! per-channel history that yields a rolling average and a rate of change. Consumers
//! read immutable snapshots published over a `watch` channel.

mod error;
pub use error::{Result, TelemetryError};

mod history;
pub use history::ChannelHistory;

mod feedback;
pub use feedback::{decode_feedback, ActuatorFeedback, FeedbackKind};

mod pipeline;
pub use pipeline::{PipelineConfig, SensorReading, TelemetryPipeline, TelemetrySnapshot};

mod worker;
pub use worker::{
    spawn_ingest_worker, BoxedRecorder, IngestWorker, SampleSender, SnapshotReader,
    TelemetryMessage, WorkerOptions,
};

mod recorder;
pub use recorder::{record_file_name, SnapshotRecorder};
