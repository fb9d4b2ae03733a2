use std::io::Write;
use std::sync::Arc;

use command_transport::SampleBatch;
use device_registry::{RegistryHandle, StandMetrics};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::{Result, SnapshotRecorder, TelemetryError, TelemetryPipeline, TelemetrySnapshot};

/// Recorder type the ingest worker can own.
pub type BoxedRecorder = SnapshotRecorder<Box<dyn Write + Send>>;

/// Messages accepted by the ingest worker.
#[derive(Debug, Clone)]
pub enum TelemetryMessage {
    Samples(SampleBatch),
    SetCalibration(bool),
}

/// Producer side of the ingest queue. Never blocks.
#[derive(Clone)]
pub struct SampleSender {
    tx: mpsc::Sender<TelemetryMessage>,
    metrics: Option<StandMetrics>,
}

impl SampleSender {
    /// Enqueue a batch; a full queue drops it with a warning.
    pub fn try_submit(&self, batch: SampleBatch) -> Result<()> {
        self.try_send(TelemetryMessage::Samples(batch))
    }

    pub fn set_calibration(&self, enabled: bool) -> Result<()> {
        self.try_send(TelemetryMessage::SetCalibration(enabled))
    }

    fn try_send(&self, msg: TelemetryMessage) -> Result<()> {
        match self.tx.try_send(msg) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!("ingest queue full, dropping message");
                if let Some(m) = &self.metrics {
                    m.batches_dropped.inc();
                }
                Err(TelemetryError::QueueFull)
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(TelemetryError::Closed),
        }
    }
}

/// Read side of the snapshot channel; every value is a complete snapshot.
#[derive(Clone)]
pub struct SnapshotReader {
    rx: watch::Receiver<Arc<TelemetrySnapshot>>,
}

impl SnapshotReader {
    pub fn current(&self) -> Arc<TelemetrySnapshot> {
        Arc::clone(&self.rx.borrow())
    }

    /// Wait for a snapshot newer than the last one seen through this reader.
    pub async fn changed(&mut self) -> Result<Arc<TelemetrySnapshot>> {
        self.rx.changed().await.map_err(|_| TelemetryError::Closed)?;
        Ok(Arc::clone(&self.rx.borrow_and_update()))
    }
}

/// Knobs for [`spawn_ingest_worker`].
pub struct WorkerOptions {
    pub queue_depth: usize,
    pub metrics: Option<StandMetrics>,
    /// Receives one row per processed sample batch.
    pub recorder: Option<BoxedRecorder>,
}

impl Default for WorkerOptions {
    fn default() -> Self {
        Self {
            queue_depth: 256,
            metrics: None,
            recorder: None,
        }
    }
}

/// A running ingest worker.
pub struct IngestWorker {
    pub sender: SampleSender,
    pub snapshots: SnapshotReader,
    task: JoinHandle<(TelemetryPipeline, Option<BoxedRecorder>)>,
}

impl IngestWorker {
    /// Close the queue and wait for the worker to drain it. Returns the pipeline and
    /// the flushed recorder, if one was attached.
    pub async fn shutdown(self) -> Result<(TelemetryPipeline, Option<BoxedRecorder>)> {
        let IngestWorker {
            sender,
            snapshots,
            task,
        } = self;
        drop(sender);
        drop(snapshots);
        task.await.map_err(|e| {
            warn!(error = %e, "ingest worker task failed");
            TelemetryError::Closed
        })
    }
}

/// Spawn the consumer task. Each message is processed against the registry current
/// at the time it is dequeued.
pub fn spawn_ingest_worker(
    registry: RegistryHandle,
    pipeline: TelemetryPipeline,
    options: WorkerOptions,
) -> IngestWorker {
    let WorkerOptions {
        queue_depth,
        metrics,
        mut recorder,
    } = options;
    let (tx, mut rx) = mpsc::channel(queue_depth.max(1));
    let (snap_tx, snap_rx) = watch::channel(Arc::new(pipeline.snapshot()));
    let task = tokio::spawn(async move {
        let mut pipeline = pipeline;
        let mut active = registry.current();
        let mut recording = recorder.is_some();
        info!(recording, "ingest worker started");
        while let Some(msg) = rx.recv().await {
            let current = registry.current();
            if !Arc::ptr_eq(&current, &active) {
                debug!("registry changed, pruning telemetry state");
                pipeline.retain_configured(&current);
                active = current;
            }
            let snapshot = match msg {
                TelemetryMessage::Samples(batch) => {
                    let snapshot = pipeline.ingest_batch(&active, &batch);
                    if let (true, Some(rec)) = (recording, recorder.as_mut()) {
                        if let Err(e) = rec.record(&snapshot) {
                            error!(error = %e, "recording failed, no further rows will be written");
                            recording = false;
                        }
                    }
                    snapshot
                }
                TelemetryMessage::SetCalibration(enabled) => {
                    pipeline.set_calibration_enabled(enabled);
                    pipeline.snapshot()
                }
            };
            snap_tx.send_replace(Arc::new(snapshot));
        }
        if let Some(rec) = recorder.as_mut() {
            if let Err(e) = rec.flush() {
                error!(error = %e, "flushing recording failed");
            }
            info!(rows = rec.rows(), "recording closed");
        }
        info!("ingest worker stopped");
        (pipeline, recorder)
    });
    IngestWorker {
        sender: SampleSender { tx, metrics },
        snapshots: SnapshotReader { rx: snap_rx },
        task,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use command_transport::RawSample;
    use device_registry::{DeviceRegistry, MetricsHub, StandConfig};

    fn handle() -> RegistryHandle {
        let cfg: StandConfig = serde_yaml::from_str(
            r#"
sensors:
  - { hat: 0, channel: 2, name: PT1, unit: psi, calibration: [[0, 0], [10, 100]], degree: 1 }
relays: []
servos: []
"#,
        )
        .unwrap();
        RegistryHandle::new(DeviceRegistry::load(&cfg).unwrap())
    }

    fn options(queue_depth: usize) -> WorkerOptions {
        WorkerOptions {
            queue_depth,
            ..WorkerOptions::default()
        }
    }

    fn batch(value: f64, timestamp: f64) -> SampleBatch {
        SampleBatch::from_samples(vec![RawSample {
            hat: 0,
            channel: 2,
            value,
            timestamp,
        }])
    }

    #[tokio::test]
    async fn publishes_snapshots_in_order() -> anyhow::Result<()> {
        let mut worker = spawn_ingest_worker(handle(), TelemetryPipeline::default(), options(8));
        worker.sender.try_submit(batch(1.0, 0.0))?;
        let first = worker.snapshots.changed().await?;
        assert_eq!(first.sequence, 1);
        worker.sender.try_submit(batch(2.0, 1.0))?;
        let second = worker.snapshots.changed().await?;
        assert_eq!(second.sequence, 2);
        let reading = second.sensor("PT1").unwrap();
        assert!((reading.value - 20.0).abs() < 1e-9);
        assert!((reading.rate.unwrap() - 10.0).abs() < 1e-9);

        let (pipeline, recorder) = worker.shutdown().await?;
        assert_eq!(pipeline.snapshot().sequence, 2);
        assert!(recorder.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn full_queue_drops_without_blocking() {
        let hub = MetricsHub::new().unwrap();
        let (tx, _rx) = mpsc::channel(1);
        let sender = SampleSender {
            tx,
            metrics: Some(hub.stand.clone()),
        };
        sender.try_submit(batch(1.0, 0.0)).unwrap();
        assert!(matches!(
            sender.try_submit(batch(2.0, 1.0)),
            Err(TelemetryError::QueueFull)
        ));
        assert_eq!(hub.stand.batches_dropped.get(), 1);
    }

    #[tokio::test]
    async fn calibration_toggle_travels_through_the_queue() -> anyhow::Result<()> {
        let mut worker = spawn_ingest_worker(handle(), TelemetryPipeline::default(), options(8));
        worker.sender.set_calibration(false)?;
        worker.snapshots.changed().await?;
        worker.sender.try_submit(batch(3.0, 0.0))?;
        let snap = worker.snapshots.changed().await?;
        assert_eq!(snap.sensor("PT1").unwrap().value, 3.0);
        worker.shutdown().await?;
        Ok(())
    }

    #[tokio::test]
    async fn registry_swap_prunes_removed_sensors() -> anyhow::Result<()> {
        let registry = handle();
        let mut worker =
            spawn_ingest_worker(registry.clone(), TelemetryPipeline::default(), options(8));
        worker.sender.try_submit(batch(1.0, 0.0))?;
        assert_eq!(worker.snapshots.changed().await?.sensors.len(), 1);

        let empty: StandConfig = serde_yaml::from_str("sensors: []\nrelays: []\nservos: []\n")?;
        registry.reload(&empty)?;
        worker.sender.try_submit(batch(1.0, 1.0))?;
        assert!(worker.snapshots.changed().await?.sensors.is_empty());
        worker.shutdown().await?;
        Ok(())
    }

    #[tokio::test]
    async fn records_one_row_per_batch() -> anyhow::Result<()> {
        let registry = handle();
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("run.csv");
        let file: Box<dyn Write + Send> = Box::new(std::fs::File::create(&path)?);
        let recorder = SnapshotRecorder::new(file, &registry.current())?;
        let worker = spawn_ingest_worker(
            registry,
            TelemetryPipeline::default(),
            WorkerOptions {
                queue_depth: 256,
                metrics: None,
                recorder: Some(recorder),
            },
        );

        // Submitted back to back, so most snapshots are overwritten in the watch
        // channel before anyone reads them.
        for i in 0..100 {
            worker.sender.try_submit(batch(i as f64, i as f64))?;
        }
        worker.sender.set_calibration(false)?;
        let (pipeline, recorder) = worker.shutdown().await?;
        assert_eq!(pipeline.snapshot().sequence, 100);
        assert_eq!(recorder.map(|r| r.rows()), Some(100));

        let mut reader = csv::Reader::from_path(&path)?;
        assert_eq!(reader.records().count(), 100);
        Ok(())
    }
}
