use std::time::Duration;

use command_transport::CommandPublisher;
use device_registry::StandMetrics;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{Result, SequenceError, SequencerConfig, Step};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    /// Stopped at a step boundary; `next_step` was never started.
    Cancelled { next_step: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub run_id: Uuid,
    pub outcome: RunOutcome,
    pub steps_executed: usize,
    pub commands_published: usize,
}

/// Executes plans on a dedicated tokio task.
pub struct SequenceRunner {
    config: SequencerConfig,
    metrics: Option<StandMetrics>,
}

/// Handle to a running plan.
pub struct RunHandle {
    run_id: Uuid,
    cancel: watch::Sender<bool>,
    task: JoinHandle<Result<RunReport>>,
}

impl SequenceRunner {
    pub fn new(config: SequencerConfig) -> Self {
        Self {
            config,
            metrics: None,
        }
    }

    /// Count every published command in `commands_published`.
    pub fn with_metrics(mut self, metrics: StandMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Start executing `steps` against `publisher`.
    pub fn spawn<P>(&self, steps: Vec<Step>, publisher: P) -> RunHandle
    where
        P: CommandPublisher + Send + 'static,
    {
        let run_id = Uuid::new_v4();
        let (cancel, cancel_rx) = watch::channel(false);
        let pacing = Pacing {
            spacing: self.config.command_spacing,
            metrics: self.metrics.clone(),
        };
        let task = tokio::spawn(execute(run_id, steps, publisher, pacing, cancel_rx));
        RunHandle {
            run_id,
            cancel,
            task,
        }
    }

    /// Execute `steps` on the current task; cancellation arrives through `cancel`.
    pub async fn run<P: CommandPublisher>(
        &self,
        steps: Vec<Step>,
        publisher: P,
        cancel: watch::Receiver<bool>,
    ) -> Result<RunReport> {
        execute(
            Uuid::new_v4(),
            steps,
            publisher,
            Pacing {
                spacing: self.config.command_spacing,
                metrics: self.metrics.clone(),
            },
            cancel,
        )
        .await
    }
}

impl RunHandle {
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Request cancellation. Takes effect before the next step; a step in flight completes.
    pub fn cancel(&self) {
        self.cancel.send_replace(true);
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    pub async fn join(self) -> Result<RunReport> {
        match self.task.await {
            Ok(result) => result,
            Err(e) => Err(SequenceError::Aborted(e.to_string())),
        }
    }
}

struct Pacing {
    spacing: Duration,
    metrics: Option<StandMetrics>,
}

async fn execute<P: CommandPublisher>(
    run_id: Uuid,
    steps: Vec<Step>,
    mut publisher: P,
    pacing: Pacing,
    mut cancel: watch::Receiver<bool>,
) -> Result<RunReport> {
    let Pacing { spacing, metrics } = pacing;
    info!(%run_id, steps = steps.len(), "sequence started");
    let mut report = RunReport {
        run_id,
        outcome: RunOutcome::Completed,
        steps_executed: 0,
        commands_published: 0,
    };

    for (index, step) in steps.iter().enumerate() {
        if *cancel.borrow() {
            warn!(%run_id, next_step = index, "sequence cancelled");
            report.outcome = RunOutcome::Cancelled { next_step: index };
            return Ok(report);
        }
        match step {
            Step::Command(command) => {
                publisher
                    .publish(command)
                    .map_err(|source| SequenceError::StepFailed {
                        index,
                        step: step.to_string(),
                        source,
                    })?;
                report.commands_published += 1;
                if let Some(m) = &metrics {
                    m.commands_published.inc();
                }
                report.steps_executed += 1;
                if !spacing.is_zero() && wait_or_cancel(spacing, &mut cancel).await {
                    report.outcome = RunOutcome::Cancelled {
                        next_step: index + 1,
                    };
                    warn!(%run_id, next_step = index + 1, "sequence cancelled");
                    return Ok(report);
                }
            }
            Step::Wait { duration } => {
                let cancelled = wait_or_cancel(*duration, &mut cancel).await;
                report.steps_executed += 1;
                if cancelled {
                    report.outcome = RunOutcome::Cancelled {
                        next_step: index + 1,
                    };
                    warn!(%run_id, next_step = index + 1, "sequence cancelled during wait");
                    return Ok(report);
                }
            }
        }
    }

    publisher
        .flush()
        .map_err(|source| SequenceError::StepFailed {
            index: steps.len(),
            step: "flush".into(),
            source,
        })?;
    info!(%run_id, commands = report.commands_published, "sequence completed");
    Ok(report)
}

/// Sleep for `duration`; returns true if cancellation was requested meanwhile.
async fn wait_or_cancel(duration: Duration, cancel: &mut watch::Receiver<bool>) -> bool {
    if *cancel.borrow() {
        return true;
    }
    let sleep = tokio::time::sleep(duration);
    tokio::pin!(sleep);
    loop {
        tokio::select! {
            _ = &mut sleep => return *cancel.borrow(),
            changed = cancel.changed() => {
                if changed.is_err() {
                    // Handle dropped: nobody can cancel any more.
                    (&mut sleep).await;
                    return false;
                }
                if *cancel.borrow_and_update() {
                    return true;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use command_transport::{BinaryState, LowLevelCommand, MockBus};

    fn plan(wait: Duration) -> Vec<Step> {
        vec![
            Step::Command(LowLevelCommand::relay(7, BinaryState::Low)),
            Step::Wait { duration: wait },
            Step::Command(LowLevelCommand::servo(0, 90.0)),
            Step::Wait { duration: wait },
            Step::Command(LowLevelCommand::relay(7, BinaryState::High)),
        ]
    }

    fn runner() -> SequenceRunner {
        SequenceRunner::new(SequencerConfig {
            settle_wait: Duration::from_millis(1),
            command_spacing: Duration::ZERO,
        })
    }

    #[tokio::test]
    async fn runs_every_step_in_order() {
        let bus = MockBus::new();
        let handle = runner().spawn(plan(Duration::from_millis(1)), bus.clone());
        let report = handle.join().await.unwrap();
        assert_eq!(report.outcome, RunOutcome::Completed);
        assert_eq!(report.steps_executed, 5);
        assert_eq!(
            bus.published(),
            vec![
                LowLevelCommand::relay(7, BinaryState::Low),
                LowLevelCommand::servo(0, 90.0),
                LowLevelCommand::relay(7, BinaryState::High),
            ]
        );
    }

    #[tokio::test]
    async fn cancel_stops_at_a_step_boundary() {
        let bus = MockBus::new();
        let handle = runner().spawn(plan(Duration::from_secs(30)), bus.clone());
        while bus.published().is_empty() {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        handle.cancel();
        let report = tokio::time::timeout(Duration::from_secs(5), handle.join())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(report.outcome, RunOutcome::Cancelled { next_step: 2 });
        assert_eq!(bus.published().len(), 1);
    }

    #[tokio::test]
    async fn published_commands_are_counted() {
        let hub = device_registry::MetricsHub::new().unwrap();
        let bus = MockBus::new().failing_after(2);
        let handle = runner()
            .with_metrics(hub.stand.clone())
            .spawn(plan(Duration::from_millis(1)), bus.clone());
        assert!(handle.join().await.is_err());
        assert_eq!(hub.stand.commands_published.get(), 2);
    }

    #[tokio::test]
    async fn publish_failure_names_the_step() {
        let bus = MockBus::new().failing_after(1);
        let handle = runner().spawn(plan(Duration::from_millis(1)), bus.clone());
        match handle.join().await {
            Err(SequenceError::StepFailed { index, .. }) => assert_eq!(index, 2),
            other => panic!("unexpected: {other:?}"),
        }
        // The first command stays applied; nothing after the failure was sent.
        assert_eq!(bus.published().len(), 1);
    }

    #[tokio::test]
    async fn run_inline_with_precancelled_receiver() {
        let (tx, rx) = watch::channel(true);
        let bus = MockBus::new();
        let report = runner().run(plan(Duration::ZERO), bus.clone(), rx).await.unwrap();
        drop(tx);
        assert_eq!(report.outcome, RunOutcome::Cancelled { next_step: 0 });
        assert!(bus.published().is_empty());
    }
}
