use crate::{CommandPublisher, LowLevelCommand, Result, SampleBatch, SampleSource, TransportError};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// A simple in-process mock transport. Clones share the same command log and sample queue.
#[derive(Clone, Default)]
pub struct MockBus {
    published: Arc<Mutex<Vec<LowLevelCommand>>>,
    pending: Arc<Mutex<VecDeque<SampleBatch>>>,
    fail_after: Option<usize>,
}

impl MockBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every publish after the first `n` fail with an I/O error.
    pub fn failing_after(mut self, n: usize) -> Self {
        self.fail_after = Some(n);
        self
    }

    /// Queue a batch for a later `recv`.
    pub fn push_batch(&self, batch: SampleBatch) {
        if let Ok(mut q) = self.pending.lock() {
            q.push_back(batch);
        }
    }

    /// Snapshot of everything published so far, in order.
    pub fn published(&self) -> Vec<LowLevelCommand> {
        self.published
            .lock()
            .map(|log| log.clone())
            .unwrap_or_default()
    }
}

impl CommandPublisher for MockBus {
    fn publish(&mut self, command: &LowLevelCommand) -> Result<()> {
        let mut log = self
            .published
            .lock()
            .map_err(|_| TransportError::Io("mock log poisoned".into()))?;
        if let Some(limit) = self.fail_after {
            if log.len() >= limit {
                return Err(TransportError::Io("mock publish failure".into()));
            }
        }
        tracing::trace!(%command, "mock publish");
        log.push(command.clone());
        Ok(())
    }
}

impl SampleSource for MockBus {
    fn recv(&mut self, _timeout_ms: Option<u64>) -> Result<SampleBatch> {
        self.try_recv()
    }

    fn try_recv(&mut self) -> Result<SampleBatch> {
        let mut q = self
            .pending
            .lock()
            .map_err(|_| TransportError::Io("mock queue poisoned".into()))?;
        q.pop_front().ok_or(TransportError::Timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BinaryState, RawSample};

    #[test]
    fn clones_share_the_log() {
        let bus = MockBus::new();
        let mut publisher = bus.clone();
        publisher
            .publish(&LowLevelCommand::relay(1, BinaryState::Low))
            .unwrap();
        assert_eq!(bus.published().len(), 1);
    }

    #[test]
    fn recv_drains_then_times_out() {
        let mut bus = MockBus::new();
        bus.push_batch(SampleBatch::from_samples(vec![RawSample {
            hat: 0,
            channel: 0,
            value: 1.0,
            timestamp: 0.0,
        }]));
        assert_eq!(bus.recv(None).unwrap().sensors.len(), 1);
        assert!(matches!(bus.recv(None), Err(TransportError::Timeout)));
    }

    #[test]
    fn failing_after_limit() {
        let mut bus = MockBus::new().failing_after(1);
        assert!(bus.publish(&LowLevelCommand::servo(0, 10.0)).is_ok());
        assert!(bus.publish(&LowLevelCommand::servo(0, 20.0)).is_err());
    }
}
