use crate::{LowLevelCommand, Result, SampleBatch, TransportError};

/// Outbound half of a transport: publishes compiled hardware commands.
pub trait CommandPublisher {
    /// Publish one command. May block until the transport accepts it.
    fn publish(&mut self, command: &LowLevelCommand) -> Result<()>;

    /// Flush anything buffered by the backend.
    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Inbound half of a transport: delivers raw telemetry batches.
pub trait SampleSource {
    /// Receive one batch (blocking with optional timeout in milliseconds).
    fn recv(&mut self, _timeout_ms: Option<u64>) -> Result<SampleBatch>;

    /// Attempt to receive without waiting.
    fn try_recv(&mut self) -> Result<SampleBatch> {
        Err(TransportError::Unsupported("non-blocking receive"))
    }
}

impl<P: CommandPublisher + ?Sized> CommandPublisher for Box<P> {
    fn publish(&mut self, command: &LowLevelCommand) -> Result<()> {
        (**self).publish(command)
    }

    fn flush(&mut self) -> Result<()> {
        (**self).flush()
    }
}
