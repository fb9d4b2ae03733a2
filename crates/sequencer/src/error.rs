use command_compiler::CompileError;
use command_transport::TransportError;
use thiserror::Error;

pub type Result<T, E = SequenceError> = core::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum SequenceError {
    #[error("{kind} '{name}' has no default state configured")]
    MissingDefaultState { kind: &'static str, name: String },
    #[error("cannot plan {kind} '{name}': {source}")]
    Actuator {
        kind: &'static str,
        name: String,
        #[source]
        source: CompileError,
    },
    #[error("step {index} ({step}) failed: {source}")]
    StepFailed {
        index: usize,
        step: String,
        #[source]
        source: TransportError,
    },
    #[error("sequence task aborted: {0}")]
    Aborted(String),
}
