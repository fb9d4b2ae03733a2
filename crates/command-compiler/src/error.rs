use thiserror::Error;

use crate::ActuatorKind;

pub type Result<T, E = CompileError> = core::result::Result<T, E>;

/// Why an intent could not be turned into hardware commands.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CompileError {
    #[error("intent is missing `{0}`")]
    MissingField(&'static str),
    #[error("unknown actuator type: {0}")]
    UnknownKind(String),
    #[error("unknown state: {0}")]
    UnknownState(String),
    #[error("{kind} '{name}' not found in config")]
    DeviceNotFound { kind: ActuatorKind, name: String },
    #[error("state '{state}' is not valid for {kind} (expected one of: {allowed})")]
    IllegalState {
        kind: ActuatorKind,
        state: String,
        allowed: String,
    },
    #[error("{kind} '{name}' has no {attribute} configured")]
    MissingAttribute {
        kind: ActuatorKind,
        name: String,
        attribute: &'static str,
    },
    #[error("malformed intent: {0}")]
    Malformed(String),
}
