use thiserror::Error;

pub type Result<T, E = ConfigError> = core::result::Result<T, E>;

/// Registry load/validation failure. A failed reload leaves the previous registry active.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("missing required section: {0}")]
    MissingSection(&'static str),
    #[error("{section}[{index}] is missing required field `{field}`")]
    MissingField {
        section: &'static str,
        index: usize,
        field: &'static str,
    },
    #[error("{section} '{name}': invalid {field} `{value}`")]
    InvalidValue {
        section: &'static str,
        name: String,
        field: &'static str,
        value: String,
    },
    #[error("{section}: address {key} used by both '{first}' and '{second}'")]
    DuplicateAddress {
        section: &'static str,
        key: u16,
        first: String,
        second: String,
    },
    #[error("{section}: name '{name}' is used more than once")]
    DuplicateName { section: &'static str, name: String },
    #[error("sensor not found: {0}")]
    SensorNotFound(String),
}

/// Degenerate calibration fit. Callers fall back to the identity transform.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CalibrationError {
    #[error("degree {degree} fit needs at least {needed} points, got {got}")]
    InsufficientPoints {
        degree: usize,
        needed: usize,
        got: usize,
    },
    #[error("calibration degree must be at least 1")]
    ZeroDegree,
    #[error("calibration points are degenerate (singular system)")]
    Singular,
    #[error("calibration produced non-finite coefficients")]
    NonFinite,
}
