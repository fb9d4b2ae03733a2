use thiserror::Error;

pub type Result<T, E = TelemetryError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("ingest queue is full; batch dropped")]
    QueueFull,
    #[error("ingest worker has stopped")]
    Closed,
    #[error("recorder I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("recorder CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("time formatting error: {0}")]
    Format(#[from] time::error::Format),
}
