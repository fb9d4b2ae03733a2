//! command-transport: records that cross the test-stand transport boundary
//!
//! This crate provides the structured command and sample records exchanged with the
//! publish/subscribe transport, plus the traits transport backends implement. The
//! default build enables a `mock` backend so that binaries and tests run on any host
//! without a broker.

mod types;
pub use types::{BinaryState, LowLevelCommand, RawSample, RelayReport, SampleBatch, ServoReport};

mod error;
pub use error::{Result, TransportError};

mod traits;
pub use traits::{CommandPublisher, SampleSource};

mod jsonl;
pub use jsonl::{JsonLinesPublisher, JsonLinesSource};

#[cfg(feature = "mock")]
mod mock;

#[cfg(feature = "mock")]
pub use mock::MockBus;
