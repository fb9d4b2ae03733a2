//! sequencer: ordered, paced bulk actuator moves
//!
//! This crate builds rest-state plans for the whole stand and executes them:
//! - Plans are pure data (commands interleaved with explicit waits)
//! - Power-gated actuators are powered, moved, allowed to settle, then unpowered
//! - Runs execute on their own task and can be cancelled between steps

mod error;
pub use error::{Result, SequenceError};

mod plan;
pub use plan::{all_to_rest_state, all_to_rest_state_with, RestMode, SequencerConfig, Step};

#[cfg(feature = "runner")]
mod runner;
#[cfg(feature = "runner")]
pub use runner::{RunHandle, RunOutcome, RunReport, SequenceRunner};
