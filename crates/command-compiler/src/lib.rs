//! Command Compiler for Actuator Intents
//!
//! This crate turns operator-level intents (`{type, name, state}`) into the ordered
//! low-level relay, servo and GPIO commands that realise them, resolving names against
//! the device registry and applying the stand's polarity rules.

mod compile;
mod error;
mod intent;

pub use compile::{
    compile, gated_relay_state, gpio_level, powered_relay_state, servo_commands, solenoid_command,
    solenoid_relay_state,
};
pub use error::{CompileError, Result};
pub use intent::{ActuatorIntent, ActuatorKind, IntentRequest, RequestedState};

use command_transport::LowLevelCommand;
use device_registry::{DeviceRegistry, StandMetrics};

/// Validate a raw API request and compile it
pub fn compile_request(
    request: &IntentRequest,
    registry: &DeviceRegistry,
) -> Result<Vec<LowLevelCommand>> {
    let intent = ActuatorIntent::try_from(request)?;
    compile(&intent, registry)
}

/// Parse a JSON intent and compile it
pub fn compile_json(text: &str, registry: &DeviceRegistry) -> Result<Vec<LowLevelCommand>> {
    let request = IntentRequest::from_json(text)?;
    compile_request(&request, registry)
}

/// Compile a request, counting it in `commands_compiled` or `commands_rejected`.
pub fn compile_request_counted(
    request: &IntentRequest,
    registry: &DeviceRegistry,
    metrics: &StandMetrics,
) -> Result<Vec<LowLevelCommand>> {
    let result = compile_request(request, registry);
    match &result {
        Ok(_) => metrics.commands_compiled.inc(),
        Err(e) => {
            tracing::warn!(error = %e, "intent rejected");
            metrics.commands_rejected.inc();
        }
    }
    result
}
