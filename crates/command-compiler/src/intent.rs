//! Operator intents and their legal state sets

use core::fmt;
use serde::{Deserialize, Serialize};

use crate::{CompileError, Result};

/// Kind of actuator an intent addresses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ActuatorKind {
    /// Relay-driven valve
    Solenoid,
    /// PWM servo, optionally power-gated by a relay
    Servo,
    /// Relay-switched load
    PoweredDevice,
    /// GPIO output line
    GpioDevice,
    /// GPIO output line with a power relay
    PoweredGpioDevice,
}

impl ActuatorKind {
    pub const ALL: [ActuatorKind; 5] = [
        ActuatorKind::Solenoid,
        ActuatorKind::Servo,
        ActuatorKind::PoweredDevice,
        ActuatorKind::GpioDevice,
        ActuatorKind::PoweredGpioDevice,
    ];

    pub fn parse(s: &str) -> Option<Self> {
        let t = s.trim();
        Self::ALL
            .into_iter()
            .find(|k| k.as_str().eq_ignore_ascii_case(t))
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ActuatorKind::Solenoid => "solenoid",
            ActuatorKind::Servo => "servo",
            ActuatorKind::PoweredDevice => "poweredDevice",
            ActuatorKind::GpioDevice => "gpioDevice",
            ActuatorKind::PoweredGpioDevice => "poweredGpioDevice",
        }
    }

    /// States this kind accepts
    pub fn legal_states(&self) -> &'static [RequestedState] {
        use RequestedState::*;
        match self {
            ActuatorKind::Solenoid => &[Open, Closed],
            ActuatorKind::Servo => &[Open, Closed, On, Off],
            ActuatorKind::PoweredDevice => &[On, Off],
            ActuatorKind::GpioDevice | ActuatorKind::PoweredGpioDevice => {
                &[On, Off, Armed, Disarmed]
            }
        }
    }

    pub fn allows(&self, state: RequestedState) -> bool {
        self.legal_states().contains(&state)
    }
}

impl fmt::Display for ActuatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Desired state carried by an intent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestedState {
    Open,
    Closed,
    On,
    Off,
    Armed,
    Disarmed,
}

impl RequestedState {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "open" => Some(RequestedState::Open),
            "closed" | "close" => Some(RequestedState::Closed),
            "on" => Some(RequestedState::On),
            "off" => Some(RequestedState::Off),
            "armed" => Some(RequestedState::Armed),
            "disarmed" => Some(RequestedState::Disarmed),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RequestedState::Open => "open",
            RequestedState::Closed => "closed",
            RequestedState::On => "on",
            RequestedState::Off => "off",
            RequestedState::Armed => "armed",
            RequestedState::Disarmed => "disarmed",
        }
    }
}

impl fmt::Display for RequestedState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A validated operator intent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActuatorIntent {
    /// What kind of actuator is addressed
    #[serde(rename = "type")]
    pub kind: ActuatorKind,
    /// Logical device name from the config
    pub name: String,
    /// Requested state
    pub state: RequestedState,
}

impl ActuatorIntent {
    pub fn new(kind: ActuatorKind, name: impl Into<String>, state: RequestedState) -> Self {
        Self {
            kind,
            name: name.into(),
            state,
        }
    }
}

/// An intent as it arrives from the API, before any validation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntentRequest {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
}

impl IntentRequest {
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| CompileError::Malformed(e.to_string()))
    }
}

impl TryFrom<&IntentRequest> for ActuatorIntent {
    type Error = CompileError;

    fn try_from(req: &IntentRequest) -> Result<Self> {
        let kind_raw = req.kind.as_deref().ok_or(CompileError::MissingField("type"))?;
        let name = req.name.as_deref().ok_or(CompileError::MissingField("name"))?;
        let state_raw = req
            .state
            .as_deref()
            .ok_or(CompileError::MissingField("state"))?;
        if name.trim().is_empty() {
            return Err(CompileError::MissingField("name"));
        }
        let kind = ActuatorKind::parse(kind_raw)
            .ok_or_else(|| CompileError::UnknownKind(kind_raw.to_string()))?;
        let state = RequestedState::parse(state_raw)
            .ok_or_else(|| CompileError::UnknownState(state_raw.to_string()))?;
        Ok(ActuatorIntent::new(kind, name.trim(), state))
    }
}
