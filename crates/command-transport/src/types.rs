use core::fmt;
use serde::{Deserialize, Serialize};

/// Logic level driven onto a relay coil or GPIO pin.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum BinaryState {
    Low,
    High,
}

impl BinaryState {
    pub fn from_bit(bit: bool) -> Self {
        if bit {
            BinaryState::High
        } else {
            BinaryState::Low
        }
    }

    pub fn bit(self) -> u8 {
        match self {
            BinaryState::Low => 0,
            BinaryState::High => 1,
        }
    }

    pub fn inverted(self) -> Self {
        match self {
            BinaryState::Low => BinaryState::High,
            BinaryState::High => BinaryState::Low,
        }
    }
}

impl From<BinaryState> for u8 {
    fn from(s: BinaryState) -> u8 {
        s.bit()
    }
}

impl TryFrom<u8> for BinaryState {
    type Error = String;

    fn try_from(v: u8) -> Result<Self, Self::Error> {
        match v {
            0 => Ok(BinaryState::Low),
            1 => Ok(BinaryState::High),
            other => Err(format!("binary state must be 0 or 1, got {other}")),
        }
    }
}

impl fmt::Display for BinaryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.bit())
    }
}

/// A hardware-level command addressed to one physical output.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum LowLevelCommand {
    Relay { channel: u16, state: BinaryState },
    Servo { channel: u16, angle: f64 },
    Gpio { pin: u16, state: BinaryState },
}

impl LowLevelCommand {
    pub fn relay(channel: u16, state: BinaryState) -> Self {
        LowLevelCommand::Relay { channel, state }
    }

    pub fn servo(channel: u16, angle: f64) -> Self {
        LowLevelCommand::Servo { channel, angle }
    }

    pub fn gpio(pin: u16, state: BinaryState) -> Self {
        LowLevelCommand::Gpio { pin, state }
    }
}

impl fmt::Display for LowLevelCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LowLevelCommand::Relay { channel, state } => write!(f, "relay[{channel}] <- {state}"),
            LowLevelCommand::Servo { channel, angle } => write!(f, "servo[{channel}] <- {angle}°"),
            LowLevelCommand::Gpio { pin, state } => write!(f, "gpio[{pin}] <- {state}"),
        }
    }
}

/// One multiplexed analog sample as delivered by the DAQ hats.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RawSample {
    #[serde(alias = "hat_id", alias = "hatID")]
    pub hat: u8,
    #[serde(alias = "channel_id", alias = "channelID")]
    pub channel: u8,
    pub value: f64,
    pub timestamp: f64,
}

/// Reported coil state of a relay channel.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RelayReport {
    #[serde(alias = "id")]
    pub channel: u16,
    pub state: u8,
}

/// Reported angle of a servo channel.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ServoReport {
    #[serde(alias = "id")]
    pub channel: u16,
    #[serde(alias = "state")]
    pub angle: f64,
}

/// One telemetry message: sensor samples plus optional actuator feedback.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SampleBatch {
    #[serde(default)]
    pub sensors: Vec<RawSample>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub relays: Vec<RelayReport>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub servos: Vec<ServoReport>,
}

impl SampleBatch {
    pub fn from_samples(sensors: Vec<RawSample>) -> Self {
        Self {
            sensors,
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.sensors.is_empty() && self.relays.is_empty() && self.servos.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_wire_shape() {
        let cmd = LowLevelCommand::relay(3, BinaryState::High);
        let v = serde_json::to_value(&cmd).unwrap();
        assert_eq!(v, serde_json::json!({"type": "relay", "channel": 3, "state": 1}));

        let back: LowLevelCommand =
            serde_json::from_str(r#"{"type":"gpio","pin":17,"state":0}"#).unwrap();
        assert_eq!(back, LowLevelCommand::gpio(17, BinaryState::Low));
    }

    #[test]
    fn binary_state_rejects_out_of_range() {
        let bad = serde_json::from_str::<LowLevelCommand>(r#"{"type":"relay","channel":1,"state":2}"#);
        assert!(bad.is_err());
    }

    #[test]
    fn sample_accepts_legacy_keys() {
        let s: RawSample =
            serde_json::from_str(r#"{"hat_id":1,"channel_id":4,"value":2.5,"timestamp":10.0}"#)
                .unwrap();
        assert_eq!((s.hat, s.channel), (1, 4));
    }
}
