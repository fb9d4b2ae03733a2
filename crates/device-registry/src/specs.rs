use core::fmt;
use serde::{Deserialize, Serialize};

use crate::Calibration;

/// Analog channels per DAQ hat; sensor address keys are `hat * 8 + channel`.
pub const CHANNELS_PER_HAT: u8 = 8;

/// Rest state of a contact or valve when unpowered.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum Polarity {
    #[serde(rename = "NO")]
    NormallyOpen,
    #[serde(rename = "NC")]
    NormallyClosed,
}

impl Polarity {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "no" | "normally_open" | "normallyopen" => Some(Polarity::NormallyOpen),
            "nc" | "normally_closed" | "normallyclosed" => Some(Polarity::NormallyClosed),
            _ => None,
        }
    }
}

impl fmt::Display for Polarity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Polarity::NormallyOpen => f.write_str("NO"),
            Polarity::NormallyClosed => f.write_str("NC"),
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValveState {
    Open,
    Closed,
}

impl ValveState {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "open" => Some(ValveState::Open),
            "closed" | "close" => Some(ValveState::Closed),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PowerState {
    On,
    Off,
}

impl PowerState {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "on" => Some(PowerState::On),
            "off" => Some(PowerState::Off),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArmState {
    Armed,
    Disarmed,
}

impl ArmState {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "armed" => Some(ArmState::Armed),
            "disarmed" => Some(ArmState::Disarmed),
            _ => None,
        }
    }
}

/// Physical location of an analog input.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct SensorAddress {
    pub hat: u8,
    pub channel: u8,
}

impl SensorAddress {
    pub fn new(hat: u8, channel: u8) -> Self {
        Self { hat, channel }
    }

    pub fn key(&self) -> u16 {
        u16::from(self.hat) * u16::from(CHANNELS_PER_HAT) + u16::from(self.channel)
    }
}

impl fmt::Display for SensorAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "hat{}:ch{}", self.hat, self.channel)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SensorSpec {
    pub name: String,
    pub address: SensorAddress,
    pub unit: String,
    pub calibration_points: Vec<(f64, f64)>,
    pub degree: usize,
    /// Fitted once at load; identity when no usable points exist.
    pub calibration: Calibration,
}

/// What a relay channel drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayRole {
    Solenoid {
        solenoid_polarity: Option<Polarity>,
        default_state: Option<ValveState>,
    },
    PoweredDevice {
        default_state: Option<PowerState>,
    },
    Unassigned,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RelaySpec {
    pub name: String,
    pub channel: u16,
    pub polarity: Polarity,
    pub role: RelayRole,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ServoSpec {
    pub name: String,
    pub channel: u16,
    pub open_angle: f64,
    pub close_angle: f64,
    pub open_overtravel: Option<f64>,
    pub close_overtravel: Option<f64>,
    /// Relay channel that powers this servo, if gated.
    pub relay: Option<u16>,
    pub default_state: Option<ValveState>,
}

impl ServoSpec {
    /// Resting angle and optional approach angle for a position.
    pub fn angles_for(&self, state: ValveState) -> (f64, Option<f64>) {
        match state {
            ValveState::Open => (self.open_angle, self.open_overtravel),
            ValveState::Closed => (self.close_angle, self.close_overtravel),
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GpioMode {
    Output,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GpioSpec {
    pub name: String,
    pub pin: u16,
    pub mode: GpioMode,
    pub relay: Option<u16>,
    pub default_state: Option<ArmState>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_key_packs_hat_and_channel() {
        assert_eq!(SensorAddress::new(0, 2).key(), 2);
        assert_eq!(SensorAddress::new(1, 0).key(), 8);
        assert_eq!(SensorAddress::new(3, 7).key(), 31);
    }

    #[test]
    fn polarity_parsing_is_lenient() {
        assert_eq!(Polarity::parse("NO"), Some(Polarity::NormallyOpen));
        assert_eq!(Polarity::parse(" nc "), Some(Polarity::NormallyClosed));
        assert_eq!(Polarity::parse("maybe"), None);
    }

    #[test]
    fn servo_angles_follow_direction() {
        let servo = ServoSpec {
            name: "BVGSO".into(),
            channel: 0,
            open_angle: 90.0,
            close_angle: 0.0,
            open_overtravel: Some(95.0),
            close_overtravel: None,
            relay: None,
            default_state: None,
        };
        assert_eq!(servo.angles_for(ValveState::Open), (90.0, Some(95.0)));
        assert_eq!(servo.angles_for(ValveState::Closed), (0.0, None));
    }
}
