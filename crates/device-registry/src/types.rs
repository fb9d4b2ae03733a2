use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// Device configuration as read from the stand's YAML file.
///
/// Every field is optional at this layer so that validation in
/// [`DeviceRegistry::load`](crate::DeviceRegistry::load) can report exactly what is missing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
pub struct StandConfig {
    #[serde(default, alias = "MCCDAQ", skip_serializing_if = "Option::is_none")]
    pub sensors: Option<Vec<SensorConfig>>,
    #[serde(default, alias = "relayBoard", skip_serializing_if = "Option::is_none")]
    pub relays: Option<Vec<RelayConfig>>,
    #[serde(default, alias = "PCA9685", skip_serializing_if = "Option::is_none")]
    pub servos: Option<Vec<ServoConfig>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gpios: Option<Vec<GpioConfig>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
pub struct SensorConfig {
    #[serde(default, alias = "hatID", alias = "hat_id", skip_serializing_if = "Option::is_none")]
    pub hat: Option<u8>,
    #[serde(
        default,
        alias = "channelID",
        alias = "channelId",
        alias = "channel_id",
        skip_serializing_if = "Option::is_none"
    )]
    pub channel: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    /// `(raw, reference)` control points.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub calibration: Option<Vec<(f64, f64)>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub degree: Option<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
pub struct RelayConfig {
    #[serde(
        default,
        alias = "channelID",
        alias = "channelId",
        alias = "channel_id",
        skip_serializing_if = "Option::is_none"
    )]
    pub channel: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Contact polarity, `NO` or `NC`.
    #[serde(default, alias = "type", skip_serializing_if = "Option::is_none")]
    pub relay_type: Option<String>,
    /// `solenoid`, `poweredDevice` or absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actuator_type: Option<String>,
    /// Valve polarity for solenoid relays, `NO` or `NC`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub solenoid_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_state: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
pub struct ServoConfig {
    #[serde(
        default,
        alias = "channelID",
        alias = "channelId",
        alias = "channel_id",
        skip_serializing_if = "Option::is_none"
    )]
    pub channel: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, alias = "open_angle", skip_serializing_if = "Option::is_none")]
    pub open_pos: Option<f64>,
    #[serde(default, alias = "close_angle", skip_serializing_if = "Option::is_none")]
    pub close_pos: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub open_over: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub close_over: Option<f64>,
    #[serde(default, alias = "relayID", skip_serializing_if = "Option::is_none")]
    pub relay_id: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_state: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
pub struct GpioConfig {
    #[serde(default, alias = "pinID", alias = "pin_id", skip_serializing_if = "Option::is_none")]
    pub pin: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    #[serde(default, alias = "relayID", skip_serializing_if = "Option::is_none")]
    pub relay_id: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_state: Option<String>,
}

impl StandConfig {
    /// Replace the calibration points (and optionally degree) of the named sensor.
    pub fn set_sensor_calibration(
        &mut self,
        name: &str,
        points: Vec<(f64, f64)>,
        degree: Option<usize>,
    ) -> Result<(), ConfigError> {
        let sensor = self
            .sensors
            .iter_mut()
            .flatten()
            .find(|s| s.name.as_deref() == Some(name))
            .ok_or_else(|| ConfigError::SensorNotFound(name.to_string()))?;
        sensor.calibration = if points.is_empty() { None } else { Some(points) };
        if degree.is_some() {
            sensor.degree = degree;
        }
        Ok(())
    }
}
