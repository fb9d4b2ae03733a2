use command_transport::{RelayReport, ServoReport};
use device_registry::DeviceRegistry;
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedbackKind {
    Relay,
    Servo,
}

/// Decoded actuator status as reported by the hardware.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ActuatorFeedback {
    pub name: String,
    pub kind: FeedbackKind,
    pub channel: u16,
    pub state: String,
}

/// Decode relay and servo reports against the registry; unknown channels are skipped.
pub fn decode_feedback(
    registry: &DeviceRegistry,
    relays: &[RelayReport],
    servos: &[ServoReport],
) -> Vec<ActuatorFeedback> {
    let mut out = Vec::with_capacity(relays.len() + servos.len());
    for report in relays {
        let Some(spec) = registry.relay_by_channel(report.channel) else {
            debug!(channel = report.channel, "relay report for unconfigured channel");
            continue;
        };
        let state = if report.state != 0 { "on" } else { "off" };
        out.push(ActuatorFeedback {
            name: spec.name.clone(),
            kind: FeedbackKind::Relay,
            channel: report.channel,
            state: state.into(),
        });
    }
    for report in servos {
        let Some(spec) = registry.servo_by_channel(report.channel) else {
            debug!(channel = report.channel, "servo report for unconfigured channel");
            continue;
        };
        let state = if report.angle == spec.open_angle {
            "open"
        } else {
            "closed"
        };
        out.push(ActuatorFeedback {
            name: spec.name.clone(),
            kind: FeedbackKind::Servo,
            channel: report.channel,
            state: state.into(),
        });
    }
    out
}
