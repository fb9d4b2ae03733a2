use core::fmt;
use std::time::Duration;

use command_compiler::{
    gated_relay_state, gpio_level, powered_relay_state, servo_commands, solenoid_command,
};
use command_transport::LowLevelCommand;
use device_registry::{
    DeviceRegistry, GpioSpec, PowerState, RelayRole, RelaySpec, ServoSpec, ValveState,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{Result, SequenceError};

/// Which rest state a bulk run drives the stand to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RestMode {
    /// Every valve closed, every powered device off.
    Closed,
    /// Every actuator to its configured `default_state`.
    Default,
}

/// One element of a plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "lowercase")]
pub enum Step {
    Command(LowLevelCommand),
    Wait {
        #[serde(with = "millis")]
        duration: Duration,
    },
}

impl Step {
    pub fn command(&self) -> Option<&LowLevelCommand> {
        match self {
            Step::Command(c) => Some(c),
            Step::Wait { .. } => None,
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::Command(c) => write!(f, "{c}"),
            Step::Wait { duration } => write!(f, "wait {}ms", duration.as_millis()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequencerConfig {
    /// Wait between powering a gated actuator, moving it, and unpowering it.
    pub settle_wait: Duration,
    /// Delay after every published command so the broker is not flooded.
    pub command_spacing: Duration,
}

impl Default for SequencerConfig {
    fn default() -> Self {
        Self {
            settle_wait: Duration::from_secs(2),
            command_spacing: Duration::from_millis(100),
        }
    }
}

/// Plan a bulk move of every actuator to its rest state with default pacing.
pub fn all_to_rest_state(mode: RestMode, registry: &DeviceRegistry) -> Result<Vec<Step>> {
    all_to_rest_state_with(mode, registry, &SequencerConfig::default())
}

/// Plan a bulk move. Either the whole plan is built or nothing is.
pub fn all_to_rest_state_with(
    mode: RestMode,
    registry: &DeviceRegistry,
    config: &SequencerConfig,
) -> Result<Vec<Step>> {
    let mut steps = Vec::new();
    for servo in registry.servos() {
        plan_servo(&mut steps, servo, mode, config)?;
    }
    if mode == RestMode::Default {
        for gpio in registry.gpios() {
            plan_gpio(&mut steps, gpio, config)?;
        }
    }
    for relay in registry.relays() {
        plan_relay(&mut steps, relay, mode)?;
    }
    debug!(?mode, steps = steps.len(), "rest-state plan built");
    Ok(steps)
}

fn plan_servo(
    steps: &mut Vec<Step>,
    servo: &ServoSpec,
    mode: RestMode,
    config: &SequencerConfig,
) -> Result<()> {
    let position = match mode {
        RestMode::Closed => ValveState::Closed,
        RestMode::Default => servo
            .default_state
            .ok_or_else(|| SequenceError::MissingDefaultState {
                kind: "servo",
                name: servo.name.clone(),
            })?,
    };
    let moves = servo_commands(servo, position);
    push_gated(steps, servo.relay, moves, config);
    Ok(())
}

fn plan_gpio(steps: &mut Vec<Step>, gpio: &GpioSpec, config: &SequencerConfig) -> Result<()> {
    let arm = gpio
        .default_state
        .ok_or_else(|| SequenceError::MissingDefaultState {
            kind: "gpio",
            name: gpio.name.clone(),
        })?;
    let set = vec![LowLevelCommand::gpio(gpio.pin, gpio_level(arm))];
    push_gated(steps, gpio.relay, set, config);
    Ok(())
}

fn plan_relay(steps: &mut Vec<Step>, relay: &RelaySpec, mode: RestMode) -> Result<()> {
    let command = match relay.role {
        RelayRole::Solenoid { default_state, .. } => {
            let valve = match mode {
                RestMode::Closed => ValveState::Closed,
                RestMode::Default => {
                    default_state.ok_or_else(|| SequenceError::MissingDefaultState {
                        kind: "solenoid",
                        name: relay.name.clone(),
                    })?
                }
            };
            solenoid_command(relay, valve).map_err(|source| SequenceError::Actuator {
                kind: "solenoid",
                name: relay.name.clone(),
                source,
            })?
        }
        RelayRole::PoweredDevice { default_state } => {
            let power = match mode {
                RestMode::Closed => PowerState::Off,
                RestMode::Default => {
                    default_state.ok_or_else(|| SequenceError::MissingDefaultState {
                        kind: "poweredDevice",
                        name: relay.name.clone(),
                    })?
                }
            };
            LowLevelCommand::relay(relay.channel, powered_relay_state(relay.polarity, power))
        }
        RelayRole::Unassigned => return Ok(()),
    };
    steps.push(Step::Command(command));
    Ok(())
}

/// Power on, wait, run `moves`, wait, power off. Ungated actuators just run `moves`.
fn push_gated(
    steps: &mut Vec<Step>,
    relay: Option<u16>,
    moves: Vec<LowLevelCommand>,
    config: &SequencerConfig,
) {
    match relay {
        Some(channel) => {
            steps.push(Step::Command(LowLevelCommand::relay(
                channel,
                gated_relay_state(PowerState::On),
            )));
            steps.push(Step::Wait {
                duration: config.settle_wait,
            });
            steps.extend(moves.into_iter().map(Step::Command));
            steps.push(Step::Wait {
                duration: config.settle_wait,
            });
            steps.push(Step::Command(LowLevelCommand::relay(
                channel,
                gated_relay_state(PowerState::Off),
            )));
        }
        None => steps.extend(moves.into_iter().map(Step::Command)),
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use command_transport::BinaryState::{High, Low};
    use device_registry::StandConfig;

    const STAND_YAML: &str = r#"
sensors: []
relays:
  - { channel: 2, name: SVFTV, relay_type: NO, actuator_type: solenoid, solenoid_type: NC, default_state: open }
  - { channel: 3, name: SVGSD, relay_type: NC, actuator_type: solenoid, solenoid_type: NO, default_state: closed }
  - { channel: 4, name: HEATER, relay_type: NC, actuator_type: poweredDevice, default_state: "on" }
  - { channel: 7, name: SERVO_PWR, relay_type: NO }
servos:
  - { channel: 0, name: BVGSO, open_pos: 90, close_pos: 5, close_over: 0, relay_id: 7, default_state: open }
  - { channel: 1, name: MFV, open_pos: 120, close_pos: 10, default_state: closed }
gpios:
  - { pin: 17, name: IGNITER, relay_id: 8, default_state: disarmed }
"#;

    fn registry_from(yaml: &str) -> DeviceRegistry {
        let cfg: StandConfig = serde_yaml::from_str(yaml).unwrap();
        DeviceRegistry::load(&cfg).unwrap()
    }

    fn quick() -> SequencerConfig {
        SequencerConfig {
            settle_wait: Duration::from_millis(5),
            command_spacing: Duration::ZERO,
        }
    }

    fn wait() -> Step {
        Step::Wait {
            duration: Duration::from_millis(5),
        }
    }

    fn cmd(c: LowLevelCommand) -> Step {
        Step::Command(c)
    }

    #[test]
    fn closed_plan_orders_servos_then_relays() {
        let reg = registry_from(STAND_YAML);
        let steps = all_to_rest_state_with(RestMode::Closed, &reg, &quick()).unwrap();
        assert_eq!(
            steps,
            vec![
                cmd(LowLevelCommand::relay(7, Low)),
                wait(),
                cmd(LowLevelCommand::servo(0, 0.0)),
                cmd(LowLevelCommand::servo(0, 5.0)),
                wait(),
                cmd(LowLevelCommand::relay(7, High)),
                cmd(LowLevelCommand::servo(1, 10.0)),
                // SVFTV closed: solenoid NC, relay NO
                cmd(LowLevelCommand::relay(2, Low)),
                // SVGSD closed: solenoid NO, relay NC
                cmd(LowLevelCommand::relay(3, Low)),
                // HEATER off on an NC relay
                cmd(LowLevelCommand::relay(4, Low)),
            ]
        );
    }

    #[test]
    fn default_plan_includes_gpios_and_defaults() {
        let reg = registry_from(STAND_YAML);
        let steps = all_to_rest_state_with(RestMode::Default, &reg, &quick()).unwrap();
        let commands: Vec<&LowLevelCommand> = steps.iter().filter_map(Step::command).collect();
        assert_eq!(commands[1], &LowLevelCommand::servo(0, 90.0));
        assert!(commands.contains(&&LowLevelCommand::gpio(17, Low)));
        // SVFTV default open: solenoid NC, relay NO
        assert!(commands.contains(&&LowLevelCommand::relay(2, High)));
        // HEATER default on with NC relay
        assert!(commands.contains(&&LowLevelCommand::relay(4, High)));
        assert_eq!(steps.iter().filter(|s| s.command().is_none()).count(), 4);
    }

    #[test]
    fn default_plan_fails_without_default_state() {
        let yaml = STAND_YAML.replace(
            "{ channel: 1, name: MFV, open_pos: 120, close_pos: 10, default_state: closed }",
            "{ channel: 1, name: MFV, open_pos: 120, close_pos: 10 }",
        );
        let reg = registry_from(&yaml);
        let err = all_to_rest_state(RestMode::Default, &reg).unwrap_err();
        match err {
            SequenceError::MissingDefaultState { kind, name } => {
                assert_eq!((kind, name.as_str()), ("servo", "MFV"));
            }
            other => panic!("unexpected error: {other}"),
        }
        // Closed mode does not need defaults.
        assert!(all_to_rest_state(RestMode::Closed, &reg).is_ok());
    }

    #[test]
    fn untyped_solenoid_is_reported() {
        let reg = registry_from(
            r#"
sensors: []
relays: [{ channel: 1, name: SV, relay_type: NO, actuator_type: solenoid }]
servos: []
"#,
        );
        assert!(matches!(
            all_to_rest_state(RestMode::Closed, &reg),
            Err(SequenceError::Actuator { kind: "solenoid", .. })
        ));
    }

    #[test]
    fn steps_serialize_with_millisecond_waits() {
        let json = serde_json::to_value(wait()).unwrap();
        assert_eq!(json, serde_json::json!({"step": "wait", "duration": 5}));
    }
}
