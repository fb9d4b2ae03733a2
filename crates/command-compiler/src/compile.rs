//! Intent → low-level command translation

use command_transport::{BinaryState, LowLevelCommand};
use device_registry::{
    ArmState, DeviceRegistry, GpioSpec, Polarity, PowerState, RelayRole, RelaySpec, ServoSpec,
    ValveState,
};
use tracing::debug;

use crate::{ActuatorIntent, ActuatorKind, CompileError, RequestedState, Result};

/// Compile one intent into the ordered commands that realise it.
pub fn compile(intent: &ActuatorIntent, registry: &DeviceRegistry) -> Result<Vec<LowLevelCommand>> {
    let not_found = || CompileError::DeviceNotFound {
        kind: intent.kind,
        name: intent.name.clone(),
    };
    let known = match intent.kind {
        ActuatorKind::PoweredDevice | ActuatorKind::Solenoid => {
            registry.relay_by_name(&intent.name).is_some()
        }
        ActuatorKind::Servo => registry.servo_by_name(&intent.name).is_some(),
        ActuatorKind::GpioDevice | ActuatorKind::PoweredGpioDevice => {
            registry.gpio_by_name(&intent.name).is_some()
        }
    };
    if !known {
        return Err(not_found());
    }
    if !intent.kind.allows(intent.state) {
        return Err(CompileError::IllegalState {
            kind: intent.kind,
            state: intent.state.to_string(),
            allowed: intent
                .kind
                .legal_states()
                .iter()
                .map(|s| s.as_str())
                .collect::<Vec<_>>()
                .join(", "),
        });
    }

    let commands = match intent.kind {
        ActuatorKind::PoweredDevice => {
            let relay = registry.relay_by_name(&intent.name).ok_or_else(not_found)?;
            let power = power_state(intent.state)?;
            vec![LowLevelCommand::relay(
                relay.channel,
                powered_relay_state(relay.polarity, power),
            )]
        }
        ActuatorKind::Solenoid => {
            let relay = registry.relay_by_name(&intent.name).ok_or_else(not_found)?;
            let valve = valve_state(intent.state)?;
            vec![solenoid_command(relay, valve)?]
        }
        ActuatorKind::Servo => {
            let servo = registry.servo_by_name(&intent.name).ok_or_else(not_found)?;
            match intent.state {
                RequestedState::On | RequestedState::Off => {
                    let relay = servo.relay.ok_or_else(|| CompileError::MissingAttribute {
                        kind: ActuatorKind::Servo,
                        name: servo.name.clone(),
                        attribute: "relay id",
                    })?;
                    vec![LowLevelCommand::relay(
                        relay,
                        gated_relay_state(power_state(intent.state)?),
                    )]
                }
                _ => servo_commands(servo, valve_state(intent.state)?),
            }
        }
        ActuatorKind::GpioDevice | ActuatorKind::PoweredGpioDevice => {
            let gpio = registry.gpio_by_name(&intent.name).ok_or_else(not_found)?;
            gpio_commands(intent.kind, gpio, intent.state)?
        }
    };

    debug!(
        kind = %intent.kind,
        name = %intent.name,
        state = %intent.state,
        count = commands.len(),
        "compiled intent"
    );
    Ok(commands)
}

/// Relay level for a powered device: 0 when (on, NO) or (off, NC), else 1.
pub fn powered_relay_state(polarity: Polarity, power: PowerState) -> BinaryState {
    match (power, polarity) {
        (PowerState::On, Polarity::NormallyOpen) | (PowerState::Off, Polarity::NormallyClosed) => {
            BinaryState::Low
        }
        _ => BinaryState::High,
    }
}

/// Relay level that puts a solenoid valve into `valve`.
pub fn solenoid_relay_state(
    relay_polarity: Polarity,
    solenoid_polarity: Polarity,
    valve: ValveState,
) -> BinaryState {
    use Polarity::{NormallyClosed as NC, NormallyOpen as NO};
    let open_level = match (solenoid_polarity, relay_polarity) {
        (NO, NO) => BinaryState::Low,
        (NO, NC) => BinaryState::High,
        (NC, NO) => BinaryState::High,
        (NC, NC) => BinaryState::Low,
    };
    match valve {
        ValveState::Open => open_level,
        ValveState::Closed => open_level.inverted(),
    }
}

/// Level for a power-gating relay (servo or GPIO supply): on → 0, off → 1.
pub fn gated_relay_state(power: PowerState) -> BinaryState {
    match power {
        PowerState::On => BinaryState::Low,
        PowerState::Off => BinaryState::High,
    }
}

pub fn gpio_level(arm: ArmState) -> BinaryState {
    match arm {
        ArmState::Armed => BinaryState::High,
        ArmState::Disarmed => BinaryState::Low,
    }
}

/// Servo moves for a position: the overtravel angle first when configured, then the resting angle.
pub fn servo_commands(servo: &ServoSpec, position: ValveState) -> Vec<LowLevelCommand> {
    let (angle, overtravel) = servo.angles_for(position);
    let mut out = Vec::with_capacity(2);
    if let Some(over) = overtravel {
        out.push(LowLevelCommand::servo(servo.channel, over));
    }
    out.push(LowLevelCommand::servo(servo.channel, angle));
    out
}

/// Single relay command driving a solenoid relay to `valve`.
pub fn solenoid_command(relay: &RelaySpec, valve: ValveState) -> Result<LowLevelCommand> {
    let missing = || CompileError::MissingAttribute {
        kind: ActuatorKind::Solenoid,
        name: relay.name.clone(),
        attribute: "solenoid polarity",
    };
    let solenoid_polarity = match relay.role {
        RelayRole::Solenoid {
            solenoid_polarity, ..
        } => solenoid_polarity.ok_or_else(missing)?,
        _ => return Err(missing()),
    };
    Ok(LowLevelCommand::relay(
        relay.channel,
        solenoid_relay_state(relay.polarity, solenoid_polarity, valve),
    ))
}

fn gpio_commands(
    kind: ActuatorKind,
    gpio: &GpioSpec,
    state: RequestedState,
) -> Result<Vec<LowLevelCommand>> {
    match state {
        RequestedState::On | RequestedState::Off => {
            let relay = gpio.relay.ok_or_else(|| CompileError::MissingAttribute {
                kind,
                name: gpio.name.clone(),
                attribute: "relay id",
            })?;
            Ok(vec![LowLevelCommand::relay(
                relay,
                gated_relay_state(power_state(state)?),
            )])
        }
        RequestedState::Armed => Ok(vec![LowLevelCommand::gpio(
            gpio.pin,
            gpio_level(ArmState::Armed),
        )]),
        RequestedState::Disarmed => Ok(vec![LowLevelCommand::gpio(
            gpio.pin,
            gpio_level(ArmState::Disarmed),
        )]),
        other => Err(CompileError::IllegalState {
            kind,
            state: other.to_string(),
            allowed: "on, off, armed, disarmed".into(),
        }),
    }
}

fn power_state(state: RequestedState) -> Result<PowerState> {
    match state {
        RequestedState::On => Ok(PowerState::On),
        RequestedState::Off => Ok(PowerState::Off),
        other => Err(CompileError::UnknownState(other.to_string())),
    }
}

fn valve_state(state: RequestedState) -> Result<ValveState> {
    match state {
        RequestedState::Open => Ok(ValveState::Open),
        RequestedState::Closed => Ok(ValveState::Closed),
        other => Err(CompileError::UnknownState(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use device_registry::StandConfig;

    const STAND_YAML: &str = r#"
sensors: []
relays:
  - { channel: 3, name: SVGSD, relay_type: NC, actuator_type: solenoid, solenoid_type: NO }
  - { channel: 4, name: HEATER_NO, relay_type: NO, actuator_type: poweredDevice }
  - { channel: 5, name: HEATER_NC, relay_type: NC, actuator_type: poweredDevice }
  - { channel: 6, name: SV_UNTYPED, relay_type: NO, actuator_type: solenoid }
servos:
  - { channel: 0, name: BVGSO, open_pos: 90, close_pos: 5, open_over: 97, relay_id: 7 }
  - { channel: 1, name: MFV, open_pos: 120, close_pos: 10 }
gpios:
  - { pin: 17, name: IGNITER, relay_id: 8 }
  - { pin: 18, name: LED }
"#;

    fn registry() -> DeviceRegistry {
        let cfg: StandConfig = serde_yaml::from_str(STAND_YAML).unwrap();
        DeviceRegistry::load(&cfg).unwrap()
    }

    fn run(kind: ActuatorKind, name: &str, state: RequestedState) -> Result<Vec<LowLevelCommand>> {
        compile(&ActuatorIntent::new(kind, name, state), &registry())
    }

    fn relay_level(cmds: &[LowLevelCommand]) -> BinaryState {
        match cmds {
            [LowLevelCommand::Relay { state, .. }] => *state,
            other => panic!("expected one relay command, got {other:?}"),
        }
    }

    #[test]
    fn powered_device_truth_table() {
        use BinaryState::{High, Low};
        let cases = [
            ("HEATER_NO", RequestedState::On, Low),
            ("HEATER_NO", RequestedState::Off, High),
            ("HEATER_NC", RequestedState::On, High),
            ("HEATER_NC", RequestedState::Off, Low),
        ];
        for (name, state, expected) in cases {
            let cmds = run(ActuatorKind::PoweredDevice, name, state).unwrap();
            assert_eq!(cmds.len(), 1);
            assert_eq!(relay_level(&cmds), expected, "{name} {state}");
        }
    }

    #[test]
    fn solenoid_truth_table_covers_all_polarities() {
        use BinaryState::{High, Low};
        use Polarity::{NormallyClosed as NC, NormallyOpen as NO};
        let open = [
            (NO, NO, Low),
            (NO, NC, High),
            (NC, NO, High),
            (NC, NC, Low),
        ];
        for (solenoid, relay, expected_open) in open {
            let o = solenoid_relay_state(relay, solenoid, ValveState::Open);
            let c = solenoid_relay_state(relay, solenoid, ValveState::Closed);
            assert_eq!(o, expected_open);
            assert_eq!(c, o.inverted(), "open and closed must differ");
        }
    }

    #[test]
    fn nc_relay_no_solenoid_open_is_high() {
        let cmds = run(ActuatorKind::Solenoid, "SVGSD", RequestedState::Open).unwrap();
        assert_eq!(cmds, vec![LowLevelCommand::relay(3, BinaryState::High)]);
        let cmds = run(ActuatorKind::Solenoid, "SVGSD", RequestedState::Closed).unwrap();
        assert_eq!(cmds, vec![LowLevelCommand::relay(3, BinaryState::Low)]);
    }

    #[test]
    fn solenoid_without_valve_polarity_is_rejected() {
        let err = run(ActuatorKind::Solenoid, "SV_UNTYPED", RequestedState::Open).unwrap_err();
        assert!(matches!(
            err,
            CompileError::MissingAttribute {
                attribute: "solenoid polarity",
                ..
            }
        ));
    }

    #[test]
    fn servo_overtravel_precedes_final_angle() {
        let cmds = run(ActuatorKind::Servo, "BVGSO", RequestedState::Open).unwrap();
        assert_eq!(
            cmds,
            vec![LowLevelCommand::servo(0, 97.0), LowLevelCommand::servo(0, 90.0)]
        );
        let cmds = run(ActuatorKind::Servo, "BVGSO", RequestedState::Closed).unwrap();
        assert_eq!(cmds, vec![LowLevelCommand::servo(0, 5.0)]);
    }

    #[test]
    fn servo_power_uses_its_relay() {
        let cmds = run(ActuatorKind::Servo, "BVGSO", RequestedState::On).unwrap();
        assert_eq!(cmds, vec![LowLevelCommand::relay(7, BinaryState::Low)]);
        let cmds = run(ActuatorKind::Servo, "BVGSO", RequestedState::Off).unwrap();
        assert_eq!(cmds, vec![LowLevelCommand::relay(7, BinaryState::High)]);
    }

    #[test]
    fn ungated_servo_cannot_be_powered() {
        let err = run(ActuatorKind::Servo, "MFV", RequestedState::On).unwrap_err();
        assert!(matches!(
            err,
            CompileError::MissingAttribute {
                attribute: "relay id",
                ..
            }
        ));
    }

    #[test]
    fn gpio_arming_and_power() {
        let armed = run(ActuatorKind::GpioDevice, "IGNITER", RequestedState::Armed).unwrap();
        assert_eq!(armed, vec![LowLevelCommand::gpio(17, BinaryState::High)]);
        let disarmed =
            run(ActuatorKind::PoweredGpioDevice, "IGNITER", RequestedState::Disarmed).unwrap();
        assert_eq!(disarmed, vec![LowLevelCommand::gpio(17, BinaryState::Low)]);
        let on = run(ActuatorKind::PoweredGpioDevice, "IGNITER", RequestedState::On).unwrap();
        assert_eq!(on, vec![LowLevelCommand::relay(8, BinaryState::Low)]);
        let off = run(ActuatorKind::GpioDevice, "IGNITER", RequestedState::Off).unwrap();
        assert_eq!(off, vec![LowLevelCommand::relay(8, BinaryState::High)]);
        assert!(run(ActuatorKind::GpioDevice, "LED", RequestedState::On).is_err());
    }

    #[test]
    fn illegal_state_for_kind() {
        let err = run(ActuatorKind::PoweredDevice, "HEATER_NO", RequestedState::Open).unwrap_err();
        assert!(matches!(err, CompileError::IllegalState { .. }));
        let err = run(ActuatorKind::Solenoid, "SVGSD", RequestedState::On).unwrap_err();
        assert!(matches!(err, CompileError::IllegalState { .. }));
    }

    #[test]
    fn unknown_device_per_kind() {
        // A servo name is not a relay.
        let err = run(ActuatorKind::Solenoid, "BVGSO", RequestedState::Open).unwrap_err();
        assert_eq!(
            err,
            CompileError::DeviceNotFound {
                kind: ActuatorKind::Solenoid,
                name: "BVGSO".into()
            }
        );
    }

    #[test]
    fn missing_device_wins_over_illegal_state() {
        let err = run(ActuatorKind::PoweredDevice, "NOPE", RequestedState::Open).unwrap_err();
        assert_eq!(
            err,
            CompileError::DeviceNotFound {
                kind: ActuatorKind::PoweredDevice,
                name: "NOPE".into()
            }
        );
    }

    #[test]
    fn each_call_returns_a_fresh_sequence() {
        let reg = registry();
        let intent = ActuatorIntent::new(ActuatorKind::Servo, "BVGSO", RequestedState::Open);
        let mut first = compile(&intent, &reg).unwrap();
        first.clear();
        assert_eq!(compile(&intent, &reg).unwrap().len(), 2);
    }
}
