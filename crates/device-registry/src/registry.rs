use std::collections::{BTreeMap, HashMap};

use serde::Serialize;
use tracing::{debug, warn};

use crate::{
    ArmState, Calibration, ConfigError, GpioConfig, GpioMode, GpioSpec, Polarity, PowerState,
    RelayConfig, RelayRole, RelaySpec, Result, SensorAddress, SensorConfig, SensorSpec,
    ServoConfig, ServoSpec, StandConfig, ValveState, CHANNELS_PER_HAT,
};

/// Immutable catalog of configured devices, keyed by physical address and by name.
#[derive(Debug, Default, Clone)]
pub struct DeviceRegistry {
    sensors: BTreeMap<u16, SensorSpec>,
    relays: BTreeMap<u16, RelaySpec>,
    servos: BTreeMap<u16, ServoSpec>,
    gpios: BTreeMap<u16, GpioSpec>,
    sensor_names: HashMap<String, u16>,
    relay_names: HashMap<String, u16>,
    servo_names: HashMap<String, u16>,
    gpio_names: HashMap<String, u16>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RegistrySummary {
    pub sensors: usize,
    pub relays: usize,
    pub servos: usize,
    pub gpios: usize,
    pub calibrated_sensors: usize,
}

impl DeviceRegistry {
    /// Validate `config` and build a registry. Calibrations are fitted here, once.
    pub fn load(config: &StandConfig) -> Result<Self> {
        let sensors = config
            .sensors
            .as_ref()
            .ok_or(ConfigError::MissingSection("sensors"))?;
        let relays = config
            .relays
            .as_ref()
            .ok_or(ConfigError::MissingSection("relays"))?;
        let servos = config
            .servos
            .as_ref()
            .ok_or(ConfigError::MissingSection("servos"))?;

        let mut reg = DeviceRegistry::default();
        for (i, raw) in sensors.iter().enumerate() {
            let spec = sensor_spec(i, raw)?;
            let key = spec.address.key();
            insert_unique(
                "sensors",
                &mut reg.sensors,
                &mut reg.sensor_names,
                key,
                spec,
                |s| &s.name,
            )?;
        }
        for (i, raw) in relays.iter().enumerate() {
            let spec = relay_spec(i, raw)?;
            let key = spec.channel;
            insert_unique(
                "relays",
                &mut reg.relays,
                &mut reg.relay_names,
                key,
                spec,
                |r| &r.name,
            )?;
        }
        for (i, raw) in servos.iter().enumerate() {
            let spec = servo_spec(i, raw)?;
            let key = spec.channel;
            insert_unique(
                "servos",
                &mut reg.servos,
                &mut reg.servo_names,
                key,
                spec,
                |s| &s.name,
            )?;
        }
        for (i, raw) in config.gpios.iter().flatten().enumerate() {
            let spec = gpio_spec(i, raw)?;
            let key = spec.pin;
            insert_unique(
                "gpios",
                &mut reg.gpios,
                &mut reg.gpio_names,
                key,
                spec,
                |g| &g.name,
            )?;
        }

        for servo in reg.servos.values() {
            if let Some(relay) = servo.relay {
                if !reg.relays.contains_key(&relay) {
                    debug!(servo = %servo.name, relay, "servo power relay is not a configured relay");
                }
            }
        }

        debug!(summary = ?reg.summary(), "device registry loaded");
        Ok(reg)
    }

    pub fn summary(&self) -> RegistrySummary {
        RegistrySummary {
            sensors: self.sensors.len(),
            relays: self.relays.len(),
            servos: self.servos.len(),
            gpios: self.gpios.len(),
            calibrated_sensors: self
                .sensors
                .values()
                .filter(|s| !s.calibration.is_identity())
                .count(),
        }
    }

    pub fn sensor_by_address(&self, hat: u8, channel: u8) -> Option<&SensorSpec> {
        if channel >= CHANNELS_PER_HAT {
            return None;
        }
        self.sensors.get(&SensorAddress::new(hat, channel).key())
    }

    pub fn sensor_by_key(&self, key: u16) -> Option<&SensorSpec> {
        self.sensors.get(&key)
    }

    pub fn sensor_by_name(&self, name: &str) -> Option<&SensorSpec> {
        self.sensor_names.get(name).and_then(|k| self.sensors.get(k))
    }

    pub fn relay_by_channel(&self, channel: u16) -> Option<&RelaySpec> {
        self.relays.get(&channel)
    }

    pub fn relay_by_name(&self, name: &str) -> Option<&RelaySpec> {
        self.relay_names.get(name).and_then(|k| self.relays.get(k))
    }

    pub fn servo_by_channel(&self, channel: u16) -> Option<&ServoSpec> {
        self.servos.get(&channel)
    }

    pub fn servo_by_name(&self, name: &str) -> Option<&ServoSpec> {
        self.servo_names.get(name).and_then(|k| self.servos.get(k))
    }

    pub fn gpio_by_pin(&self, pin: u16) -> Option<&GpioSpec> {
        self.gpios.get(&pin)
    }

    pub fn gpio_by_name(&self, name: &str) -> Option<&GpioSpec> {
        self.gpio_names.get(name).and_then(|k| self.gpios.get(k))
    }

    /// Sensors in address-key order.
    pub fn sensors(&self) -> impl Iterator<Item = &SensorSpec> {
        self.sensors.values()
    }

    /// Relays in channel order.
    pub fn relays(&self) -> impl Iterator<Item = &RelaySpec> {
        self.relays.values()
    }

    /// Servos in channel order.
    pub fn servos(&self) -> impl Iterator<Item = &ServoSpec> {
        self.servos.values()
    }

    /// GPIOs in pin order.
    pub fn gpios(&self) -> impl Iterator<Item = &GpioSpec> {
        self.gpios.values()
    }
}

fn insert_unique<T>(
    section: &'static str,
    by_key: &mut BTreeMap<u16, T>,
    by_name: &mut HashMap<String, u16>,
    key: u16,
    spec: T,
    name_of: impl Fn(&T) -> &String,
) -> Result<()> {
    let name = name_of(&spec).clone();
    if let Some(existing) = by_key.get(&key) {
        return Err(ConfigError::DuplicateAddress {
            section,
            key,
            first: name_of(existing).clone(),
            second: name,
        });
    }
    if by_name.contains_key(&name) {
        return Err(ConfigError::DuplicateName { section, name });
    }
    by_name.insert(name, key);
    by_key.insert(key, spec);
    Ok(())
}

fn required<T: Clone>(
    value: &Option<T>,
    section: &'static str,
    index: usize,
    field: &'static str,
) -> Result<T> {
    value.clone().ok_or(ConfigError::MissingField {
        section,
        index,
        field,
    })
}

fn invalid(section: &'static str, name: &str, field: &'static str, value: &str) -> ConfigError {
    ConfigError::InvalidValue {
        section,
        name: name.to_string(),
        field,
        value: value.to_string(),
    }
}

fn parse_opt<T>(
    raw: Option<&str>,
    parse: impl Fn(&str) -> Option<T>,
    section: &'static str,
    name: &str,
    field: &'static str,
) -> Result<Option<T>> {
    match raw {
        None => Ok(None),
        Some(s) => parse(s)
            .map(Some)
            .ok_or_else(|| invalid(section, name, field, s)),
    }
}

fn sensor_spec(index: usize, raw: &SensorConfig) -> Result<SensorSpec> {
    let name = required(&raw.name, "sensors", index, "name")?;
    let channel = required(&raw.channel, "sensors", index, "channel")?;
    if channel >= CHANNELS_PER_HAT {
        return Err(invalid("sensors", &name, "channel", &channel.to_string()));
    }
    let hat = raw.hat.unwrap_or_else(|| {
        warn!(sensor = %name, "no hat index configured, assuming hat 0");
        0
    });
    let unit = raw.unit.clone().unwrap_or_else(|| {
        warn!(sensor = %name, "no unit configured");
        String::new()
    });
    let degree = raw.degree.unwrap_or(1);
    if degree == 0 {
        return Err(invalid("sensors", &name, "degree", "0"));
    }
    let points = raw.calibration.clone().unwrap_or_default();
    let calibration = if points.is_empty() {
        debug!(sensor = %name, "no calibration points, using raw values");
        Calibration::identity()
    } else {
        match Calibration::fit(&points, degree) {
            Ok(cal) => cal,
            Err(e) => {
                warn!(sensor = %name, error = %e, "calibration fit failed, using identity");
                Calibration::identity()
            }
        }
    };
    Ok(SensorSpec {
        address: SensorAddress::new(hat, channel),
        name,
        unit,
        calibration_points: points,
        degree,
        calibration,
    })
}

fn relay_spec(index: usize, raw: &RelayConfig) -> Result<RelaySpec> {
    let name = required(&raw.name, "relays", index, "name")?;
    let channel = required(&raw.channel, "relays", index, "channel")?;
    let polarity = match parse_opt(
        raw.relay_type.as_deref(),
        Polarity::parse,
        "relays",
        &name,
        "relay_type",
    )? {
        Some(p) => p,
        None => {
            warn!(relay = %name, "no relay_type configured, assuming NO");
            Polarity::NormallyOpen
        }
    };
    let default_raw = raw.default_state.as_deref();
    let role = match raw.actuator_type.as_deref().map(str::trim) {
        None | Some("") | Some("none") => RelayRole::Unassigned,
        Some(r) if r.eq_ignore_ascii_case("solenoid") => {
            let solenoid_polarity = parse_opt(
                raw.solenoid_type.as_deref(),
                Polarity::parse,
                "relays",
                &name,
                "solenoid_type",
            )?;
            if solenoid_polarity.is_none() {
                warn!(relay = %name, "solenoid relay has no solenoid_type");
            }
            RelayRole::Solenoid {
                solenoid_polarity,
                default_state: parse_opt(
                    default_raw,
                    ValveState::parse,
                    "relays",
                    &name,
                    "default_state",
                )?,
            }
        }
        Some(r) if r.eq_ignore_ascii_case("poweredDevice") || r == "powered_device" => {
            RelayRole::PoweredDevice {
                default_state: parse_opt(
                    default_raw,
                    PowerState::parse,
                    "relays",
                    &name,
                    "default_state",
                )?,
            }
        }
        Some(other) => return Err(invalid("relays", &name, "actuator_type", other)),
    };
    Ok(RelaySpec {
        name,
        channel,
        polarity,
        role,
    })
}

fn servo_spec(index: usize, raw: &ServoConfig) -> Result<ServoSpec> {
    let name = required(&raw.name, "servos", index, "name")?;
    let channel = required(&raw.channel, "servos", index, "channel")?;
    let open_angle = required(&raw.open_pos, "servos", index, "open_pos")?;
    let close_angle = required(&raw.close_pos, "servos", index, "close_pos")?;
    let default_state = parse_opt(
        raw.default_state.as_deref(),
        ValveState::parse,
        "servos",
        &name,
        "default_state",
    )?;
    Ok(ServoSpec {
        name,
        channel,
        open_angle,
        close_angle,
        open_overtravel: raw.open_over,
        close_overtravel: raw.close_over,
        relay: raw.relay_id,
        default_state,
    })
}

fn gpio_spec(index: usize, raw: &GpioConfig) -> Result<GpioSpec> {
    let name = required(&raw.name, "gpios", index, "name")?;
    let pin = required(&raw.pin, "gpios", index, "pin")?;
    let mode = match raw.mode.as_deref().map(str::trim) {
        None => GpioMode::Output,
        Some(m) if m.eq_ignore_ascii_case("output") => GpioMode::Output,
        Some(other) => return Err(invalid("gpios", &name, "mode", other)),
    };
    let default_state = parse_opt(
        raw.default_state.as_deref(),
        ArmState::parse,
        "gpios",
        &name,
        "default_state",
    )?;
    Ok(GpioSpec {
        name,
        pin,
        mode,
        relay: raw.relay_id,
        default_state,
    })
}
