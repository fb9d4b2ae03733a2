use crate::{DeviceRegistry, StandConfig};
use anyhow::Context;
use std::fs;
use std::path::Path;

fn is_json(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"))
}

/// Read a stand config. `.json` files are parsed as JSON, anything else as YAML.
pub fn load_config_file(path: impl AsRef<Path>) -> anyhow::Result<StandConfig> {
    let path = path.as_ref();
    let raw =
        fs::read_to_string(path).with_context(|| format!("reading config: {}", path.display()))?;
    let config: StandConfig = if is_json(path) {
        serde_json::from_str(&raw).with_context(|| format!("parsing json: {}", path.display()))?
    } else {
        serde_yaml::from_str(&raw).with_context(|| format!("parsing yaml: {}", path.display()))?
    };
    Ok(config)
}

pub fn load_registry_file(path: impl AsRef<Path>) -> anyhow::Result<DeviceRegistry> {
    let path = path.as_ref();
    let config = load_config_file(path)?;
    let registry = DeviceRegistry::load(&config)
        .with_context(|| format!("validating config: {}", path.display()))?;
    Ok(registry)
}

pub fn save_config_file(path: impl AsRef<Path>, config: &StandConfig) -> anyhow::Result<()> {
    let path = path.as_ref();
    let text = if is_json(path) {
        serde_json::to_string_pretty(config).context("encoding config as json")?
    } else {
        serde_yaml::to_string(config).context("encoding config as yaml")?
    };
    fs::write(path, text).with_context(|| format!("writing config: {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn save_then_load_keeps_calibration_edit() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("stand.yml");
        fs::write(
            &path,
            "sensors: [{ hat: 0, channel: 2, name: PGSO, unit: psi }]\nrelays: []\nservos: []\n",
        )?;

        let mut config = load_config_file(&path)?;
        config.set_sensor_calibration("PGSO", vec![(0.0, 0.0), (10.0, 100.0)], None)?;
        save_config_file(&path, &config)?;

        let registry = load_registry_file(&path)?;
        let pgso = registry
            .sensor_by_name("PGSO")
            .context("sensor missing after reload")?;
        assert!((pgso.calibration.apply(3.0) - 30.0).abs() < 1e-9);
        Ok(())
    }

    #[test]
    fn unknown_sensor_calibration_is_an_error() {
        let mut config = StandConfig::default();
        assert!(config
            .set_sensor_calibration("nope", vec![(0.0, 1.0)], None)
            .is_err());
    }

    #[test]
    fn json_configs_accept_legacy_section_names() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("stand.json");
        fs::write(
            &path,
            r#"{
  "MCCDAQ": [{ "hatID": 1, "channelID": 3, "name": "PT4", "unit": "psi" }],
  "relayBoard": [{ "channel": 2, "name": "SVFTV", "type": "NO", "actuator_type": "solenoid", "solenoid_type": "NC" }],
  "PCA9685": []
}"#,
        )?;
        let registry = load_registry_file(&path)?;
        assert!(registry.sensor_by_address(1, 3).is_some());
        assert!(registry.relay_by_name("SVFTV").is_some());

        save_config_file(&path, &load_config_file(&path)?)?;
        assert!(fs::read_to_string(&path)?.trim_start().starts_with('{'));
        Ok(())
    }

    #[test]
    fn missing_file_reports_path() {
        let err = load_config_file("/definitely/not/here.yml").unwrap_err();
        assert!(format!("{err:#}").contains("/definitely/not/here.yml"));
    }
}
