//! device-registry: YAML-driven catalog of test-stand sensors and actuators
//!
//! The registry is built once from a [`StandConfig`] and never mutated afterwards;
//! reloads build a fresh registry and swap it in through a [`RegistryHandle`].

mod types;
pub use types::*;

mod error;
pub use error::{CalibrationError, ConfigError, Result};

mod specs;
pub use specs::{
    ArmState, GpioMode, GpioSpec, Polarity, PowerState, RelayRole, RelaySpec, SensorAddress,
    SensorSpec, ServoSpec, ValveState, CHANNELS_PER_HAT,
};

mod calibration;
pub use calibration::{fit, Calibration};

mod registry;
pub use registry::{DeviceRegistry, RegistrySummary};

mod handle;
pub use handle::RegistryHandle;

mod loader;
pub use loader::{load_config_file, load_registry_file, save_config_file};

mod metrics;
pub use metrics::{MetricsHub, StandMetrics};
