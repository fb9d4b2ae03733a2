use std::sync::{Arc, RwLock};

use tracing::info;

use crate::{DeviceRegistry, Result, StandConfig};

/// Shared, swappable pointer to the active registry.
///
/// Readers take an `Arc` clone and work on that immutable registry; a reload builds the
/// replacement off to the side and swaps the pointer, so nobody observes a half-built
/// registry. A failed reload leaves the previous registry in place.
#[derive(Clone, Default)]
pub struct RegistryHandle {
    inner: Arc<RwLock<Arc<DeviceRegistry>>>,
}

impl RegistryHandle {
    pub fn new(registry: DeviceRegistry) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Arc::new(registry))),
        }
    }

    pub fn current(&self) -> Arc<DeviceRegistry> {
        match self.inner.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    /// Swap in a new registry, returning the one it replaced.
    pub fn replace(&self, registry: DeviceRegistry) -> Arc<DeviceRegistry> {
        let next = Arc::new(registry);
        let mut guard = match self.inner.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        std::mem::replace(&mut *guard, next)
    }

    /// Validate `config` and swap it in.
    pub fn reload(&self, config: &StandConfig) -> Result<()> {
        let registry = DeviceRegistry::load(config)?;
        let summary = registry.summary();
        self.replace(registry);
        info!(?summary, "device registry reloaded");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{RelayConfig, SensorConfig};

    fn config(sensor: &str) -> StandConfig {
        StandConfig {
            sensors: Some(vec![SensorConfig {
                channel: Some(0),
                name: Some(sensor.into()),
                ..Default::default()
            }]),
            relays: Some(vec![RelayConfig {
                channel: Some(1),
                name: Some("PUMP".into()),
                ..Default::default()
            }]),
            servos: Some(vec![]),
            gpios: None,
        }
    }

    #[test]
    fn reload_swaps_and_old_readers_keep_their_copy() {
        let handle = RegistryHandle::new(DeviceRegistry::load(&config("A")).unwrap());
        let before = handle.current();
        handle.reload(&config("B")).unwrap();
        assert!(before.sensor_by_name("A").is_some());
        assert!(handle.current().sensor_by_name("B").is_some());
        assert!(handle.current().sensor_by_name("A").is_none());
    }

    #[test]
    fn failed_reload_keeps_previous_registry() {
        let handle = RegistryHandle::new(DeviceRegistry::load(&config("A")).unwrap());
        let mut bad = config("B");
        bad.relays = None;
        assert!(handle.reload(&bad).is_err());
        assert!(handle.current().sensor_by_name("A").is_some());
    }
}
