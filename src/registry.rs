use std::sync::{Arc, RwLock};

use tracing::info;

use crate::binding::DeviceBinding;
use crate::config::EngineConfig;
use crate::device::BackingDevice;
use crate::error::{Error, Result};
use crate::index::IndexKind;

/// All active bindings, in creation order, keyed by virtual device name.
pub struct Registry {
    config: EngineConfig,
    bindings: RwLock<Vec<Arc<DeviceBinding>>>,
}

impl Registry {
    /// Rejects a config that would produce unusable bindings.
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            bindings: RwLock::new(Vec::new()),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Binds `name` to `backing` with a fresh, empty index of `kind`.
    pub fn bind(
        &self,
        name: impl Into<String>,
        backing: Arc<dyn BackingDevice>,
        kind: IndexKind,
    ) -> Result<Arc<DeviceBinding>> {
        let name = name.into();
        let mut bindings = self.bindings.write()?;
        if bindings.iter().any(|b| b.name() == name) {
            return Err(Error::AlreadyBound(name));
        }

        let index = self.config.index.clone().kind(kind);
        let binding = Arc::new(DeviceBinding::new(name, backing, &self.config, &index));
        bindings
            .try_reserve(1)
            .map_err(|_| Error::AllocationFailure("binding registry"))?;
        bindings.push(binding.clone());

        info!(
            device = binding.name(),
            backing = binding.backing().name(),
            index = %kind,
            "bound device"
        );
        Ok(binding)
    }

    pub fn lookup(&self, name: &str) -> Result<Option<Arc<DeviceBinding>>> {
        let bindings = self.bindings.read()?;
        Ok(bindings.iter().find(|b| b.name() == name).cloned())
    }

    /// Removes the binding for `name`. Unknown names are ignored.
    ///
    /// Requests that already hold the binding finish against it; the index
    /// and backing handle are released when the last of them drops.
    pub fn unbind(&self, name: &str) -> Result<Option<Arc<DeviceBinding>>> {
        let mut bindings = self.bindings.write()?;
        let removed = bindings
            .iter()
            .position(|b| b.name() == name)
            .map(|pos| bindings.remove(pos));
        if let Some(binding) = &removed {
            info!(device = binding.name(), "unbound device");
        }
        Ok(removed)
    }

    /// Removes the binding at 1-based `position` in listing order.
    pub fn unbind_at(&self, position: usize) -> Result<Option<Arc<DeviceBinding>>> {
        let mut bindings = self.bindings.write()?;
        if position == 0 || position > bindings.len() {
            return Ok(None);
        }
        let binding = bindings.remove(position - 1);
        info!(device = binding.name(), position, "unbound device");
        Ok(Some(binding))
    }

    /// `(virtual name, backing name)` pairs in creation order.
    pub fn list(&self) -> Result<Vec<(String, String)>> {
        let bindings = self.bindings.read()?;
        Ok(bindings
            .iter()
            .map(|b| (b.name().to_string(), b.backing().name().to_string()))
            .collect())
    }

    /// Snapshot of the current bindings.
    pub fn bindings(&self) -> Result<Vec<Arc<DeviceBinding>>> {
        Ok(self.bindings.read()?.clone())
    }

    pub fn len(&self) -> usize {
        self.bindings.read().map_or(0, |b| b.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::MemDevice;

    fn mem(name: &str) -> Arc<dyn BackingDevice> {
        Arc::new(MemDevice::new(name))
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        assert!(matches!(
            Registry::new(EngineConfig::new().sector_size(0)),
            Err(Error::InvalidConfig(_))
        ));
        assert!(matches!(
            Registry::new(EngineConfig::new().log_start(4)),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_bind_and_lookup() {
        let registry = Registry::new(EngineConfig::default()).unwrap();
        registry.bind("lsvbd1", mem("sdb"), IndexKind::HashTable).unwrap();

        let binding = registry.lookup("lsvbd1").unwrap().unwrap();
        assert_eq!(binding.backing().name(), "sdb");
        assert_eq!(binding.stats().unwrap().index, IndexKind::HashTable);
        assert!(registry.lookup("lsvbd2").unwrap().is_none());
    }

    #[test]
    fn test_duplicate_name_is_rejected() {
        let registry = Registry::new(EngineConfig::default()).unwrap();
        registry.bind("lsvbd1", mem("sdb"), IndexKind::BalancedTree).unwrap();
        assert!(matches!(
            registry.bind("lsvbd1", mem("sdc"), IndexKind::BalancedTree),
            Err(Error::AlreadyBound(_))
        ));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_unbind_is_idempotent() {
        let registry = Registry::new(EngineConfig::default()).unwrap();
        registry.bind("lsvbd1", mem("sdb"), IndexKind::BalancedTree).unwrap();

        assert!(registry.unbind("lsvbd1").unwrap().is_some());
        assert!(registry.unbind("lsvbd1").unwrap().is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_rebind_starts_with_empty_index() {
        let registry = Registry::new(EngineConfig::default()).unwrap();
        let first = registry.bind("lsvbd1", mem("sdb"), IndexKind::MultiwayTree).unwrap();
        first.map_write(0, 512).unwrap();
        registry.unbind("lsvbd1").unwrap();

        let second = registry.bind("lsvbd1", mem("sdb"), IndexKind::MultiwayTree).unwrap();
        let stats = second.stats().unwrap();
        assert_eq!(stats.entries, 0);
        assert_eq!(stats.log_tail, 32);
    }

    #[test]
    fn test_list_and_unbind_by_position() {
        let registry = Registry::new(EngineConfig::default()).unwrap();
        registry.bind("lsvbd1", mem("sdb"), IndexKind::BalancedTree).unwrap();
        registry.bind("lsvbd2", mem("sdc"), IndexKind::SkipList).unwrap();
        registry.bind("lsvbd3", mem("sdd"), IndexKind::HashTable).unwrap();

        assert!(registry.unbind_at(0).unwrap().is_none());
        assert!(registry.unbind_at(4).unwrap().is_none());
        let removed = registry.unbind_at(2).unwrap().unwrap();
        assert_eq!(removed.name(), "lsvbd2");

        assert_eq!(
            registry.list().unwrap(),
            vec![
                ("lsvbd1".to_string(), "sdb".to_string()),
                ("lsvbd3".to_string(), "sdd".to_string()),
            ]
        );
    }
}
