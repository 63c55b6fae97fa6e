//! Component registry
//!
//! Process-scoped catalog of every component on the platform. It is created
//! once at platform bring-up, handed to the sequencer, and torn down on
//! shutdown; nothing reaches it through global state.
//!
//! # Concurrency
//!
//! The catalog is an immutable snapshot held in an `ArcSwap`. Readers load
//! the current `Arc` without taking any lock, so they never wait on a
//! registration in progress. Writers are serialized by a separate mutex,
//! build the next snapshot aside and publish it with one atomic store.

use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::component::Component;
use crate::data::{ComponentKey, ComponentSummary, Priority};
use crate::error::{PlinthError, Result};

#[derive(Debug, Default)]
struct Catalog {
    entries: Vec<Arc<Component>>,
    index: HashMap<ComponentKey, usize>,
}

impl Catalog {
    fn from_entries(entries: Vec<Arc<Component>>) -> Self {
        let index = entries.iter().enumerate().map(|(i, c)| (c.key(), i)).collect();
        Self { entries, index }
    }
}

/// Read-only, point-in-time view of the registry
#[derive(Debug, Clone)]
pub struct RegistrySnapshot {
    catalog: Arc<Catalog>,
}

impl RegistrySnapshot {
    pub fn get(&self, key: &ComponentKey) -> Option<&Arc<Component>> {
        self.catalog.index.get(key).map(|&i| &self.catalog.entries[i])
    }

    /// Components in registration order
    pub fn iter(&self) -> std::slice::Iter<'_, Arc<Component>> {
        self.catalog.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.catalog.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.catalog.entries.is_empty()
    }
}

/// All registered components sharing one priority, in registration order
#[derive(Debug, Clone)]
pub struct Band {
    pub priority: Priority,
    pub components: Vec<Arc<Component>>,
}

/// Lazy iterator over priority bands, lowest priority first.
///
/// Each band is computed when requested from the snapshot taken by
/// [`Registry::all_by_priority`]; empty bands are skipped.
#[derive(Debug, Clone)]
pub struct PriorityBands {
    catalog: Arc<Catalog>,
    next: usize,
}

impl Iterator for PriorityBands {
    type Item = Band;

    fn next(&mut self) -> Option<Band> {
        while let Some(&priority) = Priority::ALL.get(self.next) {
            self.next += 1;
            let components: Vec<Arc<Component>> = self
                .catalog
                .entries
                .iter()
                .filter(|c| c.priority() == priority)
                .cloned()
                .collect();
            if !components.is_empty() {
                return Some(Band { priority, components });
            }
        }
        None
    }
}

#[derive(Debug, Default)]
pub struct Registry {
    catalog: ArcSwap<Catalog>,
    writer: Mutex<()>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    fn current(&self) -> Arc<Catalog> {
        self.catalog.load_full()
    }

    fn publish(&self, catalog: Catalog) {
        self.catalog.store(Arc::new(catalog));
    }

    /// Add a component. Fails with `DuplicateKey` if its key is taken.
    pub fn register(&self, component: Component) -> Result<Arc<Component>> {
        let _writer = self.writer.lock();
        let current = self.current();
        let key = component.key();
        if current.index.contains_key(&key) {
            return Err(PlinthError::DuplicateKey(key.to_string()));
        }

        let component = Arc::new(component);
        let mut entries = current.entries.clone();
        entries.push(component.clone());
        self.publish(Catalog::from_entries(entries));
        debug!("Registered {} (priority {})", key, component.priority());
        Ok(component)
    }

    pub fn get(&self, key: &ComponentKey) -> Result<Arc<Component>> {
        let current = self.current();
        current
            .index
            .get(key)
            .map(|&i| current.entries[i].clone())
            .ok_or_else(|| PlinthError::NotFound(key.to_string()))
    }

    pub fn contains(&self, key: &ComponentKey) -> bool {
        self.current().index.contains_key(key)
    }

    /// Remove a component, preserving the order of the rest
    pub fn deregister(&self, key: &ComponentKey) -> Result<Arc<Component>> {
        let _writer = self.writer.lock();
        let current = self.current();
        let position = *current
            .index
            .get(key)
            .ok_or_else(|| PlinthError::NotFound(key.to_string()))?;

        let mut entries = current.entries.clone();
        let removed = entries.remove(position);
        self.publish(Catalog::from_entries(entries));
        debug!("Deregistered {}", key);
        Ok(removed)
    }

    pub fn len(&self) -> usize {
        self.current().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.current().entries.is_empty()
    }

    pub fn snapshot(&self) -> RegistrySnapshot {
        RegistrySnapshot { catalog: self.current() }
    }

    /// Bands in ascending priority, each in registration order.
    ///
    /// Every call starts from the registry as it is now.
    pub fn all_by_priority(&self) -> PriorityBands {
        PriorityBands {
            catalog: self.current(),
            next: 0,
        }
    }

    /// Key, state, drivers and sensors of every component, in registration order
    pub fn inventory(&self) -> Vec<ComponentSummary> {
        self.current().entries.iter().map(|c| c.summary()).collect()
    }

    /// Drop every component. Returns them in registration order.
    pub fn teardown(&self) -> Vec<Arc<Component>> {
        let _writer = self.writer.lock();
        let current = self.current();
        self.publish(Catalog::default());
        info!("Registry torn down ({} components)", current.entries.len());
        current.entries.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{BusAddress, ComponentKind, ComponentState};
    use crate::driver::SimulatedFactory;

    fn build(kind: ComponentKind, bus: u16, addr: u16) -> Component {
        Component::builder(kind, BusAddress::new(bus, addr).unwrap())
            .build(&SimulatedFactory::new())
            .unwrap()
    }

    fn build_with_priority(kind: ComponentKind, bus: u16, addr: u16, priority: Priority) -> Component {
        Component::builder(kind, BusAddress::new(bus, addr).unwrap())
            .priority(priority)
            .build(&SimulatedFactory::new())
            .unwrap()
    }

    #[test]
    fn test_register_and_get() {
        let registry = Registry::new();
        let c = registry.register(build(ComponentKind::TempSensorHub, 3, 0x4c)).unwrap();
        assert_eq!(registry.len(), 1);
        let fetched = registry.get(&c.key()).unwrap();
        assert!(Arc::ptr_eq(&c, &fetched));
    }

    #[test]
    fn test_duplicate_key_rejected_size_unchanged() {
        let registry = Registry::new();
        registry.register(build(ComponentKind::TempSensorHub, 3, 0x4c)).unwrap();
        registry.register(build(ComponentKind::FanController, 1, 0x2f)).unwrap();

        let err = registry.register(build(ComponentKind::TempSensorHub, 3, 0x4c)).unwrap_err();
        assert!(matches!(err, PlinthError::DuplicateKey(ref k) if k == "temp_sensor_hub@3-004c"));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_same_address_different_kind_is_distinct() {
        let registry = Registry::new();
        registry.register(build(ComponentKind::Eeprom, 1, 0x50)).unwrap();
        assert!(registry.register(build(ComponentKind::LedController, 1, 0x50)).is_ok());
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_get_missing() {
        let registry = Registry::new();
        let key = ComponentKey::new(BusAddress::new(1, 0x50).unwrap(), ComponentKind::Eeprom);
        assert!(matches!(registry.get(&key), Err(PlinthError::NotFound(_))));
        assert!(!registry.contains(&key));
    }

    #[test]
    fn test_bands_ordered_and_stable() {
        let registry = Registry::new();
        registry.register(build(ComponentKind::FanController, 1, 0x2f)).unwrap();
        registry.register(build(ComponentKind::TempSensorHub, 3, 0x4c)).unwrap();
        registry.register(build(ComponentKind::LedController, 1, 0x20)).unwrap();
        registry.register(build(ComponentKind::FanController, 1, 0x2e)).unwrap();
        registry.register(build(ComponentKind::TempSensorHub, 3, 0x1a)).unwrap();

        let bands: Vec<Band> = registry.all_by_priority().collect();
        let priorities: Vec<Priority> = bands.iter().map(|b| b.priority).collect();
        assert_eq!(priorities, vec![Priority::Thermal, Priority::Fan, Priority::Led]);
        assert!(priorities.windows(2).all(|w| w[0] <= w[1]));

        let thermal: Vec<String> = bands[0].components.iter().map(|c| c.key().to_string()).collect();
        assert_eq!(thermal, vec!["temp_sensor_hub@3-004c", "temp_sensor_hub@3-001a"]);
        let fans: Vec<String> = bands[1].components.iter().map(|c| c.key().to_string()).collect();
        assert_eq!(fans, vec!["fan_controller@1-002f", "fan_controller@1-002e"]);
    }

    #[test]
    fn test_bands_recomputed_each_call() {
        let registry = Registry::new();
        registry.register(build(ComponentKind::Eeprom, 1, 0x50)).unwrap();
        assert_eq!(registry.all_by_priority().count(), 1);

        registry.register(build_with_priority(ComponentKind::Eeprom, 1, 0x51, Priority::Power)).unwrap();
        let bands: Vec<Band> = registry.all_by_priority().collect();
        assert_eq!(bands.len(), 2);
        assert_eq!(bands[0].priority, Priority::Power);

        // An iterator taken earlier keeps its own view
        let earlier = registry.all_by_priority();
        registry.register(build(ComponentKind::TempSensorHub, 3, 0x4c)).unwrap();
        assert_eq!(earlier.count(), 2);
        assert_eq!(registry.all_by_priority().count(), 3);
    }

    #[test]
    fn test_deregister_preserves_order() {
        let registry = Registry::new();
        let a = registry.register(build(ComponentKind::Eeprom, 1, 0x50)).unwrap();
        let b = registry.register(build(ComponentKind::Eeprom, 1, 0x51)).unwrap();
        let c = registry.register(build(ComponentKind::Eeprom, 1, 0x52)).unwrap();

        registry.deregister(&b.key()).unwrap();
        let keys: Vec<ComponentKey> = registry.snapshot().iter().map(|x| x.key()).collect();
        assert_eq!(keys, vec![a.key(), c.key()]);
        assert!(registry.get(&c.key()).is_ok());
        assert!(matches!(registry.deregister(&b.key()), Err(PlinthError::NotFound(_))));

        // The key is free again
        assert!(registry.register(build(ComponentKind::Eeprom, 1, 0x51)).is_ok());
    }

    #[test]
    fn test_snapshot_is_isolated_from_writes() {
        let registry = Registry::new();
        let a = registry.register(build(ComponentKind::Eeprom, 1, 0x50)).unwrap();
        let snapshot = registry.snapshot();
        registry.register(build(ComponentKind::Eeprom, 1, 0x51)).unwrap();
        assert_eq!(snapshot.len(), 1);
        assert!(snapshot.get(&a.key()).is_some());
        assert_eq!(registry.snapshot().len(), 2);
    }

    #[test]
    fn test_inventory_and_teardown() {
        let registry = Registry::new();
        let hub = registry.register(build(ComponentKind::TempSensorHub, 3, 0x4c)).unwrap();
        hub.add_temp_sensors(["zone1"]);
        hub.initialize().unwrap();

        let inventory = registry.inventory();
        assert_eq!(inventory.len(), 1);
        assert_eq!(inventory[0].state, ComponentState::Healthy);
        assert_eq!(inventory[0].sensors[0].name, "zone1");

        let removed = registry.teardown();
        assert_eq!(removed.len(), 1);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_readers_progress_while_writer_holds_lock() {
        let registry = Arc::new(Registry::new());
        registry.register(build(ComponentKind::Eeprom, 1, 0x50)).unwrap();

        // A writer in the middle of a registration does not block readers
        let _writer = registry.writer.lock();
        let reader = {
            let registry = registry.clone();
            std::thread::spawn(move || (registry.len(), registry.all_by_priority().count()))
        };
        assert_eq!(reader.join().unwrap(), (1, 1));
    }

    #[test]
    fn test_concurrent_registration() {
        let registry = Arc::new(Registry::new());
        let handles: Vec<_> = (0..8u16)
            .map(|i| {
                let registry = registry.clone();
                std::thread::spawn(move || {
                    registry.register(build(ComponentKind::Eeprom, i, 0x50)).unwrap();
                    // Contended key, only one thread wins
                    registry.register(build(ComponentKind::Eeprom, 100, 0x50)).ok();
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(registry.len(), 9);
    }
}
