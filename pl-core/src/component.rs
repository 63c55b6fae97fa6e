//! Components
//!
//! A component is one logical hardware unit (a temperature hub, a PSU, a fan
//! controller) owning one or more driver handles. It coordinates their
//! bring-up and contains their failures: a failing driver downgrades the
//! component instead of propagating outward.
//!
//! ```text
//! Uninitialized --initialize--> Initializing --+--> Healthy   (all drivers ok)
//!       ^                                      +--> Degraded  (some failed)
//!       +------------------reset---------------+--> Failed    (all failed)
//! ```

use std::fmt;

use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::constants::limits;
use crate::data::{
    BusAddress, ComponentKey, ComponentKind, ComponentState, ComponentSummary, DriverKind, DriverStatus,
    DriverSummary, Priority,
};
use crate::driver::{DriverFactory, DriverHandle, DriverOptions};
use crate::error::{ErrorKind, PlinthError, Result};
use crate::sensors::{SensorDescriptor, SensorReading, SensorSet};

/// A driver that failed during [`Component::initialize`]
#[derive(Debug)]
pub struct DriverFailure {
    pub index: usize,
    pub driver: DriverKind,
    pub address: BusAddress,
    pub error: PlinthError,
}

/// Result of one [`Component::initialize`] call
#[derive(Debug)]
pub struct InitOutcome {
    pub key: ComponentKey,
    pub state: ComponentState,
    /// Drivers that initialized successfully
    pub ready: usize,
    pub failures: Vec<DriverFailure>,
}

/// Result of [`Component::health_check`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HealthReport {
    pub alive: usize,
    pub absent: usize,
    /// (driver index, transport fault)
    pub faults: Vec<(usize, String)>,
}

impl HealthReport {
    pub fn all_alive(&self) -> bool {
        self.absent == 0 && self.faults.is_empty()
    }
}

#[derive(Debug)]
struct Lifecycle {
    state: ComponentState,
    drivers: Vec<DriverStatus>,
}

/// Builds a [`Component`], filling in defaults for its kind
pub struct ComponentBuilder {
    kind: ComponentKind,
    address: BusAddress,
    drivers: Option<Vec<Box<dyn DriverHandle>>>,
    priority: Option<Priority>,
    options: DriverOptions,
    sensors: Vec<SensorDescriptor>,
}

impl ComponentBuilder {
    pub fn new(kind: ComponentKind, address: BusAddress) -> Self {
        Self {
            kind,
            address,
            drivers: None,
            priority: None,
            options: DriverOptions::default(),
            sensors: Vec::new(),
        }
    }

    /// Explicit driver list. An empty list behaves like no list at all.
    pub fn drivers(mut self, drivers: Vec<Box<dyn DriverHandle>>) -> Self {
        self.drivers = Some(drivers);
        self
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }

    /// Options for the default driver
    pub fn options(mut self, options: DriverOptions) -> Self {
        self.options = options;
        self
    }

    pub fn sensors(mut self, sensors: Vec<SensorDescriptor>) -> Self {
        self.sensors = sensors;
        self
    }

    /// Resolve defaults and construct the component.
    ///
    /// Without explicit drivers, exactly one driver of
    /// [`ComponentKind::default_driver`] is created at the component's address.
    pub fn build(self, factory: &dyn DriverFactory) -> Result<Component> {
        let drivers = match self.drivers {
            Some(drivers) if !drivers.is_empty() => drivers,
            _ => vec![factory.create(self.address, self.kind.default_driver(), &self.options)?],
        };
        if drivers.len() > limits::MAX_DRIVERS_PER_COMPONENT {
            return Err(PlinthError::invalid_config(
                "drivers",
                format!(
                    "{} drivers on {} (max {})",
                    drivers.len(),
                    ComponentKey::new(self.address, self.kind),
                    limits::MAX_DRIVERS_PER_COMPONENT
                ),
            ));
        }

        let priority = self.priority.unwrap_or_else(|| self.kind.default_priority());
        let key = ComponentKey::new(self.address, self.kind);
        debug!("Built {} with {} driver(s), priority {}", key, drivers.len(), priority);

        let mut sensors = SensorSet::new();
        sensors.extend(self.sensors);

        Ok(Component {
            key,
            priority,
            lifecycle: RwLock::new(Lifecycle {
                state: ComponentState::Uninitialized,
                drivers: vec![DriverStatus::Pending; drivers.len()],
            }),
            drivers,
            sensors: RwLock::new(sensors),
        })
    }
}

pub struct Component {
    key: ComponentKey,
    priority: Priority,
    drivers: Vec<Box<dyn DriverHandle>>,
    lifecycle: RwLock<Lifecycle>,
    sensors: RwLock<SensorSet>,
}

impl Component {
    pub fn builder(kind: ComponentKind, address: BusAddress) -> ComponentBuilder {
        ComponentBuilder::new(kind, address)
    }

    pub fn key(&self) -> ComponentKey {
        self.key
    }

    pub fn kind(&self) -> ComponentKind {
        self.key.kind
    }

    pub fn address(&self) -> BusAddress {
        self.key.address
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub fn state(&self) -> ComponentState {
        self.lifecycle.read().state
    }

    pub fn drivers(&self) -> &[Box<dyn DriverHandle>] {
        &self.drivers
    }

    pub fn driver_statuses(&self) -> Vec<DriverStatus> {
        self.lifecycle.read().drivers.clone()
    }

    /// Bus controllers touched by this component's drivers, ascending
    pub fn buses(&self) -> Vec<u16> {
        let mut buses: Vec<u16> = self.drivers.iter().map(|d| d.address().bus).collect();
        buses.push(self.key.address.bus);
        buses.sort_unstable();
        buses.dedup();
        buses
    }

    fn transition_error(&self, from: ComponentState, to: &str) -> PlinthError {
        PlinthError::InvalidTransition {
            component: self.key.to_string(),
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    /// Bring up every driver in declaration order.
    ///
    /// Driver failures never abort the loop and never surface as `Err`; they
    /// are recorded and reflected in the final state. `Err` is returned only
    /// when the component is not `Uninitialized`.
    pub fn initialize(&self) -> Result<InitOutcome> {
        {
            let mut lc = self.lifecycle.write();
            if lc.state != ComponentState::Uninitialized {
                return Err(self.transition_error(lc.state, "initializing"));
            }
            lc.state = ComponentState::Initializing;
        }
        debug!("Initializing {} ({} drivers)", self.key, self.drivers.len());

        let mut failures = Vec::new();
        for (index, driver) in self.drivers.iter().enumerate() {
            let status = match driver.initialize() {
                Ok(()) => DriverStatus::Ready,
                Err(error) => {
                    warn!("{}: driver #{} ({} @ {}) failed: {}", self.key, index, driver.kind(), driver.address(), error);
                    let status = DriverStatus::from_error(&error);
                    failures.push(DriverFailure {
                        index,
                        driver: driver.kind(),
                        address: driver.address(),
                        error,
                    });
                    status
                }
            };
            self.lifecycle.write().drivers[index] = status;
        }

        let total = self.drivers.len();
        let state = if failures.is_empty() {
            ComponentState::Healthy
        } else if failures.len() == total {
            ComponentState::Failed
        } else {
            ComponentState::Degraded
        };
        self.lifecycle.write().state = state;
        info!("{} is {} ({}/{} drivers ok)", self.key, state, total - failures.len(), total);

        Ok(InitOutcome {
            key: self.key,
            state,
            ready: total - failures.len(),
            failures,
        })
    }

    /// Return a settled component to `Uninitialized` so it can be brought up again
    pub fn reset(&self) -> Result<()> {
        let mut lc = self.lifecycle.write();
        if lc.state == ComponentState::Initializing {
            return Err(self.transition_error(lc.state, "uninitialized"));
        }
        lc.state = ComponentState::Uninitialized;
        lc.drivers.iter_mut().for_each(|s| *s = DriverStatus::Pending);
        Ok(())
    }

    /// Force the component into `Failed` after its initialization was lost
    pub fn mark_failed(&self, reason: &str) {
        let mut lc = self.lifecycle.write();
        for status in lc.drivers.iter_mut() {
            if *status == DriverStatus::Pending {
                *status = DriverStatus::Failed {
                    kind: ErrorKind::Internal,
                    message: reason.to_string(),
                };
            }
        }
        lc.state = ComponentState::Failed;
        warn!("{} marked failed: {}", self.key, reason);
    }

    /// Append sensor descriptors. Duplicates are accepted.
    pub fn add_sensors<I>(&self, descriptors: I)
    where
        I: IntoIterator<Item = SensorDescriptor>,
    {
        self.sensors.write().extend(descriptors);
    }

    /// Append temperature zones on consecutive channels of the first driver
    pub fn add_temp_sensors<I, S>(&self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.sensors.write().extend_temperatures(names);
    }

    pub fn sensors(&self) -> Vec<SensorDescriptor> {
        self.sensors.read().as_slice().to_vec()
    }

    pub fn sensor_names(&self) -> Vec<String> {
        self.sensors.read().names()
    }

    fn read_descriptor(&self, descriptor: &SensorDescriptor) -> Result<f64> {
        let driver = self.drivers.get(descriptor.source.driver).ok_or_else(|| PlinthError::InvalidDescriptor {
            sensor: descriptor.name.clone(),
            reason: format!(
                "driver #{} does not exist on {} ({} drivers)",
                descriptor.source.driver,
                self.key,
                self.drivers.len()
            ),
        })?;
        let raw = driver.read_field(&descriptor.source.field)?;
        Ok(descriptor.derive(raw))
    }

    /// Derived value of the first sensor called `name`
    pub fn read_sensor(&self, name: &str) -> Result<SensorReading> {
        let descriptor = self
            .sensors
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| PlinthError::NotFound(format!("sensor {} on {}", name, self.key)))?;
        let value = self.read_descriptor(&descriptor)?;
        Ok(SensorReading { name: descriptor.name, value })
    }

    /// Every sensor in reporting order
    pub fn read_sensors(&self) -> Vec<(String, Result<f64>)> {
        let descriptors = self.sensors();
        descriptors
            .iter()
            .map(|d| (d.name.clone(), self.read_descriptor(d)))
            .collect()
    }

    /// Probe every driver. Transport faults are collected, never returned.
    pub fn health_check(&self) -> HealthReport {
        let mut report = HealthReport::default();
        for (index, driver) in self.drivers.iter().enumerate() {
            match driver.health_check() {
                Ok(true) => report.alive += 1,
                Ok(false) => report.absent += 1,
                Err(e) => {
                    warn!("{}: health probe of driver #{} failed: {}", self.key, index, e);
                    report.faults.push((index, e.to_string()));
                }
            }
        }
        report
    }

    pub fn summary(&self) -> ComponentSummary {
        let statuses = self.driver_statuses();
        ComponentSummary {
            key: self.key.to_string(),
            kind: self.key.kind,
            address: self.key.address,
            priority: self.priority,
            state: self.state(),
            drivers: self
                .drivers
                .iter()
                .zip(statuses)
                .map(|(d, status)| DriverSummary {
                    driver: d.kind(),
                    address: d.address(),
                    status,
                })
                .collect(),
            sensors: self.sensors(),
        }
    }
}

impl fmt::Debug for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Component")
            .field("key", &self.key)
            .field("priority", &self.priority)
            .field("drivers", &self.drivers.len())
            .field("state", &self.state())
            .finish()
    }
}
