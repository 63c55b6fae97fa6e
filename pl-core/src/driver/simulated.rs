//! In-memory driver handles for dry runs and tests

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::data::{BusAddress, DriverKind};
use crate::error::{PlinthError, Result};

use super::{DriverFactory, DriverHandle, DriverOptions};

/// Scripted behaviour of a simulated device
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SimBehavior {
    /// Device answers but identifies wrongly during bring-up
    #[serde(default)]
    pub fail_init: bool,
    /// Device never acknowledges
    #[serde(default)]
    pub absent: bool,
    /// Every transaction fails at the transport level
    #[serde(default)]
    pub bus_fault: bool,
    /// Initial attribute values
    #[serde(default)]
    pub fields: HashMap<String, i64>,
}

impl SimBehavior {
    pub fn healthy() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self { fail_init: true, ..Self::default() }
    }

    pub fn absent() -> Self {
        Self { absent: true, ..Self::default() }
    }

    pub fn with_field(mut self, name: impl Into<String>, value: i64) -> Self {
        self.fields.insert(name.into(), value);
        self
    }
}

#[derive(Debug)]
pub struct SimulatedDriver {
    address: BusAddress,
    kind: DriverKind,
    behavior: SimBehavior,
    options: DriverOptions,
    fields: RwLock<HashMap<String, i64>>,
    init_calls: AtomicU32,
}

impl SimulatedDriver {
    pub fn new(address: BusAddress, kind: DriverKind, behavior: SimBehavior) -> Self {
        Self::with_options(address, kind, behavior, DriverOptions::default())
    }

    pub fn with_options(address: BusAddress, kind: DriverKind, behavior: SimBehavior, options: DriverOptions) -> Self {
        let fields = RwLock::new(behavior.fields.clone());
        Self {
            address,
            kind,
            behavior,
            options,
            fields,
            init_calls: AtomicU32::new(0),
        }
    }

    /// Number of times `initialize` ran
    pub fn init_calls(&self) -> u32 {
        self.init_calls.load(Ordering::SeqCst)
    }

    pub fn set_field(&self, name: impl Into<String>, value: i64) {
        self.fields.write().insert(name.into(), value);
    }

    fn transport(&self) -> Result<()> {
        if self.behavior.bus_fault {
            return Err(PlinthError::bus(self.address, "simulated transport fault"));
        }
        Ok(())
    }
}

impl DriverHandle for SimulatedDriver {
    fn address(&self) -> BusAddress {
        self.address
    }

    fn kind(&self) -> DriverKind {
        self.kind
    }

    fn initialize(&self) -> Result<()> {
        self.init_calls.fetch_add(1, Ordering::SeqCst);
        self.transport()?;
        if self.behavior.absent {
            return Err(PlinthError::device_init(self.address, "no acknowledge"));
        }
        if self.behavior.fail_init {
            return Err(PlinthError::device_init(
                self.address,
                format!("unexpected identification (expected '{}')", self.options.expected_name(&self.kind)),
            ));
        }

        let mut fields = self.fields.write();
        for (name, value) in &self.options.init {
            if !self.kind.provides_field(name) {
                return Err(PlinthError::field_not_found(self.kind.kernel_name(), name.as_str()));
            }
            fields.insert(name.clone(), *value);
        }
        Ok(())
    }

    fn read_field(&self, name: &str) -> Result<i64> {
        if !self.kind.provides_field(name) {
            return Err(PlinthError::field_not_found(self.kind.kernel_name(), name));
        }
        self.transport()?;
        if self.behavior.absent {
            return Err(PlinthError::bus(self.address, "no acknowledge"));
        }
        self.fields
            .read()
            .get(name)
            .copied()
            .ok_or_else(|| PlinthError::bus(self.address, format!("attribute {} missing", name)))
    }

    fn health_check(&self) -> Result<bool> {
        self.transport()?;
        Ok(!self.behavior.absent)
    }
}

/// Factory handing out [`SimulatedDriver`]s with per-device behaviour
#[derive(Debug, Clone, Default)]
pub struct SimulatedFactory {
    behaviors: HashMap<(BusAddress, DriverKind), SimBehavior>,
    fallback: SimBehavior,
}

impl SimulatedFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Behaviour for one (address, kind) pair
    pub fn with_behavior(mut self, address: BusAddress, kind: DriverKind, behavior: SimBehavior) -> Self {
        self.behaviors.insert((address, kind), behavior);
        self
    }

    pub fn set_behavior(&mut self, address: BusAddress, kind: DriverKind, behavior: SimBehavior) {
        self.behaviors.insert((address, kind), behavior);
    }

    /// Behaviour for every device without an explicit entry
    pub fn with_fallback(mut self, behavior: SimBehavior) -> Self {
        self.fallback = behavior;
        self
    }
}

impl DriverFactory for SimulatedFactory {
    fn create(
        &self,
        address: BusAddress,
        kind: DriverKind,
        options: &DriverOptions,
    ) -> Result<Box<dyn DriverHandle>> {
        let behavior = self
            .behaviors
            .get(&(address, kind))
            .cloned()
            .unwrap_or_else(|| self.fallback.clone());
        Ok(Box::new(SimulatedDriver::with_options(address, kind, behavior, options.clone())))
    }
}
