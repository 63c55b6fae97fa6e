//! Platform assembly
//!
//! Turns a [`PlatformConfig`] into a populated [`Registry`] and a configured
//! [`Sequencer`], and owns both for the life of the process.

use std::sync::Arc;

use tracing::{debug, info};

use crate::component::Component;
use crate::constants::paths;
use crate::data::{validate_platform_config, Backend, BringupReport, ComponentSpec, ComponentSummary, PlatformConfig};
use crate::driver::{DriverFactory, DriverHandle, KernelDriverFactory, SimulatedFactory};
use crate::error::Result;
use crate::registry::Registry;
use crate::sequencer::{CancelFlag, Sequencer, SequencerConfig};

/// Driver factory for the configured backend
pub fn factory_for(config: &PlatformConfig) -> Result<Box<dyn DriverFactory>> {
    match config.backend {
        Backend::Kernel => {
            let root = config
                .sysfs_root
                .clone()
                .unwrap_or_else(|| paths::I2C_DEVICES.into());
            debug!("Using kernel drivers under {}", root.display());
            Ok(Box::new(KernelDriverFactory::new(root)))
        }
        Backend::Simulated => Ok(Box::new(simulated_factory(config)?)),
    }
}

/// Simulated factory seeded with every `simulate` entry of the description
pub fn simulated_factory(config: &PlatformConfig) -> Result<SimulatedFactory> {
    let mut factory = SimulatedFactory::new();
    for spec in &config.components {
        let address = spec.bus_address()?;
        if let Some(behavior) = &spec.simulate {
            factory.set_behavior(address, spec.kind.default_driver(), behavior.clone());
        }
        for driver in &spec.drivers {
            if let Some(behavior) = &driver.simulate {
                factory.set_behavior(driver.bus_address(spec)?, driver.kind, behavior.clone());
            }
        }
    }
    Ok(factory)
}

pub fn sequencer_config(config: &PlatformConfig) -> SequencerConfig {
    SequencerConfig {
        max_workers: config.max_workers,
    }
}

fn build_component(spec: &ComponentSpec, factory: &dyn DriverFactory) -> Result<Component> {
    let address = spec.bus_address()?;
    let mut builder = Component::builder(spec.kind, address).options(spec.driver_options.clone());
    if let Some(priority) = spec.priority {
        builder = builder.priority(priority);
    }
    if !spec.drivers.is_empty() {
        let drivers = spec
            .drivers
            .iter()
            .map(|d| factory.create(d.bus_address(spec)?, d.kind, &d.options()))
            .collect::<Result<Vec<Box<dyn DriverHandle>>>>()?;
        builder = builder.drivers(drivers);
    }

    let component = builder.build(factory)?;
    component.add_temp_sensors(spec.temp_sensors.iter().cloned());
    component.add_sensors(spec.sensors.iter().cloned());
    Ok(component)
}

/// Validate `config` and register every component it lists, in file order
pub fn build_registry_with(config: &PlatformConfig, factory: &dyn DriverFactory) -> Result<Registry> {
    validate_platform_config(config)?;
    let registry = Registry::new();
    for spec in &config.components {
        registry.register(build_component(spec, factory)?)?;
    }
    info!("Registered {} component(s)", registry.len());
    Ok(registry)
}

pub fn build_registry(config: &PlatformConfig) -> Result<Registry> {
    let factory = factory_for(config)?;
    build_registry_with(config, factory.as_ref())
}

/// Registry plus sequencer for one platform
#[derive(Debug)]
pub struct Platform {
    registry: Arc<Registry>,
    sequencer: Sequencer,
}

impl Platform {
    pub fn new(registry: Registry, config: SequencerConfig) -> Self {
        Self {
            registry: Arc::new(registry),
            sequencer: Sequencer::new(config),
        }
    }

    pub fn from_config(config: &PlatformConfig) -> Result<Self> {
        Ok(Self::new(build_registry(config)?, sequencer_config(config)))
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub async fn bring_up(&self, cancel: &CancelFlag) -> Result<BringupReport> {
        self.sequencer.run(&self.registry, cancel).await
    }

    pub fn inventory(&self) -> Vec<ComponentSummary> {
        self.registry.inventory()
    }

    /// Tear the registry down. Returns how many components were dropped.
    pub fn shutdown(&self) -> usize {
        self.registry.teardown().len()
    }
}
