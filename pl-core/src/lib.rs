//! Plinth Core Library
//!
//! Hardware platform bring-up for I2C-attached devices.
//!
//! # Features
//!
//! - **Driver Handles**: Uniform access to kernel-bound or simulated devices
//! - **Components**: Logical units owning several drivers, with failure containment
//! - **Registry**: Copy-on-write catalog keyed by (bus address, kind)
//! - **Sequencer**: Priority-ordered, bus-safe concurrent initialization
//! - **Sensors**: Named readings derived from driver attributes
//!
//! # Module Structure
//!
//! - `data/` - Data types, platform description, reports
//! - `driver/` - Driver handle trait and its kernel and simulated backends
//!
//! # Example
//!
//! ```no_run
//! use pl_core::{load_platform_config, CancelFlag, Platform};
//!
//! # async fn run() -> pl_core::Result<()> {
//! let config = load_platform_config("/etc/plinth/platform.json".as_ref())?;
//! let platform = Platform::from_config(&config)?;
//! let report = platform.bring_up(&CancelFlag::new()).await?;
//! println!("{} healthy", report.healthy);
//! # Ok(())
//! # }
//! ```

// Grouped modules
pub mod data;
pub mod driver;

// Standalone modules
pub mod component;
pub mod constants;
pub mod error;
pub mod platform;
pub mod registry;
pub mod sensors;
pub mod sequencer;

// Re-export primary types from data/
pub use data::{
    BandReport, BringupReport, BusAddress, ComponentKey, ComponentKind, ComponentState, ComponentSummary,
    DriverKind, DriverStatus, DriverSummary, FailureEntry, Priority,
};

// Re-export config functions from data/
pub use data::{config_path, load_platform_config, validate_platform_config, Backend, ComponentSpec, DriverSpec, PlatformConfig};

pub use driver::{
    BindPolicy, DriverFactory, DriverHandle, DriverOptions, FnFactory, KernelDriver, KernelDriverFactory,
    SimBehavior, SimulatedDriver, SimulatedFactory,
};

pub use component::{Component, ComponentBuilder, DriverFailure, HealthReport, InitOutcome};
pub use error::{ErrorKind, PlinthError, Result};
pub use platform::{build_registry, build_registry_with, factory_for, sequencer_config, simulated_factory, Platform};
pub use registry::{Band, PriorityBands, Registry, RegistrySnapshot};
pub use sensors::{SensorDescriptor, SensorReading, SensorSet, SensorSource};
pub use sequencer::{CancelFlag, Sequencer, SequencerConfig};
