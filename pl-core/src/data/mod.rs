//! Data types, configuration, and reports
//!
//! Contains the core data structures shared by drivers, components and the
//! sequencer, plus the platform description format.

mod config;
mod report;
mod types;

pub use config::{
    config_path, load_platform_config, validate_platform_config, Backend, ComponentSpec, DriverSpec,
    PlatformConfig,
};
pub use report::{BandReport, BringupReport, ComponentSummary, DriverSummary, FailureEntry};
pub use types::{BusAddress, ComponentKey, ComponentKind, ComponentState, DriverKind, DriverStatus, Priority};
