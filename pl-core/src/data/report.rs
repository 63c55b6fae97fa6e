//! Bring-up and inventory reports
//!
//! These types are the read-only surface consumed by reporting layers; all of
//! them serialize to JSON.

use serde::Serialize;

use super::types::{BusAddress, ComponentKind, ComponentState, DriverKind, DriverStatus, Priority};
use crate::error::ErrorKind;
use crate::sensors::SensorDescriptor;

/// Current view of one driver handle
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DriverSummary {
    pub driver: DriverKind,
    pub address: BusAddress,
    #[serde(flatten)]
    pub status: DriverStatus,
}

/// Current view of one registered component
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComponentSummary {
    pub key: String,
    pub kind: ComponentKind,
    pub address: BusAddress,
    pub priority: Priority,
    pub state: ComponentState,
    pub drivers: Vec<DriverSummary>,
    pub sensors: Vec<SensorDescriptor>,
}

/// One failed driver (or a whole component when `driver` is `None`)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailureEntry {
    pub component: String,
    pub driver: Option<usize>,
    pub driver_kind: Option<DriverKind>,
    pub kind: ErrorKind,
    pub message: String,
}

/// Components of one priority band, in registration order
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BandReport {
    pub priority: Priority,
    pub components: Vec<String>,
}

/// Aggregate result of one bring-up pass
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BringupReport {
    /// Components whose initialization was started
    pub attempted: usize,
    pub healthy: usize,
    pub degraded: usize,
    pub failed: usize,
    /// Already initialized before this pass
    pub skipped: usize,
    /// Left untouched because the pass was cancelled
    pub not_attempted: usize,
    pub cancelled: bool,
    pub bands: Vec<BandReport>,
    pub failures: Vec<FailureEntry>,
    pub elapsed_ms: u64,
}

impl BringupReport {
    pub fn count(&self, state: ComponentState) -> usize {
        match state {
            ComponentState::Healthy => self.healthy,
            ComponentState::Degraded => self.degraded,
            ComponentState::Failed => self.failed,
            ComponentState::Uninitialized | ComponentState::Initializing => 0,
        }
    }

    /// True when every attempted component came up fully
    pub fn is_clean(&self) -> bool {
        self.degraded == 0 && self.failed == 0 && !self.cancelled
    }

    /// Failures recorded for one component key
    pub fn failures_for<'a>(&'a self, component: &'a str) -> impl Iterator<Item = &'a FailureEntry> + 'a {
        self.failures.iter().filter(move |f| f.component == component)
    }
}
