//! Core data types for Plinth
//!
//! Addresses, priorities, kinds and lifecycle states shared by every module.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::constants::i2c;
use crate::error::{ErrorKind, PlinthError, Result};

/// Address of a device on an I2C bus.
///
/// `bus` identifies the bus controller (the `i2c-N` adapter). Two devices with
/// the same `bus` share a controller and must never be driven concurrently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BusAddress {
    pub bus: u16,
    pub address: u8,
}

impl BusAddress {
    /// Validates a 7-bit, non-reserved client address
    pub fn new(bus: u16, address: u16) -> Result<Self> {
        if address < i2c::MIN_ADDRESS as u16 || address > i2c::MAX_ADDRESS as u16 {
            return Err(PlinthError::InvalidAddress { bus, address });
        }
        Ok(Self { bus, address: address as u8 })
    }

    /// Name of the client directory under `/sys/bus/i2c/devices`
    pub fn sysfs_name(&self) -> String {
        format!("{}-{:04x}", self.bus, self.address)
    }
}

impl fmt::Display for BusAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{:04x}", self.bus, self.address)
    }
}

/// Bring-up precedence. Lower variants are initialized first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Thermal,
    Power,
    Fan,
    Led,
    Default,
}

impl Priority {
    /// Every priority in bring-up order
    pub const ALL: [Priority; 5] = [
        Priority::Thermal,
        Priority::Power,
        Priority::Fan,
        Priority::Led,
        Priority::Default,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Thermal => "thermal",
            Priority::Power => "power",
            Priority::Fan => "fan",
            Priority::Led => "led",
            Priority::Default => "default",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Type of a hardware component
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentKind {
    TempSensorHub,
    FanController,
    PowerSupply,
    LedController,
    Eeprom,
}

impl ComponentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ComponentKind::TempSensorHub => "temp_sensor_hub",
            ComponentKind::FanController => "fan_controller",
            ComponentKind::PowerSupply => "power_supply",
            ComponentKind::LedController => "led_controller",
            ComponentKind::Eeprom => "eeprom",
        }
    }

    /// Priority used when the caller does not assign one
    pub fn default_priority(&self) -> Priority {
        match self {
            ComponentKind::TempSensorHub => Priority::Thermal,
            ComponentKind::PowerSupply => Priority::Power,
            ComponentKind::FanController => Priority::Fan,
            ComponentKind::LedController => Priority::Led,
            ComponentKind::Eeprom => Priority::Default,
        }
    }

    /// Driver constructed when the caller supplies none
    pub fn default_driver(&self) -> DriverKind {
        match self {
            ComponentKind::TempSensorHub => DriverKind::Max6697,
            ComponentKind::PowerSupply => DriverKind::Pmbus,
            ComponentKind::FanController => DriverKind::Emc2305,
            ComponentKind::LedController => DriverKind::Pca9555,
            ComponentKind::Eeprom => DriverKind::At24,
        }
    }
}

impl fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Attribute family exposed by a driver kind, e.g. `temp{1..8}_input`
struct FieldPattern {
    prefix: &'static str,
    indices: Option<(u8, u8)>,
    suffixes: &'static [&'static str],
}

const MAX6697_FIELDS: &[FieldPattern] = &[FieldPattern {
    prefix: "temp",
    indices: Some((1, 8)),
    suffixes: &["_input", "_max", "_crit", "_label", "_fault", "_max_alarm", "_crit_alarm"],
}];

const PMBUS_FIELDS: &[FieldPattern] = &[
    FieldPattern { prefix: "in", indices: Some((0, 8)), suffixes: &["_input", "_label", "_min", "_max", "_crit", "_lcrit"] },
    FieldPattern { prefix: "curr", indices: Some((1, 8)), suffixes: &["_input", "_label", "_max", "_crit"] },
    FieldPattern { prefix: "power", indices: Some((1, 4)), suffixes: &["_input", "_label", "_max"] },
    FieldPattern { prefix: "temp", indices: Some((1, 4)), suffixes: &["_input", "_max", "_crit"] },
    FieldPattern { prefix: "fan", indices: Some((1, 2)), suffixes: &["_input", "_target"] },
];

const EMC2305_FIELDS: &[FieldPattern] = &[
    FieldPattern { prefix: "fan", indices: Some((1, 5)), suffixes: &["_input", "_target", "_fault"] },
    FieldPattern { prefix: "pwm", indices: Some((1, 5)), suffixes: &["", "_enable"] },
];

const PCA9555_FIELDS: &[FieldPattern] = &[
    FieldPattern { prefix: "input", indices: Some((0, 1)), suffixes: &[""] },
    FieldPattern { prefix: "output", indices: Some((0, 1)), suffixes: &[""] },
    FieldPattern { prefix: "direction", indices: Some((0, 1)), suffixes: &[""] },
];

const AT24_FIELDS: &[FieldPattern] = &[FieldPattern { prefix: "size", indices: None, suffixes: &[""] }];

impl FieldPattern {
    fn matches(&self, field: &str) -> bool {
        let Some(rest) = field.strip_prefix(self.prefix) else {
            return false;
        };
        let rest = match self.indices {
            None => rest,
            Some((lo, hi)) => {
                let digits = rest.chars().take_while(|c| c.is_ascii_digit()).count();
                if digits == 0 {
                    return false;
                }
                match rest[..digits].parse::<u8>() {
                    Ok(idx) if (lo..=hi).contains(&idx) => &rest[digits..],
                    _ => return false,
                }
            }
        };
        self.suffixes.contains(&rest)
    }
}

/// Kind of kernel driver bound to a device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriverKind {
    Max6697,
    Pmbus,
    Emc2305,
    Pca9555,
    At24,
}

impl DriverKind {
    /// Linux kernel driver name, written to `new_device`
    pub fn kernel_name(&self) -> &'static str {
        match self {
            DriverKind::Max6697 => "max6697",
            DriverKind::Pmbus => "pmbus",
            DriverKind::Emc2305 => "emc2305",
            DriverKind::Pca9555 => "pca9555",
            DriverKind::At24 => "24c32",
        }
    }

    fn field_patterns(&self) -> &'static [FieldPattern] {
        match self {
            DriverKind::Max6697 => MAX6697_FIELDS,
            DriverKind::Pmbus => PMBUS_FIELDS,
            DriverKind::Emc2305 => EMC2305_FIELDS,
            DriverKind::Pca9555 => PCA9555_FIELDS,
            DriverKind::At24 => AT24_FIELDS,
        }
    }

    /// Whether `field` is a numeric attribute this driver kind exposes
    pub fn provides_field(&self, field: &str) -> bool {
        self.field_patterns().iter().any(|p| p.matches(field))
    }
}

impl fmt::Display for DriverKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.kernel_name())
    }
}

/// Registry key of a component: one component per kind per address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ComponentKey {
    pub address: BusAddress,
    pub kind: ComponentKind,
}

impl ComponentKey {
    pub fn new(address: BusAddress, kind: ComponentKind) -> Self {
        Self { address, kind }
    }
}

impl fmt::Display for ComponentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.kind, self.address)
    }
}

/// Component lifecycle: `Uninitialized -> Initializing -> {Healthy, Degraded, Failed}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentState {
    Uninitialized,
    Initializing,
    Healthy,
    Degraded,
    Failed,
}

impl ComponentState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ComponentState::Healthy | ComponentState::Degraded | ComponentState::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ComponentState::Uninitialized => "uninitialized",
            ComponentState::Initializing => "initializing",
            ComponentState::Healthy => "healthy",
            ComponentState::Degraded => "degraded",
            ComponentState::Failed => "failed",
        }
    }
}

impl fmt::Display for ComponentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Initialization status of one driver handle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DriverStatus {
    Pending,
    Ready,
    Failed { kind: ErrorKind, message: String },
}

impl DriverStatus {
    pub fn from_error(err: &PlinthError) -> Self {
        DriverStatus::Failed {
            kind: err.kind(),
            message: err.to_string(),
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, DriverStatus::Ready)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bus_address_validation() {
        assert!(BusAddress::new(3, 0x4c).is_ok());
        assert!(BusAddress::new(0, 0x03).is_ok());
        assert!(BusAddress::new(0, 0x77).is_ok());
        assert!(matches!(
            BusAddress::new(1, 0x02),
            Err(PlinthError::InvalidAddress { bus: 1, address: 0x02 })
        ));
        assert!(BusAddress::new(1, 0x78).is_err());
        assert!(BusAddress::new(1, 0x1ff).is_err());
    }

    #[test]
    fn test_bus_address_display_matches_sysfs() {
        let addr = BusAddress::new(3, 0x4c).unwrap();
        assert_eq!(addr.to_string(), "3-004c");
        assert_eq!(addr.sysfs_name(), "3-004c");
    }

    #[test]
    fn test_priority_order() {
        assert!(Priority::Thermal < Priority::Power);
        assert!(Priority::Power < Priority::Fan);
        assert!(Priority::Fan < Priority::Led);
        assert!(Priority::Led < Priority::Default);
        let mut sorted = Priority::ALL;
        sorted.sort();
        assert_eq!(sorted, Priority::ALL);
    }

    #[test]
    fn test_kind_defaults() {
        assert_eq!(ComponentKind::TempSensorHub.default_priority(), Priority::Thermal);
        assert_eq!(ComponentKind::TempSensorHub.default_driver(), DriverKind::Max6697);
        assert_eq!(ComponentKind::Eeprom.default_priority(), Priority::Default);
        assert_eq!(ComponentKind::PowerSupply.default_driver(), DriverKind::Pmbus);
    }

    #[test]
    fn test_field_patterns() {
        let k = DriverKind::Max6697;
        assert!(!k.provides_field("name"));
        assert!(k.provides_field("temp1_input"));
        assert!(k.provides_field("temp8_crit_alarm"));
        assert!(!k.provides_field("temp9_input"));
        assert!(!k.provides_field("temp0_input"));
        assert!(!k.provides_field("temp_input"));
        assert!(!k.provides_field("fan1_input"));

        assert!(DriverKind::Emc2305.provides_field("pwm2"));
        assert!(DriverKind::Emc2305.provides_field("pwm2_enable"));
        assert!(!DriverKind::Emc2305.provides_field("pwm6"));
        assert!(DriverKind::Pmbus.provides_field("in0_input"));
        assert!(DriverKind::At24.provides_field("size"));
        assert!(!DriverKind::At24.provides_field("size1"));
    }

    #[test]
    fn test_component_key_display() {
        let key = ComponentKey::new(BusAddress::new(3, 0x1a).unwrap(), ComponentKind::TempSensorHub);
        assert_eq!(key.to_string(), "temp_sensor_hub@3-001a");
    }

    #[test]
    fn test_state_serialization() {
        let json = serde_json::to_string(&ComponentState::Degraded).unwrap();
        assert_eq!(json, "\"degraded\"");
        let status = DriverStatus::Failed { kind: ErrorKind::Bus, message: "eio".into() };
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["status"], "failed");
        assert_eq!(json["kind"], "bus");
    }
}
