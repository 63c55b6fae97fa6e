//! Platform description
//!
//! A platform is described by a JSON file listing every component, its bus
//! address, optional explicit drivers and the sensors it carries.

use std::collections::HashSet;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::types::{BusAddress, ComponentKind, DriverKind, Priority};
use crate::constants::{limits, paths};
use crate::driver::{DriverOptions, SimBehavior};
use crate::error::{PlinthError, Result};
use crate::sensors::SensorDescriptor;

/// Which driver implementation library backs the platform
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    Kernel,
    Simulated,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PlatformConfig {
    #[serde(default)]
    pub backend: Backend,
    /// Root of the I2C sysfs tree (defaults to `/sys/bus/i2c/devices`)
    #[serde(default)]
    pub sysfs_root: Option<PathBuf>,
    /// Upper bound on concurrent initializations within a band
    #[serde(default)]
    pub max_workers: Option<usize>,
    pub components: Vec<ComponentSpec>,
}

/// One component entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ComponentSpec {
    pub kind: ComponentKind,
    pub bus: u16,
    pub address: u16,
    #[serde(default)]
    pub priority: Option<Priority>,
    /// Options for the default driver, used when `drivers` is empty
    #[serde(default)]
    pub driver_options: DriverOptions,
    #[serde(default)]
    pub drivers: Vec<DriverSpec>,
    /// Temperature zones, assigned to consecutive channels of driver 0
    #[serde(default)]
    pub temp_sensors: Vec<String>,
    #[serde(default)]
    pub sensors: Vec<SensorDescriptor>,
    /// Simulated behaviour of the default driver
    #[serde(default)]
    pub simulate: Option<SimBehavior>,
}

/// An explicit driver attached to a component
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DriverSpec {
    pub kind: DriverKind,
    /// Defaults to the component's bus
    #[serde(default)]
    pub bus: Option<u16>,
    /// Defaults to the component's address
    #[serde(default)]
    pub address: Option<u16>,
    #[serde(default)]
    pub kernel_name: Option<String>,
    #[serde(default)]
    pub expected_name: Option<String>,
    #[serde(default)]
    pub init: Vec<(String, i64)>,
    #[serde(default)]
    pub simulate: Option<SimBehavior>,
}

impl ComponentSpec {
    pub fn bus_address(&self) -> Result<BusAddress> {
        BusAddress::new(self.bus, self.address)
    }

    /// Number of drivers the built component will own
    pub fn driver_count(&self) -> usize {
        self.drivers.len().max(1)
    }
}

impl DriverSpec {
    pub fn bus_address(&self, component: &ComponentSpec) -> Result<BusAddress> {
        BusAddress::new(
            self.bus.unwrap_or(component.bus),
            self.address.unwrap_or(component.address),
        )
    }

    pub fn options(&self) -> DriverOptions {
        DriverOptions {
            kernel_name: self.kernel_name.clone(),
            expected_name: self.expected_name.clone(),
            init: self.init.clone(),
        }
    }
}

/// Resolve the platform description path.
///
/// Order: explicit path, `PLINTH_CONFIG`, the user config directory if the
/// file exists there, then `/etc/plinth/platform.json`.
pub fn config_path(explicit: Option<&Path>) -> PathBuf {
    if let Some(path) = explicit {
        return path.to_path_buf();
    }
    if let Ok(path) = env::var(paths::CONFIG_ENV) {
        if !path.is_empty() {
            return PathBuf::from(path);
        }
    }
    if let Some(dir) = paths::user_config_dir() {
        let candidate = dir.join(paths::PLATFORM_FILE);
        if candidate.exists() {
            return candidate;
        }
    }
    Path::new(paths::CONFIG_DIR).join(paths::PLATFORM_FILE)
}

/// Read, parse and validate a platform description
pub fn load_platform_config(path: &Path) -> Result<PlatformConfig> {
    let meta = fs::metadata(path).map_err(|e| PlinthError::FileRead {
        path: path.to_path_buf(),
        source: e,
    })?;
    if meta.len() > limits::MAX_CONFIG_FILE_SIZE {
        return Err(PlinthError::FileTooLarge {
            path: path.to_path_buf(),
            size: meta.len(),
            max_size: limits::MAX_CONFIG_FILE_SIZE,
        });
    }

    let data = fs::read_to_string(path).map_err(|e| PlinthError::FileRead {
        path: path.to_path_buf(),
        source: e,
    })?;
    let config: PlatformConfig = serde_json::from_str(&data)?;
    validate_platform_config(&config)?;
    Ok(config)
}

/// Structural checks run before anything is built
pub fn validate_platform_config(config: &PlatformConfig) -> Result<()> {
    if config.components.len() > limits::MAX_COMPONENTS {
        return Err(PlinthError::invalid_config(
            "components",
            format!("{} entries (max {})", config.components.len(), limits::MAX_COMPONENTS),
        ));
    }
    if config.max_workers == Some(0) {
        return Err(PlinthError::invalid_config("max_workers", "must be at least 1"));
    }

    let mut seen = HashSet::new();
    for (i, spec) in config.components.iter().enumerate() {
        let field = format!("components[{}]", i);
        let address = spec
            .bus_address()
            .map_err(|e| PlinthError::invalid_config(&field, e.to_string()))?;

        if !seen.insert((address, spec.kind)) {
            return Err(PlinthError::invalid_config(
                &field,
                format!("duplicate {} at {}", spec.kind, address),
            ));
        }

        if spec.drivers.len() > limits::MAX_DRIVERS_PER_COMPONENT {
            return Err(PlinthError::invalid_config(
                format!("{}.drivers", field),
                format!("{} drivers (max {})", spec.drivers.len(), limits::MAX_DRIVERS_PER_COMPONENT),
            ));
        }
        if !spec.drivers.is_empty() {
            if spec.driver_options != DriverOptions::default() {
                return Err(PlinthError::invalid_config(
                    format!("{}.driver_options", field),
                    "only applies to the default driver; set options on each entry of drivers",
                ));
            }
            if spec.simulate.is_some() {
                return Err(PlinthError::invalid_config(
                    format!("{}.simulate", field),
                    "only applies to the default driver; set simulate on each entry of drivers",
                ));
            }
        }
        for (j, driver) in spec.drivers.iter().enumerate() {
            driver
                .bus_address(spec)
                .map_err(|e| PlinthError::invalid_config(format!("{}.drivers[{}]", field, j), e.to_string()))?;
        }

        let drivers = spec.driver_count();
        for sensor in &spec.sensors {
            if sensor.source.driver >= drivers {
                return Err(PlinthError::invalid_config(
                    format!("{}.sensors", field),
                    format!(
                        "sensor '{}' references driver #{} but only {} exist",
                        sensor.name, sensor.source.driver, drivers
                    ),
                ));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const SAMPLE: &str = r#"{
        "backend": "simulated",
        "max_workers": 2,
        "components": [
            { "kind": "temp_sensor_hub", "bus": 3, "address": 76,
              "temp_sensors": ["inlet", "outlet"],
              "simulate": { "fields": { "temp1_input": 41000 } } },
            { "kind": "power_supply", "bus": 5, "address": 88,
              "drivers": [
                { "kind": "pmbus" },
                { "kind": "at24", "address": 80, "simulate": { "fail_init": true } }
              ],
              "sensors": [ { "name": "vin", "driver": 0, "field": "in1_input", "scale": 0.001 } ] }
        ]
    }"#;

    fn write_temp(contents: &str) -> NamedTempFile {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        f
    }

    #[test]
    fn test_load_sample() {
        let f = write_temp(SAMPLE);
        let config = load_platform_config(f.path()).unwrap();
        assert_eq!(config.backend, Backend::Simulated);
        assert_eq!(config.max_workers, Some(2));
        assert_eq!(config.components.len(), 2);

        let psu = &config.components[1];
        assert_eq!(psu.driver_count(), 2);
        let eeprom = psu.drivers[1].bus_address(psu).unwrap();
        assert_eq!(eeprom, BusAddress::new(5, 80).unwrap());
        assert!(psu.drivers[1].simulate.as_ref().unwrap().fail_init);
    }

    #[test]
    fn test_defaults() {
        let config: PlatformConfig =
            serde_json::from_str(r#"{"components": [{"kind": "eeprom", "bus": 1, "address": 80}]}"#).unwrap();
        assert_eq!(config.backend, Backend::Kernel);
        assert!(config.sysfs_root.is_none());
        assert!(config.components[0].priority.is_none());
        assert!(validate_platform_config(&config).is_ok());
    }

    #[test]
    fn test_unknown_fields_rejected() {
        let result: std::result::Result<PlatformConfig, _> =
            serde_json::from_str(r#"{"components": [], "colour": "blue"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_rejects_bad_address() {
        let config: PlatformConfig =
            serde_json::from_str(r#"{"components": [{"kind": "eeprom", "bus": 1, "address": 200}]}"#).unwrap();
        assert!(matches!(
            validate_platform_config(&config),
            Err(PlinthError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn test_validate_rejects_duplicates() {
        let config: PlatformConfig = serde_json::from_str(
            r#"{"components": [
                {"kind": "eeprom", "bus": 1, "address": 80},
                {"kind": "eeprom", "bus": 1, "address": 80}
            ]}"#,
        )
        .unwrap();
        assert!(validate_platform_config(&config).is_err());

        // Same address, different kind is a distinct component
        let config: PlatformConfig = serde_json::from_str(
            r#"{"components": [
                {"kind": "eeprom", "bus": 1, "address": 80},
                {"kind": "led_controller", "bus": 1, "address": 80}
            ]}"#,
        )
        .unwrap();
        assert!(validate_platform_config(&config).is_ok());
    }

    #[test]
    fn test_validate_rejects_dangling_sensor_driver() {
        let config: PlatformConfig = serde_json::from_str(
            r#"{"components": [{"kind": "temp_sensor_hub", "bus": 3, "address": 76,
                "sensors": [{"name": "x", "driver": 1, "field": "temp1_input"}]}]}"#,
        )
        .unwrap();
        assert!(validate_platform_config(&config).is_err());
    }

    #[test]
    fn test_validate_rejects_default_driver_settings_with_explicit_drivers() {
        let config: PlatformConfig = serde_json::from_str(
            r#"{"components": [{"kind": "power_supply", "bus": 5, "address": 88,
                "simulate": {"bus_fault": true},
                "drivers": [{"kind": "pmbus"}]}]}"#,
        )
        .unwrap();
        let err = validate_platform_config(&config).unwrap_err();
        assert!(err.to_string().contains("components[0].simulate"));

        let config: PlatformConfig = serde_json::from_str(
            r#"{"components": [{"kind": "power_supply", "bus": 5, "address": 88,
                "driver_options": {"kernel_name": "pmbus"},
                "drivers": [{"kind": "pmbus"}]}]}"#,
        )
        .unwrap();
        let err = validate_platform_config(&config).unwrap_err();
        assert!(err.to_string().contains("components[0].driver_options"));

        // Without explicit drivers both apply to the default driver
        let config: PlatformConfig = serde_json::from_str(
            r#"{"components": [{"kind": "power_supply", "bus": 5, "address": 88,
                "driver_options": {"kernel_name": "pmbus"},
                "simulate": {"bus_fault": true}}]}"#,
        )
        .unwrap();
        assert!(validate_platform_config(&config).is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_workers() {
        let config: PlatformConfig = serde_json::from_str(r#"{"max_workers": 0, "components": []}"#).unwrap();
        assert!(validate_platform_config(&config).is_err());
    }

    #[test]
    fn test_missing_file() {
        let err = load_platform_config(Path::new("/nonexistent/plinth/platform.json")).unwrap_err();
        assert!(matches!(err, PlinthError::FileRead { .. }));
    }

    #[test]
    fn test_malformed_json() {
        let f = write_temp("{ not json");
        assert!(matches!(load_platform_config(f.path()), Err(PlinthError::JsonParse(_))));
    }

    #[test]
    #[serial]
    fn test_config_path_resolution() {
        let explicit = Path::new("/tmp/explicit.json");
        assert_eq!(config_path(Some(explicit)), explicit);

        env::set_var(paths::CONFIG_ENV, "/tmp/from-env.json");
        assert_eq!(config_path(None), PathBuf::from("/tmp/from-env.json"));

        env::remove_var(paths::CONFIG_ENV);
        let dir = tempfile::TempDir::new().unwrap();
        let old_xdg = env::var("XDG_CONFIG_HOME").ok();
        env::set_var("XDG_CONFIG_HOME", dir.path());
        assert_eq!(config_path(None), PathBuf::from("/etc/plinth/platform.json"));

        fs::create_dir_all(dir.path().join("plinth")).unwrap();
        fs::write(dir.path().join("plinth").join("platform.json"), "{}").unwrap();
        assert_eq!(config_path(None), dir.path().join("plinth").join("platform.json"));

        match old_xdg {
            Some(v) => env::set_var("XDG_CONFIG_HOME", v),
            None => env::remove_var("XDG_CONFIG_HOME"),
        }
    }
}
