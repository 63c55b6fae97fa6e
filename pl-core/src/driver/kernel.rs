//! Kernel-backed driver handles
//!
//! Devices are instantiated through the I2C adapter's `new_device` attribute
//! and then read through the attributes their kernel driver exports.
//!
//! # Layout
//!
//! ```text
//! {root}/i2c-3/new_device            <- "max6697 0x4c"
//! {root}/3-004c/name                 <- "max6697"
//! {root}/3-004c/hwmon/hwmon5/temp1_input
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use tracing::{debug, trace};

use crate::constants::{kernel, paths};
use crate::data::{BusAddress, DriverKind};
use crate::error::{PlinthError, Result};

use super::{DriverFactory, DriverHandle, DriverOptions};

/// How long to wait for a freshly instantiated device to bind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BindPolicy {
    pub attempts: u32,
    pub interval: Duration,
}

impl Default for BindPolicy {
    fn default() -> Self {
        Self {
            attempts: kernel::BIND_ATTEMPTS,
            interval: kernel::BIND_POLL_INTERVAL,
        }
    }
}

/// Driver handle bound to one I2C client through sysfs
#[derive(Debug)]
pub struct KernelDriver {
    address: BusAddress,
    kind: DriverKind,
    root: PathBuf,
    options: DriverOptions,
    bind: BindPolicy,
}

impl KernelDriver {
    pub fn new(root: impl Into<PathBuf>, address: BusAddress, kind: DriverKind, options: DriverOptions) -> Self {
        Self {
            address,
            kind,
            root: root.into(),
            options,
            bind: BindPolicy::default(),
        }
    }

    pub fn with_bind_policy(mut self, bind: BindPolicy) -> Self {
        self.bind = bind;
        self
    }

    pub fn device_dir(&self) -> PathBuf {
        self.root.join(self.address.sysfs_name())
    }

    fn adapter_dir(&self) -> PathBuf {
        self.root.join(format!("i2c-{}", self.address.bus))
    }

    /// Ask the adapter to instantiate the client, then wait for it to appear
    fn bind_device(&self, device_dir: &Path) -> Result<()> {
        let adapter = self.adapter_dir();
        if !adapter.is_dir() {
            return Err(PlinthError::bus(
                self.address,
                format!("adapter {} not present", adapter.display()),
            ));
        }

        let request = format!("{} {:#04x}", self.options.kernel_name(&self.kind), self.address.address);
        debug!("Instantiating {} via {:?}: {}", self.address, adapter, request);
        fs::write(adapter.join("new_device"), &request)
            .map_err(|e| PlinthError::bus(self.address, format!("new_device write failed: {}", e)))?;

        for attempt in 0..self.bind.attempts {
            if device_dir.is_dir() {
                trace!("{} bound after {} polls", self.address, attempt);
                return Ok(());
            }
            thread::sleep(self.bind.interval);
        }
        if device_dir.is_dir() {
            return Ok(());
        }

        Err(PlinthError::device_init(
            self.address,
            format!("{} did not bind (no acknowledge)", self.options.kernel_name(&self.kind)),
        ))
    }

    /// Locate an attribute in the client directory or its first hwmon child
    fn attribute_path(&self, name: &str) -> Option<PathBuf> {
        let dir = self.device_dir();
        let direct = dir.join(name);
        if direct.exists() {
            return Some(direct);
        }

        let mut hwmons: Vec<PathBuf> = fs::read_dir(dir.join("hwmon"))
            .ok()?
            .flatten()
            .map(|e| e.path())
            .filter(|p| p.is_dir())
            .collect();
        hwmons.sort();
        hwmons.into_iter().map(|h| h.join(name)).find(|p| p.exists())
    }

    fn read_identification(&self, device_dir: &Path) -> io::Result<String> {
        fs::read_to_string(device_dir.join("name")).map(|s| s.trim().to_string())
    }

    fn write_field(&self, name: &str, value: i64) -> Result<()> {
        if !self.kind.provides_field(name) {
            return Err(PlinthError::field_not_found(self.kind.kernel_name(), name));
        }
        let path = self
            .attribute_path(name)
            .ok_or_else(|| PlinthError::bus(self.address, format!("attribute {} missing", name)))?;
        trace!("{} <- {} = {}", self.address, name, value);
        fs::write(&path, value.to_string())
            .map_err(|e| PlinthError::bus(self.address, format!("write {} failed: {}", name, e)))
    }
}

impl DriverHandle for KernelDriver {
    fn address(&self) -> BusAddress {
        self.address
    }

    fn kind(&self) -> DriverKind {
        self.kind
    }

    fn initialize(&self) -> Result<()> {
        let device_dir = self.device_dir();
        if !device_dir.is_dir() {
            self.bind_device(&device_dir)?;
        }

        let found = self
            .read_identification(&device_dir)
            .map_err(|e| PlinthError::device_init(self.address, format!("unreadable identification: {}", e)))?;
        let expected = self.options.expected_name(&self.kind);
        if found != expected {
            return Err(PlinthError::device_init(
                self.address,
                format!("unexpected identification '{}' (expected '{}')", found, expected),
            ));
        }

        for (field, value) in &self.options.init {
            self.write_field(field, *value)?;
        }

        debug!("{} {} initialized", self.kind, self.address);
        Ok(())
    }

    fn read_field(&self, name: &str) -> Result<i64> {
        if !self.kind.provides_field(name) {
            return Err(PlinthError::field_not_found(self.kind.kernel_name(), name));
        }
        let path = self
            .attribute_path(name)
            .ok_or_else(|| PlinthError::bus(self.address, format!("attribute {} missing", name)))?;

        let content = fs::read_to_string(&path)
            .map_err(|e| PlinthError::bus(self.address, format!("read {} failed: {}", name, e)))?;
        content
            .trim()
            .parse::<i64>()
            .map_err(|e| PlinthError::bus(self.address, format!("malformed {} '{}': {}", name, content.trim(), e)))
    }

    fn health_check(&self) -> Result<bool> {
        let device_dir = self.device_dir();
        match self.read_identification(&device_dir) {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(PlinthError::bus(self.address, format!("health probe failed: {}", e))),
        }
    }
}

/// Factory producing [`KernelDriver`] handles rooted at one sysfs tree
#[derive(Debug, Clone)]
pub struct KernelDriverFactory {
    root: PathBuf,
    bind: BindPolicy,
}

impl KernelDriverFactory {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            bind: BindPolicy::default(),
        }
    }

    pub fn with_bind_policy(mut self, bind: BindPolicy) -> Self {
        self.bind = bind;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl Default for KernelDriverFactory {
    fn default() -> Self {
        Self::new(paths::I2C_DEVICES)
    }
}

impl DriverFactory for KernelDriverFactory {
    fn create(
        &self,
        address: BusAddress,
        kind: DriverKind,
        options: &DriverOptions,
    ) -> Result<Box<dyn DriverHandle>> {
        Ok(Box::new(
            KernelDriver::new(&self.root, address, kind, options.clone()).with_bind_policy(self.bind),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use tempfile::TempDir;

    fn quick() -> BindPolicy {
        BindPolicy { attempts: 2, interval: Duration::from_millis(1) }
    }

    fn addr() -> BusAddress {
        BusAddress::new(3, 0x4c).unwrap()
    }

    /// Lay out a bound max6697 with two hwmon temperatures
    fn bound_device(root: &Path) {
        let dev = root.join("3-004c");
        let hwmon = dev.join("hwmon").join("hwmon5");
        fs::create_dir_all(&hwmon).unwrap();
        fs::write(dev.join("name"), "max6697\n").unwrap();
        fs::write(hwmon.join("temp1_input"), "41500\n").unwrap();
        fs::write(hwmon.join("temp2_input"), "garbage").unwrap();
        fs::write(hwmon.join("temp1_max"), "85000").unwrap();
    }

    fn driver(root: &Path, options: DriverOptions) -> KernelDriver {
        KernelDriver::new(root, addr(), DriverKind::Max6697, options).with_bind_policy(quick())
    }

    #[test]
    fn test_initialize_bound_device() {
        let tmp = TempDir::new().unwrap();
        bound_device(tmp.path());
        let drv = driver(tmp.path(), DriverOptions::default());
        assert!(drv.initialize().is_ok());
    }

    #[test]
    fn test_initialize_applies_init_writes() {
        let tmp = TempDir::new().unwrap();
        bound_device(tmp.path());
        let opts = DriverOptions {
            init: vec![("temp1_max".into(), 90000)],
            ..Default::default()
        };
        let drv = driver(tmp.path(), opts);
        drv.initialize().unwrap();
        assert_eq!(drv.read_field("temp1_max").unwrap(), 90000);
    }

    #[test]
    fn test_initialize_rejects_wrong_identification() {
        let tmp = TempDir::new().unwrap();
        bound_device(tmp.path());
        fs::write(tmp.path().join("3-004c").join("name"), "lm75\n").unwrap();
        let err = driver(tmp.path(), DriverOptions::default()).initialize().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DeviceInit);
    }

    #[test]
    fn test_initialize_writes_new_device_and_times_out() {
        let tmp = TempDir::new().unwrap();
        let adapter = tmp.path().join("i2c-3");
        fs::create_dir_all(&adapter).unwrap();

        let err = driver(tmp.path(), DriverOptions::default()).initialize().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DeviceInit);
        let request = fs::read_to_string(adapter.join("new_device")).unwrap();
        assert_eq!(request, "max6697 0x4c");
    }

    #[test]
    fn test_initialize_without_adapter_is_bus_error() {
        let tmp = TempDir::new().unwrap();
        let err = driver(tmp.path(), DriverOptions::default()).initialize().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Bus);
    }

    #[test]
    fn test_read_field() {
        let tmp = TempDir::new().unwrap();
        bound_device(tmp.path());
        let drv = driver(tmp.path(), DriverOptions::default());
        assert_eq!(drv.read_field("temp1_input").unwrap(), 41500);
    }

    #[test]
    fn test_read_field_errors() {
        let tmp = TempDir::new().unwrap();
        bound_device(tmp.path());
        let drv = driver(tmp.path(), DriverOptions::default());

        assert_eq!(drv.read_field("fan1_input").unwrap_err().kind(), ErrorKind::FieldNotFound);
        assert_eq!(drv.read_field("temp2_input").unwrap_err().kind(), ErrorKind::Bus);
        assert_eq!(drv.read_field("temp3_input").unwrap_err().kind(), ErrorKind::Bus);
    }

    #[test]
    fn test_health_check_absent_is_false() {
        let tmp = TempDir::new().unwrap();
        let drv = driver(tmp.path(), DriverOptions::default());
        assert!(!drv.health_check().unwrap());

        bound_device(tmp.path());
        assert!(drv.health_check().unwrap());
    }

    #[test]
    fn test_factory_binds_address() {
        let tmp = TempDir::new().unwrap();
        let factory = KernelDriverFactory::new(tmp.path()).with_bind_policy(quick());
        let handle = factory.create(addr(), DriverKind::Max6697, &DriverOptions::default()).unwrap();
        assert_eq!(handle.address(), addr());
        assert_eq!(handle.kind(), DriverKind::Max6697);
        assert_eq!(factory.root(), tmp.path());
    }
}
