//! Driver handles
//!
//! A driver handle is the opaque interface to one physical device. The core
//! only ever talks to hardware through [`DriverHandle`], and only ever creates
//! handles through an injected [`DriverFactory`].
//!
//! Two implementations ship with the core:
//! - [`KernelDriver`]: binds a Linux kernel driver through sysfs and reads
//!   its hwmon attributes
//! - [`SimulatedDriver`]: in-memory device for dry runs and tests

mod kernel;
mod simulated;

use serde::{Deserialize, Serialize};

use crate::data::{BusAddress, DriverKind};
use crate::error::Result;

pub use kernel::{BindPolicy, KernelDriver, KernelDriverFactory};
pub use simulated::{SimBehavior, SimulatedDriver, SimulatedFactory};

/// Capability interface of a single device.
///
/// Every operation eventually returns; transport timeouts surface as
/// [`PlinthError::Bus`](crate::error::PlinthError::Bus).
#[cfg_attr(test, mockall::automock)]
pub trait DriverHandle: Send + Sync {
    /// Address this handle is bound to for its whole lifetime
    fn address(&self) -> BusAddress;

    fn kind(&self) -> DriverKind;

    /// One-time device bring-up.
    ///
    /// Fails with `DeviceInit` when the device does not acknowledge or
    /// identifies as something else.
    fn initialize(&self) -> Result<()>;

    /// Read a numeric attribute.
    ///
    /// Fails with `FieldNotFound` for names this driver kind does not expose
    /// and with `Bus` on communication failure.
    fn read_field(&self, name: &str) -> Result<i64>;

    /// Liveness probe. An absent device is `Ok(false)`; only transport faults
    /// distinct from absence are errors.
    fn health_check(&self) -> Result<bool>;
}

/// Construction options handed to a [`DriverFactory`]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DriverOptions {
    /// Kernel driver name override (defaults to [`DriverKind::kernel_name`])
    #[serde(default)]
    pub kernel_name: Option<String>,
    /// Identification expected in the device's `name` attribute
    #[serde(default)]
    pub expected_name: Option<String>,
    /// Attribute writes applied after the device binds, in order
    #[serde(default)]
    pub init: Vec<(String, i64)>,
}

impl DriverOptions {
    pub fn kernel_name<'a>(&'a self, kind: &DriverKind) -> &'a str {
        self.kernel_name.as_deref().unwrap_or(kind.kernel_name())
    }

    pub fn expected_name<'a>(&'a self, kind: &DriverKind) -> &'a str {
        self.expected_name
            .as_deref()
            .unwrap_or_else(|| self.kernel_name(kind))
    }
}

/// Creates driver handles for (address, kind, options).
pub trait DriverFactory: Send + Sync {
    fn create(
        &self,
        address: BusAddress,
        kind: DriverKind,
        options: &DriverOptions,
    ) -> Result<Box<dyn DriverHandle>>;
}

/// Adapts a plain function or closure into a [`DriverFactory`]
pub struct FnFactory<F>(pub F);

impl<F> DriverFactory for FnFactory<F>
where
    F: Fn(BusAddress, DriverKind, &DriverOptions) -> Result<Box<dyn DriverHandle>> + Send + Sync,
{
    fn create(
        &self,
        address: BusAddress,
        kind: DriverKind,
        options: &DriverOptions,
    ) -> Result<Box<dyn DriverHandle>> {
        (self.0)(address, kind, options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_name_fallbacks() {
        let opts = DriverOptions::default();
        assert_eq!(opts.kernel_name(&DriverKind::At24), "24c32");
        assert_eq!(opts.expected_name(&DriverKind::At24), "24c32");

        let opts = DriverOptions {
            kernel_name: Some("max6581".into()),
            ..Default::default()
        };
        assert_eq!(opts.kernel_name(&DriverKind::Max6697), "max6581");
        assert_eq!(opts.expected_name(&DriverKind::Max6697), "max6581");
    }

    #[test]
    fn test_fn_factory_delegates() {
        let factory = FnFactory(
            |addr: BusAddress, kind: DriverKind, _opts: &DriverOptions| -> Result<Box<dyn DriverHandle>> {
                let mut mock = MockDriverHandle::new();
                mock.expect_address().return_const(addr);
                mock.expect_kind().return_const(kind);
                Ok(Box::new(mock))
            },
        );
        let addr = BusAddress::new(2, 0x50).unwrap();
        let handle = factory.create(addr, DriverKind::At24, &DriverOptions::default()).unwrap();
        assert_eq!(handle.address(), addr);
        assert_eq!(handle.kind(), DriverKind::At24);
    }

    #[test]
    fn test_options_deserialize() {
        let opts: DriverOptions =
            serde_json::from_str(r#"{"expected_name": "max6697", "init": [["temp1_max", 90000]]}"#).unwrap();
        assert_eq!(opts.init, vec![("temp1_max".to_string(), 90000)]);
        assert!(opts.kernel_name.is_none());
    }
}
