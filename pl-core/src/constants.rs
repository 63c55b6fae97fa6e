//! Constants and configuration values for Plinth
//!
//! Centralizes the magic numbers, paths, and defaults used by the core.

use std::time::Duration;

/// System paths
pub mod paths {
    /// Linux I2C device tree (`i2c-N/` adapters and `N-00AA/` clients)
    pub const I2C_DEVICES: &str = "/sys/bus/i2c/devices";

    /// System-wide configuration directory
    pub const CONFIG_DIR: &str = "/etc/plinth";

    /// Platform description file name
    pub const PLATFORM_FILE: &str = "platform.json";

    /// Environment variable overriding the platform description path
    pub const CONFIG_ENV: &str = "PLINTH_CONFIG";

    /// Per-user configuration directory (XDG aware)
    pub fn user_config_dir() -> Option<std::path::PathBuf> {
        let base = if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
            Some(std::path::PathBuf::from(xdg))
        } else if let Ok(home) = std::env::var("HOME") {
            Some(std::path::PathBuf::from(home).join(".config"))
        } else {
            dirs::config_dir()
        };
        base.map(|p| p.join("plinth"))
    }
}

/// I2C addressing rules
pub mod i2c {
    /// Lowest non-reserved 7-bit address
    pub const MIN_ADDRESS: u8 = 0x03;

    /// Highest non-reserved 7-bit address
    pub const MAX_ADDRESS: u8 = 0x77;
}

/// Kernel driver binding
pub mod kernel {
    use super::Duration;

    /// Number of polls for a freshly instantiated device directory
    pub const BIND_ATTEMPTS: u32 = 10;

    /// Delay between polls
    pub const BIND_POLL_INTERVAL: Duration = Duration::from_millis(50);

    /// hwmon temperatures are reported in millidegrees Celsius
    pub const MILLIDEGREE_SCALE: f64 = 0.001;
}

/// Bring-up sequencing
pub mod bringup {
    use super::Duration;

    /// Poll interval while a band waits on an initialization it did not start
    pub const SETTLE_POLL_INTERVAL: Duration = Duration::from_millis(10);
}

/// Input limits
pub mod limits {
    /// Maximum accepted platform description size (1 MiB)
    pub const MAX_CONFIG_FILE_SIZE: u64 = 1024 * 1024;

    /// Maximum number of components in one platform description
    pub const MAX_COMPONENTS: usize = 1024;

    /// Maximum drivers attached to one component
    pub const MAX_DRIVERS_PER_COMPONENT: usize = 16;
}
