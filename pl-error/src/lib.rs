//! Unified error handling for Plinth
//!
//! This crate provides a single error type used across all Plinth components.
//! It uses thiserror for ergonomic error definitions with proper Display and Error trait impls.

use std::io;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Result type alias using PlinthError
pub type Result<T> = std::result::Result<T, PlinthError>;

/// Unified error type for all Plinth operations
#[derive(thiserror::Error, Debug)]
pub enum PlinthError {
    // ============================================================================
    // Device and Bus Errors
    // ============================================================================
    /// Device is present but did not come up (no ack, wrong identification).
    #[error("Device {device} failed to initialize: {reason}")]
    DeviceInit {
        device: String,
        reason: String,
    },

    /// Transport-level fault talking to the device.
    #[error("Bus error on {device}: {reason}")]
    Bus {
        device: String,
        reason: String,
    },

    #[error("Field '{field}' is not provided by {driver} driver")]
    FieldNotFound {
        driver: String,
        field: String,
    },

    #[error("Invalid I2C address {address:#04x} on bus {bus}")]
    InvalidAddress {
        bus: u16,
        address: u16,
    },

    // ============================================================================
    // Registry and Lifecycle Errors
    // ============================================================================
    #[error("Component already registered: {0}")]
    DuplicateKey(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid lifecycle transition for {component}: {from} -> {to}")]
    InvalidTransition {
        component: String,
        from: String,
        to: String,
    },

    #[error("Invalid sensor descriptor '{sensor}': {reason}")]
    InvalidDescriptor {
        sensor: String,
        reason: String,
    },

    // ============================================================================
    // Configuration Errors
    // ============================================================================
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration value for {field}: {reason}")]
    InvalidConfig {
        field: String,
        reason: String,
    },

    #[error("Failed to read file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: io::Error,
    },

    #[error("File too large: {path} ({size} bytes, max {max_size} bytes)")]
    FileTooLarge {
        path: PathBuf,
        size: u64,
        max_size: u64,
    },

    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    // ============================================================================
    // Internal Errors
    // ============================================================================
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Serializable discriminant of [`PlinthError`], used in bring-up reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    DeviceInit,
    Bus,
    FieldNotFound,
    InvalidAddress,
    DuplicateKey,
    NotFound,
    InvalidTransition,
    InvalidDescriptor,
    Config,
    Io,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::DeviceInit => "device_init",
            ErrorKind::Bus => "bus",
            ErrorKind::FieldNotFound => "field_not_found",
            ErrorKind::InvalidAddress => "invalid_address",
            ErrorKind::DuplicateKey => "duplicate_key",
            ErrorKind::NotFound => "not_found",
            ErrorKind::InvalidTransition => "invalid_transition",
            ErrorKind::InvalidDescriptor => "invalid_descriptor",
            ErrorKind::Config => "config",
            ErrorKind::Io => "io",
            ErrorKind::Internal => "internal",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl PlinthError {
    /// Create a device initialization error
    pub fn device_init(device: impl ToString, reason: impl Into<String>) -> Self {
        Self::DeviceInit {
            device: device.to_string(),
            reason: reason.into(),
        }
    }

    /// Create a bus error
    pub fn bus(device: impl ToString, reason: impl Into<String>) -> Self {
        Self::Bus {
            device: device.to_string(),
            reason: reason.into(),
        }
    }

    /// Create a field-not-found error
    pub fn field_not_found(driver: impl Into<String>, field: impl Into<String>) -> Self {
        Self::FieldNotFound {
            driver: driver.into(),
            field: field.into(),
        }
    }

    /// Create a config error from a string
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an invalid config error
    pub fn invalid_config(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Create an internal error from a string
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Discriminant for reporting
    pub fn kind(&self) -> ErrorKind {
        match self {
            PlinthError::DeviceInit { .. } => ErrorKind::DeviceInit,
            PlinthError::Bus { .. } => ErrorKind::Bus,
            PlinthError::FieldNotFound { .. } => ErrorKind::FieldNotFound,
            PlinthError::InvalidAddress { .. } => ErrorKind::InvalidAddress,
            PlinthError::DuplicateKey(_) => ErrorKind::DuplicateKey,
            PlinthError::NotFound(_) => ErrorKind::NotFound,
            PlinthError::InvalidTransition { .. } => ErrorKind::InvalidTransition,
            PlinthError::InvalidDescriptor { .. } => ErrorKind::InvalidDescriptor,
            PlinthError::Config(_)
            | PlinthError::InvalidConfig { .. }
            | PlinthError::FileTooLarge { .. }
            | PlinthError::JsonParse(_) => ErrorKind::Config,
            PlinthError::FileRead { .. } | PlinthError::Io(_) => ErrorKind::Io,
            PlinthError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Hardware faults are contained at the component boundary; everything
    /// else is a programming or configuration defect.
    pub fn is_hardware_fault(&self) -> bool {
        matches!(self.kind(), ErrorKind::DeviceInit | ErrorKind::Bus)
    }
}
