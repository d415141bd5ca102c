//! Error types for the WiFi manager

use thiserror::Error;

use super::types::Mode;

/// Result type for capability layer (backend) operations
pub type DriverResult<T> = Result<T, DriverError>;

/// Result type for manager operations
pub type WifiResult<T> = Result<T, WifiError>;

/// Result type for configuration loading
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors reported by a WiFi backend
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DriverError {
    #[error("Backend initialization failed: {0}")]
    InitFailed(String),

    #[error("WiFi scan failed: {0}")]
    ScanFailed(String),

    #[error("Association failed: {0}")]
    AssociationFailed(String),

    #[error("Disassociation failed: {0}")]
    DisassociationFailed(String),

    #[error("Soft-AP operation failed: {0}")]
    SoftApFailed(String),

    #[error("Backend unavailable: {0}")]
    Unavailable(String),

    #[error("wpa_supplicant error: {0}")]
    WpaSupplicant(String),
}

/// Errors returned by the connection state machine
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WifiError {
    #[error("WiFi interface is not initialized")]
    NotInitialized,

    #[error("WiFi interface is already initialized")]
    AlreadyInitialized,

    #[error("Operation `{operation}` is not allowed in mode {mode:?}")]
    InvalidState { operation: &'static str, mode: Mode },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Driver error: {0}")]
    Driver(#[from] DriverError),
}

/// Errors raised while loading settings
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
