//! WiFi Manager
//!
//! A device-independent WiFi control interface: scanning, joining, hosting
//! and querying a wireless network through a connection-state machine that
//! sits on top of a pluggable radio backend.

pub mod backend;
pub mod config;
pub mod core;

pub use core::{
    error::{DriverError, WifiError},
    events::{LinkCallbacks, LinkEvent},
    manager::WifiManager,
    types::{
        AuthKind, CryptoKind, JoinCredential, LinkStatus, MacAddress, Mode, ScanReport,
        ScanResult, SoftApConfig,
    },
};
