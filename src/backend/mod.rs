//! Capability layer: WiFi radio backends

pub mod mock_backend;
pub mod wifi_backend;
pub mod wpa_supplicant_backend;

pub use mock_backend::{BackendCall, MockWifiBackend};
pub use wifi_backend::{DriverEventSink, StampedEvent, WifiBackend};
pub use wpa_supplicant_backend::WpaSupplicantBackend;
