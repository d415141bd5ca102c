//! Domain types for WiFi control

use std::{fmt, net::Ipv4Addr, str::FromStr, sync::Arc};

use serde::{Deserialize, Serialize};

use crate::core::error::{WifiError, WifiResult};

/// Maximum SSID length in bytes
pub const MAX_SSID_LEN: usize = 32;

/// Maximum passphrase length in bytes
pub const MAX_PASSPHRASE_LEN: usize = 64;

/// Authentication scheme of an access point
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthKind {
    #[default]
    Open,
    WepShared,
    WpaPsk,
    Wpa2Psk,
    WpaWpa2Psk,
    Unknown,
}

/// Encryption scheme of an access point
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CryptoKind {
    #[default]
    None,
    Wep64,
    Wep128,
    Aes,
    Tkip,
    TkipAes,
    Unknown,
}

/// Connection state machine states
///
/// Station and soft-AP roles are mutually exclusive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    #[default]
    Uninitialized,
    Disconnected,
    Connected,
    SoftAp,
}

impl Mode {
    /// Whether the radio is in the station role
    pub fn is_station(self) -> bool {
        matches!(self, Mode::Disconnected | Mode::Connected)
    }
}

/// 6-byte hardware address (interface MAC or AP BSSID)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MacAddress(pub [u8; 6]);

impl MacAddress {
    pub const UNSET: MacAddress = MacAddress([0; 6]);

    pub fn octets(&self) -> [u8; 6] {
        self.0
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02x}:{b:02x}:{c:02x}:{d:02x}:{e:02x}:{g:02x}")
    }
}

impl FromStr for MacAddress {
    type Err = WifiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || WifiError::InvalidArgument(format!("malformed MAC address: {s:?}"));

        let mut octets = [0u8; 6];
        let mut parts = s.trim().split(':');
        for octet in octets.iter_mut() {
            let part = parts.next().ok_or_else(invalid)?;
            if part.len() != 2 {
                return Err(invalid());
            }
            *octet = u8::from_str_radix(part, 16).map_err(|_| invalid())?;
        }
        if parts.next().is_some() {
            return Err(invalid());
        }

        Ok(MacAddress(octets))
    }
}

impl TryFrom<String> for MacAddress {
    type Error = WifiError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<MacAddress> for String {
    fn from(mac: MacAddress) -> Self {
        mac.to_string()
    }
}

/// An access point discovered by a scan
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScanResult {
    /// Radio channel the beacon was received on
    pub channel: u32,
    /// Raw SSID bytes, not necessarily UTF-8
    pub ssid: Vec<u8>,
    /// BSSID of the AP radio
    pub bssid: MacAddress,
    /// Maximum data rate in kbit/s
    pub max_rate: u32,
    /// Signal strength in dBm
    pub rssi: i32,
    pub auth: AuthKind,
    pub crypto: CryptoKind,
}

impl ScanResult {
    /// SSID rendered for display
    pub fn ssid_lossy(&self) -> String {
        String::from_utf8_lossy(&self.ssid).into_owned()
    }
}

/// Outcome of a bounded scan
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScanReport {
    /// At most `capacity` results
    pub results: Vec<ScanResult>,
    /// Number of APs the driver reported, whether or not they fit
    pub found: usize,
}

/// Credentials for joining an access point
#[derive(Clone, Default, PartialEq, Eq)]
pub struct JoinCredential {
    pub ssid: Vec<u8>,
    pub passphrase: Vec<u8>,
    pub auth: AuthKind,
    pub crypto: CryptoKind,
}

impl JoinCredential {
    /// Credential for an open network
    pub fn open(ssid: impl Into<Vec<u8>>) -> Self {
        Self {
            ssid: ssid.into(),
            ..Self::default()
        }
    }

    /// Credential for a WPA2-PSK (AES) network
    pub fn wpa2(ssid: impl Into<Vec<u8>>, passphrase: impl Into<Vec<u8>>) -> Self {
        Self {
            ssid: ssid.into(),
            passphrase: passphrase.into(),
            auth: AuthKind::Wpa2Psk,
            crypto: CryptoKind::Aes,
        }
    }

    pub fn validate(&self) -> WifiResult<()> {
        validate_network(&self.ssid, &self.passphrase, self.auth)
    }
}

impl fmt::Debug for JoinCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JoinCredential")
            .field("ssid", &String::from_utf8_lossy(&self.ssid))
            .field("passphrase", &format_args!("<{} bytes>", self.passphrase.len()))
            .field("auth", &self.auth)
            .field("crypto", &self.crypto)
            .finish()
    }
}

/// Hook invoked when a station joins the hosted network
pub type StationJoinedHook = Arc<dyn Fn() + Send + Sync>;

/// Soft-AP parameters
///
/// Backends report joining stations through
/// [`DriverEvent::StationJoined`]; the manager then runs `on_station_joined`.
#[derive(Clone, Default)]
pub struct SoftApConfig {
    pub channel: u32,
    pub ssid: Vec<u8>,
    pub passphrase: Vec<u8>,
    pub auth: AuthKind,
    pub crypto: CryptoKind,
    pub on_station_joined: Option<StationJoinedHook>,
}

impl SoftApConfig {
    pub fn new(
        channel: u32,
        ssid: impl Into<Vec<u8>>,
        passphrase: impl Into<Vec<u8>>,
        auth: AuthKind,
        crypto: CryptoKind,
    ) -> Self {
        Self {
            channel,
            ssid: ssid.into(),
            passphrase: passphrase.into(),
            auth,
            crypto,
            on_station_joined: None,
        }
    }

    pub fn with_station_joined<F>(mut self, hook: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.on_station_joined = Some(Arc::new(hook));
        self
    }

    pub fn validate(&self) -> WifiResult<()> {
        validate_network(&self.ssid, &self.passphrase, self.auth)
    }
}

impl fmt::Debug for SoftApConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SoftApConfig")
            .field("channel", &self.channel)
            .field("ssid", &String::from_utf8_lossy(&self.ssid))
            .field("passphrase", &format_args!("<{} bytes>", self.passphrase.len()))
            .field("auth", &self.auth)
            .field("crypto", &self.crypto)
            .field("on_station_joined", &self.on_station_joined.is_some())
            .finish()
    }
}

fn validate_network(ssid: &[u8], passphrase: &[u8], auth: AuthKind) -> WifiResult<()> {
    if ssid.len() > MAX_SSID_LEN {
        return Err(WifiError::InvalidArgument(format!(
            "SSID is {} bytes, maximum is {MAX_SSID_LEN}",
            ssid.len()
        )));
    }
    if passphrase.len() > MAX_PASSPHRASE_LEN {
        return Err(WifiError::InvalidArgument(format!(
            "passphrase is {} bytes, maximum is {MAX_PASSPHRASE_LEN}",
            passphrase.len()
        )));
    }
    if auth == AuthKind::Open && !passphrase.is_empty() {
        return Err(WifiError::InvalidArgument(
            "open authentication does not take a passphrase".into(),
        ));
    }
    Ok(())
}

/// Snapshot of the local link
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct LinkStatus {
    /// `0.0.0.0` when no address is assigned
    pub ip4_address: Ipv4Addr,
    pub mac_address: MacAddress,
    /// Signal strength in dBm
    pub rssi: i32,
    pub mode: Mode,
}

impl Default for LinkStatus {
    fn default() -> Self {
        Self {
            ip4_address: Ipv4Addr::UNSPECIFIED,
            mac_address: MacAddress::UNSET,
            rssi: 0,
            mode: Mode::Uninitialized,
        }
    }
}

/// Unsolicited notifications raised by a backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverEvent {
    /// Association or hosted network dropped without being asked to
    LinkLost,
    /// A station joined the hosted network
    StationJoined,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_mode_serializes_snake_case() {
        assert_eq!(serde_json::to_string(&Mode::SoftAp).unwrap(), r#""soft_ap""#);
        assert!(Mode::Connected.is_station());
        assert!(!Mode::SoftAp.is_station());
    }

    #[test]
    fn test_mac_address_format_and_parse() {
        let mac: MacAddress = "AA:bb:0c:dd:ee:01".parse().unwrap();
        assert_eq!(mac.octets(), [0xaa, 0xbb, 0x0c, 0xdd, 0xee, 0x01]);
        assert_eq!(mac.to_string(), "aa:bb:0c:dd:ee:01");

        assert!("aa:bb:cc:dd:ee".parse::<MacAddress>().is_err());
        assert!("aa:bb:cc:dd:ee:ff:00".parse::<MacAddress>().is_err());
        assert!("aa:bb:cc:dd:ee:zz".parse::<MacAddress>().is_err());
        assert!("aabb:cc:dd:ee:ff".parse::<MacAddress>().is_err());
    }

    #[test]
    fn test_mac_address_serializes_as_string() {
        let mac = MacAddress([1, 2, 3, 4, 5, 6]);
        let json = serde_json::to_string(&mac).unwrap();
        assert_eq!(json, r#""01:02:03:04:05:06""#);

        let back: MacAddress = serde_json::from_str(&json).unwrap();
        assert_eq!(back, mac);
    }

    #[test]
    fn test_credential_bounds() {
        assert!(JoinCredential::wpa2(vec![b'a'; 32], vec![b'p'; 64]).validate().is_ok());
        assert!(matches!(
            JoinCredential::wpa2(vec![b'a'; 33], "password").validate(),
            Err(WifiError::InvalidArgument(_))
        ));
        assert!(matches!(
            JoinCredential::wpa2("net", vec![b'p'; 65]).validate(),
            Err(WifiError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_open_credential_rejects_passphrase() {
        assert!(JoinCredential::open("cafe").validate().is_ok());

        let mut credential = JoinCredential::open("cafe");
        credential.passphrase = b"secret".to_vec();
        assert!(matches!(
            credential.validate(),
            Err(WifiError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_soft_ap_config_validation() {
        let config = SoftApConfig::new(6, "hotspot", "password", AuthKind::Wpa2Psk, CryptoKind::Aes);
        assert!(config.validate().is_ok());

        let config = SoftApConfig::new(6, "hotspot", "password", AuthKind::Open, CryptoKind::None);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_debug_hides_passphrase() {
        let credential = JoinCredential::wpa2("home", "hunter22");
        let debug = format!("{credential:?}");
        assert!(debug.contains("home"));
        assert!(!debug.contains("hunter22"));

        let config = SoftApConfig::new(1, "ap", "topsecret", AuthKind::Wpa2Psk, CryptoKind::Aes);
        assert!(!format!("{config:?}").contains("topsecret"));
    }

    #[test]
    fn test_link_status_default_is_unset() {
        let status = LinkStatus::default();
        assert_eq!(status.ip4_address, Ipv4Addr::UNSPECIFIED);
        assert_eq!(status.mode, Mode::Uninitialized);
    }
}
