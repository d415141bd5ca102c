//! Runtime settings
//!
//! CLI flags take precedence over values from the optional JSON file.

use std::{path::Path, time::Duration};

use serde::Deserialize;

use crate::{
    config::{
        CliArgs,
        cli::{BackendKind, Command, NetworkArgs},
    },
    core::{
        error::{ConfigError, ConfigResult},
        types::{AuthKind, CryptoKind, JoinCredential, SoftApConfig},
    },
};

const DEFAULT_INTERFACE: &str = "wlan0";
const DEFAULT_SOFT_AP_CHANNEL: u32 = 6;

/// Network profile as stored in the config file
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct NetworkProfile {
    pub ssid: Option<String>,
    pub passphrase: Option<String>,
    pub auth: Option<AuthKind>,
    pub crypto: Option<CryptoKind>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SoftApProfile {
    #[serde(flatten)]
    pub network: NetworkProfile,
    pub channel: Option<u32>,
}

/// Contents of the `--config` file
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub interface: Option<String>,
    pub station: Option<NetworkProfile>,
    pub soft_ap: Option<SoftApProfile>,
}

impl FileConfig {
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }
}

/// What the binary should do once the interface is up
#[derive(Debug, Clone)]
pub enum Action {
    Scan { capacity: usize },
    Connect(JoinCredential),
    SoftAp(SoftApConfig),
    Info,
}

/// Runtime configuration settings
#[derive(Debug, Clone)]
pub struct Settings {
    pub interface: String,
    pub backend: BackendKind,
    pub json: bool,
    pub hold: Duration,
    pub action: Action,
}

impl Settings {
    /// Build settings from CLI arguments and the config file they name
    pub fn load(args: CliArgs) -> ConfigResult<Self> {
        let file = match &args.config {
            Some(path) => FileConfig::load(path)?,
            None => FileConfig::default(),
        };
        Self::merge(args, file)
    }

    fn merge(args: CliArgs, file: FileConfig) -> ConfigResult<Self> {
        let action = match args.command {
            Command::Scan { capacity } => Action::Scan { capacity },
            Command::Connect(network) => {
                let profile = file.station.unwrap_or_default();
                let (ssid, passphrase, auth, crypto) = resolve_network(network, profile, "connect")?;
                Action::Connect(JoinCredential {
                    ssid,
                    passphrase,
                    auth,
                    crypto,
                })
            }
            Command::SoftAp { network, channel } => {
                let profile = file.soft_ap.unwrap_or_default();
                let channel = channel
                    .or(profile.channel)
                    .unwrap_or(DEFAULT_SOFT_AP_CHANNEL);
                let (ssid, passphrase, auth, crypto) =
                    resolve_network(network, profile.network, "soft-ap")?;
                Action::SoftAp(SoftApConfig::new(channel, ssid, passphrase, auth, crypto))
            }
            Command::Info => Action::Info,
        };

        Ok(Settings {
            interface: args
                .interface
                .or(file.interface)
                .unwrap_or_else(|| DEFAULT_INTERFACE.to_string()),
            backend: args.backend,
            json: args.json,
            hold: Duration::from_secs(args.hold_secs),
            action,
        })
    }
}

/// Merge CLI network flags over a profile, defaulting the security to
/// WPA2/AES when a passphrase is present and open otherwise
fn resolve_network(
    args: NetworkArgs,
    profile: NetworkProfile,
    command: &str,
) -> ConfigResult<(Vec<u8>, Vec<u8>, AuthKind, CryptoKind)> {
    let ssid = args.ssid.or(profile.ssid).ok_or_else(|| {
        ConfigError::Invalid(format!("{command} needs an SSID (--ssid or config file)"))
    })?;
    let passphrase = args.passphrase.or(profile.passphrase).unwrap_or_default();

    let auth = args
        .auth
        .map(AuthKind::from)
        .or(profile.auth)
        .unwrap_or(if passphrase.is_empty() {
            AuthKind::Open
        } else {
            AuthKind::Wpa2Psk
        });
    let crypto = args
        .crypto
        .map(CryptoKind::from)
        .or(profile.crypto)
        .unwrap_or(match auth {
            AuthKind::Open => CryptoKind::None,
            _ => CryptoKind::Aes,
        });

    Ok((ssid.into_bytes(), passphrase.into_bytes(), auth, crypto))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use pretty_assertions::assert_eq;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn args(argv: &[&str]) -> CliArgs {
        CliArgs::try_parse_from(std::iter::once("wifi-manager").chain(argv.iter().copied()))
            .unwrap()
    }

    fn config_file(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_defaults() {
        let settings = Settings::load(args(&["scan"])).unwrap();
        assert_eq!(settings.interface, "wlan0");
        assert_eq!(settings.backend, BackendKind::WpaSupplicant);
        assert_eq!(settings.hold, Duration::ZERO);
        assert!(matches!(settings.action, Action::Scan { capacity: 32 }));
    }

    #[test]
    fn test_connect_from_flags() {
        let settings = Settings::load(args(&[
            "--backend",
            "mock",
            "connect",
            "--ssid",
            "home",
            "--passphrase",
            "password",
        ]))
        .unwrap();

        let Action::Connect(credential) = settings.action else {
            panic!("expected connect action");
        };
        assert_eq!(credential, JoinCredential::wpa2("home", "password"));
    }

    #[test]
    fn test_connect_without_passphrase_is_open() {
        let settings = Settings::load(args(&["connect", "--ssid", "cafe"])).unwrap();
        let Action::Connect(credential) = settings.action else {
            panic!("expected connect action");
        };
        assert_eq!(credential, JoinCredential::open("cafe"));
    }

    #[test]
    fn test_connect_requires_ssid() {
        let result = Settings::load(args(&["connect"]));
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_file_profiles_and_flag_precedence() {
        let file = config_file(
            r#"{
                "interface": "wlp2s0",
                "station": { "ssid": "office", "passphrase": "from-file", "auth": "wpa_wpa2_psk", "crypto": "tkip_aes" },
                "soft_ap": { "ssid": "setup", "passphrase": "provision", "channel": 11 }
            }"#,
        );
        let path = file.path().to_str().unwrap();

        let settings =
            Settings::load(args(&["--config", path, "connect", "--passphrase", "override"]))
                .unwrap();
        assert_eq!(settings.interface, "wlp2s0");
        let Action::Connect(credential) = settings.action else {
            panic!("expected connect action");
        };
        assert_eq!(credential.ssid, b"office".to_vec());
        assert_eq!(credential.passphrase, b"override".to_vec());
        assert_eq!(credential.auth, AuthKind::WpaWpa2Psk);
        assert_eq!(credential.crypto, CryptoKind::TkipAes);

        let settings = Settings::load(args(&[
            "--config",
            path,
            "--interface",
            "wlan1",
            "soft-ap",
        ]))
        .unwrap();
        assert_eq!(settings.interface, "wlan1");
        let Action::SoftAp(config) = settings.action else {
            panic!("expected soft-ap action");
        };
        assert_eq!(config.channel, 11);
        assert_eq!(config.ssid, b"setup".to_vec());
        assert_eq!(config.auth, AuthKind::Wpa2Psk);
    }

    #[test]
    fn test_soft_ap_default_channel() {
        let settings = Settings::load(args(&["soft-ap", "--ssid", "ap", "--auth", "open"])).unwrap();
        let Action::SoftAp(config) = settings.action else {
            panic!("expected soft-ap action");
        };
        assert_eq!(config.channel, DEFAULT_SOFT_AP_CHANNEL);
        assert_eq!(config.crypto, CryptoKind::None);
    }

    #[test]
    fn test_invalid_config_file() {
        let file = config_file(r#"{ "interfaces": "typo" }"#);
        let result = Settings::load(args(&["--config", file.path().to_str().unwrap(), "info"]));
        assert!(matches!(result, Err(ConfigError::Parse(_))));

        let result = Settings::load(args(&["--config", "/nonexistent/wifi.json", "info"]));
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }
}
