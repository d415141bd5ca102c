//! Command-line argument parsing

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::core::types::{AuthKind, CryptoKind};

#[derive(Parser, Debug, Clone)]
#[clap(name = "wifi-manager", version, author)]
#[clap(about = "Scan, join, host and query WiFi networks")]
pub struct CliArgs {
    /// Wireless network interface name [default: wlan0]
    #[clap(short, long)]
    pub interface: Option<String>,

    /// Radio backend to drive
    #[clap(short, long, value_enum, default_value_t = BackendKind::WpaSupplicant)]
    pub backend: BackendKind,

    /// JSON file with interface, station and soft_ap profiles
    #[clap(short, long)]
    pub config: Option<PathBuf>,

    /// Print results as JSON
    #[clap(long)]
    pub json: bool,

    /// Keep a joined or hosted network up for this many seconds (0 returns at once)
    #[clap(long, default_value_t = 0)]
    pub hold_secs: u64,

    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Scan for access points
    Scan {
        /// Maximum number of results to keep
        #[clap(long, default_value_t = 32)]
        capacity: usize,
    },

    /// Join an access point
    Connect(NetworkArgs),

    /// Host a network
    SoftAp {
        #[clap(flatten)]
        network: NetworkArgs,

        /// Radio channel [default: 6]
        #[clap(long)]
        channel: Option<u32>,
    },

    /// Show the link status
    Info,
}

/// Network parameters; anything omitted is taken from the config file
#[derive(Args, Debug, Clone, Default)]
pub struct NetworkArgs {
    #[clap(long)]
    pub ssid: Option<String>,

    #[clap(long)]
    pub passphrase: Option<String>,

    #[clap(long, value_enum)]
    pub auth: Option<AuthArg>,

    #[clap(long, value_enum)]
    pub crypto: Option<CryptoArg>,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// Virtual radio, no hardware needed
    Mock,
    /// wpa_supplicant control socket
    WpaSupplicant,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthArg {
    Open,
    WepShared,
    WpaPsk,
    Wpa2Psk,
    WpaWpa2Psk,
}

impl From<AuthArg> for AuthKind {
    fn from(arg: AuthArg) -> Self {
        match arg {
            AuthArg::Open => AuthKind::Open,
            AuthArg::WepShared => AuthKind::WepShared,
            AuthArg::WpaPsk => AuthKind::WpaPsk,
            AuthArg::Wpa2Psk => AuthKind::Wpa2Psk,
            AuthArg::WpaWpa2Psk => AuthKind::WpaWpa2Psk,
        }
    }
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CryptoArg {
    None,
    Wep64,
    Wep128,
    Aes,
    Tkip,
    TkipAes,
}

impl From<CryptoArg> for CryptoKind {
    fn from(arg: CryptoArg) -> Self {
        match arg {
            CryptoArg::None => CryptoKind::None,
            CryptoArg::Wep64 => CryptoKind::Wep64,
            CryptoArg::Wep128 => CryptoKind::Wep128,
            CryptoArg::Aes => CryptoKind::Aes,
            CryptoArg::Tkip => CryptoKind::Tkip,
            CryptoArg::TkipAes => CryptoKind::TkipAes,
        }
    }
}
