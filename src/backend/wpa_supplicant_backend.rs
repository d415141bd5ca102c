//! wpa_supplicant backend built on wifi-ctrl

use std::{
    fmt::Display,
    net::Ipv4Addr,
    path::Path,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};
use tokio::{
    process::Command,
    sync::{Mutex, broadcast},
    task::JoinHandle,
};
use tracing::{debug, error, warn};
use wifi_ctrl::sta::{Broadcast, BroadcastReceiver, RequestClient, WifiSetup};

use crate::{
    backend::{DriverEventSink, WifiBackend},
    core::{
        error::{DriverError, DriverResult},
        types::{
            AuthKind, CryptoKind, DriverEvent, JoinCredential, LinkStatus, MacAddress, Mode,
            ScanResult, SoftApConfig,
        },
    },
};

const CONNECTION_TIMEOUT: Duration = Duration::from_secs(30);

/// wpa_supplicant `mode` value for access point networks
const AP_NETWORK_MODE: u8 = 2;

struct Station {
    client: RequestClient,
    broadcast: BroadcastReceiver,
    runtime: JoinHandle<()>,
    watcher: JoinHandle<()>,
    network_id: Option<usize>,
}

/// Backend driving a wpa_supplicant control socket
pub struct WpaSupplicantBackend {
    interface: String,
    ctrl_path: String,
    station: Mutex<Option<Station>>,
    associated: Arc<AtomicBool>,
}

impl WpaSupplicantBackend {
    pub fn new(interface: String) -> Self {
        let ctrl_path = format!("/var/run/wpa_supplicant/{}", interface);
        Self {
            interface,
            ctrl_path,
            station: Mutex::new(None),
            associated: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Convert a frequency in MHz to a channel number, 0 if unknown
    fn frequency_to_channel(freq: u32) -> u32 {
        match freq {
            2484 => 14,
            2412..=2472 => (freq - 2407) / 5,
            5000..=5895 => (freq - 5000) / 5,
            _ => 0,
        }
    }

    /// Inverse of [`Self::frequency_to_channel`]
    fn channel_to_frequency(channel: u32) -> Option<u32> {
        match channel {
            14 => Some(2484),
            1..=13 => Some(2407 + channel * 5),
            32..=177 => Some(5000 + channel * 5),
            _ => None,
        }
    }

    /// Derive security from scan flags such as `[WPA2-PSK-CCMP][ESS]`
    fn security_from_flags(flags: &str) -> (AuthKind, CryptoKind) {
        let wpa = flags.contains("[WPA-");
        let wpa2 = flags.contains("[WPA2-") || flags.contains("[RSN-");

        let auth = match (wpa, wpa2) {
            (true, true) => AuthKind::WpaWpa2Psk,
            (false, true) => AuthKind::Wpa2Psk,
            (true, false) => AuthKind::WpaPsk,
            (false, false) if flags.contains("[WEP]") => AuthKind::WepShared,
            (false, false) if flags.contains("EAP") || flags.contains("SAE") => AuthKind::Unknown,
            (false, false) => AuthKind::Open,
        };

        let ccmp = flags.contains("CCMP");
        let tkip = flags.contains("TKIP");
        let crypto = match (ccmp, tkip) {
            (true, true) => CryptoKind::TkipAes,
            (true, false) => CryptoKind::Aes,
            (false, true) => CryptoKind::Tkip,
            (false, false) => match auth {
                AuthKind::Open => CryptoKind::None,
                AuthKind::WepShared => CryptoKind::Wep128,
                _ => CryptoKind::Unknown,
            },
        };

        (auth, crypto)
    }

    /// Extract `RSSI=` from a `SIGNAL_POLL` reply
    fn parse_signal_poll(reply: &str) -> Option<i32> {
        reply
            .lines()
            .find_map(|line| line.strip_prefix("RSSI="))
            .and_then(|rssi| rssi.trim().parse().ok())
    }

    /// Extract the first IPv4 address from `ip -4 addr show` output
    fn parse_ip_addr_output(output: &str) -> Option<Ipv4Addr> {
        output
            .lines()
            .map(str::trim)
            .filter_map(|line| line.strip_prefix("inet "))
            .find_map(|rest| rest.split('/').next()?.trim().parse().ok())
    }

    /// Get IP address using ip command
    async fn ip_address(&self) -> Option<Ipv4Addr> {
        let output = Command::new("ip")
            .args(["-4", "addr", "show", &self.interface])
            .output()
            .await
            .ok()?;

        Self::parse_ip_addr_output(&String::from_utf8_lossy(&output.stdout))
    }

    async fn sysfs_mac_address(&self) -> Option<MacAddress> {
        let path = format!("/sys/class/net/{}/address", self.interface);
        tokio::fs::read_to_string(path).await.ok()?.parse().ok()
    }
}

fn wpa_error<E: Display>(context: &'static str) -> impl FnOnce(E) -> DriverError {
    move |e| DriverError::WpaSupplicant(format!("{context}: {e}"))
}

fn not_initialized() -> DriverError {
    DriverError::Unavailable("wpa_supplicant backend is not initialized".into())
}

/// Send a raw control command, treating a `FAIL` reply as an error
async fn command(client: &RequestClient, request: String) -> DriverResult<String> {
    debug!(%request, "wpa_supplicant command");
    let reply = client
        .send_custom(request.clone())
        .await
        .map_err(wpa_error("Control request failed"))?;

    if reply.trim_start().starts_with("FAIL") {
        return Err(DriverError::WpaSupplicant(format!(
            "`{request}` was rejected"
        )));
    }
    Ok(reply)
}

/// Add a network block with the SSID and key settings common to both roles
async fn add_network(
    client: &RequestClient,
    ssid: &[u8],
    passphrase: &[u8],
    auth: AuthKind,
) -> DriverResult<usize> {
    let id = client
        .add_network()
        .await
        .map_err(wpa_error("Failed to add network"))?;

    command(client, ssid_request(id, ssid)).await?;

    if auth == AuthKind::Open {
        command(client, format!("SET_NETWORK {id} key_mgmt NONE")).await?;
    } else {
        // wifi-ctrl handles quoting internally via conf_escape
        client
            .set_network_psk(id, passphrase_text(passphrase)?.to_string())
            .await
            .map_err(wpa_error("Failed to set PSK"))?;
    }

    Ok(id)
}

/// An unquoted ssid value is read as hex, which keeps arbitrary bytes intact
fn ssid_request(id: usize, ssid: &[u8]) -> String {
    format!("SET_NETWORK {id} ssid {}", hex::encode(ssid))
}

/// wpa_supplicant only takes passphrases as quoted printable text
fn passphrase_text(passphrase: &[u8]) -> DriverResult<&str> {
    std::str::from_utf8(passphrase)
        .ok()
        .filter(|text| !text.chars().any(char::is_control))
        .ok_or_else(|| DriverError::WpaSupplicant("Passphrase is not printable text".into()))
}

async fn remove_network(station: &mut Station) {
    if let Some(id) = station.network_id.take() {
        if let Err(e) = command(&station.client, format!("REMOVE_NETWORK {id}")).await {
            warn!("Failed to remove network {}: {}", id, e);
        }
    }
}

/// Wait for wpa_supplicant to report the outcome of a network selection
async fn wait_for_connection(receiver: &mut BroadcastReceiver) -> DriverResult<()> {
    let outcome = tokio::time::timeout(CONNECTION_TIMEOUT, async {
        loop {
            match receiver.recv().await {
                Ok(Broadcast::Connected) => return Ok(()),
                Ok(Broadcast::WrongPsk) => {
                    return Err(DriverError::AssociationFailed("Wrong password".into()));
                }
                Ok(Broadcast::NetworkNotFound) => {
                    return Err(DriverError::AssociationFailed("Network not found".into()));
                }
                // A disconnect may precede the association; keep waiting
                Ok(event) => debug!("Received broadcast event: {:?}", event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Broadcast receiver lagged");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    return Err(DriverError::WpaSupplicant(
                        "Broadcast channel closed".into(),
                    ));
                }
            }
        }
    })
    .await;

    outcome.unwrap_or_else(|_| Err(DriverError::AssociationFailed("Connection timeout".into())))
}

/// Forward unsolicited disconnects while associated
async fn watch_link(
    mut receiver: BroadcastReceiver,
    associated: Arc<AtomicBool>,
    events: DriverEventSink,
) {
    loop {
        match receiver.recv().await {
            Ok(Broadcast::Disconnected) => {
                if associated.swap(false, Ordering::SeqCst) && !events.emit(DriverEvent::LinkLost)
                {
                    break;
                }
            }
            Ok(_) => {}
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "Link watcher lagged");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
    debug!("Link watcher stopped");
}

impl WifiBackend for WpaSupplicantBackend {
    async fn init(&self, events: DriverEventSink) -> DriverResult<()> {
        if !Path::new(&self.ctrl_path).exists() {
            return Err(DriverError::Unavailable(format!(
                "wpa_supplicant control socket not found: {}",
                self.ctrl_path
            )));
        }

        let mut setup = WifiSetup::new().map_err(wpa_error("Failed to set up station"))?;
        setup.set_socket_path(self.ctrl_path.clone());

        let client = setup.get_request_client();
        let broadcast = setup.get_broadcast_receiver();
        let station = setup.complete();

        let runtime = tokio::spawn(async move {
            if let Err(e) = station.run().await {
                error!("wpa_supplicant station runtime error: {}", e);
            }
        });
        self.associated.store(false, Ordering::SeqCst);
        let watcher = tokio::spawn(watch_link(
            broadcast.resubscribe(),
            self.associated.clone(),
            events,
        ));

        *self.station.lock().await = Some(Station {
            client,
            broadcast,
            runtime,
            watcher,
            network_id: None,
        });

        debug!("wpa_supplicant backend ready on {}", self.interface);
        Ok(())
    }

    async fn deinit(&self) -> DriverResult<()> {
        self.associated.store(false, Ordering::SeqCst);
        if let Some(mut station) = self.station.lock().await.take() {
            remove_network(&mut station).await;
            station.watcher.abort();
            station.runtime.abort();
        }
        Ok(())
    }

    async fn scan(&self) -> DriverResult<Vec<ScanResult>> {
        debug!("Starting WiFi scan on interface: {}", self.interface);

        let guard = self.station.lock().await;
        let station = guard.as_ref().ok_or_else(not_initialized)?;
        let results = station
            .client
            .get_scan()
            .await
            .map_err(|e| DriverError::ScanFailed(e.to_string()))?;

        let mut networks = Vec::with_capacity(results.len());
        for res in results.iter() {
            let Ok(bssid) = res.mac.parse::<MacAddress>() else {
                warn!("Skipping scan result with malformed BSSID {:?}", res.mac);
                continue;
            };
            let (auth, crypto) = Self::security_from_flags(&res.flags);
            networks.push(ScanResult {
                channel: Self::frequency_to_channel(res.frequency.parse().unwrap_or(0)),
                ssid: res.name.clone().into_bytes(),
                bssid,
                max_rate: 0,
                rssi: res.signal as i32,
                auth,
                crypto,
            });
        }

        debug!("Scan complete, found {} networks", networks.len());
        Ok(networks)
    }

    async fn associate(&self, credential: &JoinCredential) -> DriverResult<()> {
        let mut guard = self.station.lock().await;
        let station = guard.as_mut().ok_or_else(not_initialized)?;
        remove_network(station).await;

        // Start listening to events BEFORE connecting to avoid race condition
        let mut receiver = station.broadcast.resubscribe();

        let id = add_network(
            &station.client,
            &credential.ssid,
            &credential.passphrase,
            credential.auth,
        )
        .await?;
        station.network_id = Some(id);

        station
            .client
            .select_network(id)
            .await
            .map_err(wpa_error("Failed to select network"))?;

        debug!("Association initiated, waiting for connection event");
        if let Err(e) = wait_for_connection(&mut receiver).await {
            remove_network(station).await;
            return Err(e);
        }

        self.associated.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn disassociate(&self) -> DriverResult<()> {
        self.associated.store(false, Ordering::SeqCst);

        let mut guard = self.station.lock().await;
        let station = guard.as_mut().ok_or_else(not_initialized)?;
        let result = command(&station.client, "DISCONNECT".into()).await;
        remove_network(station).await;

        result
            .map(|_| ())
            .map_err(|e| DriverError::DisassociationFailed(e.to_string()))
    }

    async fn start_soft_ap(&self, config: &SoftApConfig) -> DriverResult<()> {
        let frequency = Self::channel_to_frequency(config.channel).ok_or_else(|| {
            DriverError::SoftApFailed(format!("Unsupported channel {}", config.channel))
        })?;

        let mut guard = self.station.lock().await;
        let station = guard.as_mut().ok_or_else(not_initialized)?;
        remove_network(station).await;

        let id = add_network(&station.client, &config.ssid, &config.passphrase, config.auth)
            .await
            .map_err(|e| DriverError::SoftApFailed(e.to_string()))?;
        station.network_id = Some(id);

        let setup = async {
            command(&station.client, format!("SET_NETWORK {id} mode {AP_NETWORK_MODE}")).await?;
            command(&station.client, format!("SET_NETWORK {id} frequency {frequency}")).await?;
            if config.auth != AuthKind::Open {
                command(&station.client, format!("SET_NETWORK {id} key_mgmt WPA-PSK")).await?;
            }
            station
                .client
                .select_network(id)
                .await
                .map_err(wpa_error("Failed to select network"))?;
            Ok::<(), DriverError>(())
        }
        .await;

        if let Err(e) = setup {
            remove_network(station).await;
            return Err(DriverError::SoftApFailed(e.to_string()));
        }

        debug!("Soft-AP started on channel {}", config.channel);
        Ok(())
    }

    async fn stop_soft_ap(&self) -> DriverResult<()> {
        let mut guard = self.station.lock().await;
        let station = guard.as_mut().ok_or_else(not_initialized)?;
        let result = command(&station.client, "DISCONNECT".into()).await;
        remove_network(station).await;

        result
            .map(|_| ())
            .map_err(|e| DriverError::SoftApFailed(e.to_string()))
    }

    async fn start_station(&self) -> DriverResult<()> {
        let mut guard = self.station.lock().await;
        let station = guard.as_mut().ok_or_else(not_initialized)?;
        remove_network(station).await;
        debug!("Station mode active on {}", self.interface);
        Ok(())
    }

    async fn info(&self) -> DriverResult<LinkStatus> {
        let guard = self.station.lock().await;
        let station = guard.as_ref().ok_or_else(not_initialized)?;

        let status = station
            .client
            .get_status()
            .await
            .map_err(wpa_error("Failed to get status"))?;

        let wpa_state = status
            .get("wpa_state")
            .map(|s| s.as_str())
            .unwrap_or("UNKNOWN");
        let hosting = status.get("mode").is_some_and(|m| m == "AP");
        let mode = match (wpa_state, hosting) {
            ("COMPLETED", true) => Mode::SoftAp,
            ("COMPLETED", false) => Mode::Connected,
            _ => Mode::Disconnected,
        };

        let rssi = if mode == Mode::Connected {
            command(&station.client, "SIGNAL_POLL".into())
                .await
                .ok()
                .and_then(|reply| Self::parse_signal_poll(&reply))
                .unwrap_or(0)
        } else {
            0
        };
        drop(guard);

        let ip4_address = match status
            .get("ip_address")
            .and_then(|ip| ip.parse::<Ipv4Addr>().ok())
        {
            Some(ip) => Some(ip),
            None if mode != Mode::Disconnected => self.ip_address().await,
            None => None,
        }
        .unwrap_or(Ipv4Addr::UNSPECIFIED);

        let mac_address = match status
            .get("address")
            .and_then(|mac| mac.parse::<MacAddress>().ok())
        {
            Some(mac) => mac,
            None => self.sysfs_mac_address().await.unwrap_or(MacAddress::UNSET),
        };

        Ok(LinkStatus {
            ip4_address,
            mac_address,
            rssi,
            mode,
        })
    }
}
