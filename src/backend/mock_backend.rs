//! Mock WiFi backend
//!
//! A virtual radio used by the test suite and by `--backend mock`.

use std::{net::Ipv4Addr, sync::Arc};
use tokio::sync::Mutex;
use tracing::debug;

use crate::backend::{DriverEventSink, WifiBackend};
use crate::core::error::{DriverError, DriverResult};
use crate::core::types::{
    DriverEvent, JoinCredential, LinkStatus, MacAddress, Mode, ScanResult, SoftApConfig,
};

const STATION_ADDRESS: Ipv4Addr = Ipv4Addr::new(192, 168, 1, 100);
const SOFT_AP_ADDRESS: Ipv4Addr = Ipv4Addr::new(192, 168, 4, 1);
const LOCAL_MAC: MacAddress = MacAddress([0x02, 0x00, 0x00, 0x00, 0x00, 0x01]);

/// Backend calls recorded by the mock, in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendCall {
    Init,
    Deinit,
    Scan,
    Associate { ssid: Vec<u8> },
    Disassociate,
    StartSoftAp { ssid: Vec<u8>, channel: u32 },
    StopSoftAp,
    StartStation,
    Info,
}

#[derive(Debug, Default)]
struct Failures {
    init: bool,
    scan: bool,
    associate: bool,
    disassociate: bool,
    start_soft_ap: bool,
    stop_soft_ap: bool,
    info: bool,
}

#[derive(Debug)]
struct MockState {
    scan_results: Vec<ScanResult>,
    fail: Failures,
    calls: Vec<BackendCall>,
    events: Option<DriverEventSink>,
    associated: bool,
    hosting: bool,
    rssi: i32,
}

/// Mock WiFi backend for testing
///
/// Allows configuring behavior for tests without requiring actual hardware.
#[derive(Debug, Clone)]
pub struct MockWifiBackend {
    inner: Arc<Mutex<MockState>>,
}

impl MockWifiBackend {
    /// Create a new mock backend with default state
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(MockState {
                scan_results: vec![],
                fail: Failures::default(),
                calls: vec![],
                events: None,
                associated: false,
                hosting: false,
                rssi: -55,
            })),
        }
    }

    /// Configure the APs returned on scan
    pub async fn set_scan_results(&self, networks: Vec<ScanResult>) {
        self.inner.lock().await.scan_results = networks;
    }

    pub async fn set_init_failure(&self, should_fail: bool) {
        self.inner.lock().await.fail.init = should_fail;
    }

    pub async fn set_scan_failure(&self, should_fail: bool) {
        self.inner.lock().await.fail.scan = should_fail;
    }

    pub async fn set_associate_failure(&self, should_fail: bool) {
        self.inner.lock().await.fail.associate = should_fail;
    }

    pub async fn set_disassociate_failure(&self, should_fail: bool) {
        self.inner.lock().await.fail.disassociate = should_fail;
    }

    pub async fn set_start_soft_ap_failure(&self, should_fail: bool) {
        self.inner.lock().await.fail.start_soft_ap = should_fail;
    }

    pub async fn set_stop_soft_ap_failure(&self, should_fail: bool) {
        self.inner.lock().await.fail.stop_soft_ap = should_fail;
    }

    pub async fn set_info_failure(&self, should_fail: bool) {
        self.inner.lock().await.fail.info = should_fail;
    }

    pub async fn set_rssi(&self, rssi: i32) {
        self.inner.lock().await.rssi = rssi;
    }

    /// Calls received so far
    pub async fn calls(&self) -> Vec<BackendCall> {
        self.inner.lock().await.calls.clone()
    }

    /// Simulate the AP or hosted network going away
    ///
    /// Returns false if no manager is listening.
    pub async fn simulate_link_loss(&self) -> bool {
        let mut state = self.inner.lock().await;
        state.associated = false;
        state.hosting = false;
        state
            .events
            .as_ref()
            .is_some_and(|sink| sink.emit(DriverEvent::LinkLost))
    }

    /// Simulate a station joining the hosted network
    pub async fn simulate_station_join(&self) -> bool {
        let state = self.inner.lock().await;
        state
            .events
            .as_ref()
            .is_some_and(|sink| sink.emit(DriverEvent::StationJoined))
    }
}

impl Default for MockWifiBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn fail_if(should_fail: bool, error: impl FnOnce() -> DriverError) -> DriverResult<()> {
    if should_fail { Err(error()) } else { Ok(()) }
}

impl WifiBackend for MockWifiBackend {
    async fn init(&self, events: DriverEventSink) -> DriverResult<()> {
        let mut state = self.inner.lock().await;
        state.calls.push(BackendCall::Init);
        fail_if(state.fail.init, || {
            DriverError::InitFailed("Mock init failure".into())
        })?;
        state.events = Some(events);
        debug!("Mock radio up");
        Ok(())
    }

    async fn deinit(&self) -> DriverResult<()> {
        let mut state = self.inner.lock().await;
        state.calls.push(BackendCall::Deinit);
        state.events = None;
        state.associated = false;
        state.hosting = false;
        Ok(())
    }

    async fn scan(&self) -> DriverResult<Vec<ScanResult>> {
        let mut state = self.inner.lock().await;
        state.calls.push(BackendCall::Scan);
        fail_if(state.fail.scan, || {
            DriverError::ScanFailed("Mock scan failure".into())
        })?;
        Ok(state.scan_results.clone())
    }

    async fn associate(&self, credential: &JoinCredential) -> DriverResult<()> {
        let mut state = self.inner.lock().await;
        state.calls.push(BackendCall::Associate {
            ssid: credential.ssid.clone(),
        });
        fail_if(state.fail.associate, || {
            DriverError::AssociationFailed("Mock associate failure".into())
        })?;
        state.associated = true;
        Ok(())
    }

    async fn disassociate(&self) -> DriverResult<()> {
        let mut state = self.inner.lock().await;
        state.calls.push(BackendCall::Disassociate);
        fail_if(state.fail.disassociate, || {
            DriverError::DisassociationFailed("Mock disassociate failure".into())
        })?;
        state.associated = false;
        Ok(())
    }

    async fn start_soft_ap(&self, config: &SoftApConfig) -> DriverResult<()> {
        let mut state = self.inner.lock().await;
        state.calls.push(BackendCall::StartSoftAp {
            ssid: config.ssid.clone(),
            channel: config.channel,
        });
        fail_if(state.fail.start_soft_ap, || {
            DriverError::SoftApFailed("Mock start soft-AP failure".into())
        })?;
        state.hosting = true;
        Ok(())
    }

    async fn stop_soft_ap(&self) -> DriverResult<()> {
        let mut state = self.inner.lock().await;
        state.calls.push(BackendCall::StopSoftAp);
        fail_if(state.fail.stop_soft_ap, || {
            DriverError::SoftApFailed("Mock stop soft-AP failure".into())
        })?;
        state.hosting = false;
        Ok(())
    }

    async fn start_station(&self) -> DriverResult<()> {
        let mut state = self.inner.lock().await;
        state.calls.push(BackendCall::StartStation);
        state.hosting = false;
        Ok(())
    }

    async fn info(&self) -> DriverResult<LinkStatus> {
        let mut state = self.inner.lock().await;
        state.calls.push(BackendCall::Info);
        fail_if(state.fail.info, || {
            DriverError::Unavailable("Mock info failure".into())
        })?;

        let (ip4_address, mode) = if state.associated {
            (STATION_ADDRESS, Mode::Connected)
        } else if state.hosting {
            (SOFT_AP_ADDRESS, Mode::SoftAp)
        } else {
            (Ipv4Addr::UNSPECIFIED, Mode::Disconnected)
        };

        Ok(LinkStatus {
            ip4_address,
            mac_address: LOCAL_MAC,
            rssi: if state.associated { state.rssi } else { 0 },
            mode,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{AuthKind, CryptoKind};
    use pretty_assertions::assert_eq;
    use crate::backend::StampedEvent;
    use tokio::sync::mpsc;

    fn sink() -> (DriverEventSink, mpsc::UnboundedReceiver<StampedEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (DriverEventSink::new(tx, Arc::default()), rx)
    }

    #[tokio::test]
    async fn test_mock_backend_scan() {
        let backend = MockWifiBackend::new();

        // Initially empty
        assert!(backend.scan().await.unwrap().is_empty());

        backend
            .set_scan_results(vec![ScanResult {
                channel: 6,
                ssid: b"TestNetwork".to_vec(),
                bssid: MacAddress([0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff]),
                max_rate: 54_000,
                rssi: -65,
                auth: AuthKind::Wpa2Psk,
                crypto: CryptoKind::Aes,
            }])
            .await;

        let results = backend.scan().await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].ssid_lossy(), "TestNetwork");
    }

    #[tokio::test]
    async fn test_mock_backend_scan_failure() {
        let backend = MockWifiBackend::new();
        backend.set_scan_failure(true).await;

        assert!(matches!(
            backend.scan().await,
            Err(DriverError::ScanFailed(_))
        ));
    }

    #[tokio::test]
    async fn test_mock_backend_records_calls() {
        let backend = MockWifiBackend::new();
        let (events, _rx) = sink();

        backend.init(events).await.unwrap();
        backend
            .associate(&JoinCredential::wpa2("TestNet", "password"))
            .await
            .unwrap();
        backend.disassociate().await.unwrap();

        assert_eq!(
            backend.calls().await,
            vec![
                BackendCall::Init,
                BackendCall::Associate {
                    ssid: b"TestNet".to_vec()
                },
                BackendCall::Disassociate,
            ]
        );
    }

    #[tokio::test]
    async fn test_mock_backend_info_tracks_association() {
        let backend = MockWifiBackend::new();

        let info = backend.info().await.unwrap();
        assert_eq!(info.ip4_address, Ipv4Addr::UNSPECIFIED);
        assert_eq!(info.mac_address, LOCAL_MAC);

        backend
            .associate(&JoinCredential::open("cafe"))
            .await
            .unwrap();
        let info = backend.info().await.unwrap();
        assert_eq!(info.ip4_address, STATION_ADDRESS);
        assert_eq!(info.rssi, -55);
    }

    #[tokio::test]
    async fn test_mock_backend_emits_events() {
        let backend = MockWifiBackend::new();
        assert!(!backend.simulate_link_loss().await);

        let (events, mut rx) = sink();
        backend.init(events).await.unwrap();

        assert!(backend.simulate_link_loss().await);
        assert!(backend.simulate_station_join().await);
        assert_eq!(rx.recv().await, Some((0, DriverEvent::LinkLost)));
        assert_eq!(rx.recv().await, Some((0, DriverEvent::StationJoined)));
    }
}
