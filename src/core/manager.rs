//! WiFi manager: the connection state machine facade
//!
//! Every control operation and every driver event goes through one async
//! lock, held across the backend call, so mode read-modify-writes are never
//! torn.

use std::sync::{
    Arc, Weak,
    atomic::{AtomicU64, Ordering},
};
use tokio::{
    sync::{Mutex, MutexGuard, mpsc},
    task::JoinHandle,
};
use tracing::{debug, error, info, warn};

use crate::{
    backend::{DriverEventSink, StampedEvent, WifiBackend},
    core::{
        error::{WifiError, WifiResult},
        events::{EventDispatcher, LinkCallbacks, LinkEvent},
        state_machine::{ModeStateMachine, Operation},
        types::{
            DriverEvent, JoinCredential, LinkStatus, MAX_SSID_LEN, Mode, ScanReport,
            SoftApConfig, StationJoinedHook,
        },
    },
};

/// Per-interface session state, guarded by the manager lock
#[derive(Default)]
struct Session {
    machine: ModeStateMachine,
    status: LinkStatus,
    callbacks: Arc<LinkCallbacks>,
    dispatcher: Option<EventDispatcher>,
    station_joined: Option<StationJoinedHook>,
    event_pump: Option<JoinHandle<()>>,
    /// Bumped on every mode change; shared with the backend's event sink
    generation: Arc<AtomicU64>,
}

impl Session {
    fn mode(&self) -> Mode {
        self.machine.mode()
    }

    fn set_mode(&mut self, mode: Mode) -> WifiResult<Mode> {
        let previous = self.machine.transition(mode)?;
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.status.mode = mode;
        if !matches!(mode, Mode::Connected | Mode::SoftAp) {
            self.status.ip4_address = LinkStatus::default().ip4_address;
            self.status.rssi = 0;
        }
        if mode != Mode::SoftAp {
            self.station_joined = None;
        }
        info!(from = ?previous, to = ?mode, "WiFi mode changed");
        Ok(previous)
    }

    /// Queue a link event against the callbacks registered right now
    fn emit(&self, event: LinkEvent) {
        if let Some(dispatcher) = &self.dispatcher {
            dispatcher.link(event, self.callbacks.clone());
        }
    }

    fn apply_driver_event(&mut self, event: DriverEvent) -> WifiResult<()> {
        match (event, self.mode()) {
            (DriverEvent::LinkLost, Mode::Connected | Mode::SoftAp) => {
                warn!(mode = ?self.mode(), "Link lost");
                self.set_mode(Mode::Disconnected)?;
                self.emit(LinkEvent::Down);
            }
            (DriverEvent::StationJoined, Mode::SoftAp) => {
                info!("Station joined soft-AP");
                if let (Some(dispatcher), Some(hook)) = (&self.dispatcher, &self.station_joined) {
                    dispatcher.station_joined(hook.clone());
                }
            }
            (event, mode) => {
                debug!(?event, ?mode, "Ignoring driver event");
            }
        }
        Ok(())
    }
}

struct Shared<B: WifiBackend> {
    backend: Arc<B>,
    session: Mutex<Session>,
}

/// Connection state machine for one WiFi interface
///
/// Cloning yields another handle to the same interface.
pub struct WifiManager<B: WifiBackend> {
    inner: Arc<Shared<B>>,
}

impl<B: WifiBackend> Clone for WifiManager<B> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<B: WifiBackend> WifiManager<B> {
    /// Create a manager in the `Uninitialized` mode
    pub fn new(backend: Arc<B>) -> Self {
        Self {
            inner: Arc::new(Shared {
                backend,
                session: Mutex::new(Session::default()),
            }),
        }
    }

    /// Current mode
    pub async fn mode(&self) -> Mode {
        self.lock().await.mode()
    }

    /// Bring the interface up
    pub async fn init(&self) -> WifiResult<()> {
        let mut session = self.lock().await;
        session.machine.ensure(Operation::Init)?;

        let (tx, rx) = mpsc::unbounded_channel();
        self.inner
            .backend
            .init(DriverEventSink::new(tx, session.generation.clone()))
            .await
            .inspect_err(|e| error!("Backend init failed: {}", e))?;

        session.set_mode(Mode::Disconnected)?;
        session.dispatcher = Some(EventDispatcher::spawn());
        session.event_pump = Some(self.spawn_event_pump(rx));
        self.refresh_status(&mut session).await;

        info!(mac = %session.status.mac_address, "WiFi interface initialized");
        Ok(())
    }

    /// Tear the interface down from any mode
    ///
    /// Registered callbacks are dropped without a link-down notification.
    /// Calling this while uninitialized is a no-op.
    pub async fn deinit(&self) -> WifiResult<()> {
        let mut session = self.lock().await;
        session.machine.ensure(Operation::Deinit)?;
        if session.mode() == Mode::Uninitialized {
            debug!("Deinit requested while uninitialized");
            return Ok(());
        }

        if let Some(pump) = session.event_pump.take() {
            pump.abort();
        }
        let result = self.inner.backend.deinit().await;

        *session = Session::default();
        info!("WiFi interface deinitialized");

        result.map_err(|e| {
            warn!("Backend deinit failed: {}", e);
            e.into()
        })
    }

    /// Scan for access points, keeping at most `capacity` results
    pub async fn scan_access_points(&self, capacity: usize) -> WifiResult<ScanReport> {
        let session = self.lock().await;
        session.machine.ensure(Operation::Scan)?;
        if capacity == 0 {
            return Err(WifiError::InvalidArgument(
                "scan capacity must be at least 1".into(),
            ));
        }

        let discovered = self.inner.backend.scan().await?;
        let found = discovered.len();
        let results: Vec<_> = discovered
            .into_iter()
            .filter(|ap| {
                let fits = ap.ssid.len() <= MAX_SSID_LEN;
                if !fits {
                    warn!(bssid = %ap.bssid, len = ap.ssid.len(), "Dropping scan result with oversized SSID");
                }
                fits
            })
            .take(capacity)
            .collect();

        debug!(found, returned = results.len(), "Scan complete");
        Ok(ScanReport { results, found })
    }

    /// Join an access point
    pub async fn connect(&self, credential: &JoinCredential) -> WifiResult<()> {
        let mut session = self.lock().await;
        session.machine.ensure(Operation::Connect)?;
        credential.validate()?;

        debug!(?credential, "Connecting");
        self.inner
            .backend
            .associate(credential)
            .await
            .inspect_err(|e| warn!("Association failed: {}", e))?;

        session.set_mode(Mode::Connected)?;
        self.refresh_status(&mut session).await;
        session.emit(LinkEvent::Up);
        Ok(())
    }

    /// Leave the current access point
    ///
    /// The mode always ends up `Disconnected`; a backend failure is still
    /// returned.
    pub async fn disconnect(&self) -> WifiResult<()> {
        let mut session = self.lock().await;
        session.machine.ensure(Operation::Disconnect)?;

        let result = self.inner.backend.disassociate().await;
        session.set_mode(Mode::Disconnected)?;
        session.emit(LinkEvent::Down);

        result.map_err(|e| {
            warn!("Disassociate failed, link forced down: {}", e);
            e.into()
        })
    }

    /// Start hosting a network
    pub async fn start_soft_ap(&self, config: &SoftApConfig) -> WifiResult<()> {
        let mut session = self.lock().await;
        session.machine.ensure(Operation::StartSoftAp)?;
        config.validate()?;

        debug!(?config, "Starting soft-AP");
        self.inner
            .backend
            .start_soft_ap(config)
            .await
            .inspect_err(|e| warn!("Soft-AP start failed: {}", e))?;

        session.set_mode(Mode::SoftAp)?;
        session.station_joined = config.on_station_joined.clone();
        self.refresh_status(&mut session).await;
        Ok(())
    }

    /// Stop hosting; the mode always ends up `Disconnected`
    pub async fn stop_soft_ap(&self) -> WifiResult<()> {
        let mut session = self.lock().await;
        session.machine.ensure(Operation::StopSoftAp)?;

        let result = self.inner.backend.stop_soft_ap().await;
        session.set_mode(Mode::Disconnected)?;

        result.map_err(|e| {
            warn!("Soft-AP stop failed, mode forced to disconnected: {}", e);
            e.into()
        })
    }

    /// Return the radio to the station role
    ///
    /// A running soft-AP is stopped first, best-effort. The first backend
    /// failure is returned.
    pub async fn start_station(&self) -> WifiResult<()> {
        let mut session = self.lock().await;
        session.machine.ensure(Operation::StartStation)?;

        let stopped = if session.mode() == Mode::SoftAp {
            let result = self.inner.backend.stop_soft_ap().await;
            session.set_mode(Mode::Disconnected)?;
            result
        } else {
            Ok(())
        };
        let started = self.inner.backend.start_station().await;

        stopped.and(started).map_err(|e| {
            warn!("Switching to station mode failed: {}", e);
            e.into()
        })
    }

    /// Snapshot of the link
    pub async fn get_info(&self) -> WifiResult<LinkStatus> {
        let mut session = self.lock().await;
        session.machine.ensure(Operation::GetInfo)?;

        self.refresh_status(&mut session).await;
        Ok(session.status)
    }

    /// Replace the link callbacks
    ///
    /// Events already queued keep the callbacks they were raised with.
    pub async fn register_callbacks(&self, callbacks: LinkCallbacks) -> WifiResult<()> {
        let mut session = self.lock().await;
        session.machine.ensure(Operation::RegisterCallbacks)?;

        debug!(?callbacks, "Registering link callbacks");
        session.callbacks = Arc::new(callbacks);
        Ok(())
    }

    /// Apply an unsolicited driver event to the current link
    pub async fn handle_driver_event(&self, event: DriverEvent) -> WifiResult<()> {
        self.lock().await.apply_driver_event(event)
    }

    /// Apply an event from the backend sink unless the link it was raised
    /// for has already been replaced by a later mode change
    async fn handle_stamped_event(&self, (generation, event): StampedEvent) -> WifiResult<()> {
        let mut session = self.lock().await;
        let current = session.generation.load(Ordering::SeqCst);
        if generation != current {
            debug!(?event, generation, current, "Dropping stale driver event");
            return Ok(());
        }
        session.apply_driver_event(event)
    }

    async fn lock(&self) -> MutexGuard<'_, Session> {
        self.inner.session.lock().await
    }

    /// Pull addresses and signal strength from the backend
    ///
    /// Keeps the previous snapshot when the backend cannot answer.
    async fn refresh_status(&self, session: &mut Session) {
        match self.inner.backend.info().await {
            Ok(info) => {
                if info.mac_address != LinkStatus::default().mac_address {
                    session.status.mac_address = info.mac_address;
                }
                if matches!(session.mode(), Mode::Connected | Mode::SoftAp) {
                    session.status.ip4_address = info.ip4_address;
                    session.status.rssi = info.rssi;
                }
            }
            Err(e) => warn!("Backend info unavailable, keeping last link status: {}", e),
        }
    }

    fn spawn_event_pump(&self, mut rx: mpsc::UnboundedReceiver<StampedEvent>) -> JoinHandle<()> {
        let shared: Weak<Shared<B>> = Arc::downgrade(&self.inner);

        tokio::spawn(async move {
            while let Some(stamped) = rx.recv().await {
                let Some(inner) = shared.upgrade() else {
                    break;
                };
                if let Err(e) = (WifiManager { inner }).handle_stamped_event(stamped).await {
                    error!(event = ?stamped.1, "Failed to apply driver event: {}", e);
                }
            }
            debug!("Driver event pump stopped");
        })
    }
}
