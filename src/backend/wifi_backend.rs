//! Capability layer trait definition

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use tokio::sync::mpsc;
use trait_variant::make;

use crate::core::{
    error::DriverResult,
    types::{DriverEvent, JoinCredential, LinkStatus, ScanResult, SoftApConfig},
};

/// A driver event stamped with the link generation it was raised in
pub type StampedEvent = (u64, DriverEvent);

/// Channel handed to a backend at init for unsolicited driver events
///
/// Events are funneled through the manager's lock, so backends may emit
/// from any task or thread. Each event carries the link generation current
/// at emission; the manager bumps it on every mode change and discards
/// events from earlier generations.
#[derive(Debug, Clone)]
pub struct DriverEventSink {
    tx: mpsc::UnboundedSender<StampedEvent>,
    generation: Arc<AtomicU64>,
}

impl DriverEventSink {
    pub fn new(tx: mpsc::UnboundedSender<StampedEvent>, generation: Arc<AtomicU64>) -> Self {
        Self { tx, generation }
    }

    /// Report an event; returns false once the manager stopped listening
    pub fn emit(&self, event: DriverEvent) -> bool {
        let generation = self.generation.load(Ordering::SeqCst);
        self.tx.send((generation, event)).is_ok()
    }
}

/// Abstraction over a WiFi radio driver
///
/// One implementation per physical or virtual radio. Implementations are
/// expected to bound the duration of every call; the manager defines no
/// timeouts of its own.
#[make(Send)]
pub trait WifiBackend: Send + Sync + 'static {
    /// Bring the radio up in station mode
    async fn init(&self, events: DriverEventSink) -> DriverResult<()>;

    /// Release radio resources
    async fn deinit(&self) -> DriverResult<()>;

    /// Scan for access points
    ///
    /// Returns every AP discovered; the caller applies its own capacity.
    async fn scan(&self) -> DriverResult<Vec<ScanResult>>;

    /// Join the access point described by `credential`
    async fn associate(&self, credential: &JoinCredential) -> DriverResult<()>;

    /// Leave the current access point
    async fn disassociate(&self) -> DriverResult<()>;

    /// Start hosting a network
    async fn start_soft_ap(&self, config: &SoftApConfig) -> DriverResult<()>;

    /// Stop hosting a network
    async fn stop_soft_ap(&self) -> DriverResult<()>;

    /// Return the radio to the station role
    async fn start_station(&self) -> DriverResult<()>;

    /// Current interface addresses and signal strength
    ///
    /// The `mode` field is advisory; the manager reports its own.
    async fn info(&self) -> DriverResult<LinkStatus>;
}
