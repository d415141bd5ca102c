//! Link event registration and dispatch

use std::{
    fmt,
    panic::{AssertUnwindSafe, catch_unwind},
    sync::Arc,
};

use tokio::sync::mpsc;
use tracing::{debug, error};

use crate::core::types::StationJoinedHook;

/// Zero-argument link notification
pub type LinkHandler = Arc<dyn Fn() + Send + Sync>;

/// Link state transitions reported to consumers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkEvent {
    Up,
    Down,
}

/// The registered pair of link handlers
#[derive(Clone, Default)]
pub struct LinkCallbacks {
    on_link_up: Option<LinkHandler>,
    on_link_down: Option<LinkHandler>,
}

impl LinkCallbacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_link_up<F>(mut self, handler: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.on_link_up = Some(Arc::new(handler));
        self
    }

    pub fn on_link_down<F>(mut self, handler: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.on_link_down = Some(Arc::new(handler));
        self
    }

    fn handler(&self, event: LinkEvent) -> Option<&LinkHandler> {
        match event {
            LinkEvent::Up => self.on_link_up.as_ref(),
            LinkEvent::Down => self.on_link_down.as_ref(),
        }
    }
}

impl fmt::Debug for LinkCallbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LinkCallbacks")
            .field("on_link_up", &self.on_link_up.is_some())
            .field("on_link_down", &self.on_link_down.is_some())
            .finish()
    }
}

enum Dispatch {
    Link(LinkEvent, Arc<LinkCallbacks>),
    StationJoined(StationJoinedHook),
}

/// Ordered delivery of notifications on a dedicated blocking worker
///
/// The worker drains its queue and exits once the dispatcher is dropped.
pub struct EventDispatcher {
    tx: mpsc::UnboundedSender<Dispatch>,
}

impl EventDispatcher {
    /// Start the worker. Must be called from within a tokio runtime.
    pub fn spawn() -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<Dispatch>();

        tokio::task::spawn_blocking(move || {
            while let Some(dispatch) = rx.blocking_recv() {
                match dispatch {
                    Dispatch::Link(event, callbacks) => {
                        if let Some(handler) = callbacks.handler(event) {
                            debug!(?event, "Dispatching link event");
                            invoke(handler.as_ref(), "link");
                        }
                    }
                    Dispatch::StationJoined(hook) => {
                        debug!("Dispatching station joined");
                        invoke(hook.as_ref(), "station joined");
                    }
                }
            }
            debug!("Event dispatcher stopped");
        });

        Self { tx }
    }

    /// Queue a link event against the callback set captured at transition time
    pub fn link(&self, event: LinkEvent, callbacks: Arc<LinkCallbacks>) {
        if self.tx.send(Dispatch::Link(event, callbacks)).is_err() {
            error!(?event, "Event dispatcher is gone, dropping link event");
        }
    }

    pub fn station_joined(&self, hook: StationJoinedHook) {
        if self.tx.send(Dispatch::StationJoined(hook)).is_err() {
            error!("Event dispatcher is gone, dropping station joined event");
        }
    }
}

fn invoke(handler: &(dyn Fn() + Send + Sync), kind: &str) {
    if catch_unwind(AssertUnwindSafe(handler)).is_err() {
        error!("A {kind} callback panicked");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    #[tokio::test]
    async fn test_dispatch_in_order() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let up_tx = tx.clone();
        let callbacks = Arc::new(
            LinkCallbacks::new()
                .on_link_up(move || {
                    let _ = up_tx.send(LinkEvent::Up);
                })
                .on_link_down(move || {
                    let _ = tx.send(LinkEvent::Down);
                }),
        );

        let dispatcher = EventDispatcher::spawn();
        dispatcher.link(LinkEvent::Up, callbacks.clone());
        dispatcher.link(LinkEvent::Down, callbacks.clone());
        dispatcher.link(LinkEvent::Up, callbacks);

        let timeout_dur = Duration::from_secs(1);
        assert_eq!(timeout(timeout_dur, rx.recv()).await.unwrap(), Some(LinkEvent::Up));
        assert_eq!(timeout(timeout_dur, rx.recv()).await.unwrap(), Some(LinkEvent::Down));
        assert_eq!(timeout(timeout_dur, rx.recv()).await.unwrap(), Some(LinkEvent::Up));
    }

    #[tokio::test]
    async fn test_missing_handler_is_skipped() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let callbacks = Arc::new(LinkCallbacks::new().on_link_down(move || {
            let _ = tx.send(LinkEvent::Down);
        }));

        let dispatcher = EventDispatcher::spawn();
        dispatcher.link(LinkEvent::Up, callbacks.clone());
        dispatcher.link(LinkEvent::Down, callbacks);

        let received = timeout(Duration::from_secs(1), rx.recv()).await.unwrap();
        assert_eq!(received, Some(LinkEvent::Down));
    }

    #[tokio::test]
    async fn test_panicking_callback_does_not_stop_worker() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let dispatcher = EventDispatcher::spawn();

        dispatcher.link(
            LinkEvent::Up,
            Arc::new(LinkCallbacks::new().on_link_up(|| panic!("boom"))),
        );
        dispatcher.station_joined(Arc::new(move || {
            let _ = tx.send(());
        }));

        let received = timeout(Duration::from_secs(1), rx.recv()).await.unwrap();
        assert_eq!(received, Some(()));
    }

    #[test]
    fn test_callbacks_debug() {
        let callbacks = LinkCallbacks::new().on_link_up(|| {});
        assert_eq!(
            format!("{callbacks:?}"),
            "LinkCallbacks { on_link_up: true, on_link_down: false }"
        );
    }
}
