//! Discovery Service
//!
//! Runs one background listener over a [`PresenceSource`], filters and
//! de-duplicates what it reports, and fans presence changes out to every
//! subscriber. `start` and `stop` are idempotent; a restart begins a new
//! event sequence and ends the channels of earlier subscribers. A source that
//! ends on its own closes every subscriber and leaves discovery inactive.

use super::{DiscoveryError, MdnsPresenceSource, PresenceEvent, ADB_PAIRING_SERVICE_TYPE};
use crate::pairing::PairingEndpoint;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Something that reports raw service advertisements
///
/// Implementations may report duplicates; [`ServiceDiscovery`] filters them.
#[async_trait]
pub trait PresenceSource: Send + Sync {
    /// Begin browsing for `service_type`
    async fn browse(
        &self,
        service_type: &str,
    ) -> Result<mpsc::UnboundedReceiver<PresenceEvent>, DiscoveryError>;

    /// Stop browsing and release resources
    async fn stop_browse(&self, service_type: &str);
}

/// Discovery service configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryConfig {
    /// mDNS service type to browse
    pub service_type: String,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            service_type: ADB_PAIRING_SERVICE_TYPE.to_string(),
        }
    }
}

/// What the listener has seen and who hears about it
///
/// Kept under one lock so a new subscriber's replay and the listener's
/// next change cannot interleave.
#[derive(Default)]
struct Fanout {
    present: HashSet<PairingEndpoint>,
    subscribers: Vec<mpsc::UnboundedSender<PresenceEvent>>,
}

impl Fanout {
    fn close(&mut self) {
        self.present.clear();
        self.subscribers.clear();
    }
}

type SharedFanout = Arc<Mutex<Fanout>>;

/// Background watcher of pairing service advertisements
pub struct ServiceDiscovery {
    source: Arc<dyn PresenceSource>,
    config: DiscoveryConfig,
    fanout: SharedFanout,
    shutdown_tx: Option<oneshot::Sender<()>>,
    listener: Option<JoinHandle<()>>,
}

impl ServiceDiscovery {
    pub fn new(source: Arc<dyn PresenceSource>, config: DiscoveryConfig) -> Self {
        Self {
            source,
            config,
            fanout: Arc::new(Mutex::new(Fanout::default())),
            shutdown_tx: None,
            listener: None,
        }
    }

    /// Discovery over multicast DNS
    pub fn mdns(config: DiscoveryConfig) -> Self {
        Self::new(Arc::new(MdnsPresenceSource::new()), config)
    }

    /// Whether the background listener is running
    ///
    /// Turns false on its own once the source ends.
    pub fn is_active(&self) -> bool {
        self.listener
            .as_ref()
            .is_some_and(|listener| !listener.is_finished())
    }

    /// Receive presence changes
    ///
    /// Services already present are reported first. The channel closes when
    /// discovery stops or the source ends.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<PresenceEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut fanout = self.fanout.lock();
        for endpoint in &fanout.present {
            let _ = tx.send(PresenceEvent::appeared(endpoint.clone()));
        }
        fanout.subscribers.push(tx);
        rx
    }

    /// Start watching; a no-op while already active
    pub async fn start(&mut self) {
        if self.is_active() {
            debug!("Discovery already running");
            return;
        }
        if self.shutdown_tx.is_some() {
            debug!("Previous discovery source ended; restarting");
            self.stop().await;
        }

        let raw = match self.source.browse(&self.config.service_type).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Discovery unavailable: {}", e);
                return;
            }
        };

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        self.shutdown_tx = Some(shutdown_tx);
        self.listener = Some(tokio::spawn(Self::listen(
            raw,
            self.fanout.clone(),
            shutdown_rx,
        )));

        info!("Discovery started for {}", self.config.service_type);
    }

    /// Stop watching; a no-op while inactive
    pub async fn stop(&mut self) {
        let Some(shutdown_tx) = self.shutdown_tx.take() else {
            return;
        };

        let _ = shutdown_tx.send(());
        if let Some(listener) = self.listener.take() {
            let _ = listener.await;
        }

        self.source.stop_browse(&self.config.service_type).await;
        self.fanout.lock().close();

        info!("Discovery stopped");
    }

    async fn listen(
        mut raw: mpsc::UnboundedReceiver<PresenceEvent>,
        fanout: SharedFanout,
        mut shutdown_rx: oneshot::Receiver<()>,
    ) {
        loop {
            tokio::select! {
                _ = &mut shutdown_rx => break,
                event = raw.recv() => {
                    let Some(event) = event else {
                        warn!("Discovery source ended");
                        fanout.lock().close();
                        break;
                    };

                    if event.endpoint.port == 0 {
                        debug!("Ignoring advertisement without port from {}", event.endpoint.host);
                        continue;
                    }

                    Self::publish(&fanout, event);
                }
            }
        }
    }

    /// Record a change and pass it on; repeats of the current state are dropped
    fn publish(fanout: &Mutex<Fanout>, event: PresenceEvent) {
        let mut fanout = fanout.lock();
        let changed = if event.present {
            fanout.present.insert(event.endpoint.clone())
        } else {
            fanout.present.remove(&event.endpoint)
        };
        if !changed {
            return;
        }

        if event.present {
            info!("Pairing service available at {}", event.endpoint);
        } else {
            info!("Pairing service at {} went away", event.endpoint);
        }

        fanout.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }
}

impl Drop for ServiceDiscovery {
    fn drop(&mut self) {
        if let Some(listener) = self.listener.take() {
            listener.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::mpsc::error::TryRecvError;
    use tokio::time::{sleep, Duration};

    /// Source fed by the test through `feed`
    #[derive(Default)]
    struct ScriptedSource {
        feed: Mutex<Option<mpsc::UnboundedSender<PresenceEvent>>>,
        browse_calls: AtomicUsize,
        stop_calls: AtomicUsize,
        fail: bool,
    }

    impl ScriptedSource {
        fn emit(&self, event: PresenceEvent) {
            if let Some(tx) = self.feed.lock().as_ref() {
                tx.send(event).unwrap();
            }
        }
    }

    #[async_trait]
    impl PresenceSource for ScriptedSource {
        async fn browse(
            &self,
            _service_type: &str,
        ) -> Result<mpsc::UnboundedReceiver<PresenceEvent>, DiscoveryError> {
            self.browse_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(DiscoveryError::Unavailable("no multicast".to_string()));
            }
            let (tx, rx) = mpsc::unbounded_channel();
            *self.feed.lock() = Some(tx);
            Ok(rx)
        }

        async fn stop_browse(&self, _service_type: &str) {
            self.stop_calls.fetch_add(1, Ordering::SeqCst);
            self.feed.lock().take();
        }
    }

    fn endpoint(port: u16) -> PairingEndpoint {
        PairingEndpoint::new("192.168.1.5", port)
    }

    async fn settle() {
        sleep(Duration::from_millis(50)).await;
    }

    #[tokio::test]
    async fn test_double_start_single_listener() {
        let source = Arc::new(ScriptedSource::default());
        let mut discovery = ServiceDiscovery::new(source.clone(), DiscoveryConfig::default());

        discovery.start().await;
        let mut events = discovery.subscribe();
        discovery.start().await;

        assert_eq!(source.browse_calls.load(Ordering::SeqCst), 1);

        source.emit(PresenceEvent::appeared(endpoint(37123)));
        settle().await;

        assert_eq!(
            events.try_recv().unwrap(),
            PresenceEvent::appeared(endpoint(37123))
        );
        assert_eq!(events.try_recv(), Err(TryRecvError::Empty));
    }

    #[tokio::test]
    async fn test_duplicates_and_port_zero_filtered() {
        let source = Arc::new(ScriptedSource::default());
        let mut discovery = ServiceDiscovery::new(source.clone(), DiscoveryConfig::default());
        discovery.start().await;
        let mut events = discovery.subscribe();

        source.emit(PresenceEvent::appeared(endpoint(0)));
        source.emit(PresenceEvent::appeared(endpoint(40001)));
        source.emit(PresenceEvent::appeared(endpoint(40001)));
        source.emit(PresenceEvent::vanished(endpoint(40002)));
        source.emit(PresenceEvent::vanished(endpoint(40001)));
        settle().await;

        assert_eq!(events.try_recv().unwrap(), PresenceEvent::appeared(endpoint(40001)));
        assert_eq!(events.try_recv().unwrap(), PresenceEvent::vanished(endpoint(40001)));
        assert_eq!(events.try_recv(), Err(TryRecvError::Empty));
    }

    #[tokio::test]
    async fn test_restart_yields_fresh_sequence() {
        let source = Arc::new(ScriptedSource::default());
        let mut discovery = ServiceDiscovery::new(source.clone(), DiscoveryConfig::default());

        discovery.start().await;
        let mut first = discovery.subscribe();
        source.emit(PresenceEvent::appeared(endpoint(40001)));
        settle().await;

        discovery.stop().await;
        discovery.stop().await;
        assert_eq!(source.stop_calls.load(Ordering::SeqCst), 1);
        assert!(!discovery.is_active());

        assert!(first.recv().await.is_some());
        assert!(first.recv().await.is_none());

        discovery.start().await;
        let mut second = discovery.subscribe();
        // Same endpoint again: a new sequence reports it anew
        source.emit(PresenceEvent::appeared(endpoint(40001)));
        settle().await;

        assert_eq!(second.try_recv().unwrap(), PresenceEvent::appeared(endpoint(40001)));
        assert_eq!(source.browse_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_source_failure_is_swallowed() {
        let source = Arc::new(ScriptedSource {
            fail: true,
            ..Default::default()
        });
        let mut discovery = ServiceDiscovery::new(source.clone(), DiscoveryConfig::default());

        discovery.start().await;
        assert!(!discovery.is_active());
        discovery.stop().await;
        assert_eq!(source.stop_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_late_subscriber_sees_present_services() {
        let source = Arc::new(ScriptedSource::default());
        let mut discovery = ServiceDiscovery::new(source.clone(), DiscoveryConfig::default());
        discovery.start().await;

        source.emit(PresenceEvent::appeared(endpoint(40001)));
        source.emit(PresenceEvent::appeared(endpoint(40002)));
        source.emit(PresenceEvent::vanished(endpoint(40002)));
        settle().await;

        let mut late = discovery.subscribe();
        assert_eq!(late.try_recv().unwrap(), PresenceEvent::appeared(endpoint(40001)));
        assert_eq!(late.try_recv(), Err(TryRecvError::Empty));

        source.emit(PresenceEvent::vanished(endpoint(40001)));
        settle().await;
        assert_eq!(late.try_recv().unwrap(), PresenceEvent::vanished(endpoint(40001)));
    }

    #[tokio::test]
    async fn test_source_end_closes_subscribers() {
        let source = Arc::new(ScriptedSource::default());
        let mut discovery = ServiceDiscovery::new(source.clone(), DiscoveryConfig::default());
        discovery.start().await;
        let mut events = discovery.subscribe();

        source.emit(PresenceEvent::appeared(endpoint(40001)));
        // Dropping the feed ends the raw stream
        source.feed.lock().take();

        let first = tokio::time::timeout(Duration::from_secs(1), events.recv())
            .await
            .unwrap();
        assert_eq!(first, Some(PresenceEvent::appeared(endpoint(40001))));
        let closed = tokio::time::timeout(Duration::from_secs(1), events.recv())
            .await
            .unwrap();
        assert!(closed.is_none());

        settle().await;
        assert!(!discovery.is_active());

        // A later start browses again and forgets the old sequence
        discovery.start().await;
        assert!(discovery.is_active());
        assert_eq!(source.browse_calls.load(Ordering::SeqCst), 2);
        assert_eq!(source.stop_calls.load(Ordering::SeqCst), 1);

        let mut fresh = discovery.subscribe();
        assert_eq!(fresh.try_recv(), Err(TryRecvError::Empty));
        source.emit(PresenceEvent::appeared(endpoint(40001)));
        settle().await;
        assert_eq!(fresh.try_recv().unwrap(), PresenceEvent::appeared(endpoint(40001)));
    }
}
