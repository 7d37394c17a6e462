//! Pairing Orchestrator
//!
//! The only entry point a front end needs: it owns discovery, hands out
//! presence streams, and runs at most one [`PairingSession`] at a time.
//! Nothing about an attempt outlives `submit_code`, so a front end that is
//! torn down and recreated simply submits `(endpoint, code)` again.

use super::session::PairingSession;
use super::state::{PairingOutcome, PairingState};
use super::{PairingCode, PairingEndpoint};
use crate::discovery::{PresenceEvent, ServiceDiscovery};
use crate::identity::PairingKeyStore;
use crate::transport::TransportTimeouts;
use crate::PairingError;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

/// Pairing configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairingConfig {
    /// Limit for TCP connect plus TLS handshake
    pub connect_timeout: Duration,
    /// Limit for each frame send or receive
    pub io_timeout: Duration,
    /// Stop discovery after a successful pairing
    pub stop_discovery_on_success: bool,
}

impl Default for PairingConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            io_timeout: Duration::from_secs(5),
            stop_discovery_on_success: true,
        }
    }
}

impl PairingConfig {
    fn timeouts(&self) -> TransportTimeouts {
        TransportTimeouts {
            connect: self.connect_timeout,
            io: self.io_timeout,
        }
    }
}

/// Shutdown handle of the running session, if any
type ActiveSlot = Mutex<Option<watch::Sender<bool>>>;

/// Releases the session slot when the attempt ends or its future is dropped
struct ActiveSession<'a> {
    slot: &'a ActiveSlot,
}

impl<'a> ActiveSession<'a> {
    fn try_acquire(slot: &'a ActiveSlot) -> Option<(Self, watch::Receiver<bool>)> {
        let mut active = slot.lock();
        if active.is_some() {
            return None;
        }
        let (tx, rx) = watch::channel(false);
        *active = Some(tx);
        Some((Self { slot }, rx))
    }
}

impl Drop for ActiveSession<'_> {
    fn drop(&mut self) {
        self.slot.lock().take();
    }
}

/// Coordinates discovery, user codes and pairing sessions
pub struct PairingOrchestrator {
    key_store: Arc<PairingKeyStore>,
    discovery: tokio::sync::Mutex<ServiceDiscovery>,
    config: PairingConfig,
    active: ActiveSlot,
    state_tx: Arc<watch::Sender<PairingState>>,
}

impl PairingOrchestrator {
    pub fn new(
        key_store: Arc<PairingKeyStore>,
        discovery: ServiceDiscovery,
        config: PairingConfig,
    ) -> Self {
        let (state_tx, _) = watch::channel(PairingState::Idle);
        Self {
            key_store,
            discovery: tokio::sync::Mutex::new(discovery),
            config,
            active: Mutex::new(None),
            state_tx: Arc::new(state_tx),
        }
    }

    pub fn key_store(&self) -> &Arc<PairingKeyStore> {
        &self.key_store
    }

    /// Start discovery (if needed) and subscribe to presence changes
    ///
    /// Repeated calls share one background listener; each returned channel
    /// first hears of services already present, then sees every change once.
    pub async fn start_discovery(&self) -> mpsc::UnboundedReceiver<PresenceEvent> {
        let mut discovery = self.discovery.lock().await;
        discovery.start().await;
        discovery.subscribe()
    }

    /// Stop discovery; open presence channels end
    pub async fn stop_discovery(&self) {
        self.discovery.lock().await.stop().await;
    }

    /// State of the current (or last) attempt
    pub fn attempt_state(&self) -> watch::Receiver<PairingState> {
        self.state_tx.subscribe()
    }

    /// Whether a session is in flight
    pub fn is_busy(&self) -> bool {
        self.active.lock().is_some()
    }

    /// Pair with `endpoint` using `code`
    ///
    /// Returns [`PairingError::Busy`] at once if another attempt is running.
    /// Every call opens a new connection and runs a fresh key exchange.
    pub async fn submit_code(&self, endpoint: PairingEndpoint, code: &str) -> PairingOutcome {
        let Some((_active, shutdown)) = ActiveSession::try_acquire(&self.active) else {
            warn!("Rejecting pairing with {}: another attempt is running", endpoint);
            return PairingOutcome::Failed(PairingError::Busy);
        };

        let code = match PairingCode::parse(code) {
            Ok(code) => code,
            Err(e) => {
                warn!("Rejecting malformed pairing code for {}", endpoint);
                let outcome = PairingOutcome::Failed(e);
                self.state_tx.send_replace(outcome.state());
                return outcome;
            }
        };

        info!("Starting pairing with {}", endpoint);
        self.state_tx.send_replace(PairingState::Idle);

        let outcome = PairingSession::new(
            endpoint,
            code,
            self.key_store.clone(),
            self.config.timeouts(),
            shutdown,
        )
        .with_observer(self.state_tx.clone())
        .run()
        .await;

        if outcome.is_success() && self.config.stop_discovery_on_success {
            debug!("Pairing succeeded, stopping discovery");
            self.stop_discovery().await;
        }

        outcome
    }

    /// Cancel the in-flight session and stop discovery
    ///
    /// A pending connect or receive fails promptly with a connection error
    /// and the socket is closed.
    pub async fn stop(&self) {
        if let Some(shutdown) = self.active.lock().as_ref() {
            info!("Cancelling in-flight pairing attempt");
            shutdown.send_replace(true);
        }
        self.stop_discovery().await;
    }
}
