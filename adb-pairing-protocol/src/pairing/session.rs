//! One pairing handshake over a fresh transport
//!
//! ```text
//!   client                                   pairing service
//!     | ---- TLS 1.3 (client cert, no server validation) ---- |
//!     | -- PakeMessage: SPAKE2 A ------------------------------> |
//!     | <------------------------------ PakeMessage: SPAKE2 B -- |
//!     | -- PeerInfo: AES-GCM(our key + name) ------------------> |
//!     | <------------------------- PeerInfo: AES-GCM(theirs) --- |
//! ```
//!
//! Decrypting the service's PeerInfo is the success signal. A session never
//! retries; every failure ends it.

use super::peer_info::PeerInfo;
use super::state::{AuthorizedPeerRecord, PairingAttempt, PairingOutcome, PairingState};
use super::{PairingCode, PairingEndpoint};
use crate::crypto::{PakeInitiator, SessionCipher};
use crate::identity::{PairingCredential, PairingKeyStore};
use crate::transport::{create_client_config, FrameType, PairingTransport, TransportTimeouts};
use crate::{PairingError, Result};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Drives one [`PairingAttempt`] to a terminal state
pub struct PairingSession {
    attempt: PairingAttempt,
    key_store: Arc<PairingKeyStore>,
    timeouts: TransportTimeouts,
    shutdown: watch::Receiver<bool>,
    observer: Option<Arc<watch::Sender<PairingState>>>,
}

impl PairingSession {
    /// # Arguments
    ///
    /// * `endpoint` - Pairing service to connect to
    /// * `code` - Code shown by the pairing service
    /// * `key_store` - Source of our identity
    /// * `timeouts` - Connect and per-message limits
    /// * `shutdown` - Set to `true` to abort the session
    pub fn new(
        endpoint: PairingEndpoint,
        code: PairingCode,
        key_store: Arc<PairingKeyStore>,
        timeouts: TransportTimeouts,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            attempt: PairingAttempt::new(endpoint, code),
            key_store,
            timeouts,
            shutdown,
            observer: None,
        }
    }

    /// Publish every state change to `observer`
    pub fn with_observer(mut self, observer: Arc<watch::Sender<PairingState>>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn state(&self) -> PairingState {
        self.attempt.state
    }

    fn transition(&mut self, state: PairingState) {
        debug!(
            "Pairing with {}: {} -> {}",
            self.attempt.endpoint, self.attempt.state, state
        );
        self.attempt.state = state;
        if let Some(observer) = &self.observer {
            observer.send_replace(state);
        }
    }

    /// Run the handshake to completion
    pub async fn run(mut self) -> PairingOutcome {
        let outcome = match self.handshake().await {
            Ok(record) => {
                info!(
                    "Paired with {} ({}) at {}",
                    record.peer_name, self.attempt.endpoint, record.endpoint_identity
                );
                PairingOutcome::Success(record)
            }
            Err(e) => {
                warn!("Pairing with {} failed: {}", self.attempt.endpoint, e);
                PairingOutcome::Failed(e)
            }
        };
        self.transition(outcome.state());
        outcome
    }

    async fn handshake(&mut self) -> Result<AuthorizedPeerRecord> {
        // The first call may generate a key and write the store
        let key_store = self.key_store.clone();
        let credential = tokio::task::spawn_blocking(move || key_store.get())
            .await
            .map_err(|e| PairingError::Key(format!("identity load task failed: {}", e)))??;

        self.transition(PairingState::Connecting);
        let config = create_client_config(&credential)?;
        let mut transport = PairingTransport::connect(
            &self.attempt.endpoint,
            config,
            self.timeouts,
            self.shutdown.clone(),
        )
        .await?;

        self.transition(PairingState::KeyExchange);
        let mut cipher = self.exchange_keys(&mut transport).await?;

        self.transition(PairingState::InfoExchange);
        let peer = Self::exchange_peer_info(&mut transport, &mut cipher, &credential).await?;

        if let Err(e) = transport.close().await {
            debug!("Ignoring close failure after successful pairing: {}", e);
        }

        Ok(AuthorizedPeerRecord {
            peer_public_key: peer.public_key,
            peer_name: peer.name,
            endpoint_identity: self.attempt.endpoint.identity(),
        })
    }

    async fn exchange_keys(&self, transport: &mut PairingTransport) -> Result<SessionCipher> {
        let binding = transport.export_keying_material()?;
        let (initiator, outbound) = PakeInitiator::initiate(&self.attempt.code, &binding)?;

        transport.send_frame(FrameType::PakeMessage, &outbound).await?;
        let inbound = transport.expect_frame(FrameType::PakeMessage).await?;

        let secret = initiator.finish(&inbound)?;
        Ok(SessionCipher::new(&secret)?)
    }

    async fn exchange_peer_info(
        transport: &mut PairingTransport,
        cipher: &mut SessionCipher,
        credential: &PairingCredential,
    ) -> Result<PeerInfo> {
        let ours = PeerInfo::with_public_key(credential.public_key(), credential.device_name());
        let sealed = cipher.seal(&ours.encode()?)?;
        transport.send_frame(FrameType::PeerInfo, &sealed).await?;

        let inbound = transport.expect_frame(FrameType::PeerInfo).await?;
        // A key mismatch (wrong code) shows up here as InvalidCode
        let plaintext = cipher.open(&inbound)?;
        PeerInfo::decode(&plaintext)
    }
}
