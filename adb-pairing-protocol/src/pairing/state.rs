//! Attempt states and terminal outcomes

use super::{PairingCode, PairingEndpoint};
use crate::{FailureReason, PairingError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Progress of one pairing attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state", content = "reason")]
pub enum PairingState {
    /// No attempt running
    Idle,
    /// Opening TCP and TLS
    Connecting,
    /// Exchanging SPAKE2 messages
    KeyExchange,
    /// Exchanging encrypted PeerInfo records
    InfoExchange,
    /// Peer authorized
    Success,
    /// Attempt ended with an error
    Failed(FailureReason),
}

impl PairingState {
    /// Whether the attempt has ended
    pub fn is_terminal(&self) -> bool {
        matches!(self, PairingState::Success | PairingState::Failed(_))
    }

    /// Whether an attempt is in flight
    pub fn is_active(&self) -> bool {
        !self.is_terminal() && *self != PairingState::Idle
    }
}

impl fmt::Display for PairingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PairingState::Idle => f.write_str("idle"),
            PairingState::Connecting => f.write_str("connecting"),
            PairingState::KeyExchange => f.write_str("key_exchange"),
            PairingState::InfoExchange => f.write_str("info_exchange"),
            PairingState::Success => f.write_str("success"),
            PairingState::Failed(reason) => write!(f, "failed({})", reason),
        }
    }
}

/// One submitted code against one endpoint
#[derive(Debug, Clone)]
pub struct PairingAttempt {
    pub endpoint: PairingEndpoint,
    pub code: PairingCode,
    pub state: PairingState,
}

impl PairingAttempt {
    pub fn new(endpoint: PairingEndpoint, code: PairingCode) -> Self {
        Self {
            endpoint,
            code,
            state: PairingState::Idle,
        }
    }
}

/// The pairing service's identity, now trusted
///
/// Handed to the caller on success; storing it is the caller's job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizedPeerRecord {
    /// Peer public key bytes (empty when the peer only sent a device GUID)
    pub peer_public_key: Vec<u8>,
    /// Peer display name or device GUID
    pub peer_name: String,
    /// `host:port` the record was obtained from
    pub endpoint_identity: String,
}

/// Terminal result of `submit_code`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PairingOutcome {
    Success(AuthorizedPeerRecord),
    Failed(PairingError),
}

impl PairingOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, PairingOutcome::Success(_))
    }

    /// Failure tag, `None` on success
    pub fn failure_reason(&self) -> Option<FailureReason> {
        match self {
            PairingOutcome::Success(_) => None,
            PairingOutcome::Failed(error) => Some(error.reason()),
        }
    }

    /// The authorized peer, `None` on failure
    pub fn record(&self) -> Option<&AuthorizedPeerRecord> {
        match self {
            PairingOutcome::Success(record) => Some(record),
            PairingOutcome::Failed(_) => None,
        }
    }

    /// State matching this outcome
    pub fn state(&self) -> PairingState {
        match self {
            PairingOutcome::Success(_) => PairingState::Success,
            PairingOutcome::Failed(error) => PairingState::Failed(error.reason()),
        }
    }
}
