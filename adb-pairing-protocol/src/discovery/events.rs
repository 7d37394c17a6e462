//! Discovery Event System
//!
//! Presence changes of pairing services on the local network.

use crate::pairing::PairingEndpoint;

/// A pairing service appeared or went away
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PresenceEvent {
    /// Where the service listens
    pub endpoint: PairingEndpoint,
    /// `true` when advertised, `false` when withdrawn
    pub present: bool,
}

impl PresenceEvent {
    pub fn appeared(endpoint: PairingEndpoint) -> Self {
        Self {
            endpoint,
            present: true,
        }
    }

    pub fn vanished(endpoint: PairingEndpoint) -> Self {
        Self {
            endpoint,
            present: false,
        }
    }

    /// Check if this event announces a reachable service
    pub fn is_present(&self) -> bool {
        self.present
    }
}
