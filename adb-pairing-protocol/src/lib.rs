//! ADB Pairing Protocol Implementation
//!
//! On-device client for the ADB Wireless debugging pairing handshake: the
//! same SPAKE2-over-TLS exchange `adb pair` performs from a computer, run
//! against the device's own pairing service.

pub mod crypto;
pub mod discovery;
pub mod identity;
pub mod pairing;
pub mod transport;

mod error;
pub use discovery::{DiscoveryConfig, PresenceEvent, ServiceDiscovery};
pub use error::{FailureReason, PairingError, Result};
pub use identity::{PairingCredential, PairingKeyStore};
pub use pairing::{
    AuthorizedPeerRecord, PairingCode, PairingConfig, PairingEndpoint, PairingOrchestrator,
    PairingOutcome, PairingState,
};

/// Frame header version we speak
pub const PROTOCOL_VERSION: u8 = transport::FRAME_VERSION;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_version() {
        assert_eq!(PROTOCOL_VERSION, 1);
    }
}
