//! ADB Wireless Debugging Pairing
//!
//! Pairs this device with its own Wireless debugging service so that our
//! public key becomes a trusted ADB client, no second computer required.
//!
//! ## Pairing Protocol
//!
//! 1. **Discovery**: the pairing service advertises `_adb-tls-pairing._tcp`
//! 2. **TLS**: TLS 1.3 connection, client certificate from our identity key
//! 3. **Key exchange**: SPAKE2 over the six digit code and the TLS exporter
//! 4. **Peer info**: both sides swap AES-GCM encrypted identity records
//! 5. **Result**: decrypting the service's record means the code matched and
//!    our key is now authorized
//!
//! ## Usage
//!
//! ```no_run
//! use adb_pairing_protocol::discovery::{DiscoveryConfig, ServiceDiscovery};
//! use adb_pairing_protocol::identity::{FileKeyValueStore, PairingKeyStore};
//! use adb_pairing_protocol::pairing::{PairingConfig, PairingEndpoint, PairingOrchestrator};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() {
//!     let keys = PairingKeyStore::new(
//!         Arc::new(FileKeyValueStore::new("/data/local/adb-pairing")),
//!         "agent@device",
//!     );
//!     let orchestrator = PairingOrchestrator::new(
//!         Arc::new(keys),
//!         ServiceDiscovery::mdns(DiscoveryConfig::default()),
//!         PairingConfig::default(),
//!     );
//!
//!     let outcome = orchestrator
//!         .submit_code(PairingEndpoint::local(37123), "123456")
//!         .await;
//!     println!("{:?}", outcome.failure_reason());
//! }
//! ```

pub mod code;
pub mod endpoint;
pub mod orchestrator;
pub mod peer_info;
pub mod session;
pub mod state;

// Re-export main types
pub use code::{PairingCode, PAIRING_CODE_LEN};
pub use endpoint::PairingEndpoint;
pub use orchestrator::{PairingConfig, PairingOrchestrator};
pub use peer_info::{PeerInfo, PeerInfoKind, PEER_INFO_SIZE};
pub use session::PairingSession;
pub use state::{AuthorizedPeerRecord, PairingAttempt, PairingOutcome, PairingState};
