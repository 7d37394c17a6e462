//! Pairing Service Discovery
//!
//! Watches the local network for the Wireless debugging pairing service
//! (`_adb-tls-pairing._tcp`) and reports presence changes.
//!
//! Discovery is best effort: failures are logged and never reach the caller.
//!
//! ## Usage
//!
//! ```no_run
//! use adb_pairing_protocol::discovery::{DiscoveryConfig, ServiceDiscovery};
//!
//! #[tokio::main]
//! async fn main() {
//!     let mut discovery = ServiceDiscovery::mdns(DiscoveryConfig::default());
//!     discovery.start().await;
//!     let mut events = discovery.subscribe();
//!     while let Some(event) = events.recv().await {
//!         println!("{} present={}", event.endpoint, event.present);
//!     }
//! }
//! ```

pub mod events;
pub mod mdns;
pub mod service;

pub use events::PresenceEvent;
pub use mdns::MdnsPresenceSource;
pub use service::{DiscoveryConfig, PresenceSource, ServiceDiscovery};

use thiserror::Error;

/// mDNS service type advertised by the pairing service
pub const ADB_PAIRING_SERVICE_TYPE: &str = "_adb-tls-pairing._tcp.local.";

/// Discovery failures; these are logged inside the module and never returned
/// from [`ServiceDiscovery`]
#[derive(Error, Debug)]
pub enum DiscoveryError {
    #[error("mDNS error: {0}")]
    Mdns(#[from] mdns_sd::Error),

    #[error("Discovery source unavailable: {0}")]
    Unavailable(String),
}
