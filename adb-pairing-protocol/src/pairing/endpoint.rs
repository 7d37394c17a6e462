//! Pairing service address

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{IpAddr, SocketAddr};

/// Host the pairing service listens on when pairing with ourselves
pub const LOCAL_HOST: &str = "127.0.0.1";

/// Where a pairing service can be reached
///
/// Endpoints come from discovery or from the caller and are never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PairingEndpoint {
    pub host: String,
    pub port: u16,
}

impl PairingEndpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// The pairing service of this very device
    pub fn local(port: u16) -> Self {
        Self::new(LOCAL_HOST, port)
    }

    /// Stable `host:port` identity used in authorization records
    pub fn identity(&self) -> String {
        match self.host.parse::<IpAddr>() {
            Ok(IpAddr::V6(ip)) => SocketAddr::new(IpAddr::V6(ip), self.port).to_string(),
            _ => format!("{}:{}", self.host, self.port),
        }
    }
}

impl From<SocketAddr> for PairingEndpoint {
    fn from(addr: SocketAddr) -> Self {
        Self::new(addr.ip().to_string(), addr.port())
    }
}

impl fmt::Display for PairingEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.identity())
    }
}
