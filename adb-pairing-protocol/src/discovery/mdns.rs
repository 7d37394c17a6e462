//! Multicast DNS presence source

use super::{DiscoveryError, PresenceEvent, PresenceSource};
use crate::pairing::PairingEndpoint;
use async_trait::async_trait;
use mdns_sd::{ServiceDaemon, ServiceEvent};
use parking_lot::Mutex;
use std::collections::HashMap;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Browses mDNS with an `mdns-sd` daemon
///
/// A new daemon is created per browse so that a stopped source can be
/// started again.
#[derive(Default)]
pub struct MdnsPresenceSource {
    daemon: Mutex<Option<ServiceDaemon>>,
}

impl MdnsPresenceSource {
    pub fn new() -> Self {
        Self::default()
    }
}

fn endpoints_of(info: &mdns_sd::ServiceInfo) -> Vec<PairingEndpoint> {
    let port = info.get_port();
    let mut endpoints: Vec<PairingEndpoint> = info
        .get_addresses()
        .iter()
        .map(|ip| PairingEndpoint::new(ip.to_string(), port))
        .collect();
    endpoints.sort_by(|a, b| a.host.cmp(&b.host));
    endpoints
}

#[async_trait]
impl PresenceSource for MdnsPresenceSource {
    async fn browse(
        &self,
        service_type: &str,
    ) -> Result<mpsc::UnboundedReceiver<PresenceEvent>, DiscoveryError> {
        let daemon = ServiceDaemon::new()?;
        let receiver = daemon.browse(service_type)?;
        let (tx, rx) = mpsc::unbounded_channel();

        debug!("Browsing mDNS for {}", service_type);

        tokio::spawn(async move {
            // fullname -> endpoints announced for it
            let mut resolved: HashMap<String, Vec<PairingEndpoint>> = HashMap::new();

            while let Ok(event) = receiver.recv_async().await {
                match event {
                    ServiceEvent::ServiceResolved(info) => {
                        let endpoints = endpoints_of(&info);
                        debug!(
                            "Resolved {} with {} address(es)",
                            info.get_fullname(),
                            endpoints.len()
                        );
                        for endpoint in &endpoints {
                            if tx.send(PresenceEvent::appeared(endpoint.clone())).is_err() {
                                return;
                            }
                        }
                        if let Some(previous) =
                            resolved.insert(info.get_fullname().to_string(), endpoints.clone())
                        {
                            // Addresses or port changed under the same name
                            for stale in previous.into_iter().filter(|e| !endpoints.contains(e)) {
                                let _ = tx.send(PresenceEvent::vanished(stale));
                            }
                        }
                    }
                    ServiceEvent::ServiceRemoved(_, fullname) => {
                        debug!("Service {} removed", fullname);
                        for endpoint in resolved.remove(&fullname).unwrap_or_default() {
                            if tx.send(PresenceEvent::vanished(endpoint)).is_err() {
                                return;
                            }
                        }
                    }
                    ServiceEvent::SearchStopped(ty) => {
                        debug!("mDNS search for {} stopped", ty);
                        break;
                    }
                    _ => {}
                }
            }
        });

        if let Some(previous) = self.daemon.lock().replace(daemon) {
            let _ = previous.shutdown();
        }

        Ok(rx)
    }

    async fn stop_browse(&self, service_type: &str) {
        let Some(daemon) = self.daemon.lock().take() else {
            return;
        };

        if let Err(e) = daemon.stop_browse(service_type) {
            warn!("Failed to stop mDNS browse: {}", e);
        }
        if let Err(e) = daemon.shutdown() {
            warn!("Failed to shut down mDNS daemon: {}", e);
        }
    }
}
