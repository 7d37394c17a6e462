//! TLS Transport for the pairing channel
//!
//! One [`PairingTransport`] carries exactly one pairing attempt. Every I/O
//! step is bounded by a timeout and races a shutdown signal, so `stop()` on
//! the orchestrator unblocks a pending receive immediately and the socket is
//! closed when the transport is dropped.

use super::frame::{read_frame, write_frame, Frame, FrameType, MAX_PAYLOAD_LEN};
use crate::crypto::CHANNEL_BINDING_LEN;
use crate::pairing::PairingEndpoint;
use crate::{PairingError, Result};
use rustls::pki_types::ServerName;
use rustls::ClientConfig;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::time::timeout;
use tokio_rustls::client::TlsStream;
use tokio_rustls::TlsConnector;
use tracing::{debug, info, warn};

/// TLS exporter label for the SPAKE2 channel binding (NUL included)
pub const EXPORTER_LABEL: &[u8] = b"adb-label\0";

/// Time limits for transport operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportTimeouts {
    /// TCP connect plus TLS handshake
    pub connect: Duration,
    /// Each send or receive
    pub io: Duration,
}

impl Default for TransportTimeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(5),
            io: Duration::from_secs(5),
        }
    }
}

/// Resolves once `true` is published; never resolves if the sender is gone
async fn stop_requested(mut shutdown: watch::Receiver<bool>) {
    let stopped = shutdown.wait_for(|stop| *stop).await.is_ok();
    if !stopped {
        std::future::pending::<()>().await;
    }
}

/// Run `fut` under a time limit, giving up early on shutdown
async fn bounded<T, F>(
    shutdown: &watch::Receiver<bool>,
    limit: Duration,
    what: &str,
    fut: F,
) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::select! {
        res = timeout(limit, fut) => match res {
            Ok(inner) => inner,
            Err(_) => Err(PairingError::Timeout(format!("{} after {:?}", what, limit))),
        },
        _ = stop_requested(shutdown.clone()) => {
            Err(PairingError::Cancelled(format!("{} interrupted", what)))
        }
    }
}

/// TLS connection to a pairing service
pub struct PairingTransport {
    stream: TlsStream<TcpStream>,
    endpoint: PairingEndpoint,
    io_timeout: Duration,
    shutdown: watch::Receiver<bool>,
}

impl PairingTransport {
    /// Connect and complete the TLS handshake
    ///
    /// # Arguments
    ///
    /// * `endpoint` - Pairing service address
    /// * `config` - Client configuration from [`super::create_client_config`]
    /// * `timeouts` - Connect and per-message limits
    /// * `shutdown` - Set to `true` to abort any pending operation
    pub async fn connect(
        endpoint: &PairingEndpoint,
        config: Arc<ClientConfig>,
        timeouts: TransportTimeouts,
        shutdown: watch::Receiver<bool>,
    ) -> Result<Self> {
        info!("Connecting to pairing service at {}", endpoint);

        let server_name = ServerName::try_from(endpoint.host.as_str())
            .map_err(|e| {
                PairingError::Connection(format!("invalid host {:?}: {}", endpoint.host, e))
            })?
            .to_owned();

        let host = endpoint.host.clone();
        let port = endpoint.port;
        let connect = async move {
            let tcp = TcpStream::connect((host.as_str(), port))
                .await
                .map_err(|e| {
                    PairingError::from_io_error(e, &format!("connecting to {}:{}", host, port))
                })?;
            if let Err(e) = tcp.set_nodelay(true) {
                debug!("Failed to set TCP_NODELAY for {}:{}: {}", host, port, e);
            }

            debug!("TCP connection established to {}:{}", host, port);

            TlsConnector::from(config)
                .connect(server_name, tcp)
                .await
                .map_err(|e| {
                    if e.kind() == std::io::ErrorKind::InvalidData {
                        PairingError::Tls(format!("handshake failed: {}", e))
                    } else {
                        PairingError::from_io_error(e, "TLS handshake")
                    }
                })
        };

        let stream = bounded(&shutdown, timeouts.connect, "connect", connect)
            .await
            .map_err(|e| {
                warn!("Connection to {} failed: {}", endpoint, e);
                e
            })?;

        info!("TLS connection established to {}", endpoint);

        Ok(Self {
            stream,
            endpoint: endpoint.clone(),
            io_timeout: timeouts.io,
            shutdown,
        })
    }

    /// Remote pairing service
    pub fn endpoint(&self) -> &PairingEndpoint {
        &self.endpoint
    }

    /// Export the 64 byte channel binding for SPAKE2
    pub fn export_keying_material(&self) -> Result<[u8; CHANNEL_BINDING_LEN]> {
        let (_, connection) = self.stream.get_ref();
        let binding = connection.export_keying_material(
            [0u8; CHANNEL_BINDING_LEN],
            EXPORTER_LABEL,
            None,
        )?;
        Ok(binding)
    }

    /// Send one frame
    pub async fn send_frame(&mut self, frame_type: FrameType, payload: &[u8]) -> Result<()> {
        debug!(
            "Sending {:?} frame ({} bytes) to {}",
            frame_type,
            payload.len(),
            self.endpoint
        );
        bounded(
            &self.shutdown,
            self.io_timeout,
            "send",
            write_frame(&mut self.stream, frame_type, payload),
        )
        .await
    }

    /// Wait for the next complete frame
    pub async fn recv_frame(&mut self) -> Result<Frame> {
        debug!("Waiting for frame from {}", self.endpoint);
        let frame = bounded(
            &self.shutdown,
            self.io_timeout,
            "receive",
            read_frame(&mut self.stream, MAX_PAYLOAD_LEN),
        )
        .await?;
        debug!(
            "Received {:?} frame ({} bytes) from {}",
            frame.frame_type,
            frame.payload.len(),
            self.endpoint
        );
        Ok(frame)
    }

    /// Receive a frame and insist on its type
    pub async fn expect_frame(&mut self, expected: FrameType) -> Result<Vec<u8>> {
        let frame = self.recv_frame().await?;
        if frame.frame_type != expected {
            return Err(PairingError::Protocol(format!(
                "expected {:?} frame, got {:?}",
                expected, frame.frame_type
            )));
        }
        Ok(frame.payload)
    }

    /// Send close_notify and close the socket
    pub async fn close(mut self) -> Result<()> {
        debug!("Closing pairing connection to {}", self.endpoint);
        let stream = &mut self.stream;
        let close_notify = async move {
            stream
                .shutdown()
                .await
                .map_err(|e| PairingError::from_io_error(e, "closing connection"))
        };
        bounded(&self.shutdown, self.io_timeout, "close", close_notify).await
    }
}

impl std::fmt::Debug for PairingTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PairingTransport")
            .field("endpoint", &self.endpoint)
            .field("io_timeout", &self.io_timeout)
            .finish_non_exhaustive()
    }
}
