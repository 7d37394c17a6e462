//! In-process stand-in for the device's Wireless debugging pairing service
//!
//! Speaks the server side of the pairing protocol the way `adbd` does: after
//! the SPAKE2 exchange it sends its own encrypted PeerInfo before reading the
//! client's, so a client with the wrong code fails on decryption.

#![allow(dead_code)]

use adb_pairing_protocol::crypto::{PakeResponder, SessionCipher, CHANNEL_BINDING_LEN};
use adb_pairing_protocol::pairing::{PairingCode, PairingEndpoint, PeerInfo};
use adb_pairing_protocol::transport::frame::{read_frame, write_frame};
use adb_pairing_protocol::transport::{FrameType, EXPORTER_LABEL, FRAME_VERSION, MAX_PAYLOAD_LEN};
use adb_pairing_protocol::PairingCredential;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer, UnixTime};
use rustls::server::danger::{ClientCertVerified, ClientCertVerifier};
use rustls::{DigitallySignedStruct, DistinguishedName, ServerConfig, SignatureScheme};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_rustls::server::TlsStream;
use tokio_rustls::TlsAcceptor;

/// What the service saw during one connection
#[derive(Debug, Clone)]
pub struct SessionReport {
    /// The client's PeerInfo, if it decrypted with our key
    pub client_info: Option<PeerInfo>,
    /// Whether the client presented a TLS certificate
    pub client_certificate: bool,
    /// Raw SPAKE2 message received from the client
    pub client_pake_message: Vec<u8>,
    /// Channel binding of this connection
    pub channel_binding: [u8; CHANNEL_BINDING_LEN],
}

/// How the service departs from the protocol, if at all
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Behavior {
    #[default]
    Honest,
    /// Answer the SPAKE2 message with a PeerInfo frame
    PeerInfoForPake,
    /// Answer with a frame whose version byte is 2
    BadFrameVersion,
    /// Answer with a header announcing more than the maximum payload
    OversizedFrame,
    /// Complete the key exchange, then seal a PeerInfo of unknown kind
    UnknownPeerInfoKind,
    /// Read the SPAKE2 message and never answer
    StallAfterPake,
    /// Answer the SPAKE2 message, then never send PeerInfo
    StallAfterKeys,
}

#[derive(Debug, Clone)]
pub struct ServiceOptions {
    pub code: String,
    /// Pause before answering the client's SPAKE2 message
    pub reply_delay: Duration,
    pub behavior: Behavior,
}

impl ServiceOptions {
    pub fn with_code(code: &str) -> Self {
        Self {
            code: code.to_string(),
            reply_delay: Duration::ZERO,
            behavior: Behavior::Honest,
        }
    }

    pub fn behaving(code: &str, behavior: Behavior) -> Self {
        Self {
            behavior,
            ..Self::with_code(code)
        }
    }
}

pub struct PairingServiceDouble {
    pub addr: SocketAddr,
    /// Public key announced in our PeerInfo
    pub public_key: Vec<u8>,
    pub name: String,
    reports: mpsc::UnboundedReceiver<SessionReport>,
    task: JoinHandle<()>,
}

impl PairingServiceDouble {
    pub async fn spawn(options: ServiceOptions) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let acceptor = TlsAcceptor::from(server_config());
        let identity = PairingCredential::generate("adbd").unwrap();
        let public_key = identity.public_key().to_vec();
        let name = "adb-TEST0001-pairing".to_string();
        let (report_tx, reports) = mpsc::unbounded_channel();

        let peer_info = PeerInfo::with_public_key(&public_key, name.clone());
        let task = tokio::spawn(async move {
            loop {
                let Ok((tcp, _)) = listener.accept().await else {
                    return;
                };
                let acceptor = acceptor.clone();
                let options = options.clone();
                let peer_info = peer_info.clone();
                let report_tx = report_tx.clone();
                tokio::spawn(async move {
                    if let Some(report) = serve(acceptor, tcp, &options, &peer_info).await {
                        let _ = report_tx.send(report);
                    }
                });
            }
        });

        Self {
            addr,
            public_key,
            name,
            reports,
            task,
        }
    }

    pub fn endpoint(&self) -> PairingEndpoint {
        PairingEndpoint::from(self.addr)
    }

    /// Report of the next served connection
    pub async fn next_report(&mut self) -> SessionReport {
        tokio::time::timeout(Duration::from_secs(5), self.reports.recv())
            .await
            .expect("pairing service produced no report")
            .expect("pairing service stopped")
    }
}

impl Drop for PairingServiceDouble {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn serve(
    acceptor: TlsAcceptor,
    tcp: TcpStream,
    options: &ServiceOptions,
    peer_info: &PeerInfo,
) -> Option<SessionReport> {
    let mut tls = acceptor.accept(tcp).await.ok()?;
    let client_certificate = tls.get_ref().1.peer_certificates().is_some();
    let channel_binding = tls
        .get_ref()
        .1
        .export_keying_material([0u8; CHANNEL_BINDING_LEN], EXPORTER_LABEL, None)
        .ok()?;

    let code = PairingCode::parse(&options.code).ok()?;

    let msg1 = read_frame(&mut tls, MAX_PAYLOAD_LEN).await.ok()?;
    assert_eq!(msg1.frame_type, FrameType::PakeMessage);
    let (secret, msg2) = PakeResponder::complete(&msg1.payload, &code, &channel_binding).ok()?;

    tokio::time::sleep(options.reply_delay).await;
    match options.behavior {
        Behavior::PeerInfoForPake => {
            write_frame(&mut tls, FrameType::PeerInfo, &msg2).await.ok()?;
            return drain(tls).await;
        }
        Behavior::BadFrameVersion => {
            let mut raw = vec![2, FrameType::PakeMessage.as_u8()];
            raw.extend_from_slice(&(msg2.len() as u32).to_be_bytes());
            raw.extend_from_slice(&msg2);
            tls.write_all(&raw).await.ok()?;
            return drain(tls).await;
        }
        Behavior::OversizedFrame => {
            let mut raw = vec![FRAME_VERSION, FrameType::PakeMessage.as_u8()];
            raw.extend_from_slice(&(MAX_PAYLOAD_LEN + 1).to_be_bytes());
            tls.write_all(&raw).await.ok()?;
            return drain(tls).await;
        }
        Behavior::StallAfterPake => return drain(tls).await,
        _ => write_frame(&mut tls, FrameType::PakeMessage, &msg2).await.ok()?,
    }

    let mut cipher = SessionCipher::new(&secret).ok()?;
    match options.behavior {
        Behavior::StallAfterKeys => return drain(tls).await,
        Behavior::UnknownPeerInfoKind => {
            let mut garbled = peer_info.encode().ok()?;
            garbled[0] = 7;
            let sealed = cipher.seal(&garbled).ok()?;
            write_frame(&mut tls, FrameType::PeerInfo, &sealed).await.ok()?;
            return drain(tls).await;
        }
        _ => {
            let sealed = cipher.seal(&peer_info.encode().ok()?).ok()?;
            write_frame(&mut tls, FrameType::PeerInfo, &sealed).await.ok()?;
        }
    }

    let theirs = read_frame(&mut tls, MAX_PAYLOAD_LEN).await.ok()?;
    let client_info = cipher
        .open(&theirs.payload)
        .ok()
        .and_then(|plain| PeerInfo::decode(&plain).ok());

    let _ = tls.shutdown().await;

    Some(SessionReport {
        client_info,
        client_certificate,
        client_pake_message: msg1.payload,
        channel_binding,
    })
}

/// Swallow whatever the client still sends until it hangs up
async fn drain(mut tls: TlsStream<TcpStream>) -> Option<SessionReport> {
    while read_frame(&mut tls, MAX_PAYLOAD_LEN).await.is_ok() {}
    None
}

/// Requests a client certificate and accepts whatever is offered
#[derive(Debug)]
struct AcceptAnyClientCert;

impl ClientCertVerifier for AcceptAnyClientCert {
    fn root_hint_subjects(&self) -> &[DistinguishedName] {
        &[]
    }

    fn verify_client_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _now: UnixTime,
    ) -> Result<ClientCertVerified, rustls::Error> {
        Ok(ClientCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(
            message,
            cert,
            dss,
            &rustls::crypto::ring::default_provider().signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(
            message,
            cert,
            dss,
            &rustls::crypto::ring::default_provider().signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        rustls::crypto::ring::default_provider()
            .signature_verification_algorithms
            .supported_schemes()
    }
}

fn server_config() -> Arc<ServerConfig> {
    let cert = rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
    let cert_der = CertificateDer::from(cert.serialize_der().unwrap());
    let key_der = PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(cert.serialize_private_key_der()));

    let config = ServerConfig::builder_with_protocol_versions(&[&rustls::version::TLS13])
        .with_client_cert_verifier(Arc::new(AcceptAnyClientCert))
        .with_single_cert(vec![cert_der], key_der)
        .unwrap();
    Arc::new(config)
}
