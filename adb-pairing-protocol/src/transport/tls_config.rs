//! TLS Configuration for the pairing channel
//!
//! The pairing service presents a throwaway self-signed certificate, so chain
//! validation is switched off; the SPAKE2 step authenticates the peer. Handshake
//! signatures are still checked so the exported keying material belongs to the
//! key that actually signed the handshake.
//!
//! Our own certificate is generated from the identity keypair and presented as
//! a client certificate, which is how the service learns which key to trust.

use crate::identity::PairingCredential;
use crate::Result;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{ring as ring_provider, WebPkiSupportedAlgorithms};
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, SignatureScheme};
use std::sync::Arc;
use tracing::debug;

/// Server certificate verifier that trusts any certificate
#[derive(Debug)]
struct AcceptAnyServerCert {
    algorithms: WebPkiSupportedAlgorithms,
}

impl AcceptAnyServerCert {
    fn new() -> Self {
        Self {
            algorithms: ring_provider::default_provider().signature_verification_algorithms,
        }
    }
}

impl ServerCertVerifier for AcceptAnyServerCert {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(message, cert, dss, &self.algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(message, cert, dss, &self.algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.algorithms.supported_schemes()
    }
}

/// Create the TLS 1.3 client configuration for one pairing attempt
///
/// # Arguments
///
/// * `credential` - Identity whose key signs our client certificate
pub fn create_client_config(credential: &PairingCredential) -> Result<Arc<ClientConfig>> {
    debug!("Creating TLS client config for pairing (TLS 1.3 only)");

    let certificate = CertificateDer::from(credential.certificate_der()?);
    let private_key =
        PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(credential.private_key_der().to_vec()));

    let config = ClientConfig::builder_with_protocol_versions(&[&rustls::version::TLS13])
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(AcceptAnyServerCert::new()))
        .with_client_auth_cert(vec![certificate], private_key)?;

    Ok(Arc::new(config))
}
