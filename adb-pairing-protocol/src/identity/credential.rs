//! This device's pairing identity

use crate::{PairingError, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use rcgen::{Certificate, CertificateParams, DistinguishedName, DnType, PKCS_ECDSA_P256_SHA256};
use ring::rand::SystemRandom;
use ring::signature::{EcdsaKeyPair, KeyPair, ECDSA_P256_SHA256_ASN1_SIGNING};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use zeroize::Zeroizing;

/// Current on-disk record version
const RECORD_VERSION: u8 = 1;

#[derive(Serialize, Deserialize)]
struct IdentityRecordV1 {
    version: u8,
    device_name: String,
    private_key_pkcs8: String,
}

/// ECDSA P-256 keypair plus the name announced to the peer
pub struct PairingCredential {
    pkcs8: Zeroizing<Vec<u8>>,
    public_key: Vec<u8>,
    device_name: String,
}

impl PairingCredential {
    /// Generate a fresh keypair
    pub fn generate(device_name: impl Into<String>) -> Result<Self> {
        let rng = SystemRandom::new();
        let document = EcdsaKeyPair::generate_pkcs8(&ECDSA_P256_SHA256_ASN1_SIGNING, &rng)
            .map_err(|_| PairingError::Key("keypair generation failed".to_string()))?;
        Self::from_pkcs8(document.as_ref().to_vec(), device_name)
    }

    /// Load from a PKCS#8 document, validating the key
    pub fn from_pkcs8(pkcs8: Vec<u8>, device_name: impl Into<String>) -> Result<Self> {
        let pkcs8 = Zeroizing::new(pkcs8);
        let key_pair = EcdsaKeyPair::from_pkcs8(
            &ECDSA_P256_SHA256_ASN1_SIGNING,
            &pkcs8,
            &SystemRandom::new(),
        )
        .map_err(|e| PairingError::Key(format!("invalid private key: {}", e)))?;

        Ok(Self {
            public_key: key_pair.public_key().as_ref().to_vec(),
            pkcs8,
            device_name: device_name.into(),
        })
    }

    /// Uncompressed SEC1 public key (65 bytes)
    pub fn public_key(&self) -> &[u8] {
        &self.public_key
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    pub(crate) fn private_key_der(&self) -> &[u8] {
        &self.pkcs8
    }

    /// SHA-256 of the public key as colon separated hex
    pub fn fingerprint(&self) -> String {
        let digest = Sha256::digest(&self.public_key);
        digest
            .iter()
            .map(|b| hex::encode_upper([*b]))
            .collect::<Vec<_>>()
            .join(":")
    }

    /// Self-signed certificate for the TLS client handshake
    pub fn certificate_der(&self) -> Result<Vec<u8>> {
        let key_pair = rcgen::KeyPair::from_der(&self.pkcs8)
            .map_err(|e| PairingError::Key(format!("unusable private key: {}", e)))?;

        let mut distinguished_name = DistinguishedName::new();
        distinguished_name.push(DnType::CommonName, self.device_name.as_str());

        let mut params = CertificateParams::default();
        params.distinguished_name = distinguished_name;
        params.alg = &PKCS_ECDSA_P256_SHA256;
        params.key_pair = Some(key_pair);

        Certificate::from_params(params)
            .and_then(|cert| cert.serialize_der())
            .map_err(|e| PairingError::Key(format!("certificate generation failed: {}", e)))
    }

    /// Encode the persisted record
    pub(crate) fn to_record(&self) -> Result<Vec<u8>> {
        let record = IdentityRecordV1 {
            version: RECORD_VERSION,
            device_name: self.device_name.clone(),
            private_key_pkcs8: STANDARD.encode(self.pkcs8.as_slice()),
        };
        serde_json::to_vec_pretty(&record)
            .map_err(|e| PairingError::Key(format!("encoding identity record: {}", e)))
    }

    /// Decode a persisted record; any defect is a key error
    pub(crate) fn from_record(bytes: &[u8]) -> Result<Self> {
        let record: IdentityRecordV1 = serde_json::from_slice(bytes)
            .map_err(|e| PairingError::Key(format!("corrupt identity record: {}", e)))?;

        if record.version != RECORD_VERSION {
            return Err(PairingError::Key(format!(
                "unsupported identity record version {}",
                record.version
            )));
        }

        let pkcs8 = STANDARD
            .decode(record.private_key_pkcs8.as_bytes())
            .map_err(|e| PairingError::Key(format!("corrupt private key encoding: {}", e)))?;

        Self::from_pkcs8(pkcs8, record.device_name)
    }
}

impl fmt::Debug for PairingCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PairingCredential")
            .field("device_name", &self.device_name)
            .field("fingerprint", &self.fingerprint())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_and_record_round_trip() {
        let credential = PairingCredential::generate("tester@host").unwrap();
        assert_eq!(credential.public_key().len(), 65);
        assert_eq!(credential.public_key()[0], 0x04);

        let record = credential.to_record().unwrap();
        let restored = PairingCredential::from_record(&record).unwrap();
        assert_eq!(restored.public_key(), credential.public_key());
        assert_eq!(restored.device_name(), "tester@host");
    }

    #[test]
    fn test_corrupt_records_are_key_errors() {
        let bad = [
            &b"not json"[..],
            br#"{"version":2,"device_name":"x","private_key_pkcs8":""}"#,
            br#"{"version":1,"device_name":"x","private_key_pkcs8":"%%%"}"#,
            br#"{"version":1,"device_name":"x","private_key_pkcs8":"AAAA"}"#,
        ];
        for bytes in bad {
            let err = PairingCredential::from_record(bytes).unwrap_err();
            assert!(matches!(err, PairingError::Key(_)), "{:?}", err);
        }
    }

    #[test]
    fn test_fingerprint_format() {
        let credential = PairingCredential::generate("fp").unwrap();
        let fp = credential.fingerprint();
        assert_eq!(fp.len(), 32 * 3 - 1);
        assert_eq!(fp.split(':').count(), 32);

        let digest = Sha256::digest(credential.public_key());
        for (pair, byte) in fp.split(':').zip(digest.iter()) {
            assert_eq!(pair, pair.to_ascii_uppercase());
            assert_eq!(u8::from_str_radix(pair, 16).unwrap(), *byte);
        }
    }

    #[test]
    fn test_certificate_is_der() {
        let credential = PairingCredential::generate("cert test").unwrap();
        let der = credential.certificate_der().unwrap();
        // DER SEQUENCE tag
        assert_eq!(der[0], 0x30);
    }

    #[test]
    fn test_debug_hides_private_key() {
        let credential = PairingCredential::generate("debug").unwrap();
        let shown = format!("{:?}", credential);
        assert!(shown.contains("fingerprint"));
        assert!(!shown.contains("pkcs8"));
    }
}
