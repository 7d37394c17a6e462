//! PeerInfo record exchanged once the session key is agreed
//!
//! The record is always [`PEER_INFO_SIZE`] bytes so its ciphertext length says
//! nothing about its content:
//!
//! ```text
//! byte 0      kind (0 = public key, 1 = device GUID)
//! bytes 1..   NUL terminated UTF-8, zero padded
//!             public key kind: "<base64 key> <name>"
//! ```

use crate::{PairingError, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;

/// Fixed plaintext size of a PeerInfo record
pub const PEER_INFO_SIZE: usize = 8192;

/// What the data section of a PeerInfo carries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PeerInfoKind {
    PublicKey = 0,
    DeviceGuid = 1,
}

impl TryFrom<u8> for PeerInfoKind {
    type Error = PairingError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(PeerInfoKind::PublicKey),
            1 => Ok(PeerInfoKind::DeviceGuid),
            other => Err(PairingError::Protocol(format!(
                "unknown peer info kind {}",
                other
            ))),
        }
    }
}

/// One side's identity as sent over the encrypted channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerInfo {
    pub kind: PeerInfoKind,
    /// Empty for the device GUID kind
    pub public_key: Vec<u8>,
    /// Display name, or the GUID for the device GUID kind
    pub name: String,
}

impl PeerInfo {
    /// Record announcing a public key
    pub fn with_public_key(public_key: &[u8], name: impl Into<String>) -> Self {
        Self {
            kind: PeerInfoKind::PublicKey,
            public_key: public_key.to_vec(),
            name: name.into(),
        }
    }

    /// Record announcing a device GUID
    pub fn with_device_guid(guid: impl Into<String>) -> Self {
        Self {
            kind: PeerInfoKind::DeviceGuid,
            public_key: Vec::new(),
            name: guid.into(),
        }
    }

    /// Serialize to exactly [`PEER_INFO_SIZE`] bytes
    pub fn encode(&self) -> Result<Vec<u8>> {
        if self.name.contains('\0') {
            return Err(PairingError::Protocol(
                "peer name contains a NUL byte".to_string(),
            ));
        }

        let data = match self.kind {
            PeerInfoKind::PublicKey => {
                format!("{} {}", STANDARD.encode(&self.public_key), self.name)
            }
            PeerInfoKind::DeviceGuid => self.name.clone(),
        };

        // One byte for the kind and one for the terminating NUL
        if data.len() > PEER_INFO_SIZE - 2 {
            return Err(PairingError::Protocol(format!(
                "peer info data is {} bytes (max {})",
                data.len(),
                PEER_INFO_SIZE - 2
            )));
        }

        let mut out = vec![0u8; PEER_INFO_SIZE];
        out[0] = self.kind as u8;
        out[1..1 + data.len()].copy_from_slice(data.as_bytes());
        Ok(out)
    }

    /// Parse a decrypted record
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != PEER_INFO_SIZE {
            return Err(PairingError::Protocol(format!(
                "peer info is {} bytes (expected {})",
                bytes.len(),
                PEER_INFO_SIZE
            )));
        }

        let kind = PeerInfoKind::try_from(bytes[0])?;
        let body = &bytes[1..];
        let end = body.iter().position(|b| *b == 0).ok_or_else(|| {
            PairingError::Protocol("peer info data is not NUL terminated".to_string())
        })?;
        let data = std::str::from_utf8(&body[..end])
            .map_err(|_| PairingError::Protocol("peer info data is not UTF-8".to_string()))?;

        match kind {
            PeerInfoKind::PublicKey => {
                let (encoded, name) = data.split_once(' ').unwrap_or((data, ""));
                let public_key = STANDARD.decode(encoded.trim()).map_err(|e| {
                    PairingError::Protocol(format!("peer public key is not base64: {}", e))
                })?;
                if public_key.is_empty() {
                    return Err(PairingError::Protocol("peer public key is empty".to_string()));
                }
                Ok(Self {
                    kind,
                    public_key,
                    name: name.to_string(),
                })
            }
            PeerInfoKind::DeviceGuid => Ok(Self::with_device_guid(data)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_key_record() {
        let info = PeerInfo::with_public_key(&[4, 1, 2, 3], "agent@pixel 8");
        let encoded = info.encode().unwrap();

        assert_eq!(encoded.len(), PEER_INFO_SIZE);
        assert_eq!(encoded[0], 0);
        assert!(encoded[1..].starts_with(b"BAECAw== agent@pixel 8\0"));
        assert_eq!(PeerInfo::decode(&encoded).unwrap(), info);
    }

    #[test]
    fn test_device_guid_record() {
        let mut raw = vec![0u8; PEER_INFO_SIZE];
        raw[0] = 1;
        raw[1..16].copy_from_slice(b"adb-R5CT1234-ab");

        let info = PeerInfo::decode(&raw).unwrap();
        assert_eq!(info.kind, PeerInfoKind::DeviceGuid);
        assert_eq!(info.name, "adb-R5CT1234-ab");
        assert!(info.public_key.is_empty());
    }

    #[test]
    fn test_oversize_data_rejected() {
        let info = PeerInfo::with_public_key(&[1u8; 32], "x".repeat(PEER_INFO_SIZE));
        assert!(matches!(info.encode(), Err(PairingError::Protocol(_))));
    }

    #[test]
    fn test_malformed_records() {
        assert!(PeerInfo::decode(&[0u8; 10]).is_err());

        let mut unknown_kind = vec![0u8; PEER_INFO_SIZE];
        unknown_kind[0] = 7;
        assert!(PeerInfo::decode(&unknown_kind).is_err());

        let mut unterminated = vec![b'A'; PEER_INFO_SIZE];
        unterminated[0] = 0;
        assert!(PeerInfo::decode(&unterminated).is_err());

        let mut bad_base64 = vec![0u8; PEER_INFO_SIZE];
        bad_base64[1..6].copy_from_slice(b"!!! x");
        assert!(PeerInfo::decode(&bad_base64).is_err());

        let empty_key = vec![0u8; PEER_INFO_SIZE];
        assert!(PeerInfo::decode(&empty_key).is_err());
    }
}
