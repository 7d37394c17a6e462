//! Pairing Cryptography
//!
//! SPAKE2 key agreement from the six digit code and the AES-128-GCM session
//! cipher derived from its output. Both follow the constants of the platform
//! pairing service so that the exchange interoperates with `adbd`.

pub mod cipher;
pub mod spake;

use crate::PairingError;
use thiserror::Error;

pub use cipher::{SessionCipher, AEAD_TAG_LEN};
pub use spake::{
    PakeInitiator, PakeResponder, SharedSecret, CHANNEL_BINDING_LEN, PAKE_MESSAGE_LEN,
    SHARED_SECRET_LEN,
};

/// Failures inside the PAKE and session cipher
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PakeError {
    /// Wrong code or tampered channel
    #[error("pairing code mismatch")]
    Mismatch,

    /// Message does not have the expected shape
    #[error("malformed key exchange message: {0}")]
    Malformed(String),

    /// HKDF could not produce the session key
    #[error("session key derivation failed")]
    KeyDerivation,

    /// Message counter would wrap and reuse a nonce
    #[error("message counter exhausted")]
    CounterExhausted,
}

impl From<PakeError> for PairingError {
    fn from(error: PakeError) -> Self {
        match error {
            PakeError::Mismatch => PairingError::InvalidCode,
            PakeError::Malformed(msg) => PairingError::Protocol(msg),
            other => PairingError::Protocol(other.to_string()),
        }
    }
}
