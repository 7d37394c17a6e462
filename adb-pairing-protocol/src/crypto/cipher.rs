//! AES-128-GCM session cipher
//!
//! The key is HKDF-SHA256 over the SPAKE2 output (empty salt, fixed info
//! string). Each direction keeps its own message counter; the nonce is the
//! counter in little-endian followed by four zero bytes:
//!
//! ```text
//! nonce (12 bytes) = counter (8 bytes LE) || 0x00000000
//! ```
//!
//! The receiving counter only advances on a successful open, so a replayed or
//! reordered message fails authentication.

use super::{PakeError, SharedSecret};
use ring::aead::{self, Aad, LessSafeKey, Nonce, UnboundKey, NONCE_LEN};
use ring::hkdf;

/// HKDF info string for the pairing key
const HKDF_INFO: &[u8] = b"adb pairing_auth aes-128-gcm key";

/// Bytes added to each sealed message
pub const AEAD_TAG_LEN: usize = 16;

/// Message cipher for one pairing session
pub struct SessionCipher {
    key: LessSafeKey,
    enc_counter: u64,
    dec_counter: u64,
}

impl SessionCipher {
    /// Derive the session key from the PAKE output
    pub fn new(secret: &SharedSecret) -> Result<Self, PakeError> {
        let prk = hkdf::Salt::new(hkdf::HKDF_SHA256, &[]).extract(secret.as_bytes());
        let okm = prk
            .expand(&[HKDF_INFO], &aead::AES_128_GCM)
            .map_err(|_| PakeError::KeyDerivation)?;
        let key = LessSafeKey::new(UnboundKey::from(okm));

        Ok(Self {
            key,
            enc_counter: 0,
            dec_counter: 0,
        })
    }

    fn nonce(counter: u64) -> Nonce {
        let mut bytes = [0u8; NONCE_LEN];
        bytes[..8].copy_from_slice(&counter.to_le_bytes());
        Nonce::assume_unique_for_key(bytes)
    }

    /// Encrypt the next outbound message
    pub fn seal(&mut self, plaintext: &[u8]) -> Result<Vec<u8>, PakeError> {
        let next = self
            .enc_counter
            .checked_add(1)
            .ok_or(PakeError::CounterExhausted)?;

        let mut in_out = Vec::with_capacity(plaintext.len() + AEAD_TAG_LEN);
        in_out.extend_from_slice(plaintext);
        self.key
            .seal_in_place_append_tag(Self::nonce(self.enc_counter), Aad::empty(), &mut in_out)
            .map_err(|_| PakeError::Malformed("message too large to encrypt".to_string()))?;

        self.enc_counter = next;
        Ok(in_out)
    }

    /// Decrypt and authenticate the next inbound message
    ///
    /// Fails with [`PakeError::Mismatch`] when the peer derived a different
    /// key (wrong code) or the message was altered, replayed or reordered.
    pub fn open(&mut self, ciphertext: &[u8]) -> Result<Vec<u8>, PakeError> {
        if ciphertext.len() < AEAD_TAG_LEN {
            return Err(PakeError::Malformed(format!(
                "encrypted message is {} bytes, shorter than the tag",
                ciphertext.len()
            )));
        }
        let next = self
            .dec_counter
            .checked_add(1)
            .ok_or(PakeError::CounterExhausted)?;

        let mut in_out = ciphertext.to_vec();
        let plaintext_len = self
            .key
            .open_in_place(Self::nonce(self.dec_counter), Aad::empty(), &mut in_out)
            .map_err(|_| PakeError::Mismatch)?
            .len();
        in_out.truncate(plaintext_len);

        self.dec_counter = next;
        Ok(in_out)
    }

    /// Messages sealed so far
    pub fn sent(&self) -> u64 {
        self.enc_counter
    }

    /// Messages opened so far
    pub fn received(&self) -> u64 {
        self.dec_counter
    }
}
