//! Six digit pairing code shown by the Wireless debugging dialog

use crate::{PairingError, Result};
use std::fmt;
use std::str::FromStr;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Number of digits in a pairing code
pub const PAIRING_CODE_LEN: usize = 6;

/// A validated pairing code
///
/// The digits are wiped on drop and never appear in `Debug` output.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct PairingCode(String);

impl PairingCode {
    /// Parse user input, ignoring surrounding whitespace
    ///
    /// Anything other than exactly [`PAIRING_CODE_LEN`] ASCII digits is
    /// rejected as [`PairingError::InvalidCode`].
    pub fn parse(input: &str) -> Result<Self> {
        let trimmed = input.trim();
        if trimmed.len() != PAIRING_CODE_LEN || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
            return Err(PairingError::InvalidCode);
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl FromStr for PairingCode {
    type Err = PairingError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Debug for PairingCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PairingCode(******)")
    }
}
