//! Error handling for the ADB pairing client
//!
//! Every failure that can end a pairing attempt is a [`PairingError`]. Each
//! variant belongs to exactly one [`FailureReason`], which is the tag the
//! orchestrator hands back to its caller inside a failed outcome.
//!
//! ## Error Handling Patterns
//!
//! ```rust,no_run
//! use adb_pairing_protocol::{FailureReason, PairingError};
//!
//! fn describe(error: &PairingError) -> String {
//!     match error.reason() {
//!         FailureReason::InvalidCode => "Wrong pairing code, try again".to_string(),
//!         FailureReason::Busy => "Already pairing".to_string(),
//!         _ => error.user_message(),
//!     }
//! }
//! ```
//!
//! I/O failures are classified with [`PairingError::from_io_error`] so that a
//! refused connection and a timeout stay distinguishable in logs while both
//! report [`FailureReason::Connection`].

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Result type for pairing operations
pub type Result<T> = std::result::Result<T, PairingError>;

/// Errors that terminate a pairing attempt
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PairingError {
    /// Generic socket failure (reset, broken pipe, unexpected EOF)
    #[error("Connection error: {0}")]
    Connection(String),

    /// Connect or receive did not complete in time
    #[error("Connection timeout: {0}")]
    Timeout(String),

    /// Nothing is listening on the endpoint
    #[error("Connection refused: {0}")]
    ConnectionRefused(String),

    /// TLS handshake or record layer failure
    #[error("TLS error: {0}")]
    Tls(String),

    /// Attempt was cancelled by `stop()`
    #[error("Operation cancelled: {0}")]
    Cancelled(String),

    /// Malformed or unexpected message from the peer
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Frame length header above the allowed maximum
    #[error("Frame too large: {0} bytes (max: {1})")]
    FrameTooLarge(u32, u32),

    /// Code rejected: PAKE mismatch, AEAD failure or malformed code
    #[error("Invalid pairing code")]
    InvalidCode,

    /// Local identity key unavailable or corrupt
    #[error("Key error: {0}")]
    Key(String),

    /// Another attempt is already running
    #[error("Another pairing attempt is already in progress")]
    Busy,
}

/// Terminal failure tag reported to the caller of `submit_code`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    /// Socket, TLS, timeout or cancellation failure
    Connection,
    /// Peer violated the wire protocol
    Protocol,
    /// The code did not match the one shown by the pairing service
    InvalidCode,
    /// Local identity keypair could not be loaded
    Key,
    /// Rejected because another attempt was in flight
    Busy,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FailureReason::Connection => "connection_error",
            FailureReason::Protocol => "protocol_error",
            FailureReason::InvalidCode => "invalid_code",
            FailureReason::Key => "key_error",
            FailureReason::Busy => "busy",
        };
        f.write_str(s)
    }
}

impl PairingError {
    /// Classify an I/O error into a pairing error, keeping `context` in the message
    ///
    /// # Examples
    ///
    /// ```
    /// use adb_pairing_protocol::PairingError;
    /// use std::io;
    ///
    /// let io_err = io::Error::new(io::ErrorKind::ConnectionRefused, "refused");
    /// let err = PairingError::from_io_error(io_err, "connecting to 127.0.0.1:37123");
    /// assert!(matches!(err, PairingError::ConnectionRefused(_)));
    /// ```
    pub fn from_io_error(error: std::io::Error, context: &str) -> Self {
        use std::io::ErrorKind;

        match error.kind() {
            ErrorKind::TimedOut => PairingError::Timeout(format!("{}: {}", context, error)),
            ErrorKind::ConnectionRefused => {
                PairingError::ConnectionRefused(format!("{}: {}", context, error))
            }
            ErrorKind::UnexpectedEof => {
                PairingError::Connection(format!("{}: peer closed the connection", context))
            }
            ErrorKind::ConnectionReset | ErrorKind::ConnectionAborted | ErrorKind::BrokenPipe => {
                PairingError::Connection(format!("{}: connection interrupted ({})", context, error))
            }
            _ => PairingError::Connection(format!("{}: {}", context, error)),
        }
    }

    /// The failure tag this error reports to the caller
    pub fn reason(&self) -> FailureReason {
        match self {
            PairingError::Connection(_)
            | PairingError::Timeout(_)
            | PairingError::ConnectionRefused(_)
            | PairingError::Tls(_)
            | PairingError::Cancelled(_) => FailureReason::Connection,
            PairingError::Protocol(_) | PairingError::FrameTooLarge(_, _) => {
                FailureReason::Protocol
            }
            PairingError::InvalidCode => FailureReason::InvalidCode,
            PairingError::Key(_) => FailureReason::Key,
            PairingError::Busy => FailureReason::Busy,
        }
    }

    /// Whether submitting again (possibly with a corrected code) can succeed
    ///
    /// A corrupt identity needs an explicit reset first, so it is the only
    /// failure that a plain retry will not fix.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, PairingError::Key(_))
    }

    /// Sentence suitable for a notification or dialog
    pub fn user_message(&self) -> String {
        match self {
            PairingError::InvalidCode => {
                "Wrong pairing code. Check the code shown in Wireless debugging and try again."
                    .to_string()
            }
            PairingError::ConnectionRefused(_) => {
                "Pairing service not reachable. Open \"Pair device with pairing code\" again."
                    .to_string()
            }
            PairingError::Timeout(_) => {
                "Pairing timed out. Make sure the pairing dialog is still open.".to_string()
            }
            PairingError::Connection(msg) | PairingError::Tls(msg) => {
                format!("Connection to the pairing service failed: {}.", msg)
            }
            PairingError::Cancelled(_) => "Pairing was cancelled.".to_string(),
            PairingError::Protocol(msg) => {
                format!("Unexpected response from the pairing service: {}.", msg)
            }
            PairingError::FrameTooLarge(size, max) => format!(
                "Unexpected response from the pairing service ({} byte message, max {}).",
                size, max
            ),
            PairingError::Key(msg) => format!(
                "The pairing identity could not be loaded: {}. Reset it to pair again.",
                msg
            ),
            PairingError::Busy => "A pairing attempt is already running.".to_string(),
        }
    }
}

impl From<rustls::Error> for PairingError {
    fn from(error: rustls::Error) -> Self {
        PairingError::Tls(error.to_string())
    }
}
