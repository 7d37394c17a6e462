//! Pairing Transport Layer
//!
//! TLS socket to the pairing service plus the binary frame codec that runs
//! on top of it.

pub mod frame;
pub mod tls;
pub mod tls_config;

pub use frame::{Frame, FrameHeader, FrameType, FRAME_HEADER_LEN, FRAME_VERSION, MAX_PAYLOAD_LEN};
pub use tls::{PairingTransport, TransportTimeouts, EXPORTER_LABEL};
pub use tls_config::create_client_config;
