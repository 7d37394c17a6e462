//! Pairing frame codec
//!
//! Every message on the pairing channel is a 6 byte header followed by the
//! payload:
//!
//! ```text
//! +---------+------+----------------------+-----------------+
//! | version | type | length (u32, BE)     | payload         |
//! | 1 byte  | 1 B  | 4 bytes              | `length` bytes  |
//! +---------+------+----------------------+-----------------+
//! ```
//!
//! The length is checked against the maximum before the payload buffer is
//! allocated, so a hostile peer cannot make us reserve 4 GiB.

use crate::{PairingError, Result};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

/// Header version byte
pub const FRAME_VERSION: u8 = 1;

/// Size of the fixed frame header
pub const FRAME_HEADER_LEN: usize = 6;

/// Largest payload accepted in either direction
pub const MAX_PAYLOAD_LEN: u32 = 2 * crate::pairing::peer_info::PEER_INFO_SIZE as u32;

/// Payload type carried by a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FrameType {
    /// SPAKE2 key exchange message
    PakeMessage = 0,
    /// AEAD encrypted PeerInfo record
    PeerInfo = 1,
}

impl FrameType {
    /// Wire value of this type
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for FrameType {
    type Error = PairingError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(FrameType::PakeMessage),
            1 => Ok(FrameType::PeerInfo),
            other => Err(PairingError::Protocol(format!(
                "unknown frame type {}",
                other
            ))),
        }
    }
}

/// Decoded frame header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub frame_type: FrameType,
    pub payload_len: u32,
}

impl FrameHeader {
    /// Serialize to the 6 byte wire form
    pub fn encode(&self) -> [u8; FRAME_HEADER_LEN] {
        let mut out = [0u8; FRAME_HEADER_LEN];
        out[0] = FRAME_VERSION;
        out[1] = self.frame_type.as_u8();
        out[2..].copy_from_slice(&self.payload_len.to_be_bytes());
        out
    }

    /// Parse and validate a header
    ///
    /// Fails with a protocol error on a wrong version, an unknown type, or a
    /// length above `max_payload`.
    pub fn decode(bytes: &[u8; FRAME_HEADER_LEN], max_payload: u32) -> Result<Self> {
        if bytes[0] != FRAME_VERSION {
            return Err(PairingError::Protocol(format!(
                "unsupported frame version {} (expected {})",
                bytes[0], FRAME_VERSION
            )));
        }

        let frame_type = FrameType::try_from(bytes[1])?;
        let payload_len = u32::from_be_bytes([bytes[2], bytes[3], bytes[4], bytes[5]]);

        if payload_len > max_payload {
            return Err(PairingError::FrameTooLarge(payload_len, max_payload));
        }

        Ok(Self {
            frame_type,
            payload_len,
        })
    }
}

/// A complete frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub frame_type: FrameType,
    pub payload: Vec<u8>,
}

impl Frame {
    pub fn new(frame_type: FrameType, payload: Vec<u8>) -> Self {
        Self {
            frame_type,
            payload,
        }
    }

    /// Encode header and payload into one buffer
    pub fn encode(&self) -> Result<Vec<u8>> {
        let payload_len = checked_len(&self.payload)?;
        let header = FrameHeader {
            frame_type: self.frame_type,
            payload_len,
        };

        let mut out = Vec::with_capacity(FRAME_HEADER_LEN + self.payload.len());
        out.extend_from_slice(&header.encode());
        out.extend_from_slice(&self.payload);
        Ok(out)
    }
}

fn checked_len(payload: &[u8]) -> Result<u32> {
    match u32::try_from(payload.len()) {
        Ok(len) if len <= MAX_PAYLOAD_LEN => Ok(len),
        Ok(len) => Err(PairingError::FrameTooLarge(len, MAX_PAYLOAD_LEN)),
        Err(_) => Err(PairingError::FrameTooLarge(u32::MAX, MAX_PAYLOAD_LEN)),
    }
}

/// Write one frame and flush
pub async fn write_frame<W>(writer: &mut W, frame_type: FrameType, payload: &[u8]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let payload_len = checked_len(payload)?;
    let header = FrameHeader {
        frame_type,
        payload_len,
    };

    debug!("Writing {:?} frame ({} bytes)", frame_type, payload_len);

    writer
        .write_all(&header.encode())
        .await
        .map_err(|e| PairingError::from_io_error(e, "writing frame header"))?;
    writer
        .write_all(payload)
        .await
        .map_err(|e| PairingError::from_io_error(e, "writing frame payload"))?;
    writer
        .flush()
        .await
        .map_err(|e| PairingError::from_io_error(e, "flushing frame"))?;

    Ok(())
}

/// Read one complete frame, waiting across partial deliveries
///
/// A stream that ends before the first header byte is a closed connection.
/// A stream that ends inside a frame is a truncated frame (protocol error).
pub async fn read_frame<R>(reader: &mut R, max_payload: u32) -> Result<Frame>
where
    R: AsyncRead + Unpin,
{
    let mut header_bytes = [0u8; FRAME_HEADER_LEN];

    let first = reader
        .read(&mut header_bytes[..1])
        .await
        .map_err(|e| PairingError::from_io_error(e, "reading frame header"))?;
    if first == 0 {
        return Err(PairingError::Connection(
            "peer closed the connection".to_string(),
        ));
    }

    reader
        .read_exact(&mut header_bytes[1..])
        .await
        .map_err(|e| truncated_or_io(e, "frame header"))?;

    let header = FrameHeader::decode(&header_bytes, max_payload)?;

    let mut payload = vec![0u8; header.payload_len as usize];
    reader
        .read_exact(&mut payload)
        .await
        .map_err(|e| truncated_or_io(e, "frame payload"))?;

    debug!(
        "Read {:?} frame ({} bytes)",
        header.frame_type, header.payload_len
    );

    Ok(Frame::new(header.frame_type, payload))
}

fn truncated_or_io(error: std::io::Error, what: &str) -> PairingError {
    if error.kind() == std::io::ErrorKind::UnexpectedEof {
        PairingError::Protocol(format!("truncated {}", what))
    } else {
        PairingError::from_io_error(error, &format!("reading {}", what))
    }
}
