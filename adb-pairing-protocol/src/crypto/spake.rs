//! SPAKE2 key agreement
//!
//! Edwards25519 SPAKE2 laid out the way the platform pairing service runs it:
//! 32 byte messages, the fixed blinding points M and N, and a 64 byte key
//! hashed with SHA-512 over the length-prefixed transcript.
//!
//! The password fed into SPAKE2 is the pairing code followed by 64 bytes of
//! TLS exported keying material, which binds the exchange to this particular
//! TLS connection. The client is side A, the pairing service side B.
//!
//! A wrong code does not make `finish` fail: both sides simply end up with
//! different secrets. The mismatch surfaces when the first AEAD message fails
//! to open (see [`super::SessionCipher::open`]).

use super::PakeError;
use crate::pairing::PairingCode;
use curve25519_dalek::edwards::{CompressedEdwardsY, EdwardsPoint};
use curve25519_dalek::scalar::Scalar;
use ring::rand::{SecureRandom, SystemRandom};
use sha2::{Digest, Sha512};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

/// Identity string of the connecting side (NUL included)
pub const CLIENT_IDENTITY: &[u8] = b"adb pair client\0";

/// Identity string of the pairing service (NUL included)
pub const SERVER_IDENTITY: &[u8] = b"adb pair server\0";

/// Length of every SPAKE2 message, independent of the code
pub const PAKE_MESSAGE_LEN: usize = 32;

/// Length of the agreed key
pub const SHARED_SECRET_LEN: usize = 64;

/// Length of the TLS exporter output mixed into the password
pub const CHANNEL_BINDING_LEN: usize = 64;

/// Blinding point of side A, hashed to the curve from
/// "edwards25519 point generation seed (M)"
const M_COMPRESSED: [u8; 32] = [
    0x5a, 0xda, 0x7e, 0x4b, 0xf6, 0xdd, 0xd9, 0xad, 0xb6, 0x62, 0x6d, 0x32, 0x13, 0x1c, 0x6b,
    0x5c, 0x51, 0xa1, 0xe3, 0x47, 0xa3, 0x47, 0x8f, 0x53, 0xcf, 0xcf, 0x44, 0x1b, 0x88, 0xee,
    0xd1, 0x2e,
];

/// Blinding point of side B, from "edwards25519 point generation seed (N)"
const N_COMPRESSED: [u8; 32] = [
    0x10, 0xe3, 0xdf, 0x0a, 0xe3, 0x7d, 0x8e, 0x7a, 0x99, 0xb5, 0xfe, 0x74, 0xb4, 0x46, 0x72,
    0x10, 0x3d, 0xbd, 0xdc, 0xbd, 0x06, 0xaf, 0x68, 0x0d, 0x71, 0x32, 0x9a, 0x11, 0x69, 0x3b,
    0xc7, 0x78,
];

/// Key agreed by both sides
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SharedSecret(Vec<u8>);

impl SharedSecret {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl std::fmt::Debug for SharedSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SharedSecret({} bytes)", self.0.len())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Side {
    A,
    B,
}

impl Side {
    fn names(self) -> (&'static [u8], &'static [u8]) {
        match self {
            Side::A => (CLIENT_IDENTITY, SERVER_IDENTITY),
            Side::B => (SERVER_IDENTITY, CLIENT_IDENTITY),
        }
    }

    fn own_blinding(self) -> &'static [u8; 32] {
        match self {
            Side::A => &M_COMPRESSED,
            Side::B => &N_COMPRESSED,
        }
    }

    fn peer_blinding(self) -> &'static [u8; 32] {
        match self {
            Side::A => &N_COMPRESSED,
            Side::B => &M_COMPRESSED,
        }
    }
}

/// M or N with the cofactor already applied
fn blinding_point(compressed: &[u8; 32]) -> Result<EdwardsPoint, PakeError> {
    CompressedEdwardsY(*compressed)
        .decompress()
        .map(|point| point.mul_by_cofactor())
        .ok_or(PakeError::KeyDerivation)
}

fn password(code: &PairingCode, channel_binding: &[u8]) -> Zeroizing<Vec<u8>> {
    let mut pw = Zeroizing::new(Vec::with_capacity(
        code.as_bytes().len() + channel_binding.len(),
    ));
    pw.extend_from_slice(code.as_bytes());
    pw.extend_from_slice(channel_binding);
    pw
}

fn check_message(inbound: &[u8]) -> Result<[u8; PAKE_MESSAGE_LEN], PakeError> {
    inbound.try_into().map_err(|_| {
        PakeError::Malformed(format!(
            "key exchange message is {} bytes (expected {})",
            inbound.len(),
            PAKE_MESSAGE_LEN
        ))
    })
}

fn random_seed() -> Result<Zeroizing<[u8; 64]>, PakeError> {
    let mut seed = Zeroizing::new([0u8; 64]);
    SystemRandom::new()
        .fill(&mut seed[..])
        .map_err(|_| PakeError::KeyDerivation)?;
    Ok(seed)
}

/// One side's state between sending its message and reading the peer's
#[derive(Zeroize, ZeroizeOnDrop)]
struct Spake2 {
    #[zeroize(skip)]
    side: Side,
    private_key: Scalar,
    /// Password hash reduced mod l and divided by the cofactor, so that
    /// multiplying it into `[8]M` gives the mask of the full hash
    password_scalar: Scalar,
    password_hash: [u8; 64],
    my_msg: [u8; PAKE_MESSAGE_LEN],
}

impl Spake2 {
    fn start(side: Side, password: &[u8], seed: &[u8; 64]) -> Result<Self, PakeError> {
        let private_key = Scalar::from_bytes_mod_order_wide(seed);
        let ephemeral = EdwardsPoint::mul_base(&(private_key * Scalar::from(8u8)));

        let mut password_hash = [0u8; 64];
        password_hash.copy_from_slice(&Sha512::digest(password));
        let password_scalar =
            Scalar::from_bytes_mod_order_wide(&password_hash) * Scalar::from(8u8).invert();

        let mask = password_scalar * blinding_point(side.own_blinding())?;
        let my_msg = (ephemeral + mask).compress().to_bytes();

        Ok(Self {
            side,
            private_key,
            password_scalar,
            password_hash,
            my_msg,
        })
    }

    fn message(&self) -> Vec<u8> {
        self.my_msg.to_vec()
    }

    fn finish(&self, their_msg: &[u8]) -> Result<SharedSecret, PakeError> {
        let their_msg = check_message(their_msg)?;

        // Points off the curve only come from a message altered in transit
        let their_point = CompressedEdwardsY(their_msg)
            .decompress()
            .ok_or(PakeError::Mismatch)?;
        let unmasked =
            their_point - self.password_scalar * blinding_point(self.side.peer_blinding())?;
        let dh = (self.private_key * unmasked.mul_by_cofactor())
            .compress()
            .to_bytes();

        let (my_name, their_name) = self.side.names();
        let mut transcript = Sha512::new();
        let mut field = |bytes: &[u8]| {
            transcript.update((bytes.len() as u64).to_le_bytes());
            transcript.update(bytes);
        };
        match self.side {
            Side::A => {
                field(my_name);
                field(their_name);
                field(&self.my_msg[..]);
                field(&their_msg[..]);
            }
            Side::B => {
                field(their_name);
                field(my_name);
                field(&their_msg[..]);
                field(&self.my_msg[..]);
            }
        }
        field(&dh[..]);
        field(&self.password_hash[..]);

        Ok(SharedSecret(transcript.finalize().to_vec()))
    }
}

/// Connecting side of the exchange
pub struct PakeInitiator {
    state: Spake2,
}

impl PakeInitiator {
    /// Start the exchange, returning the first outbound message
    pub fn initiate(
        code: &PairingCode,
        channel_binding: &[u8],
    ) -> Result<(Self, Vec<u8>), PakeError> {
        Self::with_seed(code, channel_binding, &*random_seed()?)
    }

    fn with_seed(
        code: &PairingCode,
        channel_binding: &[u8],
        seed: &[u8; 64],
    ) -> Result<(Self, Vec<u8>), PakeError> {
        let state = Spake2::start(Side::A, &password(code, channel_binding), seed)?;
        let outbound = state.message();
        Ok((Self { state }, outbound))
    }

    /// Consume the responder's message and derive the shared secret
    pub fn finish(self, inbound: &[u8]) -> Result<SharedSecret, PakeError> {
        self.state.finish(inbound)
    }
}

/// Answering side of the exchange, as run by the pairing service
pub struct PakeResponder;

impl PakeResponder {
    /// Answer the initiator's message
    ///
    /// Returns the shared secret and the message to send back.
    pub fn complete(
        inbound: &[u8],
        code: &PairingCode,
        channel_binding: &[u8],
    ) -> Result<(SharedSecret, Vec<u8>), PakeError> {
        Self::complete_with_seed(inbound, code, channel_binding, &*random_seed()?)
    }

    fn complete_with_seed(
        inbound: &[u8],
        code: &PairingCode,
        channel_binding: &[u8],
        seed: &[u8; 64],
    ) -> Result<(SharedSecret, Vec<u8>), PakeError> {
        let state = Spake2::start(Side::B, &password(code, channel_binding), seed)?;
        let secret = state.finish(inbound)?;
        Ok((secret, state.message()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BINDING: [u8; CHANNEL_BINDING_LEN] = [0x5a; CHANNEL_BINDING_LEN];

    fn code(s: &str) -> PairingCode {
        PairingCode::parse(s).unwrap()
    }

    fn exchange(client_code: &str, server_code: &str) -> (SharedSecret, SharedSecret) {
        let (initiator, msg1) = PakeInitiator::initiate(&code(client_code), &BINDING).unwrap();
        let (server_secret, msg2) =
            PakeResponder::complete(&msg1, &code(server_code), &BINDING).unwrap();
        let client_secret = initiator.finish(&msg2).unwrap();
        (client_secret, server_secret)
    }

    #[test]
    fn test_known_answer_transcript() {
        // BoringSSL spake25519 exchange with fixed random inputs and binding
        // bytes 0..64
        let binding: Vec<u8> = (0u8..64).collect();

        let (initiator, msg_a) =
            PakeInitiator::with_seed(&code("123456"), &binding, &[0x11; 64]).unwrap();
        assert_eq!(
            hex::encode(&msg_a),
            "e24a22e895375f3449ee318faf0a57b6cbdc7e2cac90354f2e988316099c6615"
        );

        let (server, msg_b) =
            PakeResponder::complete_with_seed(&msg_a, &code("123456"), &binding, &[0x22; 64])
                .unwrap();
        assert_eq!(
            hex::encode(&msg_b),
            "e972fae2cb51943c37f0f2f1ad744fa092ea8802051e338df70f70a91f1e967b"
        );

        let client = initiator.finish(&msg_b).unwrap();
        let expected = "e64b8c8a760d86d048bcf7dfa0c8140eb81948ff49524cc8eba15950cb73ff7d\
                        69a068d424db0bfa9487bb887759275f1e1bd496277b00fc204739eb1dedd9e0";
        assert_eq!(hex::encode(client.as_bytes()), expected);
        assert_eq!(hex::encode(server.as_bytes()), expected);
    }

    #[test]
    fn test_blinding_points_decode() {
        assert!(blinding_point(&M_COMPRESSED).is_ok());
        assert!(blinding_point(&N_COMPRESSED).is_ok());
    }

    #[test]
    fn test_matching_codes_agree() {
        for c in ["000000", "123456", "999999", "480213"] {
            let (client, server) = exchange(c, c);
            assert_eq!(client.as_bytes(), server.as_bytes());
            assert_eq!(client.as_bytes().len(), SHARED_SECRET_LEN);
        }
    }

    #[test]
    fn test_distinct_codes_disagree() {
        for (a, b) in [("000000", "123456"), ("123456", "123457"), ("111111", "011111")] {
            let (client, server) = exchange(a, b);
            assert_ne!(client.as_bytes(), server.as_bytes());
        }
    }

    #[test]
    fn test_channel_binding_is_part_of_password() {
        let c = code("123456");
        let (initiator, msg1) = PakeInitiator::initiate(&c, &BINDING).unwrap();
        let (server, msg2) =
            PakeResponder::complete(&msg1, &c, &[0u8; CHANNEL_BINDING_LEN]).unwrap();
        let client = initiator.finish(&msg2).unwrap();
        assert_ne!(client.as_bytes(), server.as_bytes());
    }

    #[test]
    fn test_message_length_independent_of_code() {
        for c in ["000000", "999999"] {
            let (_, msg1) = PakeInitiator::initiate(&code(c), &BINDING).unwrap();
            assert_eq!(msg1.len(), PAKE_MESSAGE_LEN);
            let (_, msg2) = PakeResponder::complete(&msg1, &code(c), &BINDING).unwrap();
            assert_eq!(msg2.len(), PAKE_MESSAGE_LEN);
        }
    }

    #[test]
    fn test_wrong_length_is_malformed() {
        let (initiator, _) = PakeInitiator::initiate(&code("123456"), &BINDING).unwrap();
        let err = initiator.finish(&[0u8; 33]).unwrap_err();
        assert!(matches!(err, PakeError::Malformed(_)));
    }

    #[test]
    fn test_off_curve_message_is_mismatch() {
        // y = 2 has no matching x on edwards25519
        let mut off_curve = [0u8; PAKE_MESSAGE_LEN];
        off_curve[0] = 2;
        let (initiator, _) = PakeInitiator::initiate(&code("123456"), &BINDING).unwrap();
        assert_eq!(initiator.finish(&off_curve).unwrap_err(), PakeError::Mismatch);
    }

    #[test]
    fn test_fresh_messages_per_attempt() {
        let (_, first) = PakeInitiator::initiate(&code("123456"), &BINDING).unwrap();
        let (_, second) = PakeInitiator::initiate(&code("123456"), &BINDING).unwrap();
        assert_ne!(first, second);
    }
}
