//! Cryptographic primitives for the multi-party private join protocol.
//!
//! Everything here is built on a prime-order elliptic-curve group (NIST
//! P-256) with multiplicative notation: an additively re-randomizable
//! ElGamal-style PKE, a byte-payload-to-curve-point encoding, a DH-style
//! OPRF expressed through the PKE, an AES-CTR symmetric layer keyed from
//! curve points via HKDF, and session-id derivation.

mod error;
pub mod group;
pub mod message;
pub mod oprf;
pub mod pke;
pub mod session;
pub mod symmetric;

pub use error::{CryptoError, Result};
pub use group::{Point, Scalar, POINT_LEN};
pub use message::{Message, PAYLOAD_SIZE};
pub use oprf::OprfKey;
pub use pke::{
    Ciphertext, PublicKey, PublicKeyTuple, SecretKey, SecretKeyTuple, CIPHERTEXT_LEN,
};
pub use session::{new_session_id, SESSION_ID_LEN};
pub use symmetric::{SymmetricKey, KEY_SIZE};
