//! Symmetric layer: AES-128-CTR keyed from curve points.
//!
//! The nonce is a constant zero block. That is safe only because every
//! key is derived from a fresh uniformly random point and used exactly
//! once; the HKDF salt binds keys to the session.

use aes::cipher::{KeyIvInit, StreamCipher};
use aes::Aes128;
use hkdf::Hkdf;
use rand::{CryptoRng, RngCore};
use sha2::Sha256;

use crate::error::{CryptoError, Result};
use crate::group::Point;

/// Symmetric key length in bytes (AES-128).
pub const KEY_SIZE: usize = 16;

pub type SymmetricKey = [u8; KEY_SIZE];

type Aes128Ctr = ctr::Ctr128BE<Aes128>;

const ZERO_NONCE: [u8; 16] = [0u8; 16];
const KDF_INFO: &[u8] = b"ephemeral associated data val key";

/// Derives a one-time key from a point: HKDF-SHA256 with the compressed
/// point as input keying material and the session id as salt.
pub fn key_from_point(point: &Point, sid: &[u8]) -> Result<SymmetricKey> {
    let compressed = point.serialize()?;
    let hk = Hkdf::<Sha256>::new(Some(sid), &compressed);
    let mut key = [0u8; KEY_SIZE];
    hk.expand(KDF_INFO, &mut key)
        .map_err(|_| CryptoError::KeyDerivation)?;
    Ok(key)
}

/// Samples a fresh uniform point and derives its one-time key.
pub fn random_key_from_point<R: RngCore + CryptoRng>(
    rng: &mut R,
    sid: &[u8],
) -> Result<(Point, SymmetricKey)> {
    let point = Point::random(rng);
    let key = key_from_point(&point, sid)?;
    Ok((point, key))
}

fn ctr_keystream(key: &SymmetricKey, data: &[u8]) -> Vec<u8> {
    let mut cipher = Aes128Ctr::new(key.into(), &ZERO_NONCE.into());
    let mut buf = data.to_vec();
    cipher.apply_keystream(&mut buf);
    buf
}

/// Encrypts under a one-time key.
pub fn encrypt(key: &SymmetricKey, plaintext: &[u8]) -> Vec<u8> {
    ctr_keystream(key, plaintext)
}

/// Decrypts; CTR mode makes this identical to encryption.
pub fn decrypt(key: &SymmetricKey, ciphertext: &[u8]) -> Vec<u8> {
    ctr_keystream(key, ciphertext)
}
