//! Re-randomizable ElGamal over the curve group.
//!
//! `encrypt` produces `(g^r, m · pk^r)`; `rerand` multiplies a fresh
//! `(g^s, pk^s)` into an existing ciphertext, yielding a uniformly
//! distributed ciphertext of the same plaintext. The protocol depends on
//! this malleability, so the scheme is deliberately not CCA secure.
//!
//! Vector mode carries byte strings longer than one embeddable payload:
//! PKCS#7-style padding with a 30-byte block size, one ciphertext per
//! block.

use rand::{CryptoRng, RngCore, SeedableRng};
use rand_chacha::ChaCha20Rng;
use rayon::prelude::*;
use sha2::{Digest, Sha256};

use crate::error::{CryptoError, Result};
use crate::group::{Point, Scalar, POINT_LEN};
use crate::message::{Message, PAYLOAD_SIZE};

/// Serialized ciphertext length: two compressed points.
pub const CIPHERTEXT_LEN: usize = 2 * POINT_LEN;

/// An encryption public key.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PublicKey(pub(crate) Point);

/// A decryption key, stored as the *negated* secret scalar so that
/// decryption is a single exponentiation plus one group operation.
#[derive(Clone, Copy, Debug)]
pub struct SecretKey(pub(crate) Scalar);

/// An ElGamal ciphertext `(c0, c1) = (g^r, m · pk^r)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Ciphertext {
    c0: Point,
    c1: Point,
}

/// The receiver's public material: `bpk` blinds identifiers for the
/// OPRF, `epk` encrypts values.
#[derive(Clone, Copy, Debug)]
pub struct PublicKeyTuple {
    pub bpk: PublicKey,
    pub epk: PublicKey,
}

/// The receiver's secret material, matching [`PublicKeyTuple`].
#[derive(Clone, Copy, Debug)]
pub struct SecretKeyTuple {
    pub bsk: SecretKey,
    pub esk: SecretKey,
}

impl PublicKey {
    pub fn as_point(&self) -> &Point {
        &self.0
    }

    pub fn serialize(&self) -> Result<[u8; POINT_LEN]> {
        self.0.serialize()
    }

    pub fn deserialize(data: &[u8]) -> Result<PublicKey> {
        Point::deserialize(data).map(PublicKey)
    }
}

impl Ciphertext {
    pub fn new(c0: Point, c1: Point) -> Ciphertext {
        Ciphertext { c0, c1 }
    }

    pub fn c0(&self) -> &Point {
        &self.c0
    }

    pub fn c1(&self) -> &Point {
        &self.c1
    }

    /// Multiplies a point into the `c1` component, shifting the encrypted
    /// plaintext by that factor.
    pub fn mul_c1(&self, point: &Point) -> Ciphertext {
        Ciphertext {
            c0: self.c0,
            c1: self.c1.mul(point),
        }
    }

    /// 66-byte encoding: `c0 || c1`, both compressed.
    pub fn serialize(&self) -> Result<[u8; CIPHERTEXT_LEN]> {
        let mut out = [0u8; CIPHERTEXT_LEN];
        out[..POINT_LEN].copy_from_slice(&self.c0.serialize()?);
        out[POINT_LEN..].copy_from_slice(&self.c1.serialize()?);
        Ok(out)
    }

    pub fn deserialize(data: &[u8]) -> Result<Ciphertext> {
        if data.len() != CIPHERTEXT_LEN {
            return Err(CryptoError::InvalidLength {
                expected: CIPHERTEXT_LEN,
                got: data.len(),
            });
        }
        Ok(Ciphertext {
            c0: Point::deserialize(&data[..POINT_LEN])?,
            c1: Point::deserialize(&data[POINT_LEN..])?,
        })
    }
}

/// Serializes a ciphertext sequence back to back.
pub fn serialize_vector(cts: &[Ciphertext]) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(cts.len() * CIPHERTEXT_LEN);
    for ct in cts {
        out.extend_from_slice(&ct.serialize()?);
    }
    Ok(out)
}

/// Parses a back-to-back ciphertext sequence; the length must be a
/// multiple of [`CIPHERTEXT_LEN`].
pub fn deserialize_vector(data: &[u8]) -> Result<Vec<Ciphertext>> {
    if data.len() % CIPHERTEXT_LEN != 0 {
        return Err(CryptoError::InvalidLength {
            expected: CIPHERTEXT_LEN,
            got: data.len(),
        });
    }
    data.chunks_exact(CIPHERTEXT_LEN)
        .map(Ciphertext::deserialize)
        .collect()
}

/// Generates a key pair with a caller-provided CSPRNG. The returned
/// secret key holds the negated scalar.
pub fn keygen_from_rng<R: RngCore + CryptoRng>(rng: &mut R) -> (SecretKey, PublicKey) {
    let sk = Scalar::random(rng);
    let pk = Point::base_exp(&sk);
    (SecretKey(sk.neg()), PublicKey(pk))
}

/// Generates a key pair from the thread-local CSPRNG.
pub fn keygen() -> (SecretKey, PublicKey) {
    keygen_from_rng(&mut rand::thread_rng())
}

pub fn encrypt(pk: &PublicKey, msg: &Message) -> Ciphertext {
    let r = Scalar::random(&mut rand::thread_rng());
    Ciphertext {
        c0: Point::base_exp(&r),
        c1: msg.as_point().mul(&pk.0.exp(&r)),
    }
}

pub fn decrypt(sk: &SecretKey, ct: &Ciphertext) -> Message {
    // sk holds -x, so c0^sk * c1 = m * pk^r * g^{-xr} = m.
    Message::from_point(ct.c1.mul(&ct.c0.exp(&sk.0)))
}

/// Re-randomizes a ciphertext under `pk`, preserving the plaintext.
pub fn rerand(pk: &PublicKey, ct: &Ciphertext) -> Ciphertext {
    let s = Scalar::random(&mut rand::thread_rng());
    Ciphertext {
        c0: ct.c0.mul(&Point::base_exp(&s)),
        c1: ct.c1.mul(&pk.0.exp(&s)),
    }
}

pub fn rerand_vector(pk: &PublicKey, cts: &[Ciphertext]) -> Vec<Ciphertext> {
    cts.iter().map(|ct| rerand(pk, ct)).collect()
}

/// Encrypts a byte string block-wise: PKCS#7 padding to 30-byte blocks,
/// one ciphertext per block.
pub fn encrypt_vector(pk: &PublicKey, bytes: &[u8]) -> Result<Vec<Ciphertext>> {
    let padded = pad(bytes, PAYLOAD_SIZE);
    padded
        .chunks_exact(PAYLOAD_SIZE)
        .map(|chunk| Message::from_payload(chunk).map(|msg| encrypt(pk, &msg)))
        .collect()
}

/// Decrypts a block-wise ciphertext sequence and strips the padding.
/// Blocks decrypt in parallel; the padding check is strict.
pub fn decrypt_vector(sk: &SecretKey, cts: &[Ciphertext]) -> Result<Vec<u8>> {
    let blocks: Vec<Vec<u8>> = cts
        .par_iter()
        .map(|ct| decrypt(sk, ct).payload())
        .collect::<Result<_>>()?;
    let joined: Vec<u8> = blocks.concat();
    unpad(&joined)
}

/// Deterministic key tuples from a seed. Stands in for the out-of-band
/// key distribution channel in tests and the development binaries; real
/// deployments generate tuples with [`keygen`] and distribute them.
pub fn keys_from_seed(seed: &[u8]) -> (SecretKeyTuple, PublicKeyTuple) {
    let digest: [u8; 32] = Sha256::digest(seed).into();
    let mut rng = ChaCha20Rng::from_seed(digest);
    let (esk, epk) = keygen_from_rng(&mut rng);
    let (bsk, bpk) = keygen_from_rng(&mut rng);
    (
        SecretKeyTuple { bsk, esk },
        PublicKeyTuple { bpk, epk },
    )
}

/// Pads to the next multiple of `block`; an aligned input gains a full
/// pad block so the padding is always removable.
fn pad(data: &[u8], block: usize) -> Vec<u8> {
    let mut padding = block - data.len() % block;
    if padding == 0 {
        padding = block;
    }
    let mut out = Vec::with_capacity(data.len() + padding);
    out.extend_from_slice(data);
    out.resize(data.len() + padding, padding as u8);
    out
}

fn unpad(data: &[u8]) -> Result<Vec<u8>> {
    let padding = *data.last().ok_or(CryptoError::BadPadding)? as usize;
    if padding == 0 || padding > data.len() {
        return Err(CryptoError::BadPadding);
    }
    let (rest, tail) = data.split_at(data.len() - padding);
    if tail.iter().any(|&b| b as usize != padding) {
        return Err(CryptoError::BadPadding);
    }
    Ok(rest.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::thread_rng;

    #[test]
    fn encrypt_decrypt_roundtrip() {
        let (sk, pk) = keygen();
        let msg = Message::from_payload(b"attribute value").unwrap();
        assert_eq!(decrypt(&sk, &encrypt(&pk, &msg)), msg);
    }

    #[test]
    fn rerand_preserves_plaintext_and_changes_ciphertext() {
        let (sk, pk) = keygen();
        let msg = Message::random(&mut thread_rng());
        let ct = encrypt(&pk, &msg);
        let rr = rerand(&pk, &ct);
        assert_ne!(rr, ct);
        assert_eq!(decrypt(&sk, &rr), msg);
    }

    #[test]
    fn vector_roundtrip_various_lengths() {
        let (sk, pk) = keygen();
        for len in [1usize, 7, 29, 30, 31, 60, 61, 100] {
            let bytes: Vec<u8> = (0..len as u32).map(|i| (i * 7 + 1) as u8).collect();
            let cts = encrypt_vector(&pk, &bytes).unwrap();
            assert_eq!(cts.len(), len / 30 + 1);
            assert_eq!(decrypt_vector(&sk, &cts).unwrap(), bytes, "length {len}");
        }
    }

    #[test]
    fn vector_roundtrip_empty_input() {
        // An empty value still produces one full pad block.
        let (sk, pk) = keygen();
        let cts = encrypt_vector(&pk, b"").unwrap();
        assert_eq!(cts.len(), 1);
        assert_eq!(decrypt_vector(&sk, &cts).unwrap(), b"");
    }

    #[test]
    fn wrong_key_never_recovers_the_value() {
        // Decrypting under the wrong key scrambles the pad bytes; almost
        // always this fails the strict padding check, and when the tail
        // accidentally parses the bytes still differ.
        let (_, pk) = keygen();
        let (other_sk, _) = keygen();
        let cts = encrypt_vector(&pk, b"payload").unwrap();
        match decrypt_vector(&other_sk, &cts) {
            Ok(bytes) => assert_ne!(bytes, b"payload"),
            Err(_) => {}
        }
    }

    #[test]
    fn unpad_rejects_malformed_tails() {
        assert_eq!(unpad(&[]), Err(CryptoError::BadPadding));
        assert_eq!(unpad(&[0x00]), Err(CryptoError::BadPadding));
        assert_eq!(unpad(&[0x05]), Err(CryptoError::BadPadding));
        assert_eq!(unpad(&[1, 2, 3, 2, 3]), Err(CryptoError::BadPadding));
        assert_eq!(unpad(&[1, 2, 2]).unwrap(), vec![1]);
    }

    #[test]
    fn ciphertext_serialization_roundtrip() {
        let (_, pk) = keygen();
        let ct = encrypt(&pk, &Message::random(&mut thread_rng()));
        let bytes = ct.serialize().unwrap();
        assert_eq!(bytes.len(), CIPHERTEXT_LEN);
        assert_eq!(Ciphertext::deserialize(&bytes).unwrap(), ct);
    }

    #[test]
    fn ciphertext_deserialize_rejects_wrong_length() {
        assert!(matches!(
            Ciphertext::deserialize(&[0u8; CIPHERTEXT_LEN - 1]),
            Err(CryptoError::InvalidLength { .. })
        ));
    }

    #[test]
    fn vector_serialization_roundtrip() {
        let (_, pk) = keygen();
        let cts = encrypt_vector(&pk, &[0x42u8; 75]).unwrap();
        let bytes = serialize_vector(&cts).unwrap();
        assert_eq!(deserialize_vector(&bytes).unwrap(), cts);
        assert!(matches!(
            deserialize_vector(&bytes[..bytes.len() - 1]),
            Err(CryptoError::InvalidLength { .. })
        ));
    }

    #[test]
    fn seeded_keys_are_deterministic() {
        let (ska, pka) = keys_from_seed(b"session-seed");
        let (skb, pkb) = keys_from_seed(b"session-seed");
        let (_, pkc) = keys_from_seed(b"other-seed");
        assert_eq!(pka.bpk, pkb.bpk);
        assert_eq!(pka.epk, pkb.epk);
        assert_ne!(pka.epk, pkc.epk);
        // Both tuples decrypt what the shared public keys encrypt.
        let msg = Message::from_payload(b"check").unwrap();
        assert_eq!(decrypt(&ska.esk, &encrypt(&pkb.epk, &msg)), msg);
        assert_eq!(decrypt(&skb.bsk, &encrypt(&pka.bpk, &msg)), msg);
    }
}
