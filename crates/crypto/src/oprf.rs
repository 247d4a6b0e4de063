//! DH-style OPRF expressed through the PKE.
//!
//! The blinded input is an encryption of `H(msg, sid)` under the
//! blinding public key; evaluation exponentiates both ciphertext
//! components by the key and re-randomizes, so the encrypted plaintext
//! becomes `H(msg, sid)^k` without the evaluator seeing `msg` or the
//! unblinder seeing `k`. Used as a pseudonymizer, never as a classical
//! OPRF query.

use rand::{CryptoRng, RngCore};

use crate::error::Result;
use crate::group::Scalar;
use crate::message::Message;
use crate::pke::{self, Ciphertext, PublicKey, SecretKey};

/// An OPRF evaluation key.
#[derive(Clone, Copy, Debug)]
pub struct OprfKey(pub(crate) Scalar);

impl OprfKey {
    /// Fresh random key from the thread-local CSPRNG.
    pub fn generate() -> OprfKey {
        OprfKey(Scalar::random(&mut rand::thread_rng()))
    }

    pub fn generate_from_rng<R: RngCore + CryptoRng>(rng: &mut R) -> OprfKey {
        OprfKey(Scalar::random(rng))
    }

    /// Wraps an existing scalar, e.g. a sum of key shares.
    pub fn from_scalar(scalar: Scalar) -> OprfKey {
        OprfKey(scalar)
    }

    pub fn as_scalar(&self) -> &Scalar {
        &self.0
    }
}

/// Blinds `msg` for evaluation: an encryption of `H(msg, sid)` under
/// `bpk`.
pub fn blind(bpk: &PublicKey, msg: &[u8], sid: &[u8]) -> Result<Ciphertext> {
    let hashed = Message::hash(msg, sid)?;
    Ok(pke::encrypt(bpk, &hashed))
}

/// Evaluates the PRF under `key` on a blinded input. Re-randomizes
/// internally so repeated evaluations are unlinkable.
pub fn eval(key: &OprfKey, bpk: &PublicKey, ct: &Ciphertext) -> Ciphertext {
    let raised = Ciphertext::new(ct.c0().exp(&key.0), ct.c1().exp(&key.0));
    pke::rerand(bpk, &raised)
}

/// Unblinds an evaluated input, recovering `H(msg, sid)^k`.
pub fn unblind(bsk: &SecretKey, ct: &Ciphertext) -> Message {
    pke::decrypt(bsk, ct)
}
