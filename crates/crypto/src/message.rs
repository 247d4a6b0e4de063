//! Embedding short byte payloads as curve points.
//!
//! A payload of up to 30 bytes becomes the middle of a candidate
//! x-coordinate `0x04 || payload || 0x02`; the candidate is incremented
//! until the x-coordinate lands on the curve (the suffix byte leaves room
//! for up to 255 trials, each succeeding with probability ~1/2). Recovery
//! strips the one-byte prefix and suffix from the x-coordinate, so any
//! group element can be read back as bytes — OPRF outputs are read this
//! way even though they were never embedded.

use p256::elliptic_curve::sec1::FromEncodedPoint;
use p256::{AffinePoint, EncodedPoint, ProjectivePoint};
use rand::{CryptoRng, RngCore};

use crate::error::{CryptoError, Result};
use crate::group::{Point, POINT_LEN};

/// Maximum payload length embeddable in a single point: 32 bytes of
/// field element minus the prefix and the trial-counter suffix.
pub const PAYLOAD_SIZE: usize = 30;

const X_LEN: usize = 32;
const MSG_PREFIX: u8 = 0x04;
const MSG_SUFFIX: u8 = 0x02;
const MAX_EMBED_TRIALS: usize = 255;

/// A curve point carrying (or interpreted as carrying) a byte payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Message(pub(crate) Point);

impl Message {
    /// Embeds `payload` as a curve point. Payloads of 1..=30 bytes
    /// round-trip through [`Message::payload`]; longer payloads still
    /// embed but lose their high bytes to the field width, so they can
    /// never be recovered intact.
    pub fn from_payload(payload: &[u8]) -> Result<Message> {
        if payload.is_empty() {
            return Err(CryptoError::EmptyPayload);
        }

        let mut framed = Vec::with_capacity(payload.len() + 2);
        framed.push(MSG_PREFIX);
        framed.extend_from_slice(payload);
        framed.push(MSG_SUFFIX);

        let mut x = [0u8; X_LEN];
        if framed.len() >= X_LEN {
            x.copy_from_slice(&framed[framed.len() - X_LEN..]);
        } else {
            x[X_LEN - framed.len()..].copy_from_slice(&framed);
        }

        // SEC1 compressed candidate; decompression succeeds iff the cubic
        // has a square root at this x.
        let mut candidate = [0u8; POINT_LEN];
        candidate[0] = 0x02;
        for _ in 0..MAX_EMBED_TRIALS {
            candidate[1..].copy_from_slice(&x);
            if let Ok(encoded) = EncodedPoint::from_bytes(candidate.as_slice()) {
                let decoded: Option<AffinePoint> =
                    AffinePoint::from_encoded_point(&encoded).into();
                if let Some(affine) = decoded {
                    return Ok(Message(Point(ProjectivePoint::from(affine))));
                }
            }
            increment(&mut x);
        }
        Err(CryptoError::Unencodable(MAX_EMBED_TRIALS))
    }

    /// Wraps an arbitrary group element.
    pub fn from_point(point: Point) -> Message {
        Message(point)
    }

    /// Uniformly random message point.
    pub fn random<R: RngCore + CryptoRng>(rng: &mut R) -> Message {
        Message(Point::random(rng))
    }

    /// Hashes `msg` to a message point under the session's domain tag.
    pub fn hash(msg: &[u8], sid: &[u8]) -> Result<Message> {
        Point::hash_to_curve(msg, sid).map(Message)
    }

    pub fn as_point(&self) -> &Point {
        &self.0
    }

    pub fn into_point(self) -> Point {
        self.0
    }

    /// Recovers the payload bytes: the significant bytes of the
    /// x-coordinate with the prefix and suffix stripped.
    pub fn payload(&self) -> Result<Vec<u8>> {
        let encoded = self.0.serialize()?;
        let x = &encoded[1..];
        let start = x.iter().position(|&b| b != 0).unwrap_or(x.len());
        let significant = &x[start..];
        if significant.len() < 3 {
            return Err(CryptoError::NotAMessage);
        }
        Ok(significant[1..significant.len() - 1].to_vec())
    }
}

/// Big-endian increment with carry; wraps at 2^256, which no trial
/// sequence ever reaches.
fn increment(x: &mut [u8; X_LEN]) {
    for byte in x.iter_mut().rev() {
        let (value, carry) = byte.overflowing_add(1);
        *byte = value;
        if !carry {
            break;
        }
    }
}
