//! Prime-order group arithmetic over NIST P-256.
//!
//! Thin wrappers around the `p256` arithmetic backend, written in
//! multiplicative notation: the group law is `mul`, exponentiation is
//! scalar multiplication, inversion is point negation. Serialization is
//! the 33-byte canonical SEC1 compressed encoding.

use p256::elliptic_curve::hash2curve::{ExpandMsgXmd, GroupDigest};
use p256::elliptic_curve::sec1::{FromEncodedPoint, ToEncodedPoint};
use p256::elliptic_curve::Field;
use p256::{AffinePoint, EncodedPoint, NistP256, ProjectivePoint};
use rand::{CryptoRng, RngCore};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::error::{CryptoError, Result};

/// Length of a compressed point encoding in bytes.
pub const POINT_LEN: usize = 33;

/// Domain-separation prefix for hash-to-curve; the session id is appended.
const HASH_TO_ELEMENT_PREFIX: &[u8] = b"hash_to_element";

/// An element of the curve's scalar field.
#[derive(Clone, Copy, Debug)]
pub struct Scalar(pub(crate) p256::Scalar);

impl Scalar {
    pub fn zero() -> Self {
        Scalar(p256::Scalar::ZERO)
    }

    /// Uniformly random scalar from the given CSPRNG.
    pub fn random<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        Scalar(p256::Scalar::random(rng))
    }

    pub fn from_u64(value: u64) -> Self {
        Scalar(p256::Scalar::from(value))
    }

    pub fn add(&self, other: &Scalar) -> Scalar {
        Scalar(self.0 + other.0)
    }

    pub fn mul(&self, other: &Scalar) -> Scalar {
        Scalar(self.0 * other.0)
    }

    pub fn neg(&self) -> Scalar {
        Scalar(-self.0)
    }

    /// Multiplicative inverse; fails on zero.
    pub fn invert(&self) -> Result<Scalar> {
        Option::<p256::Scalar>::from(self.0.invert())
            .map(Scalar)
            .ok_or(CryptoError::NonInvertibleScalar)
    }
}

impl PartialEq for Scalar {
    fn eq(&self, other: &Self) -> bool {
        self.0.ct_eq(&other.0).into()
    }
}

impl Eq for Scalar {}

/// An element of the prime-order subgroup, written multiplicatively.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Point(pub(crate) ProjectivePoint);

impl Point {
    pub fn generator() -> Self {
        Point(ProjectivePoint::GENERATOR)
    }

    pub fn identity() -> Self {
        Point(ProjectivePoint::IDENTITY)
    }

    /// Uniformly random group element, sampled as `g^r` for random `r`.
    pub fn random<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        Self::base_exp(&Scalar::random(rng))
    }

    /// Exponentiates the fixed generator.
    pub fn base_exp(s: &Scalar) -> Self {
        Point(ProjectivePoint::GENERATOR * s.0)
    }

    /// The group law.
    pub fn mul(&self, other: &Point) -> Point {
        Point(self.0 + other.0)
    }

    /// The inverse element.
    pub fn invert(&self) -> Point {
        Point(-self.0)
    }

    /// Exponentiation by a scalar.
    pub fn exp(&self, s: &Scalar) -> Point {
        Point(self.0 * s.0)
    }

    /// Hash-to-curve with domain separation `"hash_to_element" || sid`.
    ///
    /// Uses the P256_XMD:SHA-256_SSWU_RO_ suite, so the output is uniform
    /// in the group and its discrete log is unknown.
    pub fn hash_to_curve(msg: &[u8], sid: &[u8]) -> Result<Point> {
        let mut dst = Vec::with_capacity(HASH_TO_ELEMENT_PREFIX.len() + sid.len());
        dst.extend_from_slice(HASH_TO_ELEMENT_PREFIX);
        dst.extend_from_slice(sid);
        NistP256::hash_from_bytes::<ExpandMsgXmd<Sha256>>(&[msg], &[dst.as_slice()])
            .map(Point)
            .map_err(|_| CryptoError::HashToCurve)
    }

    /// Canonical compressed encoding. The identity has no 33-byte SEC1
    /// form and is rejected; it never occurs in the protocol.
    pub fn serialize(&self) -> Result<[u8; POINT_LEN]> {
        let encoded = self.0.to_affine().to_encoded_point(true);
        let bytes = encoded.as_bytes();
        if bytes.len() != POINT_LEN {
            return Err(CryptoError::IdentityPoint);
        }
        let mut out = [0u8; POINT_LEN];
        out.copy_from_slice(bytes);
        Ok(out)
    }

    pub fn deserialize(data: &[u8]) -> Result<Point> {
        if data.len() != POINT_LEN {
            return Err(CryptoError::InvalidLength {
                expected: POINT_LEN,
                got: data.len(),
            });
        }
        let encoded = EncodedPoint::from_bytes(data).map_err(|_| CryptoError::InvalidPoint)?;
        Option::<AffinePoint>::from(AffinePoint::from_encoded_point(&encoded))
            .map(|affine| Point(ProjectivePoint::from(affine)))
            .ok_or(CryptoError::InvalidPoint)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::thread_rng;

    #[test]
    fn scalar_add_neg_cancels() {
        let mut rng = thread_rng();
        let a = Scalar::random(&mut rng);
        assert_eq!(a.add(&a.neg()), Scalar::zero());
    }

    #[test]
    fn scalar_invert_roundtrip() {
        let mut rng = thread_rng();
        let a = Scalar::random(&mut rng);
        let inv = a.invert().unwrap();
        assert_eq!(a.mul(&inv), Scalar::from_u64(1));
    }

    #[test]
    fn zero_scalar_has_no_inverse() {
        assert_eq!(
            Scalar::zero().invert(),
            Err(CryptoError::NonInvertibleScalar)
        );
    }

    #[test]
    fn exponent_laws_hold() {
        let mut rng = thread_rng();
        let a = Scalar::random(&mut rng);
        let b = Scalar::random(&mut rng);
        // g^a * g^b == g^(a+b)
        let lhs = Point::base_exp(&a).mul(&Point::base_exp(&b));
        let rhs = Point::base_exp(&a.add(&b));
        assert_eq!(lhs, rhs);
        // (g^a)^b == g^(ab)
        assert_eq!(Point::base_exp(&a).exp(&b), Point::base_exp(&a.mul(&b)));
    }

    #[test]
    fn point_invert_cancels() {
        let mut rng = thread_rng();
        let p = Point::random(&mut rng);
        assert_eq!(p.mul(&p.invert()), Point::identity());
    }

    #[test]
    fn serialization_roundtrip() {
        let mut rng = thread_rng();
        let p = Point::random(&mut rng);
        let bytes = p.serialize().unwrap();
        assert_eq!(Point::deserialize(&bytes).unwrap(), p);
    }

    #[test]
    fn deserialize_rejects_wrong_length() {
        assert!(matches!(
            Point::deserialize(&[0u8; 32]),
            Err(CryptoError::InvalidLength { .. })
        ));
    }

    #[test]
    fn deserialize_rejects_non_curve_x() {
        // An x-coordinate off the curve fails decompression.
        let mut bytes = Point::generator().serialize().unwrap();
        bytes[POINT_LEN - 1] ^= 0xFF;
        // Either the tweaked x is off-curve or it decodes to a different
        // point; it must never decode back to the generator.
        match Point::deserialize(&bytes) {
            Ok(p) => assert_ne!(p, Point::generator()),
            Err(e) => assert_eq!(e, CryptoError::InvalidPoint),
        }
    }

    #[test]
    fn identity_does_not_serialize() {
        assert_eq!(
            Point::identity().serialize(),
            Err(CryptoError::IdentityPoint)
        );
    }

    #[test]
    fn hash_to_curve_is_deterministic_and_domain_separated() {
        let a = Point::hash_to_curve(b"uid-1", b"sid-a").unwrap();
        let b = Point::hash_to_curve(b"uid-1", b"sid-a").unwrap();
        let c = Point::hash_to_curve(b"uid-1", b"sid-b").unwrap();
        let d = Point::hash_to_curve(b"uid-2", b"sid-a").unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, d);
    }
}
