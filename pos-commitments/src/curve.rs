//! Curve parameters and point/scalar wire encoding for the commitment group.
//!
//! The deployment group is NIST P-256 with the standard base point `g` and a
//! second generator `h` derived from `g` by domain-separated hash-to-curve
//! (RFC 9380, P256_XMD:SHA-256_SSWU_RO_). Deriving `h` this way ensures no
//! party knows the discrete log relating `g` and `h`, which the hiding
//! property of the commitment depends on.
//!
//! Points travel as SEC1-compressed hex, scalars as canonical 32-byte hex.

use p256::elliptic_curve::hash2curve::{ExpandMsgXmd, GroupDigest};
use p256::elliptic_curve::ops::Reduce;
use p256::elliptic_curve::sec1::{FromEncodedPoint, ToEncodedPoint};
use p256::elliptic_curve::PrimeField;
use p256::{AffinePoint, EncodedPoint, FieldBytes, NistP256, ProjectivePoint, Scalar, U256};
use sha2::Sha256;
use std::fmt;

use crate::error::{PosError, Result};

/// Named curve fixed for the deployment.
pub const CURVE_NAME: &str = "P-256";

/// Domain separation tag for deriving the second generator.
const H_GENERATOR_DST: &[u8] = b"CUSTOS-POS-H-GENERATOR-V1";

/// The shared commitment group: curve name plus the two generators.
///
/// Fixed per deployment and shared by all commitments. The verifying party
/// owns the canonical instance; providers receive the hex form in every
/// store/challenge request and must echo commitments in the same group.
#[derive(Clone)]
pub struct CurveParameters {
    curve: String,
    g: ProjectivePoint,
    h: ProjectivePoint,
}

impl CurveParameters {
    /// The deployment parameters: P-256 base point and derived `h`.
    pub fn p256() -> Self {
        let g = ProjectivePoint::GENERATOR;
        Self {
            curve: CURVE_NAME.to_string(),
            h: derive_h(&g),
            g,
        }
    }

    /// Reconstruct parameters from their wire form.
    ///
    /// Rejects unknown curve names and any point that does not decode to a
    /// valid curve element.
    pub fn from_hex(curve: &str, g_hex: &str, h_hex: &str) -> Result<Self> {
        if curve != CURVE_NAME {
            return Err(PosError::UnsupportedCurve(curve.to_string()));
        }
        Ok(Self {
            curve: curve.to_string(),
            g: decode_point(g_hex)?,
            h: decode_point(h_hex)?,
        })
    }

    pub fn name(&self) -> &str {
        &self.curve
    }

    pub fn g(&self) -> &ProjectivePoint {
        &self.g
    }

    pub fn h(&self) -> &ProjectivePoint {
        &self.h
    }

    /// Base generator in wire form.
    pub fn g_hex(&self) -> String {
        encode_point(&self.g)
    }

    /// Second generator in wire form.
    pub fn h_hex(&self) -> String {
        encode_point(&self.h)
    }
}

impl fmt::Debug for CurveParameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CurveParameters")
            .field("curve", &self.curve)
            .field("g", &self.g_hex())
            .field("h", &self.h_hex())
            .finish()
    }
}

/// Derive the second generator from `g` via hash-to-curve.
fn derive_h(g: &ProjectivePoint) -> ProjectivePoint {
    let g_bytes = g.to_affine().to_encoded_point(true);
    NistP256::hash_from_bytes::<ExpandMsgXmd<Sha256>>(&[g_bytes.as_bytes()], &[H_GENERATOR_DST])
        .expect("fixed-length DST is valid")
}

/// Encode a point as SEC1-compressed hex.
pub fn encode_point(point: &ProjectivePoint) -> String {
    hex::encode(point.to_affine().to_encoded_point(true).as_bytes())
}

/// Decode a SEC1 hex point, rejecting anything not on the curve.
pub fn decode_point(hex_str: &str) -> Result<ProjectivePoint> {
    let bytes = hex::decode(hex_str)
        .map_err(|_| PosError::InvalidCommitment("point is not valid hex".to_string()))?;
    let encoded = EncodedPoint::from_bytes(&bytes)
        .map_err(|_| PosError::InvalidCommitment("malformed SEC1 point encoding".to_string()))?;
    let affine = Option::<AffinePoint>::from(AffinePoint::from_encoded_point(&encoded))
        .ok_or_else(|| PosError::InvalidCommitment("point is not on the curve".to_string()))?;
    Ok(ProjectivePoint::from(affine))
}

/// Encode a scalar as canonical 32-byte hex.
pub fn encode_scalar(scalar: &Scalar) -> String {
    hex::encode(scalar.to_repr())
}

/// Decode a canonical hex scalar, rejecting values outside the field.
pub fn decode_scalar(hex_str: &str) -> Result<Scalar> {
    let bytes = hex::decode(hex_str)
        .map_err(|_| PosError::InvalidCommitment("scalar is not valid hex".to_string()))?;
    if bytes.len() != 32 {
        return Err(PosError::InvalidCommitment(format!(
            "scalar must be 32 bytes, got {}",
            bytes.len()
        )));
    }
    let repr = FieldBytes::clone_from_slice(&bytes);
    Option::<Scalar>::from(Scalar::from_repr(repr))
        .ok_or_else(|| PosError::InvalidCommitment("scalar out of field range".to_string()))
}

/// Reduce arbitrary-length data to a field scalar: BLAKE3 digest reduced
/// modulo the group order. Fixed-width regardless of input length.
pub fn hash_to_scalar(data: &[u8]) -> Scalar {
    let digest = blake3::hash(data);
    <Scalar as Reduce<U256>>::reduce_bytes(FieldBytes::from_slice(digest.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_p256_parameters_stable() {
        let a = CurveParameters::p256();
        let b = CurveParameters::p256();
        assert_eq!(a.g_hex(), b.g_hex());
        assert_eq!(a.h_hex(), b.h_hex());
        assert_ne!(a.g_hex(), a.h_hex());
    }

    #[test]
    fn test_hex_roundtrip() {
        let params = CurveParameters::p256();
        let back = CurveParameters::from_hex(params.name(), &params.g_hex(), &params.h_hex())
            .unwrap();
        assert_eq!(back.g_hex(), params.g_hex());
        assert_eq!(back.h_hex(), params.h_hex());
    }

    #[test]
    fn test_rejects_unknown_curve() {
        let params = CurveParameters::p256();
        let err = CurveParameters::from_hex("P-384", &params.g_hex(), &params.h_hex());
        assert!(matches!(err, Err(PosError::UnsupportedCurve(_))));
    }

    #[test]
    fn test_rejects_point_off_curve() {
        // A compressed encoding with an x coordinate that has no square root
        // on the curve decodes structurally but must be rejected.
        let bad = format!("02{}", "ff".repeat(32));
        assert!(decode_point(&bad).is_err());
        assert!(decode_point("zz").is_err());
        assert!(decode_point("02abcd").is_err());
    }

    #[test]
    fn test_scalar_roundtrip_and_range() {
        let s = hash_to_scalar(b"some data");
        let back = decode_scalar(&encode_scalar(&s)).unwrap();
        assert_eq!(encode_scalar(&back), encode_scalar(&s));

        // The field modulus itself is non-canonical and must be rejected.
        let order_hex = "ffffffff00000000ffffffffffffffffbce6faada7179e84f3b9cac2fc632551";
        assert!(decode_scalar(order_hex).is_err());
        assert!(decode_scalar("abcd").is_err());
    }

    #[test]
    fn test_hash_to_scalar_deterministic() {
        assert_eq!(
            encode_scalar(&hash_to_scalar(b"chunk")),
            encode_scalar(&hash_to_scalar(b"chunk"))
        );
        assert_ne!(
            encode_scalar(&hash_to_scalar(b"chunk")),
            encode_scalar(&hash_to_scalar(b"chunk!"))
        );
    }
}
