//! EdDSA over BabyJubJub with a Poseidon challenge.
//!
//! Points live on the twisted Edwards curve embedded in the BN254 scalar
//! field, so keys, messages and signatures are all field elements a circuit
//! can check without foreign arithmetic.

use alloy::primitives::B256;
use ark_ec::{
    AffineRepr,
    CurveGroup,
};
use ark_ed_on_bn254::{
    EdwardsAffine,
    Fr as Scalar,
};
use ark_ff::{
    BigInteger,
    PrimeField,
};
use blake2::{
    Blake2b512,
    Digest,
};

use super::poseidon::{
    b256_to_fr,
    fr_to_b256,
    poseidon_array,
};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EddsaError {
    #[error("point ({x}, {y}) is not on the curve")]
    NotOnCurve { x: B256, y: B256 },
    #[error("point ({x}, {y}) is outside the prime-order subgroup")]
    NotInSubgroup { x: B256, y: B256 },
    #[error("signature scalar {0} is not reduced")]
    NonCanonicalScalar(B256),
}

/// Affine point given by its two coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Point {
    pub x: B256,
    pub y: B256,
}

impl Point {
    fn from_affine(point: EdwardsAffine) -> Self {
        Self {
            x: fr_to_b256(point.x),
            y: fr_to_b256(point.y),
        }
    }

    fn to_affine(self) -> Result<EdwardsAffine, EddsaError> {
        let point = EdwardsAffine::new_unchecked(b256_to_fr(self.x), b256_to_fr(self.y));
        if fr_to_b256(point.x) != self.x
            || fr_to_b256(point.y) != self.y
            || !point.is_on_curve()
        {
            return Err(EddsaError::NotOnCurve {
                x: self.x,
                y: self.y,
            });
        }
        if !point.is_in_correct_subgroup_assuming_on_curve() {
            return Err(EddsaError::NotInSubgroup {
                x: self.x,
                y: self.y,
            });
        }
        Ok(point)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Signature {
    pub r: Point,
    pub s: B256,
}

/// Verification key. Holds no secret material.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VerifyingKey(Point);

impl VerifyingKey {
    /// Validates that the coordinates describe a subgroup point.
    pub fn from_point(point: Point) -> Result<Self, EddsaError> {
        point.to_affine()?;
        Ok(Self(point))
    }

    pub fn point(&self) -> Point {
        self.0
    }

    /// Checks `S·G == R + H(R, A, m)·A`.
    pub fn verify(&self, message: B256, signature: &Signature) -> bool {
        self.try_verify(message, signature).unwrap_or(false)
    }

    fn try_verify(&self, message: B256, signature: &Signature) -> Result<bool, EddsaError> {
        let public = self.0.to_affine()?;
        let r = signature.r.to_affine()?;
        let s = canonical_scalar(signature.s)?;
        let challenge = challenge(&signature.r, &self.0, message);

        let lhs = EdwardsAffine::generator() * s;
        let rhs = r.into_group() + public * challenge;
        Ok(lhs == rhs)
    }
}

/// Signing key derived from 32 secret bytes.
///
/// blake2b512(secret) splits into the scalar (low half) and the nonce prefix.
#[derive(Clone, PartialEq, Eq)]
pub struct SigningKey {
    scalar: Scalar,
    prefix: [u8; 32],
    verifying: VerifyingKey,
}

impl SigningKey {
    pub fn from_secret(secret: &[u8; 32]) -> Self {
        let digest = Blake2b512::digest(secret);
        let scalar = Scalar::from_le_bytes_mod_order(&digest[..32]);
        let mut prefix = [0u8; 32];
        prefix.copy_from_slice(&digest[32..]);
        let public = (EdwardsAffine::generator() * scalar).into_affine();
        Self {
            scalar,
            prefix,
            verifying: VerifyingKey(Point::from_affine(public)),
        }
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        self.verifying
    }

    /// Deterministic: the nonce is hashed from the prefix and the message.
    pub fn sign(&self, message: B256) -> Signature {
        let mut hasher = Blake2b512::new();
        hasher.update(self.prefix);
        hasher.update(message);
        let nonce = Scalar::from_le_bytes_mod_order(&hasher.finalize());

        let r = Point::from_affine((EdwardsAffine::generator() * nonce).into_affine());
        let challenge = challenge(&r, &self.verifying.0, message);
        let s = nonce + challenge * self.scalar;
        Signature {
            r,
            s: scalar_to_b256(s),
        }
    }
}

impl std::fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningKey")
            .field("verifying", &self.verifying)
            .finish_non_exhaustive()
    }
}

/// poseidon5(R.x, R.y, A.x, A.y, m) reduced into the subgroup order.
fn challenge(r: &Point, public: &Point, message: B256) -> Scalar {
    let digest = poseidon_array([r.x, r.y, public.x, public.y, message]);
    Scalar::from_be_bytes_mod_order(digest.as_slice())
}

fn scalar_to_b256(value: Scalar) -> B256 {
    B256::left_padding_from(&value.into_bigint().to_bytes_be())
}

fn canonical_scalar(value: B256) -> Result<Scalar, EddsaError> {
    let scalar = Scalar::from_be_bytes_mod_order(value.as_slice());
    if scalar_to_b256(scalar) != value {
        return Err(EddsaError::NonCanonicalScalar(value));
    }
    Ok(scalar)
}
