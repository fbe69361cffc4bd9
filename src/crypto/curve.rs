//! secp256k1 Curve Arithmetic
//!
//! Scalar and point operations used by Taproot tweaking and BIP-340 signing.
//!
//! - [`SecretScalar`]: an integer in [1, n-1], zeroized on drop
//! - [`Point`]: a curve point or the identity
//! - [`XOnlyPubKey`]: 32-byte x coordinate of a point with even y
//!
//! Group operations are delegated to libsecp256k1 through the `bitcoin`
//! re-export. The [`Curve`] context is built once and passed by reference.

use crate::error::{TaprootError, TaprootResult};
use bitcoin::secp256k1::constants::{CURVE_ORDER, FIELD_SIZE};
use bitcoin::secp256k1::{
    All, Parity, PublicKey, Scalar, Secp256k1, SecretKey, XOnlyPublicKey,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use subtle::{Choice, ConstantTimeEq};
use zeroize::{Zeroize, ZeroizeOnDrop};

// MARK: - Raw 256-bit helpers

/// Subtract `b` from `a`, both big-endian. Caller guarantees a >= b.
fn sub_be(a: &[u8; 32], b: &[u8; 32]) -> [u8; 32] {
    let mut out = [0u8; 32];
    let mut borrow = 0i16;
    for i in (0..32).rev() {
        let mut diff = a[i] as i16 - b[i] as i16 - borrow;
        if diff < 0 {
            diff += 256;
            borrow = 1;
        } else {
            borrow = 0;
        }
        out[i] = diff as u8;
    }
    out
}

/// Reduce a 256-bit big-endian integer modulo the group order n.
///
/// 2^256 < 2n, so at most one subtraction is needed.
pub fn reduce_mod_order(value: [u8; 32]) -> [u8; 32] {
    if value >= CURVE_ORDER {
        sub_be(&value, &CURVE_ORDER)
    } else {
        value
    }
}

/// Whether a big-endian integer is a valid field element (< p)
pub fn is_field_element(value: &[u8; 32]) -> bool {
    *value < FIELD_SIZE
}

/// Whether a big-endian integer is below the group order n
pub fn is_below_order(value: &[u8; 32]) -> bool {
    *value < CURVE_ORDER
}

fn to_scalar(value: &[u8; 32]) -> TaprootResult<Scalar> {
    Scalar::from_be_bytes(*value)
        .map_err(|_| TaprootError::InvalidScalar("value is not below the group order".to_string()))
}

// MARK: - Secret Scalar

/// Secret scalar in [1, n-1]
///
/// Used for private keys and nonces. The bytes are wiped on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SecretScalar([u8; 32]);

impl SecretScalar {
    /// Create from 32 big-endian bytes, rejecting 0 and values >= n
    pub fn from_bytes(bytes: [u8; 32]) -> TaprootResult<Self> {
        if bool::from(bytes[..].ct_eq(&[0u8; 32][..])) {
            return Err(TaprootError::InvalidScalar("scalar is zero".to_string()));
        }
        if !is_below_order(&bytes) {
            return Err(TaprootError::InvalidScalar(
                "scalar is not below the group order".to_string(),
            ));
        }
        Ok(Self(bytes))
    }

    /// Create from slice (must be 32 bytes)
    pub fn from_slice(slice: &[u8]) -> TaprootResult<Self> {
        let bytes: [u8; 32] = slice.try_into().map_err(|_| {
            TaprootError::InvalidScalar(format!("Expected 32 bytes, got {}", slice.len()))
        })?;
        Self::from_bytes(bytes)
    }

    /// Parse from hex string
    pub fn from_hex(s: &str) -> TaprootResult<Self> {
        let mut bytes = hex::decode(s.trim())?;
        let result = Self::from_slice(&bytes);
        bytes.zeroize();
        result
    }

    /// Interpret a hash as an integer, reduce it mod n and reject zero
    pub fn from_hash_reduced(hash: [u8; 32]) -> TaprootResult<Self> {
        Self::from_bytes(reduce_mod_order(hash))
    }

    /// Big-endian bytes of the scalar
    pub fn secret_bytes(&self) -> [u8; 32] {
        self.0
    }

    fn to_secret_key(&self) -> TaprootResult<SecretKey> {
        SecretKey::from_slice(&self.0).map_err(|e| TaprootError::InvalidScalar(e.to_string()))
    }

    fn from_secret_key(key: SecretKey) -> Self {
        Self(key.secret_bytes())
    }

    /// n - self
    pub fn negate(&self) -> TaprootResult<Self> {
        Ok(Self::from_secret_key(self.to_secret_key()?.negate()))
    }

    /// (self + other) mod n, where `other` is any value below n
    pub fn add(&self, other: &[u8; 32]) -> TaprootResult<Self> {
        let sum = self
            .to_secret_key()?
            .add_tweak(&to_scalar(other)?)
            .map_err(|_| TaprootError::InvalidScalar("sum is zero".to_string()))?;
        Ok(Self::from_secret_key(sum))
    }

    /// (self * other) mod n, where `other` is in [1, n-1]
    pub fn mul(&self, other: &[u8; 32]) -> TaprootResult<Self> {
        let product = self
            .to_secret_key()?
            .mul_tweak(&to_scalar(other)?)
            .map_err(|_| TaprootError::InvalidScalar("factor is zero".to_string()))?;
        Ok(Self::from_secret_key(product))
    }
}

impl ConstantTimeEq for SecretScalar {
    fn ct_eq(&self, other: &Self) -> Choice {
        self.0[..].ct_eq(&other.0[..])
    }
}

impl PartialEq for SecretScalar {
    fn eq(&self, other: &Self) -> bool {
        self.ct_eq(other).into()
    }
}

impl Eq for SecretScalar {}

impl fmt::Debug for SecretScalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretScalar([REDACTED])")
    }
}

// MARK: - X-only public key

/// X-only public key (32 bytes)
///
/// In BIP-340, public keys are represented as only their x-coordinate.
/// The y-coordinate is implicitly even.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct XOnlyPubKey(pub [u8; 32]);

impl XOnlyPubKey {
    /// Create from 32 bytes
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Create from slice (must be 32 bytes)
    pub fn from_slice(slice: &[u8]) -> TaprootResult<Self> {
        let bytes: [u8; 32] = slice.try_into().map_err(|_| {
            TaprootError::InvalidPublicKey(format!("Expected 32 bytes, got {}", slice.len()))
        })?;
        Ok(Self(bytes))
    }

    /// Get the raw bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Convert to hex string
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from hex string
    pub fn from_hex(s: &str) -> TaprootResult<Self> {
        let bytes = hex::decode(s.trim())
            .map_err(|e| TaprootError::InvalidPublicKey(e.to_string()))?;
        Self::from_slice(&bytes)
    }

    /// Convert to bitcoin library XOnlyPublicKey (checks the x lifts to the curve)
    pub fn to_secp256k1(&self) -> TaprootResult<XOnlyPublicKey> {
        XOnlyPublicKey::from_slice(&self.0)
            .map_err(|e| TaprootError::InvalidPublicKey(e.to_string()))
    }
}

impl From<XOnlyPublicKey> for XOnlyPubKey {
    fn from(key: XOnlyPublicKey) -> Self {
        Self(key.serialize())
    }
}

// MARK: - Point

/// A curve point, or the point at infinity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Point(Option<PublicKey>);

impl Point {
    /// The group identity
    pub const IDENTITY: Point = Point(None);

    pub fn is_identity(&self) -> bool {
        self.0.is_none()
    }

    /// Split into x-only key and the parity of y
    ///
    /// The returned x-only key denotes the even-y point; `Parity::Odd` records
    /// that this point is its negation.
    pub fn x_only(&self) -> TaprootResult<(XOnlyPubKey, Parity)> {
        let pk = self.0.ok_or_else(|| {
            TaprootError::InvalidPublicKey("point at infinity has no x coordinate".to_string())
        })?;
        let (x_only, parity) = pk.x_only_public_key();
        Ok((XOnlyPubKey::from(x_only), parity))
    }

    pub fn has_odd_y(&self) -> bool {
        matches!(self.0.map(|pk| pk.x_only_public_key().1), Some(Parity::Odd))
    }
}

impl From<PublicKey> for Point {
    fn from(pk: PublicKey) -> Self {
        Point(Some(pk))
    }
}

// MARK: - Curve context

/// Read-only secp256k1 context
pub struct Curve {
    secp: Secp256k1<All>,
}

impl Default for Curve {
    fn default() -> Self {
        Self::new()
    }
}

impl Curve {
    pub fn new() -> Self {
        Self {
            secp: Secp256k1::new(),
        }
    }

    /// Borrow the libsecp256k1 context
    pub fn context(&self) -> &Secp256k1<All> {
        &self.secp
    }

    /// k * G for a secret scalar (never the identity)
    pub fn mul_base(&self, k: &SecretScalar) -> TaprootResult<Point> {
        Ok(Point::from(PublicKey::from_secret_key(&self.secp, &k.to_secret_key()?)))
    }

    /// k * G for any k in [0, n-1]; zero yields the identity
    pub fn mul_base_bytes(&self, k: &[u8; 32]) -> TaprootResult<Point> {
        if *k == [0u8; 32] {
            return Ok(Point::IDENTITY);
        }
        self.mul_base(&SecretScalar::from_bytes(*k)?)
    }

    /// k * P for any k in [0, n-1]
    pub fn mul(&self, p: &Point, k: &[u8; 32]) -> TaprootResult<Point> {
        let scalar = to_scalar(k)?;
        match p.0 {
            Some(pk) if *k != [0u8; 32] => pk
                .mul_tweak(&self.secp, &scalar)
                .map(Point::from)
                .map_err(|e| TaprootError::InvalidScalar(e.to_string())),
            _ => Ok(Point::IDENTITY),
        }
    }

    /// a + b
    pub fn add(&self, a: &Point, b: &Point) -> Point {
        match (a.0, b.0) {
            (None, _) => *b,
            (_, None) => *a,
            // combine only fails when the sum is the point at infinity
            (Some(x), Some(y)) => x.combine(&y).map(Point::from).unwrap_or(Point::IDENTITY),
        }
    }

    /// -p
    pub fn negate(&self, p: &Point) -> Point {
        Point(p.0.map(|pk| pk.negate(&self.secp)))
    }

    /// The even-y point with the given x coordinate
    pub fn lift_x(&self, x: &XOnlyPubKey) -> TaprootResult<Point> {
        Ok(Point::from(x.to_secp256k1()?.public_key(Parity::Even)))
    }

    /// x-only public key of `k * G`
    pub fn public_key(&self, k: &SecretScalar) -> TaprootResult<XOnlyPubKey> {
        Ok(self.public_key_with_parity(k)?.0)
    }

    /// x-only public key of `k * G` together with the parity of its y
    pub fn public_key_with_parity(&self, k: &SecretScalar) -> TaprootResult<(XOnlyPubKey, Parity)> {
        self.mul_base(k)?.x_only()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const G_X: &str = "79be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798";

    fn scalar(n: u8) -> SecretScalar {
        let mut bytes = [0u8; 32];
        bytes[31] = n;
        SecretScalar::from_bytes(bytes).unwrap()
    }

    #[test]
    fn test_generator() {
        let curve = Curve::new();
        let pk = curve.public_key(&scalar(1)).unwrap();
        assert_eq!(pk.to_hex(), G_X);
    }

    #[test]
    fn test_invalid_scalars() {
        assert!(matches!(
            SecretScalar::from_bytes([0u8; 32]),
            Err(TaprootError::InvalidScalar(_))
        ));
        assert!(matches!(
            SecretScalar::from_bytes(CURVE_ORDER),
            Err(TaprootError::InvalidScalar(_))
        ));
        assert!(SecretScalar::from_slice(&[1u8; 31]).is_err());

        let mut n_minus_1 = CURVE_ORDER;
        n_minus_1[31] -= 1;
        assert!(SecretScalar::from_bytes(n_minus_1).is_ok());
    }

    #[test]
    fn test_reduce_mod_order() {
        assert_eq!(reduce_mod_order(CURVE_ORDER), [0u8; 32]);

        let mut n_minus_1 = CURVE_ORDER;
        n_minus_1[31] -= 1;
        assert_eq!(reduce_mod_order(n_minus_1), n_minus_1);

        // 2^256 - 1 - n
        let expected = format!("{:0>64}", "14551231950b75fc4402da1732fc9bebe");
        assert_eq!(hex::encode(reduce_mod_order([0xff; 32])), expected);
    }

    #[test]
    fn test_point_addition_and_doubling() {
        let curve = Curve::new();
        let g = curve.mul_base(&scalar(1)).unwrap();
        let two_g = curve.mul_base(&scalar(2)).unwrap();
        let three_g = curve.mul_base(&scalar(3)).unwrap();

        assert_eq!(curve.add(&g, &g), two_g);
        assert_eq!(curve.add(&two_g, &g), three_g);
        assert_eq!(curve.mul(&g, &scalar(3).secret_bytes()).unwrap(), three_g);
    }

    #[test]
    fn test_identity_rules() {
        let curve = Curve::new();
        let g = curve.mul_base(&scalar(7)).unwrap();
        let neg = curve.negate(&g);

        assert!(curve.add(&g, &neg).is_identity());
        assert_eq!(curve.add(&g, &Point::IDENTITY), g);
        assert!(curve.mul_base_bytes(&[0u8; 32]).unwrap().is_identity());
        assert!(curve.mul(&g, &[0u8; 32]).unwrap().is_identity());
        assert!(Point::IDENTITY.x_only().is_err());
    }

    #[test]
    fn test_lift_x_is_even() {
        let curve = Curve::new();
        for n in 1..20u8 {
            let p = curve.mul_base(&scalar(n)).unwrap();
            let (x, parity) = p.x_only().unwrap();
            let lifted = curve.lift_x(&x).unwrap();
            assert!(!lifted.has_odd_y());
            if parity == Parity::Odd {
                assert_eq!(curve.negate(&p), lifted);
            } else {
                assert_eq!(p, lifted);
            }
        }
    }

    #[test]
    fn test_lift_x_rejects_non_curve_x() {
        let curve = Curve::new();
        // BIP-340 test vector 5: public key not on the curve
        let x = XOnlyPubKey::from_hex(
            "eefdea4cdb677750a420fee807eacf21eb9898ae79b9768766e4faa04a2d4a34",
        )
        .unwrap();
        assert!(curve.lift_x(&x).is_err());
    }

    #[test]
    fn test_scalar_arithmetic() {
        let a = scalar(5);
        assert_eq!(a.add(&scalar(3).secret_bytes()).unwrap(), scalar(8));
        assert_eq!(a.mul(&scalar(3).secret_bytes()).unwrap(), scalar(15));
        assert!(a.negate().unwrap().add(&a.secret_bytes()).is_err());
        assert!(a.mul(&[0u8; 32]).is_err());
    }

    #[test]
    fn test_scalar_equality() {
        assert!(bool::from(scalar(7).ct_eq(&scalar(7))));
        assert!(!bool::from(scalar(7).ct_eq(&scalar(8))));
        assert_eq!(scalar(7), SecretScalar::from_slice(&scalar(7).secret_bytes()).unwrap());
        assert_ne!(scalar(7), scalar(7).negate().unwrap());
    }

    #[test]
    fn test_debug_is_redacted() {
        let dbg = format!("{:?}", scalar(9));
        assert!(dbg.contains("REDACTED"));
        assert!(!dbg.contains("09"));
    }
}
