//! BIP-340 Schnorr Signatures
//!
//! Signing and verification of 64-byte Schnorr signatures over x-only keys.
//!
//! Signing follows the BIP-340 default algorithm step by step: nonce from
//! the private key masked by hashed auxiliary randomness, even-y normalization
//! of both P and R, and a final self-verification so a faulty result is never
//! handed to the caller.
//!
//! Reference: https://github.com/bitcoin/bips/blob/master/bip-0340.mediawiki

use crate::crypto::curve::{
    is_below_order, is_field_element, reduce_mod_order, Curve, SecretScalar, XOnlyPubKey,
};
use crate::crypto::tagged_hash::{tags, TaggedHasher};
use crate::error::{TaprootError, TaprootResult};
use bitcoin::secp256k1::{schnorr::Signature as SchnorrSignature, Parity};
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

// MARK: - Signature Type

/// Schnorr signature (64 bytes: 32-byte R + 32-byte s)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchnorrSig(pub [u8; 64]);

// Custom serde implementation for SchnorrSig (64 bytes as hex)
impl Serialize for SchnorrSig {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&hex::encode(self.0))
    }
}

impl<'de> Deserialize<'de> for SchnorrSig {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let bytes = hex::decode(&s).map_err(serde::de::Error::custom)?;
        bytes
            .try_into()
            .map(SchnorrSig)
            .map_err(|_| serde::de::Error::custom("expected 64 bytes"))
    }
}

impl SchnorrSig {
    /// Create from slice (must be 64 bytes)
    pub fn from_slice(slice: &[u8]) -> TaprootResult<Self> {
        let bytes: [u8; 64] = slice.try_into().map_err(|_| {
            TaprootError::InvalidSignature(format!("Expected 64 bytes, got {}", slice.len()))
        })?;
        Ok(Self(bytes))
    }

    /// Get the raw bytes
    pub fn as_bytes(&self) -> &[u8; 64] {
        &self.0
    }

    /// R.x (first 32 bytes)
    pub fn r(&self) -> [u8; 32] {
        let mut r = [0u8; 32];
        r.copy_from_slice(&self.0[..32]);
        r
    }

    /// s (last 32 bytes)
    pub fn s(&self) -> [u8; 32] {
        let mut s = [0u8; 32];
        s.copy_from_slice(&self.0[32..]);
        s
    }

    /// Convert to hex string
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from hex string
    pub fn from_hex(s: &str) -> TaprootResult<Self> {
        let bytes =
            hex::decode(s.trim()).map_err(|e| TaprootError::InvalidSignature(e.to_string()))?;
        Self::from_slice(&bytes)
    }

    /// Convert to bitcoin library SchnorrSignature
    pub fn to_secp256k1(&self) -> TaprootResult<SchnorrSignature> {
        SchnorrSignature::from_slice(&self.0)
            .map_err(|e| TaprootError::InvalidSignature(e.to_string()))
    }
}

impl From<SchnorrSignature> for SchnorrSig {
    fn from(sig: SchnorrSignature) -> Self {
        Self(sig.serialize())
    }
}

// MARK: - Schnorr Signer

/// BIP-340 Schnorr signer
pub struct SchnorrSigner {
    curve: Curve,
    aux_hasher: TaggedHasher,
    nonce_hasher: TaggedHasher,
    challenge_hasher: TaggedHasher,
}

impl Default for SchnorrSigner {
    fn default() -> Self {
        Self::new()
    }
}

impl SchnorrSigner {
    /// Create a new Schnorr signer
    pub fn new() -> Self {
        Self {
            curve: Curve::new(),
            aux_hasher: TaggedHasher::new(tags::BIP0340_AUX),
            nonce_hasher: TaggedHasher::new(tags::BIP0340_NONCE),
            challenge_hasher: TaggedHasher::new(tags::BIP0340_CHALLENGE),
        }
    }

    pub fn curve(&self) -> &Curve {
        &self.curve
    }

    /// Derive x-only public key from private key
    pub fn public_key(&self, private_key: &SecretScalar) -> TaprootResult<XOnlyPubKey> {
        self.curve.public_key(private_key)
    }

    /// Sign a 32-byte message hash with BIP-340 Schnorr
    ///
    /// The signature is checked against the signer's own public key before
    /// it is returned; any mismatch is reported as `SigningFailed`.
    pub fn sign(
        &self,
        message: &[u8; 32],
        private_key: &SecretScalar,
        aux_rand: &[u8; 32],
    ) -> TaprootResult<SchnorrSig> {
        let (public_key, parity) = self.curve.public_key_with_parity(private_key)?;
        let d = match parity {
            Parity::Odd => private_key.negate()?,
            Parity::Even => private_key.clone(),
        };

        let nonce = Zeroizing::new(self.compute_nonce(
            &d.secret_bytes(),
            public_key.as_bytes(),
            message,
            aux_rand,
        ));
        let k0 = SecretScalar::from_hash_reduced(*nonce)
            .map_err(|_| TaprootError::SigningFailed("derived nonce is zero".to_string()))?;

        let (r, r_parity) = self.curve.public_key_with_parity(&k0)?;
        let k = match r_parity {
            Parity::Odd => k0.negate()?,
            Parity::Even => k0,
        };

        let e = reduce_mod_order(self.challenge_hash(r.as_bytes(), public_key.as_bytes(), message));

        // s = k + e*d mod n
        let s = if e == [0u8; 32] {
            k
        } else {
            d.mul(&e)
                .and_then(|ed| ed.add(&k.secret_bytes()))
                .map_err(|err| TaprootError::SigningFailed(err.to_string()))?
        };

        let mut sig = [0u8; 64];
        sig[..32].copy_from_slice(r.as_bytes());
        sig[32..].copy_from_slice(&s.secret_bytes());
        let sig = SchnorrSig(sig);

        if !self.verify(message, &sig, &public_key)? {
            return Err(TaprootError::SigningFailed(
                "signature does not verify against the signing key".to_string(),
            ));
        }
        Ok(sig)
    }

    /// Verify a BIP-340 Schnorr signature
    ///
    /// Returns `Err` only when the public key is not a valid x coordinate.
    pub fn verify(
        &self,
        message: &[u8; 32],
        signature: &SchnorrSig,
        public_key: &XOnlyPubKey,
    ) -> TaprootResult<bool> {
        let p = self.curve.lift_x(public_key)?;
        let r = signature.r();
        let s = signature.s();
        if !is_field_element(&r) || !is_below_order(&s) {
            return Ok(false);
        }

        let e = reduce_mod_order(self.challenge_hash(&r, public_key.as_bytes(), message));

        // R = s*G - e*P
        let s_g = self.curve.mul_base_bytes(&s)?;
        let e_p = self.curve.mul(&p, &e)?;
        let big_r = self.curve.add(&s_g, &self.curve.negate(&e_p));
        if big_r.is_identity() || big_r.has_odd_y() {
            return Ok(false);
        }

        let (r_x, _) = big_r.x_only()?;
        Ok(bool::from(r_x.as_bytes()[..].ct_eq(&r[..])))
    }

    /// Hash a message with BIP-340 challenge tag
    ///
    /// challenge = tagged_hash("BIP0340/challenge", R || P || m)
    pub fn challenge_hash(&self, r: &[u8; 32], p: &[u8; 32], message: &[u8]) -> [u8; 32] {
        self.challenge_hasher.hash_parts(&[r, p, message])
    }

    /// Compute the nonce hash for BIP-340 signing (not yet reduced mod n)
    ///
    /// rand = tagged_hash("BIP0340/nonce", t || bytes(P) || m)
    /// where t = xor(bytes(d), tagged_hash("BIP0340/aux", aux_rand))
    pub fn compute_nonce(
        &self,
        private_key: &[u8; 32],
        public_key: &[u8; 32],
        message: &[u8; 32],
        aux_rand: &[u8; 32],
    ) -> [u8; 32] {
        let aux_hash = self.aux_hasher.hash(aux_rand);
        let mut t = Zeroizing::new([0u8; 32]);
        for (i, byte) in t.iter_mut().enumerate() {
            *byte = private_key[i] ^ aux_hash[i];
        }
        self.nonce_hasher.hash_parts(&[&t[..], public_key, message])
    }
}

// MARK: - Convenience Functions

fn parse_private_key(private_key: &[u8]) -> TaprootResult<SecretScalar> {
    SecretScalar::from_slice(private_key)
        .map_err(|e| TaprootError::InvalidPrivateKey(e.to_string()))
}

/// Sign a message with BIP-340 Schnorr from raw private key bytes
pub fn schnorr_sign(
    message: &[u8; 32],
    private_key: &[u8],
    aux_rand: &[u8; 32],
) -> TaprootResult<SchnorrSig> {
    let signer = SchnorrSigner::new();
    signer.sign(message, &parse_private_key(private_key)?, aux_rand)
}

/// Verify a BIP-340 Schnorr signature
pub fn schnorr_verify(
    message: &[u8; 32],
    signature: &SchnorrSig,
    public_key: &XOnlyPubKey,
) -> TaprootResult<bool> {
    let signer = SchnorrSigner::new();
    signer.verify(message, signature, public_key)
}

/// Derive x-only public key from raw private key bytes
pub fn schnorr_public_key(private_key: &[u8]) -> TaprootResult<XOnlyPubKey> {
    let signer = SchnorrSigner::new();
    signer.public_key(&parse_private_key(private_key)?)
}

// MARK: - Tests
