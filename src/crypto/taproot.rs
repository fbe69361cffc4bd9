//! Taproot Key Tweaking (BIP-341)
//!
//! Derivation of the output key from an internal key and an optional script
//! tree commitment, and the matching private-key tweak.
//!
//! ```text
//! t = tagged_hash("TapTweak", internal_key || merkle_root)   (root omitted for key-path only)
//! Q = lift_x(internal_key) + t*G
//! d' = (d or n-d, whichever has an even-y public key) + t  mod n
//! ```
//!
//! Reference: https://github.com/bitcoin/bips/blob/master/bip-0341.mediawiki

use crate::crypto::curve::{is_below_order, Curve, SecretScalar, XOnlyPubKey};
use crate::crypto::tagged_hash::{tags, TaggedHasher};
use crate::crypto::taptree::{TapMerkleRoot, TapTree};
use crate::error::{TaprootError, TaprootResult};
use crate::log_debug;
use bitcoin::secp256k1::Parity;
use serde::{Deserialize, Serialize};

// MARK: - Taproot Types

/// Taproot output key (tweaked public key)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaprootOutputKey {
    /// The x-only output public key
    pub output_key: XOnlyPubKey,
    /// Parity of the output key (needed for script-path spending)
    pub parity: bool,
}

/// Taproot internal key (untweaked public key)
pub type TaprootInternalKey = XOnlyPubKey;

/// Calculate the tweak hash
///
/// tweak = tagged_hash("TapTweak", internal_key || merkle_root)
///
/// Without a script tree (key-path only):
/// tweak = tagged_hash("TapTweak", internal_key)
pub fn tap_tweak_hash(internal_key: &XOnlyPubKey, merkle_root: Option<&TapMerkleRoot>) -> [u8; 32] {
    let hasher = TaggedHasher::new(tags::TAP_TWEAK);
    match merkle_root {
        Some(root) => hasher.hash_parts(&[internal_key.as_bytes(), root.as_bytes()]),
        None => hasher.hash(internal_key.as_bytes()),
    }
}

/// P2TR scriptPubKey: OP_1 OP_PUSHBYTES_32 <output key>
pub fn p2tr_script_pubkey(output_key: &XOnlyPubKey) -> Vec<u8> {
    let mut script = Vec::with_capacity(34);
    script.push(0x51);
    script.push(0x20);
    script.extend_from_slice(output_key.as_bytes());
    script
}

fn checked_tweak(tweak: [u8; 32]) -> TaprootResult<[u8; 32]> {
    if !is_below_order(&tweak) {
        return Err(TaprootError::InvalidTweak(
            "tweak is not below the group order".to_string(),
        ));
    }
    Ok(tweak)
}

// MARK: - Tweaker

/// Taproot key tweaker
pub struct TaprootTweaker {
    curve: Curve,
}

impl Default for TaprootTweaker {
    fn default() -> Self {
        Self::new()
    }
}

impl TaprootTweaker {
    /// Create a new Taproot tweaker
    pub fn new() -> Self {
        Self {
            curve: Curve::new(),
        }
    }

    pub fn curve(&self) -> &Curve {
        &self.curve
    }

    /// Tweak an internal public key to create the output key
    ///
    /// output_key = internal_key + tweak * G
    pub fn tweak_public_key(
        &self,
        internal_key: &XOnlyPubKey,
        merkle_root: Option<&TapMerkleRoot>,
    ) -> TaprootResult<TaprootOutputKey> {
        let tweak = checked_tweak(tap_tweak_hash(internal_key, merkle_root))?;
        self.apply_tweak(internal_key, &tweak)
    }

    /// Q = lift_x(internal_key) + tweak * G
    pub fn apply_tweak(
        &self,
        internal_key: &XOnlyPubKey,
        tweak: &[u8; 32],
    ) -> TaprootResult<TaprootOutputKey> {
        let p = self.curve.lift_x(internal_key)?;
        let t_g = self
            .curve
            .mul_base_bytes(tweak)
            .map_err(|e| TaprootError::InvalidTweak(e.to_string()))?;
        let q = self.curve.add(&p, &t_g);
        if q.is_identity() {
            return Err(TaprootError::InvalidTweak(
                "tweaked key is the point at infinity".to_string(),
            ));
        }

        let (output_key, parity) = q.x_only()?;
        log_debug!(
            "taproot",
            "Tweaked internal key",
            internal_key = internal_key.to_hex(),
            tweak_hash = hex::encode(tweak),
            output_key = output_key.to_hex()
        );

        Ok(TaprootOutputKey {
            output_key,
            parity: parity == Parity::Odd,
        })
    }

    /// Tweak a private key for key-path spending
    ///
    /// The key is first negated if its public key has odd y, so the result
    /// signs for the output key returned by [`Self::tweak_public_key`].
    pub fn tweak_private_key(
        &self,
        private_key: &SecretScalar,
        merkle_root: Option<&TapMerkleRoot>,
    ) -> TaprootResult<SecretScalar> {
        let (internal_key, parity) = self.curve.public_key_with_parity(private_key)?;
        let even = match parity {
            Parity::Odd => private_key.negate()?,
            Parity::Even => private_key.clone(),
        };

        let tweak = checked_tweak(tap_tweak_hash(&internal_key, merkle_root))?;
        even.add(&tweak)
            .map_err(|_| TaprootError::InvalidTweak("tweaked private key is zero".to_string()))
    }
}

// MARK: - Spend Info

/// Everything needed to pay to and spend from a Taproot output
#[derive(Debug, Clone)]
pub struct TaprootSpendInfo {
    internal_key: XOnlyPubKey,
    tree: Option<TapTree>,
    tweak: [u8; 32],
    output: TaprootOutputKey,
}

impl TaprootSpendInfo {
    /// Output without a script tree
    pub fn key_path_only(
        tweaker: &TaprootTweaker,
        internal_key: XOnlyPubKey,
    ) -> TaprootResult<Self> {
        Self::build(tweaker, internal_key, None)
    }

    /// Output committing to `tree`
    pub fn with_tree(
        tweaker: &TaprootTweaker,
        internal_key: XOnlyPubKey,
        tree: TapTree,
    ) -> TaprootResult<Self> {
        Self::build(tweaker, internal_key, Some(tree))
    }

    fn build(
        tweaker: &TaprootTweaker,
        internal_key: XOnlyPubKey,
        tree: Option<TapTree>,
    ) -> TaprootResult<Self> {
        let root = tree.as_ref().map(|t| t.root_hash());
        let tweak = checked_tweak(tap_tweak_hash(&internal_key, root.as_ref()))?;
        let output = tweaker.apply_tweak(&internal_key, &tweak)?;
        Ok(Self {
            internal_key,
            tree,
            tweak,
            output,
        })
    }

    pub fn internal_key(&self) -> &XOnlyPubKey {
        &self.internal_key
    }

    pub fn tree(&self) -> Option<&TapTree> {
        self.tree.as_ref()
    }

    pub fn merkle_root(&self) -> Option<TapMerkleRoot> {
        self.tree.as_ref().map(|t| t.root_hash())
    }

    /// TapTweak hash
    pub fn tweak(&self) -> &[u8; 32] {
        &self.tweak
    }

    pub fn output(&self) -> &TaprootOutputKey {
        &self.output
    }

    pub fn output_key(&self) -> &XOnlyPubKey {
        &self.output.output_key
    }

    /// Whether the output key had odd y before normalization
    pub fn parity(&self) -> bool {
        self.output.parity
    }

    pub fn script_pubkey(&self) -> Vec<u8> {
        p2tr_script_pubkey(&self.output.output_key)
    }
}

// MARK: - Tests
