//! Cryptographic primitives
//!
//! - secp256k1 scalar and point arithmetic
//! - BIP-340 tagged hashes and Schnorr signatures
//! - BIP-341 script trees and key tweaking

pub mod curve;
pub mod schnorr;
pub mod tagged_hash;
pub mod taproot;
pub mod taptree;

pub use curve::{Curve, Point, SecretScalar, XOnlyPubKey};
pub use schnorr::{schnorr_public_key, schnorr_sign, schnorr_verify, SchnorrSig, SchnorrSigner};
pub use tagged_hash::{tagged_hash, tags, TaggedHasher};
pub use taproot::{
    p2tr_script_pubkey, tap_tweak_hash, TaprootInternalKey, TaprootOutputKey, TaprootSpendInfo,
    TaprootTweaker,
};
pub use taptree::{
    tap_branch_hash, verify_merkle_proof, NodeId, TapLeaf, TapMerkleRoot, TapTree,
    TapTreeBuilder, TreeShape, TAPSCRIPT_LEAF_VERSION,
};
