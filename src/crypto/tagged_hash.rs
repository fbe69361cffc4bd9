//! BIP-340 tagged hashes
//!
//! tagged_hash(tag, msg) = SHA256(SHA256(tag) || SHA256(tag) || msg)
//!
//! The 64-byte tag prefix fills exactly one SHA256 block, so a hasher that has
//! already absorbed it can be cloned cheaply for every message under the same
//! tag. [`TaggedHasher`] keeps that midstate.

use sha2::{Digest, Sha256};

/// Standard BIP-340/341 tags
pub mod tags {
    pub const BIP0340_AUX: &str = "BIP0340/aux";
    pub const BIP0340_NONCE: &str = "BIP0340/nonce";
    pub const BIP0340_CHALLENGE: &str = "BIP0340/challenge";
    pub const TAP_TWEAK: &str = "TapTweak";
    pub const TAP_LEAF: &str = "TapLeaf";
    pub const TAP_BRANCH: &str = "TapBranch";
    pub const TAP_SIGHASH: &str = "TapSighash";
}

/// SHA256 engine with a tag prefix already absorbed
#[derive(Clone)]
pub struct TaggedHasher {
    engine: Sha256,
}

impl TaggedHasher {
    /// Precompute the prefix for `tag`
    pub fn new(tag: &str) -> Self {
        let tag_hash = Sha256::digest(tag.as_bytes());
        let mut engine = Sha256::new();
        engine.update(tag_hash);
        engine.update(tag_hash);
        Self { engine }
    }

    /// Hash a single message under this tag
    pub fn hash(&self, msg: &[u8]) -> [u8; 32] {
        self.hash_parts(&[msg])
    }

    /// Hash the concatenation of `parts` without building an intermediate buffer
    pub fn hash_parts(&self, parts: &[&[u8]]) -> [u8; 32] {
        let mut engine = self.engine.clone();
        for part in parts {
            engine.update(part);
        }
        engine.finalize().into()
    }
}

/// One-shot tagged hash
pub fn tagged_hash(tag: &str, msg: &[u8]) -> [u8; 32] {
    TaggedHasher::new(tag).hash(msg)
}

/// Plain single SHA256
pub fn sha256(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}

/// Double SHA256, as used for transaction identifiers
pub fn sha256d(data: &[u8]) -> [u8; 32] {
    Sha256::digest(Sha256::digest(data)).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tagged_hash_matches_definition() {
        let msg = b"taproot";
        let tag_hash = sha256(tags::TAP_LEAF.as_bytes());

        let mut preimage = Vec::new();
        preimage.extend_from_slice(&tag_hash);
        preimage.extend_from_slice(&tag_hash);
        preimage.extend_from_slice(msg);

        assert_eq!(tagged_hash(tags::TAP_LEAF, msg), sha256(&preimage));
    }

    #[test]
    fn test_cached_hasher_matches_one_shot() {
        let hasher = TaggedHasher::new(tags::TAP_BRANCH);
        for len in [0usize, 1, 31, 64, 200] {
            let msg = vec![0x5a; len];
            assert_eq!(hasher.hash(&msg), tagged_hash(tags::TAP_BRANCH, &msg));
        }
        assert_eq!(
            hasher.hash_parts(&[b"ab", b"cd"]),
            tagged_hash(tags::TAP_BRANCH, b"abcd")
        );
    }

    #[test]
    fn test_tags_are_domain_separated() {
        let msg = [0u8; 32];
        let all = [
            tags::TAP_LEAF,
            tags::TAP_BRANCH,
            tags::TAP_TWEAK,
            tags::TAP_SIGHASH,
            tags::BIP0340_AUX,
            tags::BIP0340_NONCE,
            tags::BIP0340_CHALLENGE,
        ];
        for (i, a) in all.iter().enumerate() {
            for b in &all[i + 1..] {
                assert_ne!(tagged_hash(a, &msg), tagged_hash(b, &msg), "{} vs {}", a, b);
            }
        }
    }

    #[test]
    fn test_sha256_empty() {
        assert_eq!(
            hex::encode(sha256(b"")),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}
