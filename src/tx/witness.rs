//! Taproot Witness Assembly
//!
//! Key path:    [signature]
//! Script path: [satisfying elements..., leaf script, control block]
//!
//! Control block = (leaf_version | parity) || internal_key || merkle path,
//! where the path lists sibling hashes from the leaf up to the root.

use crate::crypto::curve::XOnlyPubKey;
use crate::crypto::schnorr::SchnorrSig;
use crate::crypto::taproot::{TaprootSpendInfo, TaprootTweaker};
use crate::crypto::taptree::{compute_root_from_proof, TapLeaf, TapMerkleRoot, TAPROOT_MAX_DEPTH};
use crate::error::{TaprootError, TaprootResult};
use crate::tx::codec::Witness;
use crate::tx::sighash::SighashType;
use serde::{Deserialize, Serialize};

pub const CONTROL_BLOCK_BASE_SIZE: usize = 33;
pub const CONTROL_BLOCK_NODE_SIZE: usize = 32;
pub const CONTROL_BLOCK_MAX_SIZE: usize =
    CONTROL_BLOCK_BASE_SIZE + CONTROL_BLOCK_NODE_SIZE * TAPROOT_MAX_DEPTH;

/// Control block for script-path spending
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlBlock {
    /// Leaf version with parity bit
    pub leaf_version_with_parity: u8,
    /// Internal public key (32 bytes)
    pub internal_key: XOnlyPubKey,
    /// Merkle path (each element is 32 bytes)
    pub merkle_path: Vec<[u8; 32]>,
}

impl ControlBlock {
    /// Create a new control block
    pub fn new(
        leaf_version: u8,
        output_key_parity: bool,
        internal_key: XOnlyPubKey,
        merkle_path: Vec<[u8; 32]>,
    ) -> Self {
        Self {
            leaf_version_with_parity: (leaf_version & 0xfe) | u8::from(output_key_parity),
            internal_key,
            merkle_path,
        }
    }

    /// Control block proving `leaf` is committed in `spend_info`
    pub fn for_leaf(spend_info: &TaprootSpendInfo, leaf: &TapLeaf) -> TaprootResult<Self> {
        let tree = spend_info.tree().ok_or_else(|| {
            TaprootError::InvalidTree("output has no script tree".to_string())
        })?;
        let id = tree.find_leaf(leaf).ok_or_else(|| {
            TaprootError::InvalidTree(format!(
                "leaf {} is not in the script tree",
                hex::encode(leaf.hash())
            ))
        })?;
        Ok(Self::new(
            leaf.version,
            spend_info.parity(),
            *spend_info.internal_key(),
            tree.merkle_proof(id)?,
        ))
    }

    /// Serialize to bytes
    pub fn serialize(&self) -> Vec<u8> {
        let mut data = Vec::with_capacity(self.size());
        data.push(self.leaf_version_with_parity);
        data.extend_from_slice(self.internal_key.as_bytes());
        for hash in &self.merkle_path {
            data.extend_from_slice(hash);
        }
        data
    }

    /// Serialized length: 33 + 32 * depth
    pub fn size(&self) -> usize {
        CONTROL_BLOCK_BASE_SIZE + CONTROL_BLOCK_NODE_SIZE * self.merkle_path.len()
    }

    /// Parse a serialized control block
    pub fn parse(bytes: &[u8]) -> TaprootResult<Self> {
        if bytes.len() < CONTROL_BLOCK_BASE_SIZE
            || bytes.len() > CONTROL_BLOCK_MAX_SIZE
            || (bytes.len() - CONTROL_BLOCK_BASE_SIZE) % CONTROL_BLOCK_NODE_SIZE != 0
        {
            return Err(TaprootError::MalformedWitness(format!(
                "invalid control block length {}",
                bytes.len()
            )));
        }

        let internal_key = XOnlyPubKey::from_slice(&bytes[1..CONTROL_BLOCK_BASE_SIZE])?;
        let merkle_path = bytes[CONTROL_BLOCK_BASE_SIZE..]
            .chunks_exact(CONTROL_BLOCK_NODE_SIZE)
            .map(|chunk| {
                let mut node = [0u8; 32];
                node.copy_from_slice(chunk);
                node
            })
            .collect();

        Ok(Self {
            leaf_version_with_parity: bytes[0],
            internal_key,
            merkle_path,
        })
    }

    /// Get the parity bit
    pub fn parity(&self) -> bool {
        (self.leaf_version_with_parity & 0x01) != 0
    }

    /// Get the leaf version (without parity bit)
    pub fn leaf_version(&self) -> u8 {
        self.leaf_version_with_parity & 0xfe
    }

    /// Leaf depth in the script tree
    pub fn depth(&self) -> usize {
        self.merkle_path.len()
    }

    /// Root the merkle path reduces to for `leaf_script`
    pub fn merkle_root(&self, leaf_script: &[u8]) -> TapMerkleRoot {
        let leaf = TapLeaf {
            version: self.leaf_version(),
            script: leaf_script.to_vec(),
        };
        TapMerkleRoot(compute_root_from_proof(&leaf.hash(), &self.merkle_path))
    }

    /// Check that `leaf_script` under this control block commits to `output_key`
    ///
    /// Recomputes the root, re-derives the tweaked key, and compares both the
    /// x coordinate and the parity bit.
    pub fn verify(
        &self,
        tweaker: &TaprootTweaker,
        output_key: &XOnlyPubKey,
        leaf_script: &[u8],
    ) -> TaprootResult<()> {
        let root = self.merkle_root(leaf_script);
        let derived = tweaker.tweak_public_key(&self.internal_key, Some(&root))?;

        if derived.output_key != *output_key {
            return Err(TaprootError::CommitmentMismatch(format!(
                "control block commits to {}, expected {}",
                derived.output_key.to_hex(),
                output_key.to_hex()
            )));
        }
        if derived.parity != self.parity() {
            return Err(TaprootError::CommitmentMismatch(
                "control block parity bit does not match the output key".to_string(),
            ));
        }
        Ok(())
    }
}

// MARK: - Witness stacks

/// 64-byte signature, plus the hash type byte unless it is `Default`
pub fn encode_signature(signature: &SchnorrSig, hash_type: SighashType) -> Vec<u8> {
    let mut bytes = signature.as_bytes().to_vec();
    if hash_type != SighashType::Default {
        bytes.push(hash_type.to_byte());
    }
    bytes
}

/// Witness for a key-path spend
pub fn key_path_witness(signature: &SchnorrSig, hash_type: SighashType) -> Witness {
    Witness::from_elements(vec![encode_signature(signature, hash_type)])
}

/// Witness for a script-path spend
pub fn script_path_witness(
    satisfying_elements: Vec<Vec<u8>>,
    leaf: &TapLeaf,
    control_block: &ControlBlock,
) -> Witness {
    let mut witness = Witness::from_elements(satisfying_elements);
    witness.push(leaf.script.clone());
    witness.push(control_block.serialize());
    witness
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::curve::SecretScalar;
    use crate::crypto::taptree::{TapTree, TAPSCRIPT_LEAF_VERSION};

    fn spend_info() -> (TaprootSpendInfo, Vec<TapLeaf>, TaprootTweaker) {
        let tweaker = TaprootTweaker::new();
        let internal = tweaker
            .curve()
            .public_key(&SecretScalar::from_bytes([0x21; 32]).unwrap())
            .unwrap();
        let leaves: Vec<TapLeaf> = (0..3u8).map(|i| TapLeaf::new(vec![0x51 + i])).collect();
        let tree = TapTree::balanced(leaves.clone()).unwrap();
        let info = TaprootSpendInfo::with_tree(&tweaker, internal, tree).unwrap();
        (info, leaves, tweaker)
    }

    #[test]
    fn test_control_block() {
        let internal_key = XOnlyPubKey([0xAB; 32]);
        let cb = ControlBlock::new(
            TAPSCRIPT_LEAF_VERSION,
            true, // odd parity
            internal_key,
            vec![[0xCD; 32], [0xEF; 32]],
        );

        let serialized = cb.serialize();
        assert_eq!(serialized.len(), 1 + 32 + 64);
        assert_eq!(serialized[0], 0xc1);
        assert!(cb.parity());
        assert_eq!(cb.leaf_version(), TAPSCRIPT_LEAF_VERSION);

        assert_eq!(ControlBlock::parse(&serialized).unwrap(), cb);
    }

    #[test]
    fn test_parse_rejects_bad_lengths() {
        for len in [0usize, 32, 34, 64, 66, CONTROL_BLOCK_MAX_SIZE + 32] {
            assert!(
                matches!(
                    ControlBlock::parse(&vec![0xc0; len]),
                    Err(TaprootError::MalformedWitness(_))
                ),
                "length {}",
                len
            );
        }
        assert!(ControlBlock::parse(&vec![0xc0; CONTROL_BLOCK_MAX_SIZE]).is_ok());
    }

    #[test]
    fn test_control_block_sizes_follow_depth() {
        let (info, leaves, _) = spend_info();
        let deep = ControlBlock::for_leaf(&info, &leaves[0]).unwrap();
        let shallow = ControlBlock::for_leaf(&info, &leaves[2]).unwrap();
        assert_eq!(deep.serialize().len(), 97);
        assert_eq!(shallow.serialize().len(), 65);
        assert_eq!(deep.parity(), info.parity());
    }

    #[test]
    fn test_control_block_verifies() {
        let (info, leaves, tweaker) = spend_info();
        for leaf in &leaves {
            let cb = ControlBlock::for_leaf(&info, leaf).unwrap();
            cb.verify(&tweaker, info.output_key(), &leaf.script).unwrap();
            assert_eq!(Some(cb.merkle_root(&leaf.script)), info.merkle_root());
        }
    }

    #[test]
    fn test_control_block_mismatches() {
        let (info, leaves, tweaker) = spend_info();
        let cb = ControlBlock::for_leaf(&info, &leaves[0]).unwrap();

        // Wrong script
        assert!(matches!(
            cb.verify(&tweaker, info.output_key(), &leaves[1].script),
            Err(TaprootError::CommitmentMismatch(_))
        ));

        // Flipped parity
        let mut flipped = cb.clone();
        flipped.leaf_version_with_parity ^= 0x01;
        assert!(matches!(
            flipped.verify(&tweaker, info.output_key(), &leaves[0].script),
            Err(TaprootError::CommitmentMismatch(_))
        ));

        // Path in the wrong order
        let mut reordered = cb.clone();
        reordered.merkle_path.reverse();
        assert!(reordered.verify(&tweaker, info.output_key(), &leaves[0].script).is_err());
    }

    #[test]
    fn test_for_leaf_errors() {
        let (info, _, tweaker) = spend_info();
        assert!(ControlBlock::for_leaf(&info, &TapLeaf::new(vec![0x00])).is_err());

        let key_only = TaprootSpendInfo::key_path_only(&tweaker, *info.internal_key()).unwrap();
        assert!(ControlBlock::for_leaf(&key_only, &TapLeaf::new(vec![0x51])).is_err());
    }

    #[test]
    fn test_witness_stacks() {
        let sig = SchnorrSig([0x42; 64]);

        let default = key_path_witness(&sig, SighashType::Default);
        assert_eq!(default.elements(), &[vec![0x42; 64]]);

        let all = key_path_witness(&sig, SighashType::All);
        assert_eq!(all.elements()[0].len(), 65);
        assert_eq!(all.elements()[0][64], 0x01);

        let (info, leaves, _) = spend_info();
        let cb = ControlBlock::for_leaf(&info, &leaves[2]).unwrap();
        let satisfier = vec![encode_signature(&sig, SighashType::Default)];
        let witness = script_path_witness(satisfier, &leaves[2], &cb);
        assert_eq!(witness.len(), 3);
        assert_eq!(witness.elements()[1], leaves[2].script);
        assert_eq!(witness.elements()[2], cb.serialize());
    }
}
