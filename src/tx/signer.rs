//! Taproot Input Signer
//!
//! Produces signed witnesses for Taproot inputs.
//!
//! - Key path: the internal private key is tweaked, the sighash is signed with
//!   spend type 0x00, and the signature is checked against the output key.
//! - Script path: the leaf key signs a sighash carrying the leaf extension,
//!   and the witness carries the leaf script and its control block.

use crate::crypto::curve::SecretScalar;
use crate::crypto::schnorr::{SchnorrSig, SchnorrSigner};
use crate::crypto::taproot::{TaprootSpendInfo, TaprootTweaker};
use crate::crypto::taptree::TapLeaf;
use crate::error::{TaprootError, TaprootResult};
use crate::log_debug;
use crate::tx::codec::Witness;
use crate::tx::sighash::{SighashType, SpendPath, TaprootSighasher};
use crate::tx::witness::{encode_signature, key_path_witness, script_path_witness, ControlBlock};

/// Result of signing through the key path
#[derive(Debug, Clone)]
pub struct KeyPathSpend {
    pub sighash: [u8; 32],
    pub signature: SchnorrSig,
    pub witness: Witness,
}

/// Result of signing through a leaf script
#[derive(Debug, Clone)]
pub struct ScriptPathSpend {
    pub sighash: [u8; 32],
    pub signature: SchnorrSig,
    pub leaf_hash: [u8; 32],
    pub control_block: ControlBlock,
    pub witness: Witness,
}

/// Signs individual inputs of a transaction
pub struct TaprootInputSigner {
    tweaker: TaprootTweaker,
    schnorr: SchnorrSigner,
}

impl Default for TaprootInputSigner {
    fn default() -> Self {
        Self::new()
    }
}

impl TaprootInputSigner {
    pub fn new() -> Self {
        Self {
            tweaker: TaprootTweaker::new(),
            schnorr: SchnorrSigner::new(),
        }
    }

    pub fn tweaker(&self) -> &TaprootTweaker {
        &self.tweaker
    }

    pub fn schnorr(&self) -> &SchnorrSigner {
        &self.schnorr
    }

    /// Sign input `input_index` through the key path
    ///
    /// `internal_private_key` must be the key behind `spend_info`'s internal key.
    pub fn sign_key_path(
        &self,
        sighasher: &TaprootSighasher<'_>,
        input_index: usize,
        hash_type: SighashType,
        internal_private_key: &SecretScalar,
        spend_info: &TaprootSpendInfo,
        aux_rand: &[u8; 32],
    ) -> TaprootResult<KeyPathSpend> {
        let internal_key = self.tweaker.curve().public_key(internal_private_key)?;
        if internal_key != *spend_info.internal_key() {
            return Err(TaprootError::InvalidPrivateKey(format!(
                "private key belongs to {}, output commits to {}",
                internal_key.to_hex(),
                spend_info.internal_key().to_hex()
            )));
        }

        let merkle_root = spend_info.merkle_root();
        let tweaked = self
            .tweaker
            .tweak_private_key(internal_private_key, merkle_root.as_ref())?;

        let sighash = sighasher.sighash(input_index, hash_type, &SpendPath::KeyPath)?;
        let signature = self.schnorr.sign(&sighash, &tweaked, aux_rand)?;

        if !self.schnorr.verify(&sighash, &signature, spend_info.output_key())? {
            return Err(TaprootError::SigningFailed(
                "key-path signature does not verify against the output key".to_string(),
            ));
        }

        log_debug!(
            "signer",
            "Signed key-path input",
            input = input_index,
            output_key = spend_info.output_key().to_hex(),
            sighash = hex::encode(sighash)
        );

        Ok(KeyPathSpend {
            sighash,
            signature,
            witness: key_path_witness(&signature, hash_type),
        })
    }

    /// Sign input `input_index` through `leaf`
    ///
    /// The leaf must be `<pubkey> OP_CHECKSIG` with `pubkey` belonging to
    /// `leaf_private_key`; the signature is the only satisfying witness
    /// element.
    #[allow(clippy::too_many_arguments)]
    pub fn sign_script_path(
        &self,
        sighasher: &TaprootSighasher<'_>,
        input_index: usize,
        hash_type: SighashType,
        leaf_private_key: &SecretScalar,
        spend_info: &TaprootSpendInfo,
        leaf: &TapLeaf,
        aux_rand: &[u8; 32],
    ) -> TaprootResult<ScriptPathSpend> {
        let leaf_key = leaf.checksig_key()?;
        let signing_key = self.tweaker.curve().public_key(leaf_private_key)?;
        if signing_key != leaf_key {
            return Err(TaprootError::InvalidPrivateKey(format!(
                "private key belongs to {}, leaf checks {}",
                signing_key.to_hex(),
                leaf_key.to_hex()
            )));
        }

        let control_block = ControlBlock::for_leaf(spend_info, leaf)?;
        control_block.verify(&self.tweaker, spend_info.output_key(), &leaf.script)?;

        let leaf_hash = leaf.hash();
        let sighash = sighasher.sighash(input_index, hash_type, &SpendPath::script(leaf_hash))?;
        let signature = self.schnorr.sign(&sighash, leaf_private_key, aux_rand)?;

        if !self.schnorr.verify(&sighash, &signature, &leaf_key)? {
            return Err(TaprootError::SigningFailed(
                "script-path signature does not verify against the leaf key".to_string(),
            ));
        }

        log_debug!(
            "signer",
            "Signed script-path input",
            input = input_index,
            leaf_hash = hex::encode(leaf_hash),
            depth = control_block.depth(),
            sighash = hex::encode(sighash)
        );

        let witness = script_path_witness(
            vec![encode_signature(&signature, hash_type)],
            leaf,
            &control_block,
        );
        Ok(ScriptPathSpend {
            sighash,
            signature,
            leaf_hash,
            control_block,
            witness,
        })
    }
}
