//! BIP-341 Signature Hashing
//!
//! sighash = tagged_hash("TapSighash", 0x00 || SigMsg(hash_type, ext_flag) || ext)
//!
//! The aggregate hashes over inputs and outputs are computed once in
//! [`TaprootSighasher::new`] and shared by every input of the transaction.

use crate::crypto::tagged_hash::{sha256, tags, TaggedHasher};
use crate::error::{TaprootError, TaprootResult};
use crate::log_debug;
use crate::tx::codec::{write_var_bytes, TxOutput, UnsignedTransaction};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Code separator position when no OP_CODESEPARATOR was executed
pub const CODESEP_POS_NONE: u32 = 0xffff_ffff;

/// Key version for BIP-342 tapscript
pub const TAPSCRIPT_KEY_VERSION: u8 = 0x00;

const SIGHASH_EPOCH: u8 = 0x00;

// MARK: - Hash types

/// Taproot sighash types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SighashType {
    /// Implicit SIGHASH_ALL, signature stays 64 bytes
    #[default]
    Default = 0x00,
    /// Sign all inputs and all outputs
    All = 0x01,
    /// Sign all inputs, no outputs
    None = 0x02,
    /// Sign all inputs, only output at same index
    Single = 0x03,
    /// SIGHASH_ALL | ANYONECANPAY (only sign own input, all outputs)
    AllAnyoneCanPay = 0x81,
    /// SIGHASH_NONE | ANYONECANPAY
    NoneAnyoneCanPay = 0x82,
    /// SIGHASH_SINGLE | ANYONECANPAY
    SingleAnyoneCanPay = 0x83,
}

impl SighashType {
    pub fn to_byte(&self) -> u8 {
        *self as u8
    }

    pub fn from_byte(b: u8) -> TaprootResult<Self> {
        match b {
            0x00 => Ok(Self::Default),
            0x01 => Ok(Self::All),
            0x02 => Ok(Self::None),
            0x03 => Ok(Self::Single),
            0x81 => Ok(Self::AllAnyoneCanPay),
            0x82 => Ok(Self::NoneAnyoneCanPay),
            0x83 => Ok(Self::SingleAnyoneCanPay),
            _ => Err(TaprootError::InvalidSighashType(b)),
        }
    }

    pub fn is_anyonecanpay(&self) -> bool {
        self.to_byte() & 0x80 != 0
    }

    fn commits_all_outputs(&self) -> bool {
        !matches!(self.to_byte() & 0x03, 0x02 | 0x03)
    }

    fn commits_single_output(&self) -> bool {
        self.to_byte() & 0x03 == 0x03
    }
}

impl fmt::Display for SighashType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Default => "default",
            Self::All => "all",
            Self::None => "none",
            Self::Single => "single",
            Self::AllAnyoneCanPay => "all_anyone_can_pay",
            Self::NoneAnyoneCanPay => "none_anyone_can_pay",
            Self::SingleAnyoneCanPay => "single_anyone_can_pay",
        };
        f.write_str(name)
    }
}

/// Accepts the snake_case name or the byte as `0x..` hex
impl FromStr for SighashType {
    type Err = TaprootError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_lowercase();
        match s.as_str() {
            "default" => Ok(Self::Default),
            "all" => Ok(Self::All),
            "none" => Ok(Self::None),
            "single" => Ok(Self::Single),
            "all_anyone_can_pay" => Ok(Self::AllAnyoneCanPay),
            "none_anyone_can_pay" => Ok(Self::NoneAnyoneCanPay),
            "single_anyone_can_pay" => Ok(Self::SingleAnyoneCanPay),
            other => {
                let byte = other
                    .strip_prefix("0x")
                    .and_then(|h| u8::from_str_radix(h, 16).ok())
                    .ok_or_else(|| {
                        TaprootError::ParseError(format!("unknown sighash type '{}'", other))
                    })?;
                Self::from_byte(byte)
            }
        }
    }
}

// MARK: - Spend path

/// Which branch of the output is being spent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpendPath {
    /// Signature for the tweaked output key
    KeyPath,
    /// Signature inside a revealed leaf script
    ScriptPath {
        leaf_hash: [u8; 32],
        key_version: u8,
        codesep_pos: u32,
    },
}

impl SpendPath {
    /// Script path with tapscript defaults
    pub fn script(leaf_hash: [u8; 32]) -> Self {
        Self::ScriptPath {
            leaf_hash,
            key_version: TAPSCRIPT_KEY_VERSION,
            codesep_pos: CODESEP_POS_NONE,
        }
    }

    /// ext_flag * 2 (annexes are not supported)
    pub fn spend_type(&self) -> u8 {
        match self {
            Self::KeyPath => 0x00,
            Self::ScriptPath { .. } => 0x02,
        }
    }
}

// MARK: - Message

/// The exact bytes hashed under "TapSighash", epoch byte included
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SighashMessage(Vec<u8>);

impl SighashMessage {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }
}

// MARK: - Sighasher

/// Sighash engine for one transaction and its spent outputs
pub struct TaprootSighasher<'a> {
    tx: &'a UnsignedTransaction,
    prevouts: &'a [TxOutput],
    sha_prevouts: [u8; 32],
    sha_amounts: [u8; 32],
    sha_scriptpubkeys: [u8; 32],
    sha_sequences: [u8; 32],
    sha_outputs: [u8; 32],
    hasher: TaggedHasher,
}

impl<'a> TaprootSighasher<'a> {
    /// `prevouts[i]` is the output spent by `tx.inputs[i]`
    pub fn new(tx: &'a UnsignedTransaction, prevouts: &'a [TxOutput]) -> TaprootResult<Self> {
        if prevouts.len() != tx.inputs.len() {
            return Err(TaprootError::PrevoutCountMismatch {
                expected: tx.inputs.len(),
                got: prevouts.len(),
            });
        }

        let mut outpoints = Vec::with_capacity(tx.inputs.len() * 36);
        let mut sequences = Vec::with_capacity(tx.inputs.len() * 4);
        for input in &tx.inputs {
            input.previous_output.serialize_into(&mut outpoints);
            sequences.extend_from_slice(&input.sequence.to_le_bytes());
        }

        let mut amounts = Vec::with_capacity(prevouts.len() * 8);
        let mut scripts = Vec::new();
        for prevout in prevouts {
            amounts.extend_from_slice(&prevout.value.to_le_bytes());
            write_var_bytes(&mut scripts, &prevout.script_pubkey);
        }

        let mut outputs = Vec::new();
        for output in &tx.outputs {
            output.serialize_into(&mut outputs);
        }

        Ok(Self {
            tx,
            prevouts,
            sha_prevouts: sha256(&outpoints),
            sha_amounts: sha256(&amounts),
            sha_scriptpubkeys: sha256(&scripts),
            sha_sequences: sha256(&sequences),
            sha_outputs: sha256(&outputs),
            hasher: TaggedHasher::new(tags::TAP_SIGHASH),
        })
    }

    /// Build the signature message for one input
    pub fn message(
        &self,
        input_index: usize,
        hash_type: SighashType,
        spend_path: &SpendPath,
    ) -> TaprootResult<SighashMessage> {
        let input = self
            .tx
            .inputs
            .get(input_index)
            .ok_or(TaprootError::InvalidInputIndex(input_index))?;
        let prevout = &self.prevouts[input_index];

        let mut msg = Vec::with_capacity(256);

        // Control
        msg.push(SIGHASH_EPOCH);
        msg.push(hash_type.to_byte());

        // Transaction data
        msg.extend_from_slice(&self.tx.version.to_le_bytes());
        msg.extend_from_slice(&self.tx.locktime.to_le_bytes());
        if !hash_type.is_anyonecanpay() {
            msg.extend_from_slice(&self.sha_prevouts);
            msg.extend_from_slice(&self.sha_amounts);
            msg.extend_from_slice(&self.sha_scriptpubkeys);
            msg.extend_from_slice(&self.sha_sequences);
        }
        if hash_type.commits_all_outputs() {
            msg.extend_from_slice(&self.sha_outputs);
        }

        // Data about this input
        msg.push(spend_path.spend_type());
        if hash_type.is_anyonecanpay() {
            input.previous_output.serialize_into(&mut msg);
            msg.extend_from_slice(&prevout.value.to_le_bytes());
            write_var_bytes(&mut msg, &prevout.script_pubkey);
            msg.extend_from_slice(&input.sequence.to_le_bytes());
        } else {
            msg.extend_from_slice(&(input_index as u32).to_le_bytes());
        }

        // Data about this output
        if hash_type.commits_single_output() {
            let output = self
                .tx
                .outputs
                .get(input_index)
                .ok_or(TaprootError::InvalidInputIndex(input_index))?;
            msg.extend_from_slice(&sha256(&output.serialize()));
        }

        // Common signature message extension (BIP-342)
        if let SpendPath::ScriptPath {
            leaf_hash,
            key_version,
            codesep_pos,
        } = spend_path
        {
            msg.extend_from_slice(leaf_hash);
            msg.push(*key_version);
            msg.extend_from_slice(&codesep_pos.to_le_bytes());
        }

        Ok(SighashMessage(msg))
    }

    /// Digest of an already built message
    pub fn hash_message(&self, message: &SighashMessage) -> [u8; 32] {
        self.hasher.hash(message.as_bytes())
    }

    /// The 32-byte digest to sign for one input
    pub fn sighash(
        &self,
        input_index: usize,
        hash_type: SighashType,
        spend_path: &SpendPath,
    ) -> TaprootResult<[u8; 32]> {
        let message = self.message(input_index, hash_type, spend_path)?;
        let sighash = self.hash_message(&message);
        log_debug!(
            "sighash",
            "Computed taproot sighash",
            input = input_index,
            hash_type = hash_type,
            spend_type = spend_path.spend_type(),
            sighash = hex::encode(sighash)
        );
        Ok(sighash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tx::codec::{OutPoint, TxInput};
    use bitcoin::hashes::Hash;
    use bitcoin::sighash::{Prevouts, SighashCache, TapSighashType};

    const ALL_TYPES: [SighashType; 7] = [
        SighashType::Default,
        SighashType::All,
        SighashType::None,
        SighashType::Single,
        SighashType::AllAnyoneCanPay,
        SighashType::NoneAnyoneCanPay,
        SighashType::SingleAnyoneCanPay,
    ];

    fn p2tr(fill: u8) -> Vec<u8> {
        let mut spk = vec![0x51, 0x20];
        spk.extend_from_slice(&[fill; 32]);
        spk
    }

    fn sample() -> (UnsignedTransaction, Vec<TxOutput>) {
        let tx = UnsignedTransaction {
            version: 2,
            inputs: vec![
                TxInput::new(OutPoint::new([0x11; 32], 0)),
                TxInput::new(OutPoint::new([0x22; 32], 3)).with_sequence(0xffff_fffd),
            ],
            outputs: vec![
                TxOutput::new(150_000_000, p2tr(0x33)),
                TxOutput::new(50_000_000, p2tr(0x44)),
                TxOutput::new(10_000, vec![0x6a, 0x01, 0x00]),
            ],
            locktime: 700_000,
        };
        let prevouts = vec![
            TxOutput::new(200_100_000, p2tr(0x55)),
            TxOutput::new(5_000, p2tr(0x66)),
        ];
        (tx, prevouts)
    }

    fn oracle_prevouts(prevouts: &[TxOutput]) -> Vec<bitcoin::TxOut> {
        prevouts
            .iter()
            .map(|p| bitcoin::TxOut {
                value: bitcoin::Amount::from_sat(p.value),
                script_pubkey: bitcoin::ScriptBuf::from_bytes(p.script_pubkey.clone()),
            })
            .collect()
    }

    #[test]
    fn test_sighash_type_parsing() {
        assert_eq!(SighashType::from_byte(0x01).unwrap(), SighashType::All);
        assert_eq!(SighashType::from_byte(0x81).unwrap(), SighashType::AllAnyoneCanPay);
        assert!(matches!(
            SighashType::from_byte(0x04),
            Err(TaprootError::InvalidSighashType(0x04))
        ));
        assert!(!SighashType::All.is_anyonecanpay());
        assert!(SighashType::AllAnyoneCanPay.is_anyonecanpay());

        assert_eq!("single".parse::<SighashType>().unwrap(), SighashType::Single);
        assert_eq!("0x83".parse::<SighashType>().unwrap(), SighashType::SingleAnyoneCanPay);
        assert!("0x84".parse::<SighashType>().is_err());
        assert!("everything".parse::<SighashType>().is_err());
        for t in ALL_TYPES {
            assert_eq!(t.to_string().parse::<SighashType>().unwrap(), t);
        }
    }

    #[test]
    fn test_message_lengths() {
        let (tx, prevouts) = sample();
        let sighasher = TaprootSighasher::new(&tx, &prevouts).unwrap();

        let key = sighasher.message(0, SighashType::Default, &SpendPath::KeyPath).unwrap();
        assert_eq!(key.len(), 1 + 174);

        let script = sighasher
            .message(0, SighashType::Default, &SpendPath::script([7u8; 32]))
            .unwrap();
        assert_eq!(script.len(), 1 + 174 + 37);
        // Identical up to the spend type byte
        assert_eq!(&script.as_bytes()[..170], &key.as_bytes()[..170]);
        assert_eq!(key.as_bytes()[170], 0x00);
        assert_eq!(script.as_bytes()[170], 0x02);
    }

    #[test]
    fn test_key_and_script_path_differ() {
        let (tx, prevouts) = sample();
        let sighasher = TaprootSighasher::new(&tx, &prevouts).unwrap();
        let key = sighasher.sighash(0, SighashType::Default, &SpendPath::KeyPath).unwrap();
        let script = sighasher
            .sighash(0, SighashType::Default, &SpendPath::script([7u8; 32]))
            .unwrap();
        assert_ne!(key, script);
    }

    #[test]
    fn test_matches_bitcoin_sighash_cache() {
        let (tx, prevouts) = sample();
        let sighasher = TaprootSighasher::new(&tx, &prevouts).unwrap();

        let theirs_tx: bitcoin::Transaction =
            bitcoin::consensus::deserialize(&tx.serialize()).unwrap();
        let txouts = oracle_prevouts(&prevouts);
        let mut cache = SighashCache::new(&theirs_tx);
        let leaf_hash = [0x77u8; 32];

        for hash_type in ALL_TYPES {
            let oracle_type = TapSighashType::from_consensus_u8(hash_type.to_byte()).unwrap();
            for index in 0..tx.inputs.len() {
                let ours = sighasher.sighash(index, hash_type, &SpendPath::KeyPath).unwrap();
                let theirs = cache
                    .taproot_key_spend_signature_hash(index, &Prevouts::All(&txouts), oracle_type)
                    .unwrap();
                assert_eq!(ours, theirs.to_byte_array(), "key path {} input {}", hash_type, index);

                let ours = sighasher
                    .sighash(index, hash_type, &SpendPath::script(leaf_hash))
                    .unwrap();
                let theirs = cache
                    .taproot_script_spend_signature_hash(
                        index,
                        &Prevouts::All(&txouts),
                        bitcoin::TapLeafHash::from_byte_array(leaf_hash),
                        oracle_type,
                    )
                    .unwrap();
                assert_eq!(
                    ours,
                    theirs.to_byte_array(),
                    "script path {} input {}",
                    hash_type,
                    index
                );
            }
        }
    }

    #[test]
    fn test_single_without_matching_output() {
        let (mut tx, prevouts) = sample();
        tx.outputs.truncate(1);
        let sighasher = TaprootSighasher::new(&tx, &prevouts).unwrap();

        assert!(sighasher.sighash(0, SighashType::Single, &SpendPath::KeyPath).is_ok());
        assert!(matches!(
            sighasher.sighash(1, SighashType::Single, &SpendPath::KeyPath),
            Err(TaprootError::InvalidInputIndex(1))
        ));
        assert!(sighasher.sighash(1, SighashType::All, &SpendPath::KeyPath).is_ok());
    }

    #[test]
    fn test_input_errors() {
        let (tx, prevouts) = sample();
        assert!(matches!(
            TaprootSighasher::new(&tx, &prevouts[..1]),
            Err(TaprootError::PrevoutCountMismatch { expected: 2, got: 1 })
        ));

        let sighasher = TaprootSighasher::new(&tx, &prevouts).unwrap();
        assert!(matches!(
            sighasher.sighash(2, SighashType::Default, &SpendPath::KeyPath),
            Err(TaprootError::InvalidInputIndex(2))
        ));
    }

    #[test]
    fn test_every_field_is_committed() {
        let (tx, prevouts) = sample();
        let base = TaprootSighasher::new(&tx, &prevouts)
            .unwrap()
            .sighash(0, SighashType::Default, &SpendPath::KeyPath)
            .unwrap();

        let mut variants = Vec::new();
        let mut t = tx.clone();
        t.version = 1;
        variants.push((t, prevouts.clone()));
        let mut t = tx.clone();
        t.locktime += 1;
        variants.push((t, prevouts.clone()));
        let mut t = tx.clone();
        t.inputs[1].sequence = 0;
        variants.push((t, prevouts.clone()));
        let mut t = tx.clone();
        t.outputs[2].value += 1;
        variants.push((t, prevouts.clone()));
        let mut p = prevouts.clone();
        p[1].value += 1;
        variants.push((tx.clone(), p));
        let mut p = prevouts.clone();
        p[0].script_pubkey[5] ^= 1;
        variants.push((tx.clone(), p));

        for (t, p) in &variants {
            let changed = TaprootSighasher::new(t, p)
                .unwrap()
                .sighash(0, SighashType::Default, &SpendPath::KeyPath)
                .unwrap();
            assert_ne!(changed, base);
        }
    }
}
