//! Bitcoin Transaction Codec
//!
//! Consensus serialization of unsigned and segwit-signed transactions.
//!
//! Layout (BIP-144 when witnesses are present):
//! ```text
//! version(4 LE) [marker 0x00, flag 0x01] inputs outputs [witnesses] locktime(4 LE)
//! input  = txid(32, internal order) vout(4 LE) script_sig(var) sequence(4 LE)
//! output = amount(8 LE) script_pubkey(var)
//! ```

use crate::crypto::tagged_hash::sha256d;
use crate::error::{TaprootError, TaprootResult};
use serde::{Deserialize, Serialize};

/// Final sequence, no relative locktime and no RBF signalling
pub const SEQUENCE_FINAL: u32 = 0xffff_ffff;

/// Highest sequence that still signals opt-in replace-by-fee
pub const SEQUENCE_ENABLE_RBF: u32 = 0xffff_fffd;

const WITNESS_SCALE_FACTOR: usize = 4;

// MARK: - Variable-length integers

/// Append a Bitcoin compact-size integer
pub fn write_compact_size(out: &mut Vec<u8>, n: u64) {
    match n {
        0..=0xfc => out.push(n as u8),
        0xfd..=0xffff => {
            out.push(0xfd);
            out.extend_from_slice(&(n as u16).to_le_bytes());
        }
        0x1_0000..=0xffff_ffff => {
            out.push(0xfe);
            out.extend_from_slice(&(n as u32).to_le_bytes());
        }
        _ => {
            out.push(0xff);
            out.extend_from_slice(&n.to_le_bytes());
        }
    }
}

/// Append a length-prefixed byte string
pub fn write_var_bytes(out: &mut Vec<u8>, bytes: &[u8]) {
    write_compact_size(out, bytes.len() as u64);
    out.extend_from_slice(bytes);
}

fn parse_txid(txid_hex: &str) -> TaprootResult<[u8; 32]> {
    let bytes = hex::decode(txid_hex.trim())?;
    bytes.try_into().map_err(|b: Vec<u8>| {
        TaprootError::ParseError(format!("txid must be 32 bytes, got {}", b.len()))
    })
}

// MARK: - Inputs and outputs

/// Reference to a previous transaction output
///
/// `txid` is kept in display order (as shown by explorers and RPC) and
/// reversed on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OutPoint {
    pub txid: [u8; 32],
    pub vout: u32,
}

impl OutPoint {
    pub fn new(txid: [u8; 32], vout: u32) -> Self {
        Self { txid, vout }
    }

    /// Parse from a display-order txid hex string
    pub fn from_hex(txid_hex: &str, vout: u32) -> TaprootResult<Self> {
        Ok(Self {
            txid: parse_txid(txid_hex)?,
            vout,
        })
    }

    pub fn txid_hex(&self) -> String {
        hex::encode(self.txid)
    }

    /// 36-byte wire encoding: reversed txid || vout
    pub fn serialize_into(&self, out: &mut Vec<u8>) {
        let mut txid = self.txid;
        txid.reverse();
        out.extend_from_slice(&txid);
        out.extend_from_slice(&self.vout.to_le_bytes());
    }
}

/// Transaction input (scriptSig is always empty for Taproot spends)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxInput {
    pub previous_output: OutPoint,
    pub sequence: u32,
}

impl TxInput {
    pub fn new(previous_output: OutPoint) -> Self {
        Self {
            previous_output,
            sequence: SEQUENCE_FINAL,
        }
    }

    pub fn with_sequence(mut self, sequence: u32) -> Self {
        self.sequence = sequence;
        self
    }

    fn serialize_into(&self, out: &mut Vec<u8>) {
        self.previous_output.serialize_into(out);
        write_var_bytes(out, &[]);
        out.extend_from_slice(&self.sequence.to_le_bytes());
    }
}

/// Transaction output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOutput {
    /// Value in satoshis
    pub value: u64,
    /// Output script (scriptPubKey)
    pub script_pubkey: Vec<u8>,
}

impl TxOutput {
    pub fn new(value: u64, script_pubkey: Vec<u8>) -> Self {
        Self {
            value,
            script_pubkey,
        }
    }

    /// amount(8 LE) || compact_size(script) || script
    pub fn serialize_into(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.value.to_le_bytes());
        write_var_bytes(out, &self.script_pubkey);
    }

    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(8 + 9 + self.script_pubkey.len());
        self.serialize_into(&mut out);
        out
    }
}

/// Witness stack for one input
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Witness {
    elements: Vec<Vec<u8>>,
}

impl Witness {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_elements(elements: Vec<Vec<u8>>) -> Self {
        Self { elements }
    }

    pub fn push(&mut self, element: impl Into<Vec<u8>>) {
        self.elements.push(element.into());
    }

    pub fn elements(&self) -> &[Vec<u8>] {
        &self.elements
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// compact_size(count) || each element length-prefixed
    pub fn serialize_into(&self, out: &mut Vec<u8>) {
        write_compact_size(out, self.elements.len() as u64);
        for element in &self.elements {
            write_var_bytes(out, element);
        }
    }

    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.serialize_into(&mut out);
        out
    }

    /// Hex of each element, bottom of the stack first
    pub fn to_hex_elements(&self) -> Vec<String> {
        self.elements.iter().map(hex::encode).collect()
    }
}

// MARK: - Transactions

/// Transaction without witness data
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnsignedTransaction {
    pub version: i32,
    pub inputs: Vec<TxInput>,
    pub outputs: Vec<TxOutput>,
    pub locktime: u32,
}

impl UnsignedTransaction {
    pub fn new(inputs: Vec<TxInput>, outputs: Vec<TxOutput>) -> Self {
        Self {
            version: 2,
            inputs,
            outputs,
            locktime: 0,
        }
    }

    fn write_inputs_and_outputs(&self, out: &mut Vec<u8>) {
        write_compact_size(out, self.inputs.len() as u64);
        for input in &self.inputs {
            input.serialize_into(out);
        }
        write_compact_size(out, self.outputs.len() as u64);
        for output in &self.outputs {
            output.serialize_into(out);
        }
    }

    /// Legacy (witness-free) serialization
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&self.version.to_le_bytes());
        self.write_inputs_and_outputs(&mut out);
        out.extend_from_slice(&self.locktime.to_le_bytes());
        out
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.serialize())
    }

    /// Transaction id in display order
    pub fn txid(&self) -> [u8; 32] {
        let mut hash = sha256d(&self.serialize());
        hash.reverse();
        hash
    }

    pub fn txid_hex(&self) -> String {
        hex::encode(self.txid())
    }

    /// Attach one witness per input
    pub fn with_witnesses(self, witnesses: Vec<Witness>) -> TaprootResult<SignedTransaction> {
        if witnesses.len() != self.inputs.len() {
            return Err(TaprootError::MalformedWitness(format!(
                "{} witnesses for {} inputs",
                witnesses.len(),
                self.inputs.len()
            )));
        }
        Ok(SignedTransaction {
            unsigned: self,
            witnesses,
        })
    }
}

/// Transaction with a witness stack per input
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedTransaction {
    unsigned: UnsignedTransaction,
    witnesses: Vec<Witness>,
}

impl SignedTransaction {
    pub fn unsigned(&self) -> &UnsignedTransaction {
        &self.unsigned
    }

    pub fn witnesses(&self) -> &[Witness] {
        &self.witnesses
    }

    fn has_witness(&self) -> bool {
        self.witnesses.iter().any(|w| !w.is_empty())
    }

    /// Full serialization; falls back to legacy form when every witness is empty
    pub fn serialize(&self) -> Vec<u8> {
        if !self.has_witness() {
            return self.unsigned.serialize();
        }

        let mut out = Vec::new();
        out.extend_from_slice(&self.unsigned.version.to_le_bytes());
        out.push(0x00); // marker
        out.push(0x01); // flag
        self.unsigned.write_inputs_and_outputs(&mut out);
        for witness in &self.witnesses {
            witness.serialize_into(&mut out);
        }
        out.extend_from_slice(&self.unsigned.locktime.to_le_bytes());
        out
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.serialize())
    }

    /// Witnesses do not affect the txid
    pub fn txid(&self) -> [u8; 32] {
        self.unsigned.txid()
    }

    pub fn txid_hex(&self) -> String {
        self.unsigned.txid_hex()
    }

    /// Witness transaction id in display order
    pub fn wtxid(&self) -> [u8; 32] {
        let mut hash = sha256d(&self.serialize());
        hash.reverse();
        hash
    }

    /// base_size * 3 + total_size
    pub fn weight(&self) -> usize {
        let base = self.unsigned.serialize().len();
        let total = self.serialize().len();
        base * (WITNESS_SCALE_FACTOR - 1) + total
    }

    /// Virtual size, rounded up
    pub fn vsize(&self) -> usize {
        self.weight().div_ceil(WITNESS_SCALE_FACTOR)
    }
}
