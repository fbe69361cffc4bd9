//! Shared request and report types
//!
//! JSON-facing structures consumed and produced by the spend builder and the
//! CLI. Binary values travel as hex strings.

use crate::crypto::curve::SecretScalar;
use crate::crypto::taptree::TreeShape;
use crate::error::{TaprootError, TaprootResult};
use crate::tx::sighash::SighashType;
use serde::{Deserialize, Serialize};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

// =============================================================================
// Secrets
// =============================================================================

/// Hex-encoded private key as received from the caller; wiped on drop
#[derive(Clone, Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(transparent)]
pub struct SecretHex(String);

impl SecretHex {
    pub fn new(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    /// Parse into a scalar; range errors are reported as `InvalidPrivateKey`
    pub fn to_scalar(&self) -> TaprootResult<SecretScalar> {
        SecretScalar::from_hex(&self.0).map_err(|e| match e {
            TaprootError::InvalidScalar(msg) => TaprootError::InvalidPrivateKey(msg),
            other => other,
        })
    }
}

impl fmt::Debug for SecretHex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretHex([REDACTED])")
    }
}

// =============================================================================
// Requests
// =============================================================================

/// Internal key plus optional script tree
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaprootOutputSpec {
    /// x-only internal public key (hex)
    pub internal_key: String,
    /// Leaf scripts (hex); empty for a key-path-only output
    #[serde(default)]
    pub leaves: Vec<String>,
    /// Tree shape over `leaves`; a balanced tree when omitted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tree: Option<TreeShape>,
}

/// The output being spent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrevoutSpec {
    /// Funding transaction id (display order hex)
    pub txid: String,
    pub vout: u32,
    pub amount_sats: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sequence: Option<u32>,
}

/// A new output
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputSpec {
    /// Destination scriptPubKey (hex)
    pub script_pubkey: String,
    pub amount_sats: u64,
}

/// How to spend
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "path", rename_all = "snake_case")]
pub enum SpendPathRequest {
    /// Sign with the tweaked internal key
    KeyPath { private_key: SecretHex },
    /// Reveal `leaves[leaf_index]` and sign with the leaf key
    ScriptPath {
        leaf_index: usize,
        private_key: SecretHex,
    },
}

/// Everything needed to build and sign a one-input Taproot spend
#[derive(Debug, Clone, Deserialize)]
pub struct SpendRequest {
    #[serde(flatten)]
    pub output: TaprootOutputSpec,
    pub prevout: PrevoutSpec,
    pub outputs: Vec<OutputSpec>,
    pub spend: SpendPathRequest,
    /// Overrides the configured default
    #[serde(default)]
    pub sighash_type: Option<SighashType>,
    #[serde(default)]
    pub locktime: u32,
    /// Fixed 32-byte auxiliary randomness (hex), overrides the configured policy
    #[serde(default)]
    pub aux_rand: Option<String>,
}

// =============================================================================
// Reports
// =============================================================================

/// Per-leaf commitment data
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeafReport {
    pub index: usize,
    pub leaf_hash: String,
    pub depth: usize,
    pub control_block: String,
}

/// Derived output key and commitments
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeriveReport {
    pub internal_key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub merkle_root: Option<String>,
    pub tweak: String,
    pub output_key: String,
    pub parity: bool,
    pub script_pubkey: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub leaves: Vec<LeafReport>,
}

/// Spend path actually used
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpendKind {
    KeyPath,
    ScriptPath,
}

/// Signed transaction plus the intermediate values behind it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpendReport {
    pub txid: String,
    pub tx_hex: String,
    pub weight: usize,
    pub vsize: usize,
    pub fee_sats: u64,
    pub spend_path: SpendKind,
    pub sighash_type: SighashType,
    pub sighash: String,
    pub signature: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub leaf_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub control_block: Option<String>,
    pub witness: Vec<String>,
    pub output: DeriveReport,
}
