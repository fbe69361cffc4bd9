//! Taproot Spend Core
//!
//! BIP-340 Schnorr signatures and BIP-341 Taproot outputs over secp256k1.
//!
//! # Architecture
//!
//! This crate provides:
//! - **crypto**: tagged hashes, curve arithmetic, Schnorr signing, script
//!   trees and key tweaking
//! - **tx**: transaction serialization, signature hashing, witnesses,
//!   input signing and the one-input spend builder
//! - **utils**: configuration and redacting log output
//!
//! # Security
//!
//! Private scalars and nonces are wiped with `zeroize` when dropped.
//! Every signature is verified before it is returned; any error means
//! the transaction must not be broadcast.
//!
//! # Example
//!
//! ```rust,ignore
//! use taproot_spend::{build_spend, SigningConfig, SpendRequest};
//!
//! let request: SpendRequest = serde_json::from_str(&json)?;
//! let report = build_spend(&request, &SigningConfig::default())?;
//! println!("{}", report.tx_hex);
//! ```

pub mod crypto;
pub mod error;
pub mod tx;
pub mod types;
pub mod utils;

pub use error::{ErrorCode, ErrorReport, TaprootError, TaprootResult};
pub use types::*;

pub use crypto::{
    SchnorrSig, SchnorrSigner, SecretScalar, TapLeaf, TapTree, TaprootSpendInfo, TaprootTweaker,
    XOnlyPubKey,
};
pub use tx::{build_spend, derive, ControlBlock, SighashType, TaprootInputSigner, TaprootSighasher};
pub use utils::config::{AuxRandPolicy, SigningConfig};
