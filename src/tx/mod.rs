//! Transaction Module
//!
//! Serialization, BIP-341 signature hashing, witness assembly, signing,
//! and the one-input spend builder.

pub mod builder;
pub mod codec;
pub mod sighash;
pub mod signer;
pub mod witness;

pub use builder::{build_spend, derive, derive_output, derive_report};
pub use codec::{OutPoint, SignedTransaction, TxInput, TxOutput, UnsignedTransaction, Witness};
pub use sighash::{SighashMessage, SighashType, SpendPath, TaprootSighasher};
pub use signer::{KeyPathSpend, ScriptPathSpend, TaprootInputSigner};
pub use witness::{encode_signature, key_path_witness, script_path_witness, ControlBlock};
