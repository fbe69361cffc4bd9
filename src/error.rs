//! Unified error types for the Taproot core
//!
//! Every cryptographic and encoding failure flows through [`TaprootError`].
//! Any error returned while building a spend means "do not broadcast".

use serde::{Deserialize, Serialize};

/// Main error type for all Taproot operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TaprootError {
    #[error("Invalid scalar: {0}")]
    InvalidScalar(String),

    #[error("Invalid tweak: {0}")]
    InvalidTweak(String),

    #[error("Invalid private key: {0}")]
    InvalidPrivateKey(String),

    #[error("Invalid public key: {0}")]
    InvalidPublicKey(String),

    #[error("Invalid signature: {0}")]
    InvalidSignature(String),

    #[error("Malformed script: {0}")]
    MalformedScript(String),

    #[error("Malformed witness: {0}")]
    MalformedWitness(String),

    #[error("Commitment mismatch: {0}")]
    CommitmentMismatch(String),

    #[error("Invalid tree: {0}")]
    InvalidTree(String),

    #[error("Invalid sighash type: 0x{0:02x}")]
    InvalidSighashType(u8),

    #[error("Invalid input index: {0}")]
    InvalidInputIndex(usize),

    #[error("Expected {expected} prevouts, got {got}")]
    PrevoutCountMismatch { expected: usize, got: usize },

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Signing failed: {0}")]
    SigningFailed(String),

    #[error("Parse error: {0}")]
    ParseError(String),
}

impl TaprootError {
    /// Machine-readable category of this error
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidScalar(_) => ErrorCode::InvalidScalar,
            Self::InvalidTweak(_) => ErrorCode::InvalidTweak,
            Self::InvalidPrivateKey(_) => ErrorCode::InvalidPrivateKey,
            Self::InvalidPublicKey(_) => ErrorCode::InvalidPublicKey,
            Self::InvalidSignature(_) => ErrorCode::InvalidSignature,
            Self::MalformedScript(_) => ErrorCode::MalformedScript,
            Self::MalformedWitness(_) => ErrorCode::MalformedWitness,
            Self::CommitmentMismatch(_) => ErrorCode::CommitmentMismatch,
            Self::InvalidTree(_) => ErrorCode::InvalidTree,
            Self::InvalidSighashType(_) => ErrorCode::InvalidSighashType,
            Self::InvalidInputIndex(_)
            | Self::PrevoutCountMismatch { .. }
            | Self::InvalidAmount(_) => ErrorCode::InvalidTransaction,
            Self::SigningFailed(_) => ErrorCode::SigningFailed,
            Self::ParseError(_) => ErrorCode::ParseError,
        }
    }

    /// Serializable summary used by the CLI error output
    pub fn to_report(&self) -> ErrorReport {
        ErrorReport {
            code: self.code(),
            message: self.to_string(),
        }
    }
}

/// Error codes for categorization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    // Key and scalar errors
    InvalidScalar,
    InvalidTweak,
    InvalidPrivateKey,
    InvalidPublicKey,
    InvalidSignature,

    // Structural errors
    MalformedScript,
    MalformedWitness,
    InvalidTree,
    InvalidSighashType,
    InvalidTransaction,

    // Verification errors
    CommitmentMismatch,
    SigningFailed,

    // Input errors
    ParseError,
}

/// Serialized error object
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorReport {
    pub code: ErrorCode,
    pub message: String,
}

/// Result type alias for Taproot operations
pub type TaprootResult<T> = Result<T, TaprootError>;

impl From<hex::FromHexError> for TaprootError {
    fn from(e: hex::FromHexError) -> Self {
        TaprootError::ParseError(format!("hex: {}", e))
    }
}

impl From<serde_json::Error> for TaprootError {
    fn from(e: serde_json::Error) -> Self {
        TaprootError::ParseError(format!("json: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_serialization() {
        let err = TaprootError::CommitmentMismatch("root differs".to_string());
        let json = serde_json::to_string(&err.to_report()).unwrap();
        assert!(json.contains("commitment_mismatch"));
        assert!(json.contains("root differs"));
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(TaprootError::InvalidInputIndex(3).code(), ErrorCode::InvalidTransaction);
        assert_eq!(
            TaprootError::InvalidSighashType(0x04).to_string(),
            "Invalid sighash type: 0x04"
        );

        let parse: TaprootError = hex::decode("zz").unwrap_err().into();
        assert_eq!(parse.code(), ErrorCode::ParseError);
    }
}
