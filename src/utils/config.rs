//! Signing Configuration
//!
//! Defaults, overridden by an optional JSON file, overridden by environment:
//!
//! | Variable               | Meaning                                   |
//! |------------------------|-------------------------------------------|
//! | `TAPROOT_SIGHASH_TYPE` | default hash type (`all`, `0x83`, ...)    |
//! | `TAPROOT_AUX_RAND`     | `random` or `zero`                        |
//! | `TAPROOT_DEBUG`        | `1`/`true` enables debug logging          |

use crate::crypto::taptree::TAPSCRIPT_LEAF_VERSION;
use crate::error::{TaprootError, TaprootResult};
use crate::tx::sighash::SighashType;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;

pub const ENV_SIGHASH_TYPE: &str = "TAPROOT_SIGHASH_TYPE";
pub const ENV_AUX_RAND: &str = "TAPROOT_AUX_RAND";
pub const ENV_DEBUG: &str = "TAPROOT_DEBUG";

/// Source of BIP-340 auxiliary randomness
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuxRandPolicy {
    /// Fresh bytes from the OS RNG for every signature
    #[default]
    Random,
    /// All-zero aux, signatures are reproducible
    Zero,
}

impl AuxRandPolicy {
    pub fn generate(&self) -> [u8; 32] {
        let mut aux = [0u8; 32];
        if *self == AuxRandPolicy::Random {
            OsRng.fill_bytes(&mut aux);
        }
        aux
    }
}

impl FromStr for AuxRandPolicy {
    type Err = TaprootError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "random" => Ok(Self::Random),
            "zero" => Ok(Self::Zero),
            other => Err(TaprootError::ParseError(format!(
                "unknown aux randomness policy '{}'",
                other
            ))),
        }
    }
}

/// Signing settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SigningConfig {
    /// Hash type used when a request does not name one
    pub sighash_type: SighashType,
    /// Leaf version for scripts given without one
    pub leaf_version: u8,
    pub aux_rand: AuxRandPolicy,
    pub debug_logging: bool,
}

impl Default for SigningConfig {
    fn default() -> Self {
        Self {
            sighash_type: SighashType::Default,
            leaf_version: TAPSCRIPT_LEAF_VERSION,
            aux_rand: AuxRandPolicy::Random,
            debug_logging: false,
        }
    }
}

impl SigningConfig {
    /// Parse a JSON document; missing fields keep their defaults
    pub fn from_json(json: &str) -> TaprootResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Defaults, then `path` if given, then the process environment
    pub fn load(path: Option<&Path>) -> TaprootResult<Self> {
        let mut config = match path {
            Some(path) => {
                let contents = std::fs::read_to_string(path).map_err(|e| {
                    TaprootError::ParseError(format!("cannot read {}: {}", path.display(), e))
                })?;
                Self::from_json(&contents)?
            }
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `TAPROOT_*` overrides from `lookup`
    pub fn apply_overrides<F>(&mut self, lookup: F) -> TaprootResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup(ENV_SIGHASH_TYPE) {
            self.sighash_type = value.parse()?;
        }
        if let Some(value) = lookup(ENV_AUX_RAND) {
            self.aux_rand = value.parse()?;
        }
        if let Some(value) = lookup(ENV_DEBUG) {
            self.debug_logging =
                matches!(value.trim().to_lowercase().as_str(), "1" | "true" | "yes");
        }
        Ok(())
    }

    /// Reject settings that could never produce a valid spend
    pub fn validate(&self) -> TaprootResult<()> {
        if self.leaf_version & 0x01 != 0 {
            return Err(TaprootError::MalformedScript(format!(
                "leaf version 0x{:02x} is odd",
                self.leaf_version
            )));
        }
        SighashType::from_byte(self.sighash_type.to_byte())?;
        Ok(())
    }
}
