//! Utilities Module
//!
//! Configuration loading and structured logging.

pub mod config;
pub mod logging;

pub use config::{AuxRandPolicy, SigningConfig};
