//! Typed errors for config lookup and value encoding

use thiserror::Error;

/// Errors raised while resolving packet parameters.
///
/// Transport and signing failures are not represented here; they surface as
/// `eyre::Report` from the alloy calls with context attached.
#[derive(Debug, Error)]
pub enum XBridgeError {
    #[error("unknown network '{0}' (expected one of: optimism, base)")]
    UnknownNetwork(String),

    #[error("config section '{0}' is missing")]
    MissingSection(&'static str),

    #[error("config section '{section}' has no entry for network '{network}'")]
    MissingNetworkEntry {
        section: &'static str,
        network: String,
    },

    #[error("config section '{section}' entry '{network}' has no portAddr")]
    MissingPortAddress {
        section: &'static str,
        network: String,
    },

    #[error("invalid address '{value}': {reason}")]
    InvalidAddress { value: String, reason: String },

    #[error("string is {0} bytes; bytes32 strings hold at most 31")]
    StringTooLong(usize),

    #[error("bytes32 string is not null-terminated")]
    MissingNullTerminator,

    #[error("bytes32 string is not valid UTF-8")]
    InvalidUtf8,

    #[error("invalid native amount '{value}': {reason}")]
    InvalidAmount { value: String, reason: String },

    #[error("no private key configured for signer account {0}")]
    MissingSigner(usize),
}
