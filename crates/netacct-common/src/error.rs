//! Error types for netacct
//!
//! Provides a unified error type and domain-specific error variants

use thiserror::Error;

/// Result type alias using NetAcctError
pub type Result<T> = std::result::Result<T, NetAcctError>;

/// Unified error type for netacct operations
#[derive(Debug, Error)]
pub enum NetAcctError {
    // Wire protocol errors
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    // Flow to event conversion errors
    #[error("Conversion error: {0}")]
    Conversion(#[from] ConversionError),

    // Storage errors
    #[error("Storage error: {0}")]
    Storage(String),

    // Network errors
    #[error("Network error: {0}")]
    Network(String),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    // Generic internal error
    #[error("Internal error: {0}")]
    Internal(String),

    // Timeout error
    #[error("Operation timed out: {0}")]
    Timeout(String),
}

/// RADIUS wire format errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Packet truncated: {len} bytes, need at least {needed}")]
    Truncated { len: usize, needed: usize },

    #[error("Length field {declared} does not match datagram of {actual} bytes")]
    LengthMismatch { declared: usize, actual: usize },

    #[error("Invalid attribute {attr_type} with length {len}")]
    InvalidAttribute { attr_type: u8, len: usize },

    #[error("Unsupported packet code: {0}")]
    UnsupportedCode(u8),

    #[error("Request authenticator mismatch")]
    BadAuthenticator,

    #[error("Missing required attribute: {0}")]
    MissingAttribute(&'static str),

    #[error("Invalid MAC address: {0}")]
    InvalidMac(String),
}

/// Errors turning a flow record into a network event
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConversionError {
    #[error("Flow endpoint address is unspecified")]
    UnspecifiedAddress,

    #[error("Flow endpoints mix address families")]
    AddressFamilyMismatch,

    #[error("Invalid network: {0}")]
    InvalidNetwork(String),
}

// Implement From for common external error types
impl From<serde_json::Error> for NetAcctError {
    fn from(err: serde_json::Error) -> Self {
        NetAcctError::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for NetAcctError {
    fn from(err: std::io::Error) -> Self {
        NetAcctError::Network(err.to_string())
    }
}

impl From<anyhow::Error> for NetAcctError {
    fn from(err: anyhow::Error) -> Self {
        NetAcctError::Internal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = NetAcctError::Protocol(ProtocolError::Truncated { len: 4, needed: 20 });
        assert!(err.to_string().contains("4 bytes"));
    }

    #[test]
    fn test_conversion_error_wraps() {
        let err: NetAcctError = ConversionError::AddressFamilyMismatch.into();
        assert!(matches!(err, NetAcctError::Conversion(_)));
        assert!(err.to_string().contains("address families"));
    }
}
