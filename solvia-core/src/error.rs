//! Error types for Solvia core.
//!
//! Every error maps to a numeric [`ErrorCode`]:
//! - 1xxx: rejected input (malformed hex, keys, signatures, records)
//! - 6xxx: local faults (encoding)

use thiserror::Error;

/// Result type for Solvia core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Stable numeric reason codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum ErrorCode {
    InvalidHash = 1001,
    InvalidKey = 1002,
    InvalidSignature = 1003,
    InvalidTransaction = 1004,
    InvalidBlock = 1005,

    Serialization = 6001,
}

impl ErrorCode {
    /// Numeric value.
    pub fn code(self) -> u16 {
        self as u16
    }

    /// Rejected input, as opposed to a local fault.
    pub fn is_client_error(self) -> bool {
        (1000..5000).contains(&self.code())
    }

    pub fn is_server_error(self) -> bool {
        !self.is_client_error()
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "E{:04}", self.code())
    }
}

/// Errors raised by core types.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid hash: {0}")]
    InvalidHash(String),

    #[error("malformed hex: {0}")]
    Hex(#[from] hex::FromHexError),

    #[error("invalid public key: {0}")]
    InvalidKey(String),

    #[error("signature verification failed")]
    InvalidSignature,

    #[error("invalid transaction: {0}")]
    InvalidTransaction(String),

    #[error("invalid block: {0}")]
    InvalidBlock(String),

    #[error("encoding failed: {0}")]
    Serialization(#[from] bincode::Error),
}

impl Error {
    /// The reason code of this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            Error::InvalidHash(_) | Error::Hex(_) => ErrorCode::InvalidHash,
            Error::InvalidKey(_) => ErrorCode::InvalidKey,
            Error::InvalidSignature => ErrorCode::InvalidSignature,
            Error::InvalidTransaction(_) => ErrorCode::InvalidTransaction,
            Error::InvalidBlock(_) => ErrorCode::InvalidBlock,
            Error::Serialization(_) => ErrorCode::Serialization,
        }
    }

    pub fn is_client_error(&self) -> bool {
        self.code().is_client_error()
    }

    pub fn is_server_error(&self) -> bool {
        self.code().is_server_error()
    }

    pub fn invalid_hash(message: impl Into<String>) -> Self {
        Error::InvalidHash(message.into())
    }

    pub fn invalid_key(message: impl Into<String>) -> Self {
        Error::InvalidKey(message.into())
    }

    pub fn invalid_signature() -> Self {
        Error::InvalidSignature
    }

    pub fn invalid_transaction(message: impl Into<String>) -> Self {
        Error::InvalidTransaction(message.into())
    }

    pub fn invalid_block(message: impl Into<String>) -> Self {
        Error::InvalidBlock(message.into())
    }
}
