//! Error types for the ledger engine

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChainError {
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("Insufficient balance: available {available}, required {required}")]
    InsufficientBalance { available: String, required: String },
    #[error("Invalid signature: {0}")]
    InvalidSignature(String),
    #[error("Duplicate transaction: {0}")]
    DuplicateTransaction(String),
    #[error("Transaction already confirmed: {0}")]
    DuplicateConfirmation(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Key load error: {0}")]
    KeyLoadError(String),
    #[error("Parse error: {0}")]
    ParseError(String),
    #[error("Storage error: {0}")]
    StorageError(String),
    #[error("Mempool is full ({0} transactions)")]
    MempoolFull(usize),
}

impl ChainError {
    /// Stable status code, used as the textual outcome of `sendTransaction`
    /// and in API error bodies.
    pub fn status(&self) -> &'static str {
        match self {
            ChainError::ValidationError(_) => "INVALID_TRANSACTION",
            ChainError::InsufficientBalance { .. } => "INSUFFICIENT_BALANCE",
            ChainError::InvalidSignature(_) => "INVALID_SIGNATURE",
            ChainError::DuplicateTransaction(_) => "DUPLICATE_TRANSACTION",
            ChainError::DuplicateConfirmation(_) => "DUPLICATE_CONFIRMATION",
            ChainError::NotFound(_) => "NOT_FOUND",
            ChainError::KeyLoadError(_) => "KEY_LOAD_ERROR",
            ChainError::ParseError(_) => "PARSE_ERROR",
            ChainError::StorageError(_) => "STORAGE_ERROR",
            ChainError::MempoolFull(_) => "MEMPOOL_FULL",
        }
    }
}

impl From<std::io::Error> for ChainError {
    fn from(err: std::io::Error) -> Self {
        ChainError::StorageError(err.to_string())
    }
}

impl From<rusqlite::Error> for ChainError {
    fn from(err: rusqlite::Error) -> Self {
        ChainError::StorageError(err.to_string())
    }
}

/// Convenience alias used across the crate
pub type Result<T> = std::result::Result<T, ChainError>;
