//! Error types for AtlasDB
//!
//! Provides a unified error type for all operations.

use thiserror::Error;

/// Result type alias using AtlasError
pub type Result<T> = std::result::Result<T, AtlasError>;

/// Unified error type for AtlasDB operations
#[derive(Debug, Error)]
pub enum AtlasError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // On-disk Format Errors
    // -------------------------------------------------------------------------
    #[error("Corruption detected: {0}")]
    Corruption(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    // -------------------------------------------------------------------------
    // Internal Defects
    // -------------------------------------------------------------------------
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    // -------------------------------------------------------------------------
    // Lookup Errors
    // -------------------------------------------------------------------------
    #[error("Key not found")]
    KeyNotFound,

    #[error("Collection not found")]
    CollectionNotFound,

    #[error("Collection already exists")]
    CollectionExists,

    // -------------------------------------------------------------------------
    // Caller Misuse
    // -------------------------------------------------------------------------
    #[error("can't perform a write operation inside a read transaction")]
    WriteInsideReadTx,

    #[error("Transaction failed and was rolled back")]
    TxFailed,

    #[error("Key must not be empty")]
    EmptyKey,

    #[error("Item too large: {size} bytes (max {max})")]
    ItemTooLarge { size: usize, max: usize },

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

impl AtlasError {
    /// Errors after which a write transaction can no longer be trusted.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            AtlasError::Io(_)
                | AtlasError::Corruption(_)
                | AtlasError::Serialization(_)
                | AtlasError::InvariantViolation(_)
        )
    }
}
