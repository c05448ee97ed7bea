//! Error types for EngramDB
//!
//! Provides the error hierarchy shared by all memory-engine operations.

use thiserror::Error;

/// The main error type for EngramDB operations
#[derive(Error, Debug)]
pub enum Error {
    // ========== Storage Errors ==========
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Collection not found: {0}")]
    CollectionNotFound(String),

    #[error("Record not found: {0}")]
    RecordNotFound(String),

    #[error("Data corruption detected: {0}")]
    DataCorruption(String),

    // ========== Connection Errors ==========
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Circuit breaker open: {0}")]
    CircuitOpen(String),

    #[error("Operation timed out: {0}")]
    Timeout(String),

    // ========== Data Errors ==========
    #[error("Vector dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    // ========== Memory Errors ==========
    #[error("Memory operation error: {0}")]
    MemoryOperation(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Generation error: {0}")]
    Generation(String),

    // ========== IO Errors ==========
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // ========== Configuration Errors ==========
    #[error("Configuration error: {0}")]
    Configuration(String),

    // ========== Internal Errors ==========
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for EngramDB operations
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Returns true if this error is transient and the operation can be retried
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::Connection(_)
                | Error::CircuitOpen(_)
                | Error::Timeout(_)
                | Error::RecordNotFound(_)
                | Error::CollectionNotFound(_)
        )
    }

    /// Returns true if this error indicates data corruption
    pub fn is_corruption(&self) -> bool {
        matches!(self, Error::DataCorruption(_))
    }

    /// Returns true if this error is a configuration problem that cannot be
    /// fixed by retrying
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Error::Configuration(_) | Error::DimensionMismatch { .. }
        )
    }
}
