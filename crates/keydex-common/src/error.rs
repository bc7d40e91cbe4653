//! Error types for keydex.

use thiserror::Error;

/// Result type alias using KeydexError.
pub type Result<T> = std::result::Result<T, KeydexError>;

/// Errors that can occur in keydex operations.
///
/// Lookups that find nothing are not errors: they return `Ok(None)`.
#[derive(Debug, Error)]
pub enum KeydexError {
    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Storage errors
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Record {position} out of range (store holds {count})")]
    RecordOutOfRange { position: u32, count: u32 },

    #[error("Record size mismatch: expected {expected}, got {actual}")]
    RecordSizeMismatch { expected: usize, actual: usize },

    #[error("Invalid record pointer: {0}")]
    InvalidPointer(u32),

    // Capacity errors
    #[error("Index full: capacity of {capacity} entries reached")]
    IndexFull { capacity: u64 },

    #[error("Record ordinal {0} does not fit in a two-byte uniquing suffix")]
    SuffixOverflow(u32),

    // Corruption errors
    #[error("Index {index} corrupted: {reason}")]
    IndexCorrupted { index: String, reason: String },

    #[error(
        "Index {index} out of order at entry {position}: {current:?} follows {previous:?}"
    )]
    OutOfOrder {
        index: String,
        position: u64,
        previous: String,
        current: String,
    },

    #[error("Index {0} was not completely built")]
    IncompleteIndex(String),

    // Usage errors
    #[error("Invalid state: cannot {operation} while {state}")]
    InvalidState {
        operation: &'static str,
        state: &'static str,
    },

    #[error("Key width mismatch: expected {expected}, got {actual}")]
    KeyWidthMismatch { expected: usize, actual: usize },

    #[error("Key too large: {size} bytes (max {max})")]
    KeyTooLarge { size: usize, max: usize },

    #[error("Duplicate key")]
    DuplicateKey,

    // Configuration errors
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl KeydexError {
    /// Returns true if the error means the index content itself is damaged,
    /// as opposed to an environment or usage failure.
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            KeydexError::IndexCorrupted { .. }
                | KeydexError::OutOfOrder { .. }
                | KeydexError::IncompleteIndex(_)
        )
    }

    /// Returns true if the error is a capacity limit that callers may clamp.
    pub fn is_capacity(&self) -> bool {
        matches!(self, KeydexError::IndexFull { .. })
    }
}
