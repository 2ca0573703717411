//! Error types for the concept memory core.
//!
//! Lookups that miss (unknown id, unknown pattern key) are not errors; they
//! surface as `None` or empty results. This enum only covers the few places
//! where a caller can genuinely fail.

use thiserror::Error;

/// Top-level error type for concept memory operations.
#[derive(Error, Debug)]
pub enum ConceptError {
    /// A vector store slot was addressed past the current capacity.
    #[error("Slot out of bounds: {slot} (capacity: {capacity})")]
    OutOfBounds {
        /// Requested slot.
        slot: u32,
        /// Capacity at the time of the call.
        capacity: u32,
    },

    /// A modality name did not match any known modality.
    #[error("Unknown modality: {0}")]
    InvalidModality(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Generic I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience Result type alias.
pub type Result<T> = std::result::Result<T, ConceptError>;
