//! Store error types

use thiserror::Error;

/// Errors surfaced by the record store and the collections built on it.
///
/// Administrative callers treat these as hard failures; the decision engine
/// logs them and lets the next cycle retry.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Operation referenced a key with no backing record
    #[error("no record found for key: {key}")]
    NotFound { key: String },

    /// Underlying storage read/write failure
    #[error("storage error for record {key}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },

    /// Record exists but could not be decoded
    #[error("corrupted record {key}")]
    Parse {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

pub type Result<T> = std::result::Result<T, StoreError>;
