//! Custom error types for mutscan operations.

use thiserror::Error;

/// Result type alias for mutscan operations
pub type Result<T> = std::result::Result<T, MutScanError>;

/// Error type for mutscan operations
#[derive(Error, Debug)]
pub enum MutScanError {
    /// Input file missing, empty, or unreadable
    #[error("ERROR: Input file {path}: {reason}")]
    InputFile {
        /// Path to the offending file
        path: String,
        /// Explanation of the problem
        reason: String,
    },

    /// Underlying I/O failure
    #[error("ERROR: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed alignment record (operator string, reference-diff tag,
    /// missing field, or desynchronization between the two)
    #[error("Error: {reason}")]
    ParseAlignment {
        /// Explanation of the problem
        reason: String,
    },

    /// Malformed parsed-mutations intermediate record
    #[error("Error: {reason}")]
    ParseIntermediate {
        /// Explanation of the problem
        reason: String,
    },

    /// Malformed primer table line
    #[error("Error: {reason}")]
    ParsePrimerTable {
        /// Explanation of the problem
        reason: String,
    },

    /// Internal invariant violated; should not occur for valid inputs
    #[error("Error: invariant violated: {reason}")]
    LogicInvariant {
        /// Explanation of the problem
        reason: String,
    },
}

impl MutScanError {
    /// Shorthand for an alignment parse error with a formatted reason.
    pub fn alignment(reason: impl Into<String>) -> Self {
        MutScanError::ParseAlignment { reason: reason.into() }
    }

    /// Shorthand for an intermediate-record parse error.
    pub fn intermediate(reason: impl Into<String>) -> Self {
        MutScanError::ParseIntermediate { reason: reason.into() }
    }
}
