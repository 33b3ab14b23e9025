//! Error types for ROOT file reading.

use thiserror::Error;

/// Errors that can occur while reading ROOT files.
#[derive(Error, Debug)]
pub enum RootError {
    /// I/O error reading the file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid ROOT file magic bytes.
    #[error("not a ROOT file (bad magic)")]
    BadMagic,

    /// Buffer underflow (tried to read past end).
    #[error("unexpected end of buffer at offset {offset}, need {need} bytes, have {have}")]
    BufferUnderflow {
        /// Current offset in buffer.
        offset: usize,
        /// Bytes requested.
        need: usize,
        /// Bytes remaining.
        have: usize,
    },

    /// Key not found in directory.
    #[error("key not found: {0}")]
    KeyNotFound(String),

    /// Decompression failure.
    #[error("decompression error: {0}")]
    Decompression(String),

    /// Object deserialization error.
    #[error("deserialization error: {0}")]
    Deserialization(String),

    /// Branch not found in tree.
    #[error("branch not found: {0}")]
    BranchNotFound(String),

    /// Branch exists but is not a flat scalar branch.
    #[error("unsupported branch '{name}': {reason}")]
    UnsupportedBranch {
        /// Branch name.
        name: String,
        /// Why the branch cannot be read.
        reason: String,
    },

    /// Tree not found in file.
    #[error("tree not found: {0}")]
    TreeNotFound(String),

    /// Expression parse error.
    #[error("expression error: {0}")]
    Expression(String),

    /// Invalid histogram binning.
    #[error("invalid histogram: {0}")]
    Histogram(String),
}

/// Result alias for ROOT operations.
pub type Result<T> = std::result::Result<T, RootError>;
