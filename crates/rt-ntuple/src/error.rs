//! Error types for table I/O and the batch tools.

use thiserror::Error;

/// Errors from reading, transforming or writing event tables.
#[derive(Error, Debug)]
pub enum NtupleError {
    /// Failure inside the ROOT reader.
    #[error(transparent)]
    Root(#[from] rt_root::RootError),

    /// Parquet read/write error.
    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    /// Arrow array or schema error.
    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    /// Filesystem error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML config could not be parsed.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),

    /// JSON config could not be parsed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// XML weight file could not be parsed.
    #[error("XML error: {0}")]
    Xml(#[from] roxmltree::Error),

    /// A config parsed but is not usable.
    #[error("invalid config: {0}")]
    Config(String),

    /// Table shape or column mismatch.
    #[error("table error: {0}")]
    Table(String),

    /// TMVA weight file content not supported or inconsistent.
    #[error("MVA error: {0}")]
    Mva(String),

    /// Unsupported or inconsistent input file.
    #[error("input error: {0}")]
    Input(String),

    /// A condition that stops the whole batch, not just one file.
    #[error("aborted: {0}")]
    Abort(String),
}

impl NtupleError {
    /// Whether this error should stop the remaining files of a batch.
    pub fn is_abort(&self) -> bool {
        matches!(self, NtupleError::Abort(_))
    }
}

/// Result alias for this crate.
pub type Result<T> = std::result::Result<T, NtupleError>;
