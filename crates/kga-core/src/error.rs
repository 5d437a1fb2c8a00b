use thiserror::Error;

/// Errors that can occur in kga-core.
#[derive(Error, Debug)]
pub enum Error {
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// Tensor backend error (npy parsing, dtype conversion).
    #[error("Tensor error: {0}")]
    Tensor(#[from] candle_core::Error),
    /// A dataset file exists but does not have the expected layout.
    #[error("Invalid dataset: {0}")]
    InvalidDataset(String),
    /// A required dataset file is missing.
    #[error("Not found: {0}")]
    NotFound(String),
}

/// Result type alias for kga-core.
pub type Result<T> = std::result::Result<T, Error>;
