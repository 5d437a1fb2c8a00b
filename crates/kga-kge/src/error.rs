use thiserror::Error;

/// Errors that can occur in kga-kge.
#[derive(Error, Debug)]
pub enum Error {
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// Tensor backend error, including out-of-range embedding lookups.
    #[error("Tensor error: {0}")]
    Tensor(#[from] candle_core::Error),
    /// Dataset or literal loading error.
    #[error(transparent)]
    Data(#[from] kga_core::Error),
    /// JSON serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    /// TOML config parse error.
    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),
    /// Invalid hyperparameters.
    #[error("Invalid config: {0}")]
    Config(String),
    /// Checkpoint missing or incompatible with the model. Never partially applied.
    #[error("Checkpoint error: {0}")]
    Checkpoint(String),
    /// Inputs do not fit the model (e.g. literal model without literals).
    #[error("Validation error: {0}")]
    Validation(String),
}

/// Result type alias for kga-kge.
pub type Result<T> = std::result::Result<T, Error>;
