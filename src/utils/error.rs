//! Error types for the lesion classification pipeline.
//!
//! Uses thiserror for ergonomic error definitions.

use thiserror::Error;

/// Main error type for lesionnet operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Manifest file missing, unreadable, or structurally invalid
    /// (per-row problems are skipped with a warning, not raised here).
    #[error("Manifest error: {0}")]
    Manifest(String),

    /// No image payload was supplied with an inference request.
    #[error("No image payload provided")]
    MissingImage,

    /// The supplied image bytes could not be decoded.
    #[error("Failed to decode image: {0}")]
    ImageDecode(String),

    /// Model weight blob could not be saved or loaded.
    #[error("Model error: {0}")]
    Model(String),

    /// Error during a training run.
    #[error("Training error: {0}")]
    Training(String),

    /// Error in the hyperparameter search.
    #[error("Search error: {0}")]
    Search(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether the serving façade should report this as a client error
    /// (bad request) rather than a server fault.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Error::MissingImage | Error::ImageDecode(_))
    }
}

/// Convenience Result type for lesionnet operations.
pub type Result<T> = std::result::Result<T, Error>;
