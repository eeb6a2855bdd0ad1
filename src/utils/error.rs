//! Error Handling Module
//!
//! Defines the error type shared by every stage of the spoof detection pipeline.
//! Uses thiserror for ergonomic error definitions.

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for spoof detection operations
#[derive(Error, Debug)]
pub enum SpoofError {
    /// Error loading or decoding an image
    #[error("Failed to load image at '{0}': {1}")]
    ImageLoad(PathBuf, String),

    /// Error with dataset operations
    #[error("Dataset error: {0}")]
    Dataset(String),

    /// Label that was not present when the encoder was fitted
    #[error("Unseen label '{0}' (known labels: {1:?})")]
    UnseenLabel(String, Vec<String>),

    /// Error with model construction or weight loading
    #[error("Model error: {0}")]
    Model(String),

    /// Error during training
    #[error("Training error: {0}")]
    Training(String),

    /// Error while exporting or archiving artifacts
    #[error("Export error: {0}")]
    Export(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Network download error
    #[error("Download error: {0}")]
    Download(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Path not found
    #[error("Path not found: {0}")]
    PathNotFound(PathBuf),
}

impl From<serde_json::Error> for SpoofError {
    fn from(err: serde_json::Error) -> Self {
        SpoofError::Serialization(err.to_string())
    }
}

impl From<csv::Error> for SpoofError {
    fn from(err: csv::Error) -> Self {
        SpoofError::Serialization(err.to_string())
    }
}

/// Convenience Result type for spoof detection operations
pub type Result<T> = std::result::Result<T, SpoofError>;

/// Extension trait for adding context to errors
pub trait ResultExt<T> {
    /// Wrap the error as a dataset error with a message prefix
    fn context(self, msg: &str) -> Result<T>;

    /// Add context with a closure (lazy evaluation)
    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T>;
}

impl<T, E: std::error::Error> ResultExt<T> for std::result::Result<T, E> {
    fn context(self, msg: &str) -> Result<T> {
        self.map_err(|e| SpoofError::Dataset(format!("{}: {}", msg, e)))
    }

    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T> {
        self.map_err(|e| SpoofError::Dataset(format!("{}: {}", f(), e)))
    }
}

impl<T> ResultExt<T> for Option<T> {
    fn context(self, msg: &str) -> Result<T> {
        self.ok_or_else(|| SpoofError::Dataset(msg.to_string()))
    }

    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T> {
        self.ok_or_else(|| SpoofError::Dataset(f()))
    }
}
