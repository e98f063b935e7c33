use std::path::PathBuf;

use nsp_canon_core::NspError;
use thiserror::Error;

/// Failures of the output builder.
#[derive(Debug, Error)]
pub enum OutputError {
    /// The target exists and overwriting was not requested
    #[error("Target already exists: {}", .0.display())]
    Conflict(PathBuf),

    /// A sub-container required for the rebuild is not available
    #[error("Missing required content: {0}")]
    MissingContent(String),

    /// I/O error while writing output
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The package could not be read
    #[error(transparent)]
    Structure(#[from] NspError),
}

impl OutputError {
    pub fn missing(what: impl Into<String>) -> Self {
        Self::MissingContent(what.into())
    }
}
