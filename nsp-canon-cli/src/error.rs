use nsp_canon_lib::EXIT_FAILURE;
use thiserror::Error;

/// Errors that stop the CLI before any item is processed.
#[derive(Debug, Error)]
pub(crate) enum CliError {
    /// I/O error
    #[error("{0}")]
    Io(#[from] std::io::Error),

    /// Keyset could not be loaded
    #[error("Keys error: {0}")]
    Keys(String),

    /// Title database could not be loaded
    #[error("Title database error: {0}")]
    TitleDb(String),

    /// Reference certificate could not be loaded
    #[error("Certificate error: {0}")]
    Certificate(String),

    /// Configuration error
    #[error("Config error: {0}")]
    Config(String),
}

impl CliError {
    pub(crate) fn keys(msg: impl Into<String>) -> Self {
        Self::Keys(msg.into())
    }

    pub(crate) fn titledb(msg: impl Into<String>) -> Self {
        Self::TitleDb(msg.into())
    }

    pub(crate) fn certificate(msg: impl Into<String>) -> Self {
        Self::Certificate(msg.into())
    }

    pub(crate) fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Setup failures are plain errors; conflicts only arise per item.
    pub(crate) fn exit_code(&self) -> i32 {
        EXIT_FAILURE
    }
}
