/// Errors that can occur while loading the title database.
#[derive(Debug, thiserror::Error)]
pub enum TitleDbError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error in {file}: {source}")]
    Json {
        file: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid title database: {0}")]
    InvalidDatabase(String),
}

impl TitleDbError {
    pub fn invalid_database(msg: impl Into<String>) -> Self {
        Self::InvalidDatabase(msg.into())
    }

    pub fn json(file: impl Into<String>, source: serde_json::Error) -> Self {
        Self::Json {
            file: file.into(),
            source,
        }
    }
}
