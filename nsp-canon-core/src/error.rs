use thiserror::Error;

/// Structural failures that stop processing of a package outright.
///
/// Policy problems (missing content, hash mismatches, ticket defects) are not
/// errors in this sense; they are collected as findings on the package so a
/// single run reports every defect.
#[derive(Debug, Error)]
pub enum NspError {
    /// I/O error while reading or writing package data
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A magic value did not match
    #[error("Bad magic: expected {expected}, found {found}")]
    BadMagic { expected: String, found: String },

    /// The data ended before a structure was complete
    #[error("Truncated {what}: need {needed} bytes, have {available}")]
    Truncated {
        what: &'static str,
        needed: u64,
        available: u64,
    },

    /// The container is malformed
    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    /// A content-metadata record declares an id that is not the hash prefix
    #[error("Content id {content_id} does not match the first 16 bytes of its hash {hash}")]
    HashIdMismatch { content_id: String, hash: String },

    /// Not exactly one content-metadata file was found
    #[error("Expected exactly one content metadata file, found {0}")]
    MetadataCount(usize),

    /// The title kind is not one of the supported digital kinds
    #[error("Unsupported title type: {0}")]
    UnsupportedTitleKind(String),

    /// The key generation is newer than this tool knows about
    #[error("Unsupported key generation {found} (newest supported is {max})")]
    UnsupportedKeyGeneration { found: u8, max: u8 },

    /// A required key is missing from the keyset
    #[error("Missing key: {0}")]
    MissingKey(String),

    /// The sub-container could not be opened or decrypted
    #[error("Cannot open {name}: {reason}")]
    Subcontainer { name: String, reason: String },

    /// Generic structural error with message
    #[error("{0}")]
    Other(String),
}

impl NspError {
    pub fn invalid_format(msg: impl Into<String>) -> Self {
        Self::InvalidFormat(msg.into())
    }

    pub fn bad_magic(expected: &[u8], found: &[u8]) -> Self {
        Self::BadMagic {
            expected: String::from_utf8_lossy(expected).into_owned(),
            found: String::from_utf8_lossy(found).into_owned(),
        }
    }

    pub fn truncated(what: &'static str, needed: u64, available: u64) -> Self {
        Self::Truncated {
            what,
            needed,
            available,
        }
    }

    pub fn subcontainer(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Subcontainer {
            name: name.into(),
            reason: reason.into(),
        }
    }

    pub fn missing_key(name: impl Into<String>) -> Self {
        Self::MissingKey(name.into())
    }

    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }
}
