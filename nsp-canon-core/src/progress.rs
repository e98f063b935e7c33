/// Progress update sent while a package is validated or written.
///
/// Delivered through a `&dyn Fn(ValidationProgress)` observer so a console
/// front end can drive spinners and progress bars.
#[derive(Debug, Clone)]
pub enum ValidationProgress {
    /// Processing of one batch item has started
    Package {
        /// Path of the archive or CDN directory
        path: String,
        /// 1-based index of this item
        current: usize,
        /// Number of items in the batch
        total: usize,
    },

    /// A pipeline phase has started
    Phase {
        /// Name of the current phase
        name: String,
    },

    /// A sub-container is being opened and checked
    Subcontainer {
        /// Entry name
        name: String,
        /// 1-based index of this entry
        current: usize,
        /// Number of sub-containers in the package
        total: usize,
    },

    /// Hashing of one entry has started
    HashStarted {
        name: String,
        total_bytes: u64,
    },

    /// Bytes hashed so far for the current entry
    Hashing {
        bytes_done: u64,
        total_bytes: u64,
    },

    /// Hashing of the current entry finished
    HashFinished { name: String },

    /// Output bytes written so far
    Writing {
        bytes_done: u64,
        total_bytes: u64,
    },
}

impl ValidationProgress {
    pub fn phase(name: impl Into<String>) -> Self {
        Self::Phase { name: name.into() }
    }

    pub fn subcontainer(name: impl Into<String>, current: usize, total: usize) -> Self {
        Self::Subcontainer {
            name: name.into(),
            current,
            total,
        }
    }

    /// Returns the progress fraction (0.0 to 1.0) if calculable.
    pub fn fraction(&self) -> Option<f64> {
        match self {
            Self::Hashing {
                bytes_done,
                total_bytes,
            }
            | Self::Writing {
                bytes_done,
                total_bytes,
            } if *total_bytes > 0 => Some(*bytes_done as f64 / *total_bytes as f64),
            Self::HashFinished { .. } => Some(1.0),
            _ => None,
        }
    }
}
