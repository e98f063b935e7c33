//! Data model shared by the nsp-canon crates: identifiers, the package
//! archive format, tickets, content metadata, certificates, and the
//! container-backend seam.

pub mod backend;
pub mod cert;
pub mod cnmt;
pub mod error;
pub mod ids;
pub mod kinds;
pub mod lookup;
pub mod nacp;
pub mod pfs0;
pub mod progress;
pub mod ticket;
pub mod util;

pub use backend::{
    ContainerBackend, EntrySource, MAX_KEY_GENERATION, SectionInfo, SignatureCheck, Subcontainer,
    SubcontainerHeader, TitleKeyStore,
};
pub use cnmt::{ContentMeta, ContentMetadataEntry};
pub use error::NspError;
pub use ids::{ContentId, RightsId, TitleId};
pub use kinds::{ContentKind, EntryPriority, TitleKind};
pub use lookup::{NullLookup, TitleLookup, TitleRecord};
pub use progress::ValidationProgress;
pub use ticket::Ticket;
