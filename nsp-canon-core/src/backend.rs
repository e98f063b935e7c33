//! The seam between the engine and a container-format implementation.
//!
//! The engine never parses encrypted sub-container headers itself. It asks a
//! [`ContainerBackend`] to open each entry and then queries the returned
//! [`Subcontainer`]. Backend failures surface as [`NspError`] so the
//! engine's error taxonomy does not depend on the implementation.

use std::collections::HashMap;
use std::path::PathBuf;

use crate::NspError;
use crate::ids::{RightsId, TitleId};
use crate::kinds::{DistributionType, SubcontainerType};
use crate::ticket::Ticket;

/// Newest master key revision the engine accepts.
pub const MAX_KEY_GENERATION: u8 = 0x14;

/// Number of section slots in a sub-container header.
pub const MAX_SECTIONS: usize = 4;

/// Location of an entry's bytes inside a file on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntrySource {
    /// Entry name, used in error messages.
    pub name: String,
    pub path: PathBuf,
    /// Absolute offset of the entry's first byte.
    pub offset: u64,
    pub size: u64,
}

/// Decrypted title keys registered for one package.
///
/// Each package gets its own store, so validating several packages never
/// shares key state.
#[derive(Debug, Default, Clone)]
pub struct TitleKeyStore {
    keys: HashMap<RightsId, [u8; 16]>,
}

impl TitleKeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, rights_id: RightsId, key: [u8; 16]) {
        self.keys.insert(rights_id, key);
    }

    pub fn get(&self, rights_id: &RightsId) -> Option<&[u8; 16]> {
        self.keys.get(rights_id)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Result of a signature check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureCheck {
    Valid,
    Invalid,
    /// The key needed to check the signature is not available.
    Unverifiable,
}

impl SignatureCheck {
    pub fn is_valid(self) -> bool {
        self == Self::Valid
    }
}

/// Section encryption declared by the section header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionEncryption {
    None,
    XtsLegacy,
    Ctr,
    /// Patch (BKTR) encryption.
    CtrEx,
    Unknown(u8),
}

impl From<u8> for SectionEncryption {
    fn from(v: u8) -> Self {
        match v {
            0 | 1 => Self::None,
            2 => Self::XtsLegacy,
            3 | 5 => Self::Ctr,
            4 | 6 => Self::CtrEx,
            x => Self::Unknown(x),
        }
    }
}

/// Filesystem format of a section.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionFormat {
    RomFs,
    PartitionFs,
    Unknown(u8),
}

impl From<u8> for SectionFormat {
    fn from(v: u8) -> Self {
        match v {
            0 => Self::RomFs,
            1 => Self::PartitionFs,
            x => Self::Unknown(x),
        }
    }
}

/// One populated section of a sub-container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionInfo {
    pub index: usize,
    pub encryption: SectionEncryption,
    pub format: SectionFormat,
    /// Section is a patch (BKTR) layered over a base title.
    pub is_patch_section: bool,
    /// Section data is only partially present.
    pub is_sparse: bool,
    /// Integrity failure recorded by the validator.
    pub error: Option<String>,
}

/// Decrypted header fields of a sub-container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubcontainerHeader {
    pub content_type: SubcontainerType,
    pub distribution: DistributionType,
    pub key_generation: u8,
    pub program_id: TitleId,
    pub content_size: u64,
    /// `None` when the sub-container uses standard (key area) crypto.
    pub rights_id: Option<RightsId>,
}

impl SubcontainerHeader {
    pub fn has_title_key_crypto(&self) -> bool {
        self.rights_id.is_some()
    }
}

/// An opened sub-container.
pub trait Subcontainer {
    fn header(&self) -> &SubcontainerHeader;

    /// Check the fixed-key header signature.
    fn verify_header_signature(&self) -> SignatureCheck;

    /// Populated sections in slot order.
    fn sections(&self) -> Vec<SectionInfo>;

    /// Check one section's hash tree. `Err` carries the failure text.
    fn verify_section(&mut self, index: usize) -> Result<(), NspError>;

    /// File names in a section's filesystem (root directory only for RomFS).
    fn list_section_files(&mut self, index: usize) -> Result<Vec<String>, NspError>;

    /// Read one file out of a section's filesystem.
    fn read_section_file(&mut self, index: usize, name: &str) -> Result<Vec<u8>, NspError>;

    /// Check the header's second signature against the key in the program's
    /// process descriptor. `Err` means the descriptor could not be read.
    fn verify_process_descriptor(&mut self) -> Result<SignatureCheck, NspError>;

    /// The decrypted header region, as dumped by `--dump-headers`.
    fn raw_header(&self) -> Vec<u8>;
}

/// A container-format implementation holding its own keyset.
pub trait ContainerBackend {
    /// Decrypt a ticket's title key with the key-encryption key of its
    /// rights-id generation.
    fn decrypt_title_key(&self, ticket: &Ticket) -> Result<[u8; 16], NspError>;

    /// Open a sub-container, using `title_keys` for title-key crypto.
    fn open(
        &self,
        source: &EntrySource,
        title_keys: &TitleKeyStore,
    ) -> Result<Box<dyn Subcontainer>, NspError>;

    /// Check a ticket's signature against the signer found in `cert_chain`.
    fn verify_ticket_signature(&self, ticket: &Ticket, cert_chain: &[u8]) -> SignatureCheck;
}
