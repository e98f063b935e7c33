//! Per-package validation state.
//!
//! A [`PackageInfo`] is created when an archive is opened, filled in by each
//! pipeline phase, and read by the output builder and the console front
//! end. Nothing in it outlives the invocation.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::PathBuf;

use nsp_canon_core::kinds::{DistributionType, EntryPriority};
use nsp_canon_core::{
    ContentId, ContentKind, ContentMetadataEntry, RightsId, SectionInfo, SignatureCheck, Ticket,
    TitleId, TitleKeyStore, TitleKind,
};

/// Size unit used for the block count of raw entries.
pub const ENTRY_BLOCK_SIZE: u64 = 0x200;

/// Phases a package moves through, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PipelineStage {
    Opened,
    ContentVerified,
    CryptoVerified,
    NameResolved,
    Decided,
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Opened => "opened",
            Self::ContentVerified => "content verified",
            Self::CryptoVerified => "crypto verified",
            Self::NameResolved => "name resolved",
            Self::Decided => "decided",
        };
        f.write_str(s)
    }
}

/// Groups findings by the check that produced them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FindingCode {
    Structure,
    Content,
    Hash,
    Ticket,
    Certificate,
    Ordering,
    Padding,
    Naming,
}

/// One error or warning recorded against a package.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Finding {
    pub code: FindingCode,
    pub message: String,
}

impl Finding {
    pub fn new(code: FindingCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// Result of hashing one sub-container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashOutcome {
    Match,
    Mismatch,
    NotChecked,
}

/// An entry physically present in the archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEntryInfo {
    pub name: String,
    pub size: u64,
    /// Absolute offset of the entry data within the archive file.
    pub offset: u64,
    /// `None` marks a loose file.
    pub priority: Option<EntryPriority>,
}

impl RawEntryInfo {
    pub fn block_count(&self) -> u64 {
        self.size.div_ceil(ENTRY_BLOCK_SIZE)
    }

    pub fn is_loose(&self) -> bool {
        self.priority.is_none()
    }
}

/// Validation result for one sub-container.
#[derive(Debug, Clone)]
pub struct SubcontainerInfo {
    pub filename: String,
    pub content_id: ContentId,
    pub kind: ContentKind,
    pub header_signature: SignatureCheck,
    /// Only set for `Program` sub-containers.
    pub process_descriptor_valid: Option<bool>,
    pub sections: Vec<SectionInfo>,
    pub hash: HashOutcome,
    pub rights_id: Option<RightsId>,
    pub key_generation: u8,
    pub program_id: TitleId,
    pub distribution: DistributionType,
}

impl SubcontainerInfo {
    pub fn is_sparse(&self) -> bool {
        self.sections.iter().any(|s| s.is_sparse)
    }
}

/// Accumulated state of one validation run.
#[derive(Debug, Clone)]
pub struct PackageInfo {
    pub path: PathBuf,
    pub stage: PipelineStage,

    pub title_id: TitleId,
    pub base_title_id: TitleId,
    pub title_kind: TitleKind,
    pub version: u32,
    pub key_generation: u8,
    pub rights_id: Option<RightsId>,

    pub ticket: Option<Ticket>,
    /// Signature check of the imported ticket's original signature.
    pub ticket_signature: Option<SignatureCheck>,
    /// Decrypted title keys registered for this package only.
    pub title_keys: TitleKeyStore,
    /// Bytes of the certificate entry, if one was present.
    pub certificate: Option<Vec<u8>>,

    /// Display titles keyed by language.
    pub display_titles: BTreeMap<String, String>,

    pub raw_entries: BTreeMap<String, RawEntryInfo>,
    /// Raw entry names in archive order.
    pub entry_order: Vec<String>,
    pub content_entries: BTreeMap<ContentId, ContentMetadataEntry>,
    /// Content ids in the order the metadata declares them.
    pub content_order: Vec<ContentId>,
    pub meta_content_id: ContentId,
    pub subcontainers: BTreeMap<ContentId, SubcontainerInfo>,

    pub errors: BTreeSet<Finding>,
    pub warnings: BTreeSet<Finding>,

    pub can_proceed: bool,
    pub has_title_key_crypto: bool,
    pub has_sparse_subcontainers: bool,
    pub has_loose_files: bool,
    pub is_entry_order_correct: bool,
    pub must_regenerate_ticket: bool,
    pub must_replace_certificate: bool,
    pub is_normalised_ticket_signature: bool,
    pub bad_padding: bool,
    /// Delta fragments declared by the metadata but absent from the archive.
    pub missing_delta_fragments: usize,

    /// Deterministic output name, set once names are resolved.
    pub canonical_name: Option<String>,
}

impl PackageInfo {
    /// Fresh state for an archive whose metadata has just been decoded.
    pub fn new(path: PathBuf, title_id: TitleId, title_kind: TitleKind, version: u32) -> Self {
        Self {
            path,
            stage: PipelineStage::Opened,
            title_id,
            base_title_id: title_id.application_id(title_kind),
            title_kind,
            version,
            key_generation: 0,
            rights_id: None,
            ticket: None,
            ticket_signature: None,
            title_keys: TitleKeyStore::new(),
            certificate: None,
            display_titles: BTreeMap::new(),
            raw_entries: BTreeMap::new(),
            entry_order: Vec::new(),
            content_entries: BTreeMap::new(),
            content_order: Vec::new(),
            meta_content_id: ContentId([0; 16]),
            subcontainers: BTreeMap::new(),
            errors: BTreeSet::new(),
            warnings: BTreeSet::new(),
            can_proceed: true,
            has_title_key_crypto: false,
            has_sparse_subcontainers: false,
            has_loose_files: false,
            is_entry_order_correct: true,
            must_regenerate_ticket: false,
            must_replace_certificate: false,
            is_normalised_ticket_signature: false,
            bad_padding: false,
            missing_delta_fragments: 0,
            canonical_name: None,
        }
    }

    /// Record an error. Any error blocks output.
    pub fn error(&mut self, code: FindingCode, message: impl Into<String>) {
        self.can_proceed = false;
        self.errors.insert(Finding::new(code, message));
    }

    pub fn warn(&mut self, code: FindingCode, message: impl Into<String>) {
        self.warnings.insert(Finding::new(code, message));
    }

    /// Move to `stage`. Stages only advance.
    pub fn advance(&mut self, stage: PipelineStage) {
        if stage > self.stage {
            self.stage = stage;
        }
    }

    pub fn version_string(&self) -> String {
        format!("v{}", self.version)
    }

    /// Rights id as displayed, `EMPTY` when standard crypto is used.
    pub fn rights_id_label(&self) -> String {
        RightsId::label(self.rights_id.as_ref())
    }

    /// File name of the meta sub-container.
    pub fn meta_filename(&self) -> String {
        self.meta_content_id.filename(true)
    }

    /// Raw entry for a content id, matched case-insensitively on its name.
    pub fn raw_entry_for(&self, content_id: &ContentId) -> Option<&RawEntryInfo> {
        let entry = self.content_entries.get(content_id)?;
        let name = entry.filename();
        self.raw_entries
            .get(&name)
            .or_else(|| {
                self.raw_entries
                    .values()
                    .find(|r| r.name.eq_ignore_ascii_case(&name))
            })
    }

    /// Raw entries of a given priority, in archive order.
    pub fn entries_with_priority(&self, priority: EntryPriority) -> Vec<&RawEntryInfo> {
        self.entry_order
            .iter()
            .filter_map(|n| self.raw_entries.get(n))
            .filter(|e| e.priority == Some(priority))
            .collect()
    }

    /// True when the archive already has the canonical layout and a
    /// conversion would reproduce it unchanged.
    pub fn is_standard(&self) -> bool {
        self.can_proceed
            && !self.must_regenerate_ticket
            && !self.has_loose_files
            && self.is_entry_order_correct
            && !self.must_replace_certificate
            && !self.bad_padding
    }
}

#[cfg(test)]
#[path = "tests/package_tests.rs"]
mod tests;
