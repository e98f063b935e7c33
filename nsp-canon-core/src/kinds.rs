//! Title, content, and archive-entry classifications.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Title kind as declared by the content-metadata header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TitleKind {
    SystemProgram,
    SystemData,
    SystemUpdate,
    BootImagePackage,
    BootImagePackageSafe,
    Application,
    Patch,
    AddOnContent,
    Delta,
    DataPatch,
}

impl TitleKind {
    pub fn from_u8(value: u8) -> Option<Self> {
        Some(match value {
            0x01 => Self::SystemProgram,
            0x02 => Self::SystemData,
            0x03 => Self::SystemUpdate,
            0x04 => Self::BootImagePackage,
            0x05 => Self::BootImagePackageSafe,
            0x80 => Self::Application,
            0x81 => Self::Patch,
            0x82 => Self::AddOnContent,
            0x83 => Self::Delta,
            0x84 => Self::DataPatch,
            _ => return None,
        })
    }

    pub fn as_u8(self) -> u8 {
        match self {
            Self::SystemProgram => 0x01,
            Self::SystemData => 0x02,
            Self::SystemUpdate => 0x03,
            Self::BootImagePackage => 0x04,
            Self::BootImagePackageSafe => 0x05,
            Self::Application => 0x80,
            Self::Patch => 0x81,
            Self::AddOnContent => 0x82,
            Self::Delta => 0x83,
            Self::DataPatch => 0x84,
        }
    }

    /// The five kinds distributed through the eShop. Everything else is a
    /// system title and is rejected.
    pub fn is_digital(self) -> bool {
        matches!(
            self,
            Self::Application | Self::Patch | Self::AddOnContent | Self::Delta | Self::DataPatch
        )
    }

    /// Updates carry a validly signed ticket that is kept on rebuild.
    pub fn is_update(self) -> bool {
        matches!(self, Self::Patch | Self::DataPatch)
    }

    /// Short tag used in canonical file names.
    pub fn name_tag(self) -> &'static str {
        match self {
            Self::Application => "BASE",
            Self::Patch => "UPD",
            Self::AddOnContent => "DLC",
            Self::DataPatch => "DLCUPD",
            Self::Delta => "DELTA",
            _ => "SYS",
        }
    }
}

impl fmt::Display for TitleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::SystemProgram => "SystemProgram",
            Self::SystemData => "SystemData",
            Self::SystemUpdate => "SystemUpdate",
            Self::BootImagePackage => "BootImagePackage",
            Self::BootImagePackageSafe => "BootImagePackageSafe",
            Self::Application => "Application",
            Self::Patch => "Patch",
            Self::AddOnContent => "AddOnContent",
            Self::Delta => "Delta",
            Self::DataPatch => "DataPatch",
        };
        f.write_str(s)
    }
}

/// Content kind of a content-metadata record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ContentKind {
    Meta,
    Program,
    Data,
    Control,
    HtmlDocument,
    LegalInformation,
    DeltaFragment,
}

impl ContentKind {
    pub fn from_u8(value: u8) -> Option<Self> {
        Some(match value {
            0 => Self::Meta,
            1 => Self::Program,
            2 => Self::Data,
            3 => Self::Control,
            4 => Self::HtmlDocument,
            5 => Self::LegalInformation,
            6 => Self::DeltaFragment,
            _ => return None,
        })
    }

    pub fn as_u8(self) -> u8 {
        match self {
            Self::Meta => 0,
            Self::Program => 1,
            Self::Data => 2,
            Self::Control => 3,
            Self::HtmlDocument => 4,
            Self::LegalInformation => 5,
            Self::DeltaFragment => 6,
        }
    }

    /// Content type a sub-container of this kind declares in its own header.
    pub fn header_type(self) -> SubcontainerType {
        match self {
            Self::Meta => SubcontainerType::Meta,
            Self::Program => SubcontainerType::Program,
            Self::Control => SubcontainerType::Control,
            Self::HtmlDocument | Self::LegalInformation => SubcontainerType::Manual,
            Self::Data | Self::DeltaFragment => SubcontainerType::Data,
        }
    }
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Meta => "Meta",
            Self::Program => "Program",
            Self::Data => "Data",
            Self::Control => "Control",
            Self::HtmlDocument => "HtmlDocument",
            Self::LegalInformation => "LegalInformation",
            Self::DeltaFragment => "DeltaFragment",
        };
        f.write_str(s)
    }
}

/// Content type field in a sub-container header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubcontainerType {
    Program,
    Meta,
    Control,
    Manual,
    Data,
    PublicData,
    Unknown(u8),
}

impl From<u8> for SubcontainerType {
    fn from(v: u8) -> Self {
        match v {
            0 => Self::Program,
            1 => Self::Meta,
            2 => Self::Control,
            3 => Self::Manual,
            4 => Self::Data,
            5 => Self::PublicData,
            x => Self::Unknown(x),
        }
    }
}

/// Distribution type field in a sub-container header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DistributionType {
    Download,
    GameCard,
    Unknown(u8),
}

impl From<u8> for DistributionType {
    fn from(v: u8) -> Self {
        match v {
            0 => Self::Download,
            1 => Self::GameCard,
            x => Self::Unknown(x),
        }
    }
}

/// Canonical sort priority of an archive entry. Entries without a priority
/// are loose files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EntryPriority {
    Nca = 0,
    MetaNca = 1,
    Ticket = 2,
    Certificate = 3,
}

impl EntryPriority {
    /// Classify an entry by its name suffix.
    pub fn classify(name: &str) -> Option<Self> {
        let lower = name.to_ascii_lowercase();
        if lower.ends_with(crate::ids::META_NCA_SUFFIX) {
            Some(Self::MetaNca)
        } else if lower.ends_with(crate::ids::NCA_SUFFIX) {
            Some(Self::Nca)
        } else if lower.ends_with(crate::ids::TICKET_SUFFIX) {
            Some(Self::Ticket)
        } else if lower.ends_with(crate::ids::CERT_SUFFIX) {
            Some(Self::Certificate)
        } else {
            None
        }
    }
}
