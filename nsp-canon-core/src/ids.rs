//! Strongly typed identifiers.
//!
//! Packages are keyed by these instead of raw filenames so a malformed name
//! is rejected once, where it is parsed.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::kinds::TitleKind;

/// Suffix of an ordinary sub-container entry.
pub const NCA_SUFFIX: &str = ".nca";
/// Suffix of the content-metadata sub-container entry.
pub const META_NCA_SUFFIX: &str = ".cnmt.nca";
pub const TICKET_SUFFIX: &str = ".tik";
pub const CERT_SUFFIX: &str = ".cert";

/// Error returned when parsing an identifier from text fails.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid {kind}: '{input}'")]
pub struct IdParseError {
    pub kind: &'static str,
    pub input: String,
}

impl IdParseError {
    fn new(kind: &'static str, input: &str) -> Self {
        Self {
            kind,
            input: input.to_string(),
        }
    }
}

fn parse_hex16(kind: &'static str, s: &str) -> Result<[u8; 16], IdParseError> {
    if s.len() != 32 {
        return Err(IdParseError::new(kind, s));
    }
    let mut out = [0u8; 16];
    hex::decode_to_slice(s, &mut out).map_err(|_| IdParseError::new(kind, s))?;
    Ok(out)
}

// ---------------------------------------------------------------------------
// TitleId
// ---------------------------------------------------------------------------

/// 64-bit title identifier, displayed as 16 uppercase hex digits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TitleId(pub u64);

impl TitleId {
    /// Offset between an application id and its update id.
    pub const PATCH_BIT: u64 = 0x800;

    /// The base application this title belongs to.
    pub fn application_id(self, kind: TitleKind) -> TitleId {
        match kind {
            TitleKind::Patch | TitleKind::Delta => TitleId(self.0 & !0xFFF),
            TitleKind::AddOnContent | TitleKind::DataPatch => {
                TitleId((self.0 & !0xFFF).wrapping_sub(0x1000))
            }
            _ => self,
        }
    }

    /// The update title id for this application.
    pub fn patch_id(self) -> TitleId {
        TitleId((self.0 & !0xFFF) | Self::PATCH_BIT)
    }

    /// Title id with the low 12 bits cleared; shared by an application and
    /// its update, and the prefix under which add-ons are grouped.
    pub fn group_prefix(self) -> u64 {
        self.0 & !0xFFF
    }
}

impl fmt::Display for TitleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016X}", self.0)
    }
}

impl FromStr for TitleId {
    type Err = IdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim_start_matches("0x");
        if trimmed.len() != 16 {
            return Err(IdParseError::new("title id", s));
        }
        u64::from_str_radix(trimmed, 16)
            .map(TitleId)
            .map_err(|_| IdParseError::new("title id", s))
    }
}

// ---------------------------------------------------------------------------
// ContentId
// ---------------------------------------------------------------------------

/// 16-byte sub-container id; the first half of the content's SHA-256.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ContentId(pub [u8; 16]);

impl ContentId {
    /// Content id is defined as the truncated SHA-256 of the content.
    pub fn from_hash(hash: &[u8; 32]) -> Self {
        let mut id = [0u8; 16];
        id.copy_from_slice(&hash[..16]);
        Self(id)
    }

    /// Parse the id out of an entry name such as `0123...cdef.nca` or
    /// `0123...cdef.cnmt.nca`. Returns the id and whether it is the meta
    /// sub-container.
    pub fn from_filename(name: &str) -> Result<(Self, bool), IdParseError> {
        let lower = name.to_ascii_lowercase();
        let (stem, is_meta) = if let Some(stem) = lower.strip_suffix(META_NCA_SUFFIX) {
            (stem, true)
        } else if let Some(stem) = lower.strip_suffix(NCA_SUFFIX) {
            (stem, false)
        } else {
            return Err(IdParseError::new("sub-container name", name));
        };
        let bytes = parse_hex16("sub-container name", stem)
            .map_err(|_| IdParseError::new("sub-container name", name))?;
        Ok((Self(bytes), is_meta))
    }

    /// Canonical entry name for this id.
    pub fn filename(&self, is_meta: bool) -> String {
        if is_meta {
            format!("{}{}", self, META_NCA_SUFFIX)
        } else {
            format!("{}{}", self, NCA_SUFFIX)
        }
    }
}

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl FromStr for ContentId {
    type Err = IdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_hex16("content id", s).map(Self)
    }
}

// ---------------------------------------------------------------------------
// RightsId
// ---------------------------------------------------------------------------

/// 16-byte rights id naming the ticket that unlocks title-key crypto.
///
/// Layout: title id (big-endian) in the first 8 bytes, key generation in the
/// last byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RightsId(pub [u8; 16]);

impl RightsId {
    pub const EMPTY_LABEL: &'static str = "EMPTY";

    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|&b| b == 0)
    }

    /// Master key revision encoded in the final byte.
    pub fn key_generation(&self) -> u8 {
        self.0[15]
    }

    pub fn title_id(&self) -> TitleId {
        let mut b = [0u8; 8];
        b.copy_from_slice(&self.0[..8]);
        TitleId(u64::from_be_bytes(b))
    }

    pub fn ticket_filename(&self) -> String {
        format!("{}{}", self, TICKET_SUFFIX)
    }

    pub fn cert_filename(&self) -> String {
        format!("{}{}", self, CERT_SUFFIX)
    }

    /// Display helper that renders `None` as the `EMPTY` sentinel.
    pub fn label(id: Option<&RightsId>) -> String {
        id.map(|r| r.to_string())
            .unwrap_or_else(|| Self::EMPTY_LABEL.to_string())
    }
}

impl fmt::Display for RightsId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl FromStr for RightsId {
    type Err = IdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_hex16("rights id", s).map(Self)
    }
}

#[cfg(test)]
#[path = "tests/ids_tests.rs"]
mod tests;
