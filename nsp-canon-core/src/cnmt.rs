//! Content-metadata (CNMT) decoding.
//!
//! The meta sub-container's first section is a PFS0 holding a single
//! `<Type>_<titleid>.cnmt` file with this layout:
//!
//! ```text
//! [0x00] TitleId                     (u64 LE)
//! [0x08] Version                     (u32 LE)
//! [0x0C] Type                        (u8)
//! [0x0D] Reserved                    (u8)
//! [0x0E] ExtendedHeaderSize          (u16 LE)
//! [0x10] ContentCount                (u16 LE)
//! [0x12] ContentMetaCount            (u16 LE)
//! [0x14] Attributes                  (u8, bit 2 = compacted)
//! [0x15] Reserved                    (3 bytes)
//! [0x18] RequiredDownloadSystemVer   (u32 LE)
//! [0x1C] Reserved                    (4 bytes)
//! [0x20] ExtendedHeader              (ExtendedHeaderSize bytes)
//!        ContentRecords              (ContentCount x 0x38)
//!        ContentMetaRecords          (ContentMetaCount x 0x10)
//!        ExtendedData / Digest
//! ```
//!
//! Content record: SHA-256 (0x20), content id (0x10), size (48-bit LE),
//! content type (u8), id offset (u8).

use crate::NspError;
use crate::ids::{ContentId, TitleId};
use crate::kinds::{ContentKind, TitleKind};
use crate::util::{ensure_len, read_array, read_u16_le, read_u32_le, read_u48_le, read_u64_le};

const HEADER_SIZE: usize = 0x20;
const CONTENT_RECORD_SIZE: usize = 0x38;
const META_RECORD_SIZE: usize = 0x10;
const ATTRIBUTE_COMPACTED: u8 = 0x04;

/// One row of the content-metadata descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentMetadataEntry {
    pub content_id: ContentId,
    pub hash: [u8; 32],
    pub size: u64,
    pub kind: ContentKind,
    pub id_offset: u8,
}

impl ContentMetadataEntry {
    /// The entry for the meta sub-container itself. Only the truncated hash
    /// embedded in its file name is known.
    pub fn for_meta(content_id: ContentId, size: u64) -> Self {
        let mut hash = [0u8; 32];
        hash[..16].copy_from_slice(&content_id.0);
        Self {
            content_id,
            hash,
            size,
            kind: ContentKind::Meta,
            id_offset: 0,
        }
    }

    /// Compare a computed SHA-256 against the expected value. For the meta
    /// entry only the first 16 bytes are known.
    pub fn matches_digest(&self, digest: &[u8; 32]) -> bool {
        if self.kind == ContentKind::Meta {
            digest[..16] == self.hash[..16]
        } else {
            *digest == self.hash
        }
    }

    pub fn filename(&self) -> String {
        self.content_id.filename(self.kind == ContentKind::Meta)
    }
}

/// Decoded content-metadata descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentMeta {
    pub title_id: TitleId,
    pub version: u32,
    pub kind: TitleKind,
    pub attributes: u8,
    pub required_download_system_version: u32,
    pub extended_header: Vec<u8>,
    /// Content records in declaration order.
    pub entries: Vec<ContentMetadataEntry>,
    pub content_meta_count: u16,
}

impl ContentMeta {
    /// Decode a `.cnmt` file. A record whose content id is not the prefix of
    /// its hash fails the whole decode.
    pub fn parse(data: &[u8]) -> Result<Self, NspError> {
        ensure_len(data, HEADER_SIZE, "content metadata header")?;

        let title_id = TitleId(read_u64_le(data, 0x00));
        let version = read_u32_le(data, 0x08);
        let raw_kind = data[0x0C];
        let kind = TitleKind::from_u8(raw_kind).ok_or_else(|| {
            NspError::UnsupportedTitleKind(format!("unknown type 0x{:02X}", raw_kind))
        })?;
        let ext_size = read_u16_le(data, 0x0E) as usize;
        let content_count = read_u16_le(data, 0x10) as usize;
        let content_meta_count = read_u16_le(data, 0x12);
        let attributes = data[0x14];
        let required_download_system_version = read_u32_le(data, 0x18);

        let records_at = HEADER_SIZE + ext_size;
        let records_end = records_at + content_count * CONTENT_RECORD_SIZE;
        ensure_len(
            data,
            records_end + content_meta_count as usize * META_RECORD_SIZE,
            "content metadata records",
        )?;

        let mut entries = Vec::with_capacity(content_count);
        for i in 0..content_count {
            let rec = &data[records_at + i * CONTENT_RECORD_SIZE..][..CONTENT_RECORD_SIZE];
            entries.push(parse_record(rec)?);
        }

        Ok(Self {
            title_id,
            version,
            kind,
            attributes,
            required_download_system_version,
            extended_header: data[HEADER_SIZE..records_at].to_vec(),
            entries,
            content_meta_count,
        })
    }

    /// True when the descriptor declares the compacted attribute, meaning
    /// sparse sub-containers are expected.
    pub fn is_compacted(&self) -> bool {
        self.attributes & ATTRIBUTE_COMPACTED != 0
    }

    /// Title id named by the extended header: the update id for an
    /// application, the application id for everything else.
    pub fn related_title_id(&self) -> Option<TitleId> {
        if self.extended_header.len() < 8 {
            return None;
        }
        Some(TitleId(read_u64_le(&self.extended_header, 0)))
    }

    /// Serialize back to the on-disk layout with no content-meta records
    /// and no trailing digest.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = vec![0u8; HEADER_SIZE];
        out[0x00..0x08].copy_from_slice(&self.title_id.0.to_le_bytes());
        out[0x08..0x0C].copy_from_slice(&self.version.to_le_bytes());
        out[0x0C] = self.kind.as_u8();
        out[0x0E..0x10].copy_from_slice(&(self.extended_header.len() as u16).to_le_bytes());
        out[0x10..0x12].copy_from_slice(&(self.entries.len() as u16).to_le_bytes());
        out[0x14] = self.attributes;
        out[0x18..0x1C].copy_from_slice(&self.required_download_system_version.to_le_bytes());
        out.extend_from_slice(&self.extended_header);
        for entry in &self.entries {
            out.extend_from_slice(&entry.hash);
            out.extend_from_slice(&entry.content_id.0);
            out.extend_from_slice(&entry.size.to_le_bytes()[..6]);
            out.push(entry.kind.as_u8());
            out.push(entry.id_offset);
        }
        out.extend_from_slice(&[0u8; 0x20]);
        out
    }
}

fn parse_record(rec: &[u8]) -> Result<ContentMetadataEntry, NspError> {
    let hash: [u8; 32] = read_array(rec, 0x00);
    let content_id = ContentId(read_array(rec, 0x20));
    if content_id != ContentId::from_hash(&hash) {
        return Err(NspError::HashIdMismatch {
            content_id: content_id.to_string(),
            hash: hex::encode(hash),
        });
    }
    let size = read_u48_le(rec, 0x30);
    let raw_kind = rec[0x36];
    let kind = ContentKind::from_u8(raw_kind).ok_or_else(|| {
        NspError::invalid_format(format!(
            "content {} has unknown content type {}",
            content_id, raw_kind
        ))
    })?;
    Ok(ContentMetadataEntry {
        content_id,
        hash,
        size,
        kind,
        id_offset: rec[0x37],
    })
}

#[cfg(test)]
#[path = "tests/cnmt_tests.rs"]
mod tests;
