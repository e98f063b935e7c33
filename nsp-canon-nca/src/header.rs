//! Decrypted sub-container header parsing.
//!
//! ## Header layout
//! ```text
//! [0x000] RSA-2048 sig[0]  (0x100) - fixed key, over [0x200..0x400]
//! [0x100] RSA-2048 sig[1]  (0x100) - process descriptor key
//! [0x200] Magic            NCA3/NCA2
//! [0x204] DistributionType (u8)
//! [0x205] ContentType      (u8)
//! [0x206] KeyGenerationOld (u8)
//! [0x207] KeyAreaKeyIndex  (u8)
//! [0x208] ContentSize      (u64 LE)
//! [0x210] ProgramId        (u64 LE)
//! [0x218] ContentIndex     (u32 LE)
//! [0x21C] SdkAddonVersion  (u32 LE)
//! [0x220] KeyGeneration    (u8)
//! [0x221] SignatureKeyGen  (u8)
//! [0x230] RightsId         (0x10)
//! [0x240] SectionTable     (4 x 0x10: start block u32, end block u32)
//! [0x280] SectionHashes    (4 x SHA-256 of each section header)
//! [0x300] EncryptedKeyArea (4 x 0x10)
//! [0x400] SectionHeaders   (4 x 0x200)
//! ```
//!
//! ## Section header layout
//! ```text
//! [0x000] Version          (u16 LE)
//! [0x002] FsType           (u8: 0 RomFS, 1 PartitionFS)
//! [0x003] HashType         (u8: 2 HierarchicalSha256, 3 HierarchicalIntegrity)
//! [0x004] EncryptionType   (u8)
//! [0x008] HashData         (0xF8)
//! [0x100] PatchInfo        (0x40; indirect table size at +0x08)
//! [0x140] SecureValue      (8)
//! [0x148] SparseInfo       (0x30; bucket table size at +0x08)
//! ```

use nsp_canon_core::backend::{SectionEncryption, SectionFormat, SectionInfo};
use nsp_canon_core::kinds::{DistributionType, SubcontainerType};
use nsp_canon_core::util::{read_array, read_u32_le, read_u64_le};
use nsp_canon_core::{NspError, RightsId, SubcontainerHeader, TitleId};
use sha2::{Digest, Sha256};

use crate::crypto::HEADER_REGION_SIZE;

/// Media unit of the section table.
pub const MEDIA_BLOCK: u64 = 0x200;
const SECTION_HEADER_SIZE: usize = 0x200;

/// Integrity scheme of a section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HashInfo {
    /// Two-level SHA-256 table used by PartitionFS sections.
    Sha256 {
        master_hash: [u8; 32],
        block_size: u32,
        hash_table_offset: u64,
        hash_table_size: u64,
        data_offset: u64,
        data_size: u64,
    },
    /// IVFC tree used by RomFS sections. Levels are (offset, size,
    /// log2 block size), the last level being the filesystem itself.
    Integrity {
        master_hash: [u8; 32],
        levels: Vec<(u64, u64, u32)>,
    },
    None,
}

impl HashInfo {
    /// Offset and size of the filesystem within the section.
    pub fn data_region(&self) -> Option<(u64, u64)> {
        match self {
            Self::Sha256 {
                data_offset,
                data_size,
                ..
            } => Some((*data_offset, *data_size)),
            Self::Integrity { levels, .. } => levels.last().map(|&(o, s, _)| (o, s)),
            Self::None => None,
        }
    }
}

/// One section slot with its parsed header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    pub index: usize,
    /// Byte offset of the section within the sub-container.
    pub start: u64,
    pub end: u64,
    pub format: SectionFormat,
    pub encryption: SectionEncryption,
    pub hash: HashInfo,
    pub secure_value: [u8; 8],
    pub is_patch: bool,
    pub is_sparse: bool,
    /// The stored section header hash matches the header bytes.
    pub header_hash_ok: bool,
}

impl Section {
    pub fn size(&self) -> u64 {
        self.end - self.start
    }

    pub fn info(&self) -> SectionInfo {
        SectionInfo {
            index: self.index,
            encryption: self.encryption,
            format: self.format,
            is_patch_section: self.is_patch,
            is_sparse: self.is_sparse,
            error: None,
        }
    }
}

/// Parsed sub-container header.
#[derive(Debug, Clone)]
pub struct NcaHeader {
    pub version: u8,
    pub summary: SubcontainerHeader,
    pub key_area_index: u8,
    pub signature_key_generation: u8,
    pub encrypted_key_area: [[u8; 16]; 4],
    pub sections: Vec<Section>,
    /// The decrypted 0xC00-byte region.
    pub raw: Vec<u8>,
}

impl NcaHeader {
    /// Parse a decrypted header region.
    pub fn parse(raw: Vec<u8>) -> Result<Self, NspError> {
        if raw.len() < HEADER_REGION_SIZE {
            return Err(NspError::truncated(
                "sub-container header",
                HEADER_REGION_SIZE as u64,
                raw.len() as u64,
            ));
        }
        let version = match &raw[0x200..0x204] {
            b"NCA3" => 3,
            b"NCA2" => 2,
            found => return Err(NspError::bad_magic(b"NCA3", found)),
        };

        let key_generation = raw[0x206].max(raw[0x220]);
        let rights_id = RightsId(read_array(&raw, 0x230));
        let summary = SubcontainerHeader {
            content_type: SubcontainerType::from(raw[0x205]),
            distribution: DistributionType::from(raw[0x204]),
            key_generation,
            program_id: TitleId(read_u64_le(&raw, 0x210)),
            content_size: read_u64_le(&raw, 0x208),
            rights_id: (!rights_id.is_zero()).then_some(rights_id),
        };

        let mut encrypted_key_area = [[0u8; 16]; 4];
        for (i, key) in encrypted_key_area.iter_mut().enumerate() {
            *key = read_array(&raw, 0x300 + i * 0x10);
        }

        let mut sections = Vec::new();
        for index in 0..4 {
            let entry = 0x240 + index * 0x10;
            let start = read_u32_le(&raw, entry) as u64 * MEDIA_BLOCK;
            let end = read_u32_le(&raw, entry + 4) as u64 * MEDIA_BLOCK;
            if start == 0 && end == 0 {
                continue;
            }
            if end < start {
                return Err(NspError::invalid_format(format!(
                    "section {} ends before it starts",
                    index
                )));
            }
            let at = 0x400 + index * SECTION_HEADER_SIZE;
            let fs = &raw[at..at + SECTION_HEADER_SIZE];
            let stored: [u8; 32] = read_array(&raw, 0x280 + index * 0x20);
            let header_hash_ok = Sha256::digest(fs).as_slice() == stored.as_slice();
            sections.push(parse_section(index, start, end, fs, header_hash_ok));
        }

        Ok(Self {
            version,
            summary,
            key_area_index: raw[0x207],
            signature_key_generation: raw[0x221],
            encrypted_key_area,
            sections,
            raw,
        })
    }

    /// The region covered by both header signatures.
    pub fn signed_region(&self) -> &[u8] {
        &self.raw[0x200..0x400]
    }

    pub fn fixed_key_signature(&self) -> &[u8] {
        &self.raw[0x000..0x100]
    }

    pub fn descriptor_signature(&self) -> &[u8] {
        &self.raw[0x100..0x200]
    }

    pub fn section(&self, index: usize) -> Option<&Section> {
        self.sections.iter().find(|s| s.index == index)
    }
}

fn parse_section(index: usize, start: u64, end: u64, fs: &[u8], header_hash_ok: bool) -> Section {
    let hash_data = &fs[0x08..0x100];
    let hash = match fs[0x03] {
        2 => HashInfo::Sha256 {
            master_hash: read_array(hash_data, 0x00),
            block_size: read_u32_le(hash_data, 0x20),
            hash_table_offset: read_u64_le(hash_data, 0x28),
            hash_table_size: read_u64_le(hash_data, 0x30),
            data_offset: read_u64_le(hash_data, 0x38),
            data_size: read_u64_le(hash_data, 0x40),
        },
        3 => {
            // IVFC: "IVFC", version, master hash size, level count, then
            // six 0x18-byte level records; master hash at +0xC0.
            let level_count = read_u32_le(hash_data, 0x0C).saturating_sub(1).min(6) as usize;
            let levels = (0..level_count)
                .map(|i| {
                    let at = 0x10 + i * 0x18;
                    (
                        read_u64_le(hash_data, at),
                        read_u64_le(hash_data, at + 8),
                        read_u32_le(hash_data, at + 0x10),
                    )
                })
                .collect();
            HashInfo::Integrity {
                master_hash: read_array(hash_data, 0xC0),
                levels,
            }
        }
        _ => HashInfo::None,
    };

    Section {
        index,
        start,
        end,
        format: SectionFormat::from(fs[0x02]),
        encryption: SectionEncryption::from(fs[0x04]),
        hash,
        secure_value: read_array(fs, 0x140),
        is_patch: read_u64_le(fs, 0x108) != 0,
        is_sparse: read_u64_le(fs, 0x150) != 0,
        header_hash_ok,
    }
}
