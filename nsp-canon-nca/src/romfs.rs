//! Minimal RomFS reader: files in the root directory only, which is where
//! control data lives.
//!
//! ```text
//! [0x00] HeaderSize            (u64 LE, 0x50)
//! [0x08] DirHashTable          (offset u64, size u64)
//! [0x18] DirMetaTable          (offset u64, size u64)
//! [0x28] FileHashTable         (offset u64, size u64)
//! [0x38] FileMetaTable         (offset u64, size u64)
//! [0x48] FileDataOffset        (u64 LE)
//! ```
//! Directory entry: parent, sibling, first child dir, first file (u32 each),
//! hash chain, name length, name. File entry: parent, sibling (u32), data
//! offset (u64), data size (u64), hash chain, name length (u32), name.

use std::io::{Read, Seek, SeekFrom};

use nsp_canon_core::NspError;
use nsp_canon_core::util::{read_u32_le, read_u64_le};

const HEADER_SIZE: usize = 0x50;
const NO_ENTRY: u32 = 0xFFFF_FFFF;
const FILE_ENTRY_SIZE: usize = 0x20;

/// A file in the root directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RomFsFile {
    pub name: String,
    /// Offset relative to the RomFS start.
    pub offset: u64,
    pub size: u64,
}

/// List root-directory files of a RomFS starting at `base`.
pub fn root_files<R: Read + Seek>(r: &mut R, base: u64) -> Result<Vec<RomFsFile>, NspError> {
    let mut header = [0u8; HEADER_SIZE];
    r.seek(SeekFrom::Start(base))?;
    r.read_exact(&mut header)?;
    if read_u64_le(&header, 0x00) != HEADER_SIZE as u64 {
        return Err(NspError::invalid_format("bad RomFS header size"));
    }
    let dir_meta_offset = read_u64_le(&header, 0x18);
    let file_meta_offset = read_u64_le(&header, 0x38);
    let file_meta_size = read_u64_le(&header, 0x40);
    let data_offset = read_u64_le(&header, 0x48);

    let mut root = [0u8; 0x18];
    r.seek(SeekFrom::Start(base + dir_meta_offset))?;
    r.read_exact(&mut root)?;

    let mut table = vec![0u8; file_meta_size as usize];
    r.seek(SeekFrom::Start(base + file_meta_offset))?;
    r.read_exact(&mut table)?;

    let mut files = Vec::new();
    let mut next = read_u32_le(&root, 0x0C);
    while next != NO_ENTRY {
        let at = next as usize;
        if at + FILE_ENTRY_SIZE > table.len() || files.len() > table.len() / FILE_ENTRY_SIZE {
            return Err(NspError::invalid_format("RomFS file table is corrupt"));
        }
        let name_len = read_u32_le(&table, at + 0x1C) as usize;
        let name_bytes = table
            .get(at + FILE_ENTRY_SIZE..at + FILE_ENTRY_SIZE + name_len)
            .ok_or_else(|| NspError::invalid_format("RomFS file name out of range"))?;
        files.push(RomFsFile {
            name: String::from_utf8_lossy(name_bytes).into_owned(),
            offset: data_offset + read_u64_le(&table, at + 0x08),
            size: read_u64_le(&table, at + 0x10),
        });
        next = read_u32_le(&table, at + 0x04);
    }
    Ok(files)
}
