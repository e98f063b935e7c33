//! PFS0 (PartitionFS) - the flat archive used as the outer package container
//! and inside sub-container sections.
//!
//! ## Layout
//! ```text
//! [0x00] Magic "PFS0"              (4 bytes)
//! [0x04] FileCount                 (u32 LE)
//! [0x08] StringTableSize           (u32 LE)
//! [0x0C] Reserved (always 0)       (4 bytes)
//! [0x10] EntryTable                (FileCount x 0x18 bytes)
//!        StringTable               (StringTableSize bytes)
//!        FileData
//! ```
//!
//! Entry: offset relative to the data section (u64), size (u64), name offset
//! into the string table (u32), reserved (u32).
//!
//! The canonical writer pads the string table with zero bytes so the whole
//! header is a multiple of [`HEADER_ALIGNMENT`] and lays entries out back to
//! back. [`Pfs0::has_canonical_padding`] checks an existing archive against
//! exactly that layout.

use std::io::{self, Read, Seek, SeekFrom, Write};

use crate::NspError;
use crate::util::{align_up, read_u32_le, read_u64_le};

pub const PFS0_MAGIC: &[u8; 4] = b"PFS0";
const HEADER_SIZE: u64 = 0x10;
const ENTRY_SIZE: u64 = 0x18;
/// The header (including string table) is padded to this boundary.
pub const HEADER_ALIGNMENT: u64 = 0x20;
/// Sanity limit on entry count; real packages hold a handful of entries.
const MAX_ENTRIES: u32 = 0x1000;

/// Metadata for a single file inside a PFS0.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pfs0Entry {
    pub name: String,
    /// Offset relative to the data section.
    pub offset: u64,
    pub size: u64,
    pub name_offset: u32,
}

/// Parsed PFS0 header. File data is not read.
#[derive(Debug, Clone)]
pub struct Pfs0 {
    /// Entries in declaration order.
    pub entries: Vec<Pfs0Entry>,
    /// Absolute offset of the data section from the container start.
    pub data_offset: u64,
    /// The raw string table, padding included.
    pub string_table: Vec<u8>,
}

impl Pfs0 {
    /// Parse a PFS0 header from `r`, which must be positioned at the magic.
    pub fn parse<R: Read + Seek>(r: &mut R) -> Result<Self, NspError> {
        let base = r.stream_position()?;

        let mut header = [0u8; HEADER_SIZE as usize];
        r.read_exact(&mut header)
            .map_err(|_| NspError::truncated("PFS0 header", HEADER_SIZE, 0))?;
        if &header[..4] != PFS0_MAGIC {
            return Err(NspError::bad_magic(PFS0_MAGIC, &header[..4]));
        }
        let file_count = read_u32_le(&header, 0x04);
        let string_table_size = read_u32_le(&header, 0x08);
        if file_count > MAX_ENTRIES {
            return Err(NspError::invalid_format(format!(
                "PFS0 declares {} entries",
                file_count
            )));
        }

        let header_len = HEADER_SIZE + file_count as u64 * ENTRY_SIZE + string_table_size as u64;
        let available = r.seek(SeekFrom::End(0))?.saturating_sub(base);
        if header_len > available {
            return Err(NspError::truncated("PFS0 header", header_len, available));
        }
        r.seek(SeekFrom::Start(base + HEADER_SIZE))?;

        let mut table = vec![0u8; (file_count as u64 * ENTRY_SIZE) as usize];
        r.read_exact(&mut table)?;
        let mut string_table = vec![0u8; string_table_size as usize];
        r.read_exact(&mut string_table)?;

        let data_offset = base + header_len;
        let mut entries = Vec::with_capacity(file_count as usize);
        for i in 0..file_count as usize {
            let at = i * ENTRY_SIZE as usize;
            let offset = read_u64_le(&table, at);
            let size = read_u64_le(&table, at + 0x08);
            let name_offset = read_u32_le(&table, at + 0x10);
            let name = null_string(&string_table, name_offset as usize)?;
            if data_offset
                .checked_add(offset)
                .and_then(|o| o.checked_add(size))
                .is_none()
            {
                return Err(NspError::invalid_format(format!(
                    "PFS0 entry {} extends past the addressable range",
                    name
                )));
            }
            entries.push(Pfs0Entry {
                name,
                offset,
                size,
                name_offset,
            });
        }

        Ok(Self {
            entries,
            data_offset,
            string_table,
        })
    }

    /// Parse a PFS0 held entirely in memory.
    pub fn parse_bytes(data: &[u8]) -> Result<Self, NspError> {
        Self::parse(&mut io::Cursor::new(data))
    }

    /// Absolute offset of an entry's data. [`Pfs0::parse`] rejects entries
    /// whose end does not fit in a `u64`.
    pub fn entry_offset(&self, entry: &Pfs0Entry) -> u64 {
        self.data_offset.saturating_add(entry.offset)
    }

    pub fn find(&self, name: &str) -> Option<&Pfs0Entry> {
        self.entries.iter().find(|e| e.name == name)
    }

    /// Total size covered by the header and all entry data.
    pub fn total_size(&self) -> u64 {
        self.entries
            .iter()
            .map(|e| self.entry_offset(e).saturating_add(e.size))
            .max()
            .unwrap_or(self.data_offset)
    }

    /// Read an entry's full contents. Intended for small entries (tickets,
    /// certificates, metadata).
    pub fn read_entry<R: Read + Seek>(
        &self,
        r: &mut R,
        entry: &Pfs0Entry,
    ) -> Result<Vec<u8>, NspError> {
        r.seek(SeekFrom::Start(self.entry_offset(entry)))?;
        let mut buf = vec![0u8; entry.size as usize];
        r.read_exact(&mut buf)
            .map_err(|_| NspError::truncated("PFS0 entry", entry.size, 0))?;
        Ok(buf)
    }

    /// True when the header and data are laid out exactly the way
    /// [`Pfs0Builder`] writes them: names packed in entry order, zero padding
    /// up to [`HEADER_ALIGNMENT`], and entry data back to back.
    pub fn has_canonical_padding(&self) -> bool {
        let names: Vec<&str> = self.entries.iter().map(|e| e.name.as_str()).collect();
        let expected_table = canonical_string_table(&names);
        if self.string_table != expected_table {
            return false;
        }
        let mut next = 0u64;
        for entry in &self.entries {
            if entry.offset != next {
                return false;
            }
            next += entry.size;
        }
        true
    }
}

/// Extract a null-terminated string from `buf` at `offset`.
fn null_string(buf: &[u8], offset: usize) -> Result<String, NspError> {
    let slice = buf
        .get(offset..)
        .ok_or_else(|| NspError::invalid_format("PFS0 name offset out of range"))?;
    let end = slice
        .iter()
        .position(|&b| b == 0)
        .ok_or_else(|| NspError::invalid_format("unterminated PFS0 entry name"))?;
    Ok(String::from_utf8_lossy(&slice[..end]).into_owned())
}

/// Build the canonical string table for `names`: names packed with NUL
/// terminators, zero padded so the header ends on [`HEADER_ALIGNMENT`].
fn canonical_string_table(names: &[&str]) -> Vec<u8> {
    let mut table = Vec::new();
    for name in names {
        table.extend_from_slice(name.as_bytes());
        table.push(0);
    }
    let fixed = HEADER_SIZE + names.len() as u64 * ENTRY_SIZE;
    let padded = align_up(fixed + table.len() as u64, HEADER_ALIGNMENT) - fixed;
    table.resize(padded as usize, 0);
    table
}

// ---------------------------------------------------------------------------
// Writer
// ---------------------------------------------------------------------------

/// Builds a canonical PFS0 header for a known list of entries.
///
/// The caller writes [`Pfs0Builder::header_bytes`] followed by each entry's
/// data in the order the entries were added.
#[derive(Debug, Default, Clone)]
pub struct Pfs0Builder {
    entries: Vec<(String, u64)>,
}

impl Pfs0Builder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, name: impl Into<String>, size: u64) -> &mut Self {
        self.entries.push((name.into(), size));
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Serialized header including the padded string table.
    pub fn header_bytes(&self) -> Vec<u8> {
        let names: Vec<&str> = self.entries.iter().map(|(n, _)| n.as_str()).collect();
        let string_table = canonical_string_table(&names);

        let mut out = Vec::with_capacity(
            (HEADER_SIZE + self.entries.len() as u64 * ENTRY_SIZE) as usize + string_table.len(),
        );
        out.extend_from_slice(PFS0_MAGIC);
        out.extend_from_slice(&(self.entries.len() as u32).to_le_bytes());
        out.extend_from_slice(&(string_table.len() as u32).to_le_bytes());
        out.extend_from_slice(&0u32.to_le_bytes());

        let mut data_offset = 0u64;
        let mut name_offset = 0u32;
        for (name, size) in &self.entries {
            out.extend_from_slice(&data_offset.to_le_bytes());
            out.extend_from_slice(&size.to_le_bytes());
            out.extend_from_slice(&name_offset.to_le_bytes());
            out.extend_from_slice(&0u32.to_le_bytes());
            data_offset += size;
            name_offset += name.len() as u32 + 1;
        }
        out.extend_from_slice(&string_table);
        out
    }

    /// Total archive size once all entry data is appended.
    pub fn total_size(&self) -> u64 {
        self.header_bytes().len() as u64 + self.entries.iter().map(|(_, s)| s).sum::<u64>()
    }
}

/// Write a complete archive from in-memory entries. Used for small archives
/// (section contents, test fixtures); package rebuilds stream instead.
pub fn write_archive<W: Write>(w: &mut W, entries: &[(&str, &[u8])]) -> io::Result<()> {
    let mut builder = Pfs0Builder::new();
    for (name, data) in entries {
        builder.add(*name, data.len() as u64);
    }
    w.write_all(&builder.header_bytes())?;
    for (_, data) in entries {
        w.write_all(data)?;
    }
    Ok(())
}

#[cfg(test)]
#[path = "tests/pfs0_tests.rs"]
mod tests;
