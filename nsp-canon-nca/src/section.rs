//! Section reading and integrity verification.

use std::io::{self, Read, Seek, SeekFrom};

use nsp_canon_core::NspError;
use sha2::{Digest, Sha256};

use crate::crypto::apply_section_ctr;
use crate::header::{HashInfo, Section};

/// Plaintext view of one section. Positions are relative to the section
/// start.
pub struct SectionReader<'a, R: Read + Seek> {
    inner: &'a mut R,
    /// Absolute offset of the sub-container within `inner`.
    base: u64,
    section: &'a Section,
    key: Option<&'a [u8; 16]>,
    pos: u64,
}

impl<'a, R: Read + Seek> SectionReader<'a, R> {
    /// `key` is the CTR key, or `None` for unencrypted sections.
    pub fn new(
        inner: &'a mut R,
        base: u64,
        section: &'a Section,
        key: Option<&'a [u8; 16]>,
    ) -> Self {
        Self {
            inner,
            base,
            section,
            key,
            pos: 0,
        }
    }

    pub fn len(&self) -> u64 {
        self.section.size()
    }

    pub fn is_empty(&self) -> bool {
        self.section.size() == 0
    }
}

impl<R: Read + Seek> Read for SectionReader<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let remaining = self.section.size().saturating_sub(self.pos);
        let n = (buf.len() as u64).min(remaining) as usize;
        if n == 0 {
            return Ok(0);
        }
        let offset = self.section.start + self.pos;
        self.inner.seek(SeekFrom::Start(self.base + offset))?;
        self.inner.read_exact(&mut buf[..n])?;
        if let Some(key) = self.key {
            apply_section_ctr(&mut buf[..n], key, &self.section.secure_value, offset)
                .map_err(io::Error::other)?;
        }
        self.pos += n as u64;
        Ok(n)
    }
}

impl<R: Read + Seek> Seek for SectionReader<'_, R> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(p) => p as i128,
            SeekFrom::End(d) => self.section.size() as i128 + d as i128,
            SeekFrom::Current(d) => self.pos as i128 + d as i128,
        };
        if target < 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek before section start",
            ));
        }
        self.pos = target as u64;
        Ok(self.pos)
    }
}

/// Read `size` bytes at `offset`, zero-padding the tail to `pad_to`.
fn read_block<R: Read + Seek>(
    r: &mut R,
    offset: u64,
    size: usize,
    pad_to: usize,
) -> Result<Vec<u8>, NspError> {
    let mut buf = vec![0u8; pad_to.max(size)];
    r.seek(SeekFrom::Start(offset))?;
    r.read_exact(&mut buf[..size])
        .map_err(|_| NspError::truncated("section data", size as u64, 0))?;
    Ok(buf)
}

/// Verify a section's hash tree against its master hash.
pub fn verify<R: Read + Seek>(r: &mut R, hash: &HashInfo) -> Result<(), NspError> {
    match hash {
        HashInfo::Sha256 {
            master_hash,
            block_size,
            hash_table_offset,
            hash_table_size,
            data_offset,
            data_size,
        } => {
            let table = read_block(r, *hash_table_offset, *hash_table_size as usize, 0)?;
            if Sha256::digest(&table).as_slice() != master_hash.as_slice() {
                return Err(NspError::invalid_format("hash table does not match master hash"));
            }
            verify_blocks(r, &table, *data_offset, *data_size, *block_size as u64, false)
        }
        HashInfo::Integrity {
            master_hash,
            levels,
        } => {
            let Some(&(first_offset, first_size, first_log2)) = levels.first() else {
                return Err(NspError::invalid_format("integrity tree has no levels"));
            };
            let first = read_block(r, first_offset, first_size as usize, 1usize << first_log2)?;
            if Sha256::digest(&first).as_slice() != master_hash.as_slice() {
                return Err(NspError::invalid_format(
                    "first integrity level does not match master hash",
                ));
            }
            let mut hashes = first;
            for (depth, &(offset, size, log2)) in levels.iter().enumerate().skip(1) {
                verify_blocks(r, &hashes, offset, size, 1u64 << log2, true).map_err(|e| {
                    NspError::invalid_format(format!("integrity level {}: {}", depth + 1, e))
                })?;
                if depth + 1 < levels.len() {
                    hashes = read_block(r, offset, size as usize, 0)?;
                }
            }
            Ok(())
        }
        HashInfo::None => Ok(()),
    }
}

/// Check each `block_size` chunk of a region against consecutive SHA-256
/// entries of `table`. Integrity trees hash zero-padded full blocks.
fn verify_blocks<R: Read + Seek>(
    r: &mut R,
    table: &[u8],
    offset: u64,
    size: u64,
    block_size: u64,
    pad_blocks: bool,
) -> Result<(), NspError> {
    if block_size == 0 {
        return Err(NspError::invalid_format("zero hash block size"));
    }
    let block_count = size.div_ceil(block_size);
    if table.len() < (block_count * 0x20) as usize {
        return Err(NspError::invalid_format("hash table too small for data"));
    }
    for block in 0..block_count {
        let at = block * block_size;
        let len = block_size.min(size - at) as usize;
        let pad = if pad_blocks { block_size as usize } else { 0 };
        let data = read_block(r, offset + at, len, pad)?;
        let expected = &table[(block * 0x20) as usize..(block * 0x20 + 0x20) as usize];
        if Sha256::digest(&data).as_slice() != expected {
            return Err(NspError::invalid_format(format!(
                "block {} hash mismatch",
                block
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
#[path = "tests/section_tests.rs"]
mod tests;
