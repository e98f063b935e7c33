//! Streaming SHA-256 and range copies over archive entries.

use std::io::{Read, Seek, SeekFrom, Write};

use nsp_canon_core::{NspError, ValidationProgress};
use sha2::{Digest, Sha256};

const CHUNK_SIZE: usize = 1024 * 1024; // 1 MiB

/// SHA-256 of `size` bytes at `offset`, reporting progress per chunk.
pub fn hash_range<R: Read + Seek>(
    reader: &mut R,
    name: &str,
    offset: u64,
    size: u64,
    progress: &dyn Fn(ValidationProgress),
) -> Result<[u8; 32], NspError> {
    progress(ValidationProgress::HashStarted {
        name: name.to_string(),
        total_bytes: size,
    });
    reader.seek(SeekFrom::Start(offset))?;

    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut done = 0u64;
    while done < size {
        let want = (size - done).min(CHUNK_SIZE as u64) as usize;
        reader
            .read_exact(&mut buf[..want])
            .map_err(|_| NspError::truncated("entry data", size, done))?;
        hasher.update(&buf[..want]);
        done += want as u64;
        progress(ValidationProgress::Hashing {
            bytes_done: done,
            total_bytes: size,
        });
    }

    progress(ValidationProgress::HashFinished {
        name: name.to_string(),
    });
    Ok(hasher.finalize().into())
}

/// Read a small entry (ticket, certificate) fully into memory.
pub fn read_range<R: Read + Seek>(
    reader: &mut R,
    offset: u64,
    size: u64,
) -> Result<Vec<u8>, NspError> {
    reader.seek(SeekFrom::Start(offset))?;
    let mut buf = vec![0u8; size as usize];
    reader
        .read_exact(&mut buf)
        .map_err(|_| NspError::truncated("entry data", size, 0))?;
    Ok(buf)
}

/// Running byte count across several copies into one output.
#[derive(Debug, Clone, Copy)]
pub struct CopyProgress {
    pub done: u64,
    pub total: u64,
}

/// Copy `size` bytes at `offset` from `reader` to `writer`.
pub fn copy_range<R: Read + Seek, W: Write>(
    reader: &mut R,
    writer: &mut W,
    offset: u64,
    size: u64,
    state: &mut CopyProgress,
    progress: &dyn Fn(ValidationProgress),
) -> Result<(), NspError> {
    reader.seek(SeekFrom::Start(offset))?;
    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut left = size;
    while left > 0 {
        let want = left.min(CHUNK_SIZE as u64) as usize;
        reader
            .read_exact(&mut buf[..want])
            .map_err(|_| NspError::truncated("entry data", size, size - left))?;
        writer.write_all(&buf[..want])?;
        left -= want as u64;
        state.done += want as u64;
        progress(ValidationProgress::Writing {
            bytes_done: state.done,
            total_bytes: state.total,
        });
    }
    Ok(())
}
