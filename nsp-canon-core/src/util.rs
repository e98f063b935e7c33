//! Byte helpers shared by the format modules.
//!
//! Readers take a slice and an offset; callers check the slice length once up
//! front (see [`ensure_len`]) instead of at every field.

use crate::NspError;

pub fn read_u16_le(buf: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([buf[offset], buf[offset + 1]])
}

pub fn read_u32_le(buf: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        buf[offset],
        buf[offset + 1],
        buf[offset + 2],
        buf[offset + 3],
    ])
}

pub fn read_u32_be(buf: &[u8], offset: usize) -> u32 {
    u32::from_be_bytes([
        buf[offset],
        buf[offset + 1],
        buf[offset + 2],
        buf[offset + 3],
    ])
}

pub fn read_u64_le(buf: &[u8], offset: usize) -> u64 {
    let mut b = [0u8; 8];
    b.copy_from_slice(&buf[offset..offset + 8]);
    u64::from_le_bytes(b)
}

/// Read a 48-bit little-endian size field.
pub fn read_u48_le(buf: &[u8], offset: usize) -> u64 {
    let mut b = [0u8; 8];
    b[..6].copy_from_slice(&buf[offset..offset + 6]);
    u64::from_le_bytes(b)
}

pub fn read_array<const N: usize>(buf: &[u8], offset: usize) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&buf[offset..offset + N]);
    out
}

/// Read a null-terminated ASCII string from a byte slice.
pub fn read_ascii(buf: &[u8]) -> String {
    buf.iter()
        .take_while(|&&b| b != 0)
        .filter(|&&b| (0x20..0x7F).contains(&b))
        .map(|&b| b as char)
        .collect()
}

/// Fail with [`NspError::Truncated`] unless `buf` holds at least `needed` bytes.
pub fn ensure_len(buf: &[u8], needed: usize, what: &'static str) -> Result<(), NspError> {
    if buf.len() < needed {
        return Err(NspError::truncated(what, needed as u64, buf.len() as u64));
    }
    Ok(())
}

/// Round `value` up to the next multiple of `align` (a power of two).
pub fn align_up(value: u64, align: u64) -> u64 {
    (value + align - 1) & !(align - 1)
}

/// Format a byte count as a human-readable size string.
pub fn format_bytes_approx(bytes: u64) -> String {
    if bytes >= 1024 * 1024 * 1024 {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    } else if bytes >= 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else if bytes >= 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{} B", bytes)
    }
}
