//! Process descriptor (`main.npdm`) access.
//!
//! The descriptor's ACID block carries the RSA-2048 modulus that signs the
//! second header signature of the program sub-container.
//!
//! ```text
//! META: [0x00] "META"   [0x78] AcidOffset (u32 LE)   [0x7C] AcidSize (u32 LE)
//! ACID: [0x000] signature (0x100)  [0x100] modulus (0x100)  [0x200] "ACID"
//! ```

use nsp_canon_core::NspError;
use nsp_canon_core::util::{ensure_len, read_u32_le};

pub const NPDM_FILE_NAME: &str = "main.npdm";

/// Extract the header-signing modulus from a process descriptor.
pub fn acid_modulus(npdm: &[u8]) -> Result<&[u8], NspError> {
    ensure_len(npdm, 0x80, "process descriptor")?;
    if &npdm[..4] != b"META" {
        return Err(NspError::bad_magic(b"META", &npdm[..4]));
    }
    let offset = read_u32_le(npdm, 0x78) as usize;
    let size = read_u32_le(npdm, 0x7C) as usize;
    if size < 0x204 {
        return Err(NspError::invalid_format("ACID block too small"));
    }
    ensure_len(npdm, offset + size, "ACID block")?;
    let acid = &npdm[offset..offset + size];
    if &acid[0x200..0x204] != b"ACID" {
        return Err(NspError::bad_magic(b"ACID", &acid[0x200..0x204]));
    }
    Ok(&acid[0x100..0x200])
}
