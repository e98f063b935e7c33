//! Console keyset loading.
//!
//! Keys come from a `prod.keys`-style text file: one `name = hexvalue` pair
//! per line, `;` starts a comment. Unknown names are skipped so newer key
//! files keep working.
//!
//! Generation-indexed keys (`key_area_key_*_XX`, `titlekek_XX`) are indexed
//! by master key revision, which is the key generation minus one (0 and 1
//! both map to revision 0).

use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use nsp_canon_core::NspError;

/// Number of master key revisions the keyset can hold.
pub const MAX_REVISIONS: usize = 0x20;

/// Key area encryption key family, selected by the sub-container header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAreaFamily {
    Application = 0,
    Ocean = 1,
    System = 2,
}

impl KeyAreaFamily {
    pub fn from_index(index: u8) -> Result<Self, NspError> {
        match index {
            0 => Ok(Self::Application),
            1 => Ok(Self::Ocean),
            2 => Ok(Self::System),
            other => Err(NspError::invalid_format(format!(
                "invalid key area key index {}",
                other
            ))),
        }
    }

    fn key_name(self) -> &'static str {
        match self {
            Self::Application => "key_area_key_application",
            Self::Ocean => "key_area_key_ocean",
            Self::System => "key_area_key_system",
        }
    }
}

/// Master key revision for a key generation value.
pub fn revision(generation: u8) -> usize {
    generation.saturating_sub(1) as usize
}

/// Keys needed to open and verify packages.
#[derive(Debug, Clone, Default)]
pub struct KeySet {
    /// AES-XTS key pair for sub-container headers.
    pub header_key: Option<[u8; 32]>,
    pub key_area_keys: [[Option<[u8; 16]>; MAX_REVISIONS]; 3],
    pub title_keks: [Option<[u8; 16]>; MAX_REVISIONS],
    /// Moduli of the fixed header-signing keys, by signature key generation.
    pub header_fixed_key_moduli: Vec<Option<Vec<u8>>>,
}

impl KeySet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(path: &Path) -> Result<Self, NspError> {
        let file = std::fs::File::open(path).map_err(|e| {
            NspError::missing_key(format!("cannot read keys file {}: {}", path.display(), e))
        })?;
        let mut keys = Self::new();
        keys.load_prod_keys(file)?;
        Ok(keys)
    }

    /// Merge keys from a `prod.keys`-style reader.
    pub fn load_prod_keys<R: Read>(&mut self, reader: R) -> Result<(), NspError> {
        for line in BufReader::new(reader).lines() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() || line.starts_with(';') {
                continue;
            }
            let Some((name, value)) = line.split_once('=') else {
                continue;
            };
            self.set(name.trim().to_ascii_lowercase().as_str(), value.trim());
        }
        Ok(())
    }

    fn set(&mut self, name: &str, value: &str) {
        if name == "header_key" {
            self.header_key = decode_hex::<32>(value);
            return;
        }
        if let Some(index) = indexed(name, "titlekek") {
            self.title_keks[index] = decode_hex::<16>(value);
            return;
        }
        for family in [
            KeyAreaFamily::Application,
            KeyAreaFamily::Ocean,
            KeyAreaFamily::System,
        ] {
            if let Some(index) = indexed(name, family.key_name()) {
                self.key_area_keys[family as usize][index] = decode_hex::<16>(value);
                return;
            }
        }
        if let Some(index) = indexed(name, "nca_hdr_fixed_key_modulus") {
            let Ok(modulus) = hex::decode(value) else {
                return;
            };
            if self.header_fixed_key_moduli.len() <= index {
                self.header_fixed_key_moduli.resize(index + 1, None);
            }
            self.header_fixed_key_moduli[index] = Some(modulus);
        }
    }

    pub fn header_key(&self) -> Result<&[u8; 32], NspError> {
        self.header_key
            .as_ref()
            .ok_or_else(|| NspError::missing_key("header_key"))
    }

    pub fn key_area_key(
        &self,
        family: KeyAreaFamily,
        generation: u8,
    ) -> Result<&[u8; 16], NspError> {
        let rev = revision(generation);
        self.key_area_keys[family as usize]
            .get(rev)
            .and_then(Option::as_ref)
            .ok_or_else(|| NspError::missing_key(format!("{}_{:02x}", family.key_name(), rev)))
    }

    pub fn title_kek(&self, generation: u8) -> Result<&[u8; 16], NspError> {
        let rev = revision(generation);
        self.title_keks
            .get(rev)
            .and_then(Option::as_ref)
            .ok_or_else(|| NspError::missing_key(format!("titlekek_{:02x}", rev)))
    }

    pub fn header_fixed_key_modulus(&self, index: u8) -> Option<&[u8]> {
        self.header_fixed_key_moduli
            .get(index as usize)
            .and_then(|m| m.as_deref())
    }
}

/// Parse `<prefix>_XX` into the revision index `XX`.
fn indexed(name: &str, prefix: &str) -> Option<usize> {
    let suffix = name.strip_prefix(prefix)?.strip_prefix('_')?;
    let index = usize::from_str_radix(suffix, 16).ok()?;
    (index < MAX_REVISIONS).then_some(index)
}

fn decode_hex<const N: usize>(value: &str) -> Option<[u8; N]> {
    let mut out = [0u8; N];
    hex::decode_to_slice(value, &mut out).ok()?;
    Some(out)
}
