//! Control data (`control.nacp`) title extraction.
//!
//! The control file starts with 16 language entries of 0x300 bytes each:
//! application name (0x200, UTF-8) followed by publisher (0x100).

use std::collections::BTreeMap;

use crate::NspError;
use crate::util::ensure_len;

pub const CONTROL_FILE_NAME: &str = "control.nacp";
const ENTRY_SIZE: usize = 0x300;
const NAME_SIZE: usize = 0x200;
const DISPLAY_VERSION_OFFSET: usize = 0x3060;
const DISPLAY_VERSION_SIZE: usize = 0x10;

/// Language names in slot order.
pub const LANGUAGES: [&str; 16] = [
    "AmericanEnglish",
    "BritishEnglish",
    "Japanese",
    "French",
    "German",
    "LatinAmericanSpanish",
    "Spanish",
    "Italian",
    "Dutch",
    "CanadianFrench",
    "Portuguese",
    "Russian",
    "Korean",
    "TraditionalChinese",
    "SimplifiedChinese",
    "BrazilianPortuguese",
];

fn utf8_field(buf: &[u8]) -> String {
    let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    String::from_utf8_lossy(&buf[..end]).trim().to_string()
}

/// Non-empty display titles keyed by language name.
pub fn display_titles(data: &[u8]) -> Result<BTreeMap<String, String>, NspError> {
    ensure_len(data, ENTRY_SIZE * LANGUAGES.len(), "control data")?;
    let mut titles = BTreeMap::new();
    for (i, lang) in LANGUAGES.iter().enumerate() {
        let name = utf8_field(&data[i * ENTRY_SIZE..i * ENTRY_SIZE + NAME_SIZE]);
        if !name.is_empty() {
            titles.insert(lang.to_string(), name);
        }
    }
    Ok(titles)
}

/// The human-readable version string (e.g. `1.0.2`), if present.
pub fn display_version(data: &[u8]) -> Option<String> {
    let field = data.get(DISPLAY_VERSION_OFFSET..DISPLAY_VERSION_OFFSET + DISPLAY_VERSION_SIZE)?;
    Some(utf8_field(field)).filter(|s| !s.is_empty())
}

/// Pick one title for naming: English first, then the first language in
/// slot order.
pub fn preferred_title(titles: &BTreeMap<String, String>) -> Option<&str> {
    ["AmericanEnglish", "BritishEnglish"]
        .iter()
        .chain(LANGUAGES.iter())
        .find_map(|lang| titles.get(*lang))
        .map(String::as_str)
}
