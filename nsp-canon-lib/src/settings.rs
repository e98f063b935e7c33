//! Settings file (`~/.config/nsp-canon/settings.toml`).
//!
//! ```toml
//! [paths]
//! keys = "/home/me/.switch/prod.keys"
//! titledb = "/home/me/titledb"
//! common_cert = "/home/me/common.cert"
//! output = "/home/me/nsp"
//! ```
//!
//! Command-line flags override every value here.

use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathSettings {
    /// Keyset file.
    pub keys: Option<PathBuf>,
    /// Directory of title database JSON files.
    pub titledb: Option<PathBuf>,
    /// Reference copy of the common certificate chain.
    pub common_cert: Option<PathBuf>,
    /// Default output directory.
    pub output: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub paths: PathSettings,
}

/// Canonical path to the settings file.
pub fn settings_path() -> PathBuf {
    let config = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
    config.join("nsp-canon").join("settings.toml")
}

/// Keyset location used when neither flag nor settings name one.
pub fn default_keys_path() -> PathBuf {
    let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
    home.join(".switch").join("prod.keys")
}

impl Settings {
    pub fn parse(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Load settings from `path`. A missing file yields defaults.
    pub fn load_from(path: &Path) -> io::Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(text) => Self::parse(&text).map_err(|e| {
                io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("{}: {}", path.display(), e),
                )
            }),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e),
        }
    }

    pub fn load() -> io::Result<Self> {
        Self::load_from(&settings_path())
    }

    /// Write settings to `path` atomically.
    pub fn save_to(&self, path: &Path) -> io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let serialized = toml::to_string_pretty(self).map_err(io::Error::other)?;
        let tmp = path.with_extension("toml.tmp");
        std::fs::write(&tmp, &serialized)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }

    /// Keyset path: flag, then settings, then the default location.
    pub fn keys_path(&self, cli_override: Option<PathBuf>) -> PathBuf {
        cli_override
            .or_else(|| self.paths.keys.clone())
            .unwrap_or_else(default_keys_path)
    }

    pub fn titledb_path(&self, cli_override: Option<PathBuf>) -> Option<PathBuf> {
        cli_override.or_else(|| self.paths.titledb.clone())
    }

    pub fn common_cert_path(&self, cli_override: Option<PathBuf>) -> Option<PathBuf> {
        cli_override.or_else(|| self.paths.common_cert.clone())
    }

    pub fn output_dir(&self, cli_override: Option<PathBuf>) -> Option<PathBuf> {
        cli_override.or_else(|| self.paths.output.clone())
    }
}

/// Load the full settings file as a pretty-printed TOML string for display.
pub fn load_settings_string() -> Option<String> {
    let contents = std::fs::read_to_string(settings_path()).ok()?;
    let doc: toml::Value = contents.parse().ok()?;
    toml::to_string_pretty(&doc).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_paths() {
        let settings = Settings::parse(
            r#"
[paths]
keys = "/keys/prod.keys"
output = "/out"
"#,
        )
        .unwrap();
        assert_eq!(settings.paths.keys, Some(PathBuf::from("/keys/prod.keys")));
        assert_eq!(settings.paths.titledb, None);
        assert_eq!(settings.output_dir(None), Some(PathBuf::from("/out")));
        assert_eq!(
            settings.output_dir(Some(PathBuf::from("/cli"))),
            Some(PathBuf::from("/cli"))
        );
    }

    #[test]
    fn test_empty_file_is_default() {
        assert_eq!(Settings::parse("").unwrap(), Settings::default());
    }

    #[test]
    fn test_keys_path_fallback() {
        let settings = Settings::default();
        assert!(settings.keys_path(None).ends_with(".switch/prod.keys"));
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.toml");
        let mut settings = Settings::default();
        settings.paths.titledb = Some(PathBuf::from("/db"));
        settings.save_to(&path).unwrap();

        assert_eq!(Settings::load_from(&path).unwrap(), settings);
        assert!(!path.with_extension("toml.tmp").exists());
    }

    #[test]
    fn test_missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = Settings::load_from(&dir.path().join("none.toml")).unwrap();
        assert_eq!(loaded, Settings::default());
    }
}
