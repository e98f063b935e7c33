//! In-memory title index.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;

use log::{debug, warn};
use nsp_canon_core::{TitleId, TitleKind, TitleLookup, TitleRecord};
use serde::Deserialize;

use crate::error::TitleDbError;

const TITLES_FILE: &str = "titles.json";
const VERSIONS_FILE: &str = "versions.json";

/// One record as stored in the JSON files.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawTitle {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    nsu_id: Option<u64>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    version: Option<u32>,
    #[serde(default)]
    region: Option<String>,
    /// Either `20170303` or `"2017-03-03"` depending on the source.
    #[serde(default)]
    release_date: Option<serde_json::Value>,
    #[serde(default)]
    publisher: Option<String>,
}

impl RawTitle {
    fn into_record(self, default_region: Option<&str>) -> TitleRecord {
        TitleRecord {
            id: self.id.as_deref().and_then(|s| s.parse().ok()),
            nsu_id: self.nsu_id,
            name: self.name.map(|n| n.trim().to_string()).filter(|n| !n.is_empty()),
            version: self.version,
            region: self.region.or_else(|| default_region.map(str::to_string)),
            release_date: self.release_date.and_then(|v| match v {
                serde_json::Value::Number(n) => Some(n.to_string()),
                serde_json::Value::String(s) => Some(s.replace('-', "")),
                _ => None,
            }),
            publisher: self.publisher,
        }
    }
}

/// Read-only title index implementing [`TitleLookup`].
#[derive(Debug, Default)]
pub struct TitleDatabase {
    records: Vec<TitleRecord>,
    by_id: HashMap<TitleId, usize>,
    by_nsu_id: HashMap<u64, Vec<usize>>,
    add_ons_by_parent: HashMap<TitleId, Vec<usize>>,
    versions: HashMap<TitleId, Vec<u32>>,
}

impl TitleDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load every title file and the version list from `dir`.
    pub fn load_dir(dir: &Path) -> Result<Self, TitleDbError> {
        if !dir.is_dir() {
            return Err(TitleDbError::invalid_database(format!(
                "{} is not a directory",
                dir.display()
            )));
        }

        let mut db = Self::new();
        let mut title_files: Vec<_> = fs::read_dir(dir)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with("titles") && n.ends_with(".json"))
            })
            .collect();
        title_files.sort();

        for path in &title_files {
            let name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
            // titles.US.en.json -> region "US"
            let region = name
                .strip_prefix("titles.")
                .and_then(|rest| rest.split('.').next())
                .filter(|r| *r != "json");
            let text = fs::read_to_string(path)?;
            let added = db.add_titles_json(&text, region, name)?;
            debug!("Loaded {} titles from {}", added, name);
        }

        let versions = dir.join(VERSIONS_FILE);
        if versions.exists() {
            db.add_versions_json(&fs::read_to_string(&versions)?, VERSIONS_FILE)?;
        } else {
            debug!("No {} in {}", VERSIONS_FILE, dir.display());
        }

        if title_files.is_empty() {
            warn!("No {} found in {}", TITLES_FILE, dir.display());
        }
        Ok(db)
    }

    /// Merge a titles file (an object keyed by catalog id). Returns the number
    /// of records added. The first record seen for a title id wins.
    pub fn add_titles_json(
        &mut self,
        text: &str,
        default_region: Option<&str>,
        file: &str,
    ) -> Result<usize, TitleDbError> {
        let raw: BTreeMap<String, RawTitle> =
            serde_json::from_str(text).map_err(|e| TitleDbError::json(file, e))?;
        let mut added = 0;
        for title in raw.into_values() {
            self.insert(title.into_record(default_region));
            added += 1;
        }
        Ok(added)
    }

    /// Merge a versions file: `{ "<title id>": { "<version>": "<date>" } }`.
    pub fn add_versions_json(&mut self, text: &str, file: &str) -> Result<(), TitleDbError> {
        let raw: BTreeMap<String, BTreeMap<String, serde_json::Value>> =
            serde_json::from_str(text).map_err(|e| TitleDbError::json(file, e))?;
        for (id, versions) in raw {
            let Ok(id) = id.parse::<TitleId>() else {
                debug!("Skipping version list for malformed id '{}'", id);
                continue;
            };
            let list = self.versions.entry(id).or_default();
            list.extend(versions.keys().filter_map(|v| v.parse::<u32>().ok()));
            list.sort_unstable();
            list.dedup();
        }
        Ok(())
    }

    pub fn insert(&mut self, record: TitleRecord) {
        let index = self.records.len();
        if let Some(id) = record.id {
            if self.by_id.contains_key(&id) {
                // Regional duplicates of the same title; keep the first.
                if let Some(nsu) = record.nsu_id {
                    self.by_nsu_id.entry(nsu).or_default().push(index);
                    self.records.push(record);
                }
                return;
            }
            self.by_id.insert(id, index);
            if is_add_on(id) {
                self.add_ons_by_parent
                    .entry(id.application_id(TitleKind::AddOnContent))
                    .or_default()
                    .push(index);
            }
        }
        if let Some(nsu) = record.nsu_id {
            self.by_nsu_id.entry(nsu).or_default().push(index);
        }
        self.records.push(record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Add-on ids carry a non-zero index in the low 12 bits and never the
/// update bit pattern.
fn is_add_on(id: TitleId) -> bool {
    let low = id.0 & 0xFFF;
    low != 0 && low != TitleId::PATCH_BIT
}

impl TitleLookup for TitleDatabase {
    fn title(&self, id: TitleId) -> Option<TitleRecord> {
        self.by_id.get(&id).map(|&i| self.records[i].clone())
    }

    fn regional_variants(&self, nsu_id: u64) -> Vec<TitleRecord> {
        self.by_nsu_id
            .get(&nsu_id)
            .map(|ids| ids.iter().map(|&i| self.records[i].clone()).collect())
            .unwrap_or_default()
    }

    fn update_versions(&self, id: TitleId) -> Vec<u32> {
        self.versions
            .get(&id)
            .or_else(|| self.versions.get(&id.patch_id()))
            .cloned()
            .unwrap_or_default()
    }

    fn related_add_ons(&self, id: TitleId) -> Vec<TitleRecord> {
        self.add_ons_by_parent
            .get(&id)
            .map(|ids| ids.iter().map(|&i| self.records[i].clone()).collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
#[path = "tests/database_tests.rs"]
mod tests;
