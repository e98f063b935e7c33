//! Deterministic output names.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use nsp_canon_core::nacp::preferred_title;
use nsp_canon_core::{TitleId, TitleKind, TitleLookup, TitleRecord};

use crate::package::{FindingCode, PackageInfo};

pub const PACKAGE_EXTENSION: &str = ".nsp";

/// Replace characters that are not valid in file names on common
/// filesystems and tidy whitespace.
pub fn sanitize(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.chars() {
        match c {
            ':' => out.push_str(" -"),
            '<' | '>' | '"' | '/' | '\\' | '|' | '?' | '*' => out.push('_'),
            c if c.is_control() => {}
            c => out.push(c),
        }
    }
    let collapsed = out.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed.trim_end_matches('.').trim().to_string()
}

/// Name of a record, falling back to its regional releases.
fn record_name(lookup: &dyn TitleLookup, record: &TitleRecord) -> Option<String> {
    record.name.clone().or_else(|| {
        record.nsu_id.and_then(|nsu| {
            lookup
                .regional_variants(nsu)
                .into_iter()
                .find_map(|r| r.name)
        })
    })
}

fn title_name(lookup: &dyn TitleLookup, id: TitleId) -> Option<String> {
    lookup.title(id).and_then(|r| record_name(lookup, &r))
}

/// Name of an add-on, found directly or among its parent's add-ons.
fn add_on_name(lookup: &dyn TitleLookup, id: TitleId, parent: TitleId) -> Option<String> {
    title_name(lookup, id).or_else(|| {
        lookup
            .related_add_ons(parent)
            .into_iter()
            .find(|r| r.id == Some(id))
            .and_then(|r| record_name(lookup, &r))
    })
}

/// Display name for a package: database first, control data second.
pub fn resolve_title_name(package: &PackageInfo, lookup: &dyn TitleLookup) -> Option<String> {
    let parent = title_name(lookup, package.base_title_id);
    let name = match package.title_kind {
        TitleKind::AddOnContent | TitleKind::DataPatch => {
            match (add_on_name(lookup, package.title_id, package.base_title_id), parent) {
                (Some(dlc), Some(parent)) if !dlc.starts_with(&parent) => {
                    Some(format!("{} - {}", parent, dlc))
                }
                (Some(dlc), _) => Some(dlc),
                (None, parent) => parent,
            }
        }
        _ => parent,
    };
    name.or_else(|| preferred_title(&package.display_titles).map(str::to_string))
        .map(|n| sanitize(&n))
        .filter(|n| !n.is_empty())
}

/// `"{name} [{TITLEID}][v{version}][{tag}].nsp"`, the name omitted when
/// unknown.
pub fn canonical_name(package: &PackageInfo, lookup: &dyn TitleLookup) -> String {
    let tags = format!(
        "[{}][{}][{}]",
        package.title_id,
        package.version_string(),
        package.title_kind.name_tag()
    );
    match resolve_title_name(package, lookup) {
        Some(name) => format!("{} {}{}", name, tags, PACKAGE_EXTENSION),
        None => format!("{}{}", tags, PACKAGE_EXTENSION),
    }
}

/// Warn when an update's version is unknown to the title database.
pub fn check_update_version(package: &mut PackageInfo, lookup: &dyn TitleLookup) {
    if package.title_kind != TitleKind::Patch {
        return;
    }
    let known = lookup.update_versions(package.base_title_id);
    if !known.is_empty() && !known.contains(&package.version) {
        package.warn(
            FindingCode::Naming,
            format!(
                "{} is not a known update version of {}",
                package.version_string(),
                package.base_title_id
            ),
        );
    }
}

/// The output name without its extension, used for extraction directories.
pub fn directory_name(name: &str) -> &str {
    name.strip_suffix(PACKAGE_EXTENSION).unwrap_or(name)
}

/// Output names produced so far in a batch.
#[derive(Debug, Default)]
pub struct NameRegistry {
    seen: HashMap<String, PathBuf>,
}

impl NameRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `name` for `source`. Returns the earlier source if another
    /// item already produced the same name.
    pub fn register(&mut self, name: &str, source: &Path) -> Option<PathBuf> {
        match self.seen.get(name) {
            Some(existing) if existing != source => Some(existing.clone()),
            Some(_) => None,
            None => {
                self.seen.insert(name.to_string(), source.to_path_buf());
                None
            }
        }
    }
}

#[cfg(test)]
#[path = "tests/naming_tests.rs"]
mod tests;
