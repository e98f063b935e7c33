//! Raw entry scanner and content-metadata ingestion.

use std::fs::File;
use std::path::Path;

use log::debug;
use nsp_canon_core::kinds::EntryPriority;
use nsp_canon_core::pfs0::Pfs0;
use nsp_canon_core::{
    ContainerBackend, ContentId, ContentMeta, ContentMetadataEntry, EntrySource,
    MAX_KEY_GENERATION, NspError, TitleKeyStore,
};

use crate::package::{FindingCode, PackageInfo, RawEntryInfo};

/// Extension of the metadata file inside the meta sub-container.
const CNMT_EXTENSION: &str = ".cnmt";

/// The outer archive's entry table.
#[derive(Debug, Clone)]
pub struct ScannedArchive {
    pub pfs: Pfs0,
    /// Entries in archive order.
    pub entries: Vec<RawEntryInfo>,
}

impl ScannedArchive {
    pub fn source_for(&self, path: &Path, entry: &RawEntryInfo) -> EntrySource {
        EntrySource {
            name: entry.name.clone(),
            path: path.to_path_buf(),
            offset: entry.offset,
            size: entry.size,
        }
    }
}

/// Read the outer archive's entry table and classify every entry.
pub fn scan_archive(path: &Path) -> Result<ScannedArchive, NspError> {
    let mut file = File::open(path)?;
    let pfs = Pfs0::parse(&mut file)?;
    let file_len = file.metadata()?.len();
    if pfs.total_size() > file_len {
        return Err(NspError::truncated("archive", pfs.total_size(), file_len));
    }

    let entries = pfs
        .entries
        .iter()
        .map(|e| RawEntryInfo {
            name: e.name.clone(),
            size: e.size,
            offset: pfs.entry_offset(e),
            priority: EntryPriority::classify(&e.name),
        })
        .collect();
    Ok(ScannedArchive { pfs, entries })
}

/// Open the meta sub-container and decode the single metadata file in its
/// first section.
pub fn read_content_meta(
    backend: &dyn ContainerBackend,
    source: &EntrySource,
) -> Result<ContentMeta, NspError> {
    let mut meta = backend.open(source, &TitleKeyStore::new())?;
    let generation = meta.header().key_generation;
    if generation > MAX_KEY_GENERATION {
        return Err(NspError::UnsupportedKeyGeneration {
            found: generation,
            max: MAX_KEY_GENERATION,
        });
    }

    let files = meta.list_section_files(0)?;
    let cnmt: Vec<&String> = files
        .iter()
        .filter(|f| f.to_ascii_lowercase().ends_with(CNMT_EXTENSION))
        .collect();
    let [name] = cnmt.as_slice() else {
        return Err(NspError::MetadataCount(cnmt.len()));
    };
    debug!("{}: decoding {}", source.name, name);
    let data = meta.read_section_file(0, name)?;
    ContentMeta::parse(&data)
}

/// Scan an archive, decode its metadata, and build the initial package
/// state. Structural failures abort with an error; everything else is
/// recorded on the package.
pub fn open_package(
    path: &Path,
    backend: &dyn ContainerBackend,
) -> Result<(PackageInfo, ContentMeta), NspError> {
    let archive = scan_archive(path)?;

    let metas: Vec<&RawEntryInfo> = archive
        .entries
        .iter()
        .filter(|e| e.priority == Some(EntryPriority::MetaNca))
        .collect();
    let [meta_entry] = metas.as_slice() else {
        return Err(NspError::MetadataCount(metas.len()));
    };
    let (meta_id, _) = ContentId::from_filename(&meta_entry.name)
        .map_err(|e| NspError::invalid_format(e.to_string()))?;

    let cnmt = read_content_meta(backend, &archive.source_for(path, meta_entry))?;
    if !cnmt.kind.is_digital() {
        return Err(NspError::UnsupportedTitleKind(cnmt.kind.to_string()));
    }

    let mut package = PackageInfo::new(path.to_path_buf(), cnmt.title_id, cnmt.kind, cnmt.version);
    package.meta_content_id = meta_id;

    for entry in &cnmt.entries {
        if package.content_entries.contains_key(&entry.content_id) {
            package.warn(
                FindingCode::Content,
                format!("Content {} is declared twice", entry.content_id),
            );
            continue;
        }
        package.content_order.push(entry.content_id);
        package
            .content_entries
            .insert(entry.content_id, entry.clone());
    }
    package.content_entries.insert(
        meta_id,
        ContentMetadataEntry::for_meta(meta_id, meta_entry.size),
    );

    for entry in &archive.entries {
        if entry.is_loose() {
            package.has_loose_files = true;
            package.warn(
                FindingCode::Structure,
                format!("Loose file in archive: {}", entry.name),
            );
        }
        if package.raw_entries.contains_key(&entry.name) {
            package.error(
                FindingCode::Structure,
                format!("Duplicate entry name: {}", entry.name),
            );
            continue;
        }
        package.entry_order.push(entry.name.clone());
        package.raw_entries.insert(entry.name.clone(), entry.clone());
    }

    package.bad_padding = !archive.pfs.has_canonical_padding();
    Ok((package, cnmt))
}

#[cfg(test)]
#[path = "tests/scanner_tests.rs"]
mod tests;
