//! CDN importer.
//!
//! A CDN dump is a directory of loose sub-containers plus the ticket and
//! certificate named after the rights id. The importer packs the files the
//! metadata references into a scratch archive in canonical order and hands
//! that archive to the regular pipeline, which validates and rebuilds it.

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use nsp_canon_core::ids::META_NCA_SUFFIX;
use nsp_canon_core::pfs0::Pfs0Builder;
use nsp_canon_core::{
    ContainerBackend, ContentKind, EntrySource, NspError, RightsId, TitleKeyStore, TitleLookup,
    ValidationProgress,
};

use tempfile::NamedTempFile;

use crate::naming::NameRegistry;
use crate::options::{Action, ProcessOptions};
use crate::output::ActionOutcome;
use crate::pipeline::{ItemReport, ItemResult, process_archive};
use crate::scanner::read_content_meta;

const TEMP_SUFFIX: &str = ".cdn-import.nsp";

/// Contents of one entry of the temporary archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CdnSource {
    File(PathBuf),
    Bytes(Vec<u8>),
}

/// Files to pack, in archive order.
#[derive(Debug, Clone)]
pub struct CdnPlan {
    pub entries: Vec<(String, CdnSource)>,
    pub rights_id: Option<RightsId>,
}

fn meta_files(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut metas: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| {
            p.is_file()
                && p.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.to_ascii_lowercase().ends_with(META_NCA_SUFFIX))
        })
        .collect();
    metas.sort();
    Ok(metas)
}

/// A directory holding exactly one meta sub-container.
pub fn is_cdn_dir(path: &Path) -> bool {
    path.is_dir() && meta_files(path).is_ok_and(|m| m.len() == 1)
}

fn file_source(path: &Path) -> Result<EntrySource, NspError> {
    Ok(EntrySource {
        name: path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
        path: path.to_path_buf(),
        offset: 0,
        size: fs::metadata(path)?.len(),
    })
}

/// Work out which files of a CDN directory make up the package.
/// Referenced files that are missing are left out; validation of the
/// temporary archive reports them.
pub fn plan_import(
    dir: &Path,
    backend: &dyn ContainerBackend,
    options: &ProcessOptions,
) -> Result<CdnPlan, NspError> {
    let metas = meta_files(dir)?;
    let [meta_path] = metas.as_slice() else {
        return Err(NspError::MetadataCount(metas.len()));
    };
    let meta_source = file_source(meta_path)?;
    let cnmt = read_content_meta(backend, &meta_source)?;

    let mut entries = Vec::new();
    let mut rights_id = None;
    for entry in &cnmt.entries {
        if entry.kind == ContentKind::DeltaFragment && !options.keep_deltas {
            continue;
        }
        let name = entry.filename();
        let path = dir.join(&name);
        if !path.is_file() {
            if entry.kind != ContentKind::DeltaFragment {
                warn!("{}: {} is missing", dir.display(), name);
            }
            continue;
        }
        if rights_id.is_none() {
            let opened = backend.open(&file_source(&path)?, &TitleKeyStore::new())?;
            rights_id = opened.header().rights_id;
        }
        entries.push((name, CdnSource::File(path)));
    }
    entries.push((meta_source.name.clone(), CdnSource::File(meta_path.clone())));

    if let Some(rights_id) = rights_id {
        let ticket = dir.join(rights_id.ticket_filename());
        if ticket.is_file() {
            entries.push((rights_id.ticket_filename(), CdnSource::File(ticket)));
        } else {
            warn!("{}: no ticket for rights id {}", dir.display(), rights_id);
        }
        let cert = dir.join(rights_id.cert_filename());
        if cert.is_file() {
            entries.push((rights_id.cert_filename(), CdnSource::File(cert)));
        } else if let Some(reference) = &options.reference_cert {
            entries.push((
                rights_id.cert_filename(),
                CdnSource::Bytes(reference.bytes().to_vec()),
            ));
        }
    }
    Ok(CdnPlan { entries, rights_id })
}

/// Pack a plan into an archive written to `out`.
pub fn write_plan<W: Write>(plan: &CdnPlan, out: W) -> Result<(), NspError> {
    let mut builder = Pfs0Builder::new();
    for (name, source) in &plan.entries {
        let size = match source {
            CdnSource::File(path) => fs::metadata(path)?.len(),
            CdnSource::Bytes(bytes) => bytes.len() as u64,
        };
        builder.add(name.clone(), size);
    }

    let mut writer = BufWriter::new(out);
    writer.write_all(&builder.header_bytes())?;
    for (_, source) in &plan.entries {
        match source {
            CdnSource::File(path) => {
                io::copy(&mut File::open(path)?, &mut writer)?;
            }
            CdnSource::Bytes(bytes) => writer.write_all(bytes)?,
        }
    }
    writer.flush()?;
    Ok(())
}

/// Scratch file for the archive built from `dir`. Real imports write next
/// to the dump; dry runs use the system temp directory. The file is removed
/// when the handle is dropped.
pub fn scratch_archive(dir: &Path, dry_run: bool) -> io::Result<NamedTempFile> {
    let name = dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "cdn".to_string());
    let prefix = format!(".{}.", name);
    let mut builder = tempfile::Builder::new();
    builder.prefix(&prefix).suffix(TEMP_SUFFIX);
    match dir.parent().filter(|p| !dry_run && !p.as_os_str().is_empty()) {
        Some(parent) => builder.tempfile_in(parent),
        None => builder.tempfile(),
    }
}

/// Import a CDN directory: pack it, then validate and rebuild the result.
/// Any action other than plain validation becomes a forced rebuild.
pub fn import_cdn(
    dir: &Path,
    options: &ProcessOptions,
    lookup: &dyn TitleLookup,
    backend: &dyn ContainerBackend,
    names: &mut NameRegistry,
    progress: &dyn Fn(ValidationProgress),
) -> ItemReport {
    progress(ValidationProgress::phase("Collecting CDN files"));
    let plan = match plan_import(dir, backend, options) {
        Ok(p) => p,
        Err(e) => return ItemReport::failed(dir, e.to_string()),
    };

    if options.dry_run {
        for (name, _) in &plan.entries {
            info!("[dry run] would import {} from {}", name, dir.display());
        }
    }

    // Dry runs still pack and validate the dump; only the output is skipped.
    let mut temp = match scratch_archive(dir, options.dry_run) {
        Ok(t) => t,
        Err(e) => {
            return ItemReport::failed(dir, format!("Cannot create temporary archive: {}", e));
        }
    };
    if let Err(e) = write_plan(&plan, temp.as_file_mut()) {
        return ItemReport::failed(dir, format!("Cannot build temporary archive: {}", e));
    }
    let temp_path = temp.path().to_path_buf();
    debug!("Built {}", temp_path.display());

    let mut forwarded = options.clone();
    forwarded.delete_source = false;
    if options.action != Action::Validate {
        forwarded.action = Action::Convert;
        forwarded.force_convert = true;
        if forwarded.output_dir.is_none() {
            forwarded.output_dir = dir.parent().map(Path::to_path_buf);
        }
    }

    let mut report = process_archive(&temp_path, &forwarded, lookup, backend, names, progress);
    if let Err(e) = temp.close() {
        warn!("Cannot remove {}: {}", temp_path.display(), e);
    }
    report.path = dir.to_path_buf();

    let converted = matches!(report.result, ItemResult::Done(ActionOutcome::Converted(_)));
    if options.delete_source
        && converted
        && let Err(e) = fs::remove_dir_all(dir)
    {
        warn!("Cannot remove {}: {}", dir.display(), e);
    }
    report
}
