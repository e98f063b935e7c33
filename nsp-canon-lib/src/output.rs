//! Output builder: rename, extract, and rebuild.
//!
//! Every action is planned against the validated [`PackageInfo`] first and
//! only touches the filesystem once the plan is complete. Dry runs log the
//! plan instead of executing it.

use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use log::{debug, info};
use nsp_canon_core::kinds::EntryPriority;
use nsp_canon_core::pfs0::Pfs0Builder;
use nsp_canon_core::{
    ContainerBackend, ContentKind, EntrySource, SignatureCheck, ValidationProgress,
};

use crate::error::OutputError;
use crate::hasher::{CopyProgress, copy_range};
use crate::naming::directory_name;
use crate::options::{Action, ProcessOptions};
use crate::package::PackageInfo;

const PART_SUFFIX: &str = ".part";
const HEADER_DUMP_SUFFIX: &str = ".header";

/// What an action did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionOutcome {
    /// No action was requested.
    Validated,
    Renamed(PathBuf),
    /// The file already carries its canonical name.
    AlreadyNamed,
    Extracted(PathBuf),
    Converted(PathBuf),
    /// The package is already standard and no rebuild was forced.
    AlreadyStandard,
    /// The action was logged but not performed.
    DryRun,
}

/// Where an entry's bytes come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryData {
    /// A range of the source archive.
    Archive { offset: u64, size: u64 },
    Bytes(Vec<u8>),
}

impl EntryData {
    pub fn size(&self) -> u64 {
        match self {
            Self::Archive { size, .. } => *size,
            Self::Bytes(b) => b.len() as u64,
        }
    }
}

/// One entry of a planned archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayoutEntry {
    pub name: String,
    pub data: EntryData,
}

/// Canonical entry names for this package, in order. Delta fragments are
/// included when present in the archive so a package that carries them in
/// the right place still counts as ordered.
pub fn expected_entry_names(package: &PackageInfo) -> Vec<String> {
    let mut names: Vec<String> = package
        .content_order
        .iter()
        .filter(|id| package.raw_entry_for(id).is_some())
        .filter_map(|id| package.content_entries.get(id))
        .map(|e| e.filename())
        .collect();
    names.push(package.meta_filename());
    if let Some(ticket) = &package.ticket {
        names.push(ticket.rights_id.ticket_filename());
        names.push(ticket.rights_id.cert_filename());
    }
    names
}

/// True when the ticket keeps its original bytes on rebuild.
pub fn keeps_original_ticket(package: &PackageInfo) -> bool {
    package.title_kind.is_update() && package.ticket_signature == Some(SignatureCheck::Valid)
}

/// Plan the canonical archive: sub-containers in metadata order, the meta
/// sub-container, then ticket and certificate.
pub fn plan_layout(
    package: &PackageInfo,
    options: &ProcessOptions,
) -> Result<Vec<LayoutEntry>, OutputError> {
    let mut layout = Vec::new();
    for id in &package.content_order {
        let Some(entry) = package.content_entries.get(id) else {
            continue;
        };
        let is_delta = entry.kind == ContentKind::DeltaFragment;
        if is_delta && !options.keep_deltas {
            debug!("Dropping delta fragment {}", entry.filename());
            continue;
        }
        match package.raw_entry_for(id) {
            Some(raw) => layout.push(LayoutEntry {
                name: entry.filename(),
                data: EntryData::Archive {
                    offset: raw.offset,
                    size: raw.size,
                },
            }),
            None if is_delta => debug!("Delta fragment {} not present", entry.filename()),
            None => return Err(OutputError::missing(entry.filename())),
        }
    }

    let meta = package
        .raw_entry_for(&package.meta_content_id)
        .ok_or_else(|| OutputError::missing(package.meta_filename()))?;
    layout.push(LayoutEntry {
        name: package.meta_filename(),
        data: EntryData::Archive {
            offset: meta.offset,
            size: meta.size,
        },
    });

    if let Some(ticket) = &package.ticket {
        let bytes = if keeps_original_ticket(package) {
            ticket.raw.clone()
        } else {
            ticket.normalised().raw
        };
        layout.push(LayoutEntry {
            name: ticket.rights_id.ticket_filename(),
            data: EntryData::Bytes(bytes),
        });

        // A certificate flagged for replacement is never written back.
        let own = package
            .certificate
            .clone()
            .filter(|_| !package.must_replace_certificate);
        let cert = options
            .reference_cert
            .as_ref()
            .map(|r| r.bytes().to_vec())
            .or(own)
            .ok_or_else(|| OutputError::missing(ticket.rights_id.cert_filename()))?;
        layout.push(LayoutEntry {
            name: ticket.rights_id.cert_filename(),
            data: EntryData::Bytes(cert),
        });
    }
    Ok(layout)
}

fn output_base(package: &PackageInfo, options: &ProcessOptions) -> PathBuf {
    options.output_dir.clone().unwrap_or_else(|| {
        package
            .path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default()
    })
}

fn output_name(package: &PackageInfo) -> Result<&str, OutputError> {
    package
        .canonical_name
        .as_deref()
        .ok_or_else(|| OutputError::missing("output name"))
}

fn part_path(target: &Path) -> PathBuf {
    let mut os = OsString::from(target.as_os_str());
    os.push(PART_SUFFIX);
    PathBuf::from(os)
}

/// Entry names come from the archive; refuse anything that would escape
/// the output directory.
fn is_safe_entry_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\'])
        && !name.contains(':')
}

/// Stream `layout` into a new archive at `target` via a temporary file.
pub fn write_layout(
    source: &Path,
    layout: &[LayoutEntry],
    target: &Path,
    progress: &dyn Fn(ValidationProgress),
) -> Result<(), OutputError> {
    let part = part_path(target);
    let result = write_layout_to(source, layout, &part, progress);
    if let Err(e) = result {
        let _ = fs::remove_file(&part);
        return Err(e);
    }
    fs::rename(&part, target)?;
    Ok(())
}

fn write_layout_to(
    source: &Path,
    layout: &[LayoutEntry],
    part: &Path,
    progress: &dyn Fn(ValidationProgress),
) -> Result<(), OutputError> {
    let mut builder = Pfs0Builder::new();
    for entry in layout {
        builder.add(entry.name.clone(), entry.data.size());
    }
    let header = builder.header_bytes();
    let mut state = CopyProgress {
        done: 0,
        total: header.len() as u64 + layout.iter().map(|e| e.data.size()).sum::<u64>(),
    };

    let mut reader = File::open(source)?;
    let mut writer = BufWriter::new(File::create(part)?);
    writer.write_all(&header)?;
    state.done += header.len() as u64;
    for entry in layout {
        match &entry.data {
            EntryData::Archive { offset, size } => {
                copy_range(&mut reader, &mut writer, *offset, *size, &mut state, progress)?
            }
            EntryData::Bytes(bytes) => {
                writer.write_all(bytes)?;
                state.done += bytes.len() as u64;
            }
        }
    }
    writer.flush()?;
    Ok(())
}

/// Move the archive to its canonical name.
pub fn rename(
    package: &PackageInfo,
    options: &ProcessOptions,
) -> Result<ActionOutcome, OutputError> {
    let target = output_base(package, options).join(output_name(package)?);
    if target == package.path {
        info!("{} already has its canonical name", package.path.display());
        return Ok(ActionOutcome::AlreadyNamed);
    }
    if target.exists() && !options.overwrite {
        return Err(OutputError::Conflict(target));
    }
    if options.dry_run {
        info!(
            "[dry run] would rename {} to {}",
            package.path.display(),
            target.display()
        );
        return Ok(ActionOutcome::DryRun);
    }
    fs::rename(&package.path, &target)?;
    Ok(ActionOutcome::Renamed(target))
}

/// Copy the archive's entries into a directory named after the package.
pub fn extract(
    package: &PackageInfo,
    backend: &dyn ContainerBackend,
    options: &ProcessOptions,
    progress: &dyn Fn(ValidationProgress),
) -> Result<ActionOutcome, OutputError> {
    let dir = output_base(package, options).join(directory_name(output_name(package)?));
    if dir.exists() && !options.overwrite {
        return Err(OutputError::Conflict(dir));
    }

    let entries: Vec<_> = package
        .entry_order
        .iter()
        .filter_map(|n| package.raw_entries.get(n))
        .filter(|e| {
            matches!(e.priority, Some(EntryPriority::Nca | EntryPriority::MetaNca))
                || options.extract_all
        })
        .filter(|e| {
            let ok = is_safe_entry_name(&e.name);
            if !ok {
                log::warn!("Skipping entry with unsafe name '{}'", e.name);
            }
            ok
        })
        .collect();

    if options.dry_run {
        for entry in &entries {
            info!(
                "[dry run] would extract {} to {}",
                entry.name,
                dir.join(&entry.name).display()
            );
        }
        return Ok(ActionOutcome::DryRun);
    }

    if dir.exists() {
        fs::remove_dir_all(&dir)?;
    }
    fs::create_dir_all(&dir)?;
    let result = (|| -> Result<(), OutputError> {
        let mut reader = File::open(&package.path)?;
        let mut state = CopyProgress {
            done: 0,
            total: entries.iter().map(|e| e.size).sum(),
        };
        for entry in &entries {
            let mut writer = BufWriter::new(File::create(dir.join(&entry.name))?);
            copy_range(&mut reader, &mut writer, entry.offset, entry.size, &mut state, progress)?;
            writer.flush()?;

            if options.dump_headers && entry.priority.is_some_and(|p| p <= EntryPriority::MetaNca) {
                let source = EntrySource {
                    name: entry.name.clone(),
                    path: package.path.clone(),
                    offset: entry.offset,
                    size: entry.size,
                };
                let header = backend.open(&source, &package.title_keys)?.raw_header();
                let stem = entry.name.strip_suffix(".nca").unwrap_or(&entry.name);
                fs::write(dir.join(format!("{}{}", stem, HEADER_DUMP_SUFFIX)), header)?;
            }
        }
        Ok(())
    })();
    if let Err(e) = result {
        let _ = fs::remove_dir_all(&dir);
        return Err(e);
    }
    Ok(ActionOutcome::Extracted(dir))
}

/// Rebuild the archive in canonical form.
pub fn convert(
    package: &PackageInfo,
    options: &ProcessOptions,
    progress: &dyn Fn(ValidationProgress),
) -> Result<ActionOutcome, OutputError> {
    if package.is_standard() && !options.force_convert {
        info!("{} is already standard", package.path.display());
        return Ok(ActionOutcome::AlreadyStandard);
    }

    let layout = plan_layout(package, options)?;
    let target = output_base(package, options).join(output_name(package)?);
    let in_place = target == package.path;
    if target.exists() && !in_place && !options.overwrite {
        return Err(OutputError::Conflict(target));
    }

    if options.dry_run {
        for entry in &layout {
            info!("[dry run] would write {} ({} bytes)", entry.name, entry.data.size());
        }
        info!("[dry run] would create {}", target.display());
        if options.delete_source && !in_place {
            info!("[dry run] would delete {}", package.path.display());
        }
        return Ok(ActionOutcome::DryRun);
    }

    progress(ValidationProgress::phase("Writing archive"));
    write_layout(&package.path, &layout, &target, progress)?;
    if options.delete_source && !in_place {
        fs::remove_file(&package.path)?;
        debug!("Deleted {}", package.path.display());
    }
    Ok(ActionOutcome::Converted(target))
}

/// Run the action selected in `options`.
pub fn apply_action(
    package: &PackageInfo,
    backend: &dyn ContainerBackend,
    options: &ProcessOptions,
    progress: &dyn Fn(ValidationProgress),
) -> Result<ActionOutcome, OutputError> {
    match options.action {
        Action::Validate => Ok(ActionOutcome::Validated),
        Action::Rename => rename(package, options),
        Action::Extract => extract(package, backend, options, progress),
        Action::Convert => convert(package, options, progress),
    }
}

#[cfg(test)]
#[path = "tests/output_tests.rs"]
mod tests;
