//! Per sub-container validation.
//!
//! Every sub-container named by the metadata and present in the archive is
//! opened through the backend. Header, sections, the program's process
//! descriptor and (optionally) the content hash are checked, and the results
//! are recorded on the package.

use std::fs::File;

use log::{debug, warn};
use nsp_canon_core::kinds::{DistributionType, SubcontainerType};
use nsp_canon_core::nacp::{CONTROL_FILE_NAME, display_titles};
use nsp_canon_core::{
    ContainerBackend, ContentId, ContentKind, ContentMeta, EntrySource, MAX_KEY_GENERATION,
    NspError, SignatureCheck, Subcontainer, TitleId, TitleKind, ValidationProgress,
};

use crate::hasher::hash_range;
use crate::options::ProcessOptions;
use crate::package::{FindingCode, HashOutcome, PackageInfo, SubcontainerInfo};

/// An opened sub-container kept alive between the two validation passes.
struct Opened {
    content_id: ContentId,
    kind: ContentKind,
    name: String,
    container: Box<dyn Subcontainer>,
    /// Sections can be decrypted with the keys at hand.
    readable: bool,
}

/// True when a sub-container's program id belongs to the package's title.
fn belongs_to_title(program_id: TitleId, package: &PackageInfo) -> bool {
    match package.title_kind {
        TitleKind::AddOnContent | TitleKind::DataPatch => {
            program_id.group_prefix() == package.title_id.group_prefix()
                || program_id.application_id(TitleKind::AddOnContent) == package.base_title_id
        }
        _ => program_id.group_prefix() == package.base_title_id.group_prefix(),
    }
}

/// Open and check every present sub-container.
pub fn validate_subcontainers(
    package: &mut PackageInfo,
    cnmt: &ContentMeta,
    backend: &dyn ContainerBackend,
    progress: &dyn Fn(ValidationProgress),
) -> Result<(), NspError> {
    let mut ids: Vec<ContentId> = package.content_order.clone();
    ids.push(package.meta_content_id);
    let present: Vec<(ContentId, ContentKind, EntrySource)> = ids
        .iter()
        .filter_map(|id| {
            let raw = package.raw_entry_for(id)?;
            let kind = package.content_entries.get(id)?.kind;
            Some((
                *id,
                kind,
                EntrySource {
                    name: raw.name.clone(),
                    path: package.path.clone(),
                    offset: raw.offset,
                    size: raw.size,
                },
            ))
        })
        .collect();

    progress(ValidationProgress::phase("Validating sub-containers"));
    let total = present.len();
    let mut opened = Vec::with_capacity(total);
    for (i, (content_id, kind, source)) in present.into_iter().enumerate() {
        progress(ValidationProgress::subcontainer(&source.name, i + 1, total));
        match backend.open(&source, &package.title_keys) {
            Ok(container) => {
                opened.push(check_header(package, content_id, kind, &source.name, container)?);
            }
            Err(e) => package.error(
                FindingCode::Structure,
                format!("Failed to open {}: {}", source.name, e),
            ),
        }
    }

    // Sparse sub-containers are only known once every section was seen.
    for o in &mut opened {
        match o.kind {
            ContentKind::Program => check_program(package, o),
            ContentKind::Control => read_control(package, o),
            _ => {}
        }
    }

    if cnmt.is_compacted() && !package.has_sparse_subcontainers {
        package.error(
            FindingCode::Content,
            "Content metadata is compacted but no sparse sub-container was found",
        );
    }
    Ok(())
}

/// Header and section checks for one opened sub-container.
fn check_header(
    package: &mut PackageInfo,
    content_id: ContentId,
    kind: ContentKind,
    name: &str,
    mut container: Box<dyn Subcontainer>,
) -> Result<Opened, NspError> {
    let header = container.header().clone();
    if header.key_generation > MAX_KEY_GENERATION {
        return Err(NspError::UnsupportedKeyGeneration {
            found: header.key_generation,
            max: MAX_KEY_GENERATION,
        });
    }
    package.key_generation = package.key_generation.max(header.key_generation);

    if let Some(rights_id) = header.rights_id {
        package.has_title_key_crypto = true;
        match package.rights_id {
            None => package.rights_id = Some(rights_id),
            Some(existing) if existing != rights_id => package.error(
                FindingCode::Ticket,
                format!(
                    "{} uses rights id {} but the package uses {}",
                    name, rights_id, existing
                ),
            ),
            Some(_) => {}
        }
    }

    let header_signature = container.verify_header_signature();
    match header_signature {
        SignatureCheck::Valid => {}
        SignatureCheck::Invalid => package.error(
            FindingCode::Structure,
            format!("Header signature of {} is invalid", name),
        ),
        SignatureCheck::Unverifiable => package.warn(
            FindingCode::Structure,
            format!("Header signature of {} could not be verified", name),
        ),
    }

    let expected_type = kind.header_type();
    if header.content_type != expected_type {
        package.error(
            FindingCode::Content,
            format!(
                "{} is declared as {} but its header says {:?}",
                name, kind, header.content_type
            ),
        );
    }
    match header.distribution {
        DistributionType::Download => {}
        DistributionType::GameCard => package.warn(
            FindingCode::Structure,
            format!("{} is a game card sub-container", name),
        ),
        DistributionType::Unknown(x) => package.warn(
            FindingCode::Structure,
            format!("{} has unknown distribution type {}", name, x),
        ),
    }
    if !belongs_to_title(header.program_id, package) {
        package.error(
            FindingCode::Content,
            format!(
                "{} belongs to program {} instead of title {}",
                name, header.program_id, package.title_id
            ),
        );
    }

    let readable = header
        .rights_id
        .is_none_or(|r| package.title_keys.get(&r).is_some());
    let mut sections = container.sections();
    for section in &mut sections {
        if section.is_sparse {
            package.has_sparse_subcontainers = true;
        }
        if section.is_patch_section || section.is_sparse {
            debug!("{} section {}: integrity check skipped", name, section.index);
            continue;
        }
        if !readable {
            continue;
        }
        if let Err(e) = container.verify_section(section.index) {
            package.error(
                FindingCode::Hash,
                format!("{} section {} failed integrity check: {}", name, section.index, e),
            );
            section.error = Some(e.to_string());
        }
    }

    package.subcontainers.insert(
        content_id,
        SubcontainerInfo {
            filename: name.to_string(),
            content_id,
            kind,
            header_signature,
            process_descriptor_valid: None,
            sections,
            hash: HashOutcome::NotChecked,
            rights_id: header.rights_id,
            key_generation: header.key_generation,
            program_id: header.program_id,
            distribution: header.distribution,
        },
    );

    Ok(Opened {
        content_id,
        kind,
        name: name.to_string(),
        container,
        readable,
    })
}

fn check_program(package: &mut PackageInfo, o: &mut Opened) {
    if !o.readable || o.container.header().content_type != SubcontainerType::Program {
        return;
    }
    let sparse = package.has_sparse_subcontainers;
    let valid = match o.container.verify_process_descriptor() {
        Ok(SignatureCheck::Valid) => Some(true),
        Ok(SignatureCheck::Invalid) => {
            let message = format!("Process descriptor signature of {} is invalid", o.name);
            if sparse {
                package.warn(FindingCode::Structure, message);
            } else {
                package.error(FindingCode::Structure, message);
            }
            Some(false)
        }
        Ok(SignatureCheck::Unverifiable) => {
            package.warn(
                FindingCode::Structure,
                format!("Process descriptor signature of {} could not be verified", o.name),
            );
            None
        }
        Err(e) => {
            let message = format!("Cannot open process descriptor of {}: {}", o.name, e);
            if sparse {
                package.warn(FindingCode::Structure, message);
            } else {
                package.error(FindingCode::Structure, message);
            }
            None
        }
    };
    if let Some(info) = package.subcontainers.get_mut(&o.content_id) {
        info.process_descriptor_valid = valid;
    }
}

fn read_control(package: &mut PackageInfo, o: &mut Opened) {
    if !o.readable {
        return;
    }
    let titles = o
        .container
        .read_section_file(0, CONTROL_FILE_NAME)
        .and_then(|data| display_titles(&data));
    match titles {
        Ok(titles) => package.display_titles.extend(titles),
        Err(e) => {
            warn!("{}: cannot read control data: {}", o.name, e);
            package.warn(
                FindingCode::Naming,
                format!("Cannot read control data from {}", o.name),
            );
        }
    }
}

/// Hash every present sub-container and compare against the metadata.
pub fn verify_hashes(
    package: &mut PackageInfo,
    options: &ProcessOptions,
    progress: &dyn Fn(ValidationProgress),
) -> Result<(), NspError> {
    if !options.should_hash(package.can_proceed) {
        debug!("{}: hash verification skipped", package.path.display());
        return Ok(());
    }
    progress(ValidationProgress::phase("Verifying hashes"));

    let mut file = File::open(&package.path)?;
    let ids: Vec<ContentId> = package.subcontainers.keys().copied().collect();
    for id in ids {
        let (Some(raw), Some(entry)) = (
            package.raw_entry_for(&id),
            package.content_entries.get(&id),
        ) else {
            continue;
        };
        let (name, offset, size) = (raw.name.clone(), raw.offset, raw.size);
        let entry = entry.clone();

        let digest = hash_range(&mut file, &name, offset, size, progress)?;
        let outcome = if entry.matches_digest(&digest) {
            HashOutcome::Match
        } else {
            package.error(
                FindingCode::Hash,
                format!("Hash mismatch for {}: computed {}", name, hex::encode(digest)),
            );
            HashOutcome::Mismatch
        };
        if let Some(info) = package.subcontainers.get_mut(&id) {
            info.hash = outcome;
        }
    }
    Ok(())
}
