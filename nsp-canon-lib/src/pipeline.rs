//! Runs one package through every phase and the selected action.

use std::path::{Path, PathBuf};

use log::{debug, info};
use nsp_canon_core::{ContainerBackend, NspError, TitleLookup, ValidationProgress};

use crate::error::OutputError;
use crate::naming::{NameRegistry, canonical_name, check_update_version};
use crate::options::{Action, CheckMode, ProcessOptions};
use crate::output::{ActionOutcome, apply_action};
use crate::package::{FindingCode, PackageInfo, PipelineStage};
use crate::{cdn, policy, scanner, tickets, validator};

/// Success, or an accepted no-op.
pub const EXIT_SUCCESS: i32 = 0;
/// Validation or structural failure.
pub const EXIT_FAILURE: i32 = 1;
/// The output target exists and overwriting was not requested.
pub const EXIT_CONFLICT: i32 = 2;

/// How processing of one item ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemResult {
    Done(ActionOutcome),
    /// Validation found errors; no action was taken.
    Rejected,
    /// Structural failure or output error.
    Failed(String),
    Conflict(PathBuf),
}

/// Result of processing one archive or CDN directory.
#[derive(Debug, Clone)]
pub struct ItemReport {
    pub path: PathBuf,
    /// Validation state, absent when the archive could not be opened.
    pub package: Option<PackageInfo>,
    pub result: ItemResult,
}

impl ItemReport {
    pub fn failed(path: &Path, message: impl Into<String>) -> Self {
        Self {
            path: path.to_path_buf(),
            package: None,
            result: ItemResult::Failed(message.into()),
        }
    }

    pub fn exit_code(&self) -> i32 {
        match self.result {
            ItemResult::Done(_) => EXIT_SUCCESS,
            ItemResult::Rejected | ItemResult::Failed(_) => EXIT_FAILURE,
            ItemResult::Conflict(_) => EXIT_CONFLICT,
        }
    }
}

/// Validate an archive. Structural failures are returned as errors; every
/// other problem is recorded on the returned package.
pub fn validate(
    path: &Path,
    options: &ProcessOptions,
    lookup: &dyn TitleLookup,
    backend: &dyn ContainerBackend,
    progress: &dyn Fn(ValidationProgress),
) -> Result<PackageInfo, NspError> {
    progress(ValidationProgress::phase("Reading archive"));
    let (mut package, cnmt) = scanner::open_package(path, backend)?;
    debug!(
        "{}: {} {} {} with {} sub-containers",
        path.display(),
        package.title_kind,
        package.title_id,
        package.version_string(),
        package.content_order.len()
    );

    policy::check_title(&mut package, &cnmt);
    tickets::import_tickets(&mut package, backend)?;
    tickets::check_certificates(&mut package, options)?;
    policy::check_content(&mut package);

    if options.check_mode == CheckMode::Full {
        validator::validate_subcontainers(&mut package, &cnmt, backend, progress)?;
        policy::check_crypto(&mut package, backend, options);
        validator::verify_hashes(&mut package, options, progress)?;
    }
    policy::check_layout(&mut package, options);

    package.canonical_name = Some(canonical_name(&package, lookup));
    check_update_version(&mut package, lookup);
    package.advance(PipelineStage::NameResolved);

    policy::decide(&mut package);
    Ok(package)
}

/// Validate an archive and, if it may proceed, run the selected action.
pub fn process_archive(
    path: &Path,
    options: &ProcessOptions,
    lookup: &dyn TitleLookup,
    backend: &dyn ContainerBackend,
    names: &mut NameRegistry,
    progress: &dyn Fn(ValidationProgress),
) -> ItemReport {
    let mut package = match validate(path, options, lookup, backend, progress) {
        Ok(p) => p,
        Err(e) => return ItemReport::failed(path, e.to_string()),
    };

    if let Some(name) = package.canonical_name.clone()
        && let Some(other) = names.register(&name, path)
    {
        package.warn(
            FindingCode::Naming,
            format!("Output name {} is also produced by {}", name, other.display()),
        );
    }

    let result = if !package.can_proceed {
        if options.action != Action::Validate {
            info!("{}: validation failed, no action taken", path.display());
        }
        ItemResult::Rejected
    } else {
        match apply_action(&package, backend, options, progress) {
            Ok(outcome) => ItemResult::Done(outcome),
            Err(OutputError::Conflict(target)) => ItemResult::Conflict(target),
            Err(e) => ItemResult::Failed(e.to_string()),
        }
    };

    ItemReport {
        path: path.to_path_buf(),
        package: Some(package),
        result,
    }
}

/// Process an archive file or a CDN directory.
pub fn process_item(
    path: &Path,
    options: &ProcessOptions,
    lookup: &dyn TitleLookup,
    backend: &dyn ContainerBackend,
    names: &mut NameRegistry,
    progress: &dyn Fn(ValidationProgress),
) -> ItemReport {
    if path.is_dir() {
        cdn::import_cdn(path, options, lookup, backend, names, progress)
    } else {
        process_archive(path, options, lookup, backend, names, progress)
    }
}
