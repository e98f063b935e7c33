//! Batch driver: expands input paths and processes each item in turn.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use log::{info, warn};
use nsp_canon_core::{ContainerBackend, TitleLookup, ValidationProgress};

use crate::cdn::is_cdn_dir;
use crate::naming::{NameRegistry, PACKAGE_EXTENSION};
use crate::options::ProcessOptions;
use crate::pipeline::{EXIT_SUCCESS, ItemReport, ItemResult, process_item};

/// Cooperative cancellation flag, checked between items.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Reports of every processed item.
#[derive(Debug, Clone, Default)]
pub struct BatchSummary {
    pub items: Vec<ItemReport>,
    /// Processing stopped early on request.
    pub cancelled: bool,
}

impl BatchSummary {
    /// The worst exit code of any item.
    pub fn exit_code(&self) -> i32 {
        self.items
            .iter()
            .map(ItemReport::exit_code)
            .max()
            .unwrap_or(EXIT_SUCCESS)
    }

    pub fn succeeded(&self) -> usize {
        self.items
            .iter()
            .filter(|i| matches!(i.result, ItemResult::Done(_)))
            .count()
    }

    pub fn failed(&self) -> usize {
        self.items.len() - self.succeeded()
    }
}

fn is_package_file(path: &Path) -> bool {
    path.is_file()
        && path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.to_ascii_lowercase().ends_with(PACKAGE_EXTENSION))
}

fn expand_dir(dir: &Path, recursive: bool, out: &mut Vec<PathBuf>) {
    let mut children: Vec<PathBuf> = match fs::read_dir(dir) {
        Ok(rd) => rd.filter_map(|e| e.ok()).map(|e| e.path()).collect(),
        Err(e) => {
            warn!("Cannot read {}: {}", dir.display(), e);
            return;
        }
    };
    children.sort();
    for child in children {
        if is_package_file(&child) {
            out.push(child);
        } else if child.is_dir() {
            if is_cdn_dir(&child) {
                out.push(child);
            } else if recursive {
                expand_dir(&child, recursive, out);
            }
        }
    }
}

/// Turn the command-line paths into work items: archive files and CDN
/// directories. Plain directories are searched for both.
pub fn expand_paths(paths: &[PathBuf], recursive: bool) -> Vec<PathBuf> {
    let mut out = Vec::new();
    for path in paths {
        if path.is_dir() && !is_cdn_dir(path) {
            expand_dir(path, recursive, &mut out);
        } else {
            out.push(path.clone());
        }
    }
    out
}

/// Process every item named by `paths`, one after another.
pub fn process_paths(
    paths: &[PathBuf],
    options: &ProcessOptions,
    lookup: &dyn TitleLookup,
    backend: &dyn ContainerBackend,
    progress: &dyn Fn(ValidationProgress),
    cancel: &CancelToken,
) -> BatchSummary {
    let items = expand_paths(paths, options.recursive);
    let mut summary = BatchSummary::default();
    let mut names = NameRegistry::new();

    for (i, path) in items.iter().enumerate() {
        if cancel.is_cancelled() {
            info!("Cancelled after {} of {} items", i, items.len());
            summary.cancelled = true;
            break;
        }
        progress(ValidationProgress::Package {
            path: path.display().to_string(),
            current: i + 1,
            total: items.len(),
        });

        let report = if path.exists() {
            process_item(path, options, lookup, backend, &mut names, progress)
        } else {
            ItemReport::failed(path, format!("{} does not exist", path.display()))
        };
        summary.items.push(report);
    }
    summary
}
