//! Immutable options for one invocation.

use std::path::PathBuf;

use nsp_canon_core::cert::ReferenceCertificate;

/// The single terminal action of an invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Action {
    /// Validate and report only.
    #[default]
    Validate,
    Rename,
    Extract,
    Convert,
}

/// How sub-container hashes are checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HashMode {
    /// Hash unless the package already failed another check.
    #[default]
    Verify,
    Skip,
    /// Hash even when the package already failed.
    Force,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CheckMode {
    #[default]
    Full,
    /// Structure and padding only; bad padding is an error.
    PaddingOnly,
}

/// Options controlling validation and output.
///
/// Built once from the command line and settings file, then passed by
/// reference through the pipeline.
#[derive(Debug, Clone, Default)]
pub struct ProcessOptions {
    pub action: Action,
    pub hash_mode: HashMode,
    pub check_mode: CheckMode,
    /// Log every mutating step instead of performing it.
    pub dry_run: bool,
    /// Replace existing output files and directories.
    pub overwrite: bool,
    /// Extract tickets, certificates and loose files too.
    pub extract_all: bool,
    /// Write each sub-container's decrypted header next to it on extract.
    pub dump_headers: bool,
    /// Rebuild even when the package is already standard.
    pub force_convert: bool,
    /// Keep delta fragments when rebuilding.
    pub keep_deltas: bool,
    /// Remove the source once the output is written.
    pub delete_source: bool,
    /// Accept title-key encrypted add-on content without a ticket.
    pub allow_unlicensed_addon: bool,
    /// Descend into subdirectories when expanding input paths.
    pub recursive: bool,
    /// Output directory; defaults to the source's directory.
    pub output_dir: Option<PathBuf>,
    /// Known-good common certificate chain.
    pub reference_cert: Option<ReferenceCertificate>,
}

impl ProcessOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn action(mut self, action: Action) -> Self {
        self.action = action;
        self
    }

    pub fn hash_mode(mut self, mode: HashMode) -> Self {
        self.hash_mode = mode;
        self
    }

    pub fn check_mode(mut self, mode: CheckMode) -> Self {
        self.check_mode = mode;
        self
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(dir.into());
        self
    }

    /// Whether sub-container hashes should be computed for a package that
    /// has (or has not) failed so far.
    pub fn should_hash(&self, can_proceed: bool) -> bool {
        if self.check_mode == CheckMode::PaddingOnly {
            return false;
        }
        match self.hash_mode {
            HashMode::Verify => can_proceed,
            HashMode::Skip => false,
            HashMode::Force => true,
        }
    }
}
