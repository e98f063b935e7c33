//! Validation and deterministic repackaging engine for eShop packages.
//!
//! The entry points are [`pipeline::validate`] for a single archive and
//! [`batch::process_paths`] for a list of archives and CDN directories.

pub mod batch;
pub mod cdn;
pub mod error;
pub mod hasher;
pub mod naming;
pub mod options;
pub mod output;
pub mod package;
pub mod pipeline;
pub mod policy;
pub mod scanner;
pub mod settings;
pub mod tickets;
pub mod validator;

pub use batch::{BatchSummary, CancelToken, process_paths};
pub use error::OutputError;
pub use options::{Action, CheckMode, HashMode, ProcessOptions};
pub use output::ActionOutcome;
pub use package::{Finding, FindingCode, HashOutcome, PackageInfo, PipelineStage};
pub use pipeline::{EXIT_CONFLICT, EXIT_FAILURE, EXIT_SUCCESS, ItemReport, ItemResult};
