use owo_colors::OwoColorize;
use owo_colors::Stream::Stdout;

use nsp_canon_core::cert::ReferenceCertificate;
use nsp_canon_core::{NullLookup, TitleLookup};
use nsp_canon_lib::settings::Settings;
use nsp_canon_lib::{
    Action, ActionOutcome, BatchSummary, CancelToken, CheckMode, HashMode, ItemReport, ItemResult,
    PackageInfo, ProcessOptions, process_paths,
};
use nsp_canon_nca::{KeySet, NcaBackend};
use nsp_canon_titledb::TitleDatabase;

use crate::cli_types::ProcessArgs;
use crate::error::CliError;
use crate::spinner::ItemSpinner;

/// Merge command-line flags with the settings file into one set of options.
pub(crate) fn build_options(
    args: &ProcessArgs,
    settings: &Settings,
) -> Result<ProcessOptions, CliError> {
    let action = if args.extract {
        Action::Extract
    } else if args.standard {
        Action::Convert
    } else if args.rename {
        Action::Rename
    } else {
        Action::Validate
    };
    let hash_mode = if args.skip_hash {
        HashMode::Skip
    } else if args.force_hash {
        HashMode::Force
    } else {
        HashMode::Verify
    };
    let check_mode = if args.check_padding {
        CheckMode::PaddingOnly
    } else {
        CheckMode::Full
    };

    let mut options = ProcessOptions::new()
        .action(action)
        .hash_mode(hash_mode)
        .check_mode(check_mode)
        .dry_run(args.dry_run)
        .overwrite(args.overwrite);
    options.extract_all = args.extract_all;
    options.dump_headers = args.dump_headers;
    options.force_convert = args.force_convert;
    options.keep_deltas = args.keep_deltas;
    options.delete_source = args.delete_source;
    options.allow_unlicensed_addon = args.allow_unlicensed_addon;
    options.recursive = args.recursive;
    options.output_dir = settings.output_dir(args.output.clone());

    if let Some(path) = settings.common_cert_path(args.cert.clone()) {
        let cert = ReferenceCertificate::load(&path)
            .map_err(|e| CliError::certificate(format!("{}: {}", path.display(), e)))?;
        options.reference_cert = Some(cert);
    }
    Ok(options)
}

/// Keys are required in every mode: even a padding check reads the title
/// metadata out of the meta sub-container.
fn load_backend(args: &ProcessArgs, settings: &Settings) -> Result<NcaBackend, CliError> {
    let path = settings.keys_path(args.keys.clone());
    let keys = KeySet::load(&path).map_err(|e| CliError::keys(e.to_string()))?;
    Ok(NcaBackend::new(keys))
}

fn load_lookup(args: &ProcessArgs, settings: &Settings) -> Result<Box<dyn TitleLookup>, CliError> {
    match settings.titledb_path(args.titledb.clone()) {
        Some(dir) => {
            let db = TitleDatabase::load_dir(&dir)
                .map_err(|e| CliError::titledb(format!("{}: {}", dir.display(), e)))?;
            log::debug!("Loaded {} title records from {}", db.len(), dir.display());
            Ok(Box::new(db))
        }
        None => {
            log::warn!("No title database configured; names come from control data only");
            Ok(Box::new(NullLookup))
        }
    }
}

fn describe_outcome(outcome: &ActionOutcome) -> String {
    match outcome {
        ActionOutcome::Validated => "valid".to_string(),
        ActionOutcome::Renamed(to) => format!("renamed to {}", to.display()),
        ActionOutcome::AlreadyNamed => "already named".to_string(),
        ActionOutcome::Extracted(dir) => format!("extracted to {}", dir.display()),
        ActionOutcome::Converted(to) => format!("converted to {}", to.display()),
        ActionOutcome::AlreadyStandard => "already standard".to_string(),
        ActionOutcome::DryRun => "dry run".to_string(),
    }
}

fn print_findings(package: &PackageInfo) {
    for finding in &package.errors {
        log::warn!(
            "    {} {}",
            "error:".if_supports_color(Stdout, |t| t.red()),
            finding,
        );
    }
    for finding in &package.warnings {
        log::warn!(
            "    {} {}",
            "warning:".if_supports_color(Stdout, |t| t.yellow()),
            finding,
        );
    }
}

fn print_report(report: &ItemReport) {
    let display = report
        .package
        .as_ref()
        .and_then(|p| p.canonical_name.clone())
        .unwrap_or_else(|| report.path.display().to_string());

    match &report.result {
        ItemResult::Done(outcome) => {
            log::info!(
                "  {} {} {}",
                "\u{2714}".if_supports_color(Stdout, |t| t.green()),
                display,
                format!("({})", describe_outcome(outcome))
                    .if_supports_color(Stdout, |t| t.dimmed()),
            );
        }
        ItemResult::Rejected => {
            log::warn!(
                "  {} {} {}",
                "\u{2718}".if_supports_color(Stdout, |t| t.red()),
                report.path.display(),
                "(rejected)".if_supports_color(Stdout, |t| t.dimmed()),
            );
        }
        ItemResult::Failed(message) => {
            log::warn!(
                "  {} {}: {}",
                "\u{2718}".if_supports_color(Stdout, |t| t.red()),
                report.path.display(),
                message,
            );
        }
        ItemResult::Conflict(target) => {
            log::warn!(
                "  {} {}: {} already exists (use --overwrite)",
                "?".if_supports_color(Stdout, |t| t.yellow()),
                report.path.display(),
                target.display(),
            );
        }
    }
    if let Some(package) = &report.package {
        print_findings(package);
    }
}

fn print_summary(summary: &BatchSummary) {
    log::info!("");
    log::info!(
        "{} processed: {} ok, {} failed{}",
        summary.items.len().if_supports_color(Stdout, |t| t.bold()),
        summary.succeeded().if_supports_color(Stdout, |t| t.green()),
        summary.failed().if_supports_color(Stdout, |t| t.red()),
        if summary.cancelled { " (cancelled)" } else { "" },
    );
}

/// Validate and act on every path. Returns the process exit code.
pub(crate) fn run_process(args: ProcessArgs, quiet: bool) -> Result<i32, CliError> {
    let settings = Settings::load().map_err(|e| CliError::config(e.to_string()))?;
    let options = build_options(&args, &settings)?;
    let backend = load_backend(&args, &settings)?;
    let lookup = load_lookup(&args, &settings)?;

    let spinner = ItemSpinner::new(quiet);
    let summary = process_paths(
        &args.paths,
        &options,
        lookup.as_ref(),
        &backend,
        &|event| spinner.update(&event),
        &CancelToken::new(),
    );
    spinner.finish();

    for report in &summary.items {
        print_report(report);
    }
    print_summary(&summary);
    Ok(summary.exit_code())
}
