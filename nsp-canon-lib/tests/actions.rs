mod common;

use std::fs;
use std::path::{Path, PathBuf};

use common::*;
use nsp_canon_core::{NullLookup, Ticket};
use nsp_canon_lib::batch::{CancelToken, process_paths};
use nsp_canon_lib::naming::NameRegistry;
use nsp_canon_lib::options::{Action, ProcessOptions};
use nsp_canon_lib::output::ActionOutcome;
use nsp_canon_lib::pipeline::{
    EXIT_CONFLICT, EXIT_FAILURE, EXIT_SUCCESS, ItemReport, ItemResult, process_item, validate,
};

const CANONICAL: &str = "Test Game [0100123456780000][v0][BASE].nsp";

fn process(path: &Path, options: &ProcessOptions) -> ItemReport {
    process_item(
        path,
        options,
        &NullLookup,
        &TestBackend,
        &mut NameRegistry::new(),
        &|_| {},
    )
}

fn convert_to(out: &Path) -> ProcessOptions {
    common::options().action(Action::Convert).output_dir(out)
}

fn is_standard(path: &Path) -> bool {
    validate(path, &common::options(), &NullLookup, &TestBackend, &|_| {})
        .unwrap()
        .is_standard()
}

fn dir_entries(dir: &Path) -> Vec<PathBuf> {
    let mut entries: Vec<PathBuf> = fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().path())
        .collect();
    entries.sort();
    entries
}

#[test]
fn convert_reorders_and_result_is_standard() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("out");
    fs::create_dir(&out).unwrap();
    let mut built = PackageBuilder::application()
        .with_ticket(TicketStyle::Normalised)
        .build();
    let canonical_names: Vec<String> = built.entries.iter().map(|(n, _)| n.clone()).collect();
    built.entries.reverse();
    let source = built.write(&dir.path().join("shuffled.nsp"));
    assert!(!is_standard(&source));

    let report = process(&source, &convert_to(&out));
    let target = out.join(CANONICAL);
    assert_eq!(
        report.result,
        ItemResult::Done(ActionOutcome::Converted(target.clone()))
    );
    assert_eq!(report.exit_code(), EXIT_SUCCESS);
    assert_eq!(entry_names(&target), canonical_names);
    assert!(is_standard(&target));
    assert!(source.exists());
    assert!(!out.join(format!("{}.part", CANONICAL)).exists());

    // A second pass has nothing left to do.
    let again = process(&target, &convert_to(&out));
    assert_eq!(again.result, ItemResult::Done(ActionOutcome::AlreadyStandard));
}

#[test]
fn standard_package_is_never_rewritten() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("out");
    fs::create_dir(&out).unwrap();
    let source = PackageBuilder::application()
        .build()
        .write(&dir.path().join("game.nsp"));

    for _ in 0..2 {
        let report = process(&source, &convert_to(&out));
        assert_eq!(report.result, ItemResult::Done(ActionOutcome::AlreadyStandard));
    }
    assert!(dir_entries(&out).is_empty());
}

#[test]
fn forced_convert_of_standard_package_is_byte_identical() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("out");
    fs::create_dir(&out).unwrap();
    let source = PackageBuilder::application()
        .with_ticket(TicketStyle::Normalised)
        .build()
        .write(&dir.path().join("game.nsp"));

    let mut options = convert_to(&out);
    options.force_convert = true;
    let report = process(&source, &options);
    assert_eq!(report.exit_code(), EXIT_SUCCESS);
    assert_eq!(fs::read(out.join(CANONICAL)).unwrap(), fs::read(&source).unwrap());
}

#[test]
fn convert_regenerates_personal_ticket() {
    let dir = tempfile::tempdir().unwrap();
    let built = PackageBuilder::application()
        .with_ticket(TicketStyle::Personalised)
        .build();
    let source = built.write(&dir.path().join("game.nsp"));
    let tik = built.rights_id.unwrap().ticket_filename();

    let report = process(&source, &convert_to(dir.path()));
    let target = dir.path().join(CANONICAL);
    assert_eq!(report.exit_code(), EXIT_SUCCESS);

    let ticket = Ticket::parse(&read_entry(&target, &tik)).unwrap();
    assert!(ticket.is_normalised());
    assert_eq!(ticket.encrypted_title_key(), TITLE_KEY);
    assert!(is_standard(&target));
}

#[test]
fn convert_replaces_mismatched_certificate() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("out");
    fs::create_dir(&out).unwrap();
    let mut built = PackageBuilder::application()
        .with_ticket(TicketStyle::Normalised)
        .build();
    let cert = built.rights_id.unwrap().cert_filename();
    let slot = built.entries.iter_mut().find(|(n, _)| *n == cert).unwrap();
    slot.1 = vec![0xC3; 0x600];
    let source = built.write(&dir.path().join("game.nsp"));
    assert!(!is_standard(&source));

    let bare = ProcessOptions::new().action(Action::Convert).output_dir(&out);
    let report = process(&source, &bare);
    assert!(matches!(&report.result, ItemResult::Failed(m) if m.contains(&cert)));
    assert!(dir_entries(&out).is_empty());

    let report = process(&source, &convert_to(&out));
    assert_eq!(report.exit_code(), EXIT_SUCCESS);
    let target = out.join(CANONICAL);
    assert_eq!(read_entry(&target, &cert), common_cert());
    assert!(is_standard(&target));
}

#[test]
fn convert_keeps_signed_update_ticket() {
    let dir = tempfile::tempdir().unwrap();
    let mut built = PackageBuilder::update()
        .with_ticket(TicketStyle::Signed)
        .build();
    let tik = built.rights_id.unwrap().ticket_filename();
    let original = built.entry(&tik).to_vec();
    built
        .entries
        .push(("readme.txt".to_string(), b"loose".to_vec()));
    let source = built.write(&dir.path().join("update.nsp"));

    let report = process(&source, &convert_to(dir.path()));
    let target = dir.path().join("Test Game [0100123456780800][v65536][UPD].nsp");
    assert_eq!(report.result, ItemResult::Done(ActionOutcome::Converted(target.clone())));
    assert_eq!(read_entry(&target, &tik), original);
    assert!(!entry_names(&target).contains(&"readme.txt".to_string()));
}

#[test]
fn convert_drops_deltas_unless_kept() {
    let dir = tempfile::tempdir().unwrap();
    let built = PackageBuilder::update()
        .content(nsp_canon_core::ContentKind::DeltaFragment, 0, 9)
        .build();
    let delta = built.content_names[2].clone();
    let mut shuffled = built.clone();
    shuffled.entries.swap(0, 1);
    let source = shuffled.write(&dir.path().join("update.nsp"));
    let name = "Test Game [0100123456780800][v65536][UPD].nsp";

    let dropped = dir.path().join("dropped");
    fs::create_dir(&dropped).unwrap();
    process(&source, &convert_to(&dropped));
    assert!(!entry_names(&dropped.join(name)).contains(&delta));

    let kept = dir.path().join("kept");
    fs::create_dir(&kept).unwrap();
    let mut options = convert_to(&kept);
    options.keep_deltas = true;
    process(&source, &options);
    assert_eq!(entry_names(&kept.join(name))[2], delta);
}

#[test]
fn existing_target_is_a_conflict() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("out");
    fs::create_dir(&out).unwrap();
    let mut built = PackageBuilder::application().build();
    built.entries.reverse();
    let source = built.write(&dir.path().join("game.nsp"));
    let existing = out.join(CANONICAL);
    fs::write(&existing, b"keep me").unwrap();

    let summary = process_paths(
        &[source.clone()],
        &convert_to(&out),
        &NullLookup,
        &TestBackend,
        &|_| {},
        &CancelToken::new(),
    );
    assert_eq!(summary.exit_code(), EXIT_CONFLICT);
    assert_eq!(fs::read(&existing).unwrap(), b"keep me");

    let overwrite = convert_to(&out).overwrite(true);
    let report = process(&source, &overwrite);
    assert_eq!(report.exit_code(), EXIT_SUCCESS);
    assert!(is_standard(&existing));
}

#[test]
fn rejected_package_takes_no_action() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("out");
    let source = PackageBuilder::application()
        .without_ticket()
        .build()
        .write(&dir.path().join("game.nsp"));

    let report = process(&source, &convert_to(&out));
    assert_eq!(report.result, ItemResult::Rejected);
    assert_eq!(report.exit_code(), EXIT_FAILURE);
    assert!(!out.exists());
}

#[test]
fn dry_run_extract_touches_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("out");
    let source = PackageBuilder::application()
        .build()
        .write(&dir.path().join("game.nsp"));

    let options = common::options()
        .action(Action::Extract)
        .output_dir(&out)
        .dry_run(true);
    let summary = process_paths(
        &[source],
        &options,
        &NullLookup,
        &TestBackend,
        &|_| {},
        &CancelToken::new(),
    );
    assert_eq!(summary.exit_code(), EXIT_SUCCESS);
    assert_eq!(
        summary.items[0].result,
        ItemResult::Done(ActionOutcome::DryRun)
    );
    assert!(!out.exists());
}

#[test]
fn extract_writes_subcontainers_and_headers() {
    let dir = tempfile::tempdir().unwrap();
    let built = PackageBuilder::application()
        .with_ticket(TicketStyle::Normalised)
        .build();
    let source = built.write(&dir.path().join("game.nsp"));

    let mut options = common::options()
        .action(Action::Extract)
        .output_dir(dir.path());
    options.dump_headers = true;
    let report = process(&source, &options);
    let target = dir.path().join("Test Game [0100123456780000][v0][BASE]");
    assert_eq!(report.result, ItemResult::Done(ActionOutcome::Extracted(target.clone())));

    for name in built.content_names.iter().chain([&built.meta_name]) {
        assert_eq!(fs::read(target.join(name)).unwrap(), built.entry(name));
        let stem = name.strip_suffix(".nca").unwrap();
        let header = fs::read(target.join(format!("{}.header", stem))).unwrap();
        assert_eq!(&header[..4], MAGIC);
    }
    // Tickets and certificates only with extract_all.
    let tik = built.rights_id.unwrap().ticket_filename();
    assert!(!target.join(tik).exists());
}

#[test]
fn extract_then_import_reproduces_archive() {
    let dir = tempfile::tempdir().unwrap();
    let extracted = dir.path().join("extracted");
    let rebuilt = dir.path().join("rebuilt");
    fs::create_dir(&extracted).unwrap();
    fs::create_dir(&rebuilt).unwrap();
    let source = PackageBuilder::application()
        .with_ticket(TicketStyle::Normalised)
        .build()
        .write(&dir.path().join("game.nsp"));

    let mut extract = common::options()
        .action(Action::Extract)
        .output_dir(&extracted);
    extract.extract_all = true;
    let ItemResult::Done(ActionOutcome::Extracted(cdn)) = process(&source, &extract).result else {
        panic!("extract failed");
    };

    let report = process(&cdn, &convert_to(&rebuilt));
    assert_eq!(report.exit_code(), EXIT_SUCCESS, "{:?}", report.result);
    assert_eq!(
        fs::read(rebuilt.join(CANONICAL)).unwrap(),
        fs::read(&source).unwrap()
    );
    assert_eq!(dir_entries(&extracted), vec![cdn]);
}

#[test]
fn cdn_import_defaults_to_parent_and_deletes_source() {
    let dir = tempfile::tempdir().unwrap();
    let built = PackageBuilder::application()
        .with_ticket(TicketStyle::Personalised)
        .build();
    let cdn = built.write_cdn_dir(&dir.path().join("0100123456780000"));

    let mut options = common::options().action(Action::Rename);
    options.delete_source = true;
    let report = process(&cdn, &options);
    let target = dir.path().join(CANONICAL);
    assert_eq!(report.result, ItemResult::Done(ActionOutcome::Converted(target.clone())));
    assert!(is_standard(&target));
    assert!(!cdn.exists());
    assert_eq!(dir_entries(dir.path()), vec![target]);
}

#[test]
fn cdn_dry_run_builds_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let cdn = PackageBuilder::application()
        .build()
        .write_cdn_dir(&dir.path().join("cdn"));

    let options = common::options().action(Action::Convert).dry_run(true);
    let report = process(&cdn, &options);
    assert_eq!(report.result, ItemResult::Done(ActionOutcome::DryRun));
    assert_eq!(dir_entries(dir.path()), vec![cdn]);
}

#[test]
fn cdn_dry_run_still_validates() {
    let dir = tempfile::tempdir().unwrap();
    let built = PackageBuilder::application().build();
    let cdn = built.write_cdn_dir(&dir.path().join("cdn"));
    fs::remove_file(cdn.join(&built.content_names[0])).unwrap();

    let options = common::options().action(Action::Convert).dry_run(true);
    let report = process(&cdn, &options);
    assert_eq!(report.result, ItemResult::Rejected);
    assert_eq!(report.exit_code(), EXIT_FAILURE);
    assert_eq!(report.path, cdn);
    assert_eq!(dir_entries(dir.path()), vec![cdn]);
}

#[test]
fn rename_moves_to_canonical_name() {
    let dir = tempfile::tempdir().unwrap();
    let source = PackageBuilder::application()
        .build()
        .write(&dir.path().join("dump.nsp"));

    let report = process(&source, &common::options().action(Action::Rename));
    let target = dir.path().join(CANONICAL);
    assert_eq!(report.result, ItemResult::Done(ActionOutcome::Renamed(target.clone())));
    assert!(!source.exists());

    let again = process(&target, &common::options().action(Action::Rename));
    assert_eq!(again.result, ItemResult::Done(ActionOutcome::AlreadyNamed));
}

#[test]
fn convert_can_delete_source() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("out");
    fs::create_dir(&out).unwrap();
    let mut built = PackageBuilder::application().build();
    built.entries.reverse();
    let source = built.write(&dir.path().join("game.nsp"));

    let mut options = convert_to(&out);
    options.delete_source = true;
    assert_eq!(process(&source, &options).exit_code(), EXIT_SUCCESS);
    assert!(!source.exists());
    assert!(out.join(CANONICAL).exists());
}

#[test]
fn batch_reports_worst_item() {
    let dir = tempfile::tempdir().unwrap();
    PackageBuilder::application()
        .build()
        .write(&dir.path().join("a.nsp"));
    PackageBuilder::add_on()
        .without_ticket()
        .build()
        .write(&dir.path().join("b.nsp"));
    fs::write(dir.path().join("c.nsp"), b"not an archive").unwrap();

    let summary = process_paths(
        &[dir.path().to_path_buf(), dir.path().join("missing.nsp")],
        &common::options(),
        &NullLookup,
        &TestBackend,
        &|_| {},
        &CancelToken::new(),
    );
    assert_eq!(summary.items.len(), 4);
    assert_eq!(summary.succeeded(), 1);
    assert_eq!(summary.items[1].result, ItemResult::Rejected);
    assert!(matches!(summary.items[2].result, ItemResult::Failed(_)));
    assert!(matches!(summary.items[3].result, ItemResult::Failed(_)));
    assert_eq!(summary.exit_code(), EXIT_FAILURE);
}

#[test]
fn cancelled_batch_stops_before_next_item() {
    let dir = tempfile::tempdir().unwrap();
    let source = PackageBuilder::application()
        .build()
        .write(&dir.path().join("a.nsp"));
    let cancel = CancelToken::new();
    cancel.cancel();

    let summary = process_paths(
        &[source],
        &common::options(),
        &NullLookup,
        &TestBackend,
        &|_| {},
        &cancel,
    );
    assert!(summary.cancelled);
    assert!(summary.items.is_empty());
    assert_eq!(summary.exit_code(), EXIT_SUCCESS);
}
