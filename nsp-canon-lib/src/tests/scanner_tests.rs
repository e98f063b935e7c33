use super::*;
use std::fs;

use nsp_canon_core::pfs0::write_archive;

fn write(dir: &Path, name: &str, entries: &[(&str, &[u8])]) -> std::path::PathBuf {
    let path = dir.join(name);
    let mut data = Vec::new();
    write_archive(&mut data, entries).unwrap();
    fs::write(&path, data).unwrap();
    path
}

#[test]
fn test_scan_classifies_entries() {
    let dir = tempfile::tempdir().unwrap();
    let path = write(
        dir.path(),
        "a.nsp",
        &[
            ("00000000000000000000000000000001.nca", &[1; 0x10][..]),
            ("00000000000000000000000000000002.cnmt.nca", &[2; 0x08][..]),
            ("readme.txt", &[3; 0x04][..]),
        ],
    );

    let scanned = scan_archive(&path).unwrap();
    let priorities: Vec<_> = scanned.entries.iter().map(|e| e.priority).collect();
    assert_eq!(
        priorities,
        [Some(EntryPriority::Nca), Some(EntryPriority::MetaNca), None]
    );
    assert_eq!(scanned.entries[1].offset, scanned.pfs.data_offset + 0x10);
    assert!(scanned.pfs.has_canonical_padding());

    let source = scanned.source_for(&path, &scanned.entries[2]);
    assert_eq!(source.name, "readme.txt");
    assert_eq!(source.size, 4);
    assert_eq!(source.path, path);
}

#[test]
fn test_scan_rejects_bad_magic() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bad.nsp");
    fs::write(&path, [0u8; 0x40]).unwrap();
    assert!(matches!(scan_archive(&path), Err(NspError::BadMagic { .. })));
}

#[test]
fn test_scan_rejects_truncated_archive() {
    let dir = tempfile::tempdir().unwrap();
    let path = write(dir.path(), "short.nsp", &[("a.nca", &[9; 0x100][..])]);
    let data = fs::read(&path).unwrap();
    fs::write(&path, &data[..data.len() - 0x10]).unwrap();
    assert!(matches!(scan_archive(&path), Err(NspError::Truncated { .. })));
}

#[test]
fn test_scan_missing_file_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    assert!(matches!(
        scan_archive(&dir.path().join("none.nsp")),
        Err(NspError::Io(_))
    ));
}
