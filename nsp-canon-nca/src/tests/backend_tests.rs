use super::*;
use std::io::Write;

use nsp_canon_core::RightsId;
use nsp_canon_core::kinds::DistributionType;
use nsp_canon_core::pfs0::write_archive;
use nsp_canon_core::util::align_up;
use sha2::{Digest, Sha256};

const HEADER_KEY: [u8; 32] = [0x24; 32];
const KEY_AREA_KEY: [u8; 16] = [0x71; 16];
const CTR_KEY: [u8; 16] = [0x3C; 16];
const TITLE_KEK: [u8; 16] = [0x99; 16];
const SECURE_VALUE: [u8; 8] = [1, 0, 0, 0, 7, 0, 0, 0];
const PREFIX: u64 = 0x100;

fn keyset() -> KeySet {
    let mut keys = KeySet::new();
    keys.header_key = Some(HEADER_KEY);
    keys.key_area_keys[0][0] = Some(KEY_AREA_KEY);
    keys.title_keks[0] = Some(TITLE_KEK);
    keys
}

/// A PartitionFS section protected by a single SHA-256 table.
fn pfs0_section(files: &[(&str, &[u8])], encryption: u8) -> (Vec<u8>, Vec<u8>) {
    let mut pfs = Vec::new();
    write_archive(&mut pfs, files).unwrap();

    let block_size = 0x1000usize;
    let table: Vec<u8> = pfs
        .chunks(block_size)
        .flat_map(|c| Sha256::digest(c).to_vec())
        .collect();
    let data_offset = align_up(table.len() as u64, 0x200);

    let mut data = table.clone();
    data.resize(data_offset as usize, 0);
    data.extend_from_slice(&pfs);
    data.resize(align_up(data.len() as u64, 0x200) as usize, 0);

    let mut fs = vec![0u8; 0x200];
    fs[0x00..0x02].copy_from_slice(&2u16.to_le_bytes());
    fs[0x02] = 1;
    fs[0x03] = 2;
    fs[0x04] = encryption;
    let hd = 0x08;
    fs[hd..hd + 0x20].copy_from_slice(&Sha256::digest(&table));
    fs[hd + 0x20..hd + 0x24].copy_from_slice(&(block_size as u32).to_le_bytes());
    fs[hd + 0x24..hd + 0x28].copy_from_slice(&2u32.to_le_bytes());
    fs[hd + 0x28..hd + 0x30].copy_from_slice(&0u64.to_le_bytes());
    fs[hd + 0x30..hd + 0x38].copy_from_slice(&(table.len() as u64).to_le_bytes());
    fs[hd + 0x38..hd + 0x40].copy_from_slice(&data_offset.to_le_bytes());
    fs[hd + 0x40..hd + 0x48].copy_from_slice(&(pfs.len() as u64).to_le_bytes());
    fs[0x140..0x148].copy_from_slice(&SECURE_VALUE);
    (data, fs)
}

/// Assemble and encrypt a complete sub-container.
fn build_nca(
    sections: Vec<(Vec<u8>, Vec<u8>)>,
    content_type: u8,
    rights_id: Option<RightsId>,
    section_key: [u8; 16],
) -> Vec<u8> {
    let mut header = vec![0u8; HEADER_REGION_SIZE];
    header[0x200..0x204].copy_from_slice(b"NCA3");
    header[0x205] = content_type;
    header[0x210..0x218].copy_from_slice(&0x0100_1234_5678_0000u64.to_le_bytes());
    if let Some(rights) = rights_id {
        header[0x230..0x240].copy_from_slice(&rights.0);
    }
    header[0x320..0x330].copy_from_slice(&crypto::encrypt_block(&CTR_KEY, &KEY_AREA_KEY));

    let mut body = Vec::new();
    for (index, (mut data, fs)) in sections.into_iter().enumerate() {
        let start = HEADER_REGION_SIZE as u64 + body.len() as u64;
        let end = start + data.len() as u64;
        let entry = 0x240 + index * 0x10;
        header[entry..entry + 4].copy_from_slice(&((start / 0x200) as u32).to_le_bytes());
        header[entry + 4..entry + 8].copy_from_slice(&((end / 0x200) as u32).to_le_bytes());
        header[0x280 + index * 0x20..0x2A0 + index * 0x20].copy_from_slice(&Sha256::digest(&fs));
        header[0x400 + index * 0x200..0x600 + index * 0x200].copy_from_slice(&fs);
        if fs[0x04] == 3 {
            crypto::apply_section_ctr(&mut data, &section_key, &SECURE_VALUE, start).unwrap();
        }
        body.extend_from_slice(&data);
    }
    let total = (HEADER_REGION_SIZE + body.len()) as u64;
    header[0x208..0x210].copy_from_slice(&total.to_le_bytes());

    crypto::encrypt_header(&mut header, &HEADER_KEY);
    header.extend_from_slice(&body);
    header
}

/// Write `nca` after a short prefix so entry offsets are exercised.
fn write_source(nca: &[u8]) -> (tempfile::NamedTempFile, EntrySource) {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(&[0xEE; PREFIX as usize]).unwrap();
    file.write_all(nca).unwrap();
    file.flush().unwrap();
    let source = EntrySource {
        name: "test.nca".to_string(),
        path: file.path().to_path_buf(),
        offset: PREFIX,
        size: nca.len() as u64,
    };
    (file, source)
}

fn control_nca() -> Vec<u8> {
    let section = pfs0_section(&[("a.bin", b"alpha"), ("b.bin", &[0x42; 0x2100])], 3);
    build_nca(vec![section], 2, None, CTR_KEY)
}

#[test]
fn test_open_reads_header() {
    let (_file, source) = write_source(&control_nca());
    let backend = NcaBackend::new(keyset());
    let nca = backend.open(&source, &TitleKeyStore::new()).unwrap();

    let header = nca.header();
    assert_eq!(header.content_type, SubcontainerType::Control);
    assert_eq!(header.distribution, DistributionType::Download);
    assert_eq!(header.program_id.0, 0x0100_1234_5678_0000);
    assert_eq!(header.content_size, source.size);
    assert!(!header.has_title_key_crypto());

    let sections = nca.sections();
    assert_eq!(sections.len(), 1);
    assert_eq!(sections[0].format, SectionFormat::PartitionFs);
    assert_eq!(sections[0].encryption, SectionEncryption::Ctr);
    assert_eq!(&nca.raw_header()[0x200..0x204], b"NCA3");
}

#[test]
fn test_ctr_section_verifies_and_reads() {
    let (_file, source) = write_source(&control_nca());
    let backend = NcaBackend::new(keyset());
    let mut nca = backend.open(&source, &TitleKeyStore::new()).unwrap();

    nca.verify_section(0).unwrap();
    assert_eq!(nca.list_section_files(0).unwrap(), ["a.bin", "b.bin"]);
    assert_eq!(nca.read_section_file(0, "a.bin").unwrap(), b"alpha");
    assert_eq!(nca.read_section_file(0, "b.bin").unwrap(), vec![0x42; 0x2100]);
    assert!(nca.read_section_file(0, "c.bin").is_err());
}

#[test]
fn test_corrupt_section_fails_verification() {
    let mut nca_bytes = control_nca();
    let last = nca_bytes.len() - 0x300;
    nca_bytes[last] ^= 0xFF;
    let (_file, source) = write_source(&nca_bytes);
    let backend = NcaBackend::new(keyset());
    let mut nca = backend.open(&source, &TitleKeyStore::new()).unwrap();
    assert!(nca.verify_section(0).is_err());
}

#[test]
fn test_plain_section() {
    let section = pfs0_section(&[("x.txt", b"plain")], 1);
    let (_file, source) = write_source(&build_nca(vec![section], 4, None, CTR_KEY));
    let backend = NcaBackend::new(keyset());
    let mut nca = backend.open(&source, &TitleKeyStore::new()).unwrap();
    nca.verify_section(0).unwrap();
    assert_eq!(nca.read_section_file(0, "x.txt").unwrap(), b"plain");
}

#[test]
fn test_title_key_crypto_needs_registered_key() {
    let rights: RightsId = "01001234567800000000000000000000".parse().unwrap();
    let title_key = [0x5E; 16];
    let section = pfs0_section(&[("a.bin", b"alpha")], 3);
    let (_file, source) = write_source(&build_nca(vec![section], 0, Some(rights), title_key));
    let backend = NcaBackend::new(keyset());

    let mut nca = backend.open(&source, &TitleKeyStore::new()).unwrap();
    assert!(nca.header().has_title_key_crypto());
    assert!(matches!(
        nca.read_section_file(0, "a.bin"),
        Err(NspError::MissingKey(_))
    ));

    let mut store = TitleKeyStore::new();
    store.insert(rights, title_key);
    let mut nca = backend.open(&source, &store).unwrap();
    assert_eq!(nca.read_section_file(0, "a.bin").unwrap(), b"alpha");
}

#[test]
fn test_missing_header_key() {
    let (_file, source) = write_source(&control_nca());
    let backend = NcaBackend::new(KeySet::new());
    assert!(matches!(
        backend.open(&source, &TitleKeyStore::new()),
        Err(NspError::MissingKey(_))
    ));
}

#[test]
fn test_wrong_header_key_is_bad_magic() {
    let (_file, source) = write_source(&control_nca());
    let mut keys = keyset();
    keys.header_key = Some([0x00; 32]);
    let backend = NcaBackend::new(keys);
    assert!(matches!(
        backend.open(&source, &TitleKeyStore::new()),
        Err(NspError::BadMagic { .. })
    ));
}

#[test]
fn test_header_signature_without_modulus() {
    let (_file, source) = write_source(&control_nca());
    let backend = NcaBackend::new(keyset());
    let nca = backend.open(&source, &TitleKeyStore::new()).unwrap();
    assert_eq!(nca.verify_header_signature(), SignatureCheck::Unverifiable);
}

#[test]
fn test_process_descriptor() {
    let mut npdm = vec![0u8; 0x80 + 0x240];
    npdm[..4].copy_from_slice(b"META");
    npdm[0x78..0x7C].copy_from_slice(&0x80u32.to_le_bytes());
    npdm[0x7C..0x80].copy_from_slice(&0x240u32.to_le_bytes());
    npdm[0x180..0x280].fill(0xC5);
    npdm[0x280..0x284].copy_from_slice(b"ACID");

    let exefs = pfs0_section(&[("main", b"code"), ("main.npdm", &npdm)], 3);
    let (_file, source) = write_source(&build_nca(vec![exefs], 0, None, CTR_KEY));
    let backend = NcaBackend::new(keyset());
    let mut nca = backend.open(&source, &TitleKeyStore::new()).unwrap();
    // The header carries no real signature.
    assert_eq!(
        nca.verify_process_descriptor().unwrap(),
        SignatureCheck::Invalid
    );
}

#[test]
fn test_process_descriptor_requires_program() {
    let (_file, source) = write_source(&control_nca());
    let backend = NcaBackend::new(keyset());
    let mut nca = backend.open(&source, &TitleKeyStore::new()).unwrap();
    assert!(nca.verify_process_descriptor().is_err());
}

#[test]
fn test_decrypt_title_key() {
    let title_key = [0x5E; 16];
    let mut raw = vec![0u8; 0x2C0];
    raw[0..4].copy_from_slice(&0x010004u32.to_le_bytes());
    raw[0x180..0x190].copy_from_slice(&crypto::encrypt_block(&title_key, &TITLE_KEK));
    raw[0x2A0..0x2B0].copy_from_slice(&[0x01; 16][..]);
    raw[0x2AF] = 0x00;
    let ticket = Ticket::parse(&raw).unwrap();

    let backend = NcaBackend::new(keyset());
    assert_eq!(backend.decrypt_title_key(&ticket).unwrap(), title_key);

    raw[0x2AF] = 0x09;
    let ticket = Ticket::parse(&raw).unwrap();
    assert!(matches!(
        backend.decrypt_title_key(&ticket),
        Err(NspError::MissingKey(_))
    ));
}

#[test]
fn test_ticket_signature_unverifiable_without_chain() {
    let mut raw = vec![0u8; 0x2C0];
    raw[0..4].copy_from_slice(&0x010004u32.to_le_bytes());
    let ticket = Ticket::parse(&raw).unwrap();
    let backend = NcaBackend::new(keyset());
    assert_eq!(
        backend.verify_ticket_signature(&ticket, &[]),
        SignatureCheck::Unverifiable
    );
}
