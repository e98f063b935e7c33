//! Plaintext sub-container format and package builder shared by the
//! integration tests.
//!
//! ```text
//! [0x00] "TNCA"
//! [0x04] content type   (u8, header encoding)
//! [0x05] distribution   (u8)
//! [0x06] key generation (u8)
//! [0x07] flags          (u8, see FLAG_*)
//! [0x08] program id     (u64 LE)
//! [0x10] rights id      (0x10, zero for standard crypto)
//! [0x20] section 0      (PFS0)
//! ```

#![allow(dead_code)]

use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};

use nsp_canon_core::backend::{SectionEncryption, SectionFormat};
use nsp_canon_core::cert::ReferenceCertificate;
use nsp_canon_core::kinds::{DistributionType, SubcontainerType};
use nsp_canon_core::pfs0::{Pfs0, write_archive};
use nsp_canon_core::{
    ContainerBackend, ContentId, ContentKind, ContentMeta, ContentMetadataEntry, EntrySource,
    NspError, RightsId, SectionInfo, SignatureCheck, Subcontainer, SubcontainerHeader, Ticket,
    TitleId, TitleKeyStore, TitleKind,
};
use nsp_canon_lib::options::ProcessOptions;
use sha2::{Digest, Sha256};

pub const MAGIC: &[u8; 4] = b"TNCA";
const HEADER_SIZE: usize = 0x20;

pub const FLAG_BAD_HEADER_SIGNATURE: u8 = 0x01;
pub const FLAG_BAD_DESCRIPTOR: u8 = 0x02;
pub const FLAG_SPARSE: u8 = 0x04;
pub const FLAG_OPEN_FAILS: u8 = 0x08;
pub const FLAG_CORRUPT_SECTION: u8 = 0x10;
pub const FLAG_NO_DESCRIPTOR: u8 = 0x20;

/// Rights ids with a generation above this cannot be decrypted.
pub const NEWEST_TITLE_KEK: u8 = 0x10;
/// First signature byte of a ticket the test backend accepts as signed.
pub const SIGNED_MARK: u8 = 0x5A;
pub const TITLE_KEY: [u8; 16] = [0x42; 16];

pub fn common_cert() -> Vec<u8> {
    vec![0xC3; 0x700]
}

/// Default options with the fixture certificate as the reference chain.
pub fn options() -> ProcessOptions {
    ProcessOptions {
        reference_cert: Some(ReferenceCertificate::from_bytes(common_cert()).unwrap()),
        ..ProcessOptions::new()
    }
}

// ---------------------------------------------------------------------------
// Backend
// ---------------------------------------------------------------------------

/// Opens plaintext `TNCA` sub-containers.
#[derive(Debug, Default, Clone, Copy)]
pub struct TestBackend;

pub struct TestSubcontainer {
    header: SubcontainerHeader,
    flags: u8,
    raw: Vec<u8>,
    has_key: bool,
}

impl TestSubcontainer {
    fn require_key(&self) -> Result<(), NspError> {
        if self.has_key {
            Ok(())
        } else {
            Err(NspError::missing_key("title key"))
        }
    }

    fn section(&self) -> Result<Pfs0, NspError> {
        self.require_key()?;
        Pfs0::parse_bytes(&self.raw[HEADER_SIZE..])
    }
}

impl Subcontainer for TestSubcontainer {
    fn header(&self) -> &SubcontainerHeader {
        &self.header
    }

    fn verify_header_signature(&self) -> SignatureCheck {
        if self.flags & FLAG_BAD_HEADER_SIGNATURE != 0 {
            SignatureCheck::Invalid
        } else {
            SignatureCheck::Valid
        }
    }

    fn sections(&self) -> Vec<SectionInfo> {
        vec![SectionInfo {
            index: 0,
            encryption: SectionEncryption::Ctr,
            format: SectionFormat::PartitionFs,
            is_patch_section: false,
            is_sparse: self.flags & FLAG_SPARSE != 0,
            error: None,
        }]
    }

    fn verify_section(&mut self, index: usize) -> Result<(), NspError> {
        self.require_key()?;
        if index != 0 || self.flags & FLAG_CORRUPT_SECTION != 0 {
            return Err(NspError::invalid_format("block 0 hash mismatch"));
        }
        Ok(())
    }

    fn list_section_files(&mut self, _index: usize) -> Result<Vec<String>, NspError> {
        Ok(self.section()?.entries.into_iter().map(|e| e.name).collect())
    }

    fn read_section_file(&mut self, _index: usize, name: &str) -> Result<Vec<u8>, NspError> {
        let pfs = self.section()?;
        let entry = pfs
            .find(name)
            .ok_or_else(|| NspError::invalid_format(format!("{} not found", name)))?;
        pfs.read_entry(&mut Cursor::new(&self.raw[HEADER_SIZE..]), entry)
    }

    fn verify_process_descriptor(&mut self) -> Result<SignatureCheck, NspError> {
        self.require_key()?;
        if self.flags & FLAG_NO_DESCRIPTOR != 0 {
            return Err(NspError::invalid_format("main.npdm not found"));
        }
        if self.flags & FLAG_BAD_DESCRIPTOR != 0 {
            Ok(SignatureCheck::Invalid)
        } else {
            Ok(SignatureCheck::Valid)
        }
    }

    fn raw_header(&self) -> Vec<u8> {
        self.raw[..HEADER_SIZE].to_vec()
    }
}

impl ContainerBackend for TestBackend {
    fn decrypt_title_key(&self, ticket: &Ticket) -> Result<[u8; 16], NspError> {
        if ticket.rights_id.key_generation() > NEWEST_TITLE_KEK {
            return Err(NspError::missing_key(format!(
                "titlekek_{:02x}",
                ticket.rights_id.key_generation()
            )));
        }
        Ok(ticket.encrypted_title_key())
    }

    fn open(
        &self,
        source: &EntrySource,
        title_keys: &TitleKeyStore,
    ) -> Result<Box<dyn Subcontainer>, NspError> {
        let file = fs::read(&source.path)?;
        let start = source.offset as usize;
        let raw = file
            .get(start..start + source.size as usize)
            .ok_or_else(|| NspError::truncated("sub-container", source.size, 0))?
            .to_vec();
        if raw.len() < HEADER_SIZE {
            return Err(NspError::truncated(
                "sub-container header",
                HEADER_SIZE as u64,
                raw.len() as u64,
            ));
        }
        if &raw[..4] != MAGIC {
            return Err(NspError::bad_magic(MAGIC, &raw[..4]));
        }
        let flags = raw[7];
        if flags & FLAG_OPEN_FAILS != 0 {
            return Err(NspError::subcontainer(&source.name, "header decryption failed"));
        }

        let mut program_id = [0u8; 8];
        program_id.copy_from_slice(&raw[0x08..0x10]);
        let mut rights = [0u8; 16];
        rights.copy_from_slice(&raw[0x10..0x20]);
        let rights_id = Some(RightsId(rights)).filter(|r| !r.is_zero());

        let header = SubcontainerHeader {
            content_type: SubcontainerType::from(raw[4]),
            distribution: DistributionType::from(raw[5]),
            key_generation: raw[6],
            program_id: TitleId(u64::from_le_bytes(program_id)),
            content_size: source.size,
            rights_id,
        };
        let has_key = rights_id.is_none_or(|r| title_keys.get(&r).is_some());
        Ok(Box::new(TestSubcontainer {
            header,
            flags,
            raw,
            has_key,
        }))
    }

    fn verify_ticket_signature(&self, ticket: &Ticket, cert_chain: &[u8]) -> SignatureCheck {
        if cert_chain.is_empty() {
            SignatureCheck::Unverifiable
        } else if ticket.is_normalised_signature() {
            SignatureCheck::Invalid
        } else if ticket.signature.first() == Some(&SIGNED_MARK) {
            SignatureCheck::Valid
        } else {
            SignatureCheck::Invalid
        }
    }
}

// ---------------------------------------------------------------------------
// Fixture builders
// ---------------------------------------------------------------------------

fn header_type_byte(kind: ContentKind) -> u8 {
    match kind.header_type() {
        SubcontainerType::Program => 0,
        SubcontainerType::Meta => 1,
        SubcontainerType::Control => 2,
        SubcontainerType::Manual => 3,
        SubcontainerType::Data => 4,
        SubcontainerType::PublicData => 5,
        SubcontainerType::Unknown(x) => x,
    }
}

/// A plaintext sub-container around a PFS0 section.
pub fn tnca(
    content_type: u8,
    program_id: TitleId,
    rights_id: Option<RightsId>,
    key_generation: u8,
    flags: u8,
    files: &[(&str, &[u8])],
) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&[content_type, 0, key_generation, flags]);
    out.extend_from_slice(&program_id.0.to_le_bytes());
    out.extend_from_slice(&rights_id.map(|r| r.0).unwrap_or([0; 16]));
    write_archive(&mut out, files).unwrap();
    out
}

pub fn control_data(name: &str) -> Vec<u8> {
    let mut data = vec![0u8; 0x4000];
    data[..name.len()].copy_from_slice(name.as_bytes());
    data
}

pub fn sha256(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}

/// Rights id for a title: title id big-endian, key generation last.
pub fn rights_for(title_id: TitleId, key_generation: u8) -> RightsId {
    let mut r = [0u8; 16];
    r[..8].copy_from_slice(&title_id.0.to_be_bytes());
    r[15] = key_generation;
    RightsId(r)
}

/// How the package's ticket is encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TicketStyle {
    /// Already normalised, fixed signature.
    Normalised,
    /// Personalized console ticket with a valid server signature.
    Personalised,
    /// Common ticket with a valid server signature.
    Signed,
    /// Common ticket whose signature does not verify.
    Forged,
}

pub fn ticket_bytes(rights_id: RightsId, style: TicketStyle) -> Vec<u8> {
    let mut t = vec![0u8; 0x2C0];
    t[0..4].copy_from_slice(&0x010004u32.to_le_bytes());
    for (i, b) in t[4..0x104].iter_mut().enumerate() {
        *b = i as u8 | 0x80;
    }
    if matches!(style, TicketStyle::Signed | TicketStyle::Personalised) {
        t[4] = SIGNED_MARK;
    }
    let body = 0x140;
    let issuer = b"Root-CA00000003-XS00000020";
    t[body..body + issuer.len()].copy_from_slice(issuer);
    t[body + 0x40..body + 0x50].copy_from_slice(&TITLE_KEY);
    t[body + 0x140] = 2;
    t[body + 0x145] = rights_id.key_generation();
    if style == TicketStyle::Personalised {
        t[body + 0x141] = 1;
        t[body + 0x158..body + 0x160].copy_from_slice(&0xDEAD_BEEFu64.to_le_bytes());
    }
    t[body + 0x160..body + 0x170].copy_from_slice(&rights_id.0);
    t[body + 0x178..body + 0x17C].copy_from_slice(&0x2C0u32.to_le_bytes());
    match style {
        TicketStyle::Normalised => Ticket::parse(&t).unwrap().normalised().raw,
        _ => t,
    }
}

/// One sub-container to put in a package.
#[derive(Debug, Clone)]
pub struct ContentSpec {
    pub kind: ContentKind,
    pub flags: u8,
    /// Distinguishes otherwise identical contents.
    pub salt: u8,
}

/// Describes a package; [`PackageBuilder::build`] produces its entries.
#[derive(Debug, Clone)]
pub struct PackageBuilder {
    pub title_id: TitleId,
    pub kind: TitleKind,
    pub version: u32,
    pub key_generation: u8,
    pub title_key_crypto: bool,
    pub ticket: Option<TicketStyle>,
    pub contents: Vec<ContentSpec>,
    pub attributes: u8,
    pub name: String,
}

/// A built package: entries in canonical order plus the pieces tests
/// refer to.
#[derive(Debug, Clone)]
pub struct BuiltPackage {
    pub entries: Vec<(String, Vec<u8>)>,
    pub meta_name: String,
    pub content_names: Vec<String>,
    pub rights_id: Option<RightsId>,
    pub cnmt: ContentMeta,
}

impl PackageBuilder {
    pub fn new(title_id: u64, kind: TitleKind, version: u32) -> Self {
        Self {
            title_id: TitleId(title_id),
            kind,
            version,
            key_generation: 0,
            title_key_crypto: false,
            ticket: None,
            contents: vec![
                ContentSpec {
                    kind: ContentKind::Program,
                    flags: 0,
                    salt: 1,
                },
                ContentSpec {
                    kind: ContentKind::Control,
                    flags: 0,
                    salt: 2,
                },
            ],
            attributes: 0,
            name: "Test Game".to_string(),
        }
    }

    pub fn application() -> Self {
        Self::new(0x0100_1234_5678_0000, TitleKind::Application, 0)
    }

    pub fn update() -> Self {
        Self::new(0x0100_1234_5678_0800, TitleKind::Patch, 65536)
    }

    pub fn add_on() -> Self {
        let mut b = Self::new(0x0100_1234_5678_1001, TitleKind::AddOnContent, 0);
        b.contents = vec![ContentSpec {
            kind: ContentKind::Data,
            flags: 0,
            salt: 3,
        }];
        b
    }

    /// Title-key crypto with a ticket in the given style.
    pub fn with_ticket(mut self, style: TicketStyle) -> Self {
        self.title_key_crypto = true;
        self.ticket = Some(style);
        self
    }

    /// Title-key crypto but no ticket.
    pub fn without_ticket(mut self) -> Self {
        self.title_key_crypto = true;
        self.ticket = None;
        self
    }

    pub fn content(mut self, kind: ContentKind, flags: u8, salt: u8) -> Self {
        self.contents.push(ContentSpec { kind, flags, salt });
        self
    }

    pub fn flag_first(mut self, flags: u8) -> Self {
        self.contents[0].flags |= flags;
        self
    }

    fn related_id(&self) -> TitleId {
        match self.kind {
            TitleKind::Application => self.title_id.patch_id(),
            kind => self.title_id.application_id(kind),
        }
    }

    fn content_bytes(&self, spec: &ContentSpec, rights_id: Option<RightsId>) -> Vec<u8> {
        let program_id = self.title_id;
        let ty = header_type_byte(spec.kind);
        let filler = vec![spec.salt; 0x40 + spec.salt as usize];
        match spec.kind {
            ContentKind::Program => tnca(
                ty,
                program_id,
                rights_id,
                self.key_generation,
                spec.flags,
                &[("main", &filler[..]), ("main.npdm", &b"META"[..])],
            ),
            ContentKind::Control => {
                let control = control_data(&self.name);
                tnca(
                    ty,
                    program_id,
                    rights_id,
                    self.key_generation,
                    spec.flags,
                    &[("control.nacp", &control[..])],
                )
            }
            _ => tnca(
                ty,
                program_id,
                rights_id,
                self.key_generation,
                spec.flags,
                &[("data.bin", &filler[..])],
            ),
        }
    }

    pub fn build(&self) -> BuiltPackage {
        let rights_id = self
            .title_key_crypto
            .then(|| rights_for(self.title_id, self.key_generation));

        let mut records = Vec::new();
        let mut nca_entries = Vec::new();
        for spec in &self.contents {
            let bytes = self.content_bytes(spec, rights_id);
            let hash = sha256(&bytes);
            let content_id = ContentId::from_hash(&hash);
            records.push(ContentMetadataEntry {
                content_id,
                hash,
                size: bytes.len() as u64,
                kind: spec.kind,
                id_offset: 0,
            });
            nca_entries.push((content_id.filename(false), bytes));
        }

        let mut extended_header = self.related_id().0.to_le_bytes().to_vec();
        extended_header.extend_from_slice(&[0u8; 8]);
        let cnmt = ContentMeta {
            title_id: self.title_id,
            version: self.version,
            kind: self.kind,
            attributes: self.attributes,
            required_download_system_version: 0,
            extended_header,
            entries: records,
            content_meta_count: 0,
        };
        let cnmt_name = format!("{}_{}.cnmt", self.kind, self.title_id);
        let meta = tnca(
            1,
            self.title_id,
            None,
            self.key_generation,
            0,
            &[(cnmt_name.as_str(), &cnmt.encode()[..])],
        );
        let meta_name = ContentId::from_hash(&sha256(&meta)).filename(true);

        let content_names = nca_entries.iter().map(|(n, _)| n.clone()).collect();
        let mut entries = nca_entries;
        entries.push((meta_name.clone(), meta));
        if let (Some(rights_id), Some(style)) = (rights_id, self.ticket) {
            entries.push((rights_id.ticket_filename(), ticket_bytes(rights_id, style)));
            entries.push((rights_id.cert_filename(), common_cert()));
        }

        BuiltPackage {
            entries,
            meta_name,
            content_names,
            rights_id,
            cnmt,
        }
    }
}

impl BuiltPackage {
    pub fn write(&self, path: &Path) -> PathBuf {
        write_entries(path, &self.entries)
    }

    /// Every entry as a loose file, the way a CDN dump stores them.
    pub fn write_cdn_dir(&self, dir: &Path) -> PathBuf {
        fs::create_dir_all(dir).unwrap();
        for (name, data) in &self.entries {
            fs::write(dir.join(name), data).unwrap();
        }
        dir.to_path_buf()
    }

    pub fn entry(&self, name: &str) -> &[u8] {
        &self
            .entries
            .iter()
            .find(|(n, _)| n == name)
            .unwrap()
            .1
    }
}

pub fn write_entries(path: &Path, entries: &[(String, Vec<u8>)]) -> PathBuf {
    let borrowed: Vec<(&str, &[u8])> = entries
        .iter()
        .map(|(n, d)| (n.as_str(), d.as_slice()))
        .collect();
    let mut data = Vec::new();
    write_archive(&mut data, &borrowed).unwrap();
    fs::write(path, data).unwrap();
    path.to_path_buf()
}

/// Entry names of an archive on disk, in order.
pub fn entry_names(path: &Path) -> Vec<String> {
    let data = fs::read(path).unwrap();
    Pfs0::parse_bytes(&data)
        .unwrap()
        .entries
        .into_iter()
        .map(|e| e.name)
        .collect()
}

/// Contents of one entry of an archive on disk.
pub fn read_entry(path: &Path, name: &str) -> Vec<u8> {
    let data = fs::read(path).unwrap();
    let pfs = Pfs0::parse_bytes(&data).unwrap();
    let entry = pfs.find(name).unwrap();
    pfs.read_entry(&mut Cursor::new(&data), entry).unwrap()
}

/// Replace the package's metadata with `cnmt`, re-encoding the meta
/// sub-container and renaming it after its new hash.
pub fn replace_meta(built: &mut BuiltPackage, cnmt: &ContentMeta) {
    let cnmt_name = format!("{}_{}.cnmt", cnmt.kind, cnmt.title_id);
    let meta = tnca(
        1,
        cnmt.title_id,
        None,
        0,
        0,
        &[(cnmt_name.as_str(), &cnmt.encode()[..])],
    );
    let name = ContentId::from_hash(&sha256(&meta)).filename(true);
    let slot = built
        .entries
        .iter_mut()
        .find(|(n, _)| *n == built.meta_name)
        .unwrap();
    *slot = (name.clone(), meta);
    built.meta_name = name;
    built.cnmt = cnmt.clone();
}
