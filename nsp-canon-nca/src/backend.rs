//! [`ContainerBackend`] implementation over real NCA files.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};

use log::debug;
use nsp_canon_core::backend::{SectionEncryption, SectionFormat};
use nsp_canon_core::cert::{Certificate, PublicKey, find_signer};
use nsp_canon_core::kinds::SubcontainerType;
use nsp_canon_core::pfs0::Pfs0;
use nsp_canon_core::{
    ContainerBackend, EntrySource, NspError, SectionInfo, SignatureCheck, Subcontainer,
    SubcontainerHeader, Ticket, TitleKeyStore,
};

use crate::crypto::{self, HEADER_REGION_SIZE};
use crate::header::{NcaHeader, Section};
use crate::keys::{KeyAreaFamily, KeySet};
use crate::npdm::{NPDM_FILE_NAME, acid_modulus};
use crate::romfs;
use crate::section::{self, SectionReader};

/// Key area slot holding the AES-CTR section key.
const CTR_KEY_SLOT: usize = 2;

/// Opens NCA sub-containers with a loaded keyset.
#[derive(Debug, Clone)]
pub struct NcaBackend {
    keys: KeySet,
}

impl NcaBackend {
    pub fn new(keys: KeySet) -> Self {
        Self { keys }
    }

    pub fn keys(&self) -> &KeySet {
        &self.keys
    }

    /// Resolve the CTR key for a header: the registered title key for
    /// title-key crypto, otherwise the unwrapped key-area key.
    fn section_key(
        &self,
        header: &NcaHeader,
        title_keys: &TitleKeyStore,
    ) -> Result<[u8; 16], String> {
        if let Some(rights_id) = &header.summary.rights_id {
            return title_keys
                .get(rights_id)
                .copied()
                .ok_or_else(|| format!("no title key registered for rights id {}", rights_id));
        }
        let family = KeyAreaFamily::from_index(header.key_area_index).map_err(|e| e.to_string())?;
        let kak = self
            .keys
            .key_area_key(family, header.summary.key_generation)
            .map_err(|e| e.to_string())?;
        Ok(crypto::decrypt_block(
            &header.encrypted_key_area[CTR_KEY_SLOT],
            kak,
        ))
    }
}

impl ContainerBackend for NcaBackend {
    fn decrypt_title_key(&self, ticket: &Ticket) -> Result<[u8; 16], NspError> {
        let kek = self.keys.title_kek(ticket.rights_id.key_generation())?;
        Ok(crypto::decrypt_block(&ticket.encrypted_title_key(), kek))
    }

    fn open(
        &self,
        source: &EntrySource,
        title_keys: &TitleKeyStore,
    ) -> Result<Box<dyn Subcontainer>, NspError> {
        let header_key = self.keys.header_key()?;
        if source.size < HEADER_REGION_SIZE as u64 {
            return Err(NspError::truncated(
                "sub-container header",
                HEADER_REGION_SIZE as u64,
                source.size,
            ));
        }

        let mut file = File::open(&source.path)?;
        file.seek(SeekFrom::Start(source.offset))?;
        let mut region = vec![0u8; HEADER_REGION_SIZE];
        file.read_exact(&mut region)?;
        crypto::decrypt_header(&mut region, header_key)?;
        let header = NcaHeader::parse(region)?;

        if header.summary.content_size != source.size {
            debug!(
                "{}: header declares {} bytes, entry holds {}",
                source.name, header.summary.content_size, source.size
            );
        }

        let section_key = self.section_key(&header, title_keys);
        if let Err(reason) = &section_key {
            debug!("{}: sections unreadable: {}", source.name, reason);
        }
        let fixed_modulus = self
            .keys
            .header_fixed_key_modulus(header.signature_key_generation)
            .map(<[u8]>::to_vec);

        Ok(Box::new(OpenNca {
            name: source.name.clone(),
            file,
            base: source.offset,
            header,
            section_key,
            fixed_modulus,
        }))
    }

    fn verify_ticket_signature(&self, ticket: &Ticket, cert_chain: &[u8]) -> SignatureCheck {
        let Ok(chain) = Certificate::parse_chain(cert_chain) else {
            return SignatureCheck::Unverifiable;
        };
        match find_signer(&chain, &ticket.issuer).map(|c| &c.key) {
            Some(PublicKey::Rsa { modulus, exponent }) => crypto::verify_pkcs1(
                modulus,
                *exponent,
                ticket.signed_region(),
                &ticket.signature,
            ),
            _ => SignatureCheck::Unverifiable,
        }
    }
}

/// An opened NCA.
pub struct OpenNca {
    name: String,
    file: File,
    base: u64,
    header: NcaHeader,
    section_key: Result<[u8; 16], String>,
    fixed_modulus: Option<Vec<u8>>,
}

impl OpenNca {
    fn section(&self, index: usize) -> Result<&Section, NspError> {
        self.header.section(index).ok_or_else(|| {
            NspError::subcontainer(&self.name, format!("section {} is not present", index))
        })
    }

    /// Run `f` over a plaintext reader for section `index`.
    fn with_reader<T>(
        &mut self,
        index: usize,
        f: impl FnOnce(&mut SectionReader<'_, File>, &Section) -> Result<T, NspError>,
    ) -> Result<T, NspError> {
        let section = self
            .header
            .section(index)
            .ok_or_else(|| {
                NspError::subcontainer(&self.name, format!("section {} is not present", index))
            })?;
        let key = match section.encryption {
            SectionEncryption::None => None,
            SectionEncryption::Ctr => Some(
                self.section_key
                    .as_ref()
                    .map_err(|reason| NspError::missing_key(reason.clone()))?,
            ),
            other => {
                return Err(NspError::subcontainer(
                    &self.name,
                    format!("section {} uses unsupported encryption {:?}", index, other),
                ));
            }
        };
        let mut reader = SectionReader::new(&mut self.file, self.base, section, key);
        f(&mut reader, section)
    }

    fn pfs0_in(reader: &mut SectionReader<'_, File>, section: &Section) -> Result<Pfs0, NspError> {
        let (offset, _) = section
            .hash
            .data_region()
            .ok_or_else(|| NspError::invalid_format("section has no data region"))?;
        reader.seek(SeekFrom::Start(offset))?;
        Pfs0::parse(reader)
    }
}

impl Subcontainer for OpenNca {
    fn header(&self) -> &SubcontainerHeader {
        &self.header.summary
    }

    fn verify_header_signature(&self) -> SignatureCheck {
        crypto::verify_pss(
            self.fixed_modulus.as_deref(),
            self.header.signed_region(),
            self.header.fixed_key_signature(),
        )
    }

    fn sections(&self) -> Vec<SectionInfo> {
        self.header.sections.iter().map(Section::info).collect()
    }

    fn verify_section(&mut self, index: usize) -> Result<(), NspError> {
        let section = self.section(index)?;
        if !section.header_hash_ok {
            return Err(NspError::invalid_format("section header hash mismatch"));
        }
        if section.is_patch || section.is_sparse {
            return Ok(());
        }
        self.with_reader(index, |reader, section| section::verify(reader, &section.hash))
    }

    fn list_section_files(&mut self, index: usize) -> Result<Vec<String>, NspError> {
        self.with_reader(index, |reader, section| match section.format {
            SectionFormat::PartitionFs => {
                let pfs = Self::pfs0_in(reader, section)?;
                Ok(pfs.entries.into_iter().map(|e| e.name).collect())
            }
            SectionFormat::RomFs => {
                let (base, _) = section
                    .hash
                    .data_region()
                    .ok_or_else(|| NspError::invalid_format("section has no data region"))?;
                Ok(romfs::root_files(reader, base)?
                    .into_iter()
                    .map(|f| f.name)
                    .collect())
            }
            SectionFormat::Unknown(x) => Err(NspError::invalid_format(format!(
                "unknown section format {}",
                x
            ))),
        })
    }

    fn read_section_file(&mut self, index: usize, name: &str) -> Result<Vec<u8>, NspError> {
        self.with_reader(index, |reader, section| {
            let missing = || {
                NspError::invalid_format(format!("{} not found in section {}", name, index))
            };
            match section.format {
                SectionFormat::PartitionFs => {
                    let pfs = Self::pfs0_in(reader, section)?;
                    let entry = pfs.find(name).ok_or_else(missing)?;
                    pfs.read_entry(reader, entry)
                }
                SectionFormat::RomFs => {
                    let (base, _) = section
                        .hash
                        .data_region()
                        .ok_or_else(|| NspError::invalid_format("section has no data region"))?;
                    let file = romfs::root_files(reader, base)?
                        .into_iter()
                        .find(|f| f.name == name)
                        .ok_or_else(missing)?;
                    let mut buf = vec![0u8; file.size as usize];
                    reader.seek(SeekFrom::Start(base + file.offset))?;
                    reader.read_exact(&mut buf)?;
                    Ok(buf)
                }
                SectionFormat::Unknown(x) => Err(NspError::invalid_format(format!(
                    "unknown section format {}",
                    x
                ))),
            }
        })
    }

    fn verify_process_descriptor(&mut self) -> Result<SignatureCheck, NspError> {
        if self.header.summary.content_type != SubcontainerType::Program {
            return Err(NspError::subcontainer(&self.name, "not a program sub-container"));
        }
        let npdm = self.read_section_file(0, NPDM_FILE_NAME)?;
        let modulus = acid_modulus(&npdm)?;
        Ok(crypto::verify_pss(
            Some(modulus),
            self.header.signed_region(),
            self.header.descriptor_signature(),
        ))
    }

    fn raw_header(&self) -> Vec<u8> {
        self.header.raw.clone()
    }
}

#[cfg(test)]
#[path = "tests/backend_tests.rs"]
mod tests;
