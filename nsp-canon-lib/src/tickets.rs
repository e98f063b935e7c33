//! Ticket importer and certificate check.

use std::fs::File;

use log::debug;
use nsp_canon_core::cert::{CertificateCheck, check_certificate};
use nsp_canon_core::kinds::EntryPriority;
use nsp_canon_core::{ContainerBackend, NspError, Ticket};

use crate::hasher::read_range;
use crate::options::ProcessOptions;
use crate::package::{FindingCode, PackageInfo, RawEntryInfo};

/// Import every ticket in the archive, registering decrypted title keys in
/// the package's key store. The first usable ticket is kept.
pub fn import_tickets(
    package: &mut PackageInfo,
    backend: &dyn ContainerBackend,
) -> Result<(), NspError> {
    let entries: Vec<RawEntryInfo> = package
        .entries_with_priority(EntryPriority::Ticket)
        .into_iter()
        .cloned()
        .collect();
    if entries.is_empty() {
        return Ok(());
    }
    let mut file = File::open(&package.path)?;
    let mut kept: Option<String> = None;

    for entry in entries {
        let data = read_range(&mut file, entry.offset, entry.size)?;
        let ticket = match Ticket::parse(&data) {
            Ok(t) => t,
            Err(e) => {
                package.warn(
                    FindingCode::Ticket,
                    format!("Cannot decode ticket {}: {}", entry.name, e),
                );
                continue;
            }
        };
        if ticket.rights_id.is_zero() {
            package.warn(
                FindingCode::Ticket,
                format!("Ticket {} has an empty rights id, skipped", entry.name),
            );
            continue;
        }
        let expected = ticket.rights_id.ticket_filename();
        if entry.name != expected {
            package.warn(
                FindingCode::Naming,
                format!("Ticket {} should be named {}", entry.name, expected),
            );
        }
        let key = match backend.decrypt_title_key(&ticket) {
            Ok(k) => k,
            Err(e) => {
                package.warn(
                    FindingCode::Ticket,
                    format!("Cannot decrypt title key from {}: {}", entry.name, e),
                );
                continue;
            }
        };
        package.title_keys.insert(ticket.rights_id, key);
        debug!("Registered title key for rights id {}", ticket.rights_id);

        match &kept {
            None => {
                kept = Some(entry.name.clone());
                package.ticket = Some(ticket);
            }
            Some(first) => package.warn(
                FindingCode::Ticket,
                format!("Multiple tickets, using first ({})", first),
            ),
        }
    }
    Ok(())
}

/// Load the certificate entry and compare it against the expected chain.
pub fn check_certificates(
    package: &mut PackageInfo,
    options: &ProcessOptions,
) -> Result<(), NspError> {
    let entries: Vec<RawEntryInfo> = package
        .entries_with_priority(EntryPriority::Certificate)
        .into_iter()
        .cloned()
        .collect();
    let Some(first) = entries.first() else {
        return Ok(());
    };
    if entries.len() > 1 {
        package.warn(
            FindingCode::Certificate,
            format!("Multiple certificates, using first ({})", first.name),
        );
    }

    let mut file = File::open(&package.path)?;
    let data = read_range(&mut file, first.offset, first.size)?;
    match check_certificate(&data, options.reference_cert.as_ref()) {
        CertificateCheck::Ok => {}
        CertificateCheck::WrongLength(len) => {
            package.must_replace_certificate = true;
            package.warn(
                FindingCode::Certificate,
                format!("Certificate {} has unexpected length 0x{:X}", first.name, len),
            );
        }
        CertificateCheck::WrongDigest => {
            package.must_replace_certificate = true;
            package.warn(
                FindingCode::Certificate,
                format!("Certificate {} does not match the common certificate", first.name),
            );
        }
    }
    package.certificate = Some(data);
    Ok(())
}
