//! Consistency policy engine.
//!
//! Each check reads the package state built by the scanner, ticket importer
//! and validator, and records findings. Checks never stop early; the
//! pipeline decides afterwards whether the package can proceed.

use log::{debug, info};
use nsp_canon_core::kinds::EntryPriority;
use nsp_canon_core::ticket::{SignatureType, TicketIssue};
use nsp_canon_core::{
    ContainerBackend, ContentId, ContentKind, ContentMeta, SignatureCheck, TitleKind,
};

use crate::options::{CheckMode, ProcessOptions};
use crate::output::{expected_entry_names, keeps_original_ticket};
use crate::package::{FindingCode, PackageInfo, PipelineStage};

pub const MISSING_TICKET: &str = "TitleKey encrypted but no valid ticket found";

/// Title id consistency between the metadata and its extended header.
pub fn check_title(package: &mut PackageInfo, cnmt: &ContentMeta) {
    let id = package.title_id;
    match package.title_kind {
        TitleKind::Application => {
            if id.group_prefix() != id.0 {
                package.warn(
                    FindingCode::Content,
                    format!("Application title id {} is not a base application id", id),
                );
            }
            if let Some(related) = cnmt.related_title_id()
                && related != id.patch_id()
            {
                package.warn(
                    FindingCode::Content,
                    format!(
                        "Application {} names update {} instead of {}",
                        id,
                        related,
                        id.patch_id()
                    ),
                );
            }
        }
        TitleKind::Patch => {
            if let Some(related) = cnmt.related_title_id()
                && related != package.base_title_id
            {
                package.warn(
                    FindingCode::Content,
                    format!(
                        "Update {} names application {} instead of {}",
                        id, related, package.base_title_id
                    ),
                );
            }
        }
        _ => {}
    }
}

/// Every declared sub-container must be present with its declared size,
/// and every sub-container present must be declared.
pub fn check_content(package: &mut PackageInfo) {
    for id in package.content_order.clone() {
        let Some(entry) = package.content_entries.get(&id).cloned() else {
            continue;
        };
        match package.raw_entry_for(&id).map(|r| r.size) {
            None if entry.kind == ContentKind::DeltaFragment => {
                package.missing_delta_fragments += 1;
                info!("Delta fragment {} is not present", entry.filename());
            }
            None => package.error(
                FindingCode::Content,
                format!("Missing sub-container {}", entry.filename()),
            ),
            Some(size) if size != entry.size => package.error(
                FindingCode::Content,
                format!(
                    "Size mismatch for {}: metadata declares {} bytes, archive holds {}",
                    entry.filename(),
                    entry.size,
                    size
                ),
            ),
            Some(_) => {}
        }
    }

    let names: Vec<String> = package
        .entry_order
        .iter()
        .filter(|n| {
            package.raw_entries.get(*n).is_some_and(|e| {
                matches!(e.priority, Some(EntryPriority::Nca | EntryPriority::MetaNca))
            })
        })
        .cloned()
        .collect();
    for name in names {
        match ContentId::from_filename(&name) {
            Ok((id, _)) if package.content_entries.contains_key(&id) => {}
            Ok(_) => package.error(
                FindingCode::Content,
                format!("Unreferenced sub-container {}", name),
            ),
            Err(_) => package.error(
                FindingCode::Content,
                format!("Malformed sub-container name {}", name),
            ),
        }
    }
    package.advance(PipelineStage::ContentVerified);
}

/// Ticket presence, signature and normalisation rules.
pub fn check_crypto(
    package: &mut PackageInfo,
    backend: &dyn ContainerBackend,
    options: &ProcessOptions,
) {
    match (package.has_title_key_crypto, package.ticket.as_ref()) {
        (true, None) => {
            if package.title_kind == TitleKind::AddOnContent && options.allow_unlicensed_addon {
                package.warn(
                    FindingCode::Ticket,
                    "Unlicensed add-on content: title key encrypted but no ticket",
                );
            } else {
                package.error(FindingCode::Ticket, MISSING_TICKET);
            }
        }
        (false, Some(ticket)) => {
            let rights_id = ticket.rights_id;
            package.error(
                FindingCode::Ticket,
                format!(
                    "Ticket {} is present but no sub-container uses title key crypto",
                    rights_id
                ),
            );
        }
        (true, Some(ticket)) => {
            let ticket_rights = ticket.rights_id;
            if let Some(rights_id) = package.rights_id
                && rights_id != ticket_rights
            {
                package.error(
                    FindingCode::Ticket,
                    format!(
                        "Ticket rights id {} does not match sub-container rights id {}",
                        ticket_rights, rights_id
                    ),
                );
            }
        }
        (false, None) => {}
    }

    if let Some(ticket) = package.ticket.clone() {
        if ticket.signature_type != SignatureType::Rsa2048Sha256 {
            package.error(FindingCode::Ticket, TicketIssue::SignatureType.describe());
        }
        package.is_normalised_ticket_signature = ticket.is_normalised_signature();

        let chain = options
            .reference_cert
            .as_ref()
            .map(|r| r.bytes().to_vec())
            .or_else(|| package.certificate.clone())
            .unwrap_or_default();
        let signature = backend.verify_ticket_signature(&ticket, &chain);
        package.ticket_signature = Some(signature);
        match signature {
            SignatureCheck::Valid => {}
            SignatureCheck::Invalid if package.is_normalised_ticket_signature => {
                debug!("Ticket {} carries the normalised signature", ticket.rights_id);
            }
            SignatureCheck::Invalid if package.title_kind.is_update() => package.error(
                FindingCode::Ticket,
                "Update ticket signature is invalid; the ticket cannot be kept or regenerated",
            ),
            SignatureCheck::Invalid => {
                package.error(FindingCode::Ticket, "Ticket signature is invalid")
            }
            SignatureCheck::Unverifiable => package.warn(
                FindingCode::Ticket,
                "Ticket signature could not be verified",
            ),
        }

        if !keeps_original_ticket(package) && !ticket.is_normalised() {
            for issue in ticket.issues() {
                if issue != TicketIssue::SignatureType {
                    package.warn(FindingCode::Ticket, issue.describe());
                }
            }
            package.must_regenerate_ticket = true;
            package.warn(FindingCode::Ticket, "Ticket must be regenerated");
        }
    }
    package.advance(PipelineStage::CryptoVerified);
}

/// Entry order and archive padding.
pub fn check_layout(package: &mut PackageInfo, options: &ProcessOptions) {
    let actual: Vec<String> = package
        .entry_order
        .iter()
        .filter(|n| package.raw_entries.get(*n).is_some_and(|e| !e.is_loose()))
        .cloned()
        .collect();
    let expected = expected_entry_names(package);
    package.is_entry_order_correct = actual == expected;
    if !package.is_entry_order_correct {
        debug!("Entry order {:?}, expected {:?}", actual, expected);
        package.warn(FindingCode::Ordering, "Entries are not in canonical order");
    }

    if package.bad_padding {
        let message = "Archive padding is not canonical";
        if options.check_mode == CheckMode::PaddingOnly {
            package.error(FindingCode::Padding, message);
        } else {
            package.warn(FindingCode::Padding, message);
        }
    }
}

/// Final decision. Returns whether the package may proceed to output.
pub fn decide(package: &mut PackageInfo) -> bool {
    package.can_proceed = package.errors.is_empty();
    package.advance(PipelineStage::Decided);
    package.can_proceed
}

#[cfg(test)]
#[path = "tests/policy_tests.rs"]
mod tests;
