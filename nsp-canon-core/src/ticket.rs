//! Ticket decoding, normalisation, and re-encoding.
//!
//! A ticket is a signed record granting the title key for one rights id. The
//! signature block size depends on the signature type; the body that follows
//! is fixed at 0x180 bytes, optionally followed by section records.
//!
//! ## Body layout (offsets from the body start)
//! ```text
//! [0x000] Issuer              (0x40, ASCII)
//! [0x040] TitleKeyBlock       (0x100)
//! [0x140] FormatVersion       (u8)
//! [0x141] TitleKeyType        (u8: 0 common, 1 personalized)
//! [0x142] TicketVersion       (u16 LE)
//! [0x144] LicenseType         (u8: 0 permanent)
//! [0x145] CommonKeyId         (u8: master key revision)
//! [0x146] PropertyMask        (u16 LE)
//! [0x148] Reserved            (8)
//! [0x150] TicketId            (u64 LE)
//! [0x158] DeviceId            (u64 LE)
//! [0x160] RightsId            (0x10)
//! [0x170] AccountId           (u32 LE)
//! [0x174] SectTotalSize       (u32 LE)
//! [0x178] SectHeaderOffset    (u32 LE)
//! [0x17C] SectNum             (u16 LE)
//! [0x17E] SectEntrySize       (u16 LE)
//! ```

use crate::NspError;
use crate::ids::RightsId;
use crate::util::{ensure_len, read_array, read_ascii, read_u16_le, read_u32_le, read_u64_le};

const BODY_SIZE: usize = 0x180;
/// Size of a ticket in the RSA-2048/SHA-256 layout without section records.
pub const NORMALISED_TICKET_SIZE: usize = 0x2C0;
/// Issuer of tickets signed by the eShop ticket server.
pub const COMMON_ISSUER: &str = "Root-CA00000003-XS00000020";
/// Fill byte of the fixed signature carried by normalised tickets.
pub const NORMALISED_SIGNATURE_BYTE: u8 = 0xFF;
const NORMALISED_FORMAT_VERSION: u8 = 2;

/// Signature scheme of a ticket or certificate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureType {
    Rsa4096Sha1,
    Rsa2048Sha1,
    EcdsaSha1,
    Rsa4096Sha256,
    Rsa2048Sha256,
    EcdsaSha256,
    HmacSha1,
}

impl SignatureType {
    pub fn from_u32(value: u32) -> Option<Self> {
        Some(match value {
            0x010000 => Self::Rsa4096Sha1,
            0x010001 => Self::Rsa2048Sha1,
            0x010002 => Self::EcdsaSha1,
            0x010003 => Self::Rsa4096Sha256,
            0x010004 => Self::Rsa2048Sha256,
            0x010005 => Self::EcdsaSha256,
            0x010006 => Self::HmacSha1,
            _ => return None,
        })
    }

    pub fn as_u32(self) -> u32 {
        match self {
            Self::Rsa4096Sha1 => 0x010000,
            Self::Rsa2048Sha1 => 0x010001,
            Self::EcdsaSha1 => 0x010002,
            Self::Rsa4096Sha256 => 0x010003,
            Self::Rsa2048Sha256 => 0x010004,
            Self::EcdsaSha256 => 0x010005,
            Self::HmacSha1 => 0x010006,
        }
    }

    /// (signature size, padding size) following the 4-byte type field.
    pub fn block_layout(self) -> (usize, usize) {
        match self {
            Self::Rsa4096Sha1 | Self::Rsa4096Sha256 => (0x200, 0x3C),
            Self::Rsa2048Sha1 | Self::Rsa2048Sha256 => (0x100, 0x3C),
            Self::EcdsaSha1 | Self::EcdsaSha256 => (0x3C, 0x40),
            Self::HmacSha1 => (0x14, 0x28),
        }
    }
}

/// Title-key type field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TitleKeyType {
    Common,
    Personalized,
    Unknown(u8),
}

impl From<u8> for TitleKeyType {
    fn from(v: u8) -> Self {
        match v {
            0 => Self::Common,
            1 => Self::Personalized,
            x => Self::Unknown(x),
        }
    }
}

impl TitleKeyType {
    fn as_u8(self) -> u8 {
        match self {
            Self::Common => 0,
            Self::Personalized => 1,
            Self::Unknown(x) => x,
        }
    }
}

/// License type field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LicenseType {
    Permanent,
    Demo,
    Trial,
    Rental,
    Subscription,
    Service,
    Unknown(u8),
}

impl From<u8> for LicenseType {
    fn from(v: u8) -> Self {
        match v {
            0 => Self::Permanent,
            1 => Self::Demo,
            2 => Self::Trial,
            3 => Self::Rental,
            4 => Self::Subscription,
            5 => Self::Service,
            x => Self::Unknown(x),
        }
    }
}

impl LicenseType {
    fn as_u8(self) -> u8 {
        match self {
            Self::Permanent => 0,
            Self::Demo => 1,
            Self::Trial => 2,
            Self::Rental => 3,
            Self::Subscription => 4,
            Self::Service => 5,
            Self::Unknown(x) => x,
        }
    }
}

/// A decoded ticket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ticket {
    pub signature_type: SignatureType,
    pub signature: Vec<u8>,
    pub issuer: String,
    pub title_key_block: [u8; 0x100],
    pub format_version: u8,
    pub title_key_type: TitleKeyType,
    pub ticket_version: u16,
    pub license_type: LicenseType,
    pub common_key_id: u8,
    pub property_mask: u16,
    pub ticket_id: u64,
    pub device_id: u64,
    pub rights_id: RightsId,
    pub account_id: u32,
    pub section_count: u16,
    /// The bytes this ticket was decoded from.
    pub raw: Vec<u8>,
    /// Offset of the body (issuer) within `raw`.
    body_offset: usize,
}

/// A field of a ticket that differs from its normalised form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TicketIssue {
    /// Signature scheme is not RSA-2048/SHA-256.
    SignatureType,
    TitleKeyType,
    LicenseType,
    /// Common key id does not match the key generation in the rights id.
    CryptoType,
    /// Ticket, device, or account id is non-zero.
    PersonalData,
    PropertyMask,
    Issuer,
    SectionRecords,
}

impl TicketIssue {
    pub fn describe(self) -> &'static str {
        match self {
            Self::SignatureType => "ticket signature type is not RSA-2048/SHA-256",
            Self::TitleKeyType => "ticket title key type is not common",
            Self::LicenseType => "ticket license type is not permanent",
            Self::CryptoType => "ticket crypto type does not match rights id",
            Self::PersonalData => "ticket carries ticket/device/account ids",
            Self::PropertyMask => "ticket property flags are set",
            Self::Issuer => "ticket issuer is not the common ticket server",
            Self::SectionRecords => "ticket carries section records",
        }
    }
}

impl Ticket {
    /// Decode a ticket from its raw bytes.
    pub fn parse(data: &[u8]) -> Result<Self, NspError> {
        ensure_len(data, 4, "ticket")?;
        let raw_type = read_u32_le(data, 0);
        let signature_type = SignatureType::from_u32(raw_type).ok_or_else(|| {
            NspError::invalid_format(format!("unknown ticket signature type 0x{:X}", raw_type))
        })?;
        let (sig_size, pad_size) = signature_type.block_layout();
        let body_offset = 4 + sig_size + pad_size;
        ensure_len(data, body_offset + BODY_SIZE, "ticket")?;

        let b = &data[body_offset..];
        Ok(Self {
            signature_type,
            signature: data[4..4 + sig_size].to_vec(),
            issuer: read_ascii(&b[0x00..0x40]),
            title_key_block: read_array(b, 0x40),
            format_version: b[0x140],
            title_key_type: TitleKeyType::from(b[0x141]),
            ticket_version: read_u16_le(b, 0x142),
            license_type: LicenseType::from(b[0x144]),
            common_key_id: b[0x145],
            property_mask: read_u16_le(b, 0x146),
            ticket_id: read_u64_le(b, 0x150),
            device_id: read_u64_le(b, 0x158),
            rights_id: RightsId(read_array(b, 0x160)),
            account_id: read_u32_le(b, 0x170),
            section_count: read_u16_le(b, 0x17C),
            raw: data.to_vec(),
            body_offset,
        })
    }

    /// Encrypted title key (common tickets keep it in the first 16 bytes of
    /// the key block).
    pub fn encrypted_title_key(&self) -> [u8; 16] {
        read_array(&self.title_key_block, 0)
    }

    /// The bytes covered by the signature.
    pub fn signed_region(&self) -> &[u8] {
        &self.raw[self.body_offset..]
    }

    /// True when the ticket carries the fixed signature of a normalised
    /// ticket rather than a server signature.
    pub fn is_normalised_signature(&self) -> bool {
        self.signature_type == SignatureType::Rsa2048Sha256
            && self
                .signature
                .iter()
                .all(|&b| b == NORMALISED_SIGNATURE_BYTE)
    }

    /// Every way this ticket differs from its normalised form.
    pub fn issues(&self) -> Vec<TicketIssue> {
        let mut issues = Vec::new();
        if self.signature_type != SignatureType::Rsa2048Sha256 {
            issues.push(TicketIssue::SignatureType);
        }
        if self.title_key_type != TitleKeyType::Common {
            issues.push(TicketIssue::TitleKeyType);
        }
        if self.license_type != LicenseType::Permanent {
            issues.push(TicketIssue::LicenseType);
        }
        if self.common_key_id != self.rights_id.key_generation() {
            issues.push(TicketIssue::CryptoType);
        }
        if self.ticket_id != 0 || self.device_id != 0 || self.account_id != 0 {
            issues.push(TicketIssue::PersonalData);
        }
        if self.property_mask != 0 {
            issues.push(TicketIssue::PropertyMask);
        }
        if self.issuer != COMMON_ISSUER {
            issues.push(TicketIssue::Issuer);
        }
        if self.section_count != 0 || self.raw.len() != self.body_offset + BODY_SIZE {
            issues.push(TicketIssue::SectionRecords);
        }
        issues
    }

    /// The normalised form: fixed signature, common issuer, zeroed
    /// identifiers, permanent common license, crypto type taken from the
    /// rights id, no section records. Only the title key and rights id
    /// survive from the original.
    pub fn normalised(&self) -> Ticket {
        let mut title_key_block = [0u8; 0x100];
        title_key_block[..16].copy_from_slice(&self.encrypted_title_key());

        let mut ticket = Ticket {
            signature_type: SignatureType::Rsa2048Sha256,
            signature: vec![NORMALISED_SIGNATURE_BYTE; 0x100],
            issuer: COMMON_ISSUER.to_string(),
            title_key_block,
            format_version: NORMALISED_FORMAT_VERSION,
            title_key_type: TitleKeyType::Common,
            ticket_version: 0,
            license_type: LicenseType::Permanent,
            common_key_id: self.rights_id.key_generation(),
            property_mask: 0,
            ticket_id: 0,
            device_id: 0,
            rights_id: self.rights_id,
            account_id: 0,
            section_count: 0,
            raw: Vec::new(),
            body_offset: 0x140,
        };
        ticket.raw = ticket.encode();
        ticket
    }

    /// Serialize in the RSA-2048/SHA-256 layout.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = vec![0u8; NORMALISED_TICKET_SIZE];
        out[0..4].copy_from_slice(&SignatureType::Rsa2048Sha256.as_u32().to_le_bytes());
        let sig_len = self.signature.len().min(0x100);
        out[4..4 + sig_len].copy_from_slice(&self.signature[..sig_len]);

        let b = &mut out[0x140..];
        let issuer = self.issuer.as_bytes();
        let issuer_len = issuer.len().min(0x3F);
        b[..issuer_len].copy_from_slice(&issuer[..issuer_len]);
        b[0x40..0x140].copy_from_slice(&self.title_key_block);
        b[0x140] = self.format_version;
        b[0x141] = self.title_key_type.as_u8();
        b[0x142..0x144].copy_from_slice(&self.ticket_version.to_le_bytes());
        b[0x144] = self.license_type.as_u8();
        b[0x145] = self.common_key_id;
        b[0x146..0x148].copy_from_slice(&self.property_mask.to_le_bytes());
        b[0x150..0x158].copy_from_slice(&self.ticket_id.to_le_bytes());
        b[0x158..0x160].copy_from_slice(&self.device_id.to_le_bytes());
        b[0x160..0x170].copy_from_slice(&self.rights_id.0);
        b[0x170..0x174].copy_from_slice(&self.account_id.to_le_bytes());
        b[0x178..0x17C].copy_from_slice(&(NORMALISED_TICKET_SIZE as u32).to_le_bytes());
        out
    }

    /// True when re-normalising would not change a single byte.
    pub fn is_normalised(&self) -> bool {
        self.raw == self.normalised().raw
    }
}

#[cfg(test)]
#[path = "tests/ticket_tests.rs"]
mod tests;
