//! Certificate chain handling.
//!
//! A package's `.cert` entry is the common chain that signs its ticket: a
//! CA certificate (0x400 bytes) followed by the ticket server's XS
//! certificate (0x300 bytes). Every eShop package carries the same chain, so
//! the engine compares it against a reference copy instead of trusting it.
//!
//! Certificate fields are big-endian, unlike the rest of the package.

use std::path::Path;

use sha2::{Digest, Sha256};

use crate::NspError;
use crate::ticket::SignatureType;
use crate::util::{ensure_len, read_ascii, read_u32_be};

/// Length of the common certificate chain.
pub const COMMON_CERT_SIZE: usize = 0x700;
/// SHA-256 of the genuine common certificate chain.
pub const COMMON_CERT_SHA256: [u8; 32] = [
    0x3c, 0x4f, 0x20, 0xdc, 0xa2, 0x31, 0x65, 0x5e, 0x90, 0xc7, 0x5b, 0x3e, 0x96, 0x89, 0xe4, 0xdd,
    0x38, 0x13, 0x54, 0x01, 0x02, 0x9a, 0xb1, 0xf2, 0xea, 0x32, 0xd1, 0xc2, 0x57, 0x3f, 0x1d, 0xfe,
];
const CERT_HEADER_SIZE: usize = 0x88;

/// Public key carried by a certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublicKey {
    Rsa { modulus: Vec<u8>, exponent: u32 },
    Ecc(Vec<u8>),
}

/// One certificate out of a chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Certificate {
    pub signature_type: SignatureType,
    pub issuer: String,
    pub name: String,
    pub key: PublicKey,
}

impl Certificate {
    /// The identity this certificate signs as, e.g.
    /// `Root-CA00000003-XS00000020`.
    pub fn full_name(&self) -> String {
        format!("{}-{}", self.issuer, self.name)
    }

    /// Parse every certificate in a chain.
    pub fn parse_chain(data: &[u8]) -> Result<Vec<Certificate>, NspError> {
        let mut out = Vec::new();
        let mut at = 0usize;
        while at < data.len() {
            let (cert, len) = parse_one(&data[at..])?;
            out.push(cert);
            at += len;
        }
        Ok(out)
    }
}

/// Find the certificate that signed objects issued by `issuer`.
pub fn find_signer<'a>(chain: &'a [Certificate], issuer: &str) -> Option<&'a Certificate> {
    chain.iter().find(|c| c.full_name() == issuer)
}

fn parse_one(data: &[u8]) -> Result<(Certificate, usize), NspError> {
    ensure_len(data, 4, "certificate")?;
    let raw_type = read_u32_be(data, 0);
    let signature_type = SignatureType::from_u32(raw_type).ok_or_else(|| {
        NspError::invalid_format(format!("unknown certificate signature type 0x{:X}", raw_type))
    })?;
    let (sig_size, pad) = signature_type.block_layout();
    let header_at = 4 + sig_size + pad;
    ensure_len(data, header_at + CERT_HEADER_SIZE, "certificate")?;

    let h = &data[header_at..];
    let issuer = read_ascii(&h[0x00..0x40]);
    let key_type = read_u32_be(h, 0x40);
    let name = read_ascii(&h[0x44..0x84]);

    let key_at = header_at + CERT_HEADER_SIZE;
    let (key, key_len) = match key_type {
        0 | 1 => {
            let modulus_len = if key_type == 0 { 0x200 } else { 0x100 };
            let len = modulus_len + 4 + 0x34;
            ensure_len(data, key_at + len, "certificate public key")?;
            let modulus = data[key_at..key_at + modulus_len].to_vec();
            let exponent = read_u32_be(data, key_at + modulus_len);
            (PublicKey::Rsa { modulus, exponent }, len)
        }
        2 => {
            let len = 0x3C + 0x3C;
            ensure_len(data, key_at + len, "certificate public key")?;
            (PublicKey::Ecc(data[key_at..key_at + 0x3C].to_vec()), len)
        }
        other => {
            return Err(NspError::invalid_format(format!(
                "unknown certificate key type {}",
                other
            )));
        }
    };

    Ok((
        Certificate {
            signature_type,
            issuer,
            name,
            key,
        },
        key_at + key_len,
    ))
}

// ---------------------------------------------------------------------------
// Reference certificate
// ---------------------------------------------------------------------------

/// Outcome of comparing a package certificate with the expected chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CertificateCheck {
    Ok,
    WrongLength(usize),
    WrongDigest,
}

impl CertificateCheck {
    pub fn is_ok(self) -> bool {
        self == Self::Ok
    }
}

/// A known-good copy of the common certificate chain.
#[derive(Debug, Clone)]
pub struct ReferenceCertificate {
    bytes: Vec<u8>,
    digest: [u8; 32],
}

impl ReferenceCertificate {
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, NspError> {
        if bytes.len() != COMMON_CERT_SIZE {
            return Err(NspError::invalid_format(format!(
                "reference certificate is {} bytes, expected {}",
                bytes.len(),
                COMMON_CERT_SIZE
            )));
        }
        let digest = Sha256::digest(&bytes).into();
        Ok(Self { bytes, digest })
    }

    pub fn load(path: &Path) -> Result<Self, NspError> {
        Self::from_bytes(std::fs::read(path)?)
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn digest(&self) -> &[u8; 32] {
        &self.digest
    }
}

/// Check a package certificate against the reference digest, or the
/// genuine chain's digest when no reference is configured.
pub fn check_certificate(
    data: &[u8],
    reference: Option<&ReferenceCertificate>,
) -> CertificateCheck {
    if data.len() != COMMON_CERT_SIZE {
        return CertificateCheck::WrongLength(data.len());
    }
    let expected = reference.map_or(&COMMON_CERT_SHA256, |r| &r.digest);
    if Sha256::digest(data).as_slice() != expected.as_slice() {
        return CertificateCheck::WrongDigest;
    }
    CertificateCheck::Ok
}

#[cfg(test)]
#[path = "tests/cert_tests.rs"]
mod tests;
