//! Cipher and signature glue over the RustCrypto crates.
//!
//! ## AES-128-XTS (headers)
//! The first 0xC00 bytes of a sub-container are XTS encrypted with 0x200-byte
//! sectors. The tweak is the sector index stored big-endian, unlike the
//! little-endian tweak of the standard.
//!
//! ## AES-128-CTR (sections)
//! The counter's upper half is the section's 8-byte secure value (reversed),
//! the lower half is the absolute byte offset within the sub-container
//! divided by 16.

use aes::Aes128;
use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockDecrypt, BlockEncrypt, KeyInit};
use cipher::{KeyIvInit, StreamCipher, StreamCipherSeek};
use nsp_canon_core::{NspError, SignatureCheck};
use rsa::{BigUint, Pkcs1v15Sign, Pss, RsaPublicKey};
use sha2::{Digest, Sha256};
use xts_mode::Xts128;

type Aes128Ctr = ctr::Ctr128BE<Aes128>;

/// Size of the encrypted header region.
pub const HEADER_REGION_SIZE: usize = 0xC00;
const SECTOR_SIZE: usize = 0x200;
const RSA_EXPONENT: u32 = 0x10001;

fn nintendo_tweak(sector: u128) -> [u8; 16] {
    sector.to_be_bytes()
}

fn header_cipher(header_key: &[u8; 32]) -> Xts128<Aes128> {
    let data_key = Aes128::new(GenericArray::from_slice(&header_key[..16]));
    let tweak_key = Aes128::new(GenericArray::from_slice(&header_key[16..]));
    Xts128::new(data_key, tweak_key)
}

/// Decrypt the 0xC00-byte header region in place.
///
/// Section headers of version-2 sub-containers are each encrypted as sector
/// 0; everything else uses its position as the sector index.
pub fn decrypt_header(region: &mut [u8], header_key: &[u8; 32]) -> Result<(), NspError> {
    if region.len() < HEADER_REGION_SIZE {
        return Err(NspError::truncated(
            "sub-container header",
            HEADER_REGION_SIZE as u64,
            region.len() as u64,
        ));
    }
    let cipher = header_cipher(header_key);
    for sector in 0..2 {
        let at = sector * SECTOR_SIZE;
        cipher.decrypt_sector(&mut region[at..at + SECTOR_SIZE], nintendo_tweak(sector as u128));
    }
    let is_v2 = &region[0x200..0x204] == b"NCA2";
    for sector in 2..HEADER_REGION_SIZE / SECTOR_SIZE {
        let at = sector * SECTOR_SIZE;
        let tweak = if is_v2 { 0 } else { sector as u128 };
        cipher.decrypt_sector(&mut region[at..at + SECTOR_SIZE], nintendo_tweak(tweak));
    }
    Ok(())
}

/// Inverse of [`decrypt_header`] for version-3 headers.
pub fn encrypt_header(region: &mut [u8], header_key: &[u8; 32]) {
    let cipher = header_cipher(header_key);
    for (sector, chunk) in region
        .chunks_mut(SECTOR_SIZE)
        .take(HEADER_REGION_SIZE / SECTOR_SIZE)
        .enumerate()
    {
        cipher.encrypt_sector(chunk, nintendo_tweak(sector as u128));
    }
}

/// Single-block AES-128-ECB decryption, used to unwrap key-area and title
/// keys.
pub fn decrypt_block(block: &[u8; 16], key: &[u8; 16]) -> [u8; 16] {
    let cipher = Aes128::new(GenericArray::from_slice(key));
    let mut buf = GenericArray::clone_from_slice(block);
    cipher.decrypt_block(&mut buf);
    buf.into()
}

/// Single-block AES-128-ECB encryption (inverse of [`decrypt_block`]).
pub fn encrypt_block(block: &[u8; 16], key: &[u8; 16]) -> [u8; 16] {
    let cipher = Aes128::new(GenericArray::from_slice(key));
    let mut buf = GenericArray::clone_from_slice(block);
    cipher.encrypt_block(&mut buf);
    buf.into()
}

/// Apply the section keystream to `data`, which starts at `offset` bytes
/// into the sub-container. CTR is symmetric, so this both encrypts and
/// decrypts.
pub fn apply_section_ctr(
    data: &mut [u8],
    key: &[u8; 16],
    secure_value: &[u8; 8],
    offset: u64,
) -> Result<(), NspError> {
    let mut iv = [0u8; 16];
    for (dst, src) in iv[..8].iter_mut().zip(secure_value.iter().rev()) {
        *dst = *src;
    }
    let mut cipher = Aes128Ctr::new_from_slices(key, &iv)
        .map_err(|e| NspError::other(format!("AES-CTR setup failed: {}", e)))?;
    cipher.seek(offset);
    cipher.apply_keystream(data);
    Ok(())
}

fn public_key(modulus: &[u8]) -> Option<RsaPublicKey> {
    RsaPublicKey::new(
        BigUint::from_bytes_be(modulus),
        BigUint::from(RSA_EXPONENT),
    )
    .ok()
}

/// RSA-2048-PSS/SHA-256, the scheme of sub-container header signatures.
pub fn verify_pss(modulus: Option<&[u8]>, message: &[u8], signature: &[u8]) -> SignatureCheck {
    let Some(key) = modulus.and_then(public_key) else {
        return SignatureCheck::Unverifiable;
    };
    let digest = Sha256::digest(message);
    match key.verify(Pss::new::<Sha256>(), &digest, signature) {
        Ok(()) => SignatureCheck::Valid,
        Err(_) => SignatureCheck::Invalid,
    }
}

/// RSA PKCS#1 v1.5 with SHA-256, the scheme of ticket signatures.
pub fn verify_pkcs1(
    modulus: &[u8],
    exponent: u32,
    message: &[u8],
    signature: &[u8],
) -> SignatureCheck {
    let Ok(key) = RsaPublicKey::new(BigUint::from_bytes_be(modulus), BigUint::from(exponent))
    else {
        return SignatureCheck::Unverifiable;
    };
    let digest = Sha256::digest(message);
    match key.verify(Pkcs1v15Sign::new::<Sha256>(), &digest, signature) {
        Ok(()) => SignatureCheck::Valid,
        Err(_) => SignatureCheck::Invalid,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: [u8; 32] = [0x5A; 32];

    #[test]
    fn test_header_round_trip() {
        let mut region = vec![0u8; HEADER_REGION_SIZE];
        region[0x200..0x204].copy_from_slice(b"NCA3");
        region[0x400] = 0x02;
        let plain = region.clone();

        encrypt_header(&mut region, &KEY);
        assert_ne!(region, plain);
        decrypt_header(&mut region, &KEY).unwrap();
        assert_eq!(region, plain);
    }

    #[test]
    fn test_header_too_short() {
        let mut region = vec![0u8; 0x400];
        assert!(decrypt_header(&mut region, &KEY).is_err());
    }

    #[test]
    fn test_block_round_trip() {
        let key = [0x33; 16];
        let block = [0x42; 16];
        assert_eq!(decrypt_block(&encrypt_block(&block, &key), &key), block);
    }

    #[test]
    fn test_ctr_seek_matches_stream() {
        let key = [0x01; 16];
        let secure = [1, 2, 3, 4, 5, 6, 7, 8];
        let mut whole = vec![0u8; 0x100];
        apply_section_ctr(&mut whole, &key, &secure, 0x4000).unwrap();

        let mut tail = vec![0u8; 0x80];
        apply_section_ctr(&mut tail, &key, &secure, 0x4080).unwrap();
        assert_eq!(&whole[0x80..], &tail[..]);
    }

    #[test]
    fn test_signature_without_key_is_unverifiable() {
        assert_eq!(
            verify_pss(None, b"message", &[0u8; 0x100]),
            SignatureCheck::Unverifiable
        );
    }

    #[test]
    fn test_bad_signature_is_invalid() {
        let mut modulus = vec![0xFF; 0x100];
        modulus[0xFF] = 0xF1;
        assert_eq!(
            verify_pss(Some(&modulus), b"message", &[0x01; 0x100]),
            SignatureCheck::Invalid
        );
        assert_eq!(
            verify_pkcs1(&modulus, RSA_EXPONENT, b"message", &[0x01; 0x100]),
            SignatureCheck::Invalid
        );
    }
}
