//! NCA container backend: keyset loading, header and section decryption,
//! integrity and signature checks.

pub mod backend;
pub mod crypto;
pub mod header;
pub mod keys;
pub mod npdm;
pub mod romfs;
pub mod section;

pub use backend::NcaBackend;
pub use keys::KeySet;
