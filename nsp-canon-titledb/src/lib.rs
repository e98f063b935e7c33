//! JSON-backed title database.
//!
//! Reads a directory holding `titles.json` (and optionally regional
//! `titles.<REGION>.<lang>.json` files) keyed by catalog id, plus
//! `versions.json` listing update versions per title id. Everything is loaded
//! into memory and indexed once.

pub mod database;
pub mod error;

pub use database::TitleDatabase;
pub use error::TitleDbError;
