//! Read-only title database interface.

use serde::{Deserialize, Serialize};

use crate::ids::TitleId;

/// One title as known to the title database.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TitleRecord {
    pub id: Option<TitleId>,
    /// Numeric catalog id shared by regional releases of a title.
    pub nsu_id: Option<u64>,
    pub name: Option<String>,
    pub version: Option<u32>,
    pub region: Option<String>,
    /// Release date as `YYYYMMDD`.
    pub release_date: Option<String>,
    pub publisher: Option<String>,
}

/// Queries the engine makes to decorate output names.
pub trait TitleLookup {
    /// Record for an exact title id.
    fn title(&self, id: TitleId) -> Option<TitleRecord>;

    /// Every regional release sharing a catalog id.
    fn regional_variants(&self, nsu_id: u64) -> Vec<TitleRecord>;

    /// Known update versions of an application, ascending.
    fn update_versions(&self, id: TitleId) -> Vec<u32>;

    /// Add-on content belonging to an application.
    fn related_add_ons(&self, id: TitleId) -> Vec<TitleRecord>;
}

/// A lookup that knows nothing. Names fall back to package contents.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullLookup;

impl TitleLookup for NullLookup {
    fn title(&self, _id: TitleId) -> Option<TitleRecord> {
        None
    }

    fn regional_variants(&self, _nsu_id: u64) -> Vec<TitleRecord> {
        Vec::new()
    }

    fn update_versions(&self, _id: TitleId) -> Vec<u32> {
        Vec::new()
    }

    fn related_add_ons(&self, _id: TitleId) -> Vec<TitleRecord> {
        Vec::new()
    }
}
