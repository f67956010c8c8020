//! # Entity Store
//!
//! The persisted source of truth for CRE and Standard rows and their two link
//! relations. The engine only talks to it through the [`EntityStore`] trait,
//! which is object safe so a [`crate::Collection`] can hold either backend.
//!
//! Backends:
//! - [`MemoryStore`]: BTreeMap-backed, volatile
//! - [`RedbStore`]: disk-backed, one ACID write transaction per mutation
//!
//! Stores enforce the uniqueness keys ((name, external_id) for CREs,
//! (name, section, subsection) for Standards) and reject link rows whose
//! endpoints do not exist. They know nothing about cycles; that is the
//! mirror's job.

mod memory;
mod redb_store;

pub use memory::MemoryStore;
pub use redb_store::RedbStore;

use crate::filter::{CreFilter, Page, StandardFilter};
use crate::{
    CreDraft, CreId, CreRecord, CregraphError, ExternalLinkRow, InternalLinkRow, LinkType,
    StandardDraft, StandardId, StandardRecord,
};

/// Storage interface consumed by the engine.
///
/// All fallible operations return `Result<T, CregraphError>` so in-memory and
/// persistent backends behave uniformly.
pub trait EntityStore {
    // -------------------------------------------------------------------------
    // CRE rows
    // -------------------------------------------------------------------------

    /// Insert a new CRE row. Fails with `Conflict` if (name, external_id) is taken.
    fn insert_cre(&mut self, draft: &CreDraft) -> Result<CreRecord, CregraphError>;

    /// Overwrite an existing CRE row. Fails with `NotFound` if it does not exist.
    fn update_cre(&mut self, record: &CreRecord) -> Result<(), CregraphError>;

    /// Get a CRE row by surrogate id.
    fn cre(&self, id: CreId) -> Result<Option<CreRecord>, CregraphError>;

    /// All CRE rows in id order.
    fn cres(&self) -> Result<Vec<CreRecord>, CregraphError>;

    // -------------------------------------------------------------------------
    // Standard rows
    // -------------------------------------------------------------------------

    /// Insert a new Standard row. Fails with `Conflict` if
    /// (name, section, subsection) is taken.
    fn insert_standard(&mut self, draft: &StandardDraft) -> Result<StandardRecord, CregraphError>;

    /// Overwrite an existing Standard row.
    fn update_standard(&mut self, record: &StandardRecord) -> Result<(), CregraphError>;

    /// Get a Standard row by surrogate id.
    fn standard(&self, id: StandardId) -> Result<Option<StandardRecord>, CregraphError>;

    /// All Standard rows in id order.
    fn standards(&self) -> Result<Vec<StandardRecord>, CregraphError>;

    // -------------------------------------------------------------------------
    // Link rows
    // -------------------------------------------------------------------------

    /// Insert or retype the (group, member) internal link.
    fn put_internal_link(&mut self, row: InternalLinkRow) -> Result<(), CregraphError>;

    /// Type of the (group, member) internal link, if stored in that order.
    fn internal_link(
        &self,
        group: CreId,
        member: CreId,
    ) -> Result<Option<LinkType>, CregraphError>;

    /// All internal links in (group, member) order.
    fn internal_links(&self) -> Result<Vec<InternalLinkRow>, CregraphError>;

    /// Insert or retype the (cre, standard) external link.
    fn put_external_link(&mut self, row: ExternalLinkRow) -> Result<(), CregraphError>;

    /// Type of the (cre, standard) external link.
    fn external_link(
        &self,
        cre: CreId,
        standard: StandardId,
    ) -> Result<Option<LinkType>, CregraphError>;

    /// All external links in (cre, standard) order.
    fn external_links(&self) -> Result<Vec<ExternalLinkRow>, CregraphError>;

    // -------------------------------------------------------------------------
    // Provided queries
    // -------------------------------------------------------------------------

    /// CRE rows matching `filter`. An empty filter is rejected.
    fn find_cres(&self, filter: &CreFilter) -> Result<Vec<CreRecord>, CregraphError> {
        filter.validate()?;
        Ok(self
            .cres()?
            .into_iter()
            .filter(|cre| filter.matches(cre))
            .collect())
    }

    /// Standard rows matching `filter`. An empty filter is rejected.
    fn find_standards(
        &self,
        filter: &StandardFilter,
    ) -> Result<Vec<StandardRecord>, CregraphError> {
        filter.validate()?;
        Ok(self
            .standards()?
            .into_iter()
            .filter(|standard| filter.matches(standard))
            .collect())
    }

    /// One page of Standard rows matching `filter`.
    fn find_standards_page(
        &self,
        filter: &StandardFilter,
        page: usize,
        items_per_page: Option<usize>,
    ) -> Result<Page<StandardRecord>, CregraphError> {
        Ok(Page::paginate(
            self.find_standards(filter)?,
            page,
            items_per_page,
        ))
    }

    /// Internal links naming `cre` as group or as member.
    fn internal_links_of(&self, cre: CreId) -> Result<Vec<InternalLinkRow>, CregraphError> {
        Ok(self
            .internal_links()?
            .into_iter()
            .filter(|row| row.group == cre || row.member == cre)
            .collect())
    }

    /// External links from `cre`.
    fn external_links_of_cre(&self, cre: CreId) -> Result<Vec<ExternalLinkRow>, CregraphError> {
        Ok(self
            .external_links()?
            .into_iter()
            .filter(|row| row.cre == cre)
            .collect())
    }

    /// External links into `standard`.
    fn external_links_of_standard(
        &self,
        standard: StandardId,
    ) -> Result<Vec<ExternalLinkRow>, CregraphError> {
        Ok(self
            .external_links()?
            .into_iter()
            .filter(|row| row.standard == standard)
            .collect())
    }
}

/// Build the `Conflict` error for a duplicate CRE key.
pub(crate) fn cre_conflict(name: &str, external_id: &str) -> CregraphError {
    CregraphError::Conflict(format!(
        "CRE with name '{name}' and external id '{external_id}' already exists"
    ))
}

/// Build the `Conflict` error for a duplicate Standard key.
pub(crate) fn standard_conflict(name: &str, section: &str, subsection: &str) -> CregraphError {
    CregraphError::Conflict(format!(
        "Standard {name}:{section}:{subsection} already exists"
    ))
}
