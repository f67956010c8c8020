//! # Graph Query Engine
//!
//! Read-only queries over the store and the mirror. Nothing here mutates
//! either; lookups that find nothing return empty results, not errors.
//!
//! Link direction rule: an internal `Contains` link reads as `PartOf` from
//! the member's side. Every other type reads the same from both ends.

use crate::document::{Document, Link};
use crate::filter::{CreFilter, Page, StandardFilter};
use crate::mirror::Mirror;
use crate::primitives::{MAX_GAP_ANALYSIS_STANDARDS, TAG_SEPARATOR};
use crate::storage::EntityStore;
use crate::{CreId, CreRecord, CregraphError, LinkType, NodeKey, StandardId, StandardRecord};
use std::collections::{BTreeMap, BTreeSet};

fn missing_cre(id: CreId) -> CregraphError {
    tracing::error!(cre = id.0, "linked CRE row is missing");
    CregraphError::NotFound(format!("CRE row {}", id.0))
}

fn missing_standard(id: StandardId) -> CregraphError {
    tracing::error!(standard = id.0, "linked Standard row is missing");
    CregraphError::NotFound(format!("Standard row {}", id.0))
}

/// Substring match of every tag against the comma-joined tag string.
fn has_all_tags(tags: &BTreeSet<String>, wanted: &[String]) -> bool {
    let joined = tags
        .iter()
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(&TAG_SEPARATOR.to_string());
    wanted.iter().all(|tag| joined.contains(tag.as_str()))
}

/// Unit struct grouping the read operations.
pub struct QueryEngine;

impl QueryEngine {
    // =========================================================================
    // STRUCTURAL QUERIES
    // =========================================================================

    /// Whether two Standards are connected through the graph, ignoring
    /// direction.
    #[must_use]
    pub fn path_exists(mirror: &Mirror, a: StandardId, b: StandardId) -> bool {
        mirror.path_exists(NodeKey::Standard(a), NodeKey::Standard(b))
    }

    /// Standards named in `names`, each annotated with a `LinkedTo` link to
    /// every other requested Standard it is connected to.
    ///
    /// Names match exactly. The annotations are never persisted.
    pub fn gap_analysis(
        store: &dyn EntityStore,
        mirror: &Mirror,
        names: &[String],
    ) -> Result<Vec<Document>, CregraphError> {
        if names.is_empty() {
            return Err(CregraphError::InvalidQuery(
                "gap analysis needs at least one standard name".to_string(),
            ));
        }
        if names.len() > MAX_GAP_ANALYSIS_STANDARDS {
            return Err(CregraphError::InvalidQuery(format!(
                "gap analysis accepts at most {MAX_GAP_ANALYSIS_STANDARDS} standard names"
            )));
        }

        let wanted: BTreeSet<&str> = names.iter().map(String::as_str).collect();
        let standards: Vec<StandardRecord> = store
            .standards()?
            .into_iter()
            .filter(|s| wanted.contains(s.name.as_str()))
            .collect();

        let mut documents = Vec::with_capacity(standards.len());
        for standard in &standards {
            let mut document = Document::from_standard(standard);
            for other in &standards {
                if other.id != standard.id && Self::path_exists(mirror, standard.id, other.id) {
                    document.add_link(Link::new(
                        LinkType::LinkedTo,
                        Document::from_standard(other),
                    ));
                }
            }
            documents.push(document);
        }
        Ok(documents)
    }

    /// Every entity directly linked to `cre`, Standards first, with the
    /// display type of each link.
    pub fn links_of(store: &dyn EntityStore, cre: CreId) -> Result<Vec<Link>, CregraphError> {
        Self::links_of_filtered(store, cre, &[])
    }

    fn links_of_filtered(
        store: &dyn EntityStore,
        cre: CreId,
        include_only: &[String],
    ) -> Result<Vec<Link>, CregraphError> {
        let mut links = Vec::new();

        for row in store.external_links_of_cre(cre)? {
            let standard = store
                .standard(row.standard)?
                .ok_or_else(|| missing_standard(row.standard))?;
            if include_only.is_empty() || include_only.contains(&standard.name) {
                links.push(Link::new(row.link_type, Document::from_standard(&standard)));
            }
        }

        for row in store.internal_links_of(cre)? {
            let (other, link_type) = if row.group == cre {
                (row.member, row.link_type)
            } else {
                (row.group, row.link_type.seen_from_member())
            };
            let other = store.cre(other)?.ok_or_else(|| missing_cre(other))?;
            links.push(Link::new(link_type, Document::from_cre(&other)));
        }

        Ok(links)
    }

    /// Groups whose internal links name `cre` as member. Empty if none.
    pub fn ancestors_of(
        store: &dyn EntityStore,
        cre: CreId,
    ) -> Result<Vec<CreRecord>, CregraphError> {
        let mut groups = Vec::new();
        for row in store.internal_links_of(cre)? {
            if row.member == cre {
                groups.push(store.cre(row.group)?.ok_or_else(|| missing_cre(row.group))?);
            }
        }
        Ok(groups)
    }

    /// CREs that link to `standard`. Empty if none.
    pub fn cres_of_standard(
        store: &dyn EntityStore,
        standard: StandardId,
    ) -> Result<Vec<CreRecord>, CregraphError> {
        store
            .external_links_of_standard(standard)?
            .into_iter()
            .map(|row| store.cre(row.cre)?.ok_or_else(|| missing_cre(row.cre)))
            .collect()
    }

    // =========================================================================
    // DOCUMENT QUERIES
    // =========================================================================

    /// Project a CRE with all of its links. A non-empty `include_only` keeps
    /// only Standard links whose name it lists.
    pub fn cre_document(
        store: &dyn EntityStore,
        record: &CreRecord,
        include_only: &[String],
    ) -> Result<Document, CregraphError> {
        let mut document = Document::from_cre(record);
        for link in Self::links_of_filtered(store, record.id, include_only)? {
            document.add_link(link);
        }
        Ok(document)
    }

    /// Project a Standard with the CREs linking to it. A non-empty
    /// `include_only` keeps only CREs whose external id or name it lists.
    pub fn standard_document(
        store: &dyn EntityStore,
        record: &StandardRecord,
        include_only: &[String],
    ) -> Result<Document, CregraphError> {
        let mut document = Document::from_standard(record);
        for row in store.external_links_of_standard(record.id)? {
            let cre = store.cre(row.cre)?.ok_or_else(|| missing_cre(row.cre))?;
            if include_only.is_empty()
                || include_only.contains(&cre.external_id)
                || include_only.contains(&cre.name)
            {
                document.add_link(Link::new(row.link_type, Document::from_cre(&cre)));
            }
        }
        Ok(document)
    }

    /// CRE documents matching `filter`.
    pub fn get_cres(
        store: &dyn EntityStore,
        filter: &CreFilter,
        include_only: &[String],
    ) -> Result<Vec<Document>, CregraphError> {
        let records = store.find_cres(filter)?;
        if records.is_empty() {
            tracing::warn!(?filter, "CRE does not exist in the db");
        }
        records
            .iter()
            .map(|record| Self::cre_document(store, record, include_only))
            .collect()
    }

    /// Standard documents matching `filter`.
    pub fn get_standards(
        store: &dyn EntityStore,
        filter: &StandardFilter,
        include_only: &[String],
    ) -> Result<Vec<Document>, CregraphError> {
        let records = store.find_standards(filter)?;
        if records.is_empty() {
            tracing::warn!(?filter, "Standard does not exist in the db");
        }
        records
            .iter()
            .map(|record| Self::standard_document(store, record, include_only))
            .collect()
    }

    /// One page of Standard documents matching `filter`.
    pub fn get_standards_page(
        store: &dyn EntityStore,
        filter: &StandardFilter,
        page: usize,
        items_per_page: Option<usize>,
        include_only: &[String],
    ) -> Result<Page<Document>, CregraphError> {
        let page = store.find_standards_page(filter, page, items_per_page)?;
        let mut items = Vec::with_capacity(page.items.len());
        for record in &page.items {
            items.push(Self::standard_document(store, record, include_only)?);
        }
        Ok(Page {
            items,
            page: page.page,
            total_pages: page.total_pages,
            total_items: page.total_items,
        })
    }

    /// Standards, then CREs, tagged with every tag in `tags`.
    pub fn get_by_tags(
        store: &dyn EntityStore,
        tags: &[String],
    ) -> Result<Vec<Document>, CregraphError> {
        if tags.is_empty() {
            return Ok(Vec::new());
        }

        let mut documents = Vec::new();
        for standard in store.standards()? {
            if has_all_tags(&standard.tags, tags) {
                documents.push(Self::standard_document(store, &standard, &[])?);
            }
        }
        for cre in store.cres()? {
            if has_all_tags(&cre.tags, tags) {
                documents.push(Self::cre_document(store, &cre, &[])?);
            }
        }
        Ok(documents)
    }

    // =========================================================================
    // STATISTICS
    // =========================================================================

    /// Distinct Standard names, sorted.
    pub fn standard_names(store: &dyn EntityStore) -> Result<Vec<String>, CregraphError> {
        let names: BTreeSet<String> = store.standards()?.into_iter().map(|s| s.name).collect();
        Ok(names.into_iter().collect())
    }

    /// The most internal links any single CRE has on one side.
    pub fn max_internal_connections(store: &dyn EntityStore) -> Result<usize, CregraphError> {
        let mut as_group: BTreeMap<CreId, usize> = BTreeMap::new();
        let mut as_member: BTreeMap<CreId, usize> = BTreeMap::new();
        for row in store.internal_links()? {
            *as_group.entry(row.group).or_default() += 1;
            *as_member.entry(row.member).or_default() += 1;
        }
        Ok(as_group
            .values()
            .chain(as_member.values())
            .copied()
            .max()
            .unwrap_or(0))
    }
}

// =============================================================================
// TESTS
// =============================================================================
