//! # Export and Import Passes
//!
//! [`export_documents`] walks every link row once and builds the full
//! document map; [`import_documents`] feeds such a map back through the
//! Link Mutator.
//!
//! Map keys are CRE names for CRE documents and
//! `<name>-<section>:<subsection>:<version>` for Standards nothing links to.
//! A `BTreeMap` keeps the export order stable, so the JSON of the map is
//! canonical and can be checksummed.

use crate::document::{Document, Link};
use crate::mirror::Mirror;
use crate::mutation::{LinkMutator, LinkOutcome};
use crate::storage::EntityStore;
use crate::{CreId, CreRecord, CreRef, CregraphError, StandardId, StandardRef};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

// =============================================================================
// EXPORT
// =============================================================================

fn cre_row(store: &dyn EntityStore, id: CreId) -> Result<CreRecord, CregraphError> {
    store
        .cre(id)?
        .ok_or_else(|| CregraphError::NotFound(format!("CRE row {}", id.0)))
}

/// Build the full document map.
///
/// Internal links appear on both ends: the group's document links to the
/// member with the stored type, the member's links back with the type as
/// seen from the member side. External links are attached to the CRE only
/// when the Standard has a name.
pub fn export_documents(
    store: &dyn EntityStore,
) -> Result<BTreeMap<String, Document>, CregraphError> {
    let mut docs: BTreeMap<String, Document> = BTreeMap::new();

    for row in store.internal_links()? {
        let group = cre_row(store, row.group)?;
        let member = cre_row(store, row.member)?;

        docs.entry(group.name.clone())
            .or_insert_with(|| Document::from_cre(&group))
            .add_link(Link::new(row.link_type, Document::from_cre(&member)));
        docs.entry(member.name.clone())
            .or_insert_with(|| Document::from_cre(&member))
            .add_link(Link::new(
                row.link_type.seen_from_member(),
                Document::from_cre(&group),
            ));
    }

    let mut linked: BTreeSet<StandardId> = BTreeSet::new();
    for row in store.external_links()? {
        linked.insert(row.standard);
        let cre = cre_row(store, row.cre)?;
        let standard = store
            .standard(row.standard)?
            .ok_or_else(|| CregraphError::NotFound(format!("Standard row {}", row.standard.0)))?;

        let doc = docs
            .entry(cre.name.clone())
            .or_insert_with(|| Document::from_cre(&cre));
        if !standard.name.is_empty() {
            doc.add_link(Link::new(row.link_type, Document::from_standard(&standard)));
        }
    }

    for standard in store.standards()? {
        if linked.contains(&standard.id) {
            continue;
        }
        let doc = Document::from_standard(&standard);
        if let Some(key) = doc.standard_key() {
            docs.insert(key, doc);
        }
    }

    tracing::debug!(documents = docs.len(), "export built");
    Ok(docs)
}

/// File name the document under `key` of an export map is written to.
#[must_use]
pub fn export_file_name(key: &str) -> String {
    format!("{}.json", key.replace('/', "-"))
}

/// BLAKE3 hash (hex) of the canonical JSON of an export map.
#[cfg(feature = "crypto-hash")]
pub fn export_checksum(docs: &BTreeMap<String, Document>) -> Result<String, CregraphError> {
    let bytes =
        serde_json::to_vec(docs).map_err(|e| CregraphError::SerializationError(e.to_string()))?;
    Ok(blake3::hash(&bytes).to_hex().to_string())
}

// =============================================================================
// IMPORT
// =============================================================================

/// Counts from one import run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportReport {
    /// Distinct CREs touched.
    pub cres: usize,
    /// Distinct Standards touched.
    pub standards: usize,
    /// Links created or retyped.
    pub links: usize,
    /// Links refused because they would close a cycle.
    pub rejected: usize,
}

struct Importer<'a> {
    store: &'a mut dyn EntityStore,
    mirror: &'a mut Mirror,
    cres: BTreeSet<CreId>,
    standards: BTreeSet<StandardId>,
    links: usize,
    rejected: usize,
}

impl Importer<'_> {
    fn cre(&mut self, doc: &Document) -> Result<Option<CreId>, CregraphError> {
        let Some(draft) = doc.to_cre_draft() else {
            return Ok(None);
        };
        let record = LinkMutator::add_cre(&mut *self.store, &mut *self.mirror, &draft)?;
        self.cres.insert(record.id);
        Ok(Some(record.id))
    }

    fn standard(&mut self, doc: &Document) -> Result<Option<StandardId>, CregraphError> {
        let Some(draft) = doc.to_standard_draft() else {
            return Ok(None);
        };
        let record = LinkMutator::add_standard(&mut *self.store, &mut *self.mirror, &draft)?;
        self.standards.insert(record.id);
        Ok(Some(record.id))
    }

    fn record(&mut self, outcome: Result<LinkOutcome, CregraphError>) -> Result<(), CregraphError> {
        match outcome {
            Ok(LinkOutcome::Created | LinkOutcome::Retyped { .. }) => {
                self.links = self.links.saturating_add(1);
                Ok(())
            }
            Ok(LinkOutcome::Unchanged) => Ok(()),
            Err(CregraphError::CycleRejected { from, to, cycle }) => {
                tracing::warn!(%from, %to, cycle = ?cycle, "import skipped a cycle-closing link");
                self.rejected = self.rejected.saturating_add(1);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    fn document(&mut self, doc: &Document) -> Result<(), CregraphError> {
        if let Some(cre) = self.cre(doc)? {
            for link in doc.links() {
                if !link.ltype.is_persistable() {
                    tracing::debug!(ltype = %link.ltype, "derived link not imported");
                    continue;
                }
                let outcome = match &link.document {
                    Document::Cre(_) => {
                        let Some(other) = self.cre(&link.document)? else {
                            continue;
                        };
                        LinkMutator::upsert_internal_link(
                            &mut *self.store,
                            &mut *self.mirror,
                            &CreRef::from(cre),
                            &CreRef::from(other),
                            link.ltype,
                        )
                    }
                    Document::Standard(_) => {
                        let Some(standard) = self.standard(&link.document)? else {
                            continue;
                        };
                        LinkMutator::upsert_external_link(
                            &mut *self.store,
                            &mut *self.mirror,
                            &CreRef::from(cre),
                            &StandardRef::from(standard),
                            link.ltype,
                        )
                    }
                };
                self.record(outcome)?;
            }
        } else if let Some(standard) = self.standard(doc)? {
            for link in doc.links() {
                if !link.ltype.is_persistable() {
                    continue;
                }
                let Some(cre) = self.cre(&link.document)? else {
                    continue;
                };
                let outcome = LinkMutator::upsert_external_link(
                    &mut *self.store,
                    &mut *self.mirror,
                    &CreRef::from(cre),
                    &StandardRef::from(standard),
                    link.ltype,
                );
                self.record(outcome)?;
            }
        }
        Ok(())
    }
}

/// Upsert every document and apply its links.
///
/// Cycle rejections are counted and skipped; any other failure aborts the
/// run, leaving what was already applied in place.
pub fn import_documents<'a, I>(
    store: &mut dyn EntityStore,
    mirror: &mut Mirror,
    docs: I,
) -> Result<ImportReport, CregraphError>
where
    I: IntoIterator<Item = &'a Document>,
{
    let mut importer = Importer {
        store,
        mirror,
        cres: BTreeSet::new(),
        standards: BTreeSet::new(),
        links: 0,
        rejected: 0,
    };
    for doc in docs {
        importer.document(doc)?;
    }

    let report = ImportReport {
        cres: importer.cres.len(),
        standards: importer.standards.len(),
        links: importer.links,
        rejected: importer.rejected,
    };
    tracing::debug!(?report, "import finished");
    Ok(report)
}

// =============================================================================
// TESTS
// =============================================================================
