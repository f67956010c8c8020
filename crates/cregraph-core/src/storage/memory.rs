//! # In-Memory Entity Store
//!
//! Volatile store backed by `BTreeMap`s. Same contract as the redb backend;
//! used by tests and by `--backend memory`.

use super::{EntityStore, cre_conflict, standard_conflict};
use crate::{
    CreDraft, CreId, CreRecord, CregraphError, ExternalLinkRow, InternalLinkRow, LinkType,
    StandardDraft, StandardId, StandardRecord,
};
use std::collections::BTreeMap;

/// A BTreeMap-backed entity store.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    cres: BTreeMap<CreId, CreRecord>,
    standards: BTreeMap<StandardId, StandardRecord>,
    internal_links: BTreeMap<(CreId, CreId), LinkType>,
    external_links: BTreeMap<(CreId, StandardId), LinkType>,
    next_cre_id: u64,
    next_standard_id: u64,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self {
            cres: BTreeMap::new(),
            standards: BTreeMap::new(),
            internal_links: BTreeMap::new(),
            external_links: BTreeMap::new(),
            next_cre_id: 1,
            next_standard_id: 1,
        }
    }
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn cre_key_taken(&self, name: &str, external_id: &str, except: Option<CreId>) -> bool {
        self.cres.values().any(|c| {
            Some(c.id) != except && c.name == name && c.external_id == external_id
        })
    }

    fn standard_key_taken(
        &self,
        name: &str,
        section: &str,
        subsection: &str,
        except: Option<StandardId>,
    ) -> bool {
        self.standards.values().any(|s| {
            Some(s.id) != except
                && s.name == name
                && s.section == section
                && s.subsection == subsection
        })
    }
}

impl EntityStore for MemoryStore {
    fn insert_cre(&mut self, draft: &CreDraft) -> Result<CreRecord, CregraphError> {
        let external_id = draft.external_id.clone().unwrap_or_default();
        if self.cre_key_taken(&draft.name, &external_id, None) {
            return Err(cre_conflict(&draft.name, &external_id));
        }

        let record = CreRecord {
            id: CreId(self.next_cre_id),
            external_id,
            name: draft.name.clone(),
            description: draft.description.clone(),
            tags: draft.tags.clone(),
        };
        self.next_cre_id = self.next_cre_id.saturating_add(1);
        self.cres.insert(record.id, record.clone());
        Ok(record)
    }

    fn update_cre(&mut self, record: &CreRecord) -> Result<(), CregraphError> {
        if !self.cres.contains_key(&record.id) {
            return Err(CregraphError::NotFound(format!("CRE row {}", record.id.0)));
        }
        if self.cre_key_taken(&record.name, &record.external_id, Some(record.id)) {
            return Err(cre_conflict(&record.name, &record.external_id));
        }
        self.cres.insert(record.id, record.clone());
        Ok(())
    }

    fn cre(&self, id: CreId) -> Result<Option<CreRecord>, CregraphError> {
        Ok(self.cres.get(&id).cloned())
    }

    fn cres(&self) -> Result<Vec<CreRecord>, CregraphError> {
        Ok(self.cres.values().cloned().collect())
    }

    fn insert_standard(&mut self, draft: &StandardDraft) -> Result<StandardRecord, CregraphError> {
        if self.standard_key_taken(&draft.name, &draft.section, &draft.subsection, None) {
            return Err(standard_conflict(
                &draft.name,
                &draft.section,
                &draft.subsection,
            ));
        }

        let record = StandardRecord {
            id: StandardId(self.next_standard_id),
            name: draft.name.clone(),
            section: draft.section.clone(),
            subsection: draft.subsection.clone(),
            version: draft.version.clone(),
            link: draft.hyperlink.clone(),
            tags: draft.tags.clone(),
        };
        self.next_standard_id = self.next_standard_id.saturating_add(1);
        self.standards.insert(record.id, record.clone());
        Ok(record)
    }

    fn update_standard(&mut self, record: &StandardRecord) -> Result<(), CregraphError> {
        if !self.standards.contains_key(&record.id) {
            return Err(CregraphError::NotFound(format!(
                "Standard row {}",
                record.id.0
            )));
        }
        if self.standard_key_taken(
            &record.name,
            &record.section,
            &record.subsection,
            Some(record.id),
        ) {
            return Err(standard_conflict(
                &record.name,
                &record.section,
                &record.subsection,
            ));
        }
        self.standards.insert(record.id, record.clone());
        Ok(())
    }

    fn standard(&self, id: StandardId) -> Result<Option<StandardRecord>, CregraphError> {
        Ok(self.standards.get(&id).cloned())
    }

    fn standards(&self) -> Result<Vec<StandardRecord>, CregraphError> {
        Ok(self.standards.values().cloned().collect())
    }

    fn put_internal_link(&mut self, row: InternalLinkRow) -> Result<(), CregraphError> {
        for id in [row.group, row.member] {
            if !self.cres.contains_key(&id) {
                return Err(CregraphError::NotFound(format!("CRE row {}", id.0)));
            }
        }
        self.internal_links
            .insert((row.group, row.member), row.link_type);
        Ok(())
    }

    fn internal_link(
        &self,
        group: CreId,
        member: CreId,
    ) -> Result<Option<LinkType>, CregraphError> {
        Ok(self.internal_links.get(&(group, member)).copied())
    }

    fn internal_links(&self) -> Result<Vec<InternalLinkRow>, CregraphError> {
        Ok(self
            .internal_links
            .iter()
            .map(|(&(group, member), &link_type)| InternalLinkRow {
                group,
                member,
                link_type,
            })
            .collect())
    }

    fn put_external_link(&mut self, row: ExternalLinkRow) -> Result<(), CregraphError> {
        if !self.cres.contains_key(&row.cre) {
            return Err(CregraphError::NotFound(format!("CRE row {}", row.cre.0)));
        }
        if !self.standards.contains_key(&row.standard) {
            return Err(CregraphError::NotFound(format!(
                "Standard row {}",
                row.standard.0
            )));
        }
        self.external_links
            .insert((row.cre, row.standard), row.link_type);
        Ok(())
    }

    fn external_link(
        &self,
        cre: CreId,
        standard: StandardId,
    ) -> Result<Option<LinkType>, CregraphError> {
        Ok(self.external_links.get(&(cre, standard)).copied())
    }

    fn external_links(&self) -> Result<Vec<ExternalLinkRow>, CregraphError> {
        Ok(self
            .external_links
            .iter()
            .map(|(&(cre, standard), &link_type)| ExternalLinkRow {
                cre,
                standard,
                link_type,
            })
            .collect())
    }

    fn external_links_of_cre(&self, cre: CreId) -> Result<Vec<ExternalLinkRow>, CregraphError> {
        Ok(self
            .external_links
            .range((cre, StandardId(0))..=(cre, StandardId(u64::MAX)))
            .map(|(&(cre, standard), &link_type)| ExternalLinkRow {
                cre,
                standard,
                link_type,
            })
            .collect())
    }
}

// =============================================================================
// TESTS
// =============================================================================
