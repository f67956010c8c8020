//! # Collection
//!
//! The engine's entry point: one Entity Store, the Graph Mirror built from
//! it, and the compiled search patterns.
//!
//! ## Storage Backends
//!
//! - `InMemory`: `MemoryStore` (fast, volatile)
//! - `Persistent`: `RedbStore` (disk-backed, one ACID transaction per write)
//!
//! Every mutation goes through the Link Mutator, so the mirror only changes
//! after the store write returned. Queries take `&self` and never touch the
//! mirror's contents.

use crate::document::{Document, Link};
use crate::export::{ImportReport, export_documents, import_documents};
use crate::filter::{CreFilter, Page, StandardFilter};
use crate::mirror::Mirror;
use crate::mutation::{LinkMutator, LinkOutcome};
use crate::query::QueryEngine;
use crate::search::TextSearch;
use crate::storage::{EntityStore, MemoryStore, RedbStore};
use crate::{
    CreDraft, CreId, CreRecord, CreRef, CregraphError, LinkType, StandardDraft, StandardId,
    StandardRecord, StandardRef,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Storage backend of a collection.
#[derive(Debug)]
pub enum StorageBackend {
    /// BTreeMap-backed store (fast, volatile).
    InMemory(MemoryStore),
    /// Disk-backed store using redb (ACID, persistent).
    Persistent(RedbStore),
}

impl Default for StorageBackend {
    fn default() -> Self {
        Self::InMemory(MemoryStore::new())
    }
}

impl StorageBackend {
    fn store(&self) -> &dyn EntityStore {
        match self {
            Self::InMemory(store) => store,
            Self::Persistent(store) => store,
        }
    }

    fn store_mut(&mut self) -> &mut dyn EntityStore {
        match self {
            Self::InMemory(store) => store,
            Self::Persistent(store) => store,
        }
    }
}

/// Row and mirror counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionStatus {
    pub persistent: bool,
    pub cres: usize,
    pub standards: usize,
    pub internal_links: usize,
    pub external_links: usize,
    pub mirror_nodes: usize,
    pub mirror_edges: usize,
    pub max_internal_connections: usize,
}

/// Store, mirror and search resolver together.
#[derive(Debug)]
pub struct Collection {
    backend: StorageBackend,
    mirror: Mirror,
    search: TextSearch,
}

impl Collection {
    /// Empty collection with volatile storage.
    pub fn in_memory() -> Result<Self, CregraphError> {
        Self::with_backend(StorageBackend::default())
    }

    /// Open or create a redb database at `path` and load its mirror.
    pub fn with_redb(path: impl AsRef<Path>) -> Result<Self, CregraphError> {
        Self::with_backend(StorageBackend::Persistent(RedbStore::open(path)?))
    }

    /// Wrap an existing backend and build the mirror from it.
    pub fn with_backend(backend: StorageBackend) -> Result<Self, CregraphError> {
        let mirror = Mirror::load(backend.store())?;
        Ok(Self {
            backend,
            mirror,
            search: TextSearch::new()?,
        })
    }

    #[must_use]
    pub fn is_persistent(&self) -> bool {
        matches!(self.backend, StorageBackend::Persistent(_))
    }

    #[must_use]
    pub fn store(&self) -> &dyn EntityStore {
        self.backend.store()
    }

    #[must_use]
    pub fn mirror(&self) -> &Mirror {
        &self.mirror
    }

    /// Discard the mirror and rebuild it from the store.
    pub fn reload(&mut self) -> Result<(), CregraphError> {
        self.mirror = Mirror::load(self.backend.store())?;
        tracing::info!(
            nodes = self.mirror.node_count(),
            edges = self.mirror.edge_count(),
            "mirror reloaded"
        );
        Ok(())
    }

    /// Compact the redb file. Returns `false` for the in-memory backend.
    pub fn compact(&mut self) -> Result<bool, CregraphError> {
        match &mut self.backend {
            StorageBackend::Persistent(store) => store.compact().map(|()| true),
            StorageBackend::InMemory(_) => Ok(false),
        }
    }

    pub fn status(&self) -> Result<CollectionStatus, CregraphError> {
        let store = self.store();
        Ok(CollectionStatus {
            persistent: self.is_persistent(),
            cres: store.cres()?.len(),
            standards: store.standards()?.len(),
            internal_links: store.internal_links()?.len(),
            external_links: store.external_links()?.len(),
            mirror_nodes: self.mirror.node_count(),
            mirror_edges: self.mirror.edge_count(),
            max_internal_connections: QueryEngine::max_internal_connections(store)?,
        })
    }

    // =========================================================================
    // MUTATIONS
    // =========================================================================

    pub fn add_cre(&mut self, draft: &CreDraft) -> Result<CreRecord, CregraphError> {
        LinkMutator::add_cre(self.backend.store_mut(), &mut self.mirror, draft)
    }

    pub fn add_standard(&mut self, draft: &StandardDraft) -> Result<StandardRecord, CregraphError> {
        LinkMutator::add_standard(self.backend.store_mut(), &mut self.mirror, draft)
    }

    pub fn link_cres(
        &mut self,
        group: &CreRef,
        member: &CreRef,
        link_type: LinkType,
    ) -> Result<LinkOutcome, CregraphError> {
        LinkMutator::upsert_internal_link(
            self.backend.store_mut(),
            &mut self.mirror,
            group,
            member,
            link_type,
        )
    }

    pub fn link_standard(
        &mut self,
        cre: &CreRef,
        standard: &StandardRef,
        link_type: LinkType,
    ) -> Result<LinkOutcome, CregraphError> {
        LinkMutator::upsert_external_link(
            self.backend.store_mut(),
            &mut self.mirror,
            cre,
            standard,
            link_type,
        )
    }

    pub fn import<'a, I>(&mut self, docs: I) -> Result<ImportReport, CregraphError>
    where
        I: IntoIterator<Item = &'a Document>,
    {
        import_documents(self.backend.store_mut(), &mut self.mirror, docs)
    }

    // =========================================================================
    // QUERIES
    // =========================================================================

    pub fn search(&self, text: &str) -> Result<Vec<Document>, CregraphError> {
        self.search.resolve(self.store(), text)
    }

    pub fn gap_analysis(&self, names: &[String]) -> Result<Vec<Document>, CregraphError> {
        QueryEngine::gap_analysis(self.store(), &self.mirror, names)
    }

    #[must_use]
    pub fn path_exists(&self, a: StandardId, b: StandardId) -> bool {
        QueryEngine::path_exists(&self.mirror, a, b)
    }

    pub fn resolve_cre(&self, reference: &CreRef) -> Result<CreRecord, CregraphError> {
        LinkMutator::resolve_cre(self.store(), reference)
    }

    pub fn links_of(&self, cre: CreId) -> Result<Vec<Link>, CregraphError> {
        QueryEngine::links_of(self.store(), cre)
    }

    pub fn ancestors_of(&self, cre: CreId) -> Result<Vec<CreRecord>, CregraphError> {
        QueryEngine::ancestors_of(self.store(), cre)
    }

    pub fn cres_of_standard(&self, standard: StandardId) -> Result<Vec<CreRecord>, CregraphError> {
        QueryEngine::cres_of_standard(self.store(), standard)
    }

    pub fn get_cres(
        &self,
        filter: &CreFilter,
        include_only: &[String],
    ) -> Result<Vec<Document>, CregraphError> {
        QueryEngine::get_cres(self.store(), filter, include_only)
    }

    pub fn get_standards(
        &self,
        filter: &StandardFilter,
        include_only: &[String],
    ) -> Result<Vec<Document>, CregraphError> {
        QueryEngine::get_standards(self.store(), filter, include_only)
    }

    pub fn get_standards_page(
        &self,
        filter: &StandardFilter,
        page: usize,
        items_per_page: Option<usize>,
        include_only: &[String],
    ) -> Result<Page<Document>, CregraphError> {
        QueryEngine::get_standards_page(self.store(), filter, page, items_per_page, include_only)
    }

    pub fn get_by_tags(&self, tags: &[String]) -> Result<Vec<Document>, CregraphError> {
        QueryEngine::get_by_tags(self.store(), tags)
    }

    pub fn standard_names(&self) -> Result<Vec<String>, CregraphError> {
        QueryEngine::standard_names(self.store())
    }

    pub fn export(&self) -> Result<BTreeMap<String, Document>, CregraphError> {
        export_documents(self.store())
    }

    /// BLAKE3 hash of the current export.
    #[cfg(feature = "crypto-hash")]
    pub fn checksum(&self) -> Result<String, CregraphError> {
        crate::export::export_checksum(&self.export()?)
    }
}

// =============================================================================
// TESTS
// =============================================================================
