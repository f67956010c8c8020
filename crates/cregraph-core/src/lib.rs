//! # cregraph-core
//!
//! Graph-integrity and query engine for a knowledge graph of CREs (common
//! requirement statements) and the Standards sections they map to.
//!
//! ## Components
//!
//! - `storage`: the Entity Store trait with in-memory and redb backends
//! - `mirror`: the in-memory directed graph over every link row
//! - `mutation`: entity upserts and cycle-checked link upserts
//! - `query`: gap analysis, link traversal and document lookups
//! - `search`: the layered free-text resolver
//! - `document` / `export`: the external document shape and full-graph passes
//!
//! ## Architectural Constraints
//!
//! - The combined CRE/Standard link graph is acyclic at all times
//! - The mirror only changes after the matching store write succeeded
//! - Deterministic: `BTreeMap`/`BTreeSet` only
//! - No async, no network dependencies

// =============================================================================
// MODULES
// =============================================================================

pub mod collection;
pub mod document;
pub mod export;
pub mod filter;
pub mod mirror;
pub mod mutation;
pub mod primitives;
pub mod query;
pub mod search;
pub mod storage;
pub mod types;

// =============================================================================
// RE-EXPORTS: Core Types (from types module)
// =============================================================================

pub use types::{
    CreDraft, CreId, CreRecord, CreRef, CregraphError, ExternalLinkRow, InternalLinkRow,
    LinkType, NodeKey, StandardDraft, StandardId, StandardRecord, StandardRef,
};

// =============================================================================
// RE-EXPORTS: Engine
// =============================================================================

pub use collection::{Collection, CollectionStatus, StorageBackend};
pub use document::{CreDocument, Document, Link, StandardDocument};
pub use export::{ImportReport, export_documents, export_file_name, import_documents};
pub use filter::{CreFilter, Page, StandardFilter};
pub use mirror::Mirror;
pub use mutation::{LinkMutator, LinkOutcome};
pub use query::QueryEngine;
pub use search::{SearchPlan, TextSearch};
pub use storage::{EntityStore, MemoryStore, RedbStore};

#[cfg(feature = "crypto-hash")]
pub use export::export_checksum;
