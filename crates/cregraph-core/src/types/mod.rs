//! # Core Type Definitions
//!
//! This module contains all core types for the CRE link graph:
//! - Surrogate identifiers (`CreId`, `StandardId`) and the mirror node key (`NodeKey`)
//! - Persisted rows (`CreRecord`, `StandardRecord`, `InternalLinkRow`, `ExternalLinkRow`)
//! - Upsert drafts and endpoint references (`CreDraft`, `StandardDraft`, `CreRef`, `StandardRef`)
//! - The closed link-type enumeration (`LinkType`)
//! - Error types (`CregraphError`)
//!
//! ## Determinism Guarantees
//!
//! All types in this module:
//! - Implement `Ord` for deterministic ordering in `BTreeMap`/`BTreeSet`
//! - Hold tags in a `BTreeSet` so projections are stable across runs

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

// =============================================================================
// IDENTIFIERS
// =============================================================================

/// Surrogate identifier of a persisted CRE row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CreId(pub u64);

/// Surrogate identifier of a persisted Standard row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StandardId(pub u64);

/// A node of the graph mirror: either a CRE or a Standard.
///
/// Both kinds share one node space so that acyclicity is checked across
/// internal and external links together. The string form is `CRE:<id>` or
/// `Standard:<id>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum NodeKey {
    Cre(CreId),
    Standard(StandardId),
}

impl From<CreId> for NodeKey {
    fn from(id: CreId) -> Self {
        Self::Cre(id)
    }
}

impl From<StandardId> for NodeKey {
    fn from(id: StandardId) -> Self {
        Self::Standard(id)
    }
}

impl fmt::Display for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cre(id) => write!(f, "CRE:{}", id.0),
            Self::Standard(id) => write!(f, "Standard:{}", id.0),
        }
    }
}

// =============================================================================
// LINK TYPES
// =============================================================================

/// The closed set of link types.
///
/// `LinkedTo` is a query-time annotation produced by gap analysis and is never
/// persisted. `Contains` is the only directional type: seen from the member's
/// side it reads as `PartOf`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub enum LinkType {
    #[default]
    #[serde(rename = "SAME")]
    Same,
    #[serde(rename = "Contains")]
    Contains,
    #[serde(rename = "Is Part Of")]
    PartOf,
    #[serde(rename = "Related")]
    Related,
    #[serde(rename = "Linked To")]
    LinkedTo,
}

impl LinkType {
    /// The persisted / displayed label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Same => "SAME",
            Self::Contains => "Contains",
            Self::PartOf => "Is Part Of",
            Self::Related => "Related",
            Self::LinkedTo => "Linked To",
        }
    }

    /// How a stored internal link reads from the member side.
    #[must_use]
    pub const fn seen_from_member(self) -> Self {
        match self {
            Self::Contains => Self::PartOf,
            other => other,
        }
    }

    /// Whether this type may be written to the store.
    #[must_use]
    pub const fn is_persistable(self) -> bool {
        !matches!(self, Self::LinkedTo)
    }
}

impl fmt::Display for LinkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LinkType {
    type Err = CregraphError;

    /// Case-insensitive; also accepts the short identifiers used on the CLI
    /// (`same`, `contains`, `part-of`, `related`, `linked-to`) and the legacy
    /// `SAM` default of external link rows.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .trim()
            .chars()
            .filter(|c| !matches!(c, ' ' | '-' | '_'))
            .collect::<String>()
            .to_ascii_lowercase();
        match normalized.as_str() {
            "same" | "sam" => Ok(Self::Same),
            "contains" => Ok(Self::Contains),
            "ispartof" | "partof" => Ok(Self::PartOf),
            "related" => Ok(Self::Related),
            "linkedto" => Ok(Self::LinkedTo),
            _ => Err(CregraphError::InvalidLinkType(s.to_string())),
        }
    }
}

// =============================================================================
// PERSISTED ROWS
// =============================================================================

/// A persisted CRE row.
///
/// Invariant: the (name, external_id) pair is unique across the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreRecord {
    pub id: CreId,
    /// Human-assigned identifier such as `123-456`; empty when unassigned.
    pub external_id: String,
    pub name: String,
    pub description: String,
    pub tags: BTreeSet<String>,
}

/// A persisted Standard row.
///
/// Invariant: the (name, section, subsection) triple is unique across the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StandardRecord {
    pub id: StandardId,
    pub name: String,
    pub section: String,
    pub subsection: String,
    pub version: String,
    /// Hyperlink into the standard, usually a URL with an anchor.
    pub link: String,
    pub tags: BTreeSet<String>,
}

/// A persisted CRE→CRE link, stored as (group, member).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InternalLinkRow {
    pub group: CreId,
    pub member: CreId,
    pub link_type: LinkType,
}

/// A persisted CRE→Standard link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ExternalLinkRow {
    pub cre: CreId,
    pub standard: StandardId,
    pub link_type: LinkType,
}

// =============================================================================
// DRAFTS & REFERENCES
// =============================================================================

/// Input for a CRE upsert.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreDraft {
    pub external_id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tags: BTreeSet<String>,
}

impl CreDraft {
    /// Create a draft with a name and optional external identifier.
    #[must_use]
    pub fn new(name: impl Into<String>, external_id: Option<&str>) -> Self {
        Self {
            external_id: external_id
                .filter(|id| !id.is_empty())
                .map(str::to_string),
            name: name.into(),
            ..Self::default()
        }
    }

    /// Set the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Add tags.
    #[must_use]
    pub fn with_tags<I, T>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }
}

/// Input for a Standard upsert.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StandardDraft {
    pub name: String,
    pub section: String,
    #[serde(default)]
    pub subsection: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub hyperlink: String,
    #[serde(default)]
    pub tags: BTreeSet<String>,
}

impl StandardDraft {
    /// Create a draft for `name` / `section`.
    #[must_use]
    pub fn new(name: impl Into<String>, section: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            section: section.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_subsection(mut self, subsection: impl Into<String>) -> Self {
        self.subsection = subsection.into();
        self
    }

    #[must_use]
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    #[must_use]
    pub fn with_hyperlink(mut self, hyperlink: impl Into<String>) -> Self {
        self.hyperlink = hyperlink.into();
        self
    }

    #[must_use]
    pub fn with_tags<I, T>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }
}

/// Identifies a CRE link endpoint.
///
/// When the surrogate id is not known the row is resolved by
/// (name, external_id), or by (name, description) for CREs without an
/// external identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CreRef {
    Id(CreId),
    ExternalId { name: String, external_id: String },
    Description { name: String, description: String },
}

impl CreRef {
    /// Reference a CRE the way its draft would be looked up.
    #[must_use]
    pub fn from_draft(draft: &CreDraft) -> Self {
        match &draft.external_id {
            Some(external_id) => Self::ExternalId {
                name: draft.name.clone(),
                external_id: external_id.clone(),
            },
            None => Self::Description {
                name: draft.name.clone(),
                description: draft.description.clone(),
            },
        }
    }
}

impl From<CreId> for CreRef {
    fn from(id: CreId) -> Self {
        Self::Id(id)
    }
}

impl From<&CreRecord> for CreRef {
    fn from(record: &CreRecord) -> Self {
        Self::Id(record.id)
    }
}

impl fmt::Display for CreRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(id) => write!(f, "{}", NodeKey::Cre(*id)),
            Self::ExternalId { name, external_id } => write!(f, "{external_id}:{name}"),
            Self::Description { name, .. } => write!(f, "{name}"),
        }
    }
}

/// Identifies a Standard link endpoint by id or by its
/// (name, section, subsection, version) tuple.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StandardRef {
    Id(StandardId),
    Key {
        name: String,
        section: String,
        subsection: String,
        version: String,
    },
}

impl StandardRef {
    #[must_use]
    pub fn from_draft(draft: &StandardDraft) -> Self {
        Self::Key {
            name: draft.name.clone(),
            section: draft.section.clone(),
            subsection: draft.subsection.clone(),
            version: draft.version.clone(),
        }
    }
}

impl From<StandardId> for StandardRef {
    fn from(id: StandardId) -> Self {
        Self::Id(id)
    }
}

impl From<&StandardRecord> for StandardRef {
    fn from(record: &StandardRecord) -> Self {
        Self::Id(record.id)
    }
}

impl fmt::Display for StandardRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(id) => write!(f, "{}", NodeKey::Standard(*id)),
            Self::Key {
                name,
                section,
                subsection,
                ..
            } => write!(f, "{name}:{section}:{subsection}"),
        }
    }
}

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Render a cycle as `A -> B -> A`.
fn format_cycle(cycle: &[NodeKey]) -> String {
    let mut parts: Vec<String> = cycle.iter().map(ToString::to_string).collect();
    if let Some(first) = cycle.first() {
        parts.push(first.to_string());
    }
    parts.join(" -> ")
}

/// Errors that can occur in the engine.
///
/// - `NotFound`: a caller referenced a row that does not exist (caller bug)
/// - `CycleRejected`: an expected, clean refusal; nothing was written
/// - `CorruptGraph`: the mirror already holds a cycle; needs manual repair
/// - `InvalidQuery`: a query without usable criteria; the store is not touched
#[derive(Debug, Error)]
pub enum CregraphError {
    /// A referenced CRE or Standard could not be resolved to a row.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The candidate edge would close a cycle.
    #[error("Link {from} -> {to} would introduce cycle {}", format_cycle(.cycle))]
    CycleRejected {
        from: NodeKey,
        to: NodeKey,
        cycle: Vec<NodeKey>,
    },

    /// The mirror already contains a cycle.
    #[error(
        "Existing graph contains cycle {}, manual database correction is required",
        format_cycle(.cycle)
    )]
    CorruptGraph { cycle: Vec<NodeKey> },

    /// The query carries no usable criteria or exceeds a limit.
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// An unknown or non-persistable link type.
    #[error("Invalid link type: {0}")]
    InvalidLinkType(String),

    /// A uniqueness constraint would be violated.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// A serialization error occurred.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// A deserialization error occurred.
    #[error("Deserialization error: {0}")]
    DeserializationError(String),

    /// An I/O or storage error occurred.
    #[error("I/O error: {0}")]
    IoError(String),
}

// =============================================================================
// TESTS
// =============================================================================
