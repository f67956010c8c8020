//! # Link Mutator
//!
//! Consolidates every write path of the engine: entity upserts and link
//! upserts.
//!
//! Each operation is one store write followed by a mirror update. The mirror
//! is only touched after the store call returned `Ok`, so a failed write can
//! never leave an edge behind. Link upserts go through the cycle check:
//!
//! 1. resolve both endpoints (`NotFound` otherwise)
//! 2. an existing edge between the pair, in either direction, is retyped in
//!    place with no cycle check
//! 3. an already cyclic mirror refuses all new edges (`CorruptGraph`)
//! 4. the candidate edge is trial-inserted into a scratch copy
//!    (`CycleRejected` if that closes a cycle)
//! 5. the row is persisted, then the edge is added to the live mirror

use crate::filter::{CreFilter, StandardFilter};
use crate::mirror::Mirror;
use crate::storage::EntityStore;
use crate::{
    CreDraft, CreRecord, CreRef, CregraphError, ExternalLinkRow, InternalLinkRow, LinkType,
    NodeKey, StandardDraft, StandardRecord, StandardRef,
};
use serde::{Deserialize, Serialize};

/// What a link upsert did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum LinkOutcome {
    /// A new edge was stored.
    Created,
    /// An existing edge got a new type.
    Retyped { previous: LinkType },
    /// The edge already existed with this type.
    Unchanged,
}

/// Unit struct grouping the write operations.
pub struct LinkMutator;

impl LinkMutator {
    // =========================================================================
    // ENTITY UPSERTS
    // =========================================================================

    /// Insert a CRE, or fill in the empty fields of the row it matches.
    ///
    /// A row matches on case-insensitive name plus the draft's external id.
    /// Without an external id the draft matches on case-insensitive
    /// description first, then falls back to the row stored with an empty
    /// external id, which is the one the store key would clash with.
    pub fn add_cre(
        store: &mut dyn EntityStore,
        mirror: &mut Mirror,
        draft: &CreDraft,
    ) -> Result<CreRecord, CregraphError> {
        let candidates = store.find_cres(&CreFilter::by_name(draft.name.clone()))?;
        let existing = match &draft.external_id {
            Some(external_id) => candidates
                .into_iter()
                .find(|cre| cre.external_id == *external_id),
            None => {
                let description = draft.description.to_lowercase();
                let matched = candidates
                    .iter()
                    .position(|cre| cre.description.to_lowercase() == description)
                    .or_else(|| candidates.iter().position(|cre| cre.external_id.is_empty()));
                matched.and_then(|at| candidates.into_iter().nth(at))
            }
        };

        let Some(mut record) = existing else {
            tracing::debug!(name = %draft.name, "did not know of CRE, adding");
            let record = store.insert_cre(draft)?;
            mirror.add_node(record.id.into());
            return Ok(record);
        };

        tracing::debug!(name = %draft.name, id = record.id.0, "knew of CRE, updating");
        let mut changed = false;
        if record.external_id.is_empty()
            && let Some(external_id) = &draft.external_id
        {
            record.external_id.clone_from(external_id);
            changed = true;
        }
        if record.description.is_empty() && !draft.description.is_empty() {
            record.description.clone_from(&draft.description);
            changed = true;
        }
        if record.tags.is_empty() && !draft.tags.is_empty() {
            record.tags.clone_from(&draft.tags);
            changed = true;
        }
        if changed {
            store.update_cre(&record)?;
        }
        mirror.add_node(record.id.into());
        Ok(record)
    }

    /// Insert a Standard, or refresh the version and hyperlink of the row it
    /// matches on case-insensitive (name, section, subsection).
    ///
    /// The version is not part of the identity: a newer release of the same
    /// section updates the existing row in place.
    pub fn add_standard(
        store: &mut dyn EntityStore,
        mirror: &mut Mirror,
        draft: &StandardDraft,
    ) -> Result<StandardRecord, CregraphError> {
        let same = |a: &str, b: &str| a.to_lowercase() == b.to_lowercase();
        let existing = store
            .find_standards(&StandardFilter::by_name(draft.name.clone()))?
            .into_iter()
            .find(|s| {
                same(&s.section, &draft.section) && same(&s.subsection, &draft.subsection)
            });

        let Some(mut record) = existing else {
            tracing::debug!(
                name = %draft.name,
                section = %draft.section,
                "did not know of Standard, adding"
            );
            let record = store.insert_standard(draft)?;
            mirror.add_node(record.id.into());
            return Ok(record);
        };

        tracing::debug!(name = %draft.name, id = record.id.0, "knew of Standard, updating");
        let mut changed = false;
        if !draft.version.is_empty() && record.version != draft.version {
            tracing::debug!(
                from = %record.version,
                to = %draft.version,
                "Standard version refreshed"
            );
            record.version.clone_from(&draft.version);
            changed = true;
        }
        if !draft.hyperlink.is_empty() && record.link != draft.hyperlink {
            record.link.clone_from(&draft.hyperlink);
            changed = true;
        }
        if record.tags.is_empty() && !draft.tags.is_empty() {
            record.tags.clone_from(&draft.tags);
            changed = true;
        }
        if changed {
            store.update_standard(&record)?;
        }
        mirror.add_node(record.id.into());
        Ok(record)
    }

    // =========================================================================
    // ENDPOINT RESOLUTION
    // =========================================================================

    /// Resolve a CRE reference to its row, exactly.
    pub fn resolve_cre(
        store: &dyn EntityStore,
        reference: &CreRef,
    ) -> Result<CreRecord, CregraphError> {
        let found = match reference {
            CreRef::Id(id) => store.cre(*id)?,
            CreRef::ExternalId { name, external_id } => store
                .find_cres(&CreFilter::by_external_id(external_id.clone()))?
                .into_iter()
                .find(|cre| cre.name == *name),
            CreRef::Description { name, description } => store
                .cres()?
                .into_iter()
                .find(|cre| cre.name == *name && cre.description == *description),
        };
        found.ok_or_else(|| {
            tracing::error!(cre = %reference, "link endpoint does not exist");
            CregraphError::NotFound(format!("CRE {reference}"))
        })
    }

    /// Resolve a Standard reference to its row, exactly.
    pub fn resolve_standard(
        store: &dyn EntityStore,
        reference: &StandardRef,
    ) -> Result<StandardRecord, CregraphError> {
        let found = match reference {
            StandardRef::Id(id) => store.standard(*id)?,
            StandardRef::Key {
                name,
                section,
                subsection,
                version,
            } => store.standards()?.into_iter().find(|s| {
                s.name == *name
                    && s.section == *section
                    && s.subsection == *subsection
                    && s.version == *version
            }),
        };
        found.ok_or_else(|| {
            tracing::error!(standard = %reference, "link endpoint does not exist");
            CregraphError::NotFound(format!("Standard {reference}"))
        })
    }

    // =========================================================================
    // LINK UPSERTS
    // =========================================================================

    /// Insert or retype the internal link `group → member`.
    ///
    /// `PartOf` is stored as the inverse `Contains` edge.
    pub fn upsert_internal_link(
        store: &mut dyn EntityStore,
        mirror: &mut Mirror,
        group: &CreRef,
        member: &CreRef,
        link_type: LinkType,
    ) -> Result<LinkOutcome, CregraphError> {
        check_persistable(link_type)?;
        let (group, member, link_type) = match link_type {
            LinkType::PartOf => (member, group, LinkType::Contains),
            other => (group, member, other),
        };

        let group = Self::resolve_cre(&*store, group)?;
        let member = Self::resolve_cre(&*store, member)?;

        // An edge in either direction is the same logical link.
        for (a, b) in [(group.id, member.id), (member.id, group.id)] {
            if let Some(previous) = store.internal_link(a, b)? {
                if previous == link_type {
                    return Ok(LinkOutcome::Unchanged);
                }
                tracing::debug!(
                    from = %NodeKey::from(a),
                    to = %NodeKey::from(b),
                    %previous,
                    %link_type,
                    "retyping internal link"
                );
                store.put_internal_link(InternalLinkRow {
                    group: a,
                    member: b,
                    link_type,
                })?;
                return Ok(LinkOutcome::Retyped { previous });
            }
        }

        let (from, to) = (NodeKey::from(group.id), NodeKey::from(member.id));
        check_acyclic(mirror, from, to)?;

        store.put_internal_link(InternalLinkRow {
            group: group.id,
            member: member.id,
            link_type,
        })?;
        mirror.add_edge(from, to);
        tracing::debug!(%from, %to, %link_type, "internal link created");
        Ok(LinkOutcome::Created)
    }

    /// Insert or retype the external link `cre → standard`.
    pub fn upsert_external_link(
        store: &mut dyn EntityStore,
        mirror: &mut Mirror,
        cre: &CreRef,
        standard: &StandardRef,
        link_type: LinkType,
    ) -> Result<LinkOutcome, CregraphError> {
        check_persistable(link_type)?;
        let cre = Self::resolve_cre(&*store, cre)?;
        let standard = Self::resolve_standard(&*store, standard)?;

        if let Some(previous) = store.external_link(cre.id, standard.id)? {
            if previous == link_type {
                return Ok(LinkOutcome::Unchanged);
            }
            tracing::debug!(
                cre = cre.id.0,
                standard = standard.id.0,
                %previous,
                %link_type,
                "retyping external link"
            );
            store.put_external_link(ExternalLinkRow {
                cre: cre.id,
                standard: standard.id,
                link_type,
            })?;
            return Ok(LinkOutcome::Retyped { previous });
        }

        let (from, to) = (NodeKey::from(cre.id), NodeKey::from(standard.id));
        check_acyclic(mirror, from, to)?;

        store.put_external_link(ExternalLinkRow {
            cre: cre.id,
            standard: standard.id,
            link_type,
        })?;
        mirror.add_edge(from, to);
        tracing::debug!(%from, %to, %link_type, "external link created");
        Ok(LinkOutcome::Created)
    }
}

fn check_persistable(link_type: LinkType) -> Result<(), CregraphError> {
    if link_type.is_persistable() {
        Ok(())
    } else {
        Err(CregraphError::InvalidLinkType(format!(
            "'{link_type}' links are derived and cannot be stored"
        )))
    }
}

/// Steps 3 and 4: refuse on a corrupt mirror, then trial the new edge.
fn check_acyclic(mirror: &Mirror, from: NodeKey, to: NodeKey) -> Result<(), CregraphError> {
    if let Some(cycle) = mirror.find_cycle() {
        tracing::error!(
            cycle = ?cycle,
            "existing graph contains a cycle, manual database correction is required"
        );
        return Err(CregraphError::CorruptGraph { cycle });
    }
    if let Some(cycle) = mirror.trial_cycle(from, to) {
        tracing::warn!(%from, %to, cycle = ?cycle, "rejecting link that would introduce a cycle");
        return Err(CregraphError::CycleRejected { from, to, cycle });
    }
    Ok(())
}

// =============================================================================
// TESTS
// =============================================================================
