//! # Engine Contract Tests
//!
//! End-to-end checks of the guarantees the engine makes to its callers.
//!
//! ## Groups
//! - Acyclicity: rejection leaves store and mirror untouched
//! - Link typing: retype in place, direction-dependent display
//! - Gap analysis
//! - Text search
//! - Error taxonomy

use cregraph_core::{
    Collection, CreDraft, CreFilter, CreRef, CregraphError, Document, EntityStore,
    InternalLinkRow, LinkMutator, LinkOutcome, LinkType, MemoryStore, Mirror, NodeKey,
    StandardDraft, StandardFilter, StandardRef,
};
use std::collections::BTreeSet;

fn collection() -> Collection {
    Collection::in_memory().expect("collection")
}

fn cre(collection: &mut Collection, name: &str, id: &str) -> CreRef {
    let record = collection
        .add_cre(&CreDraft::new(name, Some(id)))
        .expect("add cre");
    CreRef::from(&record)
}

// =============================================================================
// ACYCLICITY
// =============================================================================

mod acyclicity {
    use super::*;

    #[test]
    fn closing_edge_is_rejected_with_its_cycle() {
        let mut c = collection();
        let a = cre(&mut c, "A", "100-100");
        let b = cre(&mut c, "B", "200-200");
        let d = cre(&mut c, "D", "300-300");
        c.link_cres(&a, &b, LinkType::Contains).expect("a->b");
        c.link_cres(&b, &d, LinkType::Contains).expect("b->d");

        let mirror_before = c.mirror().clone();
        let rows_before = c.store().internal_links().expect("rows");

        let (from, to, cycle) = match c.link_cres(&d, &a, LinkType::Contains) {
            Err(CregraphError::CycleRejected { from, to, cycle }) => (from, to, cycle),
            other => unreachable!("expected a cycle rejection, got {other:?}"),
        };
        assert_eq!(from.to_string(), "CRE:3");
        assert_eq!(to.to_string(), "CRE:1");
        assert_eq!(cycle.len(), 3);

        assert_eq!(c.mirror(), &mirror_before);
        assert_eq!(c.store().internal_links().expect("rows"), rows_before);
    }

    #[test]
    fn cycles_are_checked_across_entity_kinds() {
        let mut c = collection();
        let a = cre(&mut c, "A", "100-100");
        let b = cre(&mut c, "B", "200-200");
        let standard = c
            .add_standard(&StandardDraft::new("ASVS", "V1"))
            .expect("standard");
        c.link_cres(&a, &b, LinkType::Contains).expect("a->b");
        c.link_standard(&b, &StandardRef::from(&standard), LinkType::Same)
            .expect("b->asvs");

        let b_id = c.resolve_cre(&b).expect("b").id;
        assert_eq!(c.mirror().find_cycle(), None);
        assert!(
            c.mirror()
                .contains_edge(NodeKey::Cre(b_id), NodeKey::Standard(standard.id))
        );
        assert_eq!(c.cres_of_standard(standard.id).expect("cres").len(), 1);
    }

    #[test]
    fn existing_cycle_is_reported_as_corruption() {
        let mut store = MemoryStore::new();
        let mut mirror = Mirror::new();
        let a = LinkMutator::add_cre(&mut store, &mut mirror, &CreDraft::new("A", Some("1")))
            .expect("add");
        let b = LinkMutator::add_cre(&mut store, &mut mirror, &CreDraft::new("B", Some("2")))
            .expect("add");
        let d = LinkMutator::add_cre(&mut store, &mut mirror, &CreDraft::new("D", Some("3")))
            .expect("add");

        // Rows written behind the mutator's back.
        for (group, member) in [(a.id, b.id), (b.id, a.id)] {
            store
                .put_internal_link(InternalLinkRow {
                    group,
                    member,
                    link_type: LinkType::Related,
                })
                .expect("raw row");
        }
        let mut mirror = Mirror::load(&store).expect("load");

        let result = LinkMutator::upsert_internal_link(
            &mut store,
            &mut mirror,
            &CreRef::from(&a),
            &CreRef::from(&d),
            LinkType::Contains,
        );
        assert!(matches!(result, Err(CregraphError::CorruptGraph { .. })));
        assert_eq!(store.internal_links().expect("rows").len(), 2);
    }
}

// =============================================================================
// LINK TYPING
// =============================================================================

mod link_typing {
    use super::*;

    #[test]
    fn retype_keeps_edge_count() {
        let mut c = collection();
        let a = cre(&mut c, "A", "100-100");
        let b = cre(&mut c, "B", "200-200");
        c.link_cres(&a, &b, LinkType::Related).expect("link");
        let edges = c.mirror().edge_count();

        let outcome = c.link_cres(&b, &a, LinkType::Contains).expect("retype");
        assert_eq!(
            outcome,
            LinkOutcome::Retyped {
                previous: LinkType::Related
            }
        );
        assert_eq!(c.mirror().edge_count(), edges);
        assert_eq!(c.store().internal_links().expect("rows").len(), 1);
    }

    #[test]
    fn links_of_reports_part_of_from_member_side() {
        let mut c = collection();
        let group = cre(&mut c, "Group", "100-100");
        let member = cre(&mut c, "Member", "200-200");
        c.link_cres(&group, &member, LinkType::Contains)
            .expect("link");

        let group_id = c.resolve_cre(&group).expect("group").id;
        let member_id = c.resolve_cre(&member).expect("member").id;

        let up = c.links_of(member_id).expect("links");
        assert_eq!(up.len(), 1);
        assert_eq!(up[0].ltype, LinkType::PartOf);
        assert_eq!(up[0].document.name(), "Group");

        let down = c.links_of(group_id).expect("links");
        assert_eq!(down[0].ltype, LinkType::Contains);
        assert_eq!(down[0].document.name(), "Member");

        let ancestors = c.ancestors_of(member_id).expect("ancestors");
        assert_eq!(ancestors.len(), 1);
        assert_eq!(ancestors[0].name, "Group");
    }

    #[test]
    fn upserts_are_idempotent() {
        let mut c = collection();
        let a = cre(&mut c, "A", "100-100");
        let b = cre(&mut c, "B", "200-200");
        c.link_cres(&a, &b, LinkType::Contains).expect("link");
        let rows = c.store().internal_links().expect("rows");
        let cres = c.store().cres().expect("cres");

        cre(&mut c, "A", "100-100");
        let outcome = c.link_cres(&a, &b, LinkType::Contains).expect("again");

        assert_eq!(outcome, LinkOutcome::Unchanged);
        assert_eq!(c.store().internal_links().expect("rows"), rows);
        assert_eq!(c.store().cres().expect("cres"), cres);
    }

    #[test]
    fn derived_link_type_is_not_persisted() {
        let mut c = collection();
        let a = cre(&mut c, "A", "100-100");
        let b = cre(&mut c, "B", "200-200");
        assert!(matches!(
            c.link_cres(&a, &b, LinkType::LinkedTo),
            Err(CregraphError::InvalidLinkType(_))
        ));
        assert_eq!(c.mirror().edge_count(), 0);
    }
}

// =============================================================================
// GAP ANALYSIS
// =============================================================================

mod gap_analysis {
    use super::*;

    #[test]
    fn connected_standards_are_linked_and_isolated_one_is_not() {
        let mut c = collection();
        let top = cre(&mut c, "Top", "100-100");
        let child = cre(&mut c, "Child", "200-200");
        c.link_cres(&top, &child, LinkType::Contains).expect("link");

        let mut standard = |name: &str| {
            let record = c
                .add_standard(&StandardDraft::new(name, "1"))
                .expect("standard");
            StandardRef::from(&record)
        };
        let sa = standard("A");
        let _sb = standard("B");
        let sc = standard("C");
        c.link_standard(&top, &sa, LinkType::Same).expect("link");
        c.link_standard(&child, &sc, LinkType::Related).expect("link");

        let names = ["A", "B", "C"].map(String::from);
        let docs = c.gap_analysis(&names).expect("gap");
        assert_eq!(docs.len(), 3);

        for doc in &docs {
            let linked: Vec<&str> = doc.links().iter().map(|l| l.document.name()).collect();
            match doc.name() {
                "A" => assert_eq!(linked, vec!["C"]),
                "B" => assert!(linked.is_empty()),
                "C" => assert_eq!(linked, vec!["A"]),
                other => unreachable!("unexpected standard {other}"),
            }
            assert!(doc.links().iter().all(|l| l.ltype == LinkType::LinkedTo));
        }

        let status = c.status().expect("status");
        assert_eq!(status.external_links, 2);
    }
}

// =============================================================================
// TEXT SEARCH
// =============================================================================

mod text_search {
    use super::*;

    #[test]
    fn exact_id_branch_does_not_fall_back() {
        let mut c = collection();
        cre(&mut c, "CRE:123-456 lookalike", "999-999");

        let found = c.search("CRE:123-456").expect("search");
        assert!(found.is_empty());
    }

    #[test]
    fn standard_tokens_are_tried_in_every_order() {
        let mut c = collection();
        for (name, section, subsection) in [
            ("OWASP", "V1", "1.1"),
            ("1.1", "OWASP", "V1"),
            ("V1", "1.1", "OWASP"),
            ("OWASP", "V2", "1.1"),
        ] {
            c.add_standard(&StandardDraft::new(name, section).with_subsection(subsection))
                .expect("standard");
        }

        let found = c.search("Standard:OWASP:V1:1.1").expect("search");
        let names: BTreeSet<&str> = found.iter().map(Document::name).collect();
        assert_eq!(found.len(), 3);
        assert_eq!(names, BTreeSet::from(["OWASP", "1.1", "V1"]));
    }
}

// =============================================================================
// ERROR TAXONOMY
// =============================================================================

mod errors {
    use super::*;

    #[test]
    fn unknown_endpoint_is_not_found() {
        let mut c = collection();
        let a = cre(&mut c, "A", "100-100");
        let ghost = CreRef::ExternalId {
            name: "Ghost".to_string(),
            external_id: "000-000".to_string(),
        };
        assert!(matches!(
            c.link_cres(&a, &ghost, LinkType::Contains),
            Err(CregraphError::NotFound(_))
        ));
        assert_eq!(c.mirror().edge_count(), 0);
    }

    #[test]
    fn empty_filters_are_invalid_queries() {
        let c = collection();
        assert!(matches!(
            c.get_standards(&StandardFilter::default(), &[]),
            Err(CregraphError::InvalidQuery(_))
        ));
        assert!(matches!(
            c.get_cres(&CreFilter::default(), &[]),
            Err(CregraphError::InvalidQuery(_))
        ));
    }

    #[test]
    fn lookups_that_find_nothing_are_empty() {
        let c = collection();
        assert!(
            c.get_cres(&CreFilter::by_external_id("404-404"), &[])
                .expect("query")
                .is_empty()
        );
        assert!(c.search("nothing here").expect("search").is_empty());
    }
}
