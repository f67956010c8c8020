//! # Property-Based Tests
//!
//! Acyclicity and write-through invariants under arbitrary upsert sequences.

use cregraph_core::{
    Collection, CreDraft, CreRecord, CreRef, CregraphError, EntityStore, LinkOutcome, LinkType,
    Mirror, StandardDraft, StandardRecord, StandardRef,
};
use proptest::collection::vec;
use proptest::prelude::*;

const CRES: usize = 6;
const STANDARDS: usize = 3;

#[derive(Debug, Clone, Copy)]
enum Op {
    Internal(usize, usize, LinkType),
    External(usize, usize, LinkType),
}

fn link_type() -> impl Strategy<Value = LinkType> {
    prop_oneof![
        Just(LinkType::Same),
        Just(LinkType::Contains),
        Just(LinkType::PartOf),
        Just(LinkType::Related),
    ]
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0..CRES, 0..CRES, link_type()).prop_map(|(a, b, t)| Op::Internal(a, b, t)),
        (0..CRES, 0..STANDARDS, link_type()).prop_map(|(a, s, t)| Op::External(a, s, t)),
    ]
}

fn seeded() -> (Collection, Vec<CreRecord>, Vec<StandardRecord>) {
    let mut c = Collection::in_memory().expect("collection");
    let cres = (0..CRES)
        .map(|i| {
            c.add_cre(&CreDraft::new(format!("CRE {i}"), Some(&format!("{i:03}-000"))))
                .expect("cre")
        })
        .collect();
    let standards = (0..STANDARDS)
        .map(|i| {
            c.add_standard(&StandardDraft::new("ASVS", format!("V{i}")))
                .expect("standard")
        })
        .collect();
    (c, cres, standards)
}

fn apply(
    c: &mut Collection,
    cres: &[CreRecord],
    standards: &[StandardRecord],
    op: Op,
) -> Result<LinkOutcome, CregraphError> {
    match op {
        Op::Internal(a, b, t) => c.link_cres(&CreRef::from(&cres[a]), &CreRef::from(&cres[b]), t),
        Op::External(a, s, t) => c.link_standard(
            &CreRef::from(&cres[a]),
            &StandardRef::from(&standards[s]),
            t,
        ),
    }
}

proptest! {
    /// No sequence of accepted upserts leaves a cycle behind.
    #[test]
    fn accepted_upserts_keep_graph_acyclic(ops in vec(op(), 1..60)) {
        let (mut c, cres, standards) = seeded();
        for op in ops {
            let _ = apply(&mut c, &cres, &standards, op);
            prop_assert_eq!(c.mirror().find_cycle(), None);
        }
    }

    /// A rejected edge leaves the mirror exactly as it was.
    #[test]
    fn rejection_leaves_mirror_unchanged(ops in vec(op(), 1..60)) {
        let (mut c, cres, standards) = seeded();
        for op in ops {
            let before: Mirror = c.mirror().clone();
            let rows = c.store().internal_links().expect("rows").len();
            if let Err(CregraphError::CycleRejected { .. }) = apply(&mut c, &cres, &standards, op) {
                prop_assert_eq!(c.mirror(), &before);
                prop_assert_eq!(c.store().internal_links().expect("rows").len(), rows);
            }
        }
    }

    /// Retyping changes no edge count.
    #[test]
    fn retype_keeps_edge_count(ops in vec(op(), 1..60)) {
        let (mut c, cres, standards) = seeded();
        for op in ops {
            let edges = c.mirror().edge_count();
            match apply(&mut c, &cres, &standards, op) {
                Ok(LinkOutcome::Retyped { .. } | LinkOutcome::Unchanged) => {
                    prop_assert_eq!(c.mirror().edge_count(), edges);
                }
                Ok(LinkOutcome::Created) => {
                    prop_assert_eq!(c.mirror().edge_count(), edges + 1);
                }
                Err(_) => prop_assert_eq!(c.mirror().edge_count(), edges),
            }
        }
    }

    /// Replaying a sequence changes nothing the second time.
    #[test]
    fn replay_is_idempotent(ops in vec(op(), 1..40)) {
        let (mut c, cres, standards) = seeded();
        for &op in &ops {
            let _ = apply(&mut c, &cres, &standards, op);
        }
        let internal = c.store().internal_links().expect("rows");
        let external = c.store().external_links().expect("rows");

        for &op in &ops {
            let _ = apply(&mut c, &cres, &standards, op);
        }
        prop_assert_eq!(c.store().internal_links().expect("rows"), internal);
        prop_assert_eq!(c.store().external_links().expect("rows"), external);
        prop_assert_eq!(c.store().cres().expect("cres").len(), CRES);
    }

    /// The live mirror always equals one rebuilt from the store.
    #[test]
    fn mirror_matches_store(ops in vec(op(), 1..60)) {
        let (mut c, cres, standards) = seeded();
        for op in ops {
            let _ = apply(&mut c, &cres, &standards, op);
        }
        let rebuilt = Mirror::load(c.store()).expect("load");
        prop_assert_eq!(c.mirror(), &rebuilt);
    }
}
