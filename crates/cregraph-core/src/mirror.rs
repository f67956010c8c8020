//! # Graph Mirror
//!
//! In-memory directed graph over CRE and Standard nodes. Every persisted link
//! row has exactly one edge here: group→member for internal links and
//! cre→standard for external links.
//!
//! The mirror is a write-through cache of the store. It is built by
//! [`Mirror::load`] and then only ever grows, after the corresponding store
//! write has committed. Nothing removes nodes or edges.
//!
//! All data structures use `BTreeMap`/`BTreeSet` so cycle reports and
//! traversals are deterministic.

use crate::storage::EntityStore;
use crate::{CregraphError, NodeKey};
use std::collections::{BTreeMap, BTreeSet, VecDeque};

static NO_NEIGHBORS: BTreeSet<NodeKey> = BTreeSet::new();

#[derive(Clone, Copy, PartialEq, Eq)]
enum Visit {
    Active,
    Done,
}

/// The in-memory link graph.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Mirror {
    /// Outgoing edges: from -> {to}
    adjacency: BTreeMap<NodeKey, BTreeSet<NodeKey>>,
    /// Incoming edges: to -> {from}
    reverse: BTreeMap<NodeKey, BTreeSet<NodeKey>>,
    edge_count: usize,
}

impl Mirror {
    /// Create an empty mirror.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild the mirror from every row in `store`.
    ///
    /// Every CRE and Standard becomes a node, linked or not.
    pub fn load(store: &dyn EntityStore) -> Result<Self, CregraphError> {
        let mut mirror = Self::new();
        for cre in store.cres()? {
            mirror.add_node(cre.id.into());
        }
        for standard in store.standards()? {
            mirror.add_node(standard.id.into());
        }
        for row in store.internal_links()? {
            mirror.add_edge(row.group.into(), row.member.into());
        }
        for row in store.external_links()? {
            mirror.add_edge(row.cre.into(), row.standard.into());
        }
        tracing::debug!(
            nodes = mirror.node_count(),
            edges = mirror.edge_count(),
            "mirror loaded"
        );
        Ok(mirror)
    }

    /// Add a node. No-op if present.
    pub fn add_node(&mut self, node: NodeKey) {
        self.adjacency.entry(node).or_default();
        self.reverse.entry(node).or_default();
    }

    /// Add a directed edge, creating missing endpoints. Returns `false` if the
    /// edge was already present.
    pub fn add_edge(&mut self, from: NodeKey, to: NodeKey) -> bool {
        self.add_node(from);
        self.add_node(to);
        let added = self.adjacency.entry(from).or_default().insert(to);
        if added {
            self.reverse.entry(to).or_default().insert(from);
            self.edge_count = self.edge_count.saturating_add(1);
        }
        added
    }

    #[must_use]
    pub fn contains_node(&self, node: NodeKey) -> bool {
        self.adjacency.contains_key(&node)
    }

    #[must_use]
    pub fn contains_edge(&self, from: NodeKey, to: NodeKey) -> bool {
        self.adjacency
            .get(&from)
            .is_some_and(|targets| targets.contains(&to))
    }

    #[must_use]
    pub fn node_count(&self) -> usize {
        self.adjacency.len()
    }

    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.edge_count
    }

    /// All nodes in order.
    pub fn nodes(&self) -> impl Iterator<Item = NodeKey> + '_ {
        self.adjacency.keys().copied()
    }

    /// All edges in (from, to) order.
    pub fn edges(&self) -> impl Iterator<Item = (NodeKey, NodeKey)> + '_ {
        self.adjacency
            .iter()
            .flat_map(|(&from, targets)| targets.iter().map(move |&to| (from, to)))
    }

    /// Outgoing neighbors of `node`.
    pub fn successors(&self, node: NodeKey) -> impl Iterator<Item = NodeKey> + '_ {
        self.adjacency
            .get(&node)
            .unwrap_or(&NO_NEIGHBORS)
            .iter()
            .copied()
    }

    /// Incoming neighbors of `node`.
    pub fn predecessors(&self, node: NodeKey) -> impl Iterator<Item = NodeKey> + '_ {
        self.reverse
            .get(&node)
            .unwrap_or(&NO_NEIGHBORS)
            .iter()
            .copied()
    }

    // =========================================================================
    // CYCLE DETECTION
    // =========================================================================

    /// Find one directed cycle, if any.
    ///
    /// Iterative three-color DFS, roots visited in key order. The returned
    /// nodes are in edge order; the closing edge runs from the last node back
    /// to the first.
    #[must_use]
    pub fn find_cycle(&self) -> Option<Vec<NodeKey>> {
        let mut state: BTreeMap<NodeKey, Visit> = BTreeMap::new();

        for &root in self.adjacency.keys() {
            if state.contains_key(&root) {
                continue;
            }

            let mut path = vec![root];
            let mut stack = vec![self.successors(root)];
            state.insert(root, Visit::Active);

            while let Some(frontier) = stack.last_mut() {
                match frontier.next() {
                    Some(next) => match state.get(&next) {
                        Some(Visit::Active) => {
                            let start = path.iter().position(|&n| n == next)?;
                            return Some(path.split_off(start));
                        }
                        Some(Visit::Done) => {}
                        None => {
                            state.insert(next, Visit::Active);
                            path.push(next);
                            stack.push(self.successors(next));
                        }
                    },
                    None => {
                        stack.pop();
                        if let Some(finished) = path.pop() {
                            state.insert(finished, Visit::Done);
                        }
                    }
                }
            }
        }

        None
    }

    /// Trial-insert `from → to` into a scratch copy and report the cycle it
    /// would close. The live mirror is not touched.
    #[must_use]
    pub fn trial_cycle(&self, from: NodeKey, to: NodeKey) -> Option<Vec<NodeKey>> {
        if self.contains_edge(from, to) {
            return None;
        }
        let mut scratch = self.clone();
        scratch.add_edge(from, to);
        scratch.find_cycle()
    }

    // =========================================================================
    // REACHABILITY
    // =========================================================================

    /// Whether `a` and `b` are connected when edge direction is ignored.
    ///
    /// False if either node is absent; true when `a == b` and present.
    #[must_use]
    pub fn path_exists(&self, a: NodeKey, b: NodeKey) -> bool {
        if !self.contains_node(a) || !self.contains_node(b) {
            return false;
        }
        if a == b {
            return true;
        }

        let mut visited = BTreeSet::from([a]);
        let mut queue = VecDeque::from([a]);

        while let Some(current) = queue.pop_front() {
            for neighbor in self.successors(current).chain(self.predecessors(current)) {
                if neighbor == b {
                    return true;
                }
                if visited.insert(neighbor) {
                    queue.push_back(neighbor);
                }
            }
        }

        false
    }
}

// =============================================================================
// TESTS
// =============================================================================
