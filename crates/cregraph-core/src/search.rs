//! # Text Search Resolver
//!
//! Classifies free text into a structured lookup, or falls back to fuzzy
//! matching over every filter field.
//!
//! Structured forms, tried in order; the first one that matches decides the
//! lookup even when it finds nothing:
//!
//! | Input                              | Lookup                          |
//! |------------------------------------|---------------------------------|
//! | `CRE:123-456`, `cre 123-456`       | CRE by external id              |
//! | `... 123-456 ...`                  | CRE by external id              |
//! | `CRE:Authentication`               | CRE by name                     |
//! | `Standard[:url][:a][:b][:c]`       | Standard, `a b c` in any order  |
//!
//! Anything else is wrapped as `%text%` and tried against each Standard field
//! (name, section, subsection, link) and each CRE field (name, external id,
//! description) in partial mode.

use crate::document::Document;
use crate::filter::{CreFilter, StandardFilter};
use crate::primitives::{MAX_SEARCH_TEXT_LENGTH, WILDCARD_ANY};
use crate::query::QueryEngine;
use crate::storage::EntityStore;
use crate::CregraphError;
use regex::{Regex, RegexBuilder};
use std::collections::BTreeSet;

const CRE_ID_PATTERN: &str = r"CRE(:| )(?P<id>\d+-\d+)";
const CRE_NAKED_ID_PATTERN: &str = r"\d\d\d-\d\d\d";
const CRE_NAME_PATTERN: &str = r"CRE(:| )(?P<name>\w+)";
const STANDARD_PATTERN: &str = r"Standard((:| )(?P<link>https?://\S+))?((:| )(?P<val1>\w+))?((:| )(?P<val2>[^:]+))?((:| )(?P<val3>.+))?";

fn compile(pattern: &str) -> Result<Regex, CregraphError> {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .map_err(|e| CregraphError::InvalidQuery(format!("bad search pattern: {e}")))
}

/// Every ordering of `items`.
fn permutations<T: Clone>(items: &[T]) -> Vec<Vec<T>> {
    if items.len() <= 1 {
        return vec![items.to_vec()];
    }
    let mut out = Vec::new();
    for i in 0..items.len() {
        let mut rest = items.to_vec();
        let head = rest.remove(i);
        for mut tail in permutations(&rest) {
            tail.insert(0, head.clone());
            out.push(tail);
        }
    }
    out
}

/// The structured form a query was classified as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchPlan {
    CreById(String),
    CreByName(String),
    Standard {
        link: Option<String>,
        values: [Option<String>; 3],
    },
    Fuzzy(String),
}

/// Compiled patterns of the resolver.
#[derive(Debug, Clone)]
pub struct TextSearch {
    cre_id: Regex,
    cre_naked_id: Regex,
    cre_name: Regex,
    standard: Regex,
}

impl TextSearch {
    pub fn new() -> Result<Self, CregraphError> {
        Ok(Self {
            cre_id: compile(CRE_ID_PATTERN)?,
            cre_naked_id: compile(CRE_NAKED_ID_PATTERN)?,
            cre_name: compile(CRE_NAME_PATTERN)?,
            standard: compile(STANDARD_PATTERN)?,
        })
    }

    /// Classify `text` without touching any store.
    ///
    /// A bare `Standard` with neither a link nor a value is not structured
    /// and falls through to fuzzy matching.
    pub fn plan(&self, text: &str) -> Result<SearchPlan, CregraphError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(CregraphError::InvalidQuery(
                "search text is empty".to_string(),
            ));
        }
        if text.len() > MAX_SEARCH_TEXT_LENGTH {
            return Err(CregraphError::InvalidQuery(format!(
                "search text longer than {MAX_SEARCH_TEXT_LENGTH} bytes"
            )));
        }

        if let Some(caps) = self.cre_id.captures(text)
            && let Some(id) = caps.name("id")
        {
            return Ok(SearchPlan::CreById(id.as_str().to_string()));
        }
        if let Some(found) = self.cre_naked_id.find(text) {
            return Ok(SearchPlan::CreById(found.as_str().to_string()));
        }
        if let Some(caps) = self.cre_name.captures(text)
            && let Some(name) = caps.name("name")
        {
            return Ok(SearchPlan::CreByName(name.as_str().to_string()));
        }
        if let Some(caps) = self.standard.captures(text) {
            let group = |name: &str| {
                caps.name(name)
                    .map(|m| m.as_str().trim().to_string())
                    .filter(|v| !v.is_empty())
            };
            let link = group("link");
            let values = [group("val1"), group("val2"), group("val3")];
            if link.is_some() || values.iter().any(Option::is_some) {
                return Ok(SearchPlan::Standard { link, values });
            }
        }

        Ok(SearchPlan::Fuzzy(text.to_string()))
    }

    /// Resolve `text` to documents, deduplicated, in discovery order.
    pub fn resolve(
        &self,
        store: &dyn EntityStore,
        text: &str,
    ) -> Result<Vec<Document>, CregraphError> {
        let plan = self.plan(text)?;
        tracing::debug!(?plan, "text search");

        let mut results = Results::default();
        match plan {
            SearchPlan::CreById(id) => {
                results.cres(store, &CreFilter::by_external_id(id))?;
            }
            SearchPlan::CreByName(name) => {
                results.cres(store, &CreFilter::by_name(name))?;
            }
            SearchPlan::Standard { link, values } => {
                for combo in permutations(&values) {
                    let mut fields = combo.into_iter();
                    let filter = StandardFilter {
                        name: fields.next().flatten(),
                        section: fields.next().flatten(),
                        subsection: fields.next().flatten(),
                        link: link.clone(),
                        ..StandardFilter::default()
                    };
                    results.standards(store, &filter)?;
                }
            }
            SearchPlan::Fuzzy(text) => {
                let wrapped = format!("{WILDCARD_ANY}{text}{WILDCARD_ANY}");
                for slot in 0..4 {
                    let pick = |i: usize| (i == slot).then(|| wrapped.clone());
                    let filter = StandardFilter {
                        name: pick(0),
                        section: pick(1),
                        subsection: pick(2),
                        link: pick(3),
                        ..StandardFilter::default()
                    }
                    .partial();
                    results.standards(store, &filter)?;
                }
                for slot in 0..3 {
                    let pick = |i: usize| (i == slot).then(|| wrapped.clone());
                    let filter = CreFilter {
                        name: pick(0),
                        external_id: pick(1),
                        description: pick(2),
                        ..CreFilter::default()
                    }
                    .partial();
                    results.cres(store, &filter)?;
                }
            }
        }

        Ok(results.documents)
    }
}

/// Accumulates projected documents, dropping repeats.
#[derive(Default)]
struct Results {
    seen: BTreeSet<Document>,
    documents: Vec<Document>,
}

impl Results {
    fn push(&mut self, document: Document) {
        if self.seen.insert(document.clone()) {
            self.documents.push(document);
        }
    }

    fn cres(&mut self, store: &dyn EntityStore, filter: &CreFilter) -> Result<(), CregraphError> {
        for record in store.find_cres(filter)? {
            self.push(QueryEngine::cre_document(store, &record, &[])?);
        }
        Ok(())
    }

    fn standards(
        &mut self,
        store: &dyn EntityStore,
        filter: &StandardFilter,
    ) -> Result<(), CregraphError> {
        if filter.is_empty() {
            return Ok(());
        }
        for record in store.find_standards(filter)? {
            self.push(QueryEngine::standard_document(store, &record, &[])?);
        }
        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================
