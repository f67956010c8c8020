//! # Store Filters
//!
//! Filter criteria for CRE and Standard lookups, with exact and partial
//! (`LIKE`-style) matching, plus the pagination envelope used by paginated
//! standard queries.
//!
//! Matching rules:
//! - name, section, subsection and description compare case-insensitively
//! - external_id, link and version compare case-sensitively
//! - partial mode treats `%` as "any run" and `_` as "one character"
//! - empty strings count as absent; a filter with no criteria is invalid

use crate::primitives::{DEFAULT_ITEMS_PER_PAGE, MAX_ITEMS_PER_PAGE, WILDCARD_ANY, WILDCARD_ONE};
use crate::{CreRecord, CregraphError, StandardRecord};
use serde::{Deserialize, Serialize};

// =============================================================================
// PATTERN MATCHING
// =============================================================================

/// SQL `LIKE` matching over chars. Iterative with single-star backtracking.
pub fn like(pattern: &str, value: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let v: Vec<char> = value.chars().collect();
    let (mut pi, mut vi) = (0usize, 0usize);
    let mut star: Option<(usize, usize)> = None;

    while vi < v.len() {
        if pi < p.len() && p[pi] == WILDCARD_ANY {
            star = Some((pi, vi));
            pi += 1;
        } else if pi < p.len() && (p[pi] == WILDCARD_ONE || p[pi] == v[vi]) {
            pi += 1;
            vi += 1;
        } else if let Some((star_pi, star_vi)) = star {
            pi = star_pi + 1;
            vi = star_vi + 1;
            star = Some((star_pi, vi));
        } else {
            return false;
        }
    }

    p[pi..].iter().all(|&c| c == WILDCARD_ANY)
}

fn present(field: &Option<String>) -> Option<&str> {
    field.as_deref().filter(|s| !s.is_empty())
}

fn field_matches(criterion: Option<&str>, value: &str, partial: bool, fold_case: bool) -> bool {
    let Some(criterion) = criterion else {
        return true;
    };
    match (partial, fold_case) {
        (false, true) => criterion.to_lowercase() == value.to_lowercase(),
        (false, false) => criterion == value,
        (true, true) => like(&criterion.to_lowercase(), &value.to_lowercase()),
        (true, false) => like(criterion, value),
    }
}

// =============================================================================
// CRE FILTER
// =============================================================================

/// Criteria for CRE lookups.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreFilter {
    pub external_id: Option<String>,
    pub name: Option<String>,
    pub description: Option<String>,
    #[serde(default)]
    pub partial: bool,
}

impl CreFilter {
    /// Exact lookup by external identifier.
    #[must_use]
    pub fn by_external_id(external_id: impl Into<String>) -> Self {
        Self {
            external_id: Some(external_id.into()),
            ..Self::default()
        }
    }

    /// Exact (case-insensitive) lookup by name.
    #[must_use]
    pub fn by_name(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    /// Switch to partial matching.
    #[must_use]
    pub fn partial(mut self) -> Self {
        self.partial = true;
        self
    }

    /// True when no criterion is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        present(&self.external_id).is_none()
            && present(&self.name).is_none()
            && present(&self.description).is_none()
    }

    /// Reject filters without criteria before they reach a store.
    pub fn validate(&self) -> Result<(), CregraphError> {
        if self.is_empty() {
            return Err(CregraphError::InvalidQuery(
                "CRE lookup needs an external_id, name or description".to_string(),
            ));
        }
        Ok(())
    }

    #[must_use]
    pub fn matches(&self, cre: &CreRecord) -> bool {
        field_matches(
            present(&self.external_id),
            &cre.external_id,
            self.partial,
            false,
        ) && field_matches(present(&self.name), &cre.name, self.partial, true)
            && field_matches(
                present(&self.description),
                &cre.description,
                self.partial,
                true,
            )
    }
}

// =============================================================================
// STANDARD FILTER
// =============================================================================

/// Criteria for Standard lookups.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StandardFilter {
    pub name: Option<String>,
    pub section: Option<String>,
    pub subsection: Option<String>,
    pub link: Option<String>,
    pub version: Option<String>,
    #[serde(default)]
    pub partial: bool,
}

impl StandardFilter {
    /// Exact (case-insensitive) lookup by name.
    #[must_use]
    pub fn by_name(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn partial(mut self) -> Self {
        self.partial = true;
        self
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        present(&self.name).is_none()
            && present(&self.section).is_none()
            && present(&self.subsection).is_none()
            && present(&self.link).is_none()
            && present(&self.version).is_none()
    }

    pub fn validate(&self) -> Result<(), CregraphError> {
        if self.is_empty() {
            return Err(CregraphError::InvalidQuery(
                "tried to retrieve standard with no values".to_string(),
            ));
        }
        Ok(())
    }

    #[must_use]
    pub fn matches(&self, standard: &StandardRecord) -> bool {
        field_matches(present(&self.name), &standard.name, self.partial, true)
            && field_matches(
                present(&self.section),
                &standard.section,
                self.partial,
                true,
            )
            && field_matches(
                present(&self.subsection),
                &standard.subsection,
                self.partial,
                true,
            )
            && field_matches(present(&self.link), &standard.link, self.partial, false)
            && field_matches(
                present(&self.version),
                &standard.version,
                self.partial,
                false,
            )
    }
}

// =============================================================================
// PAGINATION
// =============================================================================

/// One page of results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// 1-based page number that was requested.
    pub page: usize,
    pub total_pages: usize,
    pub total_items: usize,
}

impl<T> Page<T> {
    /// Slice `items` into the requested page.
    ///
    /// Page numbers are 1-based (0 is read as 1). The page size defaults to
    /// `DEFAULT_ITEMS_PER_PAGE` and is capped at `MAX_ITEMS_PER_PAGE`.
    #[must_use]
    pub fn paginate(items: Vec<T>, page: usize, items_per_page: Option<usize>) -> Self {
        let per_page = items_per_page
            .unwrap_or(DEFAULT_ITEMS_PER_PAGE)
            .clamp(1, MAX_ITEMS_PER_PAGE);
        let page = page.max(1);
        let total_items = items.len();
        let total_pages = total_items.div_ceil(per_page);
        let start = (page - 1).saturating_mul(per_page);

        let items = items.into_iter().skip(start).take(per_page).collect();
        Self {
            items,
            page,
            total_pages,
            total_items,
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
