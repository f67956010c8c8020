//! # Engine Primitives
//!
//! Hardcoded limits and constants for the CRE graph engine.
//! These are compiled into the binary and are immutable at runtime.

/// Maximum length of a free-text search query.
///
/// Longer inputs are rejected with `InvalidQuery` before any store access.
pub const MAX_SEARCH_TEXT_LENGTH: usize = 1024;

/// Maximum number of standard names in one gap analysis request.
///
/// Gap analysis is quadratic in the number of matching standards.
pub const MAX_GAP_ANALYSIS_STANDARDS: usize = 64;

/// Default page size for paginated standard lookups.
pub const DEFAULT_ITEMS_PER_PAGE: usize = 20;

/// Upper bound for a caller-supplied page size.
pub const MAX_ITEMS_PER_PAGE: usize = 500;

/// Separator of the legacy comma-joined tag format.
pub const TAG_SEPARATOR: char = ',';

/// Wildcard for partial (LIKE) matching: any run of characters.
pub const WILDCARD_ANY: char = '%';

/// Wildcard for partial (LIKE) matching: exactly one character.
pub const WILDCARD_ONE: char = '_';

/// Split a legacy comma-joined tag string into a tag set.
pub fn split_tags(raw: &str) -> std::collections::BTreeSet<String> {
    raw.split(TAG_SEPARATOR)
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_limits_are_consistent() {
        assert!(DEFAULT_ITEMS_PER_PAGE <= MAX_ITEMS_PER_PAGE);
    }

    #[test]
    fn split_tags_ignores_blanks() {
        let tags = split_tags("crypto, ,session,,crypto");
        assert_eq!(tags.len(), 2);
        assert!(tags.contains("crypto"));
        assert!(tags.contains("session"));
    }
}
