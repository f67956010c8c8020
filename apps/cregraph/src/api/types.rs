//! # API Request/Response Types
//!
//! This module defines the JSON structures for the HTTP API.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use cregraph_core::{
    CollectionStatus, CreDraft, CregraphError, Document, LinkOutcome, LinkType, Page,
    StandardDraft,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Maximum length of a name, section or other short text field.
pub const MAX_FIELD_LENGTH: usize = 512;

/// Maximum length of a CRE description.
pub const MAX_DESCRIPTION_LENGTH: usize = 16 * 1024;

fn check_length(field: &str, value: &str, max: usize) -> Result<(), CregraphError> {
    if value.len() > max {
        return Err(CregraphError::InvalidQuery(format!(
            "{field} length {} exceeds maximum {max} bytes",
            value.len()
        )));
    }
    Ok(())
}

// =============================================================================
// ERROR RESPONSE
// =============================================================================

/// Error body shared by every endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
}

/// An engine error on its way to the client.
#[derive(Debug)]
pub struct ApiError(pub CregraphError);

impl From<CregraphError> for ApiError {
    fn from(e: CregraphError) -> Self {
        Self(e)
    }
}

impl ApiError {
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            CregraphError::NotFound(_) => StatusCode::NOT_FOUND,
            CregraphError::CycleRejected { .. } | CregraphError::Conflict(_) => {
                StatusCode::CONFLICT
            }
            CregraphError::InvalidQuery(_)
            | CregraphError::InvalidLinkType(_)
            | CregraphError::DeserializationError(_) => StatusCode::BAD_REQUEST,
            CregraphError::CorruptGraph { .. }
            | CregraphError::SerializationError(_)
            | CregraphError::IoError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self.0, "request failed");
        }
        let body = ErrorResponse {
            success: false,
            error: self.0.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

// =============================================================================
// HEALTH / STATUS
// =============================================================================

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

impl Default for HealthResponse {
    fn default() -> Self {
        Self {
            status: "ok".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Collection status response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub persistent: bool,
    pub cre_count: usize,
    pub standard_count: usize,
    pub internal_link_count: usize,
    pub external_link_count: usize,
    pub node_count: usize,
    pub edge_count: usize,
    pub max_internal_connections: usize,
    pub standard_names: Vec<String>,
}

impl StatusResponse {
    pub fn new(status: CollectionStatus, standard_names: Vec<String>) -> Self {
        Self {
            persistent: status.persistent,
            cre_count: status.cres,
            standard_count: status.standards,
            internal_link_count: status.internal_links,
            external_link_count: status.external_links,
            node_count: status.mirror_nodes,
            edge_count: status.mirror_edges,
            max_internal_connections: status.max_internal_connections,
            standard_names,
        }
    }
}

// =============================================================================
// QUERIES
// =============================================================================

/// `GET /search?text=...`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchParams {
    pub text: String,
}

/// `POST /gap_analysis`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GapAnalysisRequest {
    pub standards: Vec<String>,
}

/// `POST /tags`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TagsRequest {
    pub tags: Vec<String>,
}

/// Query string of `GET /cre/{external_id}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreParams {
    /// Comma-separated standard names to keep among the links.
    #[serde(default)]
    pub include_only: Option<String>,
}

/// `GET /standard?name=...`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StandardParams {
    pub name: Option<String>,
    pub section: Option<String>,
    pub subsection: Option<String>,
    pub version: Option<String>,
    pub page: Option<usize>,
    pub items_per_page: Option<usize>,
    /// Comma-separated CRE external ids or names to keep among the links.
    pub include_only: Option<String>,
}

/// Split a comma-separated `include_only` parameter.
#[must_use]
pub fn split_include_only(raw: Option<&str>) -> Vec<String> {
    raw.map(|s| {
        s.split(',')
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
            .collect()
    })
    .unwrap_or_default()
}

/// A list of documents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentsResponse {
    pub success: bool,
    pub documents: Vec<Document>,
}

impl DocumentsResponse {
    pub fn new(documents: Vec<Document>) -> Self {
        Self {
            success: true,
            documents,
        }
    }
}

/// One page of documents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageResponse {
    pub success: bool,
    pub documents: Vec<Document>,
    pub page: usize,
    pub total_pages: usize,
    pub total_items: usize,
}

impl From<Page<Document>> for PageResponse {
    fn from(page: Page<Document>) -> Self {
        Self {
            success: true,
            documents: page.items,
            page: page.page,
            total_pages: page.total_pages,
            total_items: page.total_items,
        }
    }
}

// =============================================================================
// MUTATIONS
// =============================================================================

/// `POST /cre`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreRequest {
    pub name: String,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl CreRequest {
    /// Validate field sizes and build the upsert draft.
    pub fn to_draft(&self) -> Result<CreDraft, CregraphError> {
        if self.name.trim().is_empty() {
            return Err(CregraphError::InvalidQuery("CRE name is empty".to_string()));
        }
        check_length("name", &self.name, MAX_FIELD_LENGTH)?;
        if let Some(id) = &self.id {
            check_length("id", id, MAX_FIELD_LENGTH)?;
        }
        check_length("description", &self.description, MAX_DESCRIPTION_LENGTH)?;
        Ok(CreDraft::new(self.name.clone(), self.id.as_deref())
            .with_description(self.description.clone())
            .with_tags(self.tags.iter().cloned()))
    }
}

/// `POST /standard`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StandardRequest {
    pub name: String,
    pub section: String,
    #[serde(default)]
    pub subsection: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub hyperlink: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl StandardRequest {
    pub fn to_draft(&self) -> Result<StandardDraft, CregraphError> {
        if self.name.trim().is_empty() || self.section.trim().is_empty() {
            return Err(CregraphError::InvalidQuery(
                "Standard name and section are required".to_string(),
            ));
        }
        for (field, value) in [
            ("name", &self.name),
            ("section", &self.section),
            ("subsection", &self.subsection),
            ("version", &self.version),
            ("hyperlink", &self.hyperlink),
        ] {
            check_length(field, value, MAX_FIELD_LENGTH)?;
        }
        Ok(StandardDraft::new(self.name.clone(), self.section.clone())
            .with_subsection(self.subsection.clone())
            .with_version(self.version.clone())
            .with_hyperlink(self.hyperlink.clone())
            .with_tags(self.tags.iter().cloned()))
    }
}

/// Standard identity inside a link request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StandardKey {
    pub name: String,
    pub section: String,
    #[serde(default)]
    pub subsection: String,
    #[serde(default)]
    pub version: String,
}

/// `POST /link/internal`: CREs named by external id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InternalLinkRequest {
    pub group: String,
    pub member: String,
    pub ltype: LinkType,
}

/// `POST /link/external`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExternalLinkRequest {
    pub cre: String,
    pub standard: StandardKey,
    pub ltype: LinkType,
}

/// Result of a link upsert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkResponse {
    pub success: bool,
    #[serde(flatten)]
    pub outcome: LinkOutcome,
}

impl LinkResponse {
    pub fn new(outcome: LinkOutcome) -> Self {
        Self {
            success: true,
            outcome,
        }
    }
}

// =============================================================================
// EXPORT
// =============================================================================

/// Full document map with its BLAKE3 checksum.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportResponse {
    pub success: bool,
    pub documents: BTreeMap<String, Document>,
    pub checksum: String,
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use cregraph_core::{CreId, NodeKey};

    #[test]
    fn error_status_mapping() {
        let status = |e: CregraphError| ApiError(e).status();
        assert_eq!(status(CregraphError::NotFound("x".into())), StatusCode::NOT_FOUND);
        assert_eq!(
            status(CregraphError::CycleRejected {
                from: NodeKey::Cre(CreId(1)),
                to: NodeKey::Cre(CreId(2)),
                cycle: vec![NodeKey::Cre(CreId(1)), NodeKey::Cre(CreId(2))],
            }),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status(CregraphError::InvalidLinkType("Linked To".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status(CregraphError::CorruptGraph { cycle: Vec::new() }),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn include_only_splits_and_trims() {
        assert!(split_include_only(None).is_empty());
        assert_eq!(
            split_include_only(Some("ASVS, OWASP Top 10,,")),
            vec!["ASVS".to_string(), "OWASP Top 10".to_string()]
        );
    }

    #[test]
    fn cre_request_limits() {
        let request = CreRequest {
            name: "Session".into(),
            id: Some("123-456".into()),
            description: "x".repeat(MAX_DESCRIPTION_LENGTH + 1),
            tags: Vec::new(),
        };
        assert!(matches!(
            request.to_draft(),
            Err(CregraphError::InvalidQuery(_))
        ));
    }

    #[test]
    fn link_response_flattens_outcome() {
        let response = LinkResponse::new(LinkOutcome::Retyped {
            previous: LinkType::Related,
        });
        let value = serde_json::to_value(&response).expect("serialize");
        assert_eq!(value["success"], true);
        assert_eq!(value["outcome"], "retyped");
        assert_eq!(value["previous"], "Related");
    }
}
