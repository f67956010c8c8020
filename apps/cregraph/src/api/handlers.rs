//! # API Endpoint Handlers
//!
//! Queries take the read lock, mutations and reload the write lock.

use super::{
    AppState,
    types::{
        ApiError, CreParams, CreRequest, DocumentsResponse, ExportResponse, ExternalLinkRequest,
        GapAnalysisRequest, HealthResponse, InternalLinkRequest, LinkResponse, PageResponse,
        SearchParams, StandardParams, StandardRequest, StatusResponse, TagsRequest,
        split_include_only,
    },
};
use axum::{
    Json,
    extract::{Path, Query, State},
    response::IntoResponse,
};
use cregraph_core::{
    Collection, CreFilter, CreRecord, CreRef, CregraphError, StandardFilter, StandardRecord,
    StandardRef,
};

/// The single CRE with `external_id`.
fn cre_by_external_id(collection: &Collection, external_id: &str) -> Result<CreRecord, ApiError> {
    collection
        .store()
        .find_cres(&CreFilter::by_external_id(external_id))?
        .into_iter()
        .next()
        .ok_or_else(|| ApiError(CregraphError::NotFound(format!("CRE {external_id}"))))
}

fn status_response(collection: &Collection) -> Result<StatusResponse, ApiError> {
    Ok(StatusResponse::new(
        collection.status()?,
        collection.standard_names()?,
    ))
}

// =============================================================================
// HEALTH / STATUS
// =============================================================================

/// Health check endpoint.
pub async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse::default())
}

/// Row counts, mirror size and the known standard names.
pub async fn status_handler(
    State(state): State<AppState>,
) -> Result<Json<StatusResponse>, ApiError> {
    let collection = state.collection.read().await;
    Ok(Json(status_response(&collection)?))
}

/// Rebuild the mirror from the store.
pub async fn reload_handler(
    State(state): State<AppState>,
) -> Result<Json<StatusResponse>, ApiError> {
    let mut collection = state.collection.write().await;
    collection.reload()?;
    Ok(Json(status_response(&collection)?))
}

// =============================================================================
// QUERIES
// =============================================================================

pub async fn search_handler(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<DocumentsResponse>, ApiError> {
    let collection = state.collection.read().await;
    let documents = collection.search(&params.text)?;
    Ok(Json(DocumentsResponse::new(documents)))
}

pub async fn gap_analysis_handler(
    State(state): State<AppState>,
    Json(request): Json<GapAnalysisRequest>,
) -> Result<Json<DocumentsResponse>, ApiError> {
    let collection = state.collection.read().await;
    let documents = collection.gap_analysis(&request.standards)?;
    Ok(Json(DocumentsResponse::new(documents)))
}

/// CRE by external id, with links. 404 when no CRE has the id.
pub async fn cre_handler(
    State(state): State<AppState>,
    Path(external_id): Path<String>,
    Query(params): Query<CreParams>,
) -> Result<Json<DocumentsResponse>, ApiError> {
    let collection = state.collection.read().await;
    let include_only = split_include_only(params.include_only.as_deref());
    let documents =
        collection.get_cres(&CreFilter::by_external_id(external_id.clone()), &include_only)?;
    if documents.is_empty() {
        return Err(ApiError(CregraphError::NotFound(format!("CRE {external_id}"))));
    }
    Ok(Json(DocumentsResponse::new(documents)))
}

pub async fn standard_handler(
    State(state): State<AppState>,
    Query(params): Query<StandardParams>,
) -> Result<Json<PageResponse>, ApiError> {
    let collection = state.collection.read().await;
    let filter = StandardFilter {
        name: params.name,
        section: params.section,
        subsection: params.subsection,
        version: params.version,
        ..StandardFilter::default()
    };
    let include_only = split_include_only(params.include_only.as_deref());
    let page = collection.get_standards_page(
        &filter,
        params.page.unwrap_or(1),
        params.items_per_page,
        &include_only,
    )?;
    Ok(Json(PageResponse::from(page)))
}

pub async fn tags_handler(
    State(state): State<AppState>,
    Json(request): Json<TagsRequest>,
) -> Result<Json<DocumentsResponse>, ApiError> {
    let collection = state.collection.read().await;
    let documents = collection.get_by_tags(&request.tags)?;
    Ok(Json(DocumentsResponse::new(documents)))
}

// =============================================================================
// MUTATIONS
// =============================================================================

pub async fn add_cre_handler(
    State(state): State<AppState>,
    Json(request): Json<CreRequest>,
) -> Result<Json<CreRecord>, ApiError> {
    let draft = request.to_draft()?;
    let mut collection = state.collection.write().await;
    Ok(Json(collection.add_cre(&draft)?))
}

pub async fn add_standard_handler(
    State(state): State<AppState>,
    Json(request): Json<StandardRequest>,
) -> Result<Json<StandardRecord>, ApiError> {
    let draft = request.to_draft()?;
    let mut collection = state.collection.write().await;
    Ok(Json(collection.add_standard(&draft)?))
}

pub async fn internal_link_handler(
    State(state): State<AppState>,
    Json(request): Json<InternalLinkRequest>,
) -> Result<Json<LinkResponse>, ApiError> {
    let mut collection = state.collection.write().await;
    let group = cre_by_external_id(&collection, &request.group)?;
    let member = cre_by_external_id(&collection, &request.member)?;
    let outcome =
        collection.link_cres(&CreRef::from(&group), &CreRef::from(&member), request.ltype)?;
    Ok(Json(LinkResponse::new(outcome)))
}

pub async fn external_link_handler(
    State(state): State<AppState>,
    Json(request): Json<ExternalLinkRequest>,
) -> Result<Json<LinkResponse>, ApiError> {
    let mut collection = state.collection.write().await;
    let cre = cre_by_external_id(&collection, &request.cre)?;
    let standard = StandardRef::Key {
        name: request.standard.name,
        section: request.standard.section,
        subsection: request.standard.subsection,
        version: request.standard.version,
    };
    let outcome = collection.link_standard(&CreRef::from(&cre), &standard, request.ltype)?;
    Ok(Json(LinkResponse::new(outcome)))
}

// =============================================================================
// EXPORT
// =============================================================================

pub async fn export_handler(
    State(state): State<AppState>,
) -> Result<Json<ExportResponse>, ApiError> {
    let collection = state.collection.read().await;
    let documents = collection.export()?;
    let checksum = cregraph_core::export_checksum(&documents)?;
    Ok(Json(ExportResponse {
        success: true,
        documents,
        checksum,
    }))
}
