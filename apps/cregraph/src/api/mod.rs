//! # HTTP API
//!
//! ## Endpoints
//!
//! - `GET /health` - Health check
//! - `GET /status` - Row counts and mirror size
//! - `GET /search?text=...` - Free-text search
//! - `POST /gap_analysis` - Cross-standard gap analysis
//! - `GET /cre/{external_id}` - One CRE with its links
//! - `GET /standard?name=...` - Paginated standard lookup
//! - `POST /tags` - Documents carrying every tag
//! - `POST /cre`, `POST /standard` - Upserts
//! - `POST /link/internal`, `POST /link/external` - Link upserts
//! - `POST /reload` - Rebuild the mirror from storage
//! - `GET /export` - Full document map with checksum
//!
//! ## Security Configuration (Environment Variables)
//!
//! - `CREGRAPH_CORS_ORIGINS`: Comma-separated list of allowed origins, or "*" for all (default: localhost only)
//! - `CREGRAPH_RATE_LIMIT`: Requests per second (default: 100, 0 to disable)
//! - `CREGRAPH_API_KEY`: If set, requires Bearer token authentication

mod auth;
mod handlers;
mod middleware;
mod types;

pub use auth::{API_KEY_ENV, get_api_key_from_env};
pub use middleware::{RATE_LIMIT_ENV, create_rate_limiter, get_rate_limit_from_env};
pub use types::{
    CreRequest, DocumentsResponse, ErrorResponse, ExportResponse, ExternalLinkRequest,
    GapAnalysisRequest, HealthResponse, InternalLinkRequest, LinkResponse, PageResponse,
    StandardKey, StandardRequest, StatusResponse, TagsRequest,
};

use axum::{
    Router,
    http::{HeaderValue, Method, header},
    middleware as axum_middleware,
    routing::{get, post},
};
use cregraph_core::{Collection, CregraphError};
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Environment variable holding the allowed CORS origins.
pub const CORS_ORIGINS_ENV: &str = "CREGRAPH_CORS_ORIGINS";

/// Maximum request body size (2 MB).
const MAX_BODY_SIZE: usize = 2 * 1024 * 1024;

// =============================================================================
// SERVER STATE
// =============================================================================

/// Shared server state.
#[derive(Clone)]
pub struct AppState {
    pub collection: Arc<RwLock<Collection>>,
}

impl AppState {
    #[must_use]
    pub fn new(collection: Collection) -> Self {
        Self {
            collection: Arc::new(RwLock::new(collection)),
        }
    }
}

// =============================================================================
// CORS CONFIGURATION
// =============================================================================

/// Build the CORS layer from `CREGRAPH_CORS_ORIGINS`.
///
/// `*` allows every origin, a comma-separated list allows those origins, and
/// an unset or fully invalid value falls back to localhost.
fn build_cors_layer() -> CorsLayer {
    match std::env::var(CORS_ORIGINS_ENV).ok().as_deref() {
        Some("*") => {
            tracing::warn!("CORS: Allowing ALL origins ({CORS_ORIGINS_ENV}=*)");
            CorsLayer::permissive()
        }
        Some(origins) => {
            let allowed: Vec<HeaderValue> = origins
                .split(',')
                .filter_map(|s| {
                    let trimmed = s.trim();
                    match trimmed.parse::<HeaderValue>() {
                        Ok(hv) => {
                            tracing::info!("CORS: Allowing origin: {}", trimmed);
                            Some(hv)
                        }
                        Err(e) => {
                            tracing::warn!("CORS: Invalid origin '{}': {}", trimmed, e);
                            None
                        }
                    }
                })
                .collect();

            if allowed.is_empty() {
                tracing::warn!("CORS: No valid origins in {CORS_ORIGINS_ENV}, using localhost");
                build_localhost_cors()
            } else {
                restricted_cors(allowed)
            }
        }
        None => build_localhost_cors(),
    }
}

fn build_localhost_cors() -> CorsLayer {
    let origins: Vec<HeaderValue> = [
        "http://localhost:3000",
        "http://localhost:8080",
        "http://127.0.0.1:3000",
        "http://127.0.0.1:8080",
    ]
    .into_iter()
    .filter_map(|o| o.parse::<HeaderValue>().ok())
    .collect();
    restricted_cors(origins)
}

fn restricted_cors(origins: Vec<HeaderValue>) -> CorsLayer {
    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
}

// =============================================================================
// ROUTER CREATION
// =============================================================================

/// Create the router with all endpoints and middleware.
///
/// Middleware stack (outer to inner): tracing, CORS, body limit, rate
/// limiting (if enabled), authentication (if configured).
pub fn create_router(state: AppState) -> Router {
    let cors = build_cors_layer();

    let rate_limit = get_rate_limit_from_env();
    let rate_limiter = if rate_limit > 0 {
        tracing::info!("Rate limiting enabled: {} requests/second", rate_limit);
        Some(create_rate_limiter(rate_limit))
    } else {
        tracing::info!("Rate limiting disabled");
        None
    };

    let has_auth = get_api_key_from_env().is_some();
    if has_auth {
        tracing::info!("API key authentication enabled");
    } else {
        tracing::warn!(
            "API key authentication DISABLED. Set {API_KEY_ENV} to require a Bearer token."
        );
    }

    let mut router = Router::new()
        .route("/health", get(handlers::health_handler))
        .route("/status", get(handlers::status_handler))
        .route("/search", get(handlers::search_handler))
        .route("/gap_analysis", post(handlers::gap_analysis_handler))
        .route("/cre", post(handlers::add_cre_handler))
        .route("/cre/{external_id}", get(handlers::cre_handler))
        .route(
            "/standard",
            get(handlers::standard_handler).post(handlers::add_standard_handler),
        )
        .route("/tags", post(handlers::tags_handler))
        .route("/link/internal", post(handlers::internal_link_handler))
        .route("/link/external", post(handlers::external_link_handler))
        .route("/reload", post(handlers::reload_handler))
        .route("/export", get(handlers::export_handler));

    if has_auth {
        router = router.layer(axum_middleware::from_fn(auth::api_key_auth_middleware));
    }

    if let Some(limiter) = rate_limiter {
        router = router.layer(axum_middleware::from_fn_with_state(
            limiter,
            middleware::rate_limit_middleware,
        ));
    }

    router
        .layer(axum::extract::DefaultBodyLimit::max(MAX_BODY_SIZE))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// =============================================================================
// SERVER STARTUP
// =============================================================================

/// Serve `collection` on `addr` until the process stops.
pub async fn run_server(addr: &str, collection: Collection) -> Result<(), CregraphError> {
    let router = create_router(AppState::new(collection));

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| CregraphError::IoError(format!("Bind failed: {e}")))?;

    tracing::info!("cregraph HTTP server listening on {}", addr);

    axum::serve(listener, router)
        .await
        .map_err(|e| CregraphError::IoError(format!("Server error: {e}")))
}
