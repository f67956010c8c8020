//! Integration tests for the cregraph HTTP API.
//!
//! Uses axum-test to drive the router without binding a socket.

// Routers read CREGRAPH_API_KEY at construction and per request, so every
// test holds ENV_MUTEX while it runs.
#![allow(clippy::unwrap_used, clippy::panic, clippy::await_holding_lock)]

use axum::http::{HeaderValue, StatusCode, header::AUTHORIZATION};
use axum_test::TestServer;
use cregraph::api::{
    API_KEY_ENV, AppState, DocumentsResponse, ErrorResponse, ExportResponse, HealthResponse,
    PageResponse, StatusResponse, create_router,
};
use cregraph_core::{Collection, CreDraft, CreRef, LinkType, StandardDraft, StandardRef};
use serde_json::{Value, json};
use std::sync::Mutex;

static ENV_MUTEX: Mutex<()> = Mutex::new(());

// =============================================================================
// HELPER FUNCTIONS
// =============================================================================

/// Holds the env mutex and clears the API key on drop.
struct TestGuard {
    _guard: std::sync::MutexGuard<'static, ()>,
}

impl Drop for TestGuard {
    fn drop(&mut self) {
        // SAFETY: every test touching the environment holds ENV_MUTEX.
        unsafe { std::env::remove_var(API_KEY_ENV) };
    }
}

fn lock_env() -> TestGuard {
    let guard = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    // SAFETY: every test touching the environment holds ENV_MUTEX.
    unsafe { std::env::remove_var(API_KEY_ENV) };
    TestGuard { _guard: guard }
}

fn server_for(collection: Collection) -> TestServer {
    TestServer::new(create_router(AppState::new(collection))).unwrap()
}

fn create_test_server() -> (TestServer, TestGuard) {
    let guard = lock_env();
    (server_for(Collection::in_memory().unwrap()), guard)
}

/// Three CREs (Authentication contains Password and Session) and two
/// standards, each linked to one CRE.
fn populated_collection() -> Collection {
    let mut c = Collection::in_memory().unwrap();
    let auth = c
        .add_cre(&CreDraft::new("Authentication", Some("111-111")).with_tags(["identity"]))
        .unwrap();
    let password = c
        .add_cre(&CreDraft::new("Password", Some("222-222")).with_description("Password storage"))
        .unwrap();
    let session = c.add_cre(&CreDraft::new("Session", Some("333-333"))).unwrap();

    c.link_cres(&CreRef::from(&auth), &CreRef::from(&password), LinkType::Contains)
        .unwrap();
    c.link_cres(&CreRef::from(&auth), &CreRef::from(&session), LinkType::Contains)
        .unwrap();

    let asvs = c
        .add_standard(
            &StandardDraft::new("ASVS", "V2")
                .with_subsection("2.1")
                .with_hyperlink("https://example.org/asvs#v2.1"),
        )
        .unwrap();
    let top10 = c
        .add_standard(&StandardDraft::new("OWASP Top 10", "A07"))
        .unwrap();
    c.link_standard(&CreRef::from(&password), &StandardRef::from(&asvs), LinkType::Same)
        .unwrap();
    c.link_standard(&CreRef::from(&session), &StandardRef::from(&top10), LinkType::Same)
        .unwrap();
    c
}

fn create_populated_test_server() -> (TestServer, TestGuard) {
    let guard = lock_env();
    (server_for(populated_collection()), guard)
}

// =============================================================================
// HEALTH / STATUS
// =============================================================================

#[tokio::test]
async fn test_health() {
    let (server, _guard) = create_test_server();
    let response = server.get("/health").await;

    response.assert_status_ok();
    let health: HealthResponse = response.json();
    assert_eq!(health.status, "ok");
}

#[tokio::test]
async fn test_status_counts() {
    let (server, _guard) = create_populated_test_server();
    let response = server.get("/status").await;

    response.assert_status_ok();
    let status: StatusResponse = response.json();
    assert!(!status.persistent);
    assert_eq!(status.cre_count, 3);
    assert_eq!(status.standard_count, 2);
    assert_eq!(status.internal_link_count, 2);
    assert_eq!(status.external_link_count, 2);
    assert_eq!(status.node_count, 5);
    assert_eq!(status.edge_count, 4);
    assert_eq!(status.standard_names, vec!["ASVS", "OWASP Top 10"]);
}

#[tokio::test]
async fn test_reload_keeps_counts() {
    let (server, _guard) = create_populated_test_server();
    let response = server.post("/reload").await;

    response.assert_status_ok();
    let status: StatusResponse = response.json();
    assert_eq!(status.node_count, 5);
    assert_eq!(status.edge_count, 4);
}

// =============================================================================
// QUERIES
// =============================================================================

#[tokio::test]
async fn test_search_by_cre_id() {
    let (server, _guard) = create_populated_test_server();
    let response = server
        .get("/search")
        .add_query_param("text", "CRE:111-111")
        .await;

    response.assert_status_ok();
    let result: DocumentsResponse = response.json();
    assert_eq!(result.documents.len(), 1);
    assert_eq!(result.documents[0].name(), "Authentication");
    assert_eq!(result.documents[0].links().len(), 2);
}

#[tokio::test]
async fn test_search_empty_text_is_bad_request() {
    let (server, _guard) = create_populated_test_server();
    let response = server.get("/search").add_query_param("text", "").await;

    response.assert_status_bad_request();
    let error: ErrorResponse = response.json();
    assert!(!error.success);
}

#[tokio::test]
async fn test_gap_analysis_links_connected_standards() {
    let (server, _guard) = create_populated_test_server();
    let response = server
        .post("/gap_analysis")
        .json(&json!({ "standards": ["ASVS", "OWASP Top 10"] }))
        .await;

    response.assert_status_ok();
    let result: DocumentsResponse = response.json();
    assert_eq!(result.documents.len(), 2);
    for doc in &result.documents {
        assert_eq!(doc.links().len(), 1);
        assert_eq!(doc.links()[0].ltype, LinkType::LinkedTo);
    }
}

#[tokio::test]
async fn test_gap_analysis_without_names_is_bad_request() {
    let (server, _guard) = create_populated_test_server();
    let response = server
        .post("/gap_analysis")
        .json(&json!({ "standards": [] }))
        .await;

    response.assert_status_bad_request();
}

#[tokio::test]
async fn test_cre_by_external_id() {
    let (server, _guard) = create_populated_test_server();
    let response = server.get("/cre/222-222").await;

    response.assert_status_ok();
    let result: DocumentsResponse = response.json();
    assert_eq!(result.documents.len(), 1);
    let types: Vec<LinkType> = result.documents[0].links().iter().map(|l| l.ltype).collect();
    assert_eq!(types, vec![LinkType::Same, LinkType::PartOf]);
}

#[tokio::test]
async fn test_cre_include_only_filters_standards() {
    let (server, _guard) = create_populated_test_server();
    let response = server
        .get("/cre/222-222")
        .add_query_param("include_only", "OWASP Top 10")
        .await;

    response.assert_status_ok();
    let result: DocumentsResponse = response.json();
    assert!(
        result.documents[0]
            .links()
            .iter()
            .all(|l| l.ltype != LinkType::Same)
    );
}

#[tokio::test]
async fn test_unknown_cre_is_not_found() {
    let (server, _guard) = create_populated_test_server();
    let response = server.get("/cre/999-999").await;

    response.assert_status_not_found();
}

#[tokio::test]
async fn test_standard_page() {
    let (server, _guard) = create_populated_test_server();
    let response = server
        .get("/standard")
        .add_query_param("name", "ASVS")
        .await;

    response.assert_status_ok();
    let page: PageResponse = response.json();
    assert_eq!(page.page, 1);
    assert_eq!(page.total_items, 1);
    assert_eq!(page.documents[0].links().len(), 1);
}

#[tokio::test]
async fn test_tags() {
    let (server, _guard) = create_populated_test_server();
    let response = server
        .post("/tags")
        .json(&json!({ "tags": ["identity"] }))
        .await;

    response.assert_status_ok();
    let result: DocumentsResponse = response.json();
    assert_eq!(result.documents.len(), 1);
    assert_eq!(result.documents[0].name(), "Authentication");
}

// =============================================================================
// MUTATIONS
// =============================================================================

#[tokio::test]
async fn test_create_and_link_cres() {
    let (server, _guard) = create_test_server();

    server
        .post("/cre")
        .json(&json!({ "name": "Group", "id": "100-100" }))
        .await
        .assert_status_ok();
    server
        .post("/cre")
        .json(&json!({ "name": "Member", "id": "200-200" }))
        .await
        .assert_status_ok();

    let link = json!({ "group": "100-100", "member": "200-200", "ltype": "Contains" });
    let response = server.post("/link/internal").json(&link).await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["outcome"], "created");

    let again = server.post("/link/internal").json(&link).await;
    again.assert_status_ok();
    let body: Value = again.json();
    assert_eq!(body["outcome"], "unchanged");

    let retype = json!({ "group": "100-100", "member": "200-200", "ltype": "Related" });
    let body: Value = server.post("/link/internal").json(&retype).await.json();
    assert_eq!(body["outcome"], "retyped");
    assert_eq!(body["previous"], "Contains");
}

#[tokio::test]
async fn test_cycle_is_conflict() {
    let (server, _guard) = create_populated_test_server();
    server
        .post("/link/internal")
        .json(&json!({ "group": "222-222", "member": "333-333", "ltype": "Contains" }))
        .await
        .assert_status_ok();

    let response = server
        .post("/link/internal")
        .json(&json!({ "group": "333-333", "member": "111-111", "ltype": "Contains" }))
        .await;

    response.assert_status(StatusCode::CONFLICT);
    let status: StatusResponse = server.get("/status").await.json();
    assert_eq!(status.internal_link_count, 3);
}

#[tokio::test]
async fn test_linked_to_is_bad_request() {
    let (server, _guard) = create_populated_test_server();
    let response = server
        .post("/link/internal")
        .json(&json!({ "group": "111-111", "member": "222-222", "ltype": "Linked To" }))
        .await;

    response.assert_status_bad_request();
}

#[tokio::test]
async fn test_link_unknown_cre_is_not_found() {
    let (server, _guard) = create_populated_test_server();
    let response = server
        .post("/link/internal")
        .json(&json!({ "group": "111-111", "member": "999-999", "ltype": "Contains" }))
        .await;

    response.assert_status_not_found();
}

#[tokio::test]
async fn test_external_link_to_new_standard() {
    let (server, _guard) = create_populated_test_server();
    let link = json!({
        "cre": "111-111",
        "standard": { "name": "NIST 800-63", "section": "5.1.1" },
        "ltype": "SAME"
    });

    server
        .post("/link/external")
        .json(&link)
        .await
        .assert_status_not_found();

    server
        .post("/standard")
        .json(&json!({ "name": "NIST 800-63", "section": "5.1.1" }))
        .await
        .assert_status_ok();
    let response = server.post("/link/external").json(&link).await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["outcome"], "created");
    let status: StatusResponse = server.get("/status").await.json();
    assert_eq!(status.standard_count, 3);
    assert_eq!(status.external_link_count, 3);
}

#[tokio::test]
async fn test_create_cre_requires_name() {
    let (server, _guard) = create_test_server();
    let response = server.post("/cre").json(&json!({ "name": "  " })).await;

    response.assert_status_bad_request();
}

#[tokio::test]
async fn test_create_standard() {
    let (server, _guard) = create_test_server();
    let response = server
        .post("/standard")
        .json(&json!({ "name": "ASVS", "section": "V3", "tags": ["session"] }))
        .await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["name"], "ASVS");
    assert_eq!(body["section"], "V3");
}

#[tokio::test]
async fn test_invalid_json_is_client_error() {
    let (server, _guard) = create_test_server();
    let response = server
        .post("/cre")
        .content_type("application/json")
        .bytes("{not json".into())
        .await;

    assert!(response.status_code().is_client_error());
}

// =============================================================================
// EXPORT
// =============================================================================

#[tokio::test]
async fn test_export_has_checksum() {
    let (server, _guard) = create_populated_test_server();
    let response = server.get("/export").await;

    response.assert_status_ok();
    let export: ExportResponse = response.json();
    assert_eq!(export.checksum.len(), 64);
    assert_eq!(export.documents.len(), 3);

    let again: ExportResponse = server.get("/export").await.json();
    assert_eq!(export.checksum, again.checksum);
}

// =============================================================================
// AUTHENTICATION MIDDLEWARE TESTS
// =============================================================================

/// Must be called while holding ENV_MUTEX.
fn create_auth_test_server(api_key: &str) -> TestServer {
    // SAFETY: every test touching the environment holds ENV_MUTEX.
    unsafe { std::env::set_var(API_KEY_ENV, api_key) };
    server_for(Collection::in_memory().unwrap())
}

#[tokio::test]
async fn test_auth_valid_bearer_token() {
    let _guard = lock_env();
    let api_key = "test-secret-key-12345";
    let server = create_auth_test_server(api_key);

    let response = server
        .get("/status")
        .add_header(
            AUTHORIZATION,
            format!("Bearer {api_key}").parse::<HeaderValue>().unwrap(),
        )
        .await;

    response.assert_status_ok();
}

#[tokio::test]
async fn test_auth_valid_raw_token() {
    let _guard = lock_env();
    let api_key = "test-raw-key-67890";
    let server = create_auth_test_server(api_key);

    let response = server
        .get("/status")
        .add_header(AUTHORIZATION, api_key.parse::<HeaderValue>().unwrap())
        .await;

    response.assert_status_ok();
}

#[tokio::test]
async fn test_auth_rejects_wrong_or_missing_key() {
    let _guard = lock_env();
    let server = create_auth_test_server("correct-key");

    server
        .get("/status")
        .add_header(
            AUTHORIZATION,
            "Bearer wrong-key".parse::<HeaderValue>().unwrap(),
        )
        .await
        .assert_status_unauthorized();
    server.get("/status").await.assert_status_unauthorized();
    server
        .get("/status")
        .add_header(AUTHORIZATION, "Bearer ".parse::<HeaderValue>().unwrap())
        .await
        .assert_status_unauthorized();
}

#[tokio::test]
async fn test_auth_health_is_exempt() {
    let _guard = lock_env();
    let server = create_auth_test_server("correct-key");

    server.get("/health").await.assert_status_ok();
}
