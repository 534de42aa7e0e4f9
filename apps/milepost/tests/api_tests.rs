//! Integration tests for the Milepost HTTP API.
//!
//! Uses axum-test to test the API handlers without starting a real server.

// Allow unwrap and panic in tests - these are standard for test code
// Allow holding MutexGuard across await in auth tests - tests are serialized
// intentionally to avoid env var conflicts
#![allow(clippy::unwrap_used, clippy::panic, clippy::await_holding_lock)]

use axum::http::{HeaderName, HeaderValue};
use axum_test::{TestRequest, TestServer};
use milepost::api::{
    AppState, DefinitionsResponse, ErrorResponse, HealthResponse, create_router,
};
use milepost_core::{MemoryStore, ProgressionService, Snapshot, StorageBackend};
use serde_json::json;
use std::sync::Mutex;

/// Mutex to serialize tests since auth tests modify env vars.
static AUTH_TEST_MUTEX: Mutex<()> = Mutex::new(());

// =============================================================================
// HELPER FUNCTIONS
// =============================================================================

/// Guard wrapper that holds the mutex and ensures cleanup on drop.
struct TestGuard {
    _guard: std::sync::MutexGuard<'static, ()>,
}

impl Drop for TestGuard {
    fn drop(&mut self) {
        // SAFETY: Tests run sequentially under AUTH_TEST_MUTEX, so no concurrent env access.
        unsafe { std::env::remove_var("MILEPOST_API_KEY") };
    }
}

/// Create a test server with a fresh in-memory service.
/// Returns a guard that must be kept alive during the test.
fn create_test_server() -> (TestServer, TestGuard) {
    let guard = AUTH_TEST_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    // SAFETY: Tests run sequentially under AUTH_TEST_MUTEX, so no concurrent env access.
    unsafe { std::env::remove_var("MILEPOST_API_KEY") };
    let service = ProgressionService::open(StorageBackend::InMemory(MemoryStore::new()))
        .expect("memory backend opens");
    let state = AppState::new(service);
    let router = create_router(state);
    (
        TestServer::new(router).unwrap(),
        TestGuard { _guard: guard },
    )
}

fn header(name: &'static str, value: &str) -> (HeaderName, HeaderValue) {
    (
        HeaderName::from_static(name),
        value.parse::<HeaderValue>().unwrap(),
    )
}

/// Attach admin identity headers.
fn as_admin(request: TestRequest) -> TestRequest {
    let (id_name, id_value) = header("x-actor-id", "u1");
    let (name_name, name_value) = header("x-actor-name", "Priya");
    let (role_name, role_value) = header("x-actor-role", "admin");
    request
        .add_header(id_name, id_value)
        .add_header(name_name, name_value)
        .add_header(role_name, role_value)
}

/// Attach member identity headers with the given permission list.
fn as_member(request: TestRequest, permissions: &str) -> TestRequest {
    let (id_name, id_value) = header("x-actor-id", "u2");
    let (role_name, role_value) = header("x-actor-role", "member");
    let (perm_name, perm_value) = header("x-actor-permissions", permissions);
    request
        .add_header(id_name, id_value)
        .add_header(role_name, role_value)
        .add_header(perm_name, perm_value)
}

/// Create a project record as admin, asserting 201.
async fn create_project(server: &TestServer, project: &str) -> Snapshot {
    let response = as_admin(server.post(&format!("/progression/{project}"))).await;
    response.assert_status(axum::http::StatusCode::CREATED);
    response.json()
}

// =============================================================================
// HEALTH ENDPOINT TESTS
// =============================================================================

#[tokio::test]
async fn health_endpoint_reports_ok_and_version() {
    let (server, _guard) = create_test_server();

    let response = server.get("/health").await;

    response.assert_status_ok();
    let health: HealthResponse = response.json();
    assert_eq!(health.status, "ok");
    assert_eq!(health.version, env!("CARGO_PKG_VERSION"));
}

// =============================================================================
// DEFINITIONS ENDPOINT TESTS
// =============================================================================

#[tokio::test]
async fn definitions_endpoint_returns_default_pipeline() {
    let (server, _guard) = create_test_server();

    let response = server.get("/progression/definitions").await;

    response.assert_status_ok();
    let definitions: DefinitionsResponse = response.json();
    assert_eq!(definitions.version, 1);
    assert_eq!(definitions.stages.len(), 5);
    assert_eq!(definitions.stages[0].id.as_str(), "pre_sales");
}

// =============================================================================
// IDENTITY TESTS
// =============================================================================

#[tokio::test]
async fn mutation_without_identity_headers_is_unauthorized() {
    let (server, _guard) = create_test_server();

    let response = server.post("/progression/villa-101").await;
    response.assert_status_unauthorized();

    let response = server
        .post("/progression/villa-101/complete")
        .json(&json!({ "sub_stage_id": "site_visit" }))
        .await;
    response.assert_status_unauthorized();
    let error: ErrorResponse = response.json();
    assert_eq!(error.error, "unauthorized");
}

#[tokio::test]
async fn unknown_role_is_unauthorized() {
    let (server, _guard) = create_test_server();

    let (id_name, id_value) = header("x-actor-id", "u3");
    let (role_name, role_value) = header("x-actor-role", "superuser");
    let response = server
        .post("/progression/villa-101")
        .add_header(id_name, id_value)
        .add_header(role_name, role_value)
        .await;
    response.assert_status_unauthorized();
}

// =============================================================================
// PROJECT LIFECYCLE TESTS
// =============================================================================

#[tokio::test]
async fn create_then_fetch_snapshot() {
    let (server, _guard) = create_test_server();

    let created = create_project(&server, "villa-101").await;
    assert_eq!(created.view.revision, 0);
    assert_eq!(created.view.current_group.as_str(), "pre_sales");
    assert_eq!(created.activity.len(), 1);

    let response = server.get("/progression/villa-101").await;
    response.assert_status_ok();
    let snapshot: Snapshot = response.json();
    assert_eq!(snapshot.project.as_str(), "villa-101");
    assert!(!snapshot.view.archived);
}

#[tokio::test]
async fn duplicate_create_is_conflict() {
    let (server, _guard) = create_test_server();
    create_project(&server, "villa-101").await;

    let response = as_admin(server.post("/progression/villa-101")).await;
    response.assert_status(axum::http::StatusCode::CONFLICT);
    let error: ErrorResponse = response.json();
    assert_eq!(error.error, "conflict");
}

#[tokio::test]
async fn unknown_project_is_not_found() {
    let (server, _guard) = create_test_server();

    let response = server.get("/progression/ghost").await;
    response.assert_status_not_found();
    let error: ErrorResponse = response.json();
    assert_eq!(error.error, "not_found");
}

// =============================================================================
// COMPLETION TESTS
// =============================================================================

#[tokio::test]
async fn completing_in_order_succeeds_and_skipping_conflicts() {
    let (server, _guard) = create_test_server();
    create_project(&server, "villa-101").await;

    // Skipping ahead fails.
    let response = as_admin(server.post("/progression/villa-101/complete"))
        .json(&json!({ "sub_stage_id": "requirement_brief" }))
        .await;
    response.assert_status(axum::http::StatusCode::CONFLICT);
    let error: ErrorResponse = response.json();
    assert_eq!(error.error, "out_of_sequence");

    // The first sub-stage succeeds.
    let response = as_admin(server.post("/progression/villa-101/complete"))
        .json(&json!({ "sub_stage_id": "site_visit" }))
        .await;
    response.assert_status_ok();
    let snapshot: Snapshot = response.json();
    assert_eq!(snapshot.view.revision, 1);
    assert_eq!(snapshot.view.groups[0].progress.completed, 1);
}

#[tokio::test]
async fn malformed_json_body_is_rejected() {
    let (server, _guard) = create_test_server();
    create_project(&server, "villa-101").await;

    let response = as_admin(server.post("/progression/villa-101/complete"))
        .content_type("application/json")
        .bytes(bytes::Bytes::from("not valid json"))
        .await;
    response.assert_status(axum::http::StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unknown_sub_stage_is_not_found() {
    let (server, _guard) = create_test_server();
    create_project(&server, "villa-101").await;

    let response = as_admin(server.post("/progression/villa-101/complete"))
        .json(&json!({ "sub_stage_id": "no_such_step" }))
        .await;
    response.assert_status_not_found();
}

// =============================================================================
// PERMISSION TESTS
// =============================================================================

#[tokio::test]
async fn member_needs_group_scoped_permission() {
    let (server, _guard) = create_test_server();
    create_project(&server, "villa-101").await;

    // No grant for pre_sales: forbidden.
    let response = as_member(
        server.post("/progression/villa-101/complete"),
        "milestones.update.design",
    )
    .json(&json!({ "sub_stage_id": "site_visit" }))
    .await;
    response.assert_status_forbidden();
    let error: ErrorResponse = response.json();
    assert_eq!(error.error, "forbidden");

    // With the right grant the same call succeeds.
    let response = as_member(
        server.post("/progression/villa-101/complete"),
        "milestones.update.design,milestones.update.pre_sales",
    )
    .json(&json!({ "sub_stage_id": "site_visit" }))
    .await;
    response.assert_status_ok();
}

#[tokio::test]
async fn hold_endpoint_is_admin_only() {
    let (server, _guard) = create_test_server();
    create_project(&server, "villa-101").await;

    let response = as_member(
        server.post("/progression/villa-101/hold"),
        "milestones.update.pre_sales",
    )
    .json(&json!({ "status": "hold" }))
    .await;
    response.assert_status_forbidden();

    let response = as_admin(server.post("/progression/villa-101/hold"))
        .json(&json!({ "status": "hold" }))
        .await;
    response.assert_status_ok();

    // Even admin mutations are now blocked.
    let response = as_admin(server.post("/progression/villa-101/complete"))
        .json(&json!({ "sub_stage_id": "site_visit" }))
        .await;
    response.assert_status(axum::http::StatusCode::CONFLICT);
    let error: ErrorResponse = response.json();
    assert_eq!(error.error, "progression_blocked");
}

// =============================================================================
// PERCENTAGE TESTS
// =============================================================================

/// Drive a project through pre-sales and design so production is unlocked.
async fn advance_to_production(server: &TestServer, project: &str) {
    for id in [
        "site_visit",
        "requirement_brief",
        "quotation_shared",
        "concept_design",
        "design_presentation",
        "design_finalization",
    ] {
        let response = as_admin(server.post(&format!("/progression/{project}/complete")))
            .json(&json!({ "sub_stage_id": id }))
            .await;
        response.assert_status_ok();
    }
}

#[tokio::test]
async fn percentage_flow_with_regression_and_auto_completion() {
    let (server, _guard) = create_test_server();
    create_project(&server, "villa-101").await;
    advance_to_production(&server, "villa-101").await;

    let response = as_admin(server.post("/progression/villa-101/percentage"))
        .json(&json!({ "sub_stage_id": "material_procurement", "value": 40, "comment": "fabric ordered" }))
        .await;
    response.assert_status_ok();

    // Regression is rejected.
    let response = as_admin(server.post("/progression/villa-101/percentage"))
        .json(&json!({ "sub_stage_id": "material_procurement", "value": 30 }))
        .await;
    response.assert_status(axum::http::StatusCode::CONFLICT);
    let error: ErrorResponse = response.json();
    assert_eq!(error.error, "percentage_regression");

    // Direct completion of a percentage sub-stage is rejected.
    let response = as_admin(server.post("/progression/villa-101/complete"))
        .json(&json!({ "sub_stage_id": "material_procurement" }))
        .await;
    response.assert_status(axum::http::StatusCode::CONFLICT);
    let error: ErrorResponse = response.json();
    assert_eq!(error.error, "wrong_operation");

    // 100 auto-completes.
    let response = as_admin(server.post("/progression/villa-101/percentage"))
        .json(&json!({ "sub_stage_id": "material_procurement", "value": 100 }))
        .await;
    response.assert_status_ok();
    let snapshot: Snapshot = response.json();
    let production = &snapshot.view.groups[2];
    assert_eq!(production.sub_stages[0].percent, 100);
    assert_eq!(production.progress.completed, 1);
}

#[tokio::test]
async fn percentage_above_range_is_conflict() {
    let (server, _guard) = create_test_server();
    create_project(&server, "villa-101").await;
    advance_to_production(&server, "villa-101").await;

    let response = as_admin(server.post("/progression/villa-101/percentage"))
        .json(&json!({ "sub_stage_id": "material_procurement", "value": 101 }))
        .await;
    response.assert_status(axum::http::StatusCode::CONFLICT);
    let error: ErrorResponse = response.json();
    assert_eq!(error.error, "invalid_range");
}

// =============================================================================
// CONCURRENCY TESTS
// =============================================================================

#[tokio::test]
async fn stale_revision_pin_is_conflict() {
    let (server, _guard) = create_test_server();
    let created = create_project(&server, "villa-101").await;
    let base = created.view.revision;

    // First writer pins revision 0 and commits.
    let response = as_admin(server.post("/progression/villa-101/complete"))
        .json(&json!({ "sub_stage_id": "site_visit", "revision": base }))
        .await;
    response.assert_status_ok();

    // Second writer still holds revision 0.
    let response = as_admin(server.post("/progression/villa-101/complete"))
        .json(&json!({ "sub_stage_id": "requirement_brief", "revision": base }))
        .await;
    response.assert_status(axum::http::StatusCode::CONFLICT);
    let error: ErrorResponse = response.json();
    assert_eq!(error.error, "conflict");
}

// =============================================================================
// API KEY AUTH TESTS
// =============================================================================

#[tokio::test]
async fn api_key_gates_everything_but_health() {
    let (server, _guard) = create_test_server();
    // Recreate the router with auth enabled.
    // SAFETY: Tests run sequentially under AUTH_TEST_MUTEX, so no concurrent env access.
    unsafe { std::env::set_var("MILEPOST_API_KEY", "secret-key") };
    let service = ProgressionService::open(StorageBackend::InMemory(MemoryStore::new()))
        .expect("memory backend opens");
    let authed = TestServer::new(create_router(AppState::new(service))).unwrap();
    drop(server);

    // /health stays open for load balancers.
    authed.get("/health").await.assert_status_ok();

    // Everything else requires the key.
    authed
        .get("/progression/definitions")
        .await
        .assert_status_unauthorized();

    let response = authed
        .get("/progression/definitions")
        .add_header(
            axum::http::header::AUTHORIZATION,
            "Bearer secret-key".parse::<HeaderValue>().unwrap(),
        )
        .await;
    response.assert_status_ok();

    let response = authed
        .get("/progression/definitions")
        .add_header(
            axum::http::header::AUTHORIZATION,
            "Bearer wrong-key".parse::<HeaderValue>().unwrap(),
        )
        .await;
    response.assert_status_unauthorized();
}
