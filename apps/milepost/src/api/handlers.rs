//! # API Endpoint Handlers
//!
//! This module implements the actual HTTP endpoint handlers.
//!
//! Mutation handlers resolve the caller identity from `x-actor-*` headers
//! (supplied by the upstream identity provider), drive the progression
//! service, and translate typed engine errors into HTTP status codes:
//! 403 for missing permissions, 404 for unknown ids, 409 for every
//! validation or concurrency failure, 500 for storage faults.

use super::{
    AppState,
    types::{
        CompleteRequest, DefinitionsResponse, ErrorResponse, HealthResponse, HoldRequest,
        PercentageRequest,
    },
};
use axum::{
    Json,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use milepost_core::{Caller, ProgressionError, ProjectId, Role, SubStageId};
use std::collections::BTreeSet;

// =============================================================================
// CALLER IDENTITY
// =============================================================================

/// Resolve the caller from identity headers.
///
/// Required: `x-actor-id` and `x-actor-role` (`admin` or `member`).
/// Optional: `x-actor-name` (defaults to the id) and `x-actor-permissions`
/// (comma-separated permission strings). Missing or malformed identity is
/// 401: the identity provider sits in front of this API, so an absent
/// identity means the request never went through it.
fn caller_from_headers(headers: &HeaderMap) -> Result<Caller, Response> {
    let header_str = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|s| !s.is_empty())
    };

    let Some(actor_id) = header_str("x-actor-id") else {
        return Err(unauthorized("missing x-actor-id header"));
    };
    let Some(role_raw) = header_str("x-actor-role") else {
        return Err(unauthorized("missing x-actor-role header"));
    };
    let role = match role_raw {
        "admin" => Role::Admin,
        "member" => Role::Member,
        other => {
            return Err(unauthorized(format!(
                "unknown x-actor-role '{other}' (expected admin or member)"
            )));
        }
    };
    let actor_name = header_str("x-actor-name").unwrap_or(actor_id);

    let permissions: BTreeSet<String> = header_str("x-actor-permissions")
        .map(|raw| {
            raw.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    Ok(Caller::new(actor_id, actor_name, role, permissions))
}

fn unauthorized(message: impl Into<String>) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(ErrorResponse::new("unauthorized", message)),
    )
        .into_response()
}

// =============================================================================
// ERROR MAPPING
// =============================================================================

/// Translate a typed engine error into an HTTP response.
fn error_response(err: &ProgressionError) -> Response {
    let status = match err {
        ProgressionError::Forbidden { .. } => StatusCode::FORBIDDEN,
        ProgressionError::NotFound(_) => StatusCode::NOT_FOUND,
        ProgressionError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        // Validation and concurrency failures are all state conflicts.
        ProgressionError::Blocked { .. }
        | ProgressionError::OutOfSequence { .. }
        | ProgressionError::PercentageRegression { .. }
        | ProgressionError::InvalidRange { .. }
        | ProgressionError::WrongOperation { .. }
        | ProgressionError::Conflict { .. }
        | ProgressionError::InvalidDefinition(_) => StatusCode::CONFLICT,
    };
    (
        status,
        Json(ErrorResponse::new(err.code(), err.to_string())),
    )
        .into_response()
}

// =============================================================================
// HEALTH HANDLER
// =============================================================================

/// Health check endpoint.
pub async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse::default())
}

// =============================================================================
// DEFINITIONS HANDLER
// =============================================================================

/// Read-only view of the current definition set.
pub async fn definitions_handler(State(state): State<AppState>) -> impl IntoResponse {
    let service = state.service.read().await;
    let response = DefinitionsResponse {
        version: service.definitions_version(),
        stages: service.definitions().stages().to_vec(),
    };
    (StatusCode::OK, Json(response))
}

// =============================================================================
// SNAPSHOT HANDLER
// =============================================================================

/// Full progression snapshot for one project.
pub async fn snapshot_handler(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
) -> Response {
    let service = state.service.read().await;
    match service.snapshot(&ProjectId::new(project_id)) {
        Ok(snapshot) => (StatusCode::OK, Json(snapshot)).into_response(),
        Err(e) => error_response(&e),
    }
}

// =============================================================================
// CREATE HANDLER
// =============================================================================

/// Create the empty progression record for a project entering the pipeline.
pub async fn create_handler(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
    headers: HeaderMap,
) -> Response {
    let caller = match caller_from_headers(&headers) {
        Ok(c) => c,
        Err(response) => return response,
    };

    let mut service = state.service.write().await;
    match service.create_project(&ProjectId::new(project_id), &caller) {
        Ok(snapshot) => (StatusCode::CREATED, Json(snapshot)).into_response(),
        Err(e) => error_response(&e),
    }
}

// =============================================================================
// COMPLETE HANDLER
// =============================================================================

/// Mark a binary sub-stage complete.
pub async fn complete_handler(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
    headers: HeaderMap,
    Json(request): Json<CompleteRequest>,
) -> Response {
    let caller = match caller_from_headers(&headers) {
        Ok(c) => c,
        Err(response) => return response,
    };

    let mut service = state.service.write().await;
    match service.complete(
        &ProjectId::new(project_id),
        &caller,
        SubStageId::new(request.sub_stage_id),
        request.revision,
    ) {
        Ok(snapshot) => (StatusCode::OK, Json(snapshot)).into_response(),
        Err(e) => error_response(&e),
    }
}

// =============================================================================
// PERCENTAGE HANDLER
// =============================================================================

/// Advance a percentage sub-stage; 100 auto-completes it.
pub async fn percentage_handler(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
    headers: HeaderMap,
    Json(request): Json<PercentageRequest>,
) -> Response {
    let caller = match caller_from_headers(&headers) {
        Ok(c) => c,
        Err(response) => return response,
    };

    let mut service = state.service.write().await;
    match service.set_percentage(
        &ProjectId::new(project_id),
        &caller,
        SubStageId::new(request.sub_stage_id),
        request.value,
        request.comment,
        request.revision,
    ) {
        Ok(snapshot) => (StatusCode::OK, Json(snapshot)).into_response(),
        Err(e) => error_response(&e),
    }
}

// =============================================================================
// HOLD HANDLER
// =============================================================================

/// Change a project's hold status. Admin only.
pub async fn hold_handler(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
    headers: HeaderMap,
    Json(request): Json<HoldRequest>,
) -> Response {
    let caller = match caller_from_headers(&headers) {
        Ok(c) => c,
        Err(response) => return response,
    };

    let mut service = state.service.write().await;
    match service.set_hold(&ProjectId::new(project_id), &caller, request.status) {
        Ok(snapshot) => (StatusCode::OK, Json(snapshot)).into_response(),
        Err(e) => error_response(&e),
    }
}
