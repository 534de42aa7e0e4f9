//! # API Request/Response Types
//!
//! This module defines the JSON structures for the HTTP API.

use milepost_core::StageDefinition;
use serde::{Deserialize, Serialize};

// =============================================================================
// HEALTH RESPONSE
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

// =============================================================================
// DEFINITIONS RESPONSE
// =============================================================================

/// Read-only view of the current definition set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefinitionsResponse {
    /// Registry version, bumped on each accepted replacement.
    pub version: u64,
    /// Stages in pipeline order.
    pub stages: Vec<StageDefinition>,
}

// =============================================================================
// MUTATION REQUESTS
// =============================================================================

/// Body of `POST /progression/{project_id}/complete`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompleteRequest {
    /// Target sub-stage.
    pub sub_stage_id: String,
    /// Optimistic-concurrency pin: the revision the caller last read.
    /// A mismatch fails with 409 `conflict`.
    #[serde(default)]
    pub revision: Option<u64>,
}

/// Body of `POST /progression/{project_id}/percentage`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PercentageRequest {
    /// Target sub-stage.
    pub sub_stage_id: String,
    /// New progress value, 0-100; 100 auto-completes.
    pub value: u8,
    /// Optional note recorded in the activity log.
    #[serde(default)]
    pub comment: Option<String>,
    /// Optimistic-concurrency pin, as in [`CompleteRequest`].
    #[serde(default)]
    pub revision: Option<u64>,
}

/// Body of `POST /progression/{project_id}/hold`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HoldRequest {
    /// New hold status: `active`, `hold`, or `deactivated`.
    pub status: milepost_core::HoldStatus,
}

// =============================================================================
// ERROR RESPONSE
// =============================================================================

/// Typed error payload: a stable machine-checkable code plus a
/// human-readable message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
        }
    }
}
