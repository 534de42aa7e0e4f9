//! # Core Type Definitions
//!
//! This module contains the core types for the Milepost progression engine:
//! - Identifiers (`ProjectId`, `StageId`, `SubStageId`)
//! - Sub-stage kinds and hold status
//! - Mutation operations (`Operation`)
//! - The activity log (`ActivityEntry`, `ActivityAction`)
//! - Error types (`ProgressionError`)
//!
//! ## Determinism Guarantees
//!
//! All types in this module:
//! - Use integer arithmetic only (no floating-point)
//! - Implement `Ord` for deterministic ordering in `BTreeMap`/`BTreeSet`

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Timestamp type used throughout the engine.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

// =============================================================================
// IDENTIFIERS
// =============================================================================

/// Unique identifier for a project in the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ProjectId(pub String);

impl ProjectId {
    /// Create a new project identifier from a string.
    #[must_use]
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ProjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Stable identifier for a stage (group), e.g. `production`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StageId(pub String);

impl StageId {
    /// Create a new stage identifier from a string.
    #[must_use]
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for StageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Stable identifier for a sub-stage, unique across the entire definition
/// set (not just within its owning stage), e.g. `design_finalization`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SubStageId(pub String);

impl SubStageId {
    /// Create a new sub-stage identifier from a string.
    #[must_use]
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SubStageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// SUB-STAGE KIND
// =============================================================================

/// How a sub-stage progresses to completion.
///
/// The kind is an explicit tagged variant so that validator branches on it
/// are exhaustive and compiler-checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubStageKind {
    /// Complete/incomplete, flipped by a single `CompleteSubStage` operation.
    Binary,
    /// 0-100 progress; auto-completes when an `UpdatePercentage` reaches 100.
    Percentage,
}

// =============================================================================
// HOLD STATUS
// =============================================================================

/// Project-level flag that freezes all progression mutations without
/// altering stored progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HoldStatus {
    /// Normal operation; mutations are accepted.
    Active,
    /// Temporarily frozen; mutations are rejected until the hold is lifted.
    Hold,
    /// Project shut down; mutations are rejected.
    Deactivated,
}

impl HoldStatus {
    /// Whether progression mutations are currently accepted.
    #[must_use]
    pub fn is_active(&self) -> bool {
        matches!(self, HoldStatus::Active)
    }

    /// Human-readable label.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            HoldStatus::Active => "active",
            HoldStatus::Hold => "on hold",
            HoldStatus::Deactivated => "deactivated",
        }
    }
}

impl std::fmt::Display for HoldStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

// =============================================================================
// OPERATIONS
// =============================================================================

/// A requested progression mutation against one project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Operation {
    /// Mark a binary sub-stage complete.
    CompleteSubStage {
        /// Target sub-stage.
        id: SubStageId,
    },
    /// Advance a percentage sub-stage; reaching 100 auto-completes it.
    UpdatePercentage {
        /// Target sub-stage.
        id: SubStageId,
        /// New progress value, 0-100 inclusive.
        value: u8,
        /// Optional free-form note recorded in the activity log.
        comment: Option<String>,
    },
}

impl Operation {
    /// The sub-stage this operation targets.
    #[must_use]
    pub fn target(&self) -> &SubStageId {
        match self {
            Operation::CompleteSubStage { id } | Operation::UpdatePercentage { id, .. } => id,
        }
    }
}

// =============================================================================
// ACTIVITY LOG
// =============================================================================

/// Kind of event recorded in a project's activity log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityAction {
    /// Project entered the pipeline with an empty progression record.
    ProjectCreated,
    /// A sub-stage was marked complete.
    SubStageCompleted,
    /// A percentage sub-stage advanced (possibly auto-completing at 100).
    PercentageUpdated,
    /// The project hold status changed.
    HoldChanged,
}

/// One append-only entry in a project's activity log.
///
/// Entries are appended in the order operations were durably committed, so
/// the audit trail is always consistent with the actual state transitions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityEntry {
    /// When the operation committed.
    pub ts: Timestamp,
    /// Who performed the action.
    pub actor_id: String,
    /// Display name of the actor.
    pub actor_name: String,
    /// What kind of action was taken.
    pub action: ActivityAction,
    /// Target sub-stage, if the action concerns one.
    pub sub_stage_id: Option<SubStageId>,
    /// Human-readable details (sub-stage/group names, old/new values, comment).
    pub details: String,
}

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Errors produced by the progression engine.
///
/// - No silent failures
/// - Validation failures are non-mutating
/// - Every failure carries a stable machine-checkable [`code`](Self::code)
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProgressionError {
    /// The project is on hold or deactivated; all mutations are rejected.
    #[error("progression blocked: project is {status}")]
    Blocked {
        /// The non-active status that blocked the mutation.
        status: HoldStatus,
    },

    /// The caller lacks the permission gating the operation, e.g. the
    /// group-scoped `milestones.update.<stage>` or the admin scope.
    #[error("forbidden: missing permission {scope}")]
    Forbidden {
        /// The missing permission scope.
        scope: String,
    },

    /// The target sub-stage is not the next eligible one in the progression
    /// sequence (it is already complete, or a predecessor is incomplete).
    #[error("out of sequence: {sub_stage} is not the next eligible sub-stage")]
    OutOfSequence {
        /// The rejected target.
        sub_stage: SubStageId,
    },

    /// Requested percentage is lower than the stored value.
    #[error("percentage regression: requested {requested} below current {current}")]
    PercentageRegression {
        /// Stored progress value.
        current: u8,
        /// Rejected requested value.
        requested: u8,
    },

    /// Percentage outside the 0-100 range.
    #[error("invalid range: {requested} is outside 0-100")]
    InvalidRange {
        /// Rejected requested value.
        requested: u8,
    },

    /// Operation does not match the sub-stage kind: direct completion of a
    /// percentage sub-stage, or a percentage update on a binary one.
    #[error("wrong operation: {sub_stage} does not accept this operation for its kind")]
    WrongOperation {
        /// The rejected target.
        sub_stage: SubStageId,
    },

    /// Unknown project or sub-stage identifier.
    #[error("not found: {0}")]
    NotFound(String),

    /// Optimistic-concurrency revision mismatch; a concurrent writer won.
    #[error("conflict: expected revision {expected}, found {actual}")]
    Conflict {
        /// Revision the caller based its mutation on.
        expected: u64,
        /// Revision currently stored.
        actual: u64,
    },

    /// A definition set failed validation.
    #[error("invalid definition: {0}")]
    InvalidDefinition(String),

    /// Storage I/O or serialization failure.
    #[error("storage error: {0}")]
    Storage(String),
}

impl ProgressionError {
    /// Stable machine-checkable error code, suitable for API payloads.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            ProgressionError::Blocked { .. } => "progression_blocked",
            ProgressionError::Forbidden { .. } => "forbidden",
            ProgressionError::OutOfSequence { .. } => "out_of_sequence",
            ProgressionError::PercentageRegression { .. } => "percentage_regression",
            ProgressionError::InvalidRange { .. } => "invalid_range",
            ProgressionError::WrongOperation { .. } => "wrong_operation",
            ProgressionError::NotFound(_) => "not_found",
            ProgressionError::Conflict { .. } => "conflict",
            ProgressionError::InvalidDefinition(_) => "invalid_definition",
            ProgressionError::Storage(_) => "storage_error",
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hold_status_active_check() {
        assert!(HoldStatus::Active.is_active());
        assert!(!HoldStatus::Hold.is_active());
        assert!(!HoldStatus::Deactivated.is_active());
    }

    #[test]
    fn blocked_message_distinguishes_hold_from_deactivated() {
        let hold = ProgressionError::Blocked {
            status: HoldStatus::Hold,
        };
        let deact = ProgressionError::Blocked {
            status: HoldStatus::Deactivated,
        };
        assert!(hold.to_string().contains("on hold"));
        assert!(deact.to_string().contains("deactivated"));
        assert_eq!(hold.code(), deact.code());
    }

    #[test]
    fn operation_target_returns_sub_stage() {
        let op = Operation::UpdatePercentage {
            id: SubStageId::new("factory_production"),
            value: 40,
            comment: None,
        };
        assert_eq!(op.target().as_str(), "factory_production");
    }

    #[test]
    fn error_codes_are_stable() {
        assert_eq!(
            ProgressionError::OutOfSequence {
                sub_stage: SubStageId::new("x")
            }
            .code(),
            "out_of_sequence"
        );
        assert_eq!(
            ProgressionError::Conflict {
                expected: 1,
                actual: 2
            }
            .code(),
            "conflict"
        );
    }
}
