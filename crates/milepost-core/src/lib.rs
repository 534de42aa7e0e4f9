//! # milepost-core
//!
//! The deterministic milestone progression engine for Milepost - THE LOGIC.
//!
//! This crate owns the canonical stage/sub-stage definitions, validates and
//! applies progression requests, computes derived progress, and enforces
//! forward-only, gated, role-aware transitions. The flattened list of all
//! sub-stages (stage order, then sub-stage order) is the **progression
//! sequence**: the sole source of truth for what can be completed next.
//!
//! ## Architectural Constraints
//!
//! The CORE:
//! - Is the only place where progression state is mutated (via the engine)
//! - Is closed: no external logic may be injected
//! - Uses deterministic collections (`BTreeMap`/`BTreeSet`) and integer
//!   arithmetic only
//! - Has NO async, NO network dependencies (pure Rust)

// =============================================================================
// MODULES
// =============================================================================

pub mod definitions;
pub mod engine;
pub mod permissions;
pub mod progress;
pub mod service;
pub mod state;
pub mod store;
pub mod types;
pub mod validator;

// =============================================================================
// RE-EXPORTS: Core Types (from types module)
// =============================================================================

pub use types::{
    ActivityAction, ActivityEntry, HoldStatus, Operation, ProgressionError, ProjectId, StageId,
    SubStageId, SubStageKind, Timestamp,
};

// =============================================================================
// RE-EXPORTS: Engine
// =============================================================================

pub use definitions::{
    DefinitionRegistry, DefinitionSet, StageDefinition, SubStageDefinition, default_pipeline,
};
pub use engine::TransitionEngine;
pub use permissions::{ADMIN_SCOPE, Caller, Role};
pub use progress::{
    GroupProgress, GroupView, ProgressionView, SubStageStatus, SubStageView,
    can_complete_sub_stage, current_group, group_progress, is_group_complete, is_group_locked,
    progression_view, sub_stage_status,
};
pub use service::{ProgressionService, Snapshot};
pub use state::ProjectProgressionState;
pub use store::{MemoryStore, ProgressionStore, RedbStore, StorageBackend};
pub use validator::validate;
