//! # Project Progression State
//!
//! One mutable record per project. Mutated exclusively through the
//! [`TransitionEngine`](crate::engine::TransitionEngine); never deleted while
//! the project exists; read-only once the final sub-stage of the progression
//! sequence completes.

use crate::definitions::DefinitionSet;
use crate::types::{ActivityEntry, HoldStatus, SubStageId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Per-project progression record.
///
/// Invariants maintained by the transition engine:
/// 1. `completed` is always a prefix of the global progression sequence.
/// 2. A percentage value for a completed sub-stage is removed on completion.
/// 3. `completed` only ever grows; there is no rollback through this API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectProgressionState {
    /// Sub-stage ids marked complete. Membership is all that matters.
    pub completed: BTreeSet<SubStageId>,
    /// Progress values for not-yet-completed percentage sub-stages.
    pub percentages: BTreeMap<SubStageId, u8>,
    /// Project-level freeze flag.
    pub hold_status: HoldStatus,
    /// Append-only audit trail, in durable-commit order.
    pub activity_log: Vec<ActivityEntry>,
    /// Optimistic-concurrency counter, bumped on every committed mutation.
    pub revision: u64,
}

impl Default for ProjectProgressionState {
    fn default() -> Self {
        Self::new()
    }
}

impl ProjectProgressionState {
    /// Create the empty record for a project entering the pipeline:
    /// first stage unlocked, nothing completed.
    #[must_use]
    pub fn new() -> Self {
        Self {
            completed: BTreeSet::new(),
            percentages: BTreeMap::new(),
            hold_status: HoldStatus::Active,
            activity_log: Vec::new(),
            revision: 0,
        }
    }

    /// Stored progress for a percentage sub-stage; 0 if never advanced.
    ///
    /// Meaningless for completed sub-stages (completion supersedes
    /// percentage), so callers should check `completed` first.
    #[must_use]
    pub fn percentage_of(&self, id: &SubStageId) -> u8 {
        self.percentages.get(id).copied().unwrap_or(0)
    }

    /// Whether the final sub-stage of the progression sequence is complete,
    /// which makes the record read-only.
    #[must_use]
    pub fn is_archived(&self, defs: &DefinitionSet) -> bool {
        defs.last_sub_stage()
            .is_some_and(|last| self.completed.contains(&last.id))
    }
}

// =============================================================================
// TESTS
// =============================================================================
