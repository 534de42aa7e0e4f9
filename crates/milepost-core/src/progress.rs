//! # Progress Calculator
//!
//! Pure, side-effect-free derivations over a definition set and a completed
//! set. All functions here are safely callable from any number of concurrent
//! readers; nothing in this module mutates state.
//!
//! Percentages use integer round-half-up: `(100 * completed + total / 2) / total`.

use crate::definitions::{DefinitionSet, StageDefinition};
use crate::state::ProjectProgressionState;
use crate::types::{HoldStatus, StageId, SubStageId, SubStageKind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

// =============================================================================
// DERIVED SUB-STAGE STATUS
// =============================================================================

/// Display state of a single sub-stage, derived — never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubStageStatus {
    /// A predecessor in the progression sequence is still incomplete.
    Locked,
    /// Next in sequence; progression is unlocked.
    Eligible,
    /// Percentage kind only: 0 < value < 100.
    InProgress,
    /// Terminal.
    Completed,
}

/// Progress summary of one stage (group).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupProgress {
    /// Completed sub-stages in the group.
    pub completed: usize,
    /// Total sub-stages in the group (never 0 by construction).
    pub total: usize,
    /// Integer percentage, round-half-up.
    pub percentage: u8,
}

// =============================================================================
// CALCULATOR FUNCTIONS
// =============================================================================

/// Progress summary for a stage.
#[must_use]
pub fn group_progress(stage: &StageDefinition, completed: &BTreeSet<SubStageId>) -> GroupProgress {
    let total = stage.sub_stages.len();
    let done = stage
        .sub_stages
        .iter()
        .filter(|s| completed.contains(&s.id))
        .count();

    // Round half up with integer math; total >= 1 by DefinitionSet validation.
    let percentage = if total == 0 {
        0
    } else {
        ((100 * done + total / 2) / total) as u8
    };

    GroupProgress {
        completed: done,
        total,
        percentage,
    }
}

/// True iff every sub-stage of the stage is complete.
#[must_use]
pub fn is_group_complete(stage: &StageDefinition, completed: &BTreeSet<SubStageId>) -> bool {
    stage.sub_stages.iter().all(|s| completed.contains(&s.id))
}

/// True iff the stage at `index` cannot accept mutations yet: it is not the
/// first stage and the immediately preceding stage is not complete.
#[must_use]
pub fn is_group_locked(
    defs: &DefinitionSet,
    index: usize,
    completed: &BTreeSet<SubStageId>,
) -> bool {
    if index == 0 {
        return false;
    }
    match defs.stages().get(index.saturating_sub(1)) {
        Some(previous) => !is_group_complete(previous, completed),
        None => true,
    }
}

/// The first stage (in order) that is not fully complete; the last stage if
/// everything is complete (terminal display state — no "Done" sentinel).
#[must_use]
pub fn current_group<'a>(
    defs: &'a DefinitionSet,
    completed: &BTreeSet<SubStageId>,
) -> Option<&'a StageDefinition> {
    defs.stages()
        .iter()
        .find(|stage| !is_group_complete(stage, completed))
        .or_else(|| defs.stages().last())
}

/// The forward-only gate: a sub-stage can be completed iff it is not already
/// complete and it is either the very first sub-stage of the progression
/// sequence or its immediate predecessor is complete.
///
/// Exactly one sub-stage is ever eligible next (beyond the completed prefix).
#[must_use]
pub fn can_complete_sub_stage(
    defs: &DefinitionSet,
    id: &SubStageId,
    completed: &BTreeSet<SubStageId>,
) -> bool {
    if completed.contains(id) {
        return false;
    }
    let mut predecessor: Option<&SubStageId> = None;
    for sub in defs.progression_sequence() {
        if &sub.id == id {
            return match predecessor {
                None => true,
                Some(prev) => completed.contains(prev),
            };
        }
        predecessor = Some(&sub.id);
    }
    // Unknown id: never eligible.
    false
}

/// Derived display state of one sub-stage.
#[must_use]
pub fn sub_stage_status(
    defs: &DefinitionSet,
    state: &ProjectProgressionState,
    id: &SubStageId,
) -> SubStageStatus {
    if state.completed.contains(id) {
        return SubStageStatus::Completed;
    }
    if !can_complete_sub_stage(defs, id, &state.completed) {
        return SubStageStatus::Locked;
    }
    let in_progress = defs
        .sub_stage(id)
        .is_some_and(|(_, sub)| sub.kind == SubStageKind::Percentage)
        && state.percentage_of(id) > 0;
    if in_progress {
        SubStageStatus::InProgress
    } else {
        SubStageStatus::Eligible
    }
}

// =============================================================================
// VIEWS (full snapshot for API/CLI consumers)
// =============================================================================

/// Snapshot of one sub-stage for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubStageView {
    /// Sub-stage id.
    pub id: SubStageId,
    /// Display label.
    pub name: String,
    /// Binary or percentage.
    pub kind: SubStageKind,
    /// Derived status.
    pub status: SubStageStatus,
    /// Current progress: 100 when completed, stored value otherwise.
    pub percent: u8,
}

/// Snapshot of one stage (group) for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupView {
    /// Stage id.
    pub id: StageId,
    /// Display label.
    pub name: String,
    /// Pipeline rank.
    pub order: u32,
    /// Whether the group accepts mutations yet.
    pub locked: bool,
    /// Progress summary.
    pub progress: GroupProgress,
    /// Per-sub-stage detail.
    pub sub_stages: Vec<SubStageView>,
}

/// Full derived snapshot of a project's progression.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressionView {
    /// Project hold flag.
    pub hold_status: HoldStatus,
    /// Optimistic-concurrency revision of the underlying record.
    pub revision: u64,
    /// Read-only once the final sub-stage completes.
    pub archived: bool,
    /// First incomplete group (last group when everything is complete).
    pub current_group: StageId,
    /// All groups in pipeline order.
    pub groups: Vec<GroupView>,
}

/// Build the full derived snapshot for one project state.
#[must_use]
pub fn progression_view(defs: &DefinitionSet, state: &ProjectProgressionState) -> ProgressionView {
    let groups = defs
        .stages()
        .iter()
        .enumerate()
        .map(|(index, stage)| GroupView {
            id: stage.id.clone(),
            name: stage.name.clone(),
            order: stage.order,
            locked: is_group_locked(defs, index, &state.completed),
            progress: group_progress(stage, &state.completed),
            sub_stages: stage
                .sub_stages
                .iter()
                .map(|sub| {
                    let status = sub_stage_status(defs, state, &sub.id);
                    let percent = if status == SubStageStatus::Completed {
                        100
                    } else {
                        state.percentage_of(&sub.id)
                    };
                    SubStageView {
                        id: sub.id.clone(),
                        name: sub.name.clone(),
                        kind: sub.kind,
                        status,
                        percent,
                    }
                })
                .collect(),
        })
        .collect();

    let current = current_group(defs, &state.completed)
        .map(|s| s.id.clone())
        .unwrap_or_else(|| StageId::new(""));

    ProgressionView {
        hold_status: state.hold_status,
        revision: state.revision,
        archived: state.is_archived(defs),
        current_group: current,
        groups,
    }
}

// =============================================================================
// TESTS
// =============================================================================
