//! # Transition Validator
//!
//! Decides whether a requested mutation is admissible before any state
//! change happens. Checks run in a fixed order so error reporting is
//! deterministic; the first failing check wins:
//!
//! 1. Hold status (`Blocked`) — rejected even for Admin.
//! 2. Target resolution (`NotFound`) — the owning stage is needed below.
//! 3. Group-scoped permission (`Forbidden`).
//! 4. Forward-only sequence gate (`OutOfSequence`).
//! 5. Percentage range and regression (`InvalidRange`, `PercentageRegression`).
//! 6. Operation/kind match (`WrongOperation`).
//!
//! Validation never mutates; callers apply only after `validate` returns Ok.

use crate::definitions::DefinitionSet;
use crate::permissions::Caller;
use crate::progress::can_complete_sub_stage;
use crate::state::ProjectProgressionState;
use crate::types::{Operation, ProgressionError, SubStageKind};

/// Validate one operation against the current state.
///
/// Returns the first violated rule, or `Ok(())` when the operation may be
/// applied by the [`TransitionEngine`](crate::engine::TransitionEngine).
pub fn validate(
    defs: &DefinitionSet,
    state: &ProjectProgressionState,
    caller: &Caller,
    op: &Operation,
) -> Result<(), ProgressionError> {
    if !state.hold_status.is_active() {
        return Err(ProgressionError::Blocked {
            status: state.hold_status,
        });
    }

    let target = op.target();
    let (stage, sub) = defs
        .sub_stage(target)
        .ok_or_else(|| ProgressionError::NotFound(format!("sub-stage {target}")))?;

    if !caller.may_update_stage(&stage.id) {
        return Err(ProgressionError::Forbidden {
            scope: Caller::stage_permission(&stage.id),
        });
    }

    // Covers "already complete", incomplete predecessors, and locked groups
    // in one gate: the global sequence interleaves group boundaries.
    if !can_complete_sub_stage(defs, target, &state.completed) {
        return Err(ProgressionError::OutOfSequence {
            sub_stage: target.clone(),
        });
    }

    match (op, sub.kind) {
        (Operation::CompleteSubStage { .. }, SubStageKind::Binary) => Ok(()),
        (Operation::CompleteSubStage { .. }, SubStageKind::Percentage) => {
            Err(ProgressionError::WrongOperation {
                sub_stage: target.clone(),
            })
        }
        (Operation::UpdatePercentage { value, .. }, SubStageKind::Percentage) => {
            if *value > 100 {
                return Err(ProgressionError::InvalidRange { requested: *value });
            }
            let current = state.percentage_of(target);
            if *value < current {
                return Err(ProgressionError::PercentageRegression {
                    current,
                    requested: *value,
                });
            }
            Ok(())
        }
        (Operation::UpdatePercentage { value, .. }, SubStageKind::Binary) => {
            // Range first so the caller learns about the bad value even when
            // the kind is also wrong.
            if *value > 100 {
                return Err(ProgressionError::InvalidRange { requested: *value });
            }
            Err(ProgressionError::WrongOperation {
                sub_stage: target.clone(),
            })
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
