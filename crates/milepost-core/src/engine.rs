//! # Transition Applicator
//!
//! The state-machine core: applies a validated operation atomically to one
//! [`ProjectProgressionState`] and produces the audit entry. All effects are
//! confined to the single record; failures are non-mutating.
//!
//! Derived per-sub-stage states: `Locked` → `Eligible` → (`InProgress` for
//! percentage kind) → `Completed`. Reaching 100 via `UpdatePercentage`
//! auto-completes the sub-stage in the same operation.

use crate::definitions::DefinitionSet;
use crate::permissions::Caller;
use crate::state::ProjectProgressionState;
use crate::types::{
    ActivityAction, ActivityEntry, HoldStatus, Operation, ProgressionError, Timestamp,
};
use crate::validator::validate;

/// Applies operations to progression state against one definition set.
pub struct TransitionEngine<'a> {
    defs: &'a DefinitionSet,
}

impl<'a> TransitionEngine<'a> {
    /// Bind the engine to a definition set.
    #[must_use]
    pub fn new(defs: &'a DefinitionSet) -> Self {
        Self { defs }
    }

    /// Validate and apply one operation.
    ///
    /// On success the state is mutated, one entry is appended to the
    /// activity log, the revision is bumped, and the entry is returned.
    /// On failure the state is untouched.
    pub fn apply(
        &self,
        state: &mut ProjectProgressionState,
        caller: &Caller,
        op: &Operation,
        now: Timestamp,
    ) -> Result<ActivityEntry, ProgressionError> {
        validate(self.defs, state, caller, op)?;

        let target = op.target().clone();
        let (stage, sub) = self
            .defs
            .sub_stage(&target)
            .ok_or_else(|| ProgressionError::NotFound(format!("sub-stage {target}")))?;

        let (action, details) = match op {
            Operation::CompleteSubStage { .. } => {
                state.completed.insert(target.clone());
                state.percentages.remove(&target);
                (
                    ActivityAction::SubStageCompleted,
                    format!("completed {} ({})", sub.name, stage.name),
                )
            }
            Operation::UpdatePercentage { value, comment, .. } => {
                let old = state.percentage_of(&target);
                let mut details = format!(
                    "{} ({}) progress {old}% -> {value}%",
                    sub.name, stage.name
                );
                if *value == 100 {
                    // Auto-completion: part of the same atomic operation.
                    state.completed.insert(target.clone());
                    state.percentages.remove(&target);
                    details.push_str(", auto-completed");
                } else {
                    state.percentages.insert(target.clone(), *value);
                }
                if let Some(comment) = comment {
                    details.push_str(": ");
                    details.push_str(comment);
                }
                (ActivityAction::PercentageUpdated, details)
            }
        };

        let entry = ActivityEntry {
            ts: now,
            actor_id: caller.actor_id.clone(),
            actor_name: caller.actor_name.clone(),
            action,
            sub_stage_id: Some(target),
            details,
        };
        state.activity_log.push(entry.clone());
        state.revision = state.revision.saturating_add(1);
        Ok(entry)
    }

    /// Change the project hold status.
    ///
    /// This is the one mutation that bypasses the hold gate (lifting a hold
    /// would otherwise be impossible). Caller authorization is the service
    /// layer's job; this method only records the change.
    pub fn apply_hold(
        &self,
        state: &mut ProjectProgressionState,
        caller: &Caller,
        new_status: HoldStatus,
        now: Timestamp,
    ) -> ActivityEntry {
        let old = state.hold_status;
        state.hold_status = new_status;

        let entry = ActivityEntry {
            ts: now,
            actor_id: caller.actor_id.clone(),
            actor_name: caller.actor_name.clone(),
            action: ActivityAction::HoldChanged,
            sub_stage_id: None,
            details: format!("hold status {old} -> {new_status}"),
        };
        state.activity_log.push(entry.clone());
        state.revision = state.revision.saturating_add(1);
        entry
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definitions::default_pipeline;
    use crate::types::SubStageId;

    fn now() -> Timestamp {
        chrono::Utc::now()
    }

    fn complete_op(id: &str) -> Operation {
        Operation::CompleteSubStage {
            id: SubStageId::new(id),
        }
    }

    fn percent_op(id: &str, value: u8, comment: Option<&str>) -> Operation {
        Operation::UpdatePercentage {
            id: SubStageId::new(id),
            value,
            comment: comment.map(str::to_string),
        }
    }

    fn state_through_design() -> ProjectProgressionState {
        let mut state = ProjectProgressionState::new();
        for id in [
            "site_visit",
            "requirement_brief",
            "quotation_shared",
            "concept_design",
            "design_presentation",
            "design_finalization",
        ] {
            state.completed.insert(SubStageId::new(id));
        }
        state
    }

    #[test]
    fn completion_appends_audit_entry_and_bumps_revision() {
        let defs = default_pipeline();
        let engine = TransitionEngine::new(&defs);
        let mut state = ProjectProgressionState::new();
        let admin = Caller::admin("u1", "Priya");

        let entry = engine
            .apply(&mut state, &admin, &complete_op("site_visit"), now())
            .expect("valid completion");

        assert!(state.completed.contains(&SubStageId::new("site_visit")));
        assert_eq!(state.revision, 1);
        assert_eq!(state.activity_log.len(), 1);
        assert_eq!(entry.actor_name, "Priya");
        assert_eq!(entry.action, ActivityAction::SubStageCompleted);
        assert!(entry.details.contains("Site Visit"));
    }

    #[test]
    fn failed_operation_leaves_state_untouched() {
        let defs = default_pipeline();
        let engine = TransitionEngine::new(&defs);
        let mut state = ProjectProgressionState::new();
        let admin = Caller::admin("u1", "Priya");

        let before = state.clone();
        let err = engine
            .apply(&mut state, &admin, &complete_op("final_handover"), now())
            .expect_err("out of sequence");
        assert_eq!(err.code(), "out_of_sequence");
        assert_eq!(state, before);
    }

    #[test]
    fn percentage_update_stores_value_and_records_old_and_new() {
        let defs = default_pipeline();
        let engine = TransitionEngine::new(&defs);
        let mut state = state_through_design();
        let admin = Caller::admin("u1", "Priya");

        let entry = engine
            .apply(
                &mut state,
                &admin,
                &percent_op("material_procurement", 40, Some("fabric ordered")),
                now(),
            )
            .expect("valid update");

        assert_eq!(
            state.percentage_of(&SubStageId::new("material_procurement")),
            40
        );
        assert!(!state
            .completed
            .contains(&SubStageId::new("material_procurement")));
        assert!(entry.details.contains("0% -> 40%"));
        assert!(entry.details.contains("fabric ordered"));
    }

    #[test]
    fn reaching_100_auto_completes_and_drops_stored_percentage() {
        let defs = default_pipeline();
        let engine = TransitionEngine::new(&defs);
        let mut state = state_through_design();
        let admin = Caller::admin("u1", "Priya");
        let id = SubStageId::new("material_procurement");

        engine
            .apply(&mut state, &admin, &percent_op("material_procurement", 40, None), now())
            .expect("first update");
        let entry = engine
            .apply(&mut state, &admin, &percent_op("material_procurement", 100, None), now())
            .expect("final update");

        assert!(state.completed.contains(&id));
        assert!(!state.percentages.contains_key(&id));
        assert!(entry.details.contains("auto-completed"));
        assert_eq!(state.revision, 2);
    }

    #[test]
    fn completed_percentage_sub_stage_rejects_further_updates() {
        let defs = default_pipeline();
        let engine = TransitionEngine::new(&defs);
        let mut state = state_through_design();
        let admin = Caller::admin("u1", "Priya");

        engine
            .apply(&mut state, &admin, &percent_op("material_procurement", 100, None), now())
            .expect("completes");
        let err = engine
            .apply(&mut state, &admin, &percent_op("material_procurement", 100, None), now())
            .expect_err("terminal");
        assert_eq!(err.code(), "out_of_sequence");
    }

    #[test]
    fn hold_change_is_logged_and_lifting_restores_mutations() {
        let defs = default_pipeline();
        let engine = TransitionEngine::new(&defs);
        let mut state = ProjectProgressionState::new();
        let admin = Caller::admin("u1", "Priya");

        engine.apply_hold(&mut state, &admin, HoldStatus::Hold, now());
        assert_eq!(state.hold_status, HoldStatus::Hold);
        assert_eq!(state.activity_log.len(), 1);

        let err = engine
            .apply(&mut state, &admin, &complete_op("site_visit"), now())
            .expect_err("on hold");
        assert_eq!(err.code(), "progression_blocked");

        engine.apply_hold(&mut state, &admin, HoldStatus::Active, now());
        assert!(engine
            .apply(&mut state, &admin, &complete_op("site_visit"), now())
            .is_ok());
    }
}
