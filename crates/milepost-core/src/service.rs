//! # Progression Service
//!
//! The read-validate-write front door the API and CLI consume. Binds the
//! definition registry to a storage backend and drives every mutation through
//! the transition engine, with optimistic concurrency on the way back out:
//! the store's compare-and-set rejects a save if another writer committed
//! first, and callers may additionally pin the revision they based their
//! request on.

use crate::definitions::{default_pipeline, DefinitionRegistry, DefinitionSet, StageDefinition};
use crate::engine::TransitionEngine;
use crate::permissions::{Caller, ADMIN_SCOPE};
use crate::progress::{progression_view, ProgressionView};
use crate::state::ProjectProgressionState;
use crate::store::{ProgressionStore, StorageBackend};
use crate::types::{
    ActivityAction, ActivityEntry, HoldStatus, Operation, ProgressionError, ProjectId, SubStageId,
};
use serde::{Deserialize, Serialize};

/// Everything a consumer needs to render one project after a read or a
/// successful mutation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    /// The project.
    pub project: ProjectId,
    /// Derived progression view.
    pub view: ProgressionView,
    /// Full audit trail, in durable-commit order.
    pub activity: Vec<ActivityEntry>,
}

/// Service combining definitions, engine, and storage.
pub struct ProgressionService {
    registry: DefinitionRegistry,
    store: StorageBackend,
}

impl ProgressionService {
    /// Open a service on the given backend.
    ///
    /// Definitions persisted in the store take precedence; otherwise the
    /// built-in pipeline is used (without writing it back — `init` does that
    /// explicitly).
    pub fn open(store: StorageBackend) -> Result<Self, ProgressionError> {
        let registry = match store.load_definitions()? {
            Some((set, version)) => DefinitionRegistry::with_version(set, version),
            None => DefinitionRegistry::new(default_pipeline()),
        };
        Ok(Self { registry, store })
    }

    /// The current definition set.
    #[must_use]
    pub fn definitions(&self) -> &DefinitionSet {
        self.registry.current()
    }

    /// The definition registry version.
    #[must_use]
    pub fn definitions_version(&self) -> u64 {
        self.registry.version()
    }

    /// Persist the built-in pipeline as the stored definition set.
    ///
    /// Refuses to overwrite previously persisted definitions unless `force`.
    pub fn init_definitions(&mut self, force: bool) -> Result<(), ProgressionError> {
        if !force && self.store.load_definitions()?.is_some() {
            return Err(ProgressionError::InvalidDefinition(
                "definitions already initialized (use force to overwrite)".to_string(),
            ));
        }
        self.registry = DefinitionRegistry::new(default_pipeline());
        self.store
            .save_definitions(self.registry.current(), self.registry.version())
    }

    /// All known project ids.
    pub fn list_projects(&self) -> Result<Vec<ProjectId>, ProgressionError> {
        self.store.list_projects()
    }

    /// Current snapshot of one project.
    pub fn snapshot(&self, project: &ProjectId) -> Result<Snapshot, ProgressionError> {
        let state = self.store.load(project)?;
        Ok(self.snapshot_of(project, &state))
    }

    /// Create the empty progression record for a project entering the
    /// pipeline. Fails with `Conflict` if the project already has one.
    pub fn create_project(
        &mut self,
        project: &ProjectId,
        caller: &Caller,
    ) -> Result<Snapshot, ProgressionError> {
        let mut state = ProjectProgressionState::new();
        state.activity_log.push(ActivityEntry {
            ts: chrono::Utc::now(),
            actor_id: caller.actor_id.clone(),
            actor_name: caller.actor_name.clone(),
            action: ActivityAction::ProjectCreated,
            sub_stage_id: None,
            details: format!("project {project} entered the pipeline"),
        });
        self.store.create(project, &state)?;
        Ok(self.snapshot_of(project, &state))
    }

    /// Mark a binary sub-stage complete.
    pub fn complete(
        &mut self,
        project: &ProjectId,
        caller: &Caller,
        sub_stage: SubStageId,
        expected_revision: Option<u64>,
    ) -> Result<Snapshot, ProgressionError> {
        self.mutate(
            project,
            caller,
            &Operation::CompleteSubStage { id: sub_stage },
            expected_revision,
        )
    }

    /// Advance a percentage sub-stage; 100 auto-completes it.
    pub fn set_percentage(
        &mut self,
        project: &ProjectId,
        caller: &Caller,
        sub_stage: SubStageId,
        value: u8,
        comment: Option<String>,
        expected_revision: Option<u64>,
    ) -> Result<Snapshot, ProgressionError> {
        self.mutate(
            project,
            caller,
            &Operation::UpdatePercentage {
                id: sub_stage,
                value,
                comment,
            },
            expected_revision,
        )
    }

    /// Change a project's hold status. Admin only.
    pub fn set_hold(
        &mut self,
        project: &ProjectId,
        caller: &Caller,
        status: HoldStatus,
    ) -> Result<Snapshot, ProgressionError> {
        if !caller.is_admin() {
            return Err(ProgressionError::Forbidden {
                scope: ADMIN_SCOPE.to_string(),
            });
        }

        let mut state = self.store.load(project)?;
        let base_revision = state.revision;
        let engine = TransitionEngine::new(self.registry.current());
        engine.apply_hold(&mut state, caller, status, chrono::Utc::now());
        self.store.save(project, &state, base_revision)?;
        Ok(self.snapshot_of(project, &state))
    }

    /// Replace the definition set. Admin only; destructive edits that would
    /// orphan recorded completion state are rejected.
    pub fn replace_definitions(
        &mut self,
        caller: &Caller,
        stages: Vec<StageDefinition>,
    ) -> Result<u64, ProgressionError> {
        if !caller.is_admin() {
            return Err(ProgressionError::Forbidden {
                scope: ADMIN_SCOPE.to_string(),
            });
        }

        let mut states = Vec::new();
        for project in self.store.list_projects()? {
            states.push(self.store.load(&project)?);
        }
        self.registry.replace(stages, states.iter())?;
        self.store
            .save_definitions(self.registry.current(), self.registry.version())?;
        Ok(self.registry.version())
    }

    fn mutate(
        &mut self,
        project: &ProjectId,
        caller: &Caller,
        op: &Operation,
        expected_revision: Option<u64>,
    ) -> Result<Snapshot, ProgressionError> {
        let mut state = self.store.load(project)?;

        // A caller that pins the revision it read loses to any writer that
        // committed since, before validation even runs.
        if let Some(expected) = expected_revision {
            if expected != state.revision {
                return Err(ProgressionError::Conflict {
                    expected,
                    actual: state.revision,
                });
            }
        }

        let base_revision = state.revision;
        let engine = TransitionEngine::new(self.registry.current());
        engine.apply(&mut state, caller, op, chrono::Utc::now())?;
        self.store.save(project, &state, base_revision)?;
        Ok(self.snapshot_of(project, &state))
    }

    fn snapshot_of(&self, project: &ProjectId, state: &ProjectProgressionState) -> Snapshot {
        Snapshot {
            project: project.clone(),
            view: progression_view(self.registry.current(), state),
            activity: state.activity_log.clone(),
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
