//! # Persistence
//!
//! Durable home of per-project progression records and the definition set.
//! Every backend provides optimistic concurrency: `save` is a compare-and-set
//! on the record's revision, so the service's read-validate-write sequence is
//! effectively atomic per project. Projects are fully independent.

pub mod redb_store;

pub use redb_store::RedbStore;

use crate::definitions::DefinitionSet;
use crate::state::ProjectProgressionState;
use crate::types::{ProgressionError, ProjectId};
use std::collections::BTreeMap;

// =============================================================================
// STORE TRAIT
// =============================================================================

/// Storage contract for progression records and definitions.
pub trait ProgressionStore {
    /// Insert the initial record for a project entering the pipeline.
    /// Fails with `Conflict` if a record already exists.
    fn create(
        &mut self,
        project: &ProjectId,
        state: &ProjectProgressionState,
    ) -> Result<(), ProgressionError>;

    /// Load a project's record. Fails with `NotFound` if unknown.
    fn load(&self, project: &ProjectId) -> Result<ProjectProgressionState, ProgressionError>;

    /// Compare-and-set write: persists `state` only if the stored record's
    /// revision still equals `expected_revision`; otherwise `Conflict`.
    fn save(
        &mut self,
        project: &ProjectId,
        state: &ProjectProgressionState,
        expected_revision: u64,
    ) -> Result<(), ProgressionError>;

    /// All known project ids, in deterministic order.
    fn list_projects(&self) -> Result<Vec<ProjectId>, ProgressionError>;

    /// Persist the definition set and its registry version.
    fn save_definitions(
        &mut self,
        defs: &DefinitionSet,
        version: u64,
    ) -> Result<(), ProgressionError>;

    /// Load the persisted definition set, if one was ever saved.
    fn load_definitions(&self) -> Result<Option<(DefinitionSet, u64)>, ProgressionError>;
}

// =============================================================================
// MEMORY STORE
// =============================================================================

/// In-memory backend for tests and ephemeral servers.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: BTreeMap<ProjectId, ProjectProgressionState>,
    definitions: Option<(DefinitionSet, u64)>,
}

impl MemoryStore {
    /// An empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProgressionStore for MemoryStore {
    fn create(
        &mut self,
        project: &ProjectId,
        state: &ProjectProgressionState,
    ) -> Result<(), ProgressionError> {
        if let Some(existing) = self.records.get(project) {
            // Creation expects no record; report the stored revision.
            return Err(ProgressionError::Conflict {
                expected: 0,
                actual: existing.revision,
            });
        }
        self.records.insert(project.clone(), state.clone());
        Ok(())
    }

    fn load(&self, project: &ProjectId) -> Result<ProjectProgressionState, ProgressionError> {
        self.records
            .get(project)
            .cloned()
            .ok_or_else(|| ProgressionError::NotFound(format!("project {project}")))
    }

    fn save(
        &mut self,
        project: &ProjectId,
        state: &ProjectProgressionState,
        expected_revision: u64,
    ) -> Result<(), ProgressionError> {
        let existing = self
            .records
            .get(project)
            .ok_or_else(|| ProgressionError::NotFound(format!("project {project}")))?;
        if existing.revision != expected_revision {
            return Err(ProgressionError::Conflict {
                expected: expected_revision,
                actual: existing.revision,
            });
        }
        self.records.insert(project.clone(), state.clone());
        Ok(())
    }

    fn list_projects(&self) -> Result<Vec<ProjectId>, ProgressionError> {
        Ok(self.records.keys().cloned().collect())
    }

    fn save_definitions(
        &mut self,
        defs: &DefinitionSet,
        version: u64,
    ) -> Result<(), ProgressionError> {
        self.definitions = Some((defs.clone(), version));
        Ok(())
    }

    fn load_definitions(&self) -> Result<Option<(DefinitionSet, u64)>, ProgressionError> {
        Ok(self.definitions.clone())
    }
}

// =============================================================================
// BACKEND SELECTION
// =============================================================================

/// The two storage backends the service can run on.
pub enum StorageBackend {
    /// Ephemeral, for tests and `--backend memory`.
    InMemory(MemoryStore),
    /// Durable redb database, the default.
    Persistent(RedbStore),
}

impl ProgressionStore for StorageBackend {
    fn create(
        &mut self,
        project: &ProjectId,
        state: &ProjectProgressionState,
    ) -> Result<(), ProgressionError> {
        match self {
            StorageBackend::InMemory(s) => s.create(project, state),
            StorageBackend::Persistent(s) => s.create(project, state),
        }
    }

    fn load(&self, project: &ProjectId) -> Result<ProjectProgressionState, ProgressionError> {
        match self {
            StorageBackend::InMemory(s) => s.load(project),
            StorageBackend::Persistent(s) => s.load(project),
        }
    }

    fn save(
        &mut self,
        project: &ProjectId,
        state: &ProjectProgressionState,
        expected_revision: u64,
    ) -> Result<(), ProgressionError> {
        match self {
            StorageBackend::InMemory(s) => s.save(project, state, expected_revision),
            StorageBackend::Persistent(s) => s.save(project, state, expected_revision),
        }
    }

    fn list_projects(&self) -> Result<Vec<ProjectId>, ProgressionError> {
        match self {
            StorageBackend::InMemory(s) => s.list_projects(),
            StorageBackend::Persistent(s) => s.list_projects(),
        }
    }

    fn save_definitions(
        &mut self,
        defs: &DefinitionSet,
        version: u64,
    ) -> Result<(), ProgressionError> {
        match self {
            StorageBackend::InMemory(s) => s.save_definitions(defs, version),
            StorageBackend::Persistent(s) => s.save_definitions(defs, version),
        }
    }

    fn load_definitions(&self) -> Result<Option<(DefinitionSet, u64)>, ProgressionError> {
        match self {
            StorageBackend::InMemory(s) => s.load_definitions(),
            StorageBackend::Persistent(s) => s.load_definitions(),
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definitions::default_pipeline;

    #[test]
    fn create_then_load_round_trips() {
        let mut store = MemoryStore::new();
        let project = ProjectId::new("villa-101");
        let state = ProjectProgressionState::new();

        store.create(&project, &state).expect("first create");
        assert_eq!(store.load(&project).expect("exists"), state);

        let err = store.create(&project, &state).expect_err("duplicate");
        assert_eq!(err.code(), "conflict");
    }

    #[test]
    fn load_unknown_project_is_not_found() {
        let store = MemoryStore::new();
        let err = store
            .load(&ProjectId::new("ghost"))
            .expect_err("unknown project");
        assert_eq!(err.code(), "not_found");
    }

    #[test]
    fn save_enforces_revision_cas() {
        let mut store = MemoryStore::new();
        let project = ProjectId::new("villa-101");
        let mut state = ProjectProgressionState::new();
        store.create(&project, &state).expect("create");

        // Writer A commits against revision 0.
        state.revision = 1;
        store.save(&project, &state, 0).expect("first writer wins");

        // Writer B also read revision 0; its save must fail.
        let err = store
            .save(&project, &state, 0)
            .expect_err("stale revision");
        assert_eq!(err.code(), "conflict");
    }

    #[test]
    fn definitions_persist_with_version() {
        let mut store = MemoryStore::new();
        assert!(store.load_definitions().expect("readable").is_none());

        let defs = default_pipeline();
        store.save_definitions(&defs, 3).expect("save");
        let (loaded, version) = store
            .load_definitions()
            .expect("readable")
            .expect("present");
        assert_eq!(loaded, defs);
        assert_eq!(version, 3);
    }

    #[test]
    fn list_projects_is_sorted() {
        let mut store = MemoryStore::new();
        let state = ProjectProgressionState::new();
        store
            .create(&ProjectId::new("b"), &state)
            .expect("create b");
        store
            .create(&ProjectId::new("a"), &state)
            .expect("create a");

        let ids: Vec<String> = store
            .list_projects()
            .expect("listable")
            .into_iter()
            .map(|p| p.0)
            .collect();
        assert_eq!(ids, vec!["a".to_string(), "b".to_string()]);
    }
}
