//! # redb-backed Progression Store
//!
//! Durable backend using the redb embedded database, giving:
//! - ACID transactions
//! - Crash safety (copy-on-write B-trees)
//! - MVCC (concurrent readers, single writer)
//! - Zero configuration
//!
//! Records are postcard-encoded documents keyed by project id. The
//! revision compare-and-set runs inside a single write transaction, so a
//! stale writer can never clobber a committed record.

use crate::definitions::DefinitionSet;
use crate::state::ProjectProgressionState;
use crate::store::ProgressionStore;
use crate::types::{ProgressionError, ProjectId};
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Table for progression records: project id -> postcard-encoded state.
const PROGRESSION: TableDefinition<&str, &[u8]> = TableDefinition::new("progression");

/// Table for the definition set: fixed key "current" -> postcard document.
const DEFINITIONS: TableDefinition<&str, &[u8]> = TableDefinition::new("definitions");

/// Persisted wrapper pairing the definition set with its registry version.
#[derive(Serialize, Deserialize)]
struct StoredDefinitions {
    version: u64,
    set: DefinitionSet,
}

/// A disk-backed progression store.
pub struct RedbStore {
    db: Database,
}

impl std::fmt::Debug for RedbStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbStore").finish_non_exhaustive()
    }
}

impl RedbStore {
    /// Open or create a database at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ProgressionError> {
        let db = Database::create(path.as_ref())
            .map_err(|e| ProgressionError::Storage(e.to_string()))?;

        // Initialize tables if they don't exist
        {
            let write_txn = db
                .begin_write()
                .map_err(|e| ProgressionError::Storage(e.to_string()))?;
            let _ = write_txn
                .open_table(PROGRESSION)
                .map_err(|e| ProgressionError::Storage(e.to_string()))?;
            let _ = write_txn
                .open_table(DEFINITIONS)
                .map_err(|e| ProgressionError::Storage(e.to_string()))?;
            write_txn
                .commit()
                .map_err(|e| ProgressionError::Storage(e.to_string()))?;
        }

        Ok(Self { db })
    }
}

impl ProgressionStore for RedbStore {
    fn create(
        &mut self,
        project: &ProjectId,
        state: &ProjectProgressionState,
    ) -> Result<(), ProgressionError> {
        let write_txn = self
            .db
            .begin_write()
            .map_err(|e| ProgressionError::Storage(e.to_string()))?;
        {
            let mut table = write_txn
                .open_table(PROGRESSION)
                .map_err(|e| ProgressionError::Storage(e.to_string()))?;

            if let Some(bytes) = table
                .get(project.as_str())
                .map_err(|e| ProgressionError::Storage(e.to_string()))?
            {
                let stored: ProjectProgressionState = postcard::from_bytes(bytes.value())
                    .map_err(|e| ProgressionError::Storage(e.to_string()))?;
                return Err(ProgressionError::Conflict {
                    expected: 0,
                    actual: stored.revision,
                });
            }

            let bytes = postcard::to_allocvec(state)
                .map_err(|e| ProgressionError::Storage(e.to_string()))?;
            table
                .insert(project.as_str(), bytes.as_slice())
                .map_err(|e| ProgressionError::Storage(e.to_string()))?;
        }
        write_txn
            .commit()
            .map_err(|e| ProgressionError::Storage(e.to_string()))
    }

    fn load(&self, project: &ProjectId) -> Result<ProjectProgressionState, ProgressionError> {
        let read_txn = self
            .db
            .begin_read()
            .map_err(|e| ProgressionError::Storage(e.to_string()))?;
        let table = read_txn
            .open_table(PROGRESSION)
            .map_err(|e| ProgressionError::Storage(e.to_string()))?;

        let bytes = table
            .get(project.as_str())
            .map_err(|e| ProgressionError::Storage(e.to_string()))?
            .ok_or_else(|| ProgressionError::NotFound(format!("project {project}")))?;
        postcard::from_bytes(bytes.value()).map_err(|e| ProgressionError::Storage(e.to_string()))
    }

    fn save(
        &mut self,
        project: &ProjectId,
        state: &ProjectProgressionState,
        expected_revision: u64,
    ) -> Result<(), ProgressionError> {
        let write_txn = self
            .db
            .begin_write()
            .map_err(|e| ProgressionError::Storage(e.to_string()))?;
        {
            let mut table = write_txn
                .open_table(PROGRESSION)
                .map_err(|e| ProgressionError::Storage(e.to_string()))?;

            // Compare-and-set inside the write transaction.
            let stored_revision = {
                let existing = table
                    .get(project.as_str())
                    .map_err(|e| ProgressionError::Storage(e.to_string()))?
                    .ok_or_else(|| ProgressionError::NotFound(format!("project {project}")))?;
                let stored: ProjectProgressionState = postcard::from_bytes(existing.value())
                    .map_err(|e| ProgressionError::Storage(e.to_string()))?;
                stored.revision
            };
            if stored_revision != expected_revision {
                return Err(ProgressionError::Conflict {
                    expected: expected_revision,
                    actual: stored_revision,
                });
            }

            let bytes = postcard::to_allocvec(state)
                .map_err(|e| ProgressionError::Storage(e.to_string()))?;
            table
                .insert(project.as_str(), bytes.as_slice())
                .map_err(|e| ProgressionError::Storage(e.to_string()))?;
        }
        write_txn
            .commit()
            .map_err(|e| ProgressionError::Storage(e.to_string()))
    }

    fn list_projects(&self) -> Result<Vec<ProjectId>, ProgressionError> {
        let read_txn = self
            .db
            .begin_read()
            .map_err(|e| ProgressionError::Storage(e.to_string()))?;
        let table = read_txn
            .open_table(PROGRESSION)
            .map_err(|e| ProgressionError::Storage(e.to_string()))?;

        let mut projects = Vec::new();
        for entry in table
            .iter()
            .map_err(|e| ProgressionError::Storage(e.to_string()))?
        {
            let (key, _) = entry.map_err(|e| ProgressionError::Storage(e.to_string()))?;
            projects.push(ProjectId::new(key.value()));
        }
        Ok(projects)
    }

    fn save_definitions(
        &mut self,
        defs: &DefinitionSet,
        version: u64,
    ) -> Result<(), ProgressionError> {
        let document = StoredDefinitions {
            version,
            set: defs.clone(),
        };
        let bytes = postcard::to_allocvec(&document)
            .map_err(|e| ProgressionError::Storage(e.to_string()))?;

        let write_txn = self
            .db
            .begin_write()
            .map_err(|e| ProgressionError::Storage(e.to_string()))?;
        {
            let mut table = write_txn
                .open_table(DEFINITIONS)
                .map_err(|e| ProgressionError::Storage(e.to_string()))?;
            table
                .insert("current", bytes.as_slice())
                .map_err(|e| ProgressionError::Storage(e.to_string()))?;
        }
        write_txn
            .commit()
            .map_err(|e| ProgressionError::Storage(e.to_string()))
    }

    fn load_definitions(&self) -> Result<Option<(DefinitionSet, u64)>, ProgressionError> {
        let read_txn = self
            .db
            .begin_read()
            .map_err(|e| ProgressionError::Storage(e.to_string()))?;
        let table = read_txn
            .open_table(DEFINITIONS)
            .map_err(|e| ProgressionError::Storage(e.to_string()))?;

        let Some(bytes) = table
            .get("current")
            .map_err(|e| ProgressionError::Storage(e.to_string()))?
        else {
            return Ok(None);
        };
        let document: StoredDefinitions = postcard::from_bytes(bytes.value())
            .map_err(|e| ProgressionError::Storage(e.to_string()))?;
        Ok(Some((document.set, document.version)))
    }
}

// =============================================================================
// TESTS
// =============================================================================
