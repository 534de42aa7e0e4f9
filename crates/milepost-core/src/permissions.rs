//! # Caller Identity & Permissions
//!
//! The engine does not authenticate anyone; an external identity provider
//! supplies a [`Caller`] per request. The engine only checks the
//! group-scoped permission string `milestones.update.<stage_id>`, with
//! `Admin` bypassing the scope check (but never the hold check).

use crate::types::StageId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Permission scope gating administrative operations (hold changes,
/// definition replacement). Only the `Admin` role carries it.
pub const ADMIN_SCOPE: &str = "milestones.admin";

/// Role of the caller as asserted by the identity provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// May mutate any stage and perform administrative operations.
    Admin,
    /// May mutate only stages covered by an explicit permission grant.
    Member,
}

/// Identity and permission set of the caller of a mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Caller {
    /// Stable actor identifier, recorded in the activity log.
    pub actor_id: String,
    /// Display name, recorded in the activity log.
    pub actor_name: String,
    /// Asserted role.
    pub role: Role,
    /// Permission strings, e.g. `milestones.update.production`.
    pub permissions: BTreeSet<String>,
}

impl Caller {
    /// Construct a caller with an explicit permission set.
    #[must_use]
    pub fn new(
        actor_id: impl Into<String>,
        actor_name: impl Into<String>,
        role: Role,
        permissions: BTreeSet<String>,
    ) -> Self {
        Self {
            actor_id: actor_id.into(),
            actor_name: actor_name.into(),
            role,
            permissions,
        }
    }

    /// An admin caller, used by the CLI and by administrative operations.
    #[must_use]
    pub fn admin(actor_id: impl Into<String>, actor_name: impl Into<String>) -> Self {
        Self::new(actor_id, actor_name, Role::Admin, BTreeSet::new())
    }

    /// Whether the caller is an administrator.
    #[must_use]
    pub fn is_admin(&self) -> bool {
        matches!(self.role, Role::Admin)
    }

    /// The permission string gating mutations of the given stage.
    #[must_use]
    pub fn stage_permission(stage: &StageId) -> String {
        format!("milestones.update.{}", stage)
    }

    /// Whether the caller may mutate sub-stages of the given stage.
    #[must_use]
    pub fn may_update_stage(&self, stage: &StageId) -> bool {
        self.is_admin() || self.permissions.contains(&Self::stage_permission(stage))
    }
}

// =============================================================================
// TESTS
// =============================================================================
