//! # Stage/Milestone Definition Registry
//!
//! The authoritative, validated definition of the pipeline: stages (groups)
//! in total order, each holding an ordered list of sub-stages. The flattened
//! list of all sub-stages (stage order, then sub-stage order) forms the
//! **progression sequence** — the sole source of truth for "what can be
//! completed next".
//!
//! Definitions are loaded once at startup (or replaced wholesale through the
//! admin operation on [`DefinitionRegistry`]) and referenced by id; they are
//! never mutated in place.

use crate::state::ProjectProgressionState;
use crate::types::{ProgressionError, StageId, SubStageId, SubStageKind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

// =============================================================================
// DEFINITIONS
// =============================================================================

/// Definition of a single sub-stage, the atomic unit of progress.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubStageDefinition {
    /// Stable identifier, unique across the entire definition set.
    pub id: SubStageId,
    /// Display label.
    pub name: String,
    /// 1-based contiguous rank within the parent stage.
    pub order: u32,
    /// Binary or percentage progression.
    pub kind: SubStageKind,
}

/// Definition of a stage (group): a top-level phase of the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageDefinition {
    /// Stable identifier.
    pub id: StageId,
    /// Display label.
    pub name: String,
    /// 1-based contiguous rank across all stages.
    pub order: u32,
    /// Ordered sub-stages; order is significant and defines sequencing.
    pub sub_stages: Vec<SubStageDefinition>,
}

// =============================================================================
// DEFINITION SET
// =============================================================================

/// A validated, immutable set of stage definitions.
///
/// Construction via [`DefinitionSet::new`] guarantees:
/// - at least one stage, and at least one sub-stage per stage
/// - sub-stage ids are globally unique
/// - stage ids are unique
/// - stage `order` and per-stage sub-stage `order` are contiguous from 1
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefinitionSet {
    stages: Vec<StageDefinition>,
}

impl DefinitionSet {
    /// Validate and construct a definition set.
    ///
    /// Stages are sorted by `order` before validation, so callers may supply
    /// them in any order.
    pub fn new(mut stages: Vec<StageDefinition>) -> Result<Self, ProgressionError> {
        if stages.is_empty() {
            return Err(ProgressionError::InvalidDefinition(
                "definition set must contain at least one stage".to_string(),
            ));
        }

        stages.sort_by_key(|s| s.order);

        let mut stage_ids = BTreeSet::new();
        let mut sub_ids = BTreeSet::new();

        for (index, stage) in stages.iter().enumerate() {
            let expected = (index as u32).saturating_add(1);
            if stage.order != expected {
                return Err(ProgressionError::InvalidDefinition(format!(
                    "stage {} has order {}, expected contiguous order {}",
                    stage.id, stage.order, expected
                )));
            }
            if !stage_ids.insert(stage.id.clone()) {
                return Err(ProgressionError::InvalidDefinition(format!(
                    "duplicate stage id {}",
                    stage.id
                )));
            }
            if stage.sub_stages.is_empty() {
                return Err(ProgressionError::InvalidDefinition(format!(
                    "stage {} has no sub-stages",
                    stage.id
                )));
            }
            for (sub_index, sub) in stage.sub_stages.iter().enumerate() {
                let expected = (sub_index as u32).saturating_add(1);
                if sub.order != expected {
                    return Err(ProgressionError::InvalidDefinition(format!(
                        "sub-stage {} has order {}, expected contiguous order {}",
                        sub.id, sub.order, expected
                    )));
                }
                if !sub_ids.insert(sub.id.clone()) {
                    return Err(ProgressionError::InvalidDefinition(format!(
                        "sub-stage id {} collides across stages",
                        sub.id
                    )));
                }
            }
        }

        Ok(Self { stages })
    }

    /// All stages in pipeline order.
    #[must_use]
    pub fn stages(&self) -> &[StageDefinition] {
        &self.stages
    }

    /// The global progression sequence: every sub-stage across all stages,
    /// in stage order then sub-stage order.
    pub fn progression_sequence(&self) -> impl Iterator<Item = &SubStageDefinition> {
        self.stages.iter().flat_map(|s| s.sub_stages.iter())
    }

    /// Total number of sub-stages across all stages.
    #[must_use]
    pub fn sequence_len(&self) -> usize {
        self.stages.iter().map(|s| s.sub_stages.len()).sum()
    }

    /// The final sub-stage of the progression sequence.
    ///
    /// Never `None` for a validated set, but the signature stays honest.
    #[must_use]
    pub fn last_sub_stage(&self) -> Option<&SubStageDefinition> {
        self.stages.last().and_then(|s| s.sub_stages.last())
    }

    /// Look up a sub-stage and its owning stage by id.
    #[must_use]
    pub fn sub_stage(&self, id: &SubStageId) -> Option<(&StageDefinition, &SubStageDefinition)> {
        self.stages.iter().find_map(|stage| {
            stage
                .sub_stages
                .iter()
                .find(|sub| &sub.id == id)
                .map(|sub| (stage, sub))
        })
    }

    /// Look up a stage by id.
    #[must_use]
    pub fn stage(&self, id: &StageId) -> Option<&StageDefinition> {
        self.stages.iter().find(|s| &s.id == id)
    }
}

// =============================================================================
// REGISTRY
// =============================================================================

/// Holds the current definition set and applies admin replacements.
///
/// The registry is versioned: each accepted replacement bumps `version`, so
/// consumers can detect definition changes without diffing.
#[derive(Debug, Clone)]
pub struct DefinitionRegistry {
    current: DefinitionSet,
    version: u64,
}

impl DefinitionRegistry {
    /// Create a registry from an initial validated set.
    #[must_use]
    pub fn new(initial: DefinitionSet) -> Self {
        Self::with_version(initial, 1)
    }

    /// Restore a registry at a known version, e.g. from persisted state.
    #[must_use]
    pub fn with_version(set: DefinitionSet, version: u64) -> Self {
        Self {
            current: set,
            version,
        }
    }

    /// The current definition set.
    #[must_use]
    pub fn current(&self) -> &DefinitionSet {
        &self.current
    }

    /// The definition version, bumped on each accepted replacement.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Replace the definition set.
    ///
    /// Destructive edits are rejected: if any supplied project state records
    /// a completed sub-stage id that the new set no longer defines, the
    /// replacement fails with `InvalidDefinition` and the old set stays in
    /// force.
    pub fn replace<'a>(
        &mut self,
        stages: Vec<StageDefinition>,
        existing_states: impl IntoIterator<Item = &'a ProjectProgressionState>,
    ) -> Result<(), ProgressionError> {
        let candidate = DefinitionSet::new(stages)?;

        let known: BTreeSet<&SubStageId> =
            candidate.progression_sequence().map(|s| &s.id).collect();
        for state in existing_states {
            if let Some(orphan) = state.completed.iter().find(|id| !known.contains(id)) {
                return Err(ProgressionError::InvalidDefinition(format!(
                    "removing sub-stage {} would orphan recorded completion state",
                    orphan
                )));
            }
        }

        self.current = candidate;
        self.version = self.version.saturating_add(1);
        Ok(())
    }
}

// =============================================================================
// DEFAULT PIPELINE
// =============================================================================

/// The built-in interior-design pipeline used by `init` and by tests.
///
/// Pre-Sales → Design → Production → Installation → Handover.
#[must_use]
pub fn default_pipeline() -> DefinitionSet {
    let stages = vec![
        StageDefinition {
            id: StageId::new("pre_sales"),
            name: "Pre-Sales".to_string(),
            order: 1,
            sub_stages: vec![
                sub(1, "site_visit", "Site Visit", SubStageKind::Binary),
                sub(
                    2,
                    "requirement_brief",
                    "Requirement Brief",
                    SubStageKind::Binary,
                ),
                sub(
                    3,
                    "quotation_shared",
                    "Quotation Shared",
                    SubStageKind::Binary,
                ),
            ],
        },
        StageDefinition {
            id: StageId::new("design"),
            name: "Design".to_string(),
            order: 2,
            sub_stages: vec![
                sub(1, "concept_design", "Concept Design", SubStageKind::Binary),
                sub(
                    2,
                    "design_presentation",
                    "Design Presentation",
                    SubStageKind::Binary,
                ),
                sub(
                    3,
                    "design_finalization",
                    "Design Finalization",
                    SubStageKind::Binary,
                ),
            ],
        },
        StageDefinition {
            id: StageId::new("production"),
            name: "Production".to_string(),
            order: 3,
            sub_stages: vec![
                sub(
                    1,
                    "material_procurement",
                    "Material Procurement",
                    SubStageKind::Percentage,
                ),
                sub(
                    2,
                    "factory_production",
                    "Factory Production",
                    SubStageKind::Percentage,
                ),
                sub(3, "quality_check", "Quality Check", SubStageKind::Binary),
            ],
        },
        StageDefinition {
            id: StageId::new("installation"),
            name: "Installation".to_string(),
            order: 4,
            sub_stages: vec![
                sub(
                    1,
                    "site_installation",
                    "Site Installation",
                    SubStageKind::Percentage,
                ),
                sub(
                    2,
                    "snag_resolution",
                    "Snag Resolution",
                    SubStageKind::Binary,
                ),
            ],
        },
        StageDefinition {
            id: StageId::new("handover"),
            name: "Handover".to_string(),
            order: 5,
            sub_stages: vec![
                sub(1, "final_handover", "Final Handover", SubStageKind::Binary),
                sub(
                    2,
                    "warranty_activation",
                    "Warranty Activation",
                    SubStageKind::Binary,
                ),
            ],
        },
    ];

    // Constructed directly: the literal satisfies every DefinitionSet
    // invariant, and a test re-runs it through full validation.
    DefinitionSet { stages }
}

fn sub(order: u32, id: &str, name: &str, kind: SubStageKind) -> SubStageDefinition {
    SubStageDefinition {
        id: SubStageId::new(id),
        name: name.to_string(),
        order,
        kind,
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ActivityAction;

    fn binary(order: u32, id: &str) -> SubStageDefinition {
        sub(order, id, id, SubStageKind::Binary)
    }

    fn stage(order: u32, id: &str, subs: Vec<SubStageDefinition>) -> StageDefinition {
        StageDefinition {
            id: StageId::new(id),
            name: id.to_string(),
            order,
            sub_stages: subs,
        }
    }

    #[test]
    fn default_pipeline_is_valid_and_ordered() {
        let defs = default_pipeline();
        assert_eq!(defs.stages().len(), 5);
        assert_eq!(defs.sequence_len(), 13);

        let first = defs.progression_sequence().next().map(|s| s.id.as_str());
        assert_eq!(first, Some("site_visit"));
        assert_eq!(
            defs.last_sub_stage().map(|s| s.id.as_str()),
            Some("warranty_activation")
        );
    }

    #[test]
    fn default_pipeline_passes_full_validation() {
        let defs = default_pipeline();
        let revalidated = DefinitionSet::new(defs.stages().to_vec()).expect("built-in is valid");
        assert_eq!(revalidated, defs);
    }

    #[test]
    fn duplicate_sub_stage_id_across_stages_rejected() {
        let stages = vec![
            stage(1, "a", vec![binary(1, "x")]),
            stage(2, "b", vec![binary(1, "x")]),
        ];
        let err = DefinitionSet::new(stages).expect_err("must reject collision");
        assert_eq!(err.code(), "invalid_definition");
    }

    #[test]
    fn non_contiguous_stage_order_rejected() {
        let stages = vec![
            stage(1, "a", vec![binary(1, "x")]),
            stage(3, "b", vec![binary(1, "y")]),
        ];
        assert!(DefinitionSet::new(stages).is_err());
    }

    #[test]
    fn non_contiguous_sub_stage_order_rejected() {
        let stages = vec![stage(1, "a", vec![binary(2, "x")])];
        assert!(DefinitionSet::new(stages).is_err());
    }

    #[test]
    fn empty_stage_rejected() {
        let stages = vec![stage(1, "a", vec![])];
        assert!(DefinitionSet::new(stages).is_err());
    }

    #[test]
    fn stages_accepted_in_any_input_order() {
        let stages = vec![
            stage(2, "b", vec![binary(1, "y")]),
            stage(1, "a", vec![binary(1, "x")]),
        ];
        let defs = DefinitionSet::new(stages).expect("valid");
        assert_eq!(defs.stages()[0].id.as_str(), "a");
    }

    #[test]
    fn sub_stage_lookup_returns_owning_stage() {
        let defs = default_pipeline();
        let (stage, sub) = defs
            .sub_stage(&SubStageId::new("factory_production"))
            .expect("defined");
        assert_eq!(stage.id.as_str(), "production");
        assert_eq!(sub.kind, SubStageKind::Percentage);
    }

    #[test]
    fn replace_rejects_orphaning_edit() {
        let mut registry = DefinitionRegistry::new(default_pipeline());
        let mut state = ProjectProgressionState::new();
        state.completed.insert(SubStageId::new("site_visit"));
        state.activity_log.push(crate::types::ActivityEntry {
            ts: chrono::Utc::now(),
            actor_id: "u1".to_string(),
            actor_name: "Test".to_string(),
            action: ActivityAction::SubStageCompleted,
            sub_stage_id: Some(SubStageId::new("site_visit")),
            details: String::new(),
        });

        // New set drops pre_sales entirely — site_visit would be orphaned.
        let stages = vec![stage(1, "design", vec![binary(1, "concept_design")])];
        let err = registry
            .replace(stages, [&state])
            .expect_err("must reject destructive edit");
        assert_eq!(err.code(), "invalid_definition");
        assert_eq!(registry.version(), 1);
        assert_eq!(registry.current().stages().len(), 5);
    }

    #[test]
    fn replace_accepts_additive_edit_and_bumps_version() {
        let mut registry = DefinitionRegistry::new(default_pipeline());
        let mut stages = default_pipeline().stages().to_vec();
        stages.push(stage(6, "warranty", vec![binary(1, "warranty_review")]));

        registry.replace(stages, []).expect("additive edit ok");
        assert_eq!(registry.version(), 2);
        assert_eq!(registry.current().stages().len(), 6);
    }
}
