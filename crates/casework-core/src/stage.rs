//! Stage engine: the eight-step investigation state machine.
//!
//! `advance` is a pure function of `(stage, StageContext)`. On any failure the
//! case stays where it is; on success it moves to the next stage of the
//! active investigation variant, or to `completed` past the last one.

use crate::error::{check_range, CaseworkError, Result};
use crate::types::{InvestigationVariant, QualityGate, Stage};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Minimum evidence/context completeness for leaving intake.
pub const INTAKE_COMPLETENESS_MIN: f64 = 80.0;
/// Minimum team consensus for leaving team review.
pub const TEAM_CONSENSUS_MIN: f64 = 90.0;

// ---------------------------------------------------------------------------
// Stage definitions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StagePredicate {
    IntakeCompleteness,
    ValidationResultsPresent,
    HypothesesPresent,
    TeamConsensus,
}

#[derive(Debug, Clone, Serialize)]
pub struct StageDefinition {
    pub stage: Stage,
    pub required_tasks: &'static [&'static str],
    pub gate: QualityGate,
    pub predicates: &'static [StagePredicate],
}

const DEFINITIONS: &[StageDefinition] = &[
    StageDefinition {
        stage: Stage::EvidenceIntake,
        required_tasks: &[
            "collect_evidence",
            "catalog_sources",
            "verify_chain_of_custody",
        ],
        gate: QualityGate::Basic,
        predicates: &[StagePredicate::IntakeCompleteness],
    },
    StageDefinition {
        stage: Stage::InitialAnalysis,
        required_tasks: &["preliminary_profile", "identify_patterns"],
        gate: QualityGate::Basic,
        predicates: &[],
    },
    StageDefinition {
        stage: Stage::CrossValidation,
        required_tasks: &["cross_check_findings", "resolve_discrepancies"],
        gate: QualityGate::Standard,
        predicates: &[StagePredicate::ValidationResultsPresent],
    },
    StageDefinition {
        stage: Stage::Synthesis,
        required_tasks: &["merge_findings", "build_timeline"],
        gate: QualityGate::Standard,
        predicates: &[],
    },
    StageDefinition {
        stage: Stage::HypothesisFormation,
        required_tasks: &["draft_hypotheses", "rank_hypotheses"],
        gate: QualityGate::Standard,
        predicates: &[StagePredicate::HypothesesPresent],
    },
    StageDefinition {
        stage: Stage::TeamReview,
        required_tasks: &["peer_review", "collect_votes"],
        gate: QualityGate::Rigorous,
        predicates: &[StagePredicate::TeamConsensus],
    },
    StageDefinition {
        stage: Stage::FinalAssessment,
        required_tasks: &["write_conclusion", "assess_confidence"],
        gate: QualityGate::Rigorous,
        predicates: &[],
    },
    StageDefinition {
        stage: Stage::ArchivalCommit,
        required_tasks: &["archive_records"],
        gate: QualityGate::Basic,
        predicates: &[],
    },
];

const RAPID_SEQUENCE: &[Stage] = &[
    Stage::EvidenceIntake,
    Stage::InitialAnalysis,
    Stage::Synthesis,
    Stage::HypothesisFormation,
    Stage::FinalAssessment,
    Stage::ArchivalCommit,
];

// ---------------------------------------------------------------------------
// Inputs / outputs
// ---------------------------------------------------------------------------

/// What the caller knows about the current stage when asking to advance.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StageContext {
    #[serde(default)]
    pub completed_tasks: Vec<String>,
    /// Confidence for the current stage, `[0, 100]`.
    #[serde(default)]
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_completeness: Option<f64>,
    #[serde(default)]
    pub validation_results: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team_consensus: Option<f64>,
    #[serde(default)]
    pub hypotheses: Vec<String>,
    #[serde(default)]
    pub variant: InvestigationVariant,
}

/// Where a case goes after a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextStage {
    At(Stage),
    Completed,
}

impl NextStage {
    pub fn as_str(self) -> &'static str {
        match self {
            NextStage::At(stage) => stage.as_str(),
            NextStage::Completed => "completed",
        }
    }

    pub fn stage(self) -> Option<Stage> {
        match self {
            NextStage::At(stage) => Some(stage),
            NextStage::Completed => None,
        }
    }
}

impl fmt::Display for NextStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for NextStage {
    fn serialize<S: Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        s.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for NextStage {
    fn deserialize<D: Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(d)?;
        if raw == "completed" {
            return Ok(NextStage::Completed);
        }
        raw.parse::<Stage>()
            .map(NextStage::At)
            .map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdvanceStatus {
    Completed,
    Failed,
    NeedsRefinement,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StageError {
    MissingTasks { tasks: Vec<String> },
    ConfidenceBelowGate { confidence: f64, required: f64, gate: String },
    PredicateFailed { predicate: String, detail: String },
}

impl fmt::Display for StageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageError::MissingTasks { tasks } => {
                write!(f, "missing required tasks: {}", tasks.join(", "))
            }
            StageError::ConfidenceBelowGate {
                confidence,
                required,
                gate,
            } => write!(
                f,
                "confidence {confidence} below {gate} quality gate ({required})"
            ),
            StageError::PredicateFailed { predicate, detail } => {
                write!(f, "{predicate}: {detail}")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdvanceResult {
    pub next_stage: NextStage,
    pub status: AdvanceStatus,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<StageError>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub requires_refinement: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkipDecision {
    pub allowed: bool,
    pub reason: String,
}

// ---------------------------------------------------------------------------
// StageEngine
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default)]
pub struct StageEngine;

impl StageEngine {
    pub fn new() -> Self {
        Self
    }

    pub fn definition(&self, stage: Stage) -> &'static StageDefinition {
        &DEFINITIONS[stage.index()]
    }

    pub fn sequence(&self, variant: InvestigationVariant) -> &'static [Stage] {
        match variant {
            InvestigationVariant::Rapid => RAPID_SEQUENCE,
            InvestigationVariant::Standard | InvestigationVariant::Comprehensive => Stage::all(),
        }
    }

    /// The stage after `stage` in the variant's sequence.
    ///
    /// A stage the variant skips (e.g. cross-validation under `rapid`) still
    /// resolves to the first sequenced stage after it.
    pub fn natural_next(&self, stage: Stage, variant: InvestigationVariant) -> NextStage {
        self.sequence(variant)
            .iter()
            .copied()
            .find(|s| *s > stage)
            .map(NextStage::At)
            .unwrap_or(NextStage::Completed)
    }

    pub fn advance(&self, stage: Stage, ctx: &StageContext) -> Result<AdvanceResult> {
        check_range(ctx.confidence, 0.0, 100.0)?;
        for value in [ctx.context_completeness, ctx.team_consensus]
            .into_iter()
            .flatten()
        {
            check_range(value, 0.0, 100.0)?;
        }

        let def = self.definition(stage);
        let mut errors = Vec::new();
        let mut requires_refinement = false;

        let missing: Vec<String> = def
            .required_tasks
            .iter()
            .filter(|t| !ctx.completed_tasks.iter().any(|done| done == *t))
            .map(|t| t.to_string())
            .collect();
        if !missing.is_empty() {
            errors.push(StageError::MissingTasks { tasks: missing });
        }

        for predicate in def.predicates {
            if let Some(err) = check_predicate(*predicate, ctx) {
                if *predicate == StagePredicate::IntakeCompleteness {
                    requires_refinement = true;
                }
                errors.push(err);
            }
        }

        let required = def.gate.threshold();
        if ctx.confidence < required {
            errors.push(StageError::ConfidenceBelowGate {
                confidence: ctx.confidence,
                required,
                gate: def.gate.to_string(),
            });
        }

        if errors.is_empty() {
            return Ok(AdvanceResult {
                next_stage: self.natural_next(stage, ctx.variant),
                status: AdvanceStatus::Completed,
                errors,
                requires_refinement: false,
            });
        }

        let status = if requires_refinement {
            AdvanceStatus::NeedsRefinement
        } else {
            AdvanceStatus::Failed
        };
        Ok(AdvanceResult {
            next_stage: NextStage::At(stage),
            status,
            errors,
            requires_refinement,
        })
    }

    pub fn can_skip_to(&self, current: Stage, target: Stage, ctx: &StageContext) -> SkipDecision {
        if target <= current {
            return SkipDecision {
                allowed: false,
                reason: format!("cannot skip backward from {current} to {target}"),
            };
        }
        if ctx.variant != InvestigationVariant::Rapid {
            // The current stage counts: jumping away from it leaves it unfinished.
            let bypassed: Vec<&str> = Stage::all()
                .iter()
                .filter(|s| **s >= current && **s < target && s.is_critical())
                .map(|s| s.as_str())
                .collect();
            if !bypassed.is_empty() {
                return SkipDecision {
                    allowed: false,
                    reason: format!(
                        "critical stage(s) {} cannot be skipped in a {} investigation",
                        bypassed.join(", "),
                        ctx.variant
                    ),
                };
            }
        }
        SkipDecision {
            allowed: true,
            reason: format!("skip from {current} to {target} permitted"),
        }
    }
}

fn check_predicate(predicate: StagePredicate, ctx: &StageContext) -> Option<StageError> {
    let failed = |detail: String| {
        Some(StageError::PredicateFailed {
            predicate: predicate_name(predicate).to_string(),
            detail,
        })
    };
    match predicate {
        StagePredicate::IntakeCompleteness => {
            let completeness = ctx.context_completeness.unwrap_or(0.0);
            if completeness < INTAKE_COMPLETENESS_MIN {
                return failed(format!(
                    "context completeness {completeness} below {INTAKE_COMPLETENESS_MIN}"
                ));
            }
            None
        }
        StagePredicate::ValidationResultsPresent => {
            if ctx.validation_results.is_empty() {
                return failed("no validation results recorded".to_string());
            }
            None
        }
        StagePredicate::HypothesesPresent => {
            if ctx.hypotheses.is_empty() {
                return failed("no hypotheses drafted".to_string());
            }
            None
        }
        StagePredicate::TeamConsensus => {
            let consensus = ctx.team_consensus.unwrap_or(0.0);
            if consensus < TEAM_CONSENSUS_MIN {
                return failed(format!(
                    "team consensus {consensus}% below {TEAM_CONSENSUS_MIN}%"
                ));
            }
            None
        }
    }
}

fn predicate_name(predicate: StagePredicate) -> &'static str {
    match predicate {
        StagePredicate::IntakeCompleteness => "intake_completeness",
        StagePredicate::ValidationResultsPresent => "validation_results",
        StagePredicate::HypothesesPresent => "hypotheses",
        StagePredicate::TeamConsensus => "team_consensus",
    }
}

impl std::str::FromStr for NextStage {
    type Err = CaseworkError;

    fn from_str(s: &str) -> Result<Self> {
        if s == "completed" {
            return Ok(NextStage::Completed);
        }
        s.parse().map(NextStage::At)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn intake_ctx(confidence: f64, completeness: f64) -> StageContext {
        StageContext {
            completed_tasks: vec![
                "collect_evidence".to_string(),
                "catalog_sources".to_string(),
                "verify_chain_of_custody".to_string(),
            ],
            confidence,
            context_completeness: Some(completeness),
            ..Default::default()
        }
    }

    fn all_tasks(stage: Stage) -> Vec<String> {
        StageEngine::new()
            .definition(stage)
            .required_tasks
            .iter()
            .map(|t| t.to_string())
            .collect()
    }

    #[test]
    fn intake_advances_when_complete() {
        let result = StageEngine::new()
            .advance(Stage::EvidenceIntake, &intake_ctx(65.0, 85.0))
            .unwrap();
        assert_eq!(result.status, AdvanceStatus::Completed);
        assert_eq!(result.next_stage, NextStage::At(Stage::InitialAnalysis));
        assert!(result.errors.is_empty());
        assert!(!result.requires_refinement);

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["next_stage"], "initial_analysis");
        assert_eq!(json["status"], "completed");
    }

    #[test]
    fn intake_low_completeness_needs_refinement() {
        let result = StageEngine::new()
            .advance(Stage::EvidenceIntake, &intake_ctx(65.0, 75.0))
            .unwrap();
        assert_eq!(result.status, AdvanceStatus::NeedsRefinement);
        assert!(result.requires_refinement);
        assert_eq!(result.next_stage, NextStage::At(Stage::EvidenceIntake));
    }

    #[test]
    fn missing_tasks_listed_in_definition_order() {
        let ctx = StageContext {
            completed_tasks: vec!["catalog_sources".to_string()],
            confidence: 90.0,
            context_completeness: Some(90.0),
            ..Default::default()
        };
        let result = StageEngine::new()
            .advance(Stage::EvidenceIntake, &ctx)
            .unwrap();
        assert_eq!(result.status, AdvanceStatus::Failed);
        assert_eq!(
            result.errors[0],
            StageError::MissingTasks {
                tasks: vec![
                    "collect_evidence".to_string(),
                    "verify_chain_of_custody".to_string()
                ]
            }
        );
    }

    #[test]
    fn predicate_and_confidence_failures_both_reported() {
        let ctx = StageContext {
            completed_tasks: all_tasks(Stage::TeamReview),
            confidence: 90.0,
            team_consensus: Some(70.0),
            ..Default::default()
        };
        let result = StageEngine::new().advance(Stage::TeamReview, &ctx).unwrap();
        assert_eq!(result.status, AdvanceStatus::Failed);
        assert_eq!(result.errors.len(), 2);
        assert!(matches!(result.errors[0], StageError::PredicateFailed { .. }));
        assert!(matches!(
            result.errors[1],
            StageError::ConfidenceBelowGate { required, .. } if required == 95.0
        ));
    }

    #[test]
    fn cross_validation_requires_results() {
        let engine = StageEngine::new();
        let mut ctx = StageContext {
            completed_tasks: all_tasks(Stage::CrossValidation),
            confidence: 85.0,
            ..Default::default()
        };
        let failed = engine.advance(Stage::CrossValidation, &ctx).unwrap();
        assert_eq!(failed.status, AdvanceStatus::Failed);

        ctx.validation_results.push("timeline matches cctv".to_string());
        let ok = engine.advance(Stage::CrossValidation, &ctx).unwrap();
        assert_eq!(ok.next_stage, NextStage::At(Stage::Synthesis));
    }

    #[test]
    fn rapid_variant_skips_critical_stages() {
        let engine = StageEngine::new();
        let ctx = StageContext {
            completed_tasks: all_tasks(Stage::InitialAnalysis),
            confidence: 70.0,
            variant: InvestigationVariant::Rapid,
            ..Default::default()
        };
        let result = engine.advance(Stage::InitialAnalysis, &ctx).unwrap();
        assert_eq!(result.next_stage, NextStage::At(Stage::Synthesis));
        assert_eq!(
            engine.natural_next(Stage::HypothesisFormation, InvestigationVariant::Rapid),
            NextStage::At(Stage::FinalAssessment)
        );
    }

    #[test]
    fn last_stage_completes() {
        let ctx = StageContext {
            completed_tasks: all_tasks(Stage::ArchivalCommit),
            confidence: 60.0,
            ..Default::default()
        };
        let result = StageEngine::new()
            .advance(Stage::ArchivalCommit, &ctx)
            .unwrap();
        assert_eq!(result.next_stage, NextStage::Completed);
        assert_eq!(
            serde_json::to_value(result.next_stage).unwrap(),
            serde_json::json!("completed")
        );
    }

    #[test]
    fn advance_never_moves_backward() {
        let engine = StageEngine::new();
        for variant in [
            InvestigationVariant::Rapid,
            InvestigationVariant::Standard,
            InvestigationVariant::Comprehensive,
        ] {
            for stage in Stage::all() {
                for ctx in [
                    StageContext {
                        variant,
                        ..Default::default()
                    },
                    StageContext {
                        completed_tasks: all_tasks(*stage),
                        confidence: 100.0,
                        context_completeness: Some(100.0),
                        validation_results: vec!["ok".to_string()],
                        team_consensus: Some(100.0),
                        hypotheses: vec!["h1".to_string()],
                        variant,
                    },
                ] {
                    let result = engine.advance(*stage, &ctx).unwrap();
                    if let Some(next) = result.next_stage.stage() {
                        assert!(next >= *stage, "{stage} -> {next} under {variant}");
                    }
                }
            }
        }
    }

    #[test]
    fn out_of_range_confidence_is_rejected() {
        let ctx = StageContext {
            confidence: 101.0,
            ..Default::default()
        };
        assert!(StageEngine::new()
            .advance(Stage::Synthesis, &ctx)
            .is_err());
    }

    #[test]
    fn skip_rules() {
        let engine = StageEngine::new();
        let standard = StageContext::default();
        let rapid = StageContext {
            variant: InvestigationVariant::Rapid,
            ..Default::default()
        };

        assert!(!engine
            .can_skip_to(Stage::Synthesis, Stage::InitialAnalysis, &standard)
            .allowed);
        assert!(!engine
            .can_skip_to(Stage::InitialAnalysis, Stage::Synthesis, &standard)
            .allowed);
        assert!(engine
            .can_skip_to(Stage::InitialAnalysis, Stage::Synthesis, &rapid)
            .allowed);
        assert!(engine
            .can_skip_to(Stage::Synthesis, Stage::TeamReview, &standard)
            .allowed);
    }

    #[test]
    fn unfinished_critical_stage_cannot_be_skipped_away_from() {
        let engine = StageEngine::new();
        let standard = StageContext::default();
        let decision =
            engine.can_skip_to(Stage::CrossValidation, Stage::HypothesisFormation, &standard);
        assert!(!decision.allowed);
        assert!(decision.reason.contains("cross_validation"));
        assert!(!engine
            .can_skip_to(Stage::TeamReview, Stage::ArchivalCommit, &standard)
            .allowed);

        let rapid = StageContext {
            variant: InvestigationVariant::Rapid,
            ..Default::default()
        };
        assert!(engine
            .can_skip_to(Stage::CrossValidation, Stage::HypothesisFormation, &rapid)
            .allowed);
    }

    #[test]
    fn next_stage_parses() {
        assert_eq!("completed".parse::<NextStage>().unwrap(), NextStage::Completed);
        assert_eq!(
            "synthesis".parse::<NextStage>().unwrap(),
            NextStage::At(Stage::Synthesis)
        );
    }
}
