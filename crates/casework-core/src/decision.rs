//! The decision function: read a context, return prioritized commands.
//!
//! Heuristics are literal keyword tables scanned in a fixed order so match
//! order and tie-breaks are reproducible. The stage engine is the authority
//! on the next stage; this module's own progression table is only a hint and
//! any disagreement is reported, never reconciled.

use crate::context::ExecutionContext;
use crate::stage::{NextStage, StageEngine};
use crate::types::{InvestigationVariant, Specialist, Stage};
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::OnceLock;

pub const LOW_CONFIDENCE: f64 = 40.0;
pub const ADVANCE_CONFIDENCE: f64 = 70.0;
pub const DELEGATION_CONFIDENCE: f64 = 60.0;
pub const MAX_GAPS_FOR_ADVANCE: usize = 1;

const CONFLICT_KEYWORDS: &[&str] = &[
    "contradictory",
    "contradiction",
    "contradicts",
    "inconsistent",
    "inconsistency",
    "conflicting",
    "discrepancy",
    "contraditório",
    "inconsistente",
];

/// Scanned in this order; the order decides activation priority.
const SPECIALIST_KEYWORDS: &[(Specialist, &[&str])] = &[
    (
        Specialist::Forensic,
        &["evidence", "forensic", "fingerprint", "dna", "autopsy", "weapon", "residue"],
    ),
    (
        Specialist::Behavioral,
        &["motive", "behavior", "behaviour", "psycholog", "personality", "emotional", "profile"],
    ),
    (
        Specialist::Tactical,
        &["timeline", "location", "route", "surveillance", "movement", "schedule"],
    ),
    (
        Specialist::Strategist,
        &["strategy", "strategic", "priorit", "resource", "plan"],
    ),
];

const GAP_MARKERS: &[&str] = &[
    "unknown",
    "unclear",
    "missing",
    "unverified",
    "unconfirmed",
    "no record",
    "undetermined",
];

const URGENCY_KEYWORDS: &[&str] = &[
    "urgent",
    "imminent",
    "immediately",
    "threat",
    "danger",
    "victim",
    "missing person",
];

fn percent_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?:^|[^\d.])(\d{1,3}(?:\.\d+)?)\s*%").expect("valid regex"))
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandAction {
    ActivateSpecialist,
    ValidateStage,
    RecordContext,
    Pause,
    AdvancePipeline,
    ResolveConflict,
}

impl CommandAction {
    pub fn as_str(self) -> &'static str {
        match self {
            CommandAction::ActivateSpecialist => "activate_specialist",
            CommandAction::ValidateStage => "validate_stage",
            CommandAction::RecordContext => "record_context",
            CommandAction::Pause => "pause",
            CommandAction::AdvancePipeline => "advance_pipeline",
            CommandAction::ResolveConflict => "resolve_conflict",
        }
    }
}

impl std::fmt::Display for CommandAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    pub action: CommandAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    pub message: String,
    /// 1 (lowest) to 10.
    pub priority: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    pub created_at: DateTime<Utc>,
}

impl Command {
    fn new(action: CommandAction, target: Option<String>, message: impl Into<String>, priority: u8) -> Self {
        Self {
            action,
            target,
            message: message.into(),
            priority: priority.clamp(1, 10),
            data: None,
            created_at: Utc::now(),
        }
    }

    fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }
}

// ---------------------------------------------------------------------------
// Assessment
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Urgency {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Complexity {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assessment {
    pub urgency: Urgency,
    /// Aggregate of the context confidence and any percentages in the narrative.
    pub confidence: f64,
    pub complexity: Complexity,
    pub recommendation: String,
    pub conflicts: Vec<String>,
    pub information_gaps: Vec<String>,
    pub needed_specialists: Vec<Specialist>,
    pub pipeline_hint: NextStage,
}

/// What the narrative says, extracted once per call.
#[derive(Debug, Clone)]
struct Signals {
    conflicts: Vec<String>,
    low_stated_confidence: Option<f64>,
    needed: Vec<Specialist>,
    gaps: Vec<String>,
    urgency_hits: usize,
    confidence: f64,
}

impl Signals {
    fn read(ctx: &ExecutionContext) -> Self {
        let text = ctx.narrative.to_lowercase();

        let conflicts: Vec<String> = CONFLICT_KEYWORDS
            .iter()
            .filter(|k| text.contains(*k))
            .map(|k| k.to_string())
            .collect();

        let stated: Vec<f64> = percent_re()
            .captures_iter(&text)
            .filter_map(|c| c.get(1)?.as_str().parse::<f64>().ok())
            .filter(|v| (0.0..=100.0).contains(v))
            .collect();
        let low_stated_confidence = stated
            .iter()
            .copied()
            .filter(|v| *v < LOW_CONFIDENCE)
            .reduce(f64::min);
        let confidence = if stated.is_empty() {
            ctx.confidence
        } else {
            (ctx.confidence + stated.iter().sum::<f64>()) / (stated.len() + 1) as f64
        };

        let mut needed: Vec<Specialist> = SPECIALIST_KEYWORDS
            .iter()
            .filter(|(_, words)| words.iter().any(|w| text.contains(w)))
            .map(|(sp, _)| *sp)
            .collect();
        if needed.len() >= 2 && !needed.contains(&Specialist::Strategist) {
            needed.push(Specialist::Strategist);
        }

        let gaps = GAP_MARKERS
            .iter()
            .filter(|m| text.contains(*m))
            .map(|m| m.to_string())
            .collect();

        let urgency_hits = URGENCY_KEYWORDS.iter().filter(|k| text.contains(*k)).count();

        Self {
            conflicts,
            low_stated_confidence,
            needed,
            gaps,
            urgency_hits,
            confidence,
        }
    }

    fn has_conflict(&self) -> bool {
        !self.conflicts.is_empty() || self.low_stated_confidence.is_some()
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct DecisionEngine {
    stages: StageEngine,
    variant: InvestigationVariant,
}

impl DecisionEngine {
    pub fn new(variant: InvestigationVariant) -> Self {
        Self {
            stages: StageEngine::new(),
            variant,
        }
    }

    /// Commands for `ctx`, highest priority first; equal priorities keep
    /// the order the heuristics produced them in. Never empty.
    pub fn decide(&self, ctx: &ExecutionContext) -> Vec<Command> {
        let signals = Signals::read(ctx);
        let mut commands = Vec::new();

        if signals.has_conflict() {
            let mut reasons = signals.conflicts.clone();
            if let Some(c) = signals.low_stated_confidence {
                reasons.push(format!("stated confidence {c}%"));
            }
            commands.push(
                Command::new(
                    CommandAction::ResolveConflict,
                    Some(Stage::CrossValidation.as_str().to_string()),
                    format!("conflicting signals in finding: {}", reasons.join(", ")),
                    10,
                )
                .with_data(json!({"signals": reasons})),
            );
        }

        let mut active = ctx.active_specialists.clone();
        let mut rank = 0u8;
        for sp in &signals.needed {
            if active.contains(sp) {
                continue;
            }
            let priority = 9u8.saturating_sub(rank).max(6);
            rank += 1;
            commands.push(Command::new(
                CommandAction::ActivateSpecialist,
                Some(sp.as_str().to_string()),
                format!("{sp} needed for this finding"),
                priority,
            ));
            active.push(*sp);
        }

        if signals.confidence < LOW_CONFIDENCE {
            commands.push(Command::new(
                CommandAction::Pause,
                None,
                format!(
                    "aggregate confidence {:.1} below {LOW_CONFIDENCE}; gather more evidence",
                    signals.confidence
                ),
                8,
            ));
        }

        if active.len() >= 2 && ctx.stage != Stage::CrossValidation {
            let names: Vec<&str> = active.iter().map(|s| s.as_str()).collect();
            commands.push(
                Command::new(
                    CommandAction::ValidateStage,
                    Some(ctx.stage.as_str().to_string()),
                    format!("cross-check {} findings from {}", ctx.stage, names.join(", ")),
                    6,
                )
                .with_data(json!({"specialists": names})),
            );
        }

        if signals.confidence >= ADVANCE_CONFIDENCE
            && !signals.has_conflict()
            && signals.gaps.len() <= MAX_GAPS_FOR_ADVANCE
        {
            commands.push(self.advance_command(ctx, &signals));
        }

        commands.push(
            Command::new(
                CommandAction::RecordContext,
                Some(ctx.case_id.clone()),
                format!("record {} finding for case {}", ctx.record_type, ctx.case_id),
                3,
            )
            .with_data(json!({
                "stage": ctx.stage,
                "confidence": signals.confidence,
                "gaps": signals.gaps,
            })),
        );

        // Stable: ties keep insertion order.
        commands.sort_by(|a, b| b.priority.cmp(&a.priority));
        commands
    }

    fn advance_command(&self, ctx: &ExecutionContext, signals: &Signals) -> Command {
        let next = self.stages.natural_next(ctx.stage, self.variant);
        let hint = pipeline_hint(ctx.stage, signals.has_conflict(), signals.confidence);
        let mut data = json!({
            "from": ctx.stage,
            "next": next,
            "hint": hint,
        });
        if hint != next {
            tracing::warn!(
                case = %ctx.case_id,
                stage = %ctx.stage,
                next = %next,
                hint = %hint,
                "decision hint disagrees with stage engine; using stage engine"
            );
            data["discrepancy"] = Value::Bool(true);
        }
        Command::new(
            CommandAction::AdvancePipeline,
            Some(next.as_str().to_string()),
            format!("confidence {:.1} supports advancing {} -> {next}", signals.confidence, ctx.stage),
            5,
        )
        .with_data(data)
    }

    /// Diagnostic summary of the same narrative; independent of `decide`.
    pub fn assess(&self, ctx: &ExecutionContext) -> Assessment {
        let signals = Signals::read(ctx);
        let has_conflict = signals.has_conflict();

        let urgency = match signals.urgency_hits {
            n if n >= 2 || (n == 1 && has_conflict) => Urgency::Critical,
            1 => Urgency::High,
            _ if has_conflict || signals.confidence < LOW_CONFIDENCE => Urgency::Medium,
            _ => Urgency::Low,
        };

        let load = signals.needed.len() + signals.conflicts.len() + signals.gaps.len();
        let complexity = match load {
            n if n >= 4 => Complexity::High,
            2 | 3 => Complexity::Medium,
            _ => Complexity::Low,
        };

        let hint = pipeline_hint(ctx.stage, has_conflict, signals.confidence);
        let recommendation = if has_conflict {
            "resolve conflicting findings before advancing".to_string()
        } else if signals.confidence < LOW_CONFIDENCE {
            "pause and gather more evidence".to_string()
        } else if signals.gaps.len() > MAX_GAPS_FOR_ADVANCE {
            format!("close information gaps ({})", signals.gaps.join(", "))
        } else if signals.confidence >= ADVANCE_CONFIDENCE {
            format!("advance to {hint}")
        } else {
            format!("continue analysis in {}", ctx.stage)
        };

        let mut conflicts = signals.conflicts.clone();
        if let Some(c) = signals.low_stated_confidence {
            conflicts.push(format!("stated confidence {c}%"));
        }

        Assessment {
            urgency,
            confidence: signals.confidence,
            complexity,
            recommendation,
            conflicts,
            information_gaps: signals.gaps,
            needed_specialists: signals.needed,
            pipeline_hint: hint,
        }
    }
}

/// The decision function's own progression table, with overrides.
///
/// Conflicts send the case to cross-validation; weak synthesis goes back to
/// initial analysis where work is delegated.
pub fn pipeline_hint(stage: Stage, conflict: bool, confidence: f64) -> NextStage {
    if conflict {
        return NextStage::At(Stage::CrossValidation);
    }
    if stage == Stage::Synthesis && confidence < DELEGATION_CONFIDENCE {
        return NextStage::At(Stage::InitialAnalysis);
    }
    match stage {
        Stage::EvidenceIntake => NextStage::At(Stage::InitialAnalysis),
        Stage::InitialAnalysis => NextStage::At(Stage::CrossValidation),
        Stage::CrossValidation => NextStage::At(Stage::Synthesis),
        Stage::Synthesis => NextStage::At(Stage::HypothesisFormation),
        Stage::HypothesisFormation => NextStage::At(Stage::FinalAssessment),
        Stage::TeamReview => NextStage::At(Stage::FinalAssessment),
        Stage::FinalAssessment => NextStage::At(Stage::ArchivalCommit),
        Stage::ArchivalCommit => NextStage::Completed,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
