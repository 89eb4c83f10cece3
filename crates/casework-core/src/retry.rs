//! Retry and recovery: classify a failure, choose a recovery action, compute
//! the backoff, and optionally apply the decision to a live context.
//!
//! Escalation is an explicit category → category map ending in a graceful
//! conclusion, and the global ceiling is checked before anything else, so the
//! engine always terminates.

use crate::context::{CaseCapabilities, ExecutionContext};
use crate::error::{check_range, CaseworkError, Result};
use crate::types::{Specialist, Stage};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

pub const GLOBAL_ATTEMPT_CEILING: u32 = 3;
pub const LOW_CONFIDENCE: f64 = 40.0;
pub const LOW_CONFIDENCE_MIN_ATTEMPTS: u32 = 2;
pub const MAX_ELAPSED_MS: u64 = 300_000;
const BACKOFF_FACTOR: f64 = 1.5;

pub const SIMPLIFICATION_PROTOCOL: &str = "simplification";
pub const ESCALATION_PROTOCOL: &str = "escalation";

// ---------------------------------------------------------------------------
// Failure categories
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureCategory {
    InsufficientContext,
    LogicalInconsistency,
    CrossSpecialistConflict,
    ExpertiseGap,
    ResourceExhaustion,
    SystemIntegration,
    AnalysisTimeout,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryAction {
    Repeat,
    Skip,
    Adjust,
    Restart,
    Escalate,
    ConcludeGracefully,
}

impl RetryAction {
    pub fn as_str(self) -> &'static str {
        match self {
            RetryAction::Repeat => "repeat",
            RetryAction::Skip => "skip",
            RetryAction::Adjust => "adjust",
            RetryAction::Restart => "restart",
            RetryAction::Escalate => "escalate",
            RetryAction::ConcludeGracefully => "conclude_gracefully",
        }
    }
}

impl fmt::Display for RetryAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Static description of how a category is recovered.
#[derive(Debug)]
pub struct CategoryProfile {
    pub category: FailureCategory,
    pub strategy: &'static str,
    pub symptoms: &'static [&'static str],
    pub base_cooldown_ms: u64,
    pub max_attempts: u32,
}

const PROFILES: &[CategoryProfile] = &[
    CategoryProfile {
        category: FailureCategory::InsufficientContext,
        strategy: "gather_more_context",
        symptoms: &["insufficient", "missing", "incomplete", "not enough", "insuficiente"],
        base_cooldown_ms: 1000,
        max_attempts: 3,
    },
    CategoryProfile {
        category: FailureCategory::LogicalInconsistency,
        strategy: "recheck_reasoning",
        symptoms: &["inconsisten", "contradict", "illogical", "paradox"],
        base_cooldown_ms: 2000,
        max_attempts: 2,
    },
    CategoryProfile {
        category: FailureCategory::CrossSpecialistConflict,
        strategy: "mediated_review",
        symptoms: &["conflict", "disagree", "divergen", "conflito"],
        base_cooldown_ms: 2500,
        max_attempts: 2,
    },
    CategoryProfile {
        category: FailureCategory::ExpertiseGap,
        strategy: "pair_specialists",
        symptoms: &["expertise", "unfamiliar", "out of scope", "specialty", "especialidade"],
        base_cooldown_ms: 1200,
        max_attempts: 2,
    },
    CategoryProfile {
        category: FailureCategory::ResourceExhaustion,
        strategy: "reduce_load",
        symptoms: &["resource", "memory", "quota", "rate limit", "exhaust", "recurso"],
        base_cooldown_ms: 5000,
        max_attempts: 3,
    },
    CategoryProfile {
        category: FailureCategory::SystemIntegration,
        strategy: "restart_pipeline",
        symptoms: &["integration", "connection", "unavailable", "service", "network", "integracao"],
        base_cooldown_ms: 3000,
        max_attempts: 3,
    },
    CategoryProfile {
        category: FailureCategory::AnalysisTimeout,
        strategy: "narrow_scope",
        symptoms: &["timeout", "timed out", "deadline", "too slow", "tempo"],
        base_cooldown_ms: 1500,
        max_attempts: 3,
    },
];

/// Exact failure-type names, checked before the symptom scan.
const EXACT: &[(&str, FailureCategory)] = &[
    ("insufficient_context", FailureCategory::InsufficientContext),
    ("contexto_insuficiente", FailureCategory::InsufficientContext),
    ("logical_inconsistency", FailureCategory::LogicalInconsistency),
    ("inconsistencia_logica", FailureCategory::LogicalInconsistency),
    ("cross_specialist_conflict", FailureCategory::CrossSpecialistConflict),
    ("conflito_especialistas", FailureCategory::CrossSpecialistConflict),
    ("expertise_gap", FailureCategory::ExpertiseGap),
    ("lacuna_expertise", FailureCategory::ExpertiseGap),
    ("resource_exhaustion", FailureCategory::ResourceExhaustion),
    ("esgotamento_recursos", FailureCategory::ResourceExhaustion),
    ("system_integration", FailureCategory::SystemIntegration),
    ("integracao_sistema", FailureCategory::SystemIntegration),
    ("analysis_timeout", FailureCategory::AnalysisTimeout),
    ("timeout_analise", FailureCategory::AnalysisTimeout),
];

impl FailureCategory {
    pub fn all() -> &'static [FailureCategory] {
        &[
            FailureCategory::InsufficientContext,
            FailureCategory::LogicalInconsistency,
            FailureCategory::CrossSpecialistConflict,
            FailureCategory::ExpertiseGap,
            FailureCategory::ResourceExhaustion,
            FailureCategory::SystemIntegration,
            FailureCategory::AnalysisTimeout,
        ]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FailureCategory::InsufficientContext => "insufficient_context",
            FailureCategory::LogicalInconsistency => "logical_inconsistency",
            FailureCategory::CrossSpecialistConflict => "cross_specialist_conflict",
            FailureCategory::ExpertiseGap => "expertise_gap",
            FailureCategory::ResourceExhaustion => "resource_exhaustion",
            FailureCategory::SystemIntegration => "system_integration",
            FailureCategory::AnalysisTimeout => "analysis_timeout",
        }
    }

    pub fn profile(self) -> &'static CategoryProfile {
        // PROFILES is indexed in declaration order of the enum.
        &PROFILES[self as usize]
    }

    /// Classify a failure type: exact name first, then symptom substrings.
    pub fn classify(failure_type: &str) -> Option<FailureCategory> {
        let needle = failure_type.trim().to_lowercase();
        if let Some((_, cat)) = EXACT.iter().find(|(name, _)| *name == needle) {
            return Some(*cat);
        }
        PROFILES
            .iter()
            .find(|p| p.symptoms.iter().any(|s| needle.contains(s)))
            .map(|p| p.category)
    }

    /// Where a category goes once its own attempts are used up.
    /// `None` means conclude gracefully.
    pub fn escalates_to(self) -> Option<FailureCategory> {
        match self {
            FailureCategory::InsufficientContext => Some(FailureCategory::ExpertiseGap),
            FailureCategory::LogicalInconsistency => Some(FailureCategory::CrossSpecialistConflict),
            _ => None,
        }
    }

    /// `round(base × 1.5^(attempt-1))`; attempt 0 is treated as 1.
    pub fn cooldown_ms(self, attempt: u32) -> u64 {
        let exp = attempt.saturating_sub(1) as i32;
        (self.profile().base_cooldown_ms as f64 * BACKOFF_FACTOR.powi(exp)).round() as u64
    }
}

impl fmt::Display for FailureCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Input / response
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryInput {
    pub stage: String,
    pub failure_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub specialist: Option<Specialist>,
    pub attempt: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub global_attempts: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Modifications {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence_delta: Option<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub alternate_specialists: Vec<Specialist>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub simplifications: Vec<String>,
}

impl Modifications {
    pub fn is_empty(&self) -> bool {
        self.confidence_delta.is_none()
            && self.alternate_specialists.is_empty()
            && self.simplifications.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryResponse {
    pub action: RetryAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<FailureCategory>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_stage: Option<Stage>,
    pub justification: String,
    pub cooldown_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modifications: Option<Modifications>,
}

impl RetryResponse {
    /// Multi-line, human-readable summary of the decision.
    pub fn report(&self, input: &RetryInput) -> String {
        let mut out = String::new();
        out.push_str(&format!(
            "Recovery for stage '{}' (failure: {}, attempt {})\n",
            input.stage, input.failure_type, input.attempt
        ));
        if let Some(cat) = self.category {
            out.push_str(&format!(
                "  category:  {cat} ({})\n",
                cat.profile().strategy
            ));
        }
        out.push_str(&format!("  action:    {}\n", self.action));
        if let Some(next) = self.next_stage {
            out.push_str(&format!("  next:      {next}\n"));
        }
        out.push_str(&format!("  cooldown:  {}ms\n", self.cooldown_ms));
        out.push_str(&format!("  reason:    {}\n", self.justification));
        if let Some(m) = &self.modifications {
            if let Some(delta) = m.confidence_delta {
                out.push_str(&format!("  confidence delta: {delta:+}\n"));
            }
            if !m.alternate_specialists.is_empty() {
                let names: Vec<&str> = m.alternate_specialists.iter().map(|s| s.as_str()).collect();
                out.push_str(&format!("  specialists: {}\n", names.join(", ")));
            }
            for s in &m.simplifications {
                out.push_str(&format!("  simplify: {s}\n"));
            }
        }
        out
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Limits that override per-category retry logic.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryLimits {
    pub global_ceiling: u32,
    pub low_confidence: f64,
    pub low_confidence_min_attempts: u32,
    pub max_elapsed_ms: u64,
}

impl Default for RetryLimits {
    fn default() -> Self {
        Self {
            global_ceiling: GLOBAL_ATTEMPT_CEILING,
            low_confidence: LOW_CONFIDENCE,
            low_confidence_min_attempts: LOW_CONFIDENCE_MIN_ATTEMPTS,
            max_elapsed_ms: MAX_ELAPSED_MS,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RetryEngine {
    limits: RetryLimits,
}

impl RetryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limits(limits: RetryLimits) -> Self {
        Self { limits }
    }

    pub fn limits(&self) -> &RetryLimits {
        &self.limits
    }

    pub fn evaluate(&self, input: &RetryInput) -> Result<RetryResponse> {
        let stage = validate(input)?;
        let attempt = input.attempt as u32;
        let global = input.global_attempts.unwrap_or(0);

        if global >= self.limits.global_ceiling {
            return Ok(conclude(format!(
                "global attempt ceiling reached ({global} of {})",
                self.limits.global_ceiling
            )));
        }

        let Some(category) = FailureCategory::classify(&input.failure_type) else {
            tracing::warn!(failure = %input.failure_type, "unrecognized failure type");
            return Ok(RetryResponse {
                action: RetryAction::Escalate,
                category: None,
                next_stage: None,
                justification: format!(
                    "failure type '{}' not recognized; escalating for manual review",
                    input.failure_type
                ),
                cooldown_ms: 0,
                modifications: None,
            });
        };

        let profile = category.profile();
        if attempt > profile.max_attempts {
            return Ok(escalate(category, input, stage, attempt));
        }

        Ok(strategy(category, input, stage, attempt))
    }

    /// True when any global limit says retries should stop.
    pub fn force_conclusion(
        &self,
        global_attempts: u32,
        confidence: Option<f64>,
        elapsed_ms: Option<u64>,
    ) -> bool {
        let l = &self.limits;
        global_attempts >= l.global_ceiling
            || confidence.is_some_and(|c| c < l.low_confidence && global_attempts >= l.low_confidence_min_attempts)
            || elapsed_ms.is_some_and(|ms| ms > l.max_elapsed_ms)
    }

    /// Apply a decision to the context, then wait out its cooldown.
    ///
    /// Returns the report that was logged. Hints that cannot be applied are
    /// dropped with a warning; a failing capability aborts with its error.
    pub async fn apply_modifications(
        &self,
        input: &RetryInput,
        response: &RetryResponse,
        ctx: &mut ExecutionContext,
        caps: &mut dyn CaseCapabilities,
    ) -> Result<String> {
        let report = response.report(input);
        tracing::info!(case = %ctx.case_id, action = %response.action, "{}", report.trim_end());

        if let Some(m) = &response.modifications {
            if let Some(delta) = m.confidence_delta {
                match check_range(ctx.confidence + delta, 0.0, 100.0) {
                    Ok(updated) => {
                        caps.modify_score(&ctx.case_id, delta)?;
                        ctx.confidence = updated;
                    }
                    Err(e) => tracing::warn!(case = %ctx.case_id, error = %e, "confidence delta dropped"),
                }
            }
            for sp in &m.alternate_specialists {
                caps.activate_specialist(&ctx.case_id, *sp)?;
                ctx.activate(*sp);
            }
            if !m.simplifications.is_empty() {
                activate_protocol(ctx, caps, SIMPLIFICATION_PROTOCOL)?;
            }
        }

        match response.action {
            RetryAction::Repeat | RetryAction::Adjust => {}
            RetryAction::Skip => {
                if let Some(next) = ctx.stage.next() {
                    move_to(ctx, caps, next)?;
                }
            }
            RetryAction::Restart => move_to(ctx, caps, Stage::EvidenceIntake)?,
            RetryAction::Escalate => activate_protocol(ctx, caps, ESCALATION_PROTOCOL)?,
            RetryAction::ConcludeGracefully => move_to(ctx, caps, Stage::FinalAssessment)?,
        }

        if response.cooldown_ms > 0 {
            tokio::time::sleep(Duration::from_millis(response.cooldown_ms)).await;
        }
        Ok(report)
    }
}

fn validate(input: &RetryInput) -> Result<Stage> {
    if input.stage.trim().is_empty() {
        return Err(CaseworkError::InvalidRetryInput("stage is empty".to_string()));
    }
    if input.failure_type.trim().is_empty() {
        return Err(CaseworkError::InvalidRetryInput(
            "failure_type is empty".to_string(),
        ));
    }
    if input.attempt < 1 {
        return Err(CaseworkError::InvalidRetryInput(format!(
            "attempt must be >= 1, got {}",
            input.attempt
        )));
    }
    if input.attempt > u32::MAX as i64 {
        return Err(CaseworkError::InvalidRetryInput(format!(
            "attempt {} is too large",
            input.attempt
        )));
    }
    if let Some(c) = input.confidence {
        check_range(c, 0.0, 100.0)?;
    }
    input
        .stage
        .parse::<Stage>()
        .map_err(|e| CaseworkError::InvalidRetryInput(e.to_string()))
}

fn conclude(justification: String) -> RetryResponse {
    RetryResponse {
        action: RetryAction::ConcludeGracefully,
        category: None,
        next_stage: Some(Stage::FinalAssessment),
        justification,
        cooldown_ms: 0,
        modifications: None,
    }
}

/// Walk the escalation map, spending `attempt` against each category's
/// budget in turn. The chain always ends in a graceful conclusion.
fn escalate(category: FailureCategory, input: &RetryInput, stage: Stage, attempt: u32) -> RetryResponse {
    let mut exhausted = category;
    let mut remaining = attempt.saturating_sub(category.profile().max_attempts);
    while let Some(next) = exhausted.escalates_to() {
        let max = next.profile().max_attempts;
        if remaining <= max {
            let mut resp = strategy(next, input, stage, remaining.max(1));
            resp.justification = format!(
                "{category} exhausted after {} attempt(s); escalating to {next} (attempt {remaining} of {max}): {}",
                category.profile().max_attempts,
                resp.justification
            );
            return resp;
        }
        remaining -= max;
        exhausted = next;
    }
    let mut resp = conclude(format!(
        "{category} escalation chain exhausted at {exhausted} after {attempt} attempt(s); concluding with partial results"
    ));
    resp.category = Some(exhausted);
    resp
}

fn strategy(category: FailureCategory, input: &RetryInput, stage: Stage, attempt: u32) -> RetryResponse {
    let cooldown_ms = category.cooldown_ms(attempt);
    let (action, justification, modifications) = match category {
        FailureCategory::InsufficientContext => (
            RetryAction::Adjust,
            format!("context for {stage} is insufficient; widen evidence gathering before retrying"),
            Modifications {
                confidence_delta: Some(-5.0),
                ..Default::default()
            },
        ),
        FailureCategory::LogicalInconsistency => (
            RetryAction::Repeat,
            format!("reasoning in {stage} is inconsistent; repeat the analysis with explicit premise checks"),
            Modifications::default(),
        ),
        FailureCategory::CrossSpecialistConflict => {
            let complement = complementary(input.specialist);
            (
                RetryAction::Adjust,
                format!(
                    "specialists disagree in {stage}; strategist mediates with {complement}"
                ),
                Modifications {
                    alternate_specialists: vec![Specialist::Strategist, complement],
                    ..Default::default()
                },
            )
        }
        FailureCategory::ExpertiseGap => (
            RetryAction::Adjust,
            format!("{stage} needs expertise outside the acting specialist; pair forensic with strategist"),
            Modifications {
                alternate_specialists: vec![Specialist::Forensic, Specialist::Strategist],
                ..Default::default()
            },
        ),
        FailureCategory::ResourceExhaustion => (
            RetryAction::Repeat,
            format!("resources exhausted during {stage}; repeat with a reduced workload"),
            Modifications {
                simplifications: vec![
                    "limit evidence to the most recent items".to_string(),
                    "defer secondary hypotheses".to_string(),
                ],
                ..Default::default()
            },
        ),
        FailureCategory::SystemIntegration => (
            RetryAction::Restart,
            format!("integration failure during {stage}; restart the pipeline from intake"),
            Modifications::default(),
        ),
        FailureCategory::AnalysisTimeout => (
            RetryAction::Adjust,
            format!("analysis of {stage} timed out; narrow the scope and retry"),
            Modifications {
                simplifications: vec!["analyse key points only".to_string()],
                ..Default::default()
            },
        ),
    };

    let next_stage = match action {
        RetryAction::Restart => Some(Stage::EvidenceIntake),
        _ => Some(stage),
    };

    RetryResponse {
        action,
        category: Some(category),
        next_stage,
        justification,
        cooldown_ms,
        modifications: (!modifications.is_empty()).then_some(modifications),
    }
}

/// The specialist paired with the strategist when mediating a conflict.
fn complementary(acting: Option<Specialist>) -> Specialist {
    match acting {
        Some(Specialist::Forensic) => Specialist::Behavioral,
        Some(Specialist::Behavioral) => Specialist::Forensic,
        Some(Specialist::Tactical) => Specialist::Forensic,
        Some(Specialist::Strategist) => Specialist::Coordinator,
        Some(Specialist::Coordinator) => Specialist::Tactical,
        None => Specialist::Forensic,
    }
}

fn move_to(ctx: &mut ExecutionContext, caps: &mut dyn CaseCapabilities, stage: Stage) -> Result<()> {
    caps.advance_stage(&ctx.case_id, stage)?;
    ctx.stage = stage;
    Ok(())
}

fn activate_protocol(ctx: &mut ExecutionContext, caps: &mut dyn CaseCapabilities, protocol: &str) -> Result<()> {
    caps.activate_protocol(&ctx.case_id, protocol)?;
    if !ctx.protocols.iter().any(|p| p == protocol) {
        ctx.protocols.push(protocol.to_string());
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
