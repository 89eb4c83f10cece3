use crate::action::Action;
use crate::error::{CaseworkError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

// ---------------------------------------------------------------------------
// Operator
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Operator {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
    IncludesBoth,
    /// Kept verbatim so evaluation can log it; always evaluates false.
    Unknown(String),
}

impl Operator {
    pub fn as_str(&self) -> &str {
        match self {
            Operator::Eq => "==",
            Operator::Ne => "!=",
            Operator::Gt => ">",
            Operator::Ge => ">=",
            Operator::Lt => "<",
            Operator::Le => "<=",
            Operator::IncludesBoth => "includes_both",
            Operator::Unknown(raw) => raw,
        }
    }
}

impl From<String> for Operator {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "==" => Operator::Eq,
            "!=" => Operator::Ne,
            ">" => Operator::Gt,
            ">=" => Operator::Ge,
            "<" => Operator::Lt,
            "<=" => Operator::Le,
            "includes_both" => Operator::IncludesBoth,
            _ => Operator::Unknown(raw),
        }
    }
}

impl From<Operator> for String {
    fn from(op: Operator) -> Self {
        op.as_str().to_string()
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Condition / Rule / RuleSet
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub field: String,
    pub operator: Operator,
    pub value: Value,
}

impl Condition {
    pub fn new(field: impl Into<String>, operator: &str, value: Value) -> Self {
        Self {
            field: field.into(),
            operator: Operator::from(operator.to_string()),
            value,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub id: String,
    /// Record type this rule listens to.
    pub event: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(default)]
    pub actions: Vec<Action>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleSet {
    pub version: String,
    #[serde(default)]
    pub rules: Vec<Rule>,
}

pub const FALLBACK_RULE_ID: &str = "default_noop";

impl RuleSet {
    pub fn new(version: impl Into<String>, rules: Vec<Rule>) -> Self {
        Self {
            version: version.into(),
            rules,
        }
    }

    /// The built-in rule set written by `casework init`.
    pub fn builtin() -> Self {
        Self::new("1", default_rules())
    }

    /// Used when the rule source cannot be loaded: one rule that does nothing.
    pub fn fallback() -> Self {
        Self::new(
            "fallback",
            vec![Rule {
                id: FALLBACK_RULE_ID.to_string(),
                event: "noop".to_string(),
                description: Some("placeholder installed after a failed rule load".to_string()),
                conditions: Vec::new(),
                actions: Vec::new(),
            }],
        )
    }

    pub fn is_fallback(&self) -> bool {
        self.rules.len() == 1 && self.rules[0].id == FALLBACK_RULE_ID
    }

    /// Structural checks; a malformed rule set is rejected as a whole.
    pub fn validate(&self) -> Result<()> {
        if self.version.trim().is_empty() {
            return Err(CaseworkError::RuleLoad("rule set has no version".to_string()));
        }
        let mut seen = HashSet::new();
        for rule in &self.rules {
            if rule.id.trim().is_empty() {
                return Err(CaseworkError::RuleLoad("rule with empty id".to_string()));
            }
            if !seen.insert(rule.id.as_str()) {
                return Err(CaseworkError::RuleLoad(format!(
                    "duplicate rule id '{}'",
                    rule.id
                )));
            }
            if rule.event.trim().is_empty() {
                return Err(CaseworkError::RuleLoad(format!(
                    "rule '{}' has no event",
                    rule.id
                )));
            }
            for cond in &rule.conditions {
                if cond.field.trim().is_empty() {
                    return Err(CaseworkError::RuleLoad(format!(
                        "rule '{}' has a condition without a field",
                        rule.id
                    )));
                }
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Default rules
// ---------------------------------------------------------------------------

macro_rules! rule {
    (
        id: $id:expr,
        event: $event:expr,
        description: $desc:expr,
        conditions: [$($cond:expr),* $(,)?],
        actions: [$($action:expr),* $(,)?] $(,)?
    ) => {
        Rule {
            id: $id.to_string(),
            event: $event.to_string(),
            description: Some($desc.to_string()),
            conditions: vec![$($cond),*],
            actions: vec![$($action),*],
        }
    };
}

fn when(field: &str, operator: &str, value: Value) -> Condition {
    Condition::new(field, operator, value)
}

fn act(id: &str, action_type: &str, params: Value) -> Action {
    Action::new(id, action_type, params)
}

pub fn default_rules() -> Vec<Rule> {
    vec![
        // Weak hypotheses get a second pair of eyes before anyone builds on them
        rule! {
            id: "weak_hypothesis",
            event: "hypothesis",
            description: "Low-confidence hypothesis needs forensic and behavioral cross-validation",
            conditions: [when("confidence", "<", json!(40))],
            actions: [
                act("weak_hypothesis.validate", "request_cross_validation", json!({
                    "specialists": ["forensic", "behavioral"],
                    "reason": "hypothesis confidence below 40"
                })),
                act("weak_hypothesis.notify", "notify", json!({
                    "message": "Weak hypothesis submitted; cross-validation requested"
                })),
            ],
        },
        rule! {
            id: "contradiction_cascade",
            event: "hypothesis",
            description: "Three or more contradictions stop the pipeline",
            conditions: [when("contradictions", ">=", json!(3))],
            actions: [
                act("contradiction_cascade.halt", "halt_pipeline", json!({
                    "reason": "hypothesis contradicted by three or more findings"
                })),
            ],
        },
        rule! {
            id: "corroborated_evidence",
            event: "evidence",
            description: "Two or more evidence items corroborate each other",
            conditions: [when("evidence", ">=", json!(2))],
            actions: [
                act("corroborated_evidence.memory", "update_memory", json!({
                    "key": "corroborated_evidence",
                    "value": true
                })),
                act("corroborated_evidence.task", "create_task", json!({
                    "task": "cross_check_findings",
                    "assignee": "forensic"
                })),
            ],
        },
        rule! {
            id: "high_confidence_intake",
            event: "evidence",
            description: "Strong evidence during intake is prioritised",
            conditions: [
                when("confidence", ">=", json!(85)),
                when("stage", "==", json!("evidence_intake")),
            ],
            actions: [
                act("high_confidence_intake.priority", "update_field", json!({
                    "field": "priority",
                    "value": "high"
                })),
            ],
        },
        rule! {
            id: "timeline_conflict",
            event: "timeline",
            description: "Conflicting timeline entries trigger the conflict protocol",
            conditions: [when("conflicts", ">=", json!(1))],
            actions: [
                act("timeline_conflict.protocol", "activate_protocol", json!({
                    "protocol": "conflict_resolution"
                })),
                act("timeline_conflict.score", "modify_score", json!({"delta": -10})),
            ],
        },
        rule! {
            id: "profile_needs_behavioral",
            event: "character_profile",
            description: "Character profiles written by others are reviewed by the behavioral specialist",
            conditions: [when("specialist", "!=", json!("behavioral"))],
            actions: [
                act("profile_needs_behavioral.activate", "activate_specialist", json!({
                    "specialist": "behavioral"
                })),
            ],
        },
        rule! {
            id: "joint_profile_ready",
            event: "character_profile",
            description: "Behavioral and forensic both engaged: move the profile to cross-validation",
            conditions: [
                when("active_specialists", "includes_both", json!(["behavioral", "forensic"])),
            ],
            actions: [
                act("joint_profile_ready.transition", "transition_state", json!({
                    "stage": "cross_validation"
                })),
                act("joint_profile_ready.notify", "notify", json!({
                    "message": "Joint profile ready for cross-validation"
                })),
            ],
        },
    ]
}

// ---------------------------------------------------------------------------
// Rule sources
// ---------------------------------------------------------------------------

pub trait RuleSource {
    fn load(&self) -> Result<RuleSet>;
}

/// Rules from a YAML (or JSON) file.
pub struct YamlRuleSource {
    path: PathBuf,
}

impl YamlRuleSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RuleSource for YamlRuleSource {
    fn load(&self) -> Result<RuleSet> {
        let data = std::fs::read_to_string(&self.path).map_err(|e| {
            CaseworkError::RuleLoad(format!("{}: {e}", self.path.display()))
        })?;
        let set: RuleSet = serde_yaml::from_str(&data)
            .map_err(|e| CaseworkError::RuleLoad(format!("{}: {e}", self.path.display())))?;
        set.validate()?;
        Ok(set)
    }
}

/// Rules held in memory.
pub struct StaticRuleSource(pub RuleSet);

impl RuleSource for StaticRuleSource {
    fn load(&self) -> Result<RuleSet> {
        self.0.validate()?;
        Ok(self.0.clone())
    }
}

pub fn save_rule_set(path: &Path, set: &RuleSet) -> Result<()> {
    crate::io::write_yaml(path, set)
}

// ---------------------------------------------------------------------------
// RuleStore
// ---------------------------------------------------------------------------

/// Read-mostly holder of the current rule snapshot.
///
/// Readers clone an `Arc`; a reload swaps in a whole new snapshot and never
/// mutates rules that readers may still hold.
#[derive(Debug)]
pub struct RuleStore {
    current: RwLock<Arc<RuleSet>>,
}

impl RuleStore {
    pub fn new(set: RuleSet) -> Self {
        Self {
            current: RwLock::new(Arc::new(set)),
        }
    }

    /// Load from `source`, installing the fallback rule set if it fails.
    pub fn from_source(source: &dyn RuleSource) -> Self {
        match source.load() {
            Ok(set) => {
                tracing::debug!(version = %set.version, rules = set.rules.len(), "rules loaded");
                Self::new(set)
            }
            Err(e) => {
                tracing::warn!(error = %e, "rule load failed; using fallback rule set");
                Self::new(RuleSet::fallback())
            }
        }
    }

    pub fn snapshot(&self) -> Arc<RuleSet> {
        let guard = self.current.read().unwrap_or_else(|e| e.into_inner());
        Arc::clone(&guard)
    }

    pub fn replace(&self, set: RuleSet) {
        let mut guard = self.current.write().unwrap_or_else(|e| e.into_inner());
        *guard = Arc::new(set);
    }

    /// Swap in a fresh snapshot from `source`. On failure the current
    /// snapshot stays in place and the error is returned.
    pub fn reload(&self, source: &dyn RuleSource) -> Result<()> {
        let set = source.load()?;
        tracing::info!(version = %set.version, rules = set.rules.len(), "rules reloaded");
        self.replace(set);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
