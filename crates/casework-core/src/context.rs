//! The execution context: one ingested finding moving through a single run.
//!
//! The context is owned by the run that created it and is discarded when the
//! run ends. Side effects that must outlive the run go through the injected
//! [`CaseCapabilities`]; durable state is persisted by the case store.

use crate::error::{check_range, CaseworkError, Result};
use crate::types::{Specialist, Stage};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ---------------------------------------------------------------------------
// ExecutionContext
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionContext {
    pub case_id: String,
    #[serde(default = "default_stage")]
    pub stage: Stage,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub specialist: Option<Specialist>,
    #[serde(default)]
    pub narrative: String,
    /// Probability in `[0, 100]`.
    #[serde(default)]
    pub confidence: f64,
    pub record_type: String,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub active_specialists: Vec<Specialist>,
    /// Any other finding fields; rule conditions may reference them.
    #[serde(flatten)]
    pub attributes: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub protocols: Vec<String>,
    #[serde(default)]
    pub halted: bool,
}

/// Names backed by typed fields rather than `attributes`.
pub const BUILTIN_FIELDS: &[&str] = &[
    "case_id",
    "stage",
    "specialist",
    "narrative",
    "confidence",
    "record_type",
    "timestamp",
    "active_specialists",
    "protocols",
    "halted",
];

pub fn is_builtin_field(name: &str) -> bool {
    BUILTIN_FIELDS.contains(&name)
}

fn default_stage() -> Stage {
    Stage::EvidenceIntake
}

impl ExecutionContext {
    pub fn new(
        case_id: impl Into<String>,
        record_type: impl Into<String>,
        narrative: impl Into<String>,
    ) -> Self {
        Self {
            case_id: case_id.into(),
            stage: default_stage(),
            specialist: None,
            narrative: narrative.into(),
            confidence: 0.0,
            record_type: record_type.into(),
            timestamp: Utc::now(),
            active_specialists: Vec::new(),
            attributes: Map::new(),
            protocols: Vec::new(),
            halted: false,
        }
    }

    pub fn with_stage(mut self, stage: Stage) -> Self {
        self.stage = stage;
        self
    }

    pub fn with_specialist(mut self, specialist: Specialist) -> Self {
        self.specialist = Some(specialist);
        self
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence;
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }

    /// Parse a context from an arbitrary JSON payload.
    ///
    /// The payload must be an object with a non-empty `record_type` string.
    pub fn from_value(value: Value) -> Result<Self> {
        let Value::Object(ref obj) = value else {
            return Err(CaseworkError::InvalidContext(
                "context must be a JSON object".to_string(),
            ));
        };
        match obj.get("record_type") {
            Some(Value::String(s)) if !s.trim().is_empty() => {}
            _ => {
                return Err(CaseworkError::InvalidContext(
                    "record_type must be a non-empty string".to_string(),
                ))
            }
        }
        let ctx: ExecutionContext = serde_json::from_value(value)
            .map_err(|e| CaseworkError::InvalidContext(e.to_string()))?;
        ctx.validate()?;
        Ok(ctx)
    }

    pub fn validate(&self) -> Result<()> {
        if self.case_id.trim().is_empty() {
            return Err(CaseworkError::InvalidContext(
                "case_id must not be empty".to_string(),
            ));
        }
        if self.record_type.trim().is_empty() {
            return Err(CaseworkError::InvalidContext(
                "record_type must not be empty".to_string(),
            ));
        }
        check_range(self.confidence, 0.0, 100.0)?;
        Ok(())
    }

    pub fn is_active(&self, specialist: Specialist) -> bool {
        self.active_specialists.contains(&specialist)
    }

    pub fn activate(&mut self, specialist: Specialist) -> bool {
        if self.is_active(specialist) {
            return false;
        }
        self.active_specialists.push(specialist);
        true
    }

    /// Resolve a field by name for rule evaluation.
    ///
    /// Built-in fields win over `attributes`. JSON `null` is reported as absent.
    pub fn field(&self, name: &str) -> Option<Value> {
        let value = match name {
            "case_id" => Value::String(self.case_id.clone()),
            "stage" => Value::String(self.stage.as_str().to_string()),
            "specialist" => match self.specialist {
                Some(s) => Value::String(s.as_str().to_string()),
                None => return None,
            },
            "narrative" => Value::String(self.narrative.clone()),
            "confidence" => serde_json::Number::from_f64(self.confidence)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            "record_type" => Value::String(self.record_type.clone()),
            "timestamp" => Value::String(self.timestamp.to_rfc3339()),
            "active_specialists" => Value::Array(
                self.active_specialists
                    .iter()
                    .map(|s| Value::String(s.as_str().to_string()))
                    .collect(),
            ),
            "protocols" => Value::Array(
                self.protocols
                    .iter()
                    .map(|p| Value::String(p.clone()))
                    .collect(),
            ),
            "halted" => Value::Bool(self.halted),
            other => self.attributes.get(other).cloned()?,
        };
        if value.is_null() {
            None
        } else {
            Some(value)
        }
    }
}

// ---------------------------------------------------------------------------
// CaseCapabilities
// ---------------------------------------------------------------------------

/// Side effects a run may request on its case.
///
/// Implementations own the real effect (notifying a dispatcher, queueing a
/// stage change, ...). Any method may fail; callers decide how to surface it.
pub trait CaseCapabilities {
    fn advance_stage(&mut self, case_id: &str, stage: Stage) -> Result<()>;
    fn activate_specialist(&mut self, case_id: &str, specialist: Specialist) -> Result<()>;
    fn activate_protocol(&mut self, case_id: &str, protocol: &str) -> Result<()>;
    fn modify_score(&mut self, case_id: &str, delta: f64) -> Result<()>;
    fn halt_pipeline(&mut self, case_id: &str, reason: &str) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "capability", rename_all = "snake_case")]
pub enum CapabilityCall {
    AdvanceStage { stage: Stage },
    ActivateSpecialist { specialist: Specialist },
    ActivateProtocol { protocol: String },
    ModifyScore { delta: f64 },
    HaltPipeline { reason: String },
}

impl CapabilityCall {
    pub fn name(&self) -> &'static str {
        match self {
            CapabilityCall::AdvanceStage { .. } => "advance_stage",
            CapabilityCall::ActivateSpecialist { .. } => "activate_specialist",
            CapabilityCall::ActivateProtocol { .. } => "activate_protocol",
            CapabilityCall::ModifyScore { .. } => "modify_score",
            CapabilityCall::HaltPipeline { .. } => "halt_pipeline",
        }
    }
}

/// Records every capability call; optionally fails selected capabilities.
#[derive(Debug, Default)]
pub struct RecordingCapabilities {
    pub calls: Vec<CapabilityCall>,
    fail_on: Vec<&'static str>,
}

impl RecordingCapabilities {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the named capability return an error on every call.
    pub fn failing(mut self, capability: &'static str) -> Self {
        self.fail_on.push(capability);
        self
    }

    fn record(&mut self, call: CapabilityCall) -> Result<()> {
        let name = call.name();
        if self.fail_on.contains(&name) {
            return Err(CaseworkError::Capability {
                capability: name.to_string(),
                reason: "capability unavailable".to_string(),
            });
        }
        self.calls.push(call);
        Ok(())
    }
}

impl CaseCapabilities for RecordingCapabilities {
    fn advance_stage(&mut self, _case_id: &str, stage: Stage) -> Result<()> {
        self.record(CapabilityCall::AdvanceStage { stage })
    }

    fn activate_specialist(&mut self, _case_id: &str, specialist: Specialist) -> Result<()> {
        self.record(CapabilityCall::ActivateSpecialist { specialist })
    }

    fn activate_protocol(&mut self, _case_id: &str, protocol: &str) -> Result<()> {
        self.record(CapabilityCall::ActivateProtocol {
            protocol: protocol.to_string(),
        })
    }

    fn modify_score(&mut self, _case_id: &str, delta: f64) -> Result<()> {
        self.record(CapabilityCall::ModifyScore { delta })
    }

    fn halt_pipeline(&mut self, _case_id: &str, reason: &str) -> Result<()> {
        self.record(CapabilityCall::HaltPipeline {
            reason: reason.to_string(),
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn from_value_requires_object() {
        let err = ExecutionContext::from_value(json!("nope")).unwrap_err();
        assert!(matches!(err, CaseworkError::InvalidContext(_)));
    }

    #[test]
    fn from_value_requires_record_type() {
        let err = ExecutionContext::from_value(json!({"case_id": "c1", "record_type": "  "}))
            .unwrap_err();
        assert!(err.to_string().contains("record_type"));
    }

    #[test]
    fn from_value_rejects_out_of_range_confidence() {
        let err = ExecutionContext::from_value(json!({
            "case_id": "c1",
            "record_type": "evidence",
            "confidence": 140.0
        }))
        .unwrap_err();
        assert!(matches!(err, CaseworkError::ConfidenceOutOfRange { .. }));
    }

    #[test]
    fn from_value_fills_defaults() {
        let ctx = ExecutionContext::from_value(json!({
            "case_id": "c1",
            "record_type": "hypothesis",
            "narrative": "suspect seen near the dock",
            "evidence": ["a"]
        }))
        .unwrap();
        assert_eq!(ctx.stage, Stage::EvidenceIntake);
        assert!(ctx.specialist.is_none());
        assert!(!ctx.halted);
        assert_eq!(ctx.field("evidence"), Some(json!(["a"])));
    }

    #[test]
    fn field_lookup_prefers_builtins_and_hides_null() {
        let ctx = ExecutionContext::new("c1", "evidence", "text")
            .with_confidence(55.0)
            .with_attribute("record_type", json!("shadowed"))
            .with_attribute("witness", Value::Null)
            .with_attribute("items", json!([1, 2, 3]));

        assert_eq!(ctx.field("record_type"), Some(json!("evidence")));
        assert_eq!(ctx.field("confidence"), Some(json!(55.0)));
        assert_eq!(ctx.field("witness"), None);
        assert_eq!(ctx.field("missing"), None);
        assert_eq!(ctx.field("specialist"), None);
        assert_eq!(ctx.field("items"), Some(json!([1, 2, 3])));
    }

    #[test]
    fn activate_is_idempotent() {
        let mut ctx = ExecutionContext::new("c1", "evidence", "");
        assert!(ctx.activate(Specialist::Forensic));
        assert!(!ctx.activate(Specialist::Forensic));
        assert_eq!(ctx.active_specialists, vec![Specialist::Forensic]);
    }

    #[test]
    fn recording_capabilities_can_fail() {
        let mut caps = RecordingCapabilities::new().failing("halt_pipeline");
        caps.activate_protocol("c1", "conflict_resolution").unwrap();
        let err = caps.halt_pipeline("c1", "stop").unwrap_err();
        assert!(err.to_string().contains("halt_pipeline"));
        assert_eq!(caps.calls.len(), 1);
    }
}
