//! Payload schemas checked before a finding reaches the engines.

use crate::types::{Specialist, Stage};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub valid: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

impl ValidationReport {
    fn from_errors(errors: Vec<String>) -> Self {
        Self {
            valid: errors.is_empty(),
            errors,
        }
    }
}

pub trait SchemaValidator: Send + Sync {
    fn validate(&self, schema_id: &str, data: &Value) -> ValidationReport;
}

#[derive(Debug, Clone, Copy)]
enum Kind {
    Text,
    NonEmptyText,
    Percent,
    PositiveInt,
    Count,
    StageName,
    SpecialistName,
    List,
    Object,
}

struct Field {
    name: &'static str,
    kind: Kind,
    required: bool,
}

const fn req(name: &'static str, kind: Kind) -> Field {
    Field { name, kind, required: true }
}

const fn opt(name: &'static str, kind: Kind) -> Field {
    Field { name, kind, required: false }
}

const FINDING: &[Field] = &[
    req("case_id", Kind::NonEmptyText),
    req("record_type", Kind::NonEmptyText),
    opt("narrative", Kind::Text),
    opt("confidence", Kind::Percent),
    opt("stage", Kind::StageName),
    opt("specialist", Kind::SpecialistName),
    opt("active_specialists", Kind::List),
];

const RETRY_INPUT: &[Field] = &[
    req("stage", Kind::StageName),
    req("failure_type", Kind::NonEmptyText),
    req("attempt", Kind::PositiveInt),
    opt("specialist", Kind::SpecialistName),
    opt("confidence", Kind::Percent),
    opt("global_attempts", Kind::Count),
];

const REVIEW_INPUT: &[Field] = &[
    req("reviewer", Kind::NonEmptyText),
    opt("analysis", Kind::Object),
    opt("context", Kind::Object),
];

/// Schemas compiled into the crate: `finding`, `retry_input`, `review_input`.
#[derive(Debug, Default, Clone, Copy)]
pub struct BuiltinSchemas;

impl BuiltinSchemas {
    pub const IDS: &'static [&'static str] = &["finding", "retry_input", "review_input"];

    fn fields(schema_id: &str) -> Option<&'static [Field]> {
        match schema_id {
            "finding" => Some(FINDING),
            "retry_input" => Some(RETRY_INPUT),
            "review_input" => Some(REVIEW_INPUT),
            _ => None,
        }
    }
}

impl SchemaValidator for BuiltinSchemas {
    fn validate(&self, schema_id: &str, data: &Value) -> ValidationReport {
        let Some(fields) = Self::fields(schema_id) else {
            return ValidationReport::from_errors(vec![format!("unknown schema '{schema_id}'")]);
        };
        let Value::Object(obj) = data else {
            return ValidationReport::from_errors(vec!["payload must be a JSON object".to_string()]);
        };

        let mut errors = Vec::new();
        for field in fields {
            match obj.get(field.name) {
                None | Some(Value::Null) => {
                    if field.required {
                        errors.push(format!("'{}' is required", field.name));
                    }
                }
                Some(value) => {
                    if let Some(problem) = check(field.kind, value) {
                        errors.push(format!("'{}' {problem}", field.name));
                    }
                }
            }
        }
        ValidationReport::from_errors(errors)
    }
}

fn check(kind: Kind, value: &Value) -> Option<String> {
    match kind {
        Kind::Text => (!value.is_string()).then(|| "must be a string".to_string()),
        Kind::NonEmptyText => match value.as_str() {
            Some(s) if !s.trim().is_empty() => None,
            Some(_) => Some("must not be empty".to_string()),
            None => Some("must be a string".to_string()),
        },
        Kind::Percent => match value.as_f64() {
            Some(v) if (0.0..=100.0).contains(&v) => None,
            Some(v) => Some(format!("= {v} is outside [0, 100]")),
            None => Some("must be a number".to_string()),
        },
        Kind::PositiveInt => match value.as_i64() {
            Some(v) if v >= 1 => None,
            _ => Some("must be an integer >= 1".to_string()),
        },
        Kind::Count => match value.as_u64() {
            Some(_) => None,
            None => Some("must be a non-negative integer".to_string()),
        },
        Kind::StageName => match value.as_str() {
            Some(s) if s.parse::<Stage>().is_ok() => None,
            _ => Some("must be a known stage".to_string()),
        },
        Kind::SpecialistName => match value.as_str() {
            Some(s) if s.parse::<Specialist>().is_ok() => None,
            _ => Some("must be a known specialist".to_string()),
        },
        Kind::List => (!value.is_array()).then(|| "must be a list".to_string()),
        Kind::Object => (!value.is_object()).then(|| "must be an object".to_string()),
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
    fn valid_finding() {
        let report = BuiltinSchemas.validate(
            "finding",
            &json!({"case_id": "c1", "record_type": "evidence", "confidence": 55}),
        );
        assert!(report.valid, "{:?}", report.errors);
    }

    #[test]
    fn finding_errors_are_collected() {
        let report = BuiltinSchemas.validate(
            "finding",
            &json!({"record_type": "", "confidence": 140, "stage": "lunch"}),
        );
        assert!(!report.valid);
        assert_eq!(report.errors.len(), 4);
        assert!(report.errors[0].contains("case_id"));
    }

    #[test]
    fn unknown_schema_is_invalid() {
        let report = BuiltinSchemas.validate("invoice", &json!({}));
        assert!(!report.valid);
        assert!(report.errors[0].contains("invoice"));
    }

    #[test]
    fn non_object_is_invalid() {
        assert!(!BuiltinSchemas.validate("finding", &json!([1])).valid);
    }

    #[test]
    fn retry_input_attempt_must_be_positive() {
        let report = BuiltinSchemas.validate(
            "retry_input",
            &json!({"stage": "synthesis", "failure_type": "timeout", "attempt": 0}),
        );
        assert_eq!(report.errors, vec!["'attempt' must be an integer >= 1"]);
    }

    #[test]
    fn review_input_needs_reviewer() {
        let report = BuiltinSchemas.validate("review_input", &json!({"analysis": {}}));
        assert_eq!(report.errors, vec!["'reviewer' is required"]);
    }
}
