//! Actions: what a matched rule asks the executor to do.
//!
//! On the wire an action is `{ id, type, params }` with free-form params.
//! [`ActionKind::decode`] turns it into a closed enum; types with no handler
//! decode to [`ActionKind::Unmapped`] so the executor can warn and move on.

use crate::error::{CaseworkError, Result};
use crate::types::{Specialist, Stage};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ---------------------------------------------------------------------------
// Action (wire form)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub id: String,
    #[serde(rename = "type")]
    pub action_type: String,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub params: Map<String, Value>,
}

impl Action {
    /// Build an action; `params` must be a JSON object (anything else is dropped).
    pub fn new(id: impl Into<String>, action_type: impl Into<String>, params: Value) -> Self {
        let params = match params {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self {
            id: id.into(),
            action_type: action_type.into(),
            params,
        }
    }
}

// ---------------------------------------------------------------------------
// ActionKind
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActionKind {
    UpdateField {
        field: String,
        value: Value,
    },
    RequestCrossValidation {
        #[serde(default)]
        specialists: Vec<Specialist>,
        #[serde(default)]
        reason: Option<String>,
    },
    Notify {
        #[serde(default = "default_channel")]
        channel: String,
        message: String,
    },
    CreateTask {
        task: String,
        #[serde(default)]
        assignee: Option<Specialist>,
    },
    UpdateMemory {
        key: String,
        value: Value,
    },
    TransitionState {
        stage: Stage,
    },
    ActivateSpecialist {
        specialist: Specialist,
    },
    ActivateProtocol {
        protocol: String,
    },
    ModifyScore {
        delta: f64,
    },
    HaltPipeline {
        #[serde(default = "default_halt_reason")]
        reason: String,
    },
    /// No handler exists for this type tag.
    #[serde(skip)]
    Unmapped { action_type: String },
}

fn default_channel() -> String {
    "case_team".to_string()
}

fn default_halt_reason() -> String {
    "halt requested by rule".to_string()
}

impl ActionKind {
    pub const TYPES: &'static [&'static str] = &[
        "update_field",
        "request_cross_validation",
        "notify",
        "create_task",
        "update_memory",
        "transition_state",
        "activate_specialist",
        "activate_protocol",
        "modify_score",
        "halt_pipeline",
    ];

    pub fn is_mapped(action_type: &str) -> bool {
        Self::TYPES.contains(&action_type)
    }

    /// Decode a wire action.
    ///
    /// Unknown type tags yield `Ok(Unmapped)`; a known tag with params that
    /// don't fit its shape is an error.
    pub fn decode(action: &Action) -> Result<ActionKind> {
        if !Self::is_mapped(&action.action_type) {
            return Ok(ActionKind::Unmapped {
                action_type: action.action_type.clone(),
            });
        }
        let mut obj = action.params.clone();
        obj.insert(
            "type".to_string(),
            Value::String(action.action_type.clone()),
        );
        serde_json::from_value(Value::Object(obj)).map_err(|e| CaseworkError::InvalidAction {
            id: action.id.clone(),
            action_type: action.action_type.clone(),
            reason: e.to_string(),
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
    fn decode_known_action() {
        let action = Action::new(
            "a1",
            "activate_specialist",
            json!({"specialist": "forensic"}),
        );
        assert_eq!(
            ActionKind::decode(&action).unwrap(),
            ActionKind::ActivateSpecialist {
                specialist: Specialist::Forensic
            }
        );
    }

    #[test]
    fn decode_applies_param_defaults() {
        let action = Action::new("a2", "notify", json!({"message": "new evidence"}));
        match ActionKind::decode(&action).unwrap() {
            ActionKind::Notify { channel, message } => {
                assert_eq!(channel, "case_team");
                assert_eq!(message, "new evidence");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn decode_unknown_type_is_unmapped() {
        let action = Action::new("a3", "send_fax", json!({}));
        assert_eq!(
            ActionKind::decode(&action).unwrap(),
            ActionKind::Unmapped {
                action_type: "send_fax".to_string()
            }
        );
    }

    #[test]
    fn decode_bad_params_is_error() {
        let action = Action::new("a4", "modify_score", json!({"delta": "lots"}));
        let err = ActionKind::decode(&action).unwrap_err();
        assert!(err.to_string().contains("a4"));
    }

    #[test]
    fn wire_form_uses_type_key() {
        let action: Action = serde_json::from_value(json!({
            "id": "a5",
            "type": "halt_pipeline"
        }))
        .unwrap();
        assert_eq!(action.action_type, "halt_pipeline");
        assert!(action.params.is_empty());
        assert!(matches!(
            ActionKind::decode(&action).unwrap(),
            ActionKind::HaltPipeline { .. }
        ));
    }
}
