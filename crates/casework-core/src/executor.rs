//! Action executor: run an ordered action list against one context.
//!
//! The batch always completes. Each action yields at least one [`EffectLog`];
//! a failing handler is logged at `error` and the loop moves on.

use crate::action::{Action, ActionKind};
use crate::context::{is_builtin_field, CaseCapabilities, ExecutionContext};
use crate::error::{check_range, CaseworkError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::time::Instant;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// EffectLog
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
    Critical,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warning => "warning",
            LogLevel::Error => "error",
            LogLevel::Critical => "critical",
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EffectLog {
    pub id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_id: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}

impl EffectLog {
    fn new(action_id: Option<&str>, level: LogLevel, message: impl Into<String>, metadata: Value) -> Self {
        let metadata = match metadata {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self {
            id: Uuid::new_v4(),
            action_id: action_id.map(str::to_string),
            timestamp: Utc::now(),
            level,
            message: message.into(),
            metadata,
        }
    }

    fn trace(&self, case_id: &str) {
        let action = self.action_id.as_deref().unwrap_or("-");
        match self.level {
            LogLevel::Debug => tracing::debug!(case = %case_id, action, "{}", self.message),
            LogLevel::Info => tracing::info!(case = %case_id, action, "{}", self.message),
            LogLevel::Warning => tracing::warn!(case = %case_id, action, "{}", self.message),
            LogLevel::Error => tracing::error!(case = %case_id, action, "{}", self.message),
            LogLevel::Critical => {
                tracing::error!(case = %case_id, action, critical = true, "{}", self.message)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Executor
// ---------------------------------------------------------------------------

/// Collects logs for one batch and mirrors each into `tracing`.
struct Journal<'a> {
    case_id: &'a str,
    logs: Vec<EffectLog>,
}

impl Journal<'_> {
    fn push(&mut self, action_id: Option<&str>, level: LogLevel, message: impl Into<String>, metadata: Value) {
        let log = EffectLog::new(action_id, level, message, metadata);
        log.trace(self.case_id);
        self.logs.push(log);
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ActionExecutor;

impl ActionExecutor {
    pub fn new() -> Self {
        Self
    }

    /// Execute `actions` strictly in order.
    ///
    /// Returns `start + per-action logs + summary`; never fails.
    pub fn execute(
        &self,
        actions: &[Action],
        ctx: &mut ExecutionContext,
        caps: &mut dyn CaseCapabilities,
    ) -> Vec<EffectLog> {
        let started = Instant::now();
        let case_id = ctx.case_id.clone();
        let mut journal = Journal {
            case_id: &case_id,
            logs: Vec::with_capacity(actions.len() + 2),
        };

        journal.push(
            None,
            LogLevel::Info,
            format!("executing {} action(s)", actions.len()),
            json!({"case_id": case_id, "count": actions.len()}),
        );

        let mut succeeded = 0usize;
        let mut failed = 0usize;
        let mut skipped = 0usize;

        for action in actions {
            let outcome = ActionKind::decode(action).and_then(|kind| match kind {
                ActionKind::Unmapped { action_type } => Ok(Outcome::Skipped(action_type)),
                kind => apply(action, kind, ctx, caps, &mut journal).map(|_| Outcome::Done),
            });

            match outcome {
                Ok(Outcome::Done) => succeeded += 1,
                Ok(Outcome::Skipped(action_type)) => {
                    skipped += 1;
                    journal.push(
                        Some(&action.id),
                        LogLevel::Warning,
                        format!("no handler for action type '{action_type}'; skipped"),
                        json!({"type": action_type}),
                    );
                }
                Err(e) => {
                    failed += 1;
                    journal.push(
                        Some(&action.id),
                        LogLevel::Error,
                        format!("action '{}' failed: {e}", action.id),
                        json!({"type": action.action_type, "error": e.to_string()}),
                    );
                }
            }
        }

        let elapsed_ms = started.elapsed().as_millis() as u64;
        journal.push(
            None,
            LogLevel::Info,
            format!("batch finished: {succeeded} succeeded, {failed} failed, {skipped} skipped"),
            json!({
                "succeeded": succeeded,
                "failed": failed,
                "skipped": skipped,
                "elapsed_ms": elapsed_ms,
            }),
        );

        journal.logs
    }
}

enum Outcome {
    Done,
    Skipped(String),
}

/// Run one decoded action. Capabilities are called before the context is
/// touched so a failed capability leaves the context unchanged.
fn apply(
    action: &Action,
    kind: ActionKind,
    ctx: &mut ExecutionContext,
    caps: &mut dyn CaseCapabilities,
    journal: &mut Journal<'_>,
) -> Result<()> {
    let id = Some(action.id.as_str());
    match kind {
        ActionKind::UpdateField { field, value } => {
            if field.trim().is_empty() {
                return Err(invalid(action, "field name is empty"));
            }
            if is_builtin_field(&field) {
                return Err(invalid(action, &format!("'{field}' is a built-in field; use its dedicated action")));
            }
            ctx.attributes.insert(field.clone(), value.clone());
            journal.push(id, LogLevel::Info, format!("field '{field}' updated"), json!({"field": field, "value": value}));
        }
        ActionKind::RequestCrossValidation { specialists, reason } => {
            if specialists.is_empty() {
                return Err(invalid(action, "no specialists named for cross-validation"));
            }
            for sp in &specialists {
                caps.activate_specialist(&ctx.case_id, *sp)?;
                ctx.activate(*sp);
            }
            let names: Vec<&str> = specialists.iter().map(|s| s.as_str()).collect();
            journal.push(
                id,
                LogLevel::Info,
                format!("cross-validation requested from {}", names.join(", ")),
                json!({"specialists": names, "reason": reason}),
            );
        }
        ActionKind::Notify { channel, message } => {
            journal.push(id, LogLevel::Info, format!("notify {channel}: {message}"), json!({"channel": channel}));
        }
        ActionKind::CreateTask { task, assignee } => {
            journal.push(
                id,
                LogLevel::Info,
                format!("task '{task}' created"),
                json!({"task": task, "assignee": assignee.map(|s| s.as_str())}),
            );
        }
        ActionKind::UpdateMemory { key, value } => {
            journal.push(id, LogLevel::Debug, format!("memory '{key}' updated"), json!({"key": key, "value": value}));
        }
        ActionKind::TransitionState { stage } => {
            let from = ctx.stage;
            caps.advance_stage(&ctx.case_id, stage)?;
            ctx.stage = stage;
            journal.push(
                id,
                LogLevel::Info,
                format!("stage {from} -> {stage}"),
                json!({"from": from, "to": stage}),
            );
        }
        ActionKind::ActivateSpecialist { specialist } => {
            caps.activate_specialist(&ctx.case_id, specialist)?;
            let newly = ctx.activate(specialist);
            let message = if newly {
                format!("specialist {specialist} activated")
            } else {
                format!("specialist {specialist} already active")
            };
            journal.push(id, LogLevel::Info, message, json!({"specialist": specialist}));
        }
        ActionKind::ActivateProtocol { protocol } => {
            if protocol.trim().is_empty() {
                return Err(invalid(action, "protocol name is empty"));
            }
            caps.activate_protocol(&ctx.case_id, &protocol)?;
            if !ctx.protocols.contains(&protocol) {
                ctx.protocols.push(protocol.clone());
            }
            journal.push(id, LogLevel::Info, format!("protocol '{protocol}' activated"), json!({"protocol": protocol}));
        }
        ActionKind::ModifyScore { delta } => {
            let updated = check_range(ctx.confidence + delta, 0.0, 100.0)?;
            caps.modify_score(&ctx.case_id, delta)?;
            let before = ctx.confidence;
            ctx.confidence = updated;
            journal.push(
                id,
                LogLevel::Info,
                format!("confidence {before} -> {updated}"),
                json!({"delta": delta, "before": before, "after": updated}),
            );
        }
        ActionKind::HaltPipeline { reason } => {
            // The halt is recorded even when the capability refuses it.
            ctx.halted = true;
            match caps.halt_pipeline(&ctx.case_id, &reason) {
                Ok(()) => journal.push(id, LogLevel::Warning, format!("pipeline halted: {reason}"), json!({"reason": reason})),
                Err(e) => journal.push(
                    id,
                    LogLevel::Critical,
                    format!("pipeline halt requested ({reason}) but capability failed: {e}"),
                    json!({"reason": reason, "error": e.to_string()}),
                ),
            }
        }
        ActionKind::Unmapped { .. } => {}
    }
    Ok(())
}

fn invalid(action: &Action, reason: &str) -> CaseworkError {
    CaseworkError::InvalidAction {
        id: action.id.clone(),
        action_type: action.action_type.clone(),
        reason: reason.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{CapabilityCall, RecordingCapabilities};
    use crate::types::{Specialist, Stage};

    fn ctx() -> ExecutionContext {
        ExecutionContext::new("case-7", "hypothesis", "").with_confidence(50.0)
    }

    fn count(logs: &[EffectLog], level: LogLevel) -> usize {
        logs.iter().filter(|l| l.level == level).count()
    }

    #[test]
    fn empty_batch_has_start_and_summary() {
        let mut caps = RecordingCapabilities::new();
        let logs = ActionExecutor::new().execute(&[], &mut ctx(), &mut caps);
        assert_eq!(logs.len(), 2);
        assert_eq!(logs[1].metadata["succeeded"], json!(0));
    }

    #[test]
    fn unmapped_actions_warn_and_skip() {
        let actions = vec![
            Action::new("a1", "send_fax", json!({})),
            Action::new("a2", "notify", json!({"message": "hello"})),
            Action::new("a3", "summon_oracle", json!({})),
        ];
        let mut caps = RecordingCapabilities::new();
        let logs = ActionExecutor::new().execute(&actions, &mut ctx(), &mut caps);

        assert!(logs.len() >= actions.len() + 2);
        assert!(count(&logs, LogLevel::Warning) >= 2);
        let summary = logs.last().unwrap();
        assert_eq!(summary.metadata["skipped"], json!(2));
        assert_eq!(summary.metadata["succeeded"], json!(1));
    }

    #[test]
    fn failing_action_does_not_abort_batch() {
        let actions = vec![
            Action::new("bad", "modify_score", json!({"delta": "lots"})),
            Action::new("good", "activate_specialist", json!({"specialist": "forensic"})),
        ];
        let mut context = ctx();
        let mut caps = RecordingCapabilities::new();
        let logs = ActionExecutor::new().execute(&actions, &mut context, &mut caps);

        let error = logs.iter().find(|l| l.level == LogLevel::Error).unwrap();
        assert_eq!(error.action_id.as_deref(), Some("bad"));
        assert!(context.is_active(Specialist::Forensic));
        assert_eq!(logs.last().unwrap().metadata["failed"], json!(1));
    }

    #[test]
    fn score_outside_range_is_rejected() {
        let actions = vec![Action::new("s", "modify_score", json!({"delta": 80}))];
        let mut context = ctx();
        let mut caps = RecordingCapabilities::new();
        let logs = ActionExecutor::new().execute(&actions, &mut context, &mut caps);

        assert_eq!(count(&logs, LogLevel::Error), 1);
        assert_eq!(context.confidence, 50.0);
        assert!(caps.calls.is_empty());
    }

    #[test]
    fn update_field_refuses_builtin_names() {
        let actions = vec![
            Action::new("u1", "update_field", json!({"field": "confidence", "value": 99})),
            Action::new("u2", "update_field", json!({"field": "stage", "value": "synthesis"})),
            Action::new("u3", "update_field", json!({"field": "lead", "value": "dock 9"})),
        ];
        let mut context = ctx();
        let mut caps = RecordingCapabilities::new();
        let logs = ActionExecutor::new().execute(&actions, &mut context, &mut caps);

        assert_eq!(count(&logs, LogLevel::Error), 2);
        assert_eq!(context.confidence, 50.0);
        assert_eq!(context.stage, Stage::EvidenceIntake);
        assert!(!context.attributes.contains_key("confidence"));
        assert!(!context.attributes.contains_key("stage"));
        assert_eq!(context.attributes["lead"], json!("dock 9"));

        let reparsed = ExecutionContext::from_value(serde_json::to_value(&context).unwrap()).unwrap();
        assert_eq!(reparsed, context);
    }

    #[test]
    fn score_within_range_applies() {
        let actions = vec![Action::new("s", "modify_score", json!({"delta": -10}))];
        let mut context = ctx();
        let mut caps = RecordingCapabilities::new();
        ActionExecutor::new().execute(&actions, &mut context, &mut caps);
        assert_eq!(context.confidence, 40.0);
        assert_eq!(caps.calls, vec![CapabilityCall::ModifyScore { delta: -10.0 }]);
    }

    #[test]
    fn failed_capability_leaves_context_untouched() {
        let actions = vec![Action::new("t", "transition_state", json!({"stage": "synthesis"}))];
        let mut context = ctx();
        let mut caps = RecordingCapabilities::new().failing("advance_stage");
        let logs = ActionExecutor::new().execute(&actions, &mut context, &mut caps);
        assert_eq!(context.stage, Stage::EvidenceIntake);
        assert_eq!(count(&logs, LogLevel::Error), 1);
    }

    #[test]
    fn halt_is_logged_even_when_capability_fails() {
        let actions = vec![Action::new("h", "halt_pipeline", json!({"reason": "contradictions"}))];

        let mut context = ctx();
        let mut caps = RecordingCapabilities::new();
        let logs = ActionExecutor::new().execute(&actions, &mut context, &mut caps);
        assert!(context.halted);
        assert_eq!(count(&logs, LogLevel::Warning), 1);

        let mut context = ctx();
        let mut caps = RecordingCapabilities::new().failing("halt_pipeline");
        let logs = ActionExecutor::new().execute(&actions, &mut context, &mut caps);
        assert!(context.halted);
        assert_eq!(count(&logs, LogLevel::Critical), 1);
        assert_eq!(count(&logs, LogLevel::Error), 0);
    }

    #[test]
    fn repeated_actions_are_tolerated() {
        let a = Action::new("p", "activate_protocol", json!({"protocol": "conflict_resolution"}));
        let mut context = ctx();
        let mut caps = RecordingCapabilities::new();
        let logs = ActionExecutor::new().execute(&[a.clone(), a], &mut context, &mut caps);
        assert_eq!(context.protocols, vec!["conflict_resolution"]);
        assert_eq!(caps.calls.len(), 2);
        assert_eq!(logs.last().unwrap().metadata["succeeded"], json!(2));
    }

    #[test]
    fn update_field_writes_attribute() {
        let actions = vec![Action::new("u", "update_field", json!({"field": "priority", "value": "high"}))];
        let mut context = ctx();
        let mut caps = RecordingCapabilities::new();
        ActionExecutor::new().execute(&actions, &mut context, &mut caps);
        assert_eq!(context.field("priority"), Some(json!("high")));
    }

    #[test]
    fn cross_validation_activates_specialists() {
        let actions = vec![Action::new(
            "x",
            "request_cross_validation",
            json!({"specialists": ["forensic", "behavioral"]}),
        )];
        let mut context = ctx();
        let mut caps = RecordingCapabilities::new();
        ActionExecutor::new().execute(&actions, &mut context, &mut caps);
        assert_eq!(
            context.active_specialists,
            vec![Specialist::Forensic, Specialist::Behavioral]
        );
    }
}
