//! Trigger engine: match rules against an execution context.
//!
//! Evaluation is total. A missing field, a type mismatch, or an unknown
//! operator makes a condition false; nothing here returns an error.

use crate::action::Action;
use crate::context::ExecutionContext;
use crate::rules::{Condition, Operator, RuleStore};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TriggerResult {
    pub triggered: bool,
    pub matched_rule_ids: Vec<String>,
    pub actions: Vec<Action>,
}

pub struct TriggerEngine {
    store: Arc<RuleStore>,
}

impl TriggerEngine {
    pub fn new(store: Arc<RuleStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<RuleStore> {
        &self.store
    }

    /// Evaluate every rule listening to `ctx.record_type`.
    ///
    /// Actions of matched rules are concatenated in rule order; repeats across
    /// rules are kept.
    pub fn evaluate(&self, ctx: &ExecutionContext) -> TriggerResult {
        let rules = self.store.snapshot();
        let mut result = TriggerResult::default();

        for rule in rules.rules.iter().filter(|r| r.event == ctx.record_type) {
            let matched = rule
                .conditions
                .iter()
                .all(|cond| evaluate_condition(&rule.id, cond, ctx));
            if matched {
                tracing::debug!(rule = %rule.id, case = %ctx.case_id, "rule matched");
                result.matched_rule_ids.push(rule.id.clone());
                result.actions.extend(rule.actions.iter().cloned());
            }
        }

        result.triggered = !result.matched_rule_ids.is_empty();
        result
    }

    /// Evaluate a raw payload, returning an empty result for anything that
    /// isn't a well-formed context.
    pub fn evaluate_value(&self, payload: &Value) -> TriggerResult {
        match ExecutionContext::from_value(payload.clone()) {
            Ok(ctx) => self.evaluate(&ctx),
            Err(e) => {
                tracing::warn!(error = %e, "malformed context; no rules evaluated");
                TriggerResult::default()
            }
        }
    }
}

pub fn evaluate_condition(rule_id: &str, cond: &Condition, ctx: &ExecutionContext) -> bool {
    let Some(actual) = ctx.field(&cond.field) else {
        return false;
    };

    // A numeric rule value against a sequence compares the sequence length.
    let actual = match (&actual, &cond.value) {
        (Value::Array(items), Value::Number(_)) => Value::from(items.len()),
        _ => actual,
    };

    match &cond.operator {
        Operator::Eq => values_equal(&actual, &cond.value),
        Operator::Ne => !values_equal(&actual, &cond.value),
        Operator::Gt => numeric(&actual, &cond.value).is_some_and(|(a, b)| a > b),
        Operator::Ge => numeric(&actual, &cond.value).is_some_and(|(a, b)| a >= b),
        Operator::Lt => numeric(&actual, &cond.value).is_some_and(|(a, b)| a < b),
        Operator::Le => numeric(&actual, &cond.value).is_some_and(|(a, b)| a <= b),
        Operator::IncludesBoth => match (&actual, &cond.value) {
            (Value::Array(have), Value::Array(want)) => want
                .iter()
                .all(|w| have.iter().any(|h| values_equal(h, w))),
            _ => false,
        },
        Operator::Unknown(raw) => {
            tracing::warn!(rule = %rule_id, operator = %raw, field = %cond.field, "unknown rule operator");
            false
        }
    }
}

fn numeric(a: &Value, b: &Value) -> Option<(f64, f64)> {
    Some((a.as_f64()?, b.as_f64()?))
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
