//! Run driver: one ingested finding from schema check to persisted status.

use crate::context::{CapabilityCall, ExecutionContext, RecordingCapabilities};
use crate::decision::{Command, DecisionEngine};
use crate::error::{CaseworkError, Result};
use crate::executor::{ActionExecutor, EffectLog};
use crate::rules::RuleStore;
use crate::schema::{BuiltinSchemas, SchemaValidator};
use crate::store::{CaseStatus, CaseStore};
use crate::trigger::{TriggerEngine, TriggerResult};
use crate::types::{InvestigationVariant, Stage};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// RunRegistry
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunInfo {
    pub run_id: Uuid,
    pub case_id: String,
    pub started_at: DateTime<Utc>,
}

/// In-flight runs keyed by case. At most one run per case at a time.
#[derive(Debug, Default)]
pub struct RunRegistry {
    runs: Mutex<HashMap<String, RunInfo>>,
}

impl RunRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a run for `case_id`; the returned guard deregisters it on drop.
    pub fn begin(&self, case_id: &str) -> Result<RunGuard<'_>> {
        let mut runs = self.runs.lock().unwrap_or_else(|e| e.into_inner());
        if runs.contains_key(case_id) {
            return Err(CaseworkError::RunInFlight(case_id.to_string()));
        }
        let info = RunInfo {
            run_id: Uuid::new_v4(),
            case_id: case_id.to_string(),
            started_at: Utc::now(),
        };
        runs.insert(case_id.to_string(), info.clone());
        Ok(RunGuard {
            registry: self,
            info,
        })
    }

    pub fn is_running(&self, case_id: &str) -> bool {
        let runs = self.runs.lock().unwrap_or_else(|e| e.into_inner());
        runs.contains_key(case_id)
    }

    pub fn active(&self) -> Vec<RunInfo> {
        let runs = self.runs.lock().unwrap_or_else(|e| e.into_inner());
        let mut list: Vec<RunInfo> = runs.values().cloned().collect();
        list.sort_by(|a, b| a.started_at.cmp(&b.started_at));
        list
    }
}

pub struct RunGuard<'a> {
    registry: &'a RunRegistry,
    info: RunInfo,
}

impl RunGuard<'_> {
    pub fn run_id(&self) -> Uuid {
        self.info.run_id
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        let mut runs = self.registry.runs.lock().unwrap_or_else(|e| e.into_inner());
        runs.remove(&self.info.case_id);
    }
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunOutcome {
    pub run_id: Uuid,
    pub case_id: String,
    pub commands: Vec<Command>,
    pub trigger: TriggerResult,
    pub logs: Vec<EffectLog>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub capability_calls: Vec<CapabilityCall>,
    pub halted: bool,
    pub stage: Stage,
}

pub struct Orchestrator {
    decisions: DecisionEngine,
    triggers: TriggerEngine,
    executor: ActionExecutor,
    schemas: Box<dyn SchemaValidator>,
}

impl Orchestrator {
    pub fn new(rules: Arc<RuleStore>, variant: InvestigationVariant) -> Self {
        Self {
            decisions: DecisionEngine::new(variant),
            triggers: TriggerEngine::new(rules),
            executor: ActionExecutor::new(),
            schemas: Box::new(BuiltinSchemas),
        }
    }

    pub fn with_schemas(mut self, schemas: Box<dyn SchemaValidator>) -> Self {
        self.schemas = schemas;
        self
    }

    pub fn decisions(&self) -> &DecisionEngine {
        &self.decisions
    }

    pub fn triggers(&self) -> &TriggerEngine {
        &self.triggers
    }

    /// Build the context for `finding`, overlaying whatever the store knows
    /// about the case. Fails if the finding does not pass the schema.
    pub fn prepare(&self, finding: &Value, store: &dyn CaseStore) -> Result<ExecutionContext> {
        let mut ctx = self.parse(finding)?;
        overlay_status(&mut ctx, finding, store)?;
        Ok(ctx)
    }

    fn parse(&self, finding: &Value) -> Result<ExecutionContext> {
        let report = self.schemas.validate("finding", finding);
        if !report.valid {
            return Err(CaseworkError::SchemaRejected {
                schema: "finding".to_string(),
                errors: report.errors.join("; "),
            });
        }
        ExecutionContext::from_value(finding.clone())
    }

    /// Decide, evaluate rules, execute actions and persist the new status.
    ///
    /// A case whose pipeline is halted still gets commands, but no rule
    /// actions are executed for it.
    pub fn run(
        &self,
        finding: &Value,
        store: &dyn CaseStore,
        registry: &RunRegistry,
    ) -> Result<RunOutcome> {
        let mut ctx = self.parse(finding)?;
        // Register before reading stored status so no other run for this case
        // can load and save in between.
        let guard = registry.begin(&ctx.case_id)?;
        overlay_status(&mut ctx, finding, store)?;
        let run_id = guard.run_id();
        tracing::info!(%run_id, case = %ctx.case_id, record_type = %ctx.record_type, stage = %ctx.stage, "run started");

        let commands = self.decisions.decide(&ctx);
        let mut caps = RecordingCapabilities::new();

        let (trigger, logs) = if ctx.halted {
            tracing::warn!(%run_id, case = %ctx.case_id, "pipeline halted; rule actions not executed");
            (TriggerResult::default(), Vec::new())
        } else {
            let trigger = self.triggers.evaluate(&ctx);
            let logs = self.executor.execute(&trigger.actions, &mut ctx, &mut caps);
            (trigger, logs)
        };

        store.save_status(
            &ctx.case_id,
            &CaseStatus {
                stage: ctx.stage,
                specialist: ctx.specialist,
                confidence: ctx.confidence,
                timestamp: Utc::now(),
                active_specialists: ctx.active_specialists.clone(),
                protocols: ctx.protocols.clone(),
                halted: ctx.halted,
            },
        )?;

        tracing::info!(
            %run_id,
            case = %ctx.case_id,
            commands = commands.len(),
            matched = trigger.matched_rule_ids.len(),
            halted = ctx.halted,
            "run finished"
        );

        Ok(RunOutcome {
            run_id,
            case_id: ctx.case_id,
            commands,
            trigger,
            logs,
            capability_calls: caps.calls,
            halted: ctx.halted,
            stage: ctx.stage,
        })
    }
}

/// Fields present on the finding win over the stored status; specialist and
/// protocol sets are merged and `halted` is sticky.
fn overlay_status(ctx: &mut ExecutionContext, finding: &Value, store: &dyn CaseStore) -> Result<()> {
    let Some(status) = store.load_status(&ctx.case_id)? else {
        return Ok(());
    };
    if finding.get("stage").is_none() {
        ctx.stage = status.stage;
    }
    if finding.get("confidence").is_none() {
        ctx.confidence = status.confidence;
    }
    if ctx.specialist.is_none() {
        ctx.specialist = status.specialist;
    }
    for sp in status.active_specialists {
        ctx.activate(sp);
    }
    for p in status.protocols {
        if !ctx.protocols.contains(&p) {
            ctx.protocols.push(p);
        }
    }
    ctx.halted = ctx.halted || status.halted;
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decision::CommandAction;
    use crate::rules::RuleSet;
    use crate::store::MemoryCaseStore;
    use crate::types::Specialist;
    use serde_json::json;

    fn orchestrator() -> Orchestrator {
        Orchestrator::new(
            Arc::new(RuleStore::new(RuleSet::builtin())),
            InvestigationVariant::Standard,
        )
    }

    #[test]
    fn run_executes_matched_rules_and_persists() {
        let store = MemoryCaseStore::new();
        let registry = RunRegistry::new();
        let outcome = orchestrator()
            .run(
                &json!({
                    "case_id": "c1",
                    "record_type": "timeline",
                    "narrative": "timeline entries conflicting",
                    "confidence": 60,
                    "conflicts": ["entry 4 vs entry 9"]
                }),
                &store,
                &registry,
            )
            .unwrap();

        assert_eq!(outcome.trigger.matched_rule_ids, vec!["timeline_conflict"]);
        assert_eq!(outcome.logs.len(), 4);
        assert_eq!(outcome.commands.last().unwrap().action, CommandAction::RecordContext);
        assert!(!registry.is_running("c1"));

        let saved = store.load_status("c1").unwrap().unwrap();
        assert_eq!(saved.confidence, 50.0);
        assert_eq!(saved.protocols, vec!["conflict_resolution"]);
    }

    #[test]
    fn stored_status_is_overlaid() {
        let store = MemoryCaseStore::new();
        store
            .save_status(
                "c2",
                &CaseStatus {
                    stage: Stage::Synthesis,
                    specialist: None,
                    confidence: 70.0,
                    timestamp: Utc::now(),
                    active_specialists: vec![Specialist::Behavioral, Specialist::Forensic],
                    protocols: Vec::new(),
                    halted: false,
                },
            )
            .unwrap();

        let outcome = orchestrator()
            .run(
                &json!({"case_id": "c2", "record_type": "character_profile", "specialist": "behavioral"}),
                &store,
                &RunRegistry::new(),
            )
            .unwrap();
        assert_eq!(outcome.trigger.matched_rule_ids, vec!["joint_profile_ready"]);
        assert_eq!(outcome.stage, Stage::CrossValidation);
        assert!(outcome.commands.iter().all(|c| c.action != CommandAction::Pause));
        assert_eq!(store.load_status("c2").unwrap().unwrap().confidence, 70.0);
    }

    #[test]
    fn finding_confidence_wins_over_stored() {
        let store = MemoryCaseStore::new();
        let o = orchestrator();
        let registry = RunRegistry::new();
        o.run(
            &json!({"case_id": "c7", "record_type": "evidence", "confidence": 80}),
            &store,
            &registry,
        )
        .unwrap();
        let ctx = o
            .prepare(&json!({"case_id": "c7", "record_type": "evidence", "confidence": 20}), &store)
            .unwrap();
        assert_eq!(ctx.confidence, 20.0);
        let ctx = o
            .prepare(&json!({"case_id": "c7", "record_type": "evidence"}), &store)
            .unwrap();
        assert_eq!(ctx.confidence, 80.0);
    }

    /// Starts a second run for the same case from inside `load_status`, the
    /// window between reading and saving the stored status.
    struct ReentrantStore<'a> {
        inner: MemoryCaseStore,
        orchestrator: &'a Orchestrator,
        registry: &'a RunRegistry,
        nested: Mutex<Option<Result<RunOutcome>>>,
    }

    impl CaseStore for ReentrantStore<'_> {
        fn load_status(&self, case_id: &str) -> Result<Option<CaseStatus>> {
            let first = self.nested.lock().map(|n| n.is_none()).unwrap_or(false);
            if first {
                let finding = json!({"case_id": case_id, "record_type": "evidence", "confidence": 10});
                let res = self.orchestrator.run(&finding, self, self.registry);
                *self.nested.lock().unwrap() = Some(res);
            }
            self.inner.load_status(case_id)
        }

        fn save_status(&self, case_id: &str, status: &CaseStatus) -> Result<()> {
            self.inner.save_status(case_id, status)
        }
    }

    #[test]
    fn run_is_registered_before_stored_status_is_read() {
        let o = orchestrator();
        let registry = RunRegistry::new();
        let store = ReentrantStore {
            inner: MemoryCaseStore::new(),
            orchestrator: &o,
            registry: &registry,
            nested: Mutex::new(None),
        };

        o.run(
            &json!({"case_id": "c8", "record_type": "evidence", "confidence": 90}),
            &store,
            &registry,
        )
        .unwrap();

        let nested = store.nested.lock().unwrap().take().unwrap();
        assert!(matches!(nested, Err(CaseworkError::RunInFlight(_))));
        assert_eq!(store.inner.load_status("c8").unwrap().unwrap().confidence, 90.0);
        assert!(!registry.is_running("c8"));
    }

    #[test]
    fn schema_rejection_stops_the_run() {
        let err = orchestrator()
            .run(
                &json!({"case_id": "c3", "record_type": "evidence", "confidence": "high"}),
                &MemoryCaseStore::new(),
                &RunRegistry::new(),
            )
            .unwrap_err();
        assert!(matches!(err, CaseworkError::SchemaRejected { .. }));
    }

    #[test]
    fn halted_case_skips_actions() {
        let store = MemoryCaseStore::new();
        let registry = RunRegistry::new();
        let o = orchestrator();
        let halting = json!({"case_id": "c4", "record_type": "hypothesis", "confidence": 50, "contradictions": 3});
        let first = o.run(&halting, &store, &registry).unwrap();
        assert!(first.halted);

        let second = o.run(&halting, &store, &registry).unwrap();
        assert!(second.halted);
        assert!(second.logs.is_empty());
        assert!(!second.trigger.triggered);
        assert!(!second.commands.is_empty());
    }

    #[test]
    fn registry_rejects_concurrent_run_for_same_case() {
        let registry = RunRegistry::new();
        let guard = registry.begin("c5").unwrap();
        assert!(matches!(
            registry.begin("c5"),
            Err(CaseworkError::RunInFlight(_))
        ));
        assert!(registry.begin("c6").is_ok());
        assert_eq!(registry.active().len(), 1);
        drop(guard);
        assert!(registry.begin("c5").is_ok());
    }
}
