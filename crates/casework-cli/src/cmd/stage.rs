use crate::input::read_as;
use crate::output::{print_json, print_table};
use clap::Subcommand;
use casework_core::{
    stage::{AdvanceStatus, StageContext, StageEngine},
    types::{InvestigationVariant, Stage},
};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Subcommand)]
pub enum StageSubcommand {
    /// Check exit criteria for a stage and report where the case goes next
    Advance {
        /// Stage context file (JSON or YAML) with a `stage` field
        #[arg(long)]
        input: PathBuf,
    },
    /// Ask whether a case may jump ahead to a later stage
    Skip {
        /// File with `current`, `target` and an optional `context`
        #[arg(long)]
        input: PathBuf,
    },
    /// List stages, gates and required tasks
    List {
        /// Investigation variant (defaults to the configured one)
        #[arg(long)]
        variant: Option<String>,
    },
}

#[derive(Deserialize)]
struct AdvanceInput {
    stage: Stage,
    #[serde(flatten)]
    context: StageContext,
}

#[derive(Deserialize)]
struct SkipInput {
    current: Stage,
    target: Stage,
    #[serde(default)]
    context: StageContext,
}

pub fn run(root: &Path, subcommand: StageSubcommand, json: bool) -> anyhow::Result<()> {
    let engine = StageEngine::new();
    match subcommand {
        StageSubcommand::Advance { input } => advance(&engine, &input, json),
        StageSubcommand::Skip { input } => skip(&engine, &input, json),
        StageSubcommand::List { variant } => {
            let variant = match variant {
                Some(v) => v.parse()?,
                None => super::config_or_default(root)?.variant,
            };
            list(&engine, variant, json)
        }
    }
}

fn advance(engine: &StageEngine, input: &Path, json: bool) -> anyhow::Result<()> {
    let req: AdvanceInput = read_as(input)?;
    let result = engine.advance(req.stage, &req.context)?;

    if json {
        return print_json(&result);
    }

    match result.status {
        AdvanceStatus::Completed => {
            println!("{} complete. Next: {}", req.stage, result.next_stage)
        }
        AdvanceStatus::NeedsRefinement => println!("{} needs refinement.", req.stage),
        AdvanceStatus::Failed => println!("{} cannot advance yet.", req.stage),
    }
    for e in &result.errors {
        println!("  - {e}");
    }
    Ok(())
}

fn skip(engine: &StageEngine, input: &Path, json: bool) -> anyhow::Result<()> {
    let req: SkipInput = read_as(input)?;
    let decision = engine.can_skip_to(req.current, req.target, &req.context);

    if json {
        return print_json(&decision);
    }

    let verdict = if decision.allowed { "allowed" } else { "denied" };
    println!("Skip {verdict}: {}", decision.reason);
    Ok(())
}

fn list(engine: &StageEngine, variant: InvestigationVariant, json: bool) -> anyhow::Result<()> {
    let defs: Vec<_> = engine
        .sequence(variant)
        .iter()
        .map(|s| engine.definition(*s))
        .collect();

    if json {
        return print_json(&defs);
    }

    let rows: Vec<Vec<String>> = defs
        .iter()
        .map(|d| {
            vec![
                d.stage.to_string(),
                d.gate.to_string(),
                d.required_tasks.join(", "),
            ]
        })
        .collect();
    println!("Stages ({variant}):");
    print_table(&["STAGE", "GATE", "REQUIRED TASKS"], rows);
    Ok(())
}
