use crate::input::read_value;
use crate::output::print_json;
use anyhow::Context;
use casework_core::{
    config::Config,
    orchestrator::{Orchestrator, RunRegistry},
    store::YamlCaseStore,
};
use std::path::Path;

pub fn run(root: &Path, finding: &Path, json: bool) -> anyhow::Result<()> {
    let config = Config::load(root).context("failed to load config")?;
    let finding = read_value(finding)?;

    let rules = super::load_rules(root, &config);
    let orchestrator = Orchestrator::new(rules, config.variant);
    let store = YamlCaseStore::new(root);
    let registry = RunRegistry::new();

    let outcome = orchestrator
        .run(&finding, &store, &registry)
        .context("run failed")?;

    if json {
        return print_json(&outcome);
    }

    println!("Run:      {}", outcome.run_id);
    println!("Case:     {}", outcome.case_id);
    println!("Stage:    {}", outcome.stage);
    if outcome.halted {
        println!("Halted:   yes");
    }

    println!("\nCommands:");
    for c in &outcome.commands {
        super::decide::print_command(c);
    }

    if outcome.trigger.triggered {
        println!("\nRules matched: {}", outcome.trigger.matched_rule_ids.join(", "));
    } else {
        println!("\nRules matched: (none)");
    }

    if !outcome.logs.is_empty() {
        println!("\nEffects:");
        for log in &outcome.logs {
            println!("  [{:<8}] {}", log.level.as_str(), log.message);
        }
    }
    Ok(())
}
