use crate::input::read_value;
use crate::output::print_json;
use casework_core::{
    context::ExecutionContext,
    decision::{Command, DecisionEngine},
};
use std::path::Path;

fn load(root: &Path, finding: &Path) -> anyhow::Result<(DecisionEngine, ExecutionContext)> {
    let config = super::config_or_default(root)?;
    let ctx = ExecutionContext::from_value(read_value(finding)?)?;
    Ok((DecisionEngine::new(config.variant), ctx))
}

pub fn run(root: &Path, finding: &Path, json: bool) -> anyhow::Result<()> {
    let (engine, ctx) = load(root, finding)?;
    let commands = engine.decide(&ctx);

    if json {
        return print_json(&commands);
    }
    for c in &commands {
        print_command(c);
    }
    Ok(())
}

pub fn assess(root: &Path, finding: &Path, json: bool) -> anyhow::Result<()> {
    let (engine, ctx) = load(root, finding)?;
    let a = engine.assess(&ctx);

    if json {
        return print_json(&a);
    }

    let names: Vec<&str> = a.needed_specialists.iter().map(|s| s.as_str()).collect();
    println!("Urgency:        {:?}", a.urgency);
    println!("Confidence:     {:.1}", a.confidence);
    println!("Complexity:     {:?}", a.complexity);
    println!("Pipeline hint:  {}", a.pipeline_hint);
    println!("Specialists:    {}", list_or_none(&names));
    println!("Conflicts:      {}", list_or_none(&a.conflicts));
    println!("Gaps:           {}", list_or_none(&a.information_gaps));
    println!("Recommendation: {}", a.recommendation);
    Ok(())
}

pub fn print_command(c: &Command) {
    let target = c.target.as_deref().unwrap_or("-");
    println!(
        "  [{:>2}] {:<19} {:<20} {}",
        c.priority,
        c.action.as_str(),
        target,
        c.message
    );
}

fn list_or_none<S: AsRef<str>>(items: &[S]) -> String {
    if items.is_empty() {
        return "(none)".to_string();
    }
    items.iter().map(|s| s.as_ref()).collect::<Vec<_>>().join(", ")
}
