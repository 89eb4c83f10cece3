use crate::input::read_value;
use crate::output::{print_json, print_table};
use clap::Subcommand;
use casework_core::trigger::TriggerEngine;
use std::path::{Path, PathBuf};

#[derive(Subcommand)]
pub enum RulesSubcommand {
    /// List the loaded trigger rules
    List,
    /// Show which rules a finding would fire, without executing them
    Check {
        /// Finding file (JSON or YAML)
        #[arg(long)]
        finding: PathBuf,
    },
}

pub fn run(root: &Path, subcommand: RulesSubcommand, json: bool) -> anyhow::Result<()> {
    let config = super::config_or_default(root)?;
    let store = super::load_rules(root, &config);

    match subcommand {
        RulesSubcommand::List => {
            let set = store.snapshot();
            if json {
                return print_json(&*set);
            }
            if set.is_fallback() {
                println!("(no rules loaded; using fallback)");
            }
            let rows = set
                .rules
                .iter()
                .map(|r| {
                    vec![
                        r.id.clone(),
                        r.event.clone(),
                        r.conditions.len().to_string(),
                        r.actions
                            .iter()
                            .map(|a| a.action_type.as_str())
                            .collect::<Vec<_>>()
                            .join(", "),
                    ]
                })
                .collect();
            print_table(&["ID", "EVENT", "CONDITIONS", "ACTIONS"], rows);
            Ok(())
        }
        RulesSubcommand::Check { finding } => {
            let payload = read_value(&finding)?;
            let result = TriggerEngine::new(store).evaluate_value(&payload);
            if json {
                return print_json(&result);
            }
            if !result.triggered {
                println!("No rules triggered.");
                return Ok(());
            }
            println!("Triggered: {}", result.matched_rule_ids.join(", "));
            for a in &result.actions {
                println!("  {} ({})", a.id, a.action_type);
            }
            Ok(())
        }
    }
}
