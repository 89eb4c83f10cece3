use crate::output::print_json;
use casework_core::{
    store::{CaseStore, YamlCaseStore},
    CaseworkError,
};
use chrono::Utc;
use std::path::Path;

pub fn run(root: &Path, case_id: &str, json: bool) -> anyhow::Result<()> {
    let store = YamlCaseStore::new(root);
    let status = store
        .load_status(case_id)?
        .ok_or_else(|| CaseworkError::CaseNotFound(case_id.to_string()))?;

    if json {
        return print_json(&status);
    }

    let age = Utc::now().signed_duration_since(status.timestamp);
    println!("Case:        {case_id}");
    println!("Stage:       {}", status.stage);
    if let Some(sp) = status.specialist {
        println!("Specialist:  {sp}");
    }
    println!("Confidence:  {:.1}", status.confidence);
    println!(
        "Updated:     {} ({}m ago)",
        status.timestamp.format("%Y-%m-%d %H:%M:%S UTC"),
        age.num_minutes()
    );
    if !status.active_specialists.is_empty() {
        let names: Vec<&str> = status.active_specialists.iter().map(|s| s.as_str()).collect();
        println!("Active:      {}", names.join(", "));
    }
    if !status.protocols.is_empty() {
        println!("Protocols:   {}", status.protocols.join(", "));
    }
    if status.halted {
        println!("Halted:      yes");
    }
    Ok(())
}
