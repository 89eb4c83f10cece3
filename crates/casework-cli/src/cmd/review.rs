use crate::input::read_checked;
use crate::output::{print_json, print_table};
use casework_core::review::{ReviewEngine, ReviewInput};
use std::path::Path;

pub fn run(root: &Path, input: &Path, json: bool) -> anyhow::Result<()> {
    let config = super::config_or_default(root)?;
    let engine = ReviewEngine::with_thresholds(config.review.thresholds());
    let req: ReviewInput = read_checked(input, "review_input")?;

    let result = engine.review_input(&req)?;

    if json {
        return print_json(&result);
    }

    println!("Review by {}: {}", req.reviewer, result.status);
    println!("Score: {:.2}", result.score);
    if let Some(c) = result.complementarity {
        println!("Complementarity: {c:.2}");
    }
    println!("{}", result.justification);

    if !result.checks.is_empty() {
        println!();
        let rows = result
            .checks
            .iter()
            .map(|c| {
                vec![
                    c.name.clone(),
                    if c.passed { "pass" } else { "fail" }.to_string(),
                    format!("{:.2}", c.score),
                    c.detail.clone(),
                ]
            })
            .collect();
        print_table(&["CHECK", "RESULT", "SCORE", "DETAIL"], rows);
    }

    if !result.suggestions.is_empty() {
        println!("\nSuggestions:");
        for s in &result.suggestions {
            println!("  - {s}");
        }
    }
    Ok(())
}
