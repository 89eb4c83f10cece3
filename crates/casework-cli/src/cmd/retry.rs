use crate::input::read_checked;
use crate::output::print_json;
use anyhow::Context;
use casework_core::{
    context::{ExecutionContext, RecordingCapabilities},
    retry::{RetryEngine, RetryInput},
    types::Stage,
};
use std::path::Path;

pub fn run(root: &Path, input: &Path, apply: bool, json: bool) -> anyhow::Result<()> {
    let config = super::config_or_default(root)?;
    let engine = RetryEngine::with_limits(config.retry.limits());
    let req: RetryInput = read_checked(input, "retry_input")?;

    let response = engine.evaluate(&req)?;

    if !apply {
        if json {
            return print_json(&response);
        }
        print!("{}", response.report(&req));
        return Ok(());
    }

    // Applied against a scratch context; nothing is persisted.
    let stage: Stage = req.stage.parse()?;
    let mut ctx = ExecutionContext::new("retry", "retry", "")
        .with_stage(stage)
        .with_confidence(req.confidence.unwrap_or(0.0));
    if let Some(sp) = req.specialist {
        ctx = ctx.with_specialist(sp);
    }
    let mut caps = RecordingCapabilities::new();

    let rt = tokio::runtime::Runtime::new().context("failed to start runtime")?;
    let report = rt.block_on(engine.apply_modifications(&req, &response, &mut ctx, &mut caps))?;

    if json {
        let value = serde_json::json!({
            "response": response,
            "context": ctx,
            "capability_calls": caps.calls,
        });
        return print_json(&value);
    }

    print!("{report}");
    println!("Applied:");
    println!("  stage:      {}", ctx.stage);
    println!("  confidence: {:.1}", ctx.confidence);
    for call in &caps.calls {
        println!("  call:       {}", call.name());
    }
    Ok(())
}
