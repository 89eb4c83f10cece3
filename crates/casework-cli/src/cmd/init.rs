use anyhow::Context;
use casework_core::{
    config::Config,
    io, paths,
    rules::RuleSet,
    types::InvestigationVariant,
};
use std::path::Path;

pub fn run(root: &Path, variant: &str) -> anyhow::Result<()> {
    let variant: InvestigationVariant = variant.parse()?;
    let name = root
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "casework".to_string());

    println!("Initializing casework in: {}", root.display());

    for dir in [paths::CASEWORK_DIR, paths::CASES_DIR] {
        let p = root.join(dir);
        io::ensure_dir(&p).with_context(|| format!("failed to create {}", p.display()))?;
    }

    let config_path = paths::config_path(root);
    let config = if config_path.exists() {
        println!("  exists:  {}", paths::CONFIG_FILE);
        Config::load(root).context("failed to load config")?
    } else {
        let mut cfg = Config::new(&name);
        cfg.variant = variant;
        cfg.save(root).context("failed to write config.yaml")?;
        println!("  created: {}", paths::CONFIG_FILE);
        cfg
    };

    let written = io::write_yaml_if_missing(&config.rules_path(root), &RuleSet::builtin())
        .context("failed to write rules")?;
    let label = if written { "created:" } else { "exists: " };
    println!("  {label} {}", config.rules_file);

    println!("\ncasework initialized ({} investigation).", config.variant);
    println!("Next: casework run --finding <file>");
    Ok(())
}
