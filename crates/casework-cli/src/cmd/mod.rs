pub mod config;
pub mod decide;
pub mod init;
pub mod retry;
pub mod review;
pub mod rules;
pub mod run;
pub mod stage;
pub mod status;

use anyhow::Context;
use casework_core::{
    config::Config,
    rules::{RuleStore, YamlRuleSource},
    CaseworkError,
};
use std::path::Path;
use std::sync::Arc;

/// Load the workspace config, or defaults when the workspace isn't initialized.
/// Engines that only read an input file work without `casework init`.
pub fn config_or_default(root: &Path) -> anyhow::Result<Config> {
    match Config::load(root) {
        Ok(cfg) => Ok(cfg),
        Err(CaseworkError::NotInitialized) => Ok(Config::new("casework")),
        Err(e) => Err(e).context("failed to load config"),
    }
}

/// Rules for the workspace; a missing or broken rules file yields the
/// fallback rule set.
pub fn load_rules(root: &Path, config: &Config) -> Arc<RuleStore> {
    let source = YamlRuleSource::new(config.rules_path(root));
    Arc::new(RuleStore::from_source(&source))
}
