use crate::error::{CaseworkError, Result};
use crate::paths;
use crate::retry::RetryLimits;
use crate::review::ReviewThresholds;
use crate::types::InvestigationVariant;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// RetryConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_global_ceiling")]
    pub global_ceiling: u32,
    #[serde(default = "default_low_confidence")]
    pub low_confidence: f64,
    #[serde(default = "default_low_confidence_min_attempts")]
    pub low_confidence_min_attempts: u32,
    #[serde(default = "default_max_elapsed_ms")]
    pub max_elapsed_ms: u64,
}

fn default_global_ceiling() -> u32 {
    crate::retry::GLOBAL_ATTEMPT_CEILING
}

fn default_low_confidence() -> f64 {
    crate::retry::LOW_CONFIDENCE
}

fn default_low_confidence_min_attempts() -> u32 {
    crate::retry::LOW_CONFIDENCE_MIN_ATTEMPTS
}

fn default_max_elapsed_ms() -> u64 {
    crate::retry::MAX_ELAPSED_MS
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            global_ceiling: default_global_ceiling(),
            low_confidence: default_low_confidence(),
            low_confidence_min_attempts: default_low_confidence_min_attempts(),
            max_elapsed_ms: default_max_elapsed_ms(),
        }
    }
}

impl RetryConfig {
    pub fn limits(&self) -> RetryLimits {
        RetryLimits {
            global_ceiling: self.global_ceiling,
            low_confidence: self.low_confidence,
            low_confidence_min_attempts: self.low_confidence_min_attempts,
            max_elapsed_ms: self.max_elapsed_ms,
        }
    }
}

// ---------------------------------------------------------------------------
// ReviewConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewConfig {
    #[serde(default = "default_approve_threshold")]
    pub approve_threshold: f64,
    #[serde(default = "default_reject_threshold")]
    pub reject_threshold: f64,
    #[serde(default = "default_max_failed_checks")]
    pub max_failed_checks: usize,
}

fn default_approve_threshold() -> f64 {
    0.8
}

fn default_reject_threshold() -> f64 {
    0.5
}

fn default_max_failed_checks() -> usize {
    3
}

impl Default for ReviewConfig {
    fn default() -> Self {
        Self {
            approve_threshold: default_approve_threshold(),
            reject_threshold: default_reject_threshold(),
            max_failed_checks: default_max_failed_checks(),
        }
    }
}

impl ReviewConfig {
    pub fn thresholds(&self) -> ReviewThresholds {
        ReviewThresholds {
            approve: self.approve_threshold,
            reject: self.reject_threshold,
            max_failed_checks: self.max_failed_checks,
        }
    }
}

// ---------------------------------------------------------------------------
// Config (top-level)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_version")]
    pub version: u32,
    pub name: String,
    #[serde(default)]
    pub variant: InvestigationVariant,
    #[serde(default = "default_rules_file")]
    pub rules_file: String,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub review: ReviewConfig,
}

fn default_version() -> u32 {
    1
}

fn default_rules_file() -> String {
    paths::RULES_FILE.to_string()
}

impl Config {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            version: 1,
            name: name.into(),
            variant: InvestigationVariant::default(),
            rules_file: default_rules_file(),
            retry: RetryConfig::default(),
            review: ReviewConfig::default(),
        }
    }

    pub fn rules_path(&self, root: &Path) -> PathBuf {
        root.join(&self.rules_file)
    }

    pub fn load(root: &Path) -> Result<Self> {
        let path = paths::config_path(root);
        if !path.exists() {
            return Err(CaseworkError::NotInitialized);
        }
        let data = std::fs::read_to_string(&path)?;
        let cfg: Config = serde_yaml::from_str(&data)?;
        Ok(cfg)
    }

    pub fn save(&self, root: &Path) -> Result<()> {
        let path = paths::config_path(root);
        crate::io::write_yaml(&path, self)
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    /// Problems worth reporting; `root` is used to check the rules file exists.
    pub fn validate(&self, root: &Path) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();
        let mut push = |level: WarnLevel, message: String| {
            warnings.push(ConfigWarning { level, message })
        };

        let r = &self.review;
        for (name, value) in [
            ("approve_threshold", r.approve_threshold),
            ("reject_threshold", r.reject_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                push(
                    WarnLevel::Error,
                    format!("review.{name} = {value} is outside [0, 1]"),
                );
            }
        }
        if r.reject_threshold >= r.approve_threshold {
            push(
                WarnLevel::Error,
                format!(
                    "review.reject_threshold ({}) must be below approve_threshold ({})",
                    r.reject_threshold, r.approve_threshold
                ),
            );
        }

        if self.retry.global_ceiling == 0 {
            push(
                WarnLevel::Error,
                "retry.global_ceiling = 0 concludes every failure immediately".to_string(),
            );
        }
        if !(0.0..=100.0).contains(&self.retry.low_confidence) {
            push(
                WarnLevel::Error,
                format!(
                    "retry.low_confidence = {} is outside [0, 100]",
                    self.retry.low_confidence
                ),
            );
        }
        if self.retry.global_ceiling > 10 {
            push(
                WarnLevel::Warning,
                format!(
                    "retry.global_ceiling = {} (>10 is unusual)",
                    self.retry.global_ceiling
                ),
            );
        }

        if !self.rules_path(root).exists() {
            push(
                WarnLevel::Warning,
                format!(
                    "rules file '{}' not found; the fallback no-op rule set will be used",
                    self.rules_file
                ),
            );
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn default_config_roundtrip() {
        let cfg = Config::new("harbour-fire");
        let yaml = serde_yaml::to_string(&cfg).unwrap();
        let parsed: Config = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed.name, "harbour-fire");
        assert_eq!(parsed.version, 1);
        assert_eq!(parsed.variant, InvestigationVariant::Standard);
    }

    #[test]
    fn minimal_yaml_fills_defaults() {
        let cfg: Config = serde_yaml::from_str("name: minimal\nvariant: rapid\n").unwrap();
        assert_eq!(cfg.variant, InvestigationVariant::Rapid);
        assert_eq!(cfg.rules_file, ".casework/rules.yaml");
        assert_eq!(cfg.retry.global_ceiling, 3);
        assert_eq!(cfg.retry.max_elapsed_ms, 300_000);
        assert_eq!(cfg.review.approve_threshold, 0.8);
        assert_eq!(cfg.review.max_failed_checks, 3);
    }

    #[test]
    fn load_missing_is_not_initialized() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            Config::load(dir.path()),
            Err(CaseworkError::NotInitialized)
        ));
    }

    #[test]
    fn save_then_load() {
        let dir = TempDir::new().unwrap();
        let mut cfg = Config::new("c");
        cfg.retry.global_ceiling = 5;
        cfg.save(dir.path()).unwrap();
        let loaded = Config::load(dir.path()).unwrap();
        assert_eq!(loaded.retry.global_ceiling, 5);
    }

    #[test]
    fn validate_flags_bad_thresholds_and_missing_rules() {
        let dir = TempDir::new().unwrap();
        let mut cfg = Config::new("c");
        cfg.review.reject_threshold = 0.9;
        cfg.retry.global_ceiling = 0;
        let warnings = cfg.validate(dir.path());

        let errors = warnings.iter().filter(|w| w.level == WarnLevel::Error).count();
        assert_eq!(errors, 2);
        assert!(warnings
            .iter()
            .any(|w| w.level == WarnLevel::Warning && w.message.contains("not found")));
    }

    #[test]
    fn validate_clean_config() {
        let dir = TempDir::new().unwrap();
        let cfg = Config::new("c");
        crate::rules::save_rule_set(&cfg.rules_path(dir.path()), &crate::rules::RuleSet::builtin())
            .unwrap();
        assert!(cfg.validate(dir.path()).is_empty());
    }
}
