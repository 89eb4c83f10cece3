use crate::error::{CaseworkError, Result};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

// ---------------------------------------------------------------------------
// Directory constants
// ---------------------------------------------------------------------------

pub const CASEWORK_DIR: &str = ".casework";
pub const CASES_DIR: &str = ".casework/cases";

pub const CONFIG_FILE: &str = ".casework/config.yaml";
pub const RULES_FILE: &str = ".casework/rules.yaml";

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

pub fn casework_dir(root: &Path) -> PathBuf {
    root.join(CASEWORK_DIR)
}

pub fn config_path(root: &Path) -> PathBuf {
    root.join(CONFIG_FILE)
}

pub fn cases_dir(root: &Path) -> PathBuf {
    root.join(CASES_DIR)
}

pub fn case_path(root: &Path, case_id: &str) -> PathBuf {
    cases_dir(root).join(format!("{case_id}.yaml"))
}

// ---------------------------------------------------------------------------
// Case id validation
// ---------------------------------------------------------------------------

static CASE_ID_RE: OnceLock<Regex> = OnceLock::new();

fn case_id_re() -> &'static Regex {
    CASE_ID_RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_\-]*$").unwrap())
}

/// Case ids become file names, so only a conservative alphabet is accepted.
pub fn validate_case_id(case_id: &str) -> Result<()> {
    if case_id.is_empty() || case_id.len() > 64 || !case_id_re().is_match(case_id) {
        return Err(CaseworkError::InvalidCaseId(case_id.to_string()));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_case_ids() {
        for id in ["c1", "CASE-2024-017", "harbour_fire", "7"] {
            validate_case_id(id).unwrap_or_else(|_| panic!("expected valid: {id}"));
        }
    }

    #[test]
    fn invalid_case_ids() {
        for id in ["", "-lead", "has space", "../escape", "a/b", "x.yaml"] {
            assert!(validate_case_id(id).is_err(), "expected invalid: {id}");
        }
    }

    #[test]
    fn path_helpers() {
        let root = Path::new("/tmp/inquiry");
        assert_eq!(
            config_path(root),
            PathBuf::from("/tmp/inquiry/.casework/config.yaml")
        );
        assert_eq!(
            case_path(root, "c-9"),
            PathBuf::from("/tmp/inquiry/.casework/cases/c-9.yaml")
        );
    }
}
