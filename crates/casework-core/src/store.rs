//! Case status persistence.
//!
//! The engines never touch the store; the run driver loads a case's status
//! before a run and saves it afterwards.

use crate::error::Result;
use crate::paths;
use crate::types::{Specialist, Stage};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseStatus {
    pub stage: Stage,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub specialist: Option<Specialist>,
    pub confidence: f64,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub active_specialists: Vec<Specialist>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub protocols: Vec<String>,
    #[serde(default)]
    pub halted: bool,
}

pub trait CaseStore: Send + Sync {
    fn load_status(&self, case_id: &str) -> Result<Option<CaseStatus>>;
    fn save_status(&self, case_id: &str, status: &CaseStatus) -> Result<()>;
}

// ---------------------------------------------------------------------------
// MemoryCaseStore
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct MemoryCaseStore {
    cases: Mutex<HashMap<String, CaseStatus>>,
}

impl MemoryCaseStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CaseStore for MemoryCaseStore {
    fn load_status(&self, case_id: &str) -> Result<Option<CaseStatus>> {
        let cases = self.cases.lock().unwrap_or_else(|e| e.into_inner());
        Ok(cases.get(case_id).cloned())
    }

    fn save_status(&self, case_id: &str, status: &CaseStatus) -> Result<()> {
        let mut cases = self.cases.lock().unwrap_or_else(|e| e.into_inner());
        cases.insert(case_id.to_string(), status.clone());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// YamlCaseStore
// ---------------------------------------------------------------------------

/// One YAML file per case under `.casework/cases/`.
#[derive(Debug, Clone)]
pub struct YamlCaseStore {
    root: PathBuf,
}

impl YamlCaseStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Ids of every stored case, sorted.
    pub fn list(&self) -> Result<Vec<String>> {
        let dir = paths::cases_dir(&self.root);
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut ids = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("yaml") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                ids.push(stem.to_string());
            }
        }
        ids.sort();
        Ok(ids)
    }
}

impl CaseStore for YamlCaseStore {
    fn load_status(&self, case_id: &str) -> Result<Option<CaseStatus>> {
        paths::validate_case_id(case_id)?;
        let path = paths::case_path(&self.root, case_id);
        if !path.exists() {
            return Ok(None);
        }
        let data = std::fs::read_to_string(&path)?;
        Ok(Some(serde_yaml::from_str(&data)?))
    }

    fn save_status(&self, case_id: &str, status: &CaseStatus) -> Result<()> {
        paths::validate_case_id(case_id)?;
        crate::io::write_yaml(&paths::case_path(&self.root, case_id), status)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CaseworkError;
    use tempfile::TempDir;

    fn status(stage: Stage) -> CaseStatus {
        CaseStatus {
            stage,
            specialist: Some(Specialist::Forensic),
            confidence: 62.5,
            timestamp: Utc::now(),
            active_specialists: vec![Specialist::Forensic],
            protocols: Vec::new(),
            halted: false,
        }
    }

    #[test]
    fn memory_store_roundtrip() {
        let store = MemoryCaseStore::new();
        assert!(store.load_status("c1").unwrap().is_none());
        store.save_status("c1", &status(Stage::Synthesis)).unwrap();
        assert_eq!(
            store.load_status("c1").unwrap().unwrap().stage,
            Stage::Synthesis
        );
    }

    #[test]
    fn yaml_store_roundtrip_and_list() {
        let dir = TempDir::new().unwrap();
        let store = YamlCaseStore::new(dir.path());
        assert!(store.list().unwrap().is_empty());

        store.save_status("b-case", &status(Stage::TeamReview)).unwrap();
        store.save_status("a-case", &status(Stage::EvidenceIntake)).unwrap();

        let loaded = store.load_status("b-case").unwrap().unwrap();
        assert_eq!(loaded.stage, Stage::TeamReview);
        assert_eq!(loaded.confidence, 62.5);
        assert_eq!(store.list().unwrap(), vec!["a-case", "b-case"]);
    }

    #[test]
    fn yaml_store_rejects_path_like_ids() {
        let dir = TempDir::new().unwrap();
        let store = YamlCaseStore::new(dir.path());
        let err = store
            .save_status("../outside", &status(Stage::Synthesis))
            .unwrap_err();
        assert!(matches!(err, CaseworkError::InvalidCaseId(_)));
    }
}
