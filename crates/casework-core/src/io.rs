use crate::error::Result;
use serde::Serialize;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

/// Replace `path` with `data` in one step: write a sibling temp file, then
/// rename it over the target. Missing parent directories are created.
pub fn atomic_write(path: &Path, data: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(data)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Serialize `value` as YAML and write it atomically.
pub fn write_yaml<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let data = serde_yaml::to_string(value)?;
    atomic_write(path, data.as_bytes())
}

/// Like [`write_yaml`], but leaves an existing file alone. Returns whether
/// anything was written.
pub fn write_yaml_if_missing<T: Serialize>(path: &Path, value: &T) -> Result<bool> {
    if path.exists() {
        return Ok(false);
    }
    write_yaml(path, value)?;
    Ok(true)
}

pub fn ensure_dir(path: &Path) -> Result<()> {
    std::fs::create_dir_all(path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn atomic_write_creates_parents() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cases/nested/c1.yaml");
        atomic_write(&path, b"stage: synthesis").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "stage: synthesis");
    }

    #[test]
    fn atomic_write_replaces_existing() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("c1.yaml");
        atomic_write(&path, b"stage: synthesis").unwrap();
        atomic_write(&path, b"stage: team_review").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "stage: team_review");
    }

    #[test]
    fn write_yaml_if_missing_keeps_existing() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("rules.yaml");
        std::fs::write(&path, "version: hand-edited\n").unwrap();
        assert!(!write_yaml_if_missing(&path, &vec!["x"]).unwrap());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "version: hand-edited\n");

        let fresh = dir.path().join("fresh.yaml");
        assert!(write_yaml_if_missing(&fresh, &vec!["x"]).unwrap());
        assert_eq!(std::fs::read_to_string(&fresh).unwrap(), "- x\n");
    }
}
