use anyhow::Context;
use casework_core::schema::{BuiltinSchemas, SchemaValidator};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::path::Path;

/// Read a JSON or YAML payload; `.yaml`/`.yml` files are parsed as YAML.
pub fn read_value(path: &Path) -> anyhow::Result<Value> {
    let data = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let is_yaml = matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml") | Some("yml")
    );
    let value = if is_yaml {
        serde_yaml::from_str(&data).with_context(|| format!("invalid YAML in {}", path.display()))?
    } else {
        serde_json::from_str(&data).with_context(|| format!("invalid JSON in {}", path.display()))?
    };
    Ok(value)
}

/// Read a payload and deserialize it into `T`.
pub fn read_as<T: DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let value = read_value(path)?;
    serde_json::from_value(value).with_context(|| format!("unexpected shape in {}", path.display()))
}

/// Read a payload, check it against a built-in schema, then deserialize it.
pub fn read_checked<T: DeserializeOwned>(path: &Path, schema_id: &str) -> anyhow::Result<T> {
    let value = read_value(path)?;
    let report = BuiltinSchemas.validate(schema_id, &value);
    if !report.valid {
        anyhow::bail!("{} rejected by '{schema_id}' schema: {}", path.display(), report.errors.join("; "));
    }
    serde_json::from_value(value).with_context(|| format!("unexpected shape in {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn yaml_and_json_are_equivalent() {
        let dir = TempDir::new().unwrap();
        let json = dir.path().join("f.json");
        let yaml = dir.path().join("f.yaml");
        std::fs::write(&json, r#"{"case_id": "c1", "confidence": 40}"#).unwrap();
        std::fs::write(&yaml, "case_id: c1\nconfidence: 40\n").unwrap();
        assert_eq!(read_value(&json).unwrap(), read_value(&yaml).unwrap());
    }

    #[test]
    fn missing_file_names_path() {
        let err = read_value(Path::new("/nonexistent/finding.json")).unwrap_err();
        assert!(format!("{err:#}").contains("finding.json"));
    }

    #[test]
    fn schema_rejection_lists_fields() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("retry.json");
        std::fs::write(&path, r#"{"stage": "synthesis", "attempt": 0}"#).unwrap();
        let err = read_checked::<Value>(&path, "retry_input").unwrap_err();
        let msg = format!("{err:#}");
        assert!(msg.contains("failure_type"));
        assert!(msg.contains("attempt"));
    }
}
