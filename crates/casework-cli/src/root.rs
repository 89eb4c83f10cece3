use std::path::{Path, PathBuf};

/// Resolve the casework workspace root.
///
/// Priority:
/// 1. `--root` flag / `CASEWORK_ROOT` env var (passed in as `explicit`)
/// 2. Walk upward from `cwd` looking for `.casework/`
/// 3. Fall back to `cwd`
pub fn resolve_root(explicit: Option<&Path>) -> PathBuf {
    if let Some(p) = explicit {
        return p.to_path_buf();
    }

    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    find_workspace(&cwd).unwrap_or(cwd)
}

fn find_workspace(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .find(|dir| dir.join(casework_core::paths::CASEWORK_DIR).is_dir())
        .map(Path::to_path_buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn explicit_root_wins() {
        let dir = TempDir::new().unwrap();
        let result = resolve_root(Some(dir.path()));
        assert_eq!(result, dir.path());
    }

    #[test]
    fn finds_casework_dir_from_subdirectory() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join(".casework")).unwrap();
        let subdir = dir.path().join("evidence/photos");
        std::fs::create_dir_all(&subdir).unwrap();

        assert_eq!(find_workspace(&subdir).as_deref(), Some(dir.path()));
    }

    #[test]
    fn no_workspace_found() {
        let dir = TempDir::new().unwrap();
        assert!(find_workspace(dir.path()).is_none());
    }
}
