use std::path::Path;
use std::path::PathBuf;

use crate::error::Result;
use crate::store::MemoryStore;

/// Env override for the database file, mostly useful in tests and CI.
pub const MEMORY_DB_ENV: &str = "CLOUVEL_MEMORY_DB";

/// Resolve the database path for a project: `CLOUVEL_MEMORY_DB` if set,
/// otherwise `<project>/.clouvel/errors.db`.
pub fn memory_db_path(project_root: &Path) -> PathBuf {
    match std::env::var_os(MEMORY_DB_ENV) {
        Some(p) if !p.is_empty() => PathBuf::from(p),
        _ => project_root.join(".clouvel").join("errors.db"),
    }
}

/// Open (creating if needed) the project-scoped store.
pub fn open_project_store(project_root: &Path) -> Result<MemoryStore> {
    let path = memory_db_path(project_root);
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    tracing::debug!(path = %path.display(), "opening memory store");
    MemoryStore::open(&path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::NewMemory;

    // Tests here never set MEMORY_DB_ENV, so the default layout applies.
    #[test]
    fn default_path_is_under_project() {
        if std::env::var_os(MEMORY_DB_ENV).is_some() {
            return;
        }
        let root = Path::new("/work/shop");
        assert_eq!(
            memory_db_path(root),
            PathBuf::from("/work/shop/.clouvel/errors.db")
        );
    }

    #[test]
    fn open_creates_directory_and_persists() {
        if std::env::var_os(MEMORY_DB_ENV).is_some() {
            return;
        }
        let tmp = tempfile::tempdir().unwrap();
        let id = {
            let store = open_project_store(tmp.path()).unwrap();
            store.create(NewMemory::new("E", "cause")).unwrap()
        };
        assert!(tmp.path().join(".clouvel").join("errors.db").exists());
        let store = open_project_store(tmp.path()).unwrap();
        assert_eq!(store.get(id).unwrap().root_cause, "cause");
    }
}
