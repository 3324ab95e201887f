//! API-key persistence.
//!
//! One JSON object file holding the key under a fixed entry name. Load and
//! save are explicit boundary operations; the client never touches the file
//! outside of them.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::Result;

/// Fixed entry name for the API key inside the store file.
pub const API_KEY_ENTRY: &str = "odds_api_key";

/// File-backed key/value store for the API key.
#[derive(Debug, Clone)]
pub struct KeyStore {
    path: PathBuf,
}

impl KeyStore {
    /// Create a store backed by the given file path. The file is not touched
    /// until the first `save`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the stored API key, if any.
    ///
    /// A missing file or missing entry is `Ok(None)`; an unreadable or
    /// malformed file is an error.
    pub fn load(&self) -> Result<Option<String>> {
        if !self.path.exists() {
            return Ok(None);
        }

        let raw = fs::read_to_string(&self.path)?;
        let entries: BTreeMap<String, String> = serde_json::from_str(&raw)?;
        Ok(entries.get(API_KEY_ENTRY).cloned())
    }

    /// Persist the API key, creating parent directories as needed.
    pub fn save(&self, key: &str) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let mut entries: BTreeMap<String, String> = if self.path.exists() {
            let raw = fs::read_to_string(&self.path)?;
            serde_json::from_str(&raw).unwrap_or_default()
        } else {
            BTreeMap::new()
        };

        entries.insert(API_KEY_ENTRY.to_string(), key.to_string());
        fs::write(&self.path, serde_json::to_string_pretty(&entries)?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn load_returns_none_for_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = KeyStore::new(dir.path().join("keystore.json"));
        assert_eq!(store.load().unwrap(), None);
    }

    #[test]
    fn save_then_load_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let store = KeyStore::new(dir.path().join("keystore.json"));

        store.save("abc123").unwrap();
        assert_eq!(store.load().unwrap(), Some("abc123".to_string()));

        store.save("def456").unwrap();
        assert_eq!(store.load().unwrap(), Some("def456".to_string()));
    }

    #[test]
    fn save_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let store = KeyStore::new(dir.path().join("nested/deep/keystore.json"));

        store.save("abc123").unwrap();
        assert_eq!(store.load().unwrap(), Some("abc123".to_string()));
    }

    #[test]
    fn save_preserves_unrelated_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keystore.json");
        fs::write(&path, r#"{"theme":"dark"}"#).unwrap();

        let store = KeyStore::new(&path);
        store.save("abc123").unwrap();

        let raw = fs::read_to_string(&path).unwrap();
        let entries: BTreeMap<String, String> = serde_json::from_str(&raw).unwrap();
        assert_eq!(entries.get("theme"), Some(&"dark".to_string()));
        assert_eq!(entries.get(API_KEY_ENTRY), Some(&"abc123".to_string()));
    }
}
