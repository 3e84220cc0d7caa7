//! JSON file backed token store
//!
//! Keeps the whole key set in memory and rewrites the file after each
//! mutation (write to a sibling temp file, then rename).

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, info, warn};

use super::TokenStore;
use crate::types::error::{OneMailError, Result};

pub struct FileTokenStore {
    path: PathBuf,
    entries: Mutex<HashMap<String, String>>,
}

impl FileTokenStore {
    /// Open the store at `path`, loading existing entries if the file exists
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();

        let entries = if path.exists() {
            let content = fs::read_to_string(&path)?;
            match serde_json::from_str::<HashMap<String, String>>(&content) {
                Ok(entries) => {
                    info!("Loaded session store from {:?} ({} keys)", path, entries.len());
                    entries
                }
                Err(e) => {
                    warn!("Session store at {:?} is unreadable, starting empty: {}", path, e);
                    HashMap::new()
                }
            }
        } else {
            debug!("No session store at {:?}, starting empty", path);
            HashMap::new()
        };

        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn update<F>(&self, mutate: F) -> Result<()>
    where
        F: FnOnce(&mut HashMap<String, String>),
    {
        let mut entries = self
            .entries
            .lock()
            .map_err(|e| OneMailError::Credential(format!("Token store lock poisoned: {}", e)))?;
        // Only a persisted change becomes visible
        let mut next = entries.clone();
        mutate(&mut next);
        persist(&self.path, &next)?;
        *entries = next;
        Ok(())
    }
}

fn persist(path: &Path, entries: &HashMap<String, String>) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let json = serde_json::to_string_pretty(entries)?;
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, json)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

impl TokenStore for FileTokenStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.lock().ok()?.get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.update(|entries| {
            entries.insert(key.to_string(), value.to_string());
        })
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.update(|entries| {
            entries.remove(key);
        })
    }

    fn clear(&self) -> Result<()> {
        self.update(|entries| entries.clear())
    }

    fn set_all(&self, pairs: &[(&str, &str)]) -> Result<()> {
        self.update(|entries| {
            for (key, value) in pairs {
                entries.insert(key.to_string(), value.to_string());
            }
        })
    }

    fn remove_all(&self, keys: &[&str]) -> Result<()> {
        self.update(|entries| {
            for key in keys {
                entries.remove(*key);
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::{TokenStorage, ACCESS_TOKEN_KEY};
    use crate::types::auth::Tokens;
    use std::sync::Arc;

    #[test]
    fn test_tokens_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("session.json");

        {
            let storage = TokenStorage::new(Arc::new(FileTokenStore::open(&path).unwrap()));
            storage
                .set_tokens(&Tokens {
                    access_token: "A1".to_string(),
                    refresh_token: "R1".to_string(),
                })
                .unwrap();
        }

        let reopened = FileTokenStore::open(&path).unwrap();
        assert_eq!(reopened.get(ACCESS_TOKEN_KEY).as_deref(), Some("A1"));

        reopened.clear().unwrap();
        let reopened = FileTokenStore::open(&path).unwrap();
        assert_eq!(reopened.get(ACCESS_TOKEN_KEY), None);
    }

    #[test]
    fn test_corrupt_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        fs::write(&path, "garbage").unwrap();

        let store = FileTokenStore::open(&path).unwrap();
        assert_eq!(store.get(ACCESS_TOKEN_KEY), None);
        store.set("k", "v").unwrap();
        assert_eq!(FileTokenStore::open(&path).unwrap().get("k").as_deref(), Some("v"));
    }

    #[test]
    fn test_failed_write_leaves_entries_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        fs::write(&blocker, "").unwrap();

        let store = FileTokenStore::open(blocker.join("session.json")).unwrap();
        let storage = TokenStorage::new(Arc::new(store));

        let result = storage.set_tokens(&Tokens {
            access_token: "A2".to_string(),
            refresh_token: "R2".to_string(),
        });
        assert!(result.is_err());
        assert_eq!(storage.access_token(), None);
        assert_eq!(storage.refresh_token(), None);
        assert!(!storage.is_authenticated());
    }
}
