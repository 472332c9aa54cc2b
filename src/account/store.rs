//! Local JSON store: last user id and finished games

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

use crate::error::StoreError;
use crate::types::GameRecord;

/// On-disk contents
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredState {
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub records: Vec<GameRecord>,
}

/// JSON file store; clones share one write lock
#[derive(Debug, Clone)]
pub struct LocalStore {
    path: PathBuf,
    write_lock: Arc<Mutex<()>>,
}

impl LocalStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Held across every load-modify-save
    fn lock(&self) -> MutexGuard<'_, ()> {
        self.write_lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current contents; a missing file is an empty store
    pub fn load(&self) -> Result<StoredState, StoreError> {
        if !self.path.exists() {
            return Ok(StoredState::default());
        }
        let json = std::fs::read_to_string(&self.path)?;
        Ok(serde_json::from_str(&json)?)
    }

    pub fn save(&self, state: &StoredState) -> Result<(), StoreError> {
        let _guard = self.lock();
        self.write(state)
    }

    fn write(&self, state: &StoredState) -> Result<(), StoreError> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)?;
        }
        let json = serde_json::to_string_pretty(state)?;

        // Replace atomically so a crash never leaves half a file
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &self.path)?;
        debug!(path = %self.path.display(), "store saved");
        Ok(())
    }

    pub fn load_last_user_id(&self) -> Result<Option<String>, StoreError> {
        Ok(self.load()?.user_id)
    }

    pub fn save_user_id(&self, user_id: &str) -> Result<(), StoreError> {
        let _guard = self.lock();
        let mut state = self.load()?;
        state.user_id = Some(user_id.to_string());
        self.write(&state)
    }

    pub fn append_record(&self, record: GameRecord) -> Result<(), StoreError> {
        let _guard = self.lock();
        let mut state = self.load()?;
        state.records.push(record);
        self.write(&state)
    }

    /// Finished games, oldest first
    pub fn records(&self) -> Result<Vec<GameRecord>, StoreError> {
        Ok(self.load()?.records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn record(id: &str, score: u32) -> GameRecord {
        GameRecord {
            id: id.to_string(),
            user_id: "u1".to_string(),
            level: 1,
            score,
            play_time_seconds: 60,
            completed_at: None,
        }
    }

    #[test]
    fn test_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let store = LocalStore::new(dir.path().join("prefs.json"));
        assert_eq!(store.load_last_user_id().unwrap(), None);
        assert!(store.records().unwrap().is_empty());
    }

    #[test]
    fn test_user_id_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("prefs.json");
        LocalStore::new(&path).save_user_id("abc-123").unwrap();

        let reopened = LocalStore::new(&path);
        assert_eq!(reopened.load_last_user_id().unwrap(), Some("abc-123".to_string()));
    }

    #[test]
    fn test_records_keep_user_id() {
        let dir = TempDir::new().unwrap();
        let store = LocalStore::new(dir.path().join("prefs.json"));
        store.save_user_id("u1").unwrap();
        store.append_record(record("g1", 7)).unwrap();
        store.append_record(record("g2", 9)).unwrap();

        let state = store.load().unwrap();
        assert_eq!(state.user_id.as_deref(), Some("u1"));
        assert_eq!(state.records.iter().map(|r| r.score).collect::<Vec<_>>(), vec![7, 9]);
    }

    #[test]
    fn test_concurrent_appends_all_land() {
        let dir = TempDir::new().unwrap();
        let store = LocalStore::new(dir.path().join("prefs.json"));

        let writers: Vec<_> = (0..16)
            .map(|i| {
                let store = store.clone();
                std::thread::spawn(move || store.append_record(record(&format!("g{}", i), i)))
            })
            .collect();
        for writer in writers {
            writer.join().unwrap().unwrap();
        }

        let mut scores: Vec<u32> = store.records().unwrap().iter().map(|r| r.score).collect();
        scores.sort_unstable();
        assert_eq!(scores, (0..16).collect::<Vec<_>>());
    }

    #[test]
    fn test_corrupt_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("prefs.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(LocalStore::new(&path).load(), Err(StoreError::Corrupt(_))));
    }
}
