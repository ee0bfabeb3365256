use crate::error::StateStoreError;
use chrono::Utc;
use model::run_state::RunState;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

type StateFile = HashMap<String, RunState>;

/// Single JSON file holding every mapping's [`RunState`] (§4.5). Writes go
/// through write-to-temp-then-rename so a crash mid-write never leaves a
/// half-written file; an internal lock serializes callers within this
/// process (concurrent mappings never share a mapping id, but `load`/
/// `commit` on different ids still touch the same file).
pub struct JsonStateStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonStateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub async fn load(&self, mapping_id: &str) -> Result<RunState, StateStoreError> {
        let _guard = self.lock.lock().await;
        let all = self.read_all().await?;
        Ok(all.get(mapping_id).cloned().unwrap_or_default())
    }

    pub async fn commit(&self, mapping_id: &str, new_state: RunState) -> Result<(), StateStoreError> {
        let _guard = self.lock.lock().await;
        let mut all = self.read_all().await?;
        all.insert(mapping_id.to_string(), new_state);
        self.write_all(&all).await
    }

    /// `--force` semantics (§4.5): reset one mapping's watermark and error,
    /// leave every other mapping's state untouched.
    pub async fn force_reset(&self, mapping_id: &str) -> Result<(), StateStoreError> {
        let _guard = self.lock.lock().await;
        let mut all = self.read_all().await?;
        all.entry(mapping_id.to_string()).or_default().force_reset();
        self.write_all(&all).await
    }

    async fn read_all(&self) -> Result<StateFile, StateStoreError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(StateFile::new()),
            Err(err) => return Err(StateStoreError::Read(err.to_string())),
        };

        match serde_json::from_slice::<StateFile>(&bytes) {
            Ok(state) => Ok(state),
            Err(err) => {
                self.quarantine().await?;
                tracing::warn!(
                    path = %self.path.display(),
                    %err,
                    "state file corrupt, quarantined; resuming from empty state"
                );
                Ok(StateFile::new())
            }
        }
    }

    async fn quarantine(&self) -> Result<(), StateStoreError> {
        let file_name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "sync_state.json".to_string());
        let parent = self.path.parent().unwrap_or_else(|| Path::new("."));
        let quarantined = parent.join(format!("{file_name}.corrupt.{}", Utc::now().timestamp()));

        match tokio::fs::rename(&self.path, &quarantined).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(StateStoreError::Write(err.to_string())),
        }
    }

    async fn write_all(&self, state: &StateFile) -> Result<(), StateStoreError> {
        let parent = self.path.parent().unwrap_or_else(|| Path::new("."));
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| StateStoreError::Write(e.to_string()))?;

        let tmp_path = parent.join(format!(".{}.tmp", uuid::Uuid::new_v4()));
        let bytes =
            serde_json::to_vec_pretty(state).map_err(|e| StateStoreError::Write(e.to_string()))?;
        tokio::fs::write(&tmp_path, &bytes)
            .await
            .map_err(|e| StateStoreError::Write(e.to_string()))?;
        tokio::fs::rename(&tmp_path, &self.path)
            .await
            .map_err(|e| StateStoreError::Write(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use model::watermark::Watermark;
    use tempfile::tempdir;

    #[tokio::test]
    async fn load_on_missing_file_returns_default_state() {
        let dir = tempdir().unwrap();
        let store = JsonStateStore::new(dir.path().join("sync_state.json"));
        let state = store.load("mapping-a").await.unwrap();
        assert!(state.watermark.is_empty());
    }

    #[tokio::test]
    async fn commit_then_load_round_trips() {
        let dir = tempdir().unwrap();
        let store = JsonStateStore::new(dir.path().join("sync_state.json"));

        let mut state = RunState::default();
        state.watermark = Watermark::from("42");
        state.records_uploaded_total = 100;
        store.commit("mapping-a", state).await.unwrap();

        let loaded = store.load("mapping-a").await.unwrap();
        assert_eq!(loaded.watermark.as_str(), "42");
        assert_eq!(loaded.records_uploaded_total, 100);
    }

    #[tokio::test]
    async fn force_reset_only_touches_named_mapping() {
        let dir = tempdir().unwrap();
        let store = JsonStateStore::new(dir.path().join("sync_state.json"));

        let mut a = RunState::default();
        a.watermark = Watermark::from("10");
        store.commit("mapping-a", a).await.unwrap();
        let mut b = RunState::default();
        b.watermark = Watermark::from("20");
        store.commit("mapping-b", b).await.unwrap();

        store.force_reset("mapping-a").await.unwrap();

        assert!(store.load("mapping-a").await.unwrap().watermark.is_empty());
        assert_eq!(store.load("mapping-b").await.unwrap().watermark.as_str(), "20");
    }

    #[tokio::test]
    async fn corrupt_file_is_quarantined_and_state_recovers_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sync_state.json");
        tokio::fs::write(&path, b"{not valid json").await.unwrap();

        let store = JsonStateStore::new(&path);
        let state = store.load("mapping-a").await.unwrap();
        assert!(state.watermark.is_empty());

        let mut entries = tokio::fs::read_dir(dir.path()).await.unwrap();
        let mut saw_quarantine = false;
        while let Some(entry) = entries.next_entry().await.unwrap() {
            if entry.file_name().to_string_lossy().contains(".corrupt.") {
                saw_quarantine = true;
            }
        }
        assert!(saw_quarantine);
    }
}
