//! Snapshot model and file persistence
//!
//! A snapshot is the complete `{cards, tasks, preferences, token}` document
//! kept on disk. The file always holds the last state known to the server.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::error::Error;
use crate::resource::{records_from_wire, Card, Preference, Task};
use crate::Result;

/// Point-in-time view of the whole board
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub cards: Vec<Card>,
    pub tasks: Vec<Task>,
    pub preferences: Vec<Preference>,
    pub token: Option<String>,
}

impl Snapshot {
    /// Parse a snapshot document, reporting malformed records by kind
    pub fn from_wire(data: &Value) -> Result<Self> {
        let section = |key: &str| {
            data.get(key)
                .ok_or_else(|| Error::CorruptSnapshot(format!("missing \"{}\" section", key)))
        };

        let token = match data.get("token") {
            None | Some(Value::Null) => None,
            Some(Value::String(token)) => Some(token.clone()),
            Some(other) => {
                return Err(Error::CorruptSnapshot(format!(
                    "token must be a string or null, got {}",
                    other
                )))
            }
        };

        Ok(Self {
            cards: records_from_wire(section("cards")?)?,
            tasks: records_from_wire(section("tasks")?)?,
            preferences: records_from_wire(section("preferences")?)?,
            token,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.cards.is_empty() && self.tasks.is_empty() && self.preferences.is_empty()
    }
}

/// JSON file holding a snapshot
#[derive(Debug, Clone)]
pub struct SnapshotFile {
    path: PathBuf,
}

impl SnapshotFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Read the snapshot; a missing file reads as an empty board
    pub async fn read(&self) -> Result<Snapshot> {
        if !self.path.exists() {
            debug!("Snapshot file {:?} not found, starting empty", self.path);
            return Ok(Snapshot::default());
        }

        let content = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| Error::Storage(format!("Failed to read snapshot file: {}", e)))?;
        let data: Value = serde_json::from_str(&content)
            .map_err(|e| Error::CorruptSnapshot(format!("Failed to parse snapshot file: {}", e)))?;

        Snapshot::from_wire(&data)
    }

    /// Write the snapshot, creating the parent directory if needed
    pub async fn write(&self, snapshot: &Snapshot) -> Result<()> {
        let content = serde_json::to_string_pretty(snapshot)
            .map_err(|e| Error::Storage(format!("Failed to serialize snapshot: {}", e)))?;

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::Storage(format!("Failed to create directory: {}", e)))?;
        }

        tokio::fs::write(&self.path, content)
            .await
            .map_err(|e| Error::Storage(format!("Failed to write snapshot file: {}", e)))?;

        info!("Snapshot saved to {:?}", self.path);
        Ok(())
    }

    /// Replace the file with an empty board and no token
    pub async fn wipe(&self) -> Result<()> {
        self.write(&Snapshot::default()).await
    }

    /// Delete the file if present
    pub async fn remove(&self) -> Result<()> {
        if self.path.exists() {
            tokio::fs::remove_file(&self.path)
                .await
                .map_err(|e| Error::Storage(format!("Failed to remove snapshot file: {}", e)))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::{ResourceId, ResourceKind};
    use serde_json::json;
    use tempfile::tempdir;

    fn id(raw: u64) -> ResourceId {
        ResourceId::new(raw).unwrap()
    }

    fn sample() -> Snapshot {
        Snapshot {
            cards: vec![Card::new(id(1), "Work")],
            tasks: vec![Task::new(id(1), id(1), "Write report")],
            preferences: vec![Preference::new(id(1), id(1))],
            token: Some("abc".to_string()),
        }
    }

    #[tokio::test]
    async fn test_missing_file_reads_empty() {
        let dir = tempdir().unwrap();
        let file = SnapshotFile::new(dir.path().join("storage.json"));

        let snapshot = file.read().await.unwrap();
        assert!(snapshot.is_empty());
        assert!(snapshot.token.is_none());
    }

    #[tokio::test]
    async fn test_write_and_read_back() {
        let dir = tempdir().unwrap();
        let file = SnapshotFile::new(dir.path().join("nested").join("storage.json"));

        file.write(&sample()).await.unwrap();
        assert!(file.exists());
        assert_eq!(file.read().await.unwrap(), sample());

        file.wipe().await.unwrap();
        assert_eq!(file.read().await.unwrap(), Snapshot::default());
    }

    #[tokio::test]
    async fn test_unparsable_file_is_corrupt() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("storage.json");
        tokio::fs::write(&path, "{not json").await.unwrap();

        let result = SnapshotFile::new(path).read().await;
        assert!(matches!(result, Err(Error::CorruptSnapshot(_))));
    }

    #[test]
    fn test_from_wire_reports_malformed_records() {
        let data = json!({
            "cards": [{"id": 1, "position": 0}],
            "tasks": [],
            "preferences": [],
            "token": null
        });
        assert!(matches!(
            Snapshot::from_wire(&data),
            Err(Error::MalformedResource { kind: ResourceKind::Card, .. })
        ));

        let missing = json!({"cards": [], "tasks": [], "token": null});
        assert!(matches!(Snapshot::from_wire(&missing), Err(Error::CorruptSnapshot(_))));
    }
}
