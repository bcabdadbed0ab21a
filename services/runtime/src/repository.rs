//! File-backed strategy repository
//!
//! One JSON document per strategy, named `<id>.json`:
//!
//! ```json
//! {"id": 7, "content": "...", "last_modified": "2024-05-01T12:00:00Z", "is_runnable": true}
//! ```
//!
//! Files are re-read on every call so edits are picked up by the next
//! reconciliation cycle.

use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use strategy_ownership::{OwnershipError, Result, StrategyRepository};
use types::{StrategyDefinition, StrategyId};

#[derive(Debug, Clone)]
pub struct FileStrategyRepository {
    dir: PathBuf,
}

impl FileStrategyRepository {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, id: StrategyId) -> PathBuf {
        self.dir.join(format!("{}.json", id))
    }

    async fn read(&self, path: &Path, id: StrategyId) -> Result<Option<StrategyDefinition>> {
        let text = match tokio::fs::read_to_string(path).await {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(OwnershipError::Repository {
                    id,
                    reason: e.to_string(),
                })
            }
        };
        let definition: StrategyDefinition =
            serde_json::from_str(&text).map_err(|e| OwnershipError::Repository {
                id,
                reason: format!("{}: {}", path.display(), e),
            })?;
        if definition.id != id {
            return Err(OwnershipError::Repository {
                id,
                reason: format!("{} declares id {}", path.display(), definition.id),
            });
        }
        Ok(Some(definition))
    }
}

#[async_trait]
impl StrategyRepository for FileStrategyRepository {
    async fn runnable_ids(&self) -> Result<Vec<StrategyId>> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::warn!("Strategy directory {} does not exist", self.dir.display());
                return Ok(Vec::new());
            }
            Err(e) => {
                return Err(OwnershipError::Configuration(format!(
                    "Cannot read {}: {}",
                    self.dir.display(),
                    e
                )))
            }
        };

        let mut ids = Vec::new();
        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!("Stopped listing {}: {}", self.dir.display(), e);
                    break;
                }
            };
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(id) = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| s.parse::<StrategyId>().ok())
            else {
                tracing::debug!("Ignoring {}", path.display());
                continue;
            };

            match self.read(&path, id).await {
                Ok(Some(definition)) if definition.is_runnable => ids.push(id),
                Ok(_) => {}
                Err(e) => tracing::warn!("Skipping strategy file: {}", e),
            }
        }

        ids.sort();
        Ok(ids)
    }

    async fn definition(&self, id: StrategyId) -> Result<Option<StrategyDefinition>> {
        self.read(&self.path_for(id), id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str, body: &str) {
        fs::write(dir.path().join(name), body).unwrap();
    }

    fn doc(id: i64, runnable: bool) -> String {
        format!(
            r#"{{"id": {}, "content": "rsi < 30", "last_modified": "2024-05-01T12:00:00Z", "is_runnable": {}}}"#,
            id, runnable
        )
    }

    #[tokio::test]
    async fn test_runnable_ids_filters_and_skips_junk() {
        let dir = TempDir::new().unwrap();
        write(&dir, "1.json", &doc(1, true));
        write(&dir, "2.json", &doc(2, false));
        write(&dir, "3.json", "{ not json");
        write(&dir, "4.json", &doc(5, true));
        write(&dir, "notes.txt", "hello");
        write(&dir, "10.json", r#"{"id": 10, "content": "x", "last_modified": "2024-05-01T12:00:00Z"}"#);

        let repo = FileStrategyRepository::new(dir.path());
        let ids = repo.runnable_ids().await.unwrap();
        assert_eq!(ids, vec![StrategyId(1), StrategyId(10)]);
    }

    #[tokio::test]
    async fn test_definition_lookup() {
        let dir = TempDir::new().unwrap();
        write(&dir, "7.json", &doc(7, true));
        let repo = FileStrategyRepository::new(dir.path());

        let def = repo.definition(StrategyId(7)).await.unwrap().unwrap();
        assert_eq!(def.content, "rsi < 30");
        assert!(repo.definition(StrategyId(8)).await.unwrap().is_none());

        write(&dir, "9.json", "[]");
        assert!(matches!(
            repo.definition(StrategyId(9)).await,
            Err(OwnershipError::Repository { .. })
        ));
    }

    #[tokio::test]
    async fn test_missing_directory_is_empty() {
        let dir = TempDir::new().unwrap();
        let repo = FileStrategyRepository::new(dir.path().join("absent"));
        assert!(repo.runnable_ids().await.unwrap().is_empty());
    }
}
