// JSON-file-backed persisted training sample log, so a trainable detector's
// learned weights can be rebuilt by replaying history after a restart
// instead of starting cold. Grounded on `JsonServerStatsStore`'s
// load-into-memory-cache / write-through-to-disk shape: an in-memory
// `RwLock<Vec<_>>` is the source of truth for reads, each write appends and
// rewrites the whole file.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;
use tokio::sync::RwLock;

#[derive(Debug, Error)]
pub enum SamplesStoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Label {
    Spam,
    Ham,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingSample {
    pub text: String,
    pub label: Label,
    pub recorded_at: chrono::DateTime<chrono::Utc>,
}

pub struct SamplesStore {
    path: PathBuf,
    cache: RwLock<Vec<TrainingSample>>,
}

impl SamplesStore {
    pub fn new(path: impl Into<PathBuf>) -> Result<Self, SamplesStoreError> {
        let path = path.into();
        let samples = if path.exists() {
            let file = std::fs::File::open(&path)?;
            serde_json::from_reader(file).unwrap_or_default()
        } else {
            Vec::new()
        };

        Ok(Self { path, cache: RwLock::new(samples) })
    }

    async fn persist(&self) -> Result<(), SamplesStoreError> {
        let cache = self.cache.read().await;
        let file = std::fs::File::create(&self.path)?;
        serde_json::to_writer_pretty(file, &*cache)?;
        Ok(())
    }

    pub async fn record(&self, text: impl Into<String>, label: Label) -> Result<(), SamplesStoreError> {
        {
            let mut cache = self.cache.write().await;
            cache.push(TrainingSample { text: text.into(), label, recorded_at: chrono::Utc::now() });
        }
        self.persist().await
    }

    pub async fn all(&self) -> Vec<TrainingSample> {
        self.cache.read().await.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[tokio::test]
    async fn records_survive_reload_from_disk() {
        let tmp = NamedTempFile::new().unwrap();
        std::fs::remove_file(tmp.path()).ok();

        {
            let store = SamplesStore::new(tmp.path()).unwrap();
            store.record("free crypto now", Label::Spam).await.unwrap();
            store.record("see you tomorrow", Label::Ham).await.unwrap();
        }

        let reloaded = SamplesStore::new(tmp.path()).unwrap();
        let samples = reloaded.all().await;
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].label, Label::Spam);
    }

    #[tokio::test]
    async fn missing_file_starts_empty() {
        let tmp = NamedTempFile::new().unwrap();
        std::fs::remove_file(tmp.path()).ok();
        let store = SamplesStore::new(tmp.path()).unwrap();
        assert!(store.all().await.is_empty());
    }
}
