// Dictionary domain types and the storage port (C4).
//
// Following the same pattern as `SpamStore` in the moderation subsystem
// this grew out of: the port (trait) lives in `core`, the SQLite
// implementation lives in `infra`, so the classifier and admin handler never
// depend on `sqlx` directly.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DictionaryError {
    #[error("empty phrase")]
    EmptyPhrase,

    #[error("invalid dictionary type: {0}")]
    InvalidType(String),

    #[error("duplicate entry for ({gid}, {entry_type:?}, {data:?})")]
    Duplicate {
        gid: String,
        entry_type: DictionaryType,
        data: String,
    },

    #[error("no entry with id {0}")]
    NotFound(i64),

    #[error("invalid CSV input: {0}")]
    InvalidCsv(String),

    #[error("storage error: {0}")]
    Storage(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DictionaryType {
    StopPhrase,
    IgnoredWord,
}

impl DictionaryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DictionaryType::StopPhrase => "stop_phrase",
            DictionaryType::IgnoredWord => "ignored_word",
        }
    }

    pub fn validate(raw: &str) -> Result<Self, DictionaryError> {
        match raw {
            "stop_phrase" => Ok(DictionaryType::StopPhrase),
            "ignored_word" => Ok(DictionaryType::IgnoredWord),
            other => Err(DictionaryError::InvalidType(other.to_string())),
        }
    }
}

impl std::fmt::Display for DictionaryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DictionaryEntry {
    pub id: i64,
    pub gid: String,
    pub entry_type: DictionaryType,
    pub data: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct DictionaryStats {
    pub stop_phrases: u64,
    pub ignored_words: u64,
}

/// Storage port for the dictionary. `gid` (group id) partitions every
/// gid-scoped call; implementations must never leak another gid's rows back
/// to a caller (tested in `infra::dictionary_sqlite`).
#[async_trait]
pub trait DictionaryStore: Send + Sync {
    async fn add(
        &self,
        gid: &str,
        entry_type: DictionaryType,
        phrase: &str,
    ) -> Result<DictionaryEntry, DictionaryError>;

    async fn delete(&self, id: i64) -> Result<(), DictionaryError>;

    async fn read(&self, gid: &str, entry_type: DictionaryType) -> Result<Vec<String>, DictionaryError>;

    /// Lazy sequence over the same rows `read` would return. The default
    /// implementation just wraps `read`'s result; a truly streaming cursor
    /// is a backend concern (see `infra::dictionary_sqlite` for the SQLite
    /// one, which still materializes a page at a time rather than the whole
    /// table, since sqlx's `fetch_all` is the one the rest of this store
    /// already uses).
    async fn iterator(
        &self,
        gid: &str,
        entry_type: DictionaryType,
    ) -> Result<std::vec::IntoIter<String>, DictionaryError> {
        Ok(self.read(gid, entry_type).await?.into_iter())
    }

    /// Same content as `read`, newline-delimited, for streaming to a
    /// caller that wants bytes rather than a `Vec<String>`.
    async fn reader(&self, gid: &str, entry_type: DictionaryType) -> Result<String, DictionaryError> {
        Ok(self.read(gid, entry_type).await?.join("\n"))
    }

    async fn stats(&self, gid: &str) -> Result<DictionaryStats, DictionaryError>;

    /// Parse `src` as one CSV line of comma-separated values (quoted values
    /// may embed commas) and insert each into `(gid, entry_type)`. If
    /// `cleanup`, all existing rows for `(gid, entry_type)` are deleted
    /// first, atomically with the inserts. When `cleanup` is false,
    /// colliding rows are silently skipped rather than erroring (preserves
    /// `INSERT OR IGNORE` semantics).
    async fn import(
        &self,
        gid: &str,
        entry_type: DictionaryType,
        src: &str,
        cleanup: bool,
    ) -> Result<u64, DictionaryError>;
}
