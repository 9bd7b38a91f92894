// SQLite-backed dictionary store.
//
// Tables:
// - dictionary_entries: one row per (gid, entry_type, data) phrase or word
//
// Grounded on `SqliteSpamStore`'s shape: migrate-on-construct, `ON CONFLICT`
// upserts for dedup, `sqlx::Row` column pulls. Writes go through an
// in-process `RwLock` in addition to the pool's own connection serialization
// so a `cleanup`-then-insert CSV import observes a consistent table even
// under concurrent readers (Resource Model: "DictionaryStore: single writer
// per gid/type, many readers").

use crate::core::dictionary::{DictionaryEntry, DictionaryError, DictionaryStats, DictionaryStore, DictionaryType};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Pool, Row, Sqlite};
use tokio::sync::RwLock;

pub struct SqliteDictionaryStore {
    pool: Pool<Sqlite>,
    write_lock: RwLock<()>,
}

impl SqliteDictionaryStore {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool, write_lock: RwLock::new(()) }
    }

    pub async fn migrate(&self) -> Result<(), DictionaryError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS dictionary_entries (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                gid TEXT NOT NULL,
                entry_type TEXT NOT NULL,
                data TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                UNIQUE(gid, entry_type, data)
            );
            CREATE INDEX IF NOT EXISTS idx_dictionary_gid_type
                ON dictionary_entries(gid, entry_type);
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| DictionaryError::Storage(e.to_string()))?;
        Ok(())
    }

    fn row_to_entry(row: &sqlx::sqlite::SqliteRow) -> Result<DictionaryEntry, DictionaryError> {
        let entry_type: String = row.get("entry_type");
        let timestamp_str: String = row.get("timestamp");
        Ok(DictionaryEntry {
            id: row.get::<i64, _>("id"),
            gid: row.get("gid"),
            entry_type: DictionaryType::validate(&entry_type)?,
            data: row.get("data"),
            timestamp: DateTime::parse_from_rfc3339(&timestamp_str)
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or_else(|_| Utc::now()),
        })
    }

    /// Full rows rather than bare phrases, for callers that need an entry's
    /// id (to delete it) or timestamp, not just its text.
    pub async fn entries(&self, gid: &str, entry_type: DictionaryType) -> Result<Vec<DictionaryEntry>, DictionaryError> {
        let rows = sqlx::query("SELECT id, gid, entry_type, data, timestamp FROM dictionary_entries WHERE gid = ? AND entry_type = ? ORDER BY id")
            .bind(gid)
            .bind(entry_type.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| DictionaryError::Storage(e.to_string()))?;

        rows.iter().map(Self::row_to_entry).collect()
    }
}

#[async_trait]
impl DictionaryStore for SqliteDictionaryStore {
    async fn add(&self, gid: &str, entry_type: DictionaryType, phrase: &str) -> Result<DictionaryEntry, DictionaryError> {
        let phrase = phrase.trim();
        if phrase.is_empty() {
            return Err(DictionaryError::EmptyPhrase);
        }

        let _guard = self.write_lock.write().await;
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            INSERT INTO dictionary_entries (gid, entry_type, data, timestamp)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(gid)
        .bind(entry_type.as_str())
        .bind(phrase)
        .bind(now.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if e.to_string().contains("UNIQUE") {
                DictionaryError::Duplicate { gid: gid.to_string(), entry_type, data: phrase.to_string() }
            } else {
                DictionaryError::Storage(e.to_string())
            }
        })?;

        Ok(DictionaryEntry {
            id: result.last_insert_rowid(),
            gid: gid.to_string(),
            entry_type,
            data: phrase.to_string(),
            timestamp: now,
        })
    }

    async fn delete(&self, id: i64) -> Result<(), DictionaryError> {
        let _guard = self.write_lock.write().await;
        let result = sqlx::query("DELETE FROM dictionary_entries WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| DictionaryError::Storage(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(DictionaryError::NotFound(id));
        }
        Ok(())
    }

    async fn read(&self, gid: &str, entry_type: DictionaryType) -> Result<Vec<String>, DictionaryError> {
        let rows = sqlx::query("SELECT data FROM dictionary_entries WHERE gid = ? AND entry_type = ? ORDER BY id")
            .bind(gid)
            .bind(entry_type.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| DictionaryError::Storage(e.to_string()))?;

        Ok(rows.into_iter().map(|r| r.get::<String, _>("data")).collect())
    }

    async fn stats(&self, gid: &str) -> Result<DictionaryStats, DictionaryError> {
        let row = sqlx::query(
            r#"
            SELECT
                SUM(CASE WHEN entry_type = 'stop_phrase' THEN 1 ELSE 0 END) AS stop_phrases,
                SUM(CASE WHEN entry_type = 'ignored_word' THEN 1 ELSE 0 END) AS ignored_words
            FROM dictionary_entries WHERE gid = ?
            "#,
        )
        .bind(gid)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| DictionaryError::Storage(e.to_string()))?;

        Ok(DictionaryStats {
            stop_phrases: row.try_get::<i64, _>("stop_phrases").unwrap_or(0) as u64,
            ignored_words: row.try_get::<i64, _>("ignored_words").unwrap_or(0) as u64,
        })
    }

    async fn import(&self, gid: &str, entry_type: DictionaryType, src: &str, cleanup: bool) -> Result<u64, DictionaryError> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(src.as_bytes());

        let mut values = Vec::new();
        for result in reader.records() {
            let record = result.map_err(|e| DictionaryError::InvalidCsv(e.to_string()))?;
            for field in record.iter() {
                let field = field.trim();
                if !field.is_empty() {
                    values.push(field.to_string());
                }
            }
        }

        let _guard = self.write_lock.write().await;
        let mut tx = self.pool.begin().await.map_err(|e| DictionaryError::Storage(e.to_string()))?;

        if cleanup {
            sqlx::query("DELETE FROM dictionary_entries WHERE gid = ? AND entry_type = ?")
                .bind(gid)
                .bind(entry_type.as_str())
                .execute(&mut *tx)
                .await
                .map_err(|e| DictionaryError::Storage(e.to_string()))?;
        }

        let now = Utc::now().to_rfc3339();
        let mut inserted: u64 = 0;
        for value in &values {
            let result = sqlx::query(
                "INSERT OR IGNORE INTO dictionary_entries (gid, entry_type, data, timestamp) VALUES (?, ?, ?, ?)",
            )
            .bind(gid)
            .bind(entry_type.as_str())
            .bind(value)
            .bind(&now)
            .execute(&mut *tx)
            .await
            .map_err(|e| DictionaryError::Storage(e.to_string()))?;
            inserted += result.rows_affected();
        }

        tx.commit().await.map_err(|e| DictionaryError::Storage(e.to_string()))?;
        Ok(inserted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn store() -> SqliteDictionaryStore {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("in-memory sqlite pool");
        let store = SqliteDictionaryStore::new(pool);
        store.migrate().await.expect("migrate");
        store
    }

    #[tokio::test]
    async fn s5_entries_are_isolated_by_gid() {
        let store = store().await;
        store.add("g1", DictionaryType::StopPhrase, "buy now").await.unwrap();
        store.add("g2", DictionaryType::StopPhrase, "buy now").await.unwrap();

        let g1 = store.read("g1", DictionaryType::StopPhrase).await.unwrap();
        let g2 = store.read("g2", DictionaryType::StopPhrase).await.unwrap();
        assert_eq!(g1, vec!["buy now".to_string()]);
        assert_eq!(g2, vec!["buy now".to_string()]);

        store.delete_by_data("g1", DictionaryType::StopPhrase, "buy now").await;
        let g1_after = store.read("g1", DictionaryType::StopPhrase).await.unwrap();
        assert!(g1_after.is_empty());
        let g2_after = store.read("g2", DictionaryType::StopPhrase).await.unwrap();
        assert_eq!(g2_after, vec!["buy now".to_string()]);
    }

    #[tokio::test]
    async fn s6_csv_import_with_cleanup_replaces_existing_rows() {
        let store = store().await;
        store.add("g1", DictionaryType::StopPhrase, "old phrase").await.unwrap();

        let inserted = store
            .import("g1", DictionaryType::StopPhrase, "\"buy now\",crypto,\"free, money\"", true)
            .await
            .unwrap();
        assert_eq!(inserted, 3);

        let rows = store.read("g1", DictionaryType::StopPhrase).await.unwrap();
        assert!(!rows.iter().any(|r| r == "old phrase"));
        assert!(rows.iter().any(|r| r == "buy now"));
        assert!(rows.iter().any(|r| r == "free, money"));
    }

    #[tokio::test]
    async fn import_without_cleanup_skips_duplicates() {
        let store = store().await;
        store.add("g1", DictionaryType::StopPhrase, "buy now").await.unwrap();
        let inserted = store
            .import("g1", DictionaryType::StopPhrase, "buy now,new phrase", false)
            .await
            .unwrap();
        assert_eq!(inserted, 1);
        let rows = store.read("g1", DictionaryType::StopPhrase).await.unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[tokio::test]
    async fn empty_phrase_is_rejected() {
        let store = store().await;
        let err = store.add("g1", DictionaryType::StopPhrase, "   ").await.unwrap_err();
        assert!(matches!(err, DictionaryError::EmptyPhrase));
    }

    impl SqliteDictionaryStore {
        async fn delete_by_data(&self, gid: &str, entry_type: DictionaryType, data: &str) {
            let rows = sqlx::query("SELECT id FROM dictionary_entries WHERE gid = ? AND entry_type = ? AND data = ?")
                .bind(gid)
                .bind(entry_type.as_str())
                .bind(data)
                .fetch_all(&self.pool)
                .await
                .unwrap();
            for row in rows {
                let id: i64 = row.get("id");
                self.delete(id).await.unwrap();
            }
        }
    }
}
