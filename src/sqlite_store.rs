//! SQLite-backed [`IndexStorage`] implementation.
//!
//! Collections live in the `collections` table; embedded chunks in `entries`
//! with the vector stored as a little-endian `f32` BLOB. Similarity scoring
//! happens in Rust over the loaded vectors, so no SQLite extension is needed.

use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use std::collections::HashSet;
use std::path::Path;

use crate::db;
use crate::embedding::{blob_to_vec, vec_to_blob};
use crate::error::Result;
use crate::migrate;
use crate::models::SourceMetadata;
use crate::store::{CollectionInfo, IndexEntry, IndexStorage};

/// SQLite implementation of the [`IndexStorage`] trait.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open (creating if needed) the database at `path` and apply the schema.
    pub async fn open(path: &Path) -> Result<Self> {
        let pool = db::connect_path(path).await?;
        migrate::migrate_pool(&pool).await?;
        Ok(Self { pool })
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn now_ts() -> i64 {
    chrono::Utc::now().timestamp()
}

#[async_trait]
impl IndexStorage for SqliteStore {
    async fn create_collection(&self, name: &str) -> Result<bool> {
        let now = now_ts();
        let result = sqlx::query(
            "INSERT OR IGNORE INTO collections (name, source_digest, created_at, updated_at) \
             VALUES (?, NULL, ?, ?)",
        )
        .bind(name)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn collection_info(&self, name: &str) -> Result<Option<CollectionInfo>> {
        let row = sqlx::query(
            "SELECT c.name, c.source_digest, \
                    (SELECT COUNT(*) FROM entries e WHERE e.collection = c.name) AS n \
             FROM collections c WHERE c.name = ?",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| CollectionInfo {
            name: r.get("name"),
            entries: r.get::<i64, _>("n") as usize,
            source_digest: r.get("source_digest"),
        }))
    }

    async fn set_source_digest(&self, name: &str, digest: &str) -> Result<()> {
        sqlx::query("UPDATE collections SET source_digest = ?, updated_at = ? WHERE name = ?")
            .bind(digest)
            .bind(now_ts())
            .bind(name)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn existing_ids(&self, name: &str, ids: &[String]) -> Result<HashSet<String>> {
        if ids.is_empty() {
            return Ok(HashSet::new());
        }
        let stored: HashSet<String> =
            sqlx::query_scalar("SELECT content_id FROM entries WHERE collection = ?")
                .bind(name)
                .fetch_all(&self.pool)
                .await?
                .into_iter()
                .collect();
        Ok(ids.iter().filter(|id| stored.contains(*id)).cloned().collect())
    }

    async fn insert_entries(&self, name: &str, entries: &[IndexEntry]) -> Result<usize> {
        let mut tx = self.pool.begin().await?;

        let mut next_seq: i64 = sqlx::query_scalar(
            "SELECT COALESCE(MAX(seq), -1) + 1 FROM entries WHERE collection = ?",
        )
        .bind(name)
        .fetch_one(&mut *tx)
        .await?;

        let mut inserted = 0usize;
        for entry in entries {
            let result = sqlx::query(
                r#"
                INSERT OR IGNORE INTO entries
                    (collection, content_id, seq, text, source_name, page_index, embedding, dims)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(name)
            .bind(&entry.content_id)
            .bind(next_seq)
            .bind(&entry.text)
            .bind(&entry.source.source_name)
            .bind(entry.source.page_index as i64)
            .bind(vec_to_blob(&entry.embedding))
            .bind(entry.embedding.len() as i64)
            .execute(&mut *tx)
            .await?;

            if result.rows_affected() > 0 {
                inserted += 1;
                next_seq += 1;
            }
        }

        sqlx::query("UPDATE collections SET updated_at = ? WHERE name = ?")
            .bind(now_ts())
            .bind(name)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(inserted)
    }

    async fn load_entries(&self, name: &str) -> Result<Vec<IndexEntry>> {
        let rows = sqlx::query(
            "SELECT content_id, text, source_name, page_index, embedding \
             FROM entries WHERE collection = ? ORDER BY seq",
        )
        .bind(name)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                IndexEntry {
                    content_id: row.get("content_id"),
                    text: row.get("text"),
                    source: SourceMetadata {
                        source_name: row.get("source_name"),
                        page_index: row.get::<i64, _>("page_index") as usize,
                    },
                    embedding: blob_to_vec(&blob),
                }
            })
            .collect())
    }

    async fn list_collections(&self) -> Result<Vec<CollectionInfo>> {
        let rows = sqlx::query(
            "SELECT c.name, c.source_digest, COUNT(e.content_id) AS n \
             FROM collections c LEFT JOIN entries e ON e.collection = c.name \
             GROUP BY c.name ORDER BY c.name",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|r| CollectionInfo {
                name: r.get("name"),
                entries: r.get::<i64, _>("n") as usize,
                source_digest: r.get("source_digest"),
            })
            .collect())
    }

    async fn drop_collection(&self, name: &str) -> Result<bool> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM entries WHERE collection = ?")
            .bind(name)
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query("DELETE FROM collections WHERE name = ?")
            .bind(name)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }
}
