//! Vector store abstraction and its SQLite implementation.
//!
//! A store holds named collections of (embedding, [`Chunk`]) pairs. The
//! index manager creates a fresh collection per rebuild, fills it in one
//! transaction, and later drops superseded ones.
//!
//! [`SqliteVectorStore`] keeps embeddings as little-endian `f32` BLOBs and
//! ranks by brute-force cosine similarity computed in Rust, which is plenty
//! for a policy corpus of a few thousand chunks.

use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use std::path::Path;
use tracing::debug;

use crate::db;
use crate::embedding;
use crate::error::{RagError, Result};
use crate::migrate;
use crate::models::{Chunk, ScoredChunk};

/// Metadata for one live collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionInfo {
    /// `<base_name>_v<generation>`
    pub id: String,
    pub generation: i64,
    /// Corpus fingerprint the collection was built from.
    pub fingerprint: String,
    pub dims: usize,
    pub chunk_count: u64,
}

/// Persistent storage of embedded chunks, grouped into collections.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Allocate a new, empty collection under `base_name`. Its generation is
    /// one more than any generation ever allocated for that name.
    async fn create_collection(
        &self,
        base_name: &str,
        fingerprint: &str,
        dims: usize,
    ) -> Result<CollectionInfo>;

    /// Insert every entry atomically. Either all rows land or none do.
    async fn add_batch(&self, collection_id: &str, entries: &[(Chunk, Vec<f32>)]) -> Result<()>;

    /// Return up to `k` chunks ranked by cosine similarity to `vector`,
    /// best first.
    async fn query(&self, collection_id: &str, vector: &[f32], k: usize)
        -> Result<Vec<ScoredChunk>>;

    /// Number of chunks stored in a live collection.
    async fn count(&self, collection_id: &str) -> Result<u64>;

    /// Look up a live collection. `None` if it never existed or was dropped.
    async fn collection(&self, collection_id: &str) -> Result<Option<CollectionInfo>>;

    /// Live collections for `base_name`, newest generation first.
    async fn live_collections(&self, base_name: &str) -> Result<Vec<CollectionInfo>>;

    /// Delete a collection's chunks. Its generation stays allocated.
    async fn drop_collection(&self, collection_id: &str) -> Result<()>;
}

pub struct SqliteVectorStore {
    pool: SqlitePool,
}

impl SqliteVectorStore {
    /// Open the store under `persist_path`, creating the database and
    /// schema on first use.
    pub async fn open(persist_path: &Path) -> Result<Self> {
        let pool = db::connect(persist_path).await?;
        migrate::run_migrations(&pool).await?;
        Ok(Self { pool })
    }

    /// Record `<base_name>_v<generation>` as allocated and already dropped,
    /// so later allocations for `base_name` start above it. Used after the
    /// database has been recreated and its history lost.
    pub async fn reserve_generation(&self, base_name: &str, generation: i64) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        sqlx::query(
            r#"
            INSERT OR IGNORE INTO collections (id, base_name, generation, fingerprint, dims, chunk_count, created_at, dropped_at)
            VALUES (?, ?, ?, '', 0, 0, ?, ?)
            "#,
        )
        .bind(format!("{}_v{}", base_name, generation))
        .bind(base_name)
        .bind(generation)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Open the store only if its database file already exists.
    pub async fn open_if_exists(persist_path: &Path) -> Result<Option<Self>> {
        if !db::db_path(persist_path).exists() {
            return Ok(None);
        }
        Ok(Some(Self::open(persist_path).await?))
    }
}

fn collection_from_row(row: &sqlx::sqlite::SqliteRow) -> CollectionInfo {
    let dims: i64 = row.get("dims");
    let chunk_count: i64 = row.get("chunk_count");
    CollectionInfo {
        id: row.get("id"),
        generation: row.get("generation"),
        fingerprint: row.get("fingerprint"),
        dims: dims.max(0) as usize,
        chunk_count: chunk_count.max(0) as u64,
    }
}

#[async_trait]
impl VectorStore for SqliteVectorStore {
    async fn create_collection(
        &self,
        base_name: &str,
        fingerprint: &str,
        dims: usize,
    ) -> Result<CollectionInfo> {
        let mut tx = self.pool.begin().await?;

        let last: i64 = sqlx::query_scalar(
            "SELECT COALESCE(MAX(generation), 0) FROM collections WHERE base_name = ?",
        )
        .bind(base_name)
        .fetch_one(&mut *tx)
        .await?;

        let generation = last + 1;
        let id = format!("{}_v{}", base_name, generation);

        sqlx::query(
            r#"
            INSERT INTO collections (id, base_name, generation, fingerprint, dims, chunk_count, created_at)
            VALUES (?, ?, ?, ?, ?, 0, ?)
            "#,
        )
        .bind(&id)
        .bind(base_name)
        .bind(generation)
        .bind(fingerprint)
        .bind(dims as i64)
        .bind(chrono::Utc::now().timestamp())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        debug!(collection = %id, generation, dims, "allocated collection");

        Ok(CollectionInfo {
            id,
            generation,
            fingerprint: fingerprint.to_string(),
            dims,
            chunk_count: 0,
        })
    }

    async fn add_batch(&self, collection_id: &str, entries: &[(Chunk, Vec<f32>)]) -> Result<()> {
        let info = self.collection(collection_id).await?.ok_or_else(|| {
            RagError::IndexState(format!("collection {} does not exist", collection_id))
        })?;

        if let Some((chunk, vec)) = entries.iter().find(|(_, v)| v.len() != info.dims) {
            return Err(RagError::InvalidArgument(format!(
                "vector for chunk {} has {} dimensions, collection {} expects {}",
                chunk.id,
                vec.len(),
                collection_id,
                info.dims
            )));
        }

        let mut tx = self.pool.begin().await?;

        for (chunk, vec) in entries {
            sqlx::query(
                r#"
                INSERT INTO chunks (collection_id, id, source_id, display_name, chunk_index, content, hash, embedding)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(collection_id)
            .bind(&chunk.id)
            .bind(&chunk.source_id)
            .bind(&chunk.display_name)
            .bind(chunk.chunk_index)
            .bind(&chunk.content)
            .bind(&chunk.hash)
            .bind(embedding::vec_to_blob(vec))
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query(
            "UPDATE collections SET chunk_count = (SELECT COUNT(*) FROM chunks WHERE collection_id = ?) WHERE id = ?",
        )
        .bind(collection_id)
        .bind(collection_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn query(
        &self,
        collection_id: &str,
        vector: &[f32],
        k: usize,
    ) -> Result<Vec<ScoredChunk>> {
        if k == 0 {
            return Ok(Vec::new());
        }

        let rows = sqlx::query(
            r#"
            SELECT id, source_id, display_name, chunk_index, content, hash, embedding
            FROM chunks
            WHERE collection_id = ?
            "#,
        )
        .bind(collection_id)
        .fetch_all(&self.pool)
        .await?;

        let mut scored: Vec<ScoredChunk> = rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                let score = embedding::cosine_similarity(vector, &embedding::blob_to_vec(&blob));
                ScoredChunk {
                    chunk: Chunk {
                        id: row.get("id"),
                        source_id: row.get("source_id"),
                        display_name: row.get("display_name"),
                        chunk_index: row.get("chunk_index"),
                        content: row.get("content"),
                        hash: row.get("hash"),
                    },
                    score,
                }
            })
            .collect();

        // Sort by similarity desc and take top K
        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(k);

        Ok(scored)
    }

    async fn count(&self, collection_id: &str) -> Result<u64> {
        if self.collection(collection_id).await?.is_none() {
            return Err(RagError::IndexState(format!(
                "collection {} does not exist",
                collection_id
            )));
        }

        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks WHERE collection_id = ?")
            .bind(collection_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(n.max(0) as u64)
    }

    async fn collection(&self, collection_id: &str) -> Result<Option<CollectionInfo>> {
        let row = sqlx::query(
            r#"
            SELECT id, generation, fingerprint, dims, chunk_count
            FROM collections
            WHERE id = ? AND dropped_at IS NULL
            "#,
        )
        .bind(collection_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(collection_from_row))
    }

    async fn live_collections(&self, base_name: &str) -> Result<Vec<CollectionInfo>> {
        let rows = sqlx::query(
            r#"
            SELECT id, generation, fingerprint, dims, chunk_count
            FROM collections
            WHERE base_name = ? AND dropped_at IS NULL
            ORDER BY generation DESC
            "#,
        )
        .bind(base_name)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(collection_from_row).collect())
    }

    async fn drop_collection(&self, collection_id: &str) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM chunks WHERE collection_id = ?")
            .bind(collection_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            "UPDATE collections SET dropped_at = ?, chunk_count = 0 WHERE id = ? AND dropped_at IS NULL",
        )
        .bind(chrono::Utc::now().timestamp())
        .bind(collection_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        debug!(collection = %collection_id, "dropped collection");
        Ok(())
    }
}
