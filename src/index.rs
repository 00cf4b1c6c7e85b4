//! Index lifecycle: reuse the persisted vector index when the corpus is
//! unchanged, rebuild it otherwise.
//!
//! # Decision
//!
//! The persisted index is reused only when all of these hold:
//!
//! 1. `force_rebuild` is false
//! 2. `corpus.fingerprint` exists and parses
//! 3. its digest equals the freshly computed corpus fingerprint
//! 4. the collection it names is still live in the store
//! 5. the collection's dimensionality matches the embedder (when known)
//!
//! Anything else rebuilds. Reuse does no chunking and no embedding.
//!
//! # Rebuild
//!
//! ```text
//! chunk corpus ─▶ embed in batches ─▶ new collection <name>_v<N>
//!                                        │  (one transaction)
//!                                        ▼
//!                      write corpus.fingerprint (temp + rename)
//!                                        │
//!                                        ▼
//!                   drop collections older than the previous one
//! ```
//!
//! A reader still holding the previous collection keeps working until the
//! next rebuild after this one. A failed build drops its own collection and
//! leaves the artifact untouched, so the previous index stays current.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{info, warn};

use crate::chunk;
use crate::config::Config;
use crate::db;
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::fingerprint::{self, FingerprintRecord};
use crate::models::{Chunk, ScoredChunk};
use crate::progress::{BuildProgressEvent, BuildProgressReporter, NoProgress};
use crate::store::{CollectionInfo, SqliteVectorStore, VectorStore};

/// Handle onto one persisted collection of embedded chunks.
#[derive(Clone)]
pub struct VectorIndex {
    store: Arc<dyn VectorStore>,
    collection_id: String,
    fingerprint: String,
    dims: usize,
}

impl VectorIndex {
    pub fn new(
        store: Arc<dyn VectorStore>,
        collection_id: impl Into<String>,
        fingerprint: impl Into<String>,
        dims: usize,
    ) -> Self {
        Self {
            store,
            collection_id: collection_id.into(),
            fingerprint: fingerprint.into(),
            dims,
        }
    }

    fn from_info(store: Arc<dyn VectorStore>, info: CollectionInfo) -> Self {
        Self::new(store, info.id, info.fingerprint, info.dims)
    }

    pub fn collection_id(&self) -> &str {
        &self.collection_id
    }

    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// Embedding dimensionality, `0` for an index built from zero chunks.
    pub fn dims(&self) -> usize {
        self.dims
    }

    pub async fn count(&self) -> Result<u64> {
        self.store.count(&self.collection_id).await
    }

    pub async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<ScoredChunk>> {
        self.store.query(&self.collection_id, vector, k).await
    }
}

impl std::fmt::Debug for VectorIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VectorIndex")
            .field("collection_id", &self.collection_id)
            .field("fingerprint", &self.fingerprint)
            .field("dims", &self.dims)
            .finish()
    }
}

/// Builds or reopens the vector index for a configured corpus.
pub struct IndexManager<'a> {
    config: &'a Config,
    embedder: &'a dyn EmbeddingProvider,
    progress: Box<dyn BuildProgressReporter>,
}

impl<'a> IndexManager<'a> {
    pub fn new(config: &'a Config, embedder: &'a dyn EmbeddingProvider) -> Self {
        Self {
            config,
            embedder,
            progress: Box::new(NoProgress),
        }
    }

    pub fn with_progress(mut self, progress: Box<dyn BuildProgressReporter>) -> Self {
        self.progress = progress;
        self
    }

    fn persist_path(&self) -> &Path {
        &self.config.index.persist_path
    }

    /// Return an index that reflects the current corpus, building a new
    /// collection if the persisted one is stale, missing or unreadable.
    pub async fn get_or_build_index(&self, force_rebuild: bool) -> Result<VectorIndex> {
        self.progress.report(BuildProgressEvent::Fingerprinting);
        let fingerprint = fingerprint::compute_fingerprint(&self.config.corpus)?;

        let store: Arc<dyn VectorStore> = Arc::new(self.open_store().await?);

        let previous = match fingerprint::read_record(self.persist_path()) {
            Ok(record) => record,
            Err(e) => {
                warn!(error = %e, "ignoring unreadable fingerprint artifact; rebuilding");
                None
            }
        };

        if force_rebuild {
            info!("forced rebuild requested");
        } else if let Some(record) = &previous {
            if let Some(index) = self.try_reuse(&store, record, &fingerprint).await {
                return Ok(index);
            }
        } else {
            info!("no persisted index found; building");
        }

        self.build(store, &fingerprint, previous.map(|r| r.collection_id))
            .await
    }

    async fn try_reuse(
        &self,
        store: &Arc<dyn VectorStore>,
        record: &FingerprintRecord,
        fingerprint: &str,
    ) -> Option<VectorIndex> {
        if record.fingerprint != fingerprint {
            info!("policy corpus changed; rebuilding index");
            return None;
        }

        let info = match store.collection(&record.collection_id).await {
            Ok(Some(info)) => info,
            Ok(None) => {
                warn!(collection = %record.collection_id, "referenced collection missing; rebuilding");
                return None;
            }
            Err(e) => {
                warn!(collection = %record.collection_id, error = %e, "cannot read collection; rebuilding");
                return None;
            }
        };

        let want = self.embedder.dims();
        if want != 0 && info.dims != 0 && want != info.dims {
            info!(
                stored = info.dims,
                embedder = want,
                "embedding dimensions changed; rebuilding"
            );
            return None;
        }

        info!(collection = %info.id, chunks = info.chunk_count, "reusing persisted index");
        Some(VectorIndex::from_info(store.clone(), info))
    }

    /// Open the store, replacing the database if it cannot be opened.
    ///
    /// A replaced database loses its generation history, so the artifact is
    /// deleted with it and the generation it named is reserved in the fresh
    /// database. No later build can hand out that collection id again.
    async fn open_store(&self) -> Result<SqliteVectorStore> {
        let e = match SqliteVectorStore::open(self.persist_path()).await {
            Ok(store) => return Ok(store),
            Err(e) => e,
        };
        warn!(error = %e, "index database unreadable; starting a fresh one");

        let stale = fingerprint::read_record(self.persist_path()).ok().flatten();
        fingerprint::remove_record(self.persist_path())?;
        remove_database(self.persist_path())?;

        let store = SqliteVectorStore::open(self.persist_path()).await?;
        let base = &self.config.index.collection;
        if let Some(generation) = stale.and_then(|r| generation_of(base, &r.collection_id)) {
            store.reserve_generation(base, generation).await?;
        }
        Ok(store)
    }

    async fn build(
        &self,
        store: Arc<dyn VectorStore>,
        fingerprint: &str,
        previous: Option<String>,
    ) -> Result<VectorIndex> {
        self.progress.report(BuildProgressEvent::Chunking);
        let chunks = chunk::load_and_chunk(&self.config.corpus, &self.config.chunking)?;

        let entries = self.embed_chunks(chunks).await?;
        let dims = entries
            .first()
            .map(|(_, v)| v.len())
            .unwrap_or_else(|| self.embedder.dims());

        let base = &self.config.index.collection;
        let info = store.create_collection(base, fingerprint, dims).await?;
        self.progress.report(BuildProgressEvent::Persisting {
            collection: info.id.clone(),
        });

        if let Err(e) = self.persist(&store, &info, fingerprint, &entries).await {
            if let Err(drop_err) = store.drop_collection(&info.id).await {
                warn!(collection = %info.id, error = %drop_err, "failed to drop half-built collection");
            }
            return Err(e);
        }

        self.prune(&store, &info.id, previous.as_deref()).await;

        info!(
            collection = %info.id,
            chunks = entries.len(),
            dims,
            "built policy index"
        );

        Ok(VectorIndex::new(store, info.id, fingerprint, dims))
    }

    async fn persist(
        &self,
        store: &Arc<dyn VectorStore>,
        info: &CollectionInfo,
        fingerprint: &str,
        entries: &[(Chunk, Vec<f32>)],
    ) -> Result<()> {
        store.add_batch(&info.id, entries).await?;
        fingerprint::write_record(
            self.persist_path(),
            &FingerprintRecord {
                fingerprint: fingerprint.to_string(),
                collection_id: info.id.clone(),
            },
        )
    }

    async fn embed_chunks(&self, chunks: Vec<Chunk>) -> Result<Vec<(Chunk, Vec<f32>)>> {
        let total = chunks.len() as u64;
        let batch_size = self.config.embedding.batch_size.max(1);
        let provider = self.embedder.model_name().to_string();

        let mut entries = Vec::with_capacity(chunks.len());
        let mut dims: Option<usize> = None;

        for batch in chunks.chunks(batch_size) {
            let texts: Vec<String> = batch.iter().map(|c| c.content.clone()).collect();
            let vectors = self.embedder.embed_batch(&texts).await?;

            if vectors.len() != batch.len() {
                return Err(RagError::embedding(
                    &provider,
                    format!("expected {} vectors, got {}", batch.len(), vectors.len()),
                ));
            }

            for (chunk, vector) in batch.iter().zip(vectors) {
                let want = *dims.get_or_insert(vector.len());
                if vector.is_empty() || vector.len() != want {
                    return Err(RagError::embedding(
                        &provider,
                        format!(
                            "dimension mismatch for chunk {}: expected {}, got {}",
                            chunk.id,
                            want,
                            vector.len()
                        ),
                    ));
                }
                entries.push((chunk.clone(), vector));
            }

            self.progress.report(BuildProgressEvent::Embedding {
                n: entries.len() as u64,
                total,
            });
        }

        Ok(entries)
    }

    /// Drop every live collection other than the new one and the one it
    /// replaced. Failures are logged and left for the next rebuild.
    async fn prune(&self, store: &Arc<dyn VectorStore>, current: &str, previous: Option<&str>) {
        let live = match store.live_collections(&self.config.index.collection).await {
            Ok(live) => live,
            Err(e) => {
                warn!(error = %e, "could not list collections for pruning");
                return;
            }
        };

        for stale in live
            .iter()
            .filter(|c| c.id != current && Some(c.id.as_str()) != previous)
        {
            match store.drop_collection(&stale.id).await {
                Ok(()) => info!(collection = %stale.id, "dropped stale collection"),
                Err(e) => warn!(collection = %stale.id, error = %e, "failed to drop stale collection"),
            }
        }
    }

    /// Open the index the artifact currently points at. See [`open_persisted`].
    pub async fn open_existing(&self) -> Result<Option<VectorIndex>> {
        open_persisted(self.persist_path()).await
    }
}

/// Open the index the artifact under `persist_path` points at, without
/// fingerprinting the corpus or building anything.
///
/// `Ok(None)` when nothing has been built yet. An error when an artifact
/// exists but is malformed or names a missing collection.
pub async fn open_persisted(persist_path: &Path) -> Result<Option<VectorIndex>> {
    let Some(record) = fingerprint::read_record(persist_path)? else {
        return Ok(None);
    };

    let Some(store) = SqliteVectorStore::open_if_exists(persist_path).await? else {
        return Err(RagError::IndexState(format!(
            "fingerprint references {} but {} is missing",
            record.collection_id,
            db::db_path(persist_path).display()
        )));
    };

    let store: Arc<dyn VectorStore> = Arc::new(store);
    match store.collection(&record.collection_id).await? {
        Some(info) => Ok(Some(VectorIndex::from_info(store, info))),
        None => Err(RagError::IndexState(format!(
            "collection {} not found in store",
            record.collection_id
        ))),
    }
}

/// Generation number of `<base>_v<N>`, if `collection_id` has that shape.
fn generation_of(base: &str, collection_id: &str) -> Option<i64> {
    collection_id
        .strip_prefix(base)?
        .strip_prefix("_v")?
        .parse()
        .ok()
}

fn remove_database(persist_path: &Path) -> Result<()> {
    let db_file = db::db_path(persist_path);
    for suffix in ["", "-wal", "-shm"] {
        let mut name = db_file.clone().into_os_string();
        name.push(suffix);
        match std::fs::remove_file(PathBuf::from(name)) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

/// Convenience wrapper around [`IndexManager::get_or_build_index`] with no
/// progress reporting.
pub async fn get_or_build_index(
    config: &Config,
    embedder: &dyn EmbeddingProvider,
    force_rebuild: bool,
) -> Result<VectorIndex> {
    IndexManager::new(config, embedder)
        .get_or_build_index(force_rebuild)
        .await
}
