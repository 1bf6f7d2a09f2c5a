//! Vector index over named, persistent collections.
//!
//! [`VectorIndex`] ties together the three collaborators of the indexing
//! stage: the identity filter, an [`EmbeddingProvider`], and an
//! [`IndexStorage`] backend. One collection is kept per document, keyed by
//! the sanitized document name (see [`crate::naming::collection_name`]).
//!
//! # Indexing
//!
//! ```text
//! chunks ──► dedup_chunks ──► existing_ids ──► embed pending (batched)
//!                                                       │
//!              set_source_digest ◄── insert_entries ◄── create_collection
//! ```
//!
//! Only chunks whose content id is not yet stored are sent to the embedding
//! provider, so re-indexing unchanged content performs no embedding calls.
//!
//! # Search
//!
//! Entries are scored by cosine similarity against the embedded query and
//! ranked descending. The sort is stable over insertion order, so equal
//! scores keep the order in which their chunks were first indexed.

use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::embedding::{cosine_similarity, embed_query, EmbeddingProvider};
use crate::error::{Error, Result};
use crate::identity::dedup_chunks;
use crate::models::{Chunk, CollectionHandle, PageDocument, ScoredChunk};
use crate::naming::collection_name;
use crate::store::{CollectionInfo, IndexEntry, IndexStorage};

const DEFAULT_BATCH_SIZE: usize = 64;

/// Per-call indexing options.
#[derive(Debug, Clone, Default)]
pub struct IndexOptions {
    /// Drop the collection before indexing, purging entries from earlier
    /// versions of the document.
    pub rebuild: bool,
    /// Fingerprint of the source document, compared against the stored one.
    pub source_digest: Option<String>,
}

/// SHA-256 over the concatenated page text, hex-encoded.
pub fn source_digest(pages: &[PageDocument]) -> String {
    let mut hasher = Sha256::new();
    for page in pages {
        hasher.update(page.text.as_bytes());
        hasher.update([0u8]);
    }
    hex::encode(hasher.finalize())
}

pub struct VectorIndex {
    store: Arc<dyn IndexStorage>,
    embedder: Arc<dyn EmbeddingProvider>,
    batch_size: usize,
}

impl VectorIndex {
    pub fn new(store: Arc<dyn IndexStorage>, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            store,
            embedder,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn store(&self) -> &Arc<dyn IndexStorage> {
        &self.store
    }

    /// Index `chunks` into the collection named after `document_name`.
    pub async fn index(&self, chunks: Vec<Chunk>, document_name: &str) -> Result<CollectionHandle> {
        self.index_with(chunks, document_name, &IndexOptions::default())
            .await
    }

    /// Index with explicit [`IndexOptions`].
    ///
    /// All embedding happens before the store is touched, so a provider
    /// failure leaves the collection as it was (or absent).
    pub async fn index_with(
        &self,
        chunks: Vec<Chunk>,
        document_name: &str,
        options: &IndexOptions,
    ) -> Result<CollectionHandle> {
        let name = collection_name(document_name);
        let (unique, ids) = dedup_chunks(chunks);

        let current = self.store.collection_info(&name).await?;
        let existing = match &current {
            Some(_) if !options.rebuild => self.store.existing_ids(&name, &ids).await?,
            _ => HashSet::new(),
        };

        if let (Some(info), Some(digest)) = (&current, &options.source_digest) {
            if let Some(previous) = info.source_digest.as_ref().filter(|p| *p != digest) {
                if options.rebuild {
                    info!(collection = %name, "document content changed; rebuilding");
                } else {
                    warn!(
                        collection = %name,
                        previous = %previous,
                        current = %digest,
                        "document content changed; entries from the earlier version are kept"
                    );
                }
            }
        }

        let pending: Vec<Chunk> = unique
            .into_iter()
            .filter(|c| !existing.contains(&c.content_id))
            .collect();

        info!(
            collection = %name,
            exists = current.is_some(),
            rebuild = options.rebuild,
            known = existing.len(),
            pending = pending.len(),
            "indexing document"
        );

        let entries = self.embed_entries(&pending).await?;

        if options.rebuild && current.is_some() && self.store.drop_collection(&name).await? {
            info!(collection = %name, "dropped collection for rebuild");
        }
        let created = self.store.create_collection(&name).await?;

        let inserted = match self.store.insert_entries(&name, &entries).await {
            Ok(n) => n,
            Err(e) => {
                if created {
                    self.store.drop_collection(&name).await?;
                }
                return Err(e);
            }
        };
        if let Some(digest) = &options.source_digest {
            self.store.set_source_digest(&name, digest).await?;
        }

        let size = self.require(&name).await?.entries;
        info!(collection = %name, size, inserted, "index ready");

        Ok(CollectionHandle {
            name,
            size,
            inserted,
        })
    }

    /// Embed `chunks` in batches, in order.
    async fn embed_entries(&self, chunks: &[Chunk]) -> Result<Vec<IndexEntry>> {
        let mut entries = Vec::with_capacity(chunks.len());
        for batch in chunks.chunks(self.batch_size) {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let vectors = self.embedder.embed(&texts).await?;
            if vectors.len() != batch.len() {
                return Err(Error::query_engine(format!(
                    "embedding provider returned {} vectors for {} texts",
                    vectors.len(),
                    batch.len()
                )));
            }
            entries.extend(batch.iter().zip(vectors).map(|(chunk, embedding)| IndexEntry {
                content_id: chunk.content_id.clone(),
                text: chunk.text.clone(),
                source: chunk.source.clone(),
                embedding,
            }));
        }
        Ok(entries)
    }

    /// Handle to an existing collection, looked up by document or collection
    /// name.
    pub async fn open(&self, name: &str) -> Result<CollectionHandle> {
        let name = collection_name(name);
        let info = self.require(&name).await?;
        Ok(CollectionHandle {
            name,
            size: info.entries,
            inserted: 0,
        })
    }

    pub async fn collections(&self) -> Result<Vec<CollectionInfo>> {
        self.store.list_collections().await
    }

    /// The `k` entries most similar to `query`, best first.
    pub async fn search(&self, collection: &str, query: &str, k: usize) -> Result<Vec<ScoredChunk>> {
        self.require(collection).await?;
        let entries = self.store.load_entries(collection).await?;
        if entries.is_empty() || k == 0 {
            return Ok(Vec::new());
        }

        let query_vec = embed_query(self.embedder.as_ref(), query).await?;

        let mut scored: Vec<(f32, IndexEntry)> = entries
            .into_iter()
            .map(|e| (cosine_similarity(&query_vec, &e.embedding), e))
            .collect();
        // sort_by is stable: equal scores stay in insertion order
        scored.sort_by(|a, b| rank_key(b.0).total_cmp(&rank_key(a.0)));
        scored.truncate(k);

        debug!(
            collection,
            scores = ?scored.iter().map(|(s, _)| *s).collect::<Vec<_>>(),
            "retrieved chunks"
        );

        Ok(scored
            .into_iter()
            .map(|(score, e)| ScoredChunk {
                chunk: Chunk {
                    text: e.text,
                    content_id: e.content_id,
                    source: e.source,
                },
                score,
            })
            .collect())
    }

    async fn require(&self, name: &str) -> Result<CollectionInfo> {
        self.store
            .collection_info(name)
            .await?
            .ok_or_else(|| Error::index_unavailable(name))
    }
}

/// Total-order key for a similarity score; NaN ranks last and `-0.0`
/// ties with `0.0`.
fn rank_key(score: f32) -> f32 {
    if score.is_nan() {
        f32::NEG_INFINITY
    } else {
        score + 0.0
    }
}
