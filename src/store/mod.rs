//! Storage abstraction for the vector index.
//!
//! The [`IndexStorage`] trait defines the persistence operations the
//! [`VectorIndex`](crate::index::VectorIndex) needs: named collections of
//! `(content_id, embedding, text)` entries kept in insertion order.
//!
//! Implementations:
//! - [`SqliteStore`](crate::sqlite_store::SqliteStore): durable, survives restarts.
//! - [`memory::InMemoryStore`]: process-local, for tests.
//!
//! Callers must serialize writes per collection name; implementations do not
//! guard against concurrent indexing of the same collection.

pub mod memory;

use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashSet;

use crate::error::Result;
use crate::models::SourceMetadata;

/// One stored, embedded chunk.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexEntry {
    pub content_id: String,
    pub text: String,
    pub source: SourceMetadata,
    pub embedding: Vec<f32>,
}

/// Summary of a stored collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CollectionInfo {
    pub name: String,
    pub entries: usize,
    /// SHA-256 of the text most recently indexed under this name.
    pub source_digest: Option<String>,
}

/// Abstract persistent store of named collections.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`create_collection`](IndexStorage::create_collection) | Create if absent |
/// | [`collection_info`](IndexStorage::collection_info) | Look up one collection |
/// | [`set_source_digest`](IndexStorage::set_source_digest) | Record the indexed text's digest |
/// | [`existing_ids`](IndexStorage::existing_ids) | Which ids are already stored |
/// | [`insert_entries`](IndexStorage::insert_entries) | Append entries, skipping known ids |
/// | [`load_entries`](IndexStorage::load_entries) | All entries in insertion order |
/// | [`list_collections`](IndexStorage::list_collections) | Every collection |
/// | [`drop_collection`](IndexStorage::drop_collection) | Delete a collection and its entries |
#[async_trait]
pub trait IndexStorage: Send + Sync {
    /// Create the collection if it does not exist. Returns `true` if created.
    async fn create_collection(&self, name: &str) -> Result<bool>;

    /// Look up a collection by name.
    async fn collection_info(&self, name: &str) -> Result<Option<CollectionInfo>>;

    /// Record the digest of the document most recently indexed under `name`.
    async fn set_source_digest(&self, name: &str, digest: &str) -> Result<()>;

    /// Subset of `ids` already present in the collection.
    async fn existing_ids(&self, name: &str, ids: &[String]) -> Result<HashSet<String>>;

    /// Append entries after any existing ones. Entries whose id is already
    /// stored are skipped. Returns the number inserted.
    async fn insert_entries(&self, name: &str, entries: &[IndexEntry]) -> Result<usize>;

    /// All entries of a collection, in insertion order.
    async fn load_entries(&self, name: &str) -> Result<Vec<IndexEntry>>;

    /// All collections, ordered by name.
    async fn list_collections(&self) -> Result<Vec<CollectionInfo>>;

    /// Delete a collection. Returns `true` if it existed.
    async fn drop_collection(&self, name: &str) -> Result<bool>;
}
