//! In-memory [`IndexStorage`] implementation for testing.
//!
//! Uses a `BTreeMap` behind `std::sync::RwLock` for thread safety.

use std::collections::{BTreeMap, HashSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

use crate::error::{Error, Result};

use super::{CollectionInfo, IndexEntry, IndexStorage};

#[derive(Default)]
struct StoredCollection {
    entries: Vec<IndexEntry>,
    ids: HashSet<String>,
    source_digest: Option<String>,
}

/// In-memory store for tests. Contents vanish with the value.
#[derive(Default)]
pub struct InMemoryStore {
    collections: RwLock<BTreeMap<String, StoredCollection>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, BTreeMap<String, StoredCollection>>> {
        self.collections
            .read()
            .map_err(|_| Error::storage("in-memory store lock poisoned"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, BTreeMap<String, StoredCollection>>> {
        self.collections
            .write()
            .map_err(|_| Error::storage("in-memory store lock poisoned"))
    }
}

fn info(name: &str, c: &StoredCollection) -> CollectionInfo {
    CollectionInfo {
        name: name.to_string(),
        entries: c.entries.len(),
        source_digest: c.source_digest.clone(),
    }
}

#[async_trait]
impl IndexStorage for InMemoryStore {
    async fn create_collection(&self, name: &str) -> Result<bool> {
        let mut collections = self.write()?;
        if collections.contains_key(name) {
            return Ok(false);
        }
        collections.insert(name.to_string(), StoredCollection::default());
        Ok(true)
    }

    async fn collection_info(&self, name: &str) -> Result<Option<CollectionInfo>> {
        Ok(self.read()?.get(name).map(|c| info(name, c)))
    }

    async fn set_source_digest(&self, name: &str, digest: &str) -> Result<()> {
        let mut collections = self.write()?;
        let c = collections
            .get_mut(name)
            .ok_or_else(|| Error::index_unavailable(name))?;
        c.source_digest = Some(digest.to_string());
        Ok(())
    }

    async fn existing_ids(&self, name: &str, ids: &[String]) -> Result<HashSet<String>> {
        let collections = self.read()?;
        let Some(c) = collections.get(name) else {
            return Ok(HashSet::new());
        };
        Ok(ids.iter().filter(|id| c.ids.contains(*id)).cloned().collect())
    }

    async fn insert_entries(&self, name: &str, entries: &[IndexEntry]) -> Result<usize> {
        let mut collections = self.write()?;
        let c = collections
            .get_mut(name)
            .ok_or_else(|| Error::index_unavailable(name))?;
        let mut inserted = 0;
        for entry in entries {
            if c.ids.insert(entry.content_id.clone()) {
                c.entries.push(entry.clone());
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    async fn load_entries(&self, name: &str) -> Result<Vec<IndexEntry>> {
        let collections = self.read()?;
        let c = collections
            .get(name)
            .ok_or_else(|| Error::index_unavailable(name))?;
        Ok(c.entries.clone())
    }

    async fn list_collections(&self) -> Result<Vec<CollectionInfo>> {
        Ok(self
            .read()?
            .iter()
            .map(|(name, c)| info(name, c))
            .collect())
    }

    async fn drop_collection(&self, name: &str) -> Result<bool> {
        Ok(self.write()?.remove(name).is_some())
    }
}
