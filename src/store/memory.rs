//! In-memory bucket backend.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{CacheBucket, CacheStorage, validate_bucket_name};
use crate::error::Result;
use crate::request::{CachedResponse, RequestKey};

/// Buckets that live as long as the storage handle.
#[derive(Default)]
pub struct MemoryStorage {
    buckets: Mutex<HashMap<String, Arc<MemoryBucket>>>,
}

impl MemoryStorage {
    /// Creates an empty storage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheStorage for MemoryStorage {
    async fn open(&self, name: &str) -> Result<Arc<dyn CacheBucket>> {
        validate_bucket_name(name)?;
        let mut buckets = self
            .buckets
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let bucket = buckets
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(MemoryBucket::new(name)));
        Ok(Arc::clone(bucket) as Arc<dyn CacheBucket>)
    }

    async fn has(&self, name: &str) -> Result<bool> {
        Ok(self
            .buckets
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .contains_key(name))
    }
}

/// A bucket held in a hash map.
pub struct MemoryBucket {
    name: String,
    entries: RwLock<HashMap<RequestKey, CachedResponse>>,
}

impl MemoryBucket {
    /// Creates an empty bucket.
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            entries: RwLock::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl CacheBucket for MemoryBucket {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get(&self, key: &RequestKey) -> Result<Option<CachedResponse>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn put_all(&self, entries: Vec<(RequestKey, CachedResponse)>) -> Result<()> {
        // Single write lock: readers see all entries or none.
        self.entries.write().await.extend(entries);
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<RequestKey>> {
        let mut keys: Vec<_> = self.entries.read().await.keys().cloned().collect();
        keys.sort();
        Ok(keys)
    }

    async fn len(&self) -> Result<usize> {
        Ok(self.entries.read().await.len())
    }
}
