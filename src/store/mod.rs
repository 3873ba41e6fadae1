//! Named cache buckets and the storage handle that opens them.
//!
//! A [`CacheStorage`] is passed explicitly to whoever needs it; there is no
//! process-global cache. Buckets are created on first open and keep their
//! contents until something outside this crate removes them.

mod disk;
mod memory;

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::request::{CachedResponse, RequestKey};

pub use disk::{DiskBucket, DiskStorage};
pub use memory::{MemoryBucket, MemoryStorage};

/// A named key-value store mapping request keys to stored responses.
#[async_trait]
pub trait CacheBucket: Send + Sync {
    /// Returns the bucket name.
    fn name(&self) -> &str;

    /// Looks up a stored response.
    async fn get(&self, key: &RequestKey) -> Result<Option<CachedResponse>>;

    /// Stores every entry or none of them.
    ///
    /// Later entries with a duplicate key replace earlier ones.
    async fn put_all(&self, entries: Vec<(RequestKey, CachedResponse)>) -> Result<()>;

    /// Returns all stored keys in sorted order.
    async fn keys(&self) -> Result<Vec<RequestKey>>;

    /// Returns the number of stored entries.
    async fn len(&self) -> Result<usize> {
        Ok(self.keys().await?.len())
    }

    /// Returns true if the bucket holds no entries.
    async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }
}

/// Opens buckets by name, creating them if absent.
#[async_trait]
pub trait CacheStorage: Send + Sync {
    /// Opens (or creates) the bucket called `name`.
    async fn open(&self, name: &str) -> Result<Arc<dyn CacheBucket>>;

    /// Returns true if a bucket called `name` has been created.
    async fn has(&self, name: &str) -> Result<bool>;
}

/// Checks that `name` can address a bucket on every backend.
///
/// # Errors
///
/// Returns [`Error::InvalidBucketName`] for empty names, names starting with
/// `.`, or names containing anything but ASCII alphanumerics, `.`, `_`, `-`.
pub fn validate_bucket_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && !name.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));
    if valid {
        Ok(())
    } else {
        Err(Error::InvalidBucketName(name.to_string()))
    }
}
